//! Matrix conversion utilities.
//!
//! Public APIs speak `ndarray`; dense factorizations (Cholesky, inverse) are
//! done with `nalgebra`. These helpers move data between the two.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};

/// Convert an ndarray `Array2` to a nalgebra `DMatrix`.
///
/// ndarray is row-major by default and nalgebra column-major, so elements are
/// copied by index rather than by slice.
pub fn ndarray_to_nalgebra(arr: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(arr.nrows(), arr.ncols(), |i, j| arr[[i, j]])
}

/// Convert a nalgebra `DMatrix` to an ndarray `Array2`.
pub fn nalgebra_to_ndarray(mat: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}

/// Convert an ndarray `Array1` to a nalgebra `DVector`.
pub fn ndarray_vec_to_nalgebra(arr: &Array1<f64>) -> DVector<f64> {
    DVector::from_iterator(arr.len(), arr.iter().copied())
}

/// Convert a nalgebra `DVector` to an ndarray `Array1`.
pub fn nalgebra_vec_to_ndarray(vec: &DVector<f64>) -> Array1<f64> {
    vec.iter().copied().collect()
}
