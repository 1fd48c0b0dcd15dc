//! # Covariance Matrix Calculations
//!
//! Covariance, correlation and standard errors from the Jacobian of the
//! weighted residuals at the optimum.

use crate::error::{FitError, Result};
use crate::utils::matrix_convert::{nalgebra_to_ndarray, ndarray_to_nalgebra};
use ndarray::{Array1, Array2};

/// Calculate the covariance matrix from the Jacobian of the weighted residuals.
///
///   covar = scale * inv(J^T * J)
///
/// With residuals divided by their measurement errors, `scale = 1` gives the
/// parameter covariance directly. Passing the reduced chi-square as `scale`
/// rescales it to the observed scatter instead.
///
/// Returns [`FitError::SingularMatrix`] if `J^T * J` cannot be inverted.
pub fn calculate_covariance(jacobian: &Array2<f64>, scale: f64) -> Result<Array2<f64>> {
    let jtj = ndarray_to_nalgebra(&jacobian.t().dot(jacobian));

    // Cholesky first; LU for matrices that are invertible but not numerically
    // positive definite.
    let inverse = match jtj.clone().cholesky() {
        Some(cholesky) => cholesky.inverse(),
        None => jtj.try_inverse().ok_or(FitError::SingularMatrix)?,
    };

    if inverse.iter().any(|v| !v.is_finite()) {
        return Err(FitError::SingularMatrix);
    }

    Ok(nalgebra_to_ndarray(&inverse) * scale)
}

/// Calculate correlation matrix from covariance matrix.
///
///   correl[i,j] = covar[i,j] / sqrt(covar[i,i] * covar[j,j])
///
/// Entries whose variances are not positive are set to zero.
pub fn calculate_correlation(covar: &Array2<f64>) -> Array2<f64> {
    let n = covar.nrows();
    Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            return 1.0;
        }
        let denom = (covar[[i, i]] * covar[[j, j]]).sqrt();
        if denom > 0.0 {
            covar[[i, j]] / denom
        } else {
            0.0
        }
    })
}

/// Standard errors: square roots of the diagonal of the covariance matrix.
///
/// A negative variance, which only a broken covariance produces, yields NaN.
pub fn standard_errors_from_covariance(covar: &Array2<f64>) -> Array1<f64> {
    covar.diag().mapv(|v| if v >= 0.0 { v.sqrt() } else { f64::NAN })
}
