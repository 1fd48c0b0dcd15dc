//! Box-constrained problems.
//!
//! [`BoundedProblem`] wraps a [`Problem`] defined on external (bounded)
//! parameters and exposes it on internal (unbounded) parameters, so the
//! unconstrained Levenberg-Marquardt loop can solve it.

use ndarray::{Array1, Array2};

use crate::error::{FitError, Result};
use crate::parameters::{Bounds, BoundsTransform};
use crate::problem::Problem;

/// A problem seen through per-parameter [`BoundsTransform`]s.
pub struct BoundedProblem<'a, P: Problem + ?Sized> {
    inner: &'a P,
    transforms: Vec<BoundsTransform>,
}

impl<'a, P: Problem + ?Sized> BoundedProblem<'a, P> {
    /// Wrap `inner`, one [`Bounds`] per parameter.
    pub fn new(inner: &'a P, bounds: &[Bounds]) -> Result<Self> {
        if bounds.len() != inner.parameter_count() {
            return Err(FitError::DimensionMismatch(format!(
                "Expected bounds for {} parameters, got {}",
                inner.parameter_count(),
                bounds.len()
            )));
        }

        Ok(Self {
            inner,
            transforms: bounds.iter().copied().map(BoundsTransform::new).collect(),
        })
    }

    /// Map internal parameters to the bounded values seen by the inner problem.
    pub fn to_external(&self, internal: &Array1<f64>) -> Array1<f64> {
        internal
            .iter()
            .zip(&self.transforms)
            .map(|(&q, transform)| transform.to_external(q))
            .collect()
    }

    /// Map bounded starting values to internal parameters.
    ///
    /// Fails if any value lies outside its bounds.
    pub fn to_internal(&self, external: &Array1<f64>) -> Result<Array1<f64>> {
        if external.len() != self.transforms.len() {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                self.transforms.len(),
                external.len()
            )));
        }

        external
            .iter()
            .zip(&self.transforms)
            .map(|(&p, transform)| transform.to_internal(p).map_err(FitError::from))
            .collect()
    }
}

impl<'a, P: Problem + ?Sized> Problem for BoundedProblem<'a, P> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        self.inner.eval(&self.to_external(params))
    }

    fn parameter_count(&self) -> usize {
        self.transforms.len()
    }

    fn residual_count(&self) -> usize {
        self.inner.residual_count()
    }

    /// Chain rule: the inner Jacobian scaled column-wise by d(external)/d(internal).
    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>> {
        let mut jac = self.inner.jacobian(&self.to_external(params))?;
        if jac.ncols() != self.transforms.len() {
            return Err(FitError::DimensionMismatch(format!(
                "Expected Jacobian with {} columns, got {}",
                self.transforms.len(),
                jac.ncols()
            )));
        }

        for (j, (transform, &q)) in self.transforms.iter().zip(params.iter()).enumerate() {
            let scale = transform.derivative(q);
            jac.column_mut(j).mapv_inplace(|v| v * scale);
        }

        Ok(jac)
    }

    fn has_custom_jacobian(&self) -> bool {
        self.inner.has_custom_jacobian()
    }

    /// Curvature the transforms add: `(∂C/∂x) · x''(q)`, with the external
    /// gradient recovered from the internal one.
    fn residual_curvature(
        &self,
        params: &Array1<f64>,
        gradient: &Array1<f64>,
    ) -> Option<Array1<f64>> {
        let curvature = self
            .transforms
            .iter()
            .zip(params.iter().zip(gradient.iter()))
            .map(|(transform, (&q, &g))| {
                let slope = transform.derivative(q);
                if slope == 0.0 {
                    return 0.0;
                }
                let term = g / slope * transform.second_derivative(q);
                if term.is_finite() {
                    term
                } else {
                    0.0
                }
            })
            .collect();
        Some(curvature)
    }
}
