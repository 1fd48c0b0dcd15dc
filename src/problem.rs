//! Problem definition trait.
//!
//! This module defines the `Problem` trait, which represents a nonlinear
//! least squares problem to be solved with the Levenberg-Marquardt algorithm.

use crate::error::Result;
use crate::utils::finite_difference;
use ndarray::{Array1, Array2};

/// A trait representing a nonlinear least squares problem.
///
/// The optimizer minimizes the sum of squared residuals returned by
/// [`Problem::eval`]. Weighting (dividing by measurement errors) is the
/// responsibility of the implementor.
pub trait Problem {
    /// Evaluate the residuals at the given parameters.
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>>;

    /// Get the number of parameters in the problem.
    fn parameter_count(&self) -> usize;

    /// Get the number of residuals in the problem.
    fn residual_count(&self) -> usize;

    /// Evaluate the Jacobian matrix at the given parameters.
    ///
    /// `J[i, j]` is the derivative of residual `i` with respect to parameter `j`.
    /// The default implementation uses forward finite differences.
    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>> {
        finite_difference::jacobian(self, params, None)
    }

    /// Whether [`Problem::jacobian`] is analytical.
    fn has_custom_jacobian(&self) -> bool {
        false
    }

    /// Diagonal of `Σ_i r_i ∂²r_i/∂p_j²`, the second-order part of the cost
    /// curvature that `JᵀJ` leaves out, for problems that know it cheaply.
    ///
    /// `gradient` is `Jᵀr` at `params`. The default returns `None`, which
    /// keeps the plain Gauss-Newton approximation.
    fn residual_curvature(
        &self,
        _params: &Array1<f64>,
        _gradient: &Array1<f64>,
    ) -> Option<Array1<f64>> {
        None
    }

    /// Evaluate the cost function (sum of squared residuals).
    fn eval_cost(&self, params: &Array1<f64>) -> Result<f64> {
        let residuals = self.eval(params)?;
        Ok(residuals.iter().map(|r| r.powi(2)).sum())
    }
}
