//! Model trait and the weighted residual adapter.
//!
//! A [`Model`] is a stateless parametric function `f(x; p)`. Parameter values
//! live outside the model, in the vector the optimizer iterates on, so one
//! model value can be evaluated at many parameter sets without cloning.
//! [`ModelProblem`] binds a model to observed data and turns it into a
//! [`Problem`] whose residuals are `(f(x_i; p) − y_i) / σ_i`.

use crate::error::{FitError, Result};
use crate::problem::Problem;
use crate::utils::finite_difference;
use ndarray::{Array1, Array2};

/// A parametric function of one independent variable.
pub trait Model {
    /// Names of the parameters, in the order the parameter vector uses.
    fn parameter_names(&self) -> &'static [&'static str];

    /// Number of parameters.
    fn parameter_count(&self) -> usize {
        self.parameter_names().len()
    }

    /// Evaluate the model at a single point.
    ///
    /// `params` must have [`Model::parameter_count`] entries; callers going
    /// through [`Model::eval`] or [`ModelProblem`] get that checked.
    fn value(&self, x: f64, params: &Array1<f64>) -> f64;

    /// Partial derivatives of the model with respect to each parameter at `x`.
    ///
    /// Returns `None` when the model has no analytic derivatives, in which
    /// case fitting falls back to finite differences.
    fn gradient(&self, _x: f64, _params: &Array1<f64>) -> Option<Array1<f64>> {
        None
    }

    /// Whether [`Model::gradient`] is implemented.
    fn has_gradient(&self) -> bool {
        false
    }

    /// Evaluate the model at every point of `x`.
    fn eval(&self, x: &Array1<f64>, params: &Array1<f64>) -> Result<Array1<f64>> {
        check_parameter_count(self.parameter_count(), params)?;
        Ok(x.mapv(|xi| self.value(xi, params)))
    }
}

fn check_parameter_count(expected: usize, params: &Array1<f64>) -> Result<()> {
    if params.len() != expected {
        return Err(FitError::DimensionMismatch(format!(
            "Expected {} parameters, got {}",
            expected,
            params.len()
        )));
    }
    Ok(())
}

/// A [`Model`] bound to data with per-point uncertainties.
///
/// The sum of squared residuals of this problem is the chi-square of the fit.
pub struct ModelProblem<'a, M: Model + ?Sized> {
    model: &'a M,
    x: Array1<f64>,
    y: Array1<f64>,
    y_error: Array1<f64>,
}

impl<'a, M: Model + ?Sized> ModelProblem<'a, M> {
    /// Bind `model` to observed data.
    ///
    /// The three arrays must have the same length and every `y_error` must be
    /// finite and positive.
    pub fn new(
        model: &'a M,
        x: Array1<f64>,
        y: Array1<f64>,
        y_error: Array1<f64>,
    ) -> Result<Self> {
        if x.len() != y.len() || x.len() != y_error.len() {
            return Err(FitError::InvalidInput(format!(
                "x, y and y_error must have equal lengths, got {}, {} and {}",
                x.len(),
                y.len(),
                y_error.len()
            )));
        }
        if let Some(bad) = y_error.iter().find(|e| !(e.is_finite() && **e > 0.0)) {
            return Err(FitError::InvalidInput(format!(
                "y errors must be finite and positive, got {}",
                bad
            )));
        }

        Ok(Self {
            model,
            x,
            y,
            y_error,
        })
    }

    /// Chi-square at `params`.
    pub fn chi_square(&self, params: &Array1<f64>) -> Result<f64> {
        self.eval_cost(params)
    }

    /// Jacobian of the weighted residuals from the model's analytic gradient.
    fn analytic_jacobian(&self, params: &Array1<f64>) -> Option<Array2<f64>> {
        let n_params = self.model.parameter_count();
        let mut jac = Array2::zeros((self.x.len(), n_params));

        for (i, (&xi, &err)) in self.x.iter().zip(self.y_error.iter()).enumerate() {
            let grad = self.model.gradient(xi, params)?;
            if grad.len() != n_params {
                return None;
            }
            for (j, g) in grad.iter().enumerate() {
                jac[[i, j]] = g / err;
            }
        }

        Some(jac)
    }
}

impl<'a, M: Model + ?Sized> Problem for ModelProblem<'a, M> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        check_parameter_count(self.model.parameter_count(), params)?;
        Ok(self
            .x
            .iter()
            .zip(self.y.iter())
            .zip(self.y_error.iter())
            .map(|((&xi, &yi), &err)| (self.model.value(xi, params) - yi) / err)
            .collect())
    }

    fn parameter_count(&self) -> usize {
        self.model.parameter_count()
    }

    fn residual_count(&self) -> usize {
        self.x.len()
    }

    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>> {
        check_parameter_count(self.model.parameter_count(), params)?;
        match self.analytic_jacobian(params) {
            Some(jac) => Ok(jac),
            None => finite_difference::jacobian(self, params, None),
        }
    }

    fn has_custom_jacobian(&self) -> bool {
        self.model.has_gradient()
    }
}
