//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! Each iteration solves the damped normal equations
//! `(JᵀJ + C + λ·D) δ = −Jᵀr` with a Cholesky factorization. `C` is the
//! second-order curvature a problem may report (the bounds transforms do),
//! and `D` holds the largest diagonal of `JᵀJ` seen so far. A step is
//! accepted if it lowers the cost; `λ` then shrinks by how well the quadratic
//! model predicted the reduction, and grows by doubling factors on rejection.

use log::{debug, trace};
use ndarray::{Array1, Array2};
use std::fmt;

use crate::error::{FitError, Result};
use crate::parameters::Bounds;
use crate::problem::Problem;
use crate::utils::matrix_convert::{
    nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra,
};

use super::bounded::BoundedProblem;
use super::config::LmConfig;

/// Floor for the damping scale, so parameters the residuals do not depend on
/// still get damped.
const MIN_DIAGONAL: f64 = 1e-12;

/// Result of the Levenberg-Marquardt optimization.
#[derive(Debug, Clone)]
pub struct LmResult {
    /// Optimized parameter values
    pub params: Array1<f64>,

    /// Residuals at the solution
    pub residuals: Array1<f64>,

    /// Sum of squared residuals
    pub cost: f64,

    /// Number of iterations performed
    pub iterations: usize,

    /// Number of function evaluations
    pub func_evals: usize,

    /// Whether the optimization converged
    pub success: bool,

    /// A message describing the result
    pub message: String,

    /// The Jacobian matrix at the solution (if requested)
    pub jacobian: Option<Array2<f64>>,
}

impl fmt::Display for LmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Success: {}", self.success)?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Parameters: {}", self.params)?;
        Ok(())
    }
}

/// How the iteration ended.
enum IterationStatus {
    /// Converged successfully
    Converged(String),

    /// Failed to converge
    Failed(String),
}

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    /// Configuration options
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Levenberg-Marquardt optimizer with the given configuration.
    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Set the tolerance for the relative cost reduction.
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.config.ftol = ftol;
        self
    }

    /// Set the tolerance for change in parameter values.
    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.config.xtol = xtol;
        self
    }

    /// Set the tolerance for gradient norm.
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.config.gtol = gtol;
        self
    }

    /// Set the initial value for the damping parameter.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.config.initial_lambda = lambda;
        self
    }

    /// Set whether to calculate and return the Jacobian at the solution.
    pub fn with_calc_jacobian(mut self, calc_jacobian: bool) -> Self {
        self.config.calc_jacobian = calc_jacobian;
        self
    }

    /// Minimize the sum of squared residuals for the given problem.
    ///
    /// Non-convergence is not an error: it is reported through
    /// [`LmResult::success`] together with the last accepted parameters.
    /// Errors are reserved for malformed problems (wrong dimensions) and
    /// failures raised by the problem itself.
    pub fn minimize<P: Problem + ?Sized>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
    ) -> Result<LmResult> {
        let n_params = problem.parameter_count();
        if initial_params.len() != n_params {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n_params,
                initial_params.len()
            )));
        }

        let n_residuals = problem.residual_count();
        let mut params = initial_params;
        let mut residuals = problem.eval(&params)?;
        if residuals.len() != n_residuals {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} residuals, got {}",
                n_residuals,
                residuals.len()
            )));
        }
        let mut func_evals = 1;
        let mut cost = sum_of_squares(&residuals);
        let mut lambda = self.config.initial_lambda;
        let mut scale = Array1::<f64>::zeros(n_params);
        let mut iterations = 0;

        let status = if !cost.is_finite() {
            IterationStatus::Failed("Cost is not finite at the initial parameters".to_string())
        } else {
            loop {
                if iterations >= self.config.max_iterations {
                    break IterationStatus::Failed(format!(
                        "Maximum iterations ({}) reached",
                        self.config.max_iterations
                    ));
                }

                let jacobian = problem.jacobian(&params)?;
                if !problem.has_custom_jacobian() {
                    func_evals += n_params;
                }

                // g = Jᵀr
                let gradient = jacobian.t().dot(&residuals);
                let gradient_norm = gradient.iter().fold(0.0_f64, |acc, g| acc.max(g.abs()));
                if gradient_norm <= self.config.gtol {
                    break IterationStatus::Converged(format!(
                        "Gradient convergence: ||g|| = {:.2e} <= {:.2e}",
                        gradient_norm, self.config.gtol
                    ));
                }

                let mut hessian = jacobian.t().dot(&jacobian);
                // Damping scale never shrinks, so a column that fades out
                // (a parameter pressed against its bound) stays damped.
                for j in 0..n_params {
                    scale[j] = scale[j].max(hessian[[j, j]]);
                }
                if let Some(curvature) = problem.residual_curvature(&params, &gradient) {
                    for (j, c) in curvature.iter().enumerate() {
                        hessian[[j, j]] += c.max(0.0);
                    }
                }

                iterations += 1;
                trace!(
                    "iteration {}: cost = {:.6e}, ||g|| = {:.2e}, lambda = {:.1e}",
                    iterations,
                    cost,
                    gradient_norm,
                    lambda
                );

                // Raise the damping until a step lowers the cost.
                let mut growth = self.config.lambda_up_factor;
                let outcome = loop {
                    let step = match damped_step(&hessian, &scale, &gradient, lambda) {
                        Some(step) => step,
                        None => {
                            lambda *= self.config.lambda_up_factor;
                            if lambda > self.config.max_lambda {
                                break Some(IterationStatus::Failed(
                                    "Damped normal equations are singular".to_string(),
                                ));
                            }
                            continue;
                        }
                    };

                    let xtol = self.config.xtol;
                    let small_step = step
                        .iter()
                        .zip(params.iter())
                        .all(|(d, p)| d.abs() <= xtol * (p.abs() + xtol));

                    let trial = &params + &step;
                    let trial_residuals = problem.eval(&trial)?;
                    func_evals += 1;
                    let trial_cost = sum_of_squares(&trial_residuals);

                    if trial_cost.is_finite() && trial_cost < cost {
                        let actual = cost - trial_cost;
                        let predicted = predicted_reduction(&hessian, &gradient, &step);
                        let gain = if predicted > 0.0 { actual / predicted } else { 0.0 };
                        debug!(
                            "accepted step: cost {:.6e} -> {:.6e}, lambda = {:.1e}, gain = {:.2}",
                            cost,
                            trial_cost,
                            lambda,
                            gain
                        );

                        let (actual, predicted) = (actual / cost, predicted / cost);
                        params = trial;
                        residuals = trial_residuals;
                        cost = trial_cost;
                        let shrink = (1.0 - (2.0 * gain - 1.0).powi(3))
                            .max(self.config.lambda_down_factor);
                        lambda = (lambda * shrink).max(self.config.min_lambda);

                        if actual <= self.config.ftol && predicted <= self.config.ftol {
                            break Some(IterationStatus::Converged(format!(
                                "Cost convergence: |df|/f = {:.2e} <= {:.2e}",
                                actual, self.config.ftol
                            )));
                        }
                        if small_step {
                            break Some(IterationStatus::Converged(format!(
                                "Parameter convergence: |dx| <= {:.2e} * (|x| + xtol)",
                                xtol
                            )));
                        }
                        break None;
                    }

                    trace!(
                        "rejected step: cost {:.6e} -> {:.6e}, lambda = {:.1e}",
                        cost,
                        trial_cost,
                        lambda
                    );
                    if small_step {
                        break Some(IterationStatus::Converged(format!(
                            "Parameter convergence: no cost-reducing step above xtol = {:.2e}",
                            xtol
                        )));
                    }

                    lambda *= growth;
                    growth *= 2.0;
                    if lambda > self.config.max_lambda {
                        break Some(IterationStatus::Failed(
                            "Failed to decrease cost, and lambda reached maximum".to_string(),
                        ));
                    }
                };

                if let Some(status) = outcome {
                    break status;
                }
            }
        };

        let (success, message) = match status {
            IterationStatus::Converged(message) => (true, message),
            IterationStatus::Failed(message) => (false, message),
        };
        debug!(
            "LM finished after {} iterations ({} evaluations): {}",
            iterations, func_evals, message
        );

        let jacobian = if self.config.calc_jacobian {
            Some(problem.jacobian(&params)?)
        } else {
            None
        };

        Ok(LmResult {
            params,
            residuals,
            cost,
            iterations,
            func_evals,
            success,
            message,
            jacobian,
        })
    }

    /// Minimize with box constraints on every parameter.
    ///
    /// `initial_params` and the returned parameters are external (bounded)
    /// values; the iteration itself runs on the internal parameters of a
    /// [`BoundedProblem`]. When `calc_jacobian` is set, the returned Jacobian
    /// is taken with respect to the external parameters.
    pub fn minimize_bounded<P: Problem + ?Sized>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
        bounds: &[Bounds],
    ) -> Result<LmResult> {
        let bounded = BoundedProblem::new(problem, bounds)?;
        let internal = bounded.to_internal(&initial_params)?;

        let inner = LevenbergMarquardt::with_config(LmConfig {
            calc_jacobian: false,
            ..self.config.clone()
        });
        let result = inner.minimize(&bounded, internal)?;

        let params = bounded.to_external(&result.params);
        let jacobian = if self.config.calc_jacobian {
            Some(problem.jacobian(&params)?)
        } else {
            None
        };

        Ok(LmResult {
            params,
            jacobian,
            ..result
        })
    }
}

fn sum_of_squares(residuals: &Array1<f64>) -> f64 {
    residuals.iter().map(|r| r * r).sum()
}

/// Solve `(H + λ·D) δ = −g`, with `D` the damping scale floored at
/// [`MIN_DIAGONAL`].
///
/// Returns `None` when the damped matrix is not positive definite or the
/// solution is not finite.
fn damped_step(
    hessian: &Array2<f64>,
    scale: &Array1<f64>,
    gradient: &Array1<f64>,
    lambda: f64,
) -> Option<Array1<f64>> {
    let mut a = ndarray_to_nalgebra(hessian);
    for (i, d) in scale.iter().enumerate() {
        a[(i, i)] += lambda * d.max(MIN_DIAGONAL);
    }

    let rhs = -ndarray_vec_to_nalgebra(gradient);
    let step = a.cholesky()?.solve(&rhs);

    if step.iter().all(|s| s.is_finite()) {
        Some(nalgebra_vec_to_ndarray(&step))
    } else {
        None
    }
}

/// Cost reduction the quadratic model promises for `step`:
/// `−(2 gᵀδ + δᵀHδ)`.
fn predicted_reduction(hessian: &Array2<f64>, gradient: &Array1<f64>, step: &Array1<f64>) -> f64 {
    -(2.0 * gradient.dot(step) + step.dot(&hessian.dot(step)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    /// A simple linear model for testing: f(x) = a * x + b
    struct LinearModel {
        x_data: Array1<f64>,
        y_data: Array1<f64>,
    }

    impl Problem for LinearModel {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            let (a, b) = (params[0], params[1]);
            Ok(self
                .x_data
                .iter()
                .zip(self.y_data.iter())
                .map(|(x, y)| a * x + b - y)
                .collect())
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            self.x_data.len()
        }

        fn jacobian(&self, _params: &Array1<f64>) -> Result<Array2<f64>> {
            let n = self.x_data.len();
            let mut jac = Array2::zeros((n, 2));
            for i in 0..n {
                jac[[i, 0]] = self.x_data[i];
                jac[[i, 1]] = 1.0;
            }
            Ok(jac)
        }

        fn has_custom_jacobian(&self) -> bool {
            true
        }
    }

    /// Rosenbrock as residuals: (1 - x, 10 (y - x²)), finite-difference Jacobian
    struct Rosenbrock;

    impl Problem for Rosenbrock {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            let (x, y) = (params[0], params[1]);
            Ok(array![1.0 - x, 10.0 * (y - x * x)])
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            2
        }
    }

    #[test]
    fn test_linear_fit() {
        // Approximately 2x + 3
        let model = LinearModel {
            x_data: array![1.0, 2.0, 3.0, 4.0, 5.0],
            y_data: array![5.1, 7.0, 8.9, 11.2, 13.0],
        };

        let result = LevenbergMarquardt::new()
            .minimize(&model, array![1.0, 1.0])
            .unwrap();

        assert!(result.success, "{}", result.message);
        assert_relative_eq!(result.params[0], 2.0, epsilon = 0.1);
        assert_relative_eq!(result.params[1], 3.0, epsilon = 0.2);
        assert!(result.cost < 0.1);
    }

    #[test]
    fn test_rosenbrock_with_finite_differences() {
        let result = LevenbergMarquardt::new()
            .with_max_iterations(200)
            .minimize(&Rosenbrock, array![-1.2, 1.0])
            .unwrap();

        assert!(result.success, "{}", result.message);
        assert_relative_eq!(result.params[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(result.params[1], 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_bounded_minimum_sits_on_the_bound() {
        // Unconstrained minimum is (1, 1); x is capped at 0.5.
        let bounds = [Bounds::new(-2.0, 0.5).unwrap(), Bounds::unbounded()];
        let result = LevenbergMarquardt::new()
            .with_max_iterations(500)
            .with_calc_jacobian(true)
            .minimize_bounded(&Rosenbrock, array![0.0, 0.0], &bounds)
            .unwrap();

        assert!(result.success, "{}", result.message);
        assert!(result.params[0] <= 0.5);
        assert_relative_eq!(result.params[0], 0.5, epsilon = 1e-3);
        assert_relative_eq!(result.params[1], 0.25, epsilon = 1e-3);
        assert_relative_eq!(result.cost, 0.25, epsilon = 1e-5);

        // Jacobian is reported in external coordinates.
        let jac = result.jacobian.unwrap();
        assert_relative_eq!(jac[[0, 0]], -1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_max_iterations_reports_failure() {
        let result = LevenbergMarquardt::new()
            .with_max_iterations(1)
            .minimize(&Rosenbrock, array![-1.2, 1.0])
            .unwrap();

        assert!(!result.success);
        assert!(result.message.contains("Maximum iterations"));
        assert_eq!(result.iterations, 1);
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = LevenbergMarquardt::new()
            .minimize(&Rosenbrock, array![1.0])
            .unwrap_err();
        assert!(matches!(err, FitError::DimensionMismatch(_)));

        let err = LevenbergMarquardt::new()
            .minimize_bounded(&Rosenbrock, array![1.0, 1.0], &[Bounds::unbounded()])
            .unwrap_err();
        assert!(matches!(err, FitError::DimensionMismatch(_)));
    }

    #[test]
    fn test_start_outside_bounds() {
        let bounds = [Bounds::new(0.0, 1.0).unwrap(), Bounds::unbounded()];
        let err = LevenbergMarquardt::new()
            .minimize_bounded(&Rosenbrock, array![2.0, 0.0], &bounds)
            .unwrap_err();
        assert!(matches!(err, FitError::Bounds(_)));
    }
}
