//! Finite difference methods for numerical differentiation.

use crate::error::{FitError, Result};
use crate::problem::Problem;
use ndarray::{Array1, Array2};

/// Default relative step size for finite differences.
const DEFAULT_EPSILON: f64 = 1e-8;

/// Step for parameter `j`, scaled to the parameter's magnitude.
fn step_size(param: f64, eps: f64) -> f64 {
    if param.abs() > eps {
        param.abs() * eps
    } else {
        eps
    }
}

fn check_residual_count(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(FitError::DimensionMismatch(format!(
            "Expected {} residuals, got {}",
            expected, got
        )));
    }
    Ok(())
}

/// Compute the Jacobian matrix using forward finite differences.
///
/// `J[i, j] = ∂residual[i] / ∂param[j]`. `epsilon` is the relative step,
/// defaulting to `1e-8`.
pub fn jacobian<P: Problem + ?Sized>(
    problem: &P,
    params: &Array1<f64>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>> {
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON);
    let n_params = params.len();
    let n_residuals = problem.residual_count();

    let residuals = problem.eval(params)?;
    check_residual_count(n_residuals, residuals.len())?;

    let mut jac = Array2::zeros((n_residuals, n_params));
    for j in 0..n_params {
        let eps_j = step_size(params[j], eps);
        let mut perturbed = params.clone();
        perturbed[j] += eps_j;

        let residuals_perturbed = problem.eval(&perturbed)?;
        check_residual_count(n_residuals, residuals_perturbed.len())?;

        for i in 0..n_residuals {
            jac[[i, j]] = (residuals_perturbed[i] - residuals[i]) / eps_j;
        }
    }

    Ok(jac)
}

/// Compute the Jacobian matrix using central finite differences.
///
/// Twice the evaluations of [`jacobian`], second-order accurate.
pub fn jacobian_central<P: Problem + ?Sized>(
    problem: &P,
    params: &Array1<f64>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>> {
    let eps = epsilon.unwrap_or(1e-6);
    let n_params = params.len();
    let n_residuals = problem.residual_count();

    let mut jac = Array2::zeros((n_residuals, n_params));
    for j in 0..n_params {
        let eps_j = step_size(params[j], eps);

        let mut forward = params.clone();
        forward[j] += eps_j;
        let mut backward = params.clone();
        backward[j] -= eps_j;

        let r_forward = problem.eval(&forward)?;
        let r_backward = problem.eval(&backward)?;
        check_residual_count(n_residuals, r_forward.len())?;
        check_residual_count(n_residuals, r_backward.len())?;

        for i in 0..n_residuals {
            jac[[i, j]] = (r_forward[i] - r_backward[i]) / (2.0 * eps_j);
        }
    }

    Ok(jac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    /// r_i = p0 * exp(p1 * x_i)
    struct ExpProblem {
        x: Array1<f64>,
    }

    impl Problem for ExpProblem {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            Ok(self.x.mapv(|x| params[0] * (params[1] * x).exp()))
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            self.x.len()
        }
    }

    #[test]
    fn test_forward_and_central_agree_with_analytic() {
        let problem = ExpProblem {
            x: array![0.0, 0.5, 1.0, 2.0],
        };
        let params = array![1.5, -0.7];

        let forward = jacobian(&problem, &params, None).unwrap();
        let central = jacobian_central(&problem, &params, None).unwrap();

        for (i, &x) in problem.x.iter().enumerate() {
            let e = (params[1] * x).exp();
            assert_relative_eq!(forward[[i, 0]], e, epsilon = 1e-6);
            assert_relative_eq!(forward[[i, 1]], params[0] * x * e, epsilon = 1e-6);
            assert_relative_eq!(central[[i, 0]], e, epsilon = 1e-8);
            assert_relative_eq!(central[[i, 1]], params[0] * x * e, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_residual_count_mismatch() {
        struct Liar;
        impl Problem for Liar {
            fn eval(&self, _params: &Array1<f64>) -> Result<Array1<f64>> {
                Ok(array![1.0, 2.0])
            }
            fn parameter_count(&self) -> usize {
                1
            }
            fn residual_count(&self) -> usize {
                3
            }
        }

        let err = jacobian(&Liar, &array![0.0], None).unwrap_err();
        assert!(matches!(err, FitError::DimensionMismatch(_)));
    }
}
