//! Configuration options for the Levenberg-Marquardt algorithm.

use serde::{Deserialize, Serialize};

/// Configuration options for the Levenberg-Marquardt algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmConfig {
    /// Maximum number of iterations. Default: 100
    pub max_iterations: usize,

    /// Tolerance for the relative cost reduction of an accepted step. Default: 1e-8
    pub ftol: f64,

    /// Tolerance for change in parameter values, relative to their magnitude. Default: 1e-8
    pub xtol: f64,

    /// Tolerance for the infinity norm of the gradient. Default: 1e-8
    pub gtol: f64,

    /// Initial value for the damping parameter. Default: 1e-3
    pub initial_lambda: f64,

    /// Factor applied to lambda on the first rejected step of an iteration;
    /// it doubles on each further rejection. Default: 10.0
    pub lambda_up_factor: f64,

    /// Smallest factor lambda shrinks by after an accepted step. Steps the
    /// quadratic model predicted poorly shrink it less. Default: 0.1
    pub lambda_down_factor: f64,

    /// Minimum value for lambda. Default: 1e-10
    pub min_lambda: f64,

    /// Maximum value for lambda. Default: 1e10
    pub max_lambda: f64,

    /// Whether to calculate and return the Jacobian at the solution. Default: false
    pub calc_jacobian: bool,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-8,
            initial_lambda: 1e-3,
            lambda_up_factor: 10.0,
            lambda_down_factor: 0.1,
            min_lambda: 1e-10,
            max_lambda: 1e10,
            calc_jacobian: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: LmConfig = serde_json::from_str(r#"{"max_iterations": 500}"#).unwrap();
        assert_eq!(config.max_iterations, 500);
        assert_eq!(config.ftol, 1e-8);
        assert_eq!(config.lambda_up_factor, 10.0);
        assert!(!config.calc_jacobian);
    }
}
