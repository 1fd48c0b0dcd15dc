//! Resonance dip models on a linear background.
//!
//! Both shapes share the parameter vector `[a0, a1, A, μ, w]`:
//!
//! - Breit-Wigner: `f(x) = a0 + a1·x − A / ((x − μ)² + (Γ/2)²)`, with `w = Γ`
//! - Gaussian: `f(x) = a0 + a1·x − A·exp(−½((x − μ)/σ)²)`, with `w = σ`
//!
//! The amplitude `A` is non-negative and subtracted, so the peak is an
//! absorption dip below the background.

use crate::error::{FitError, Result};
use crate::model::Model;
use ndarray::{array, Array1};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `2·√(2·ln 2)`, the FWHM of a Gaussian of unit sigma.
pub const GAUSSIAN_FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949_3;

/// Full width at half maximum of a Gaussian with standard deviation `sigma`.
pub fn gaussian_fwhm(sigma: f64) -> f64 {
    GAUSSIAN_FWHM_PER_SIGMA * sigma
}

/// Parameter names, in parameter-vector order.
const PARAMETER_NAMES: [&str; 5] = ["a0", "a1", "amplitude", "center", "width"];

/// Index of the amplitude `A` in the parameter vector.
pub const AMPLITUDE: usize = 2;
/// Index of the center `μ` in the parameter vector.
pub const CENTER: usize = 3;
/// Index of the width (`Γ` or `σ`) in the parameter vector.
pub const WIDTH: usize = 4;

/// The lineshape of the resonance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeakShape {
    /// Lorentzian; the width parameter is the FWHM `Γ`.
    BreitWigner,
    /// The width parameter is the standard deviation `σ`.
    Gaussian,
}

impl PeakShape {
    /// Symbol of the width parameter.
    pub fn width_label(&self) -> &'static str {
        match self {
            PeakShape::BreitWigner => "Γ",
            PeakShape::Gaussian => "σ",
        }
    }

    /// FWHM of the peak for a given width parameter.
    pub fn fwhm(&self, width: f64) -> f64 {
        match self {
            PeakShape::BreitWigner => width,
            PeakShape::Gaussian => gaussian_fwhm(width),
        }
    }

    /// Value of the dip term alone (without the background) at `x`.
    pub fn dip(&self, x: f64, amplitude: f64, center: f64, width: f64) -> f64 {
        let dx = x - center;
        match self {
            PeakShape::BreitWigner => amplitude / (dx * dx + 0.25 * width * width),
            PeakShape::Gaussian => {
                let u = dx / width;
                amplitude * (-0.5 * u * u).exp()
            }
        }
    }
}

impl fmt::Display for PeakShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeakShape::BreitWigner => write!(f, "Breit-Wigner"),
            PeakShape::Gaussian => write!(f, "Gaussian"),
        }
    }
}

impl Model for PeakShape {
    fn parameter_names(&self) -> &'static [&'static str] {
        &PARAMETER_NAMES
    }

    fn value(&self, x: f64, params: &Array1<f64>) -> f64 {
        params[0] + params[1] * x - self.dip(x, params[AMPLITUDE], params[CENTER], params[WIDTH])
    }

    fn gradient(&self, x: f64, params: &Array1<f64>) -> Option<Array1<f64>> {
        let (amplitude, center, width) = (params[AMPLITUDE], params[CENTER], params[WIDTH]);
        let dx = x - center;

        let grad = match self {
            PeakShape::BreitWigner => {
                let d = dx * dx + 0.25 * width * width;
                let d2 = d * d;
                array![
                    1.0,
                    x,
                    -1.0 / d,
                    -2.0 * amplitude * dx / d2,
                    0.5 * amplitude * width / d2
                ]
            }
            PeakShape::Gaussian => {
                let u = dx / width;
                let e = (-0.5 * u * u).exp();
                array![
                    1.0,
                    x,
                    -e,
                    -amplitude * e * u / width,
                    -amplitude * e * u * u / width
                ]
            }
        };

        Some(grad)
    }

    fn has_gradient(&self) -> bool {
        true
    }
}

/// Named view of the five peak parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakParams {
    /// Background intercept
    pub a0: f64,
    /// Background slope
    pub a1: f64,
    /// Dip amplitude `A`
    pub amplitude: f64,
    /// Dip center `μ`
    pub center: f64,
    /// `Γ` for Breit-Wigner, `σ` for Gaussian
    pub width: f64,
}

impl PeakParams {
    pub fn new(a0: f64, a1: f64, amplitude: f64, center: f64, width: f64) -> Self {
        Self {
            a0,
            a1,
            amplitude,
            center,
            width,
        }
    }

    pub fn to_array(&self) -> Array1<f64> {
        array![self.a0, self.a1, self.amplitude, self.center, self.width]
    }

    pub fn from_array(params: &Array1<f64>) -> Result<Self> {
        match params.as_slice() {
            Some(&[a0, a1, amplitude, center, width]) => {
                Ok(Self::new(a0, a1, amplitude, center, width))
            }
            _ => Err(FitError::DimensionMismatch(format!(
                "Expected 5 peak parameters, got {}",
                params.len()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelProblem;
    use crate::problem::Problem;
    use crate::utils::finite_difference;
    use approx::assert_relative_eq;

    #[test]
    fn test_breit_wigner_at_center() {
        let p = PeakParams::new(3.0, 0.1, 470.0, 320.0, 7.5);
        let expected = 3.0 + 0.1 * 320.0 - 470.0 / (7.5_f64 / 2.0).powi(2);
        assert_relative_eq!(
            PeakShape::BreitWigner.value(320.0, &p.to_array()),
            expected,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_gaussian_at_center_and_one_sigma() {
        let p = PeakParams::new(30.0, 0.0, 28.0, 320.0, 3.0).to_array();
        assert_relative_eq!(PeakShape::Gaussian.value(320.0, &p), 2.0, epsilon = 1e-12);
        assert_relative_eq!(
            PeakShape::Gaussian.value(323.0, &p),
            30.0 - 28.0 * (-0.5_f64).exp(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_width_label() {
        assert_eq!(PeakShape::BreitWigner.width_label(), "Γ");
        assert_eq!(PeakShape::Gaussian.width_label(), "σ");
    }

    #[test]
    fn test_fwhm_conversion() {
        assert_relative_eq!(gaussian_fwhm(5.0), 11.774, epsilon = 1e-3);
        assert_relative_eq!(
            GAUSSIAN_FWHM_PER_SIGMA,
            2.0 * (2.0 * 2.0_f64.ln()).sqrt(),
            epsilon = 1e-15
        );
        assert_eq!(PeakShape::BreitWigner.fwhm(7.0), 7.0);
        assert_relative_eq!(PeakShape::Gaussian.fwhm(5.0), gaussian_fwhm(5.0));
    }

    #[test]
    fn test_gaussian_half_maximum_at_half_fwhm() {
        let sigma = 4.0;
        let p = PeakParams::new(0.0, 0.0, 10.0, 0.0, sigma).to_array();
        let half = gaussian_fwhm(sigma) / 2.0;
        assert_relative_eq!(PeakShape::Gaussian.value(half, &p), -5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_analytic_gradient_matches_finite_differences() {
        let x = Array1::linspace(300.0, 340.0, 9);
        let n = x.len();
        let cases = [
            (PeakShape::BreitWigner, PeakParams::new(-0.3, 0.105, 472.8, 320.2, 7.7)),
            (PeakShape::Gaussian, PeakParams::new(3.1, 0.085, 27.9, 320.1, 3.3)),
        ];

        for (shape, params) in cases {
            let problem = ModelProblem::new(
                &shape,
                x.clone(),
                Array1::zeros(n),
                Array1::from_elem(n, 1.0),
            )
            .unwrap();
            let p = params.to_array();

            let analytic = problem.jacobian(&p).unwrap();
            let numeric = finite_difference::jacobian_central(&problem, &p, None).unwrap();
            for i in 0..n {
                for j in 0..5 {
                    assert_relative_eq!(
                        analytic[[i, j]],
                        numeric[[i, j]],
                        epsilon = 1e-5,
                        max_relative = 1e-5
                    );
                }
            }
        }
    }

    #[test]
    fn test_params_array_round_trip() {
        let p = PeakParams::new(1.0, 2.0, 3.0, 4.0, 5.0);
        assert_eq!(PeakParams::from_array(&p.to_array()).unwrap(), p);
        assert!(matches!(
            PeakParams::from_array(&array![1.0, 2.0]),
            Err(FitError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_shape_serializes_in_snake_case() {
        assert_eq!(
            serde_json::to_string(&PeakShape::BreitWigner).unwrap(),
            "\"breit_wigner\""
        );
        assert_eq!(PeakShape::Gaussian.to_string(), "Gaussian");
    }
}
