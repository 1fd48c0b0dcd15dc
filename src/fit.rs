//! Peak fitting.
//!
//! [`PeakFitter`] runs a bound-constrained, error-weighted Levenberg-Marquardt
//! fit of a [`PeakShape`] to the points of a [`Dataset`] that fall inside the
//! configured [`FitDomain`], and reports a [`FitResult`].

use std::fmt;

use log::{debug, info, warn};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::data::Dataset;
use crate::error::{FitError, Result};
use crate::lm::{LevenbergMarquardt, LmConfig};
use crate::model::{Model, ModelProblem};
use crate::models::peak::{AMPLITUDE, WIDTH};
use crate::models::{LinearBackground, PeakParams, PeakShape};
use crate::parameters::Bounds;
use crate::uncertainty::{calculate_covariance, standard_errors_from_covariance};

/// Number of free parameters in a peak fit.
pub const N_PARAMETERS: usize = 5;

/// Closed interval of `x` values that take part in a fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitDomain {
    pub min: f64,
    pub max: f64,
}

impl FitDomain {
    /// Create a domain; both ends must be finite with `min < max`.
    pub fn new(min: f64, max: f64) -> Result<Self> {
        let domain = Self { min, max };
        domain.validate()?;
        Ok(domain)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min.is_finite() && self.max.is_finite() && self.min < self.max {
            Ok(())
        } else {
            Err(FitError::InvalidInput(format!(
                "Fit domain [{}, {}] must be finite with min < max",
                self.min, self.max
            )))
        }
    }

    pub fn contains(&self, x: f64) -> bool {
        x >= self.min && x <= self.max
    }
}

impl Default for FitDomain {
    fn default() -> Self {
        Self {
            min: 280.0,
            max: 350.0,
        }
    }
}

/// A value with its one-sigma uncertainty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub value: f64,
    pub error: f64,
}

impl Estimate {
    pub fn new(value: f64, error: f64) -> Self {
        Self { value, error }
    }
}

impl fmt::Display for Estimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match f.precision() {
            Some(p) => write!(f, "{:.*} ± {:.*}", p, self.value, p, self.error),
            None => write!(f, "{} ± {}", self.value, self.error),
        }
    }
}

/// Everything a peak fit needs besides the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    pub shape: PeakShape,
    /// Only points inside this domain are fitted.
    pub domain: FitDomain,
    /// Starting values; each must lie inside its bounds.
    pub initial: PeakParams,
    pub amplitude_bounds: Bounds,
    pub width_bounds: Bounds,
    pub optimizer: LmConfig,
    /// Multiply the covariance by the reduced chi-square. Default: false
    pub scale_covariance: bool,
}

impl FitConfig {
    /// Starting values and bounds for the FMR scan.
    pub fn for_shape(shape: PeakShape) -> Self {
        let (initial, width_max) = match shape {
            PeakShape::BreitWigner => (PeakParams::new(30.0, 0.0, 175.0, 321.0, 10.0), 30.0),
            PeakShape::Gaussian => (PeakParams::new(30.0, 0.0, 30.0, 321.0, 5.0), 20.0),
        };

        Self {
            shape,
            domain: FitDomain::default(),
            initial,
            amplitude_bounds: Bounds {
                min: 0.0,
                max: 10000.0,
            },
            width_bounds: Bounds {
                min: 1.0,
                max: width_max,
            },
            optimizer: LmConfig {
                max_iterations: 500,
                ..LmConfig::default()
            },
            scale_covariance: false,
        }
    }

    pub fn with_domain(mut self, domain: FitDomain) -> Self {
        self.domain = domain;
        self
    }

    pub fn with_initial(mut self, initial: PeakParams) -> Self {
        self.initial = initial;
        self
    }

    pub fn with_amplitude_bounds(mut self, bounds: Bounds) -> Self {
        self.amplitude_bounds = bounds;
        self
    }

    pub fn with_width_bounds(mut self, bounds: Bounds) -> Self {
        self.width_bounds = bounds;
        self
    }

    pub fn with_optimizer(mut self, optimizer: LmConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.optimizer.max_iterations = max_iterations;
        self
    }

    pub fn with_scale_covariance(mut self, scale: bool) -> Self {
        self.scale_covariance = scale;
        self
    }

    /// Bounds for the full parameter vector; background and center are free.
    pub fn bounds(&self) -> [Bounds; N_PARAMETERS] {
        let mut bounds = [Bounds::unbounded(); N_PARAMETERS];
        bounds[AMPLITUDE] = self.amplitude_bounds;
        bounds[WIDTH] = self.width_bounds;
        bounds
    }
}

/// Outcome of a peak fit.
///
/// When `valid` is false the parameter values are the optimizer's last
/// iterate and must not be used; [`FitResult::ensure_valid`] turns that into
/// an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    pub shape: PeakShape,
    pub parameters: PeakParams,
    /// One-sigma errors, NaN when the covariance could not be computed.
    pub parameter_errors: PeakParams,
    pub chi_square: f64,
    pub degrees_of_freedom: usize,
    /// FWHM with its propagated error; Gaussian fits only.
    pub derived_fwhm: Option<Estimate>,
    pub valid: bool,
    /// Number of points inside the domain.
    pub n_points: usize,
    pub iterations: usize,
    pub message: String,
    pub domain: FitDomain,
    #[serde(skip)]
    pub covariance: Option<Array2<f64>>,
}

impl FitResult {
    /// `chi_square / degrees_of_freedom`.
    pub fn reduced_chi_square(&self) -> Result<f64> {
        if self.degrees_of_freedom == 0 {
            return Err(FitError::DegenerateDof {
                points: self.n_points,
                parameters: N_PARAMETERS,
            });
        }
        Ok(self.chi_square / self.degrees_of_freedom as f64)
    }

    /// The background part of the fitted model.
    pub fn background(&self) -> LinearBackground {
        LinearBackground::new(self.parameters.a0, self.parameters.a1)
    }

    /// Fitted model at `x`.
    pub fn value(&self, x: f64) -> f64 {
        self.shape.value(x, &self.parameters.to_array())
    }

    pub fn center(&self) -> Estimate {
        Estimate::new(self.parameters.center, self.parameter_errors.center)
    }

    pub fn width(&self) -> Estimate {
        Estimate::new(self.parameters.width, self.parameter_errors.width)
    }

    pub fn amplitude(&self) -> Estimate {
        Estimate::new(self.parameters.amplitude, self.parameter_errors.amplitude)
    }

    pub fn ensure_valid(&self) -> Result<&Self> {
        if self.valid {
            Ok(self)
        } else {
            Err(FitError::DidNotConverge(self.message.clone()))
        }
    }
}

impl fmt::Display for FitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} fit on [{}, {}] mT", self.shape, self.domain.min, self.domain.max)?;
        writeln!(f, "  Valid: {} ({})", self.valid, self.message)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(
            f,
            "  Chi-square: {:.4} / {} dof",
            self.chi_square, self.degrees_of_freedom
        )?;
        if let Ok(redchi) = self.reduced_chi_square() {
            writeln!(f, "  Reduced chi-square: {:.4}", redchi)?;
        }

        let names = self.shape.parameter_names();
        let values = self.parameters.to_array();
        let errors = self.parameter_errors.to_array();
        for ((name, value), error) in names.iter().zip(values.iter()).zip(errors.iter()) {
            writeln!(f, "  {:<10} {:>12.5} ± {:.5}", name, value, error)?;
        }
        if let Some(fwhm) = self.derived_fwhm {
            writeln!(f, "  {:<10} {:>12.5} ± {:.5}", "fwhm", fwhm.value, fwhm.error)?;
        }
        Ok(())
    }
}

/// Fits one [`PeakShape`] with a fixed [`FitConfig`].
#[derive(Debug, Clone)]
pub struct PeakFitter {
    config: FitConfig,
}

impl PeakFitter {
    pub fn new(config: FitConfig) -> Self {
        Self { config }
    }

    /// A fitter with [`FitConfig::for_shape`].
    pub fn for_shape(shape: PeakShape) -> Self {
        Self::new(FitConfig::for_shape(shape))
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Fit `dataset` starting from the configured initial values.
    pub fn fit(&self, dataset: &Dataset) -> Result<FitResult> {
        self.fit_from(dataset, &self.config.initial)
    }

    /// Fit `dataset` starting from `initial`.
    ///
    /// # Arguments
    ///
    /// * `dataset` - Measurements; only points inside the configured domain take part
    /// * `initial` - Starting values, each inside its configured bounds
    ///
    /// # Returns
    ///
    /// The [`FitResult`]. An optimizer that stops without converging, or a
    /// singular covariance, gives a result with `valid == false` rather than
    /// an error. Errors are reserved for malformed input:
    /// [`FitError::InvalidInput`] for a bad domain, [`FitError::DegenerateDof`]
    /// for five or fewer points in the domain and [`FitError::Bounds`] for a
    /// starting value outside its bounds.
    ///
    /// # Examples
    ///
    /// ```
    /// use fmr_fit::data::fmr;
    /// use fmr_fit::{PeakFitter, PeakParams, PeakShape};
    ///
    /// let data = fmr::dataset().unwrap();
    /// let fitter = PeakFitter::for_shape(PeakShape::BreitWigner);
    /// let start = PeakParams::new(30.0, 0.0, 300.0, 320.0, 8.0);
    /// let fit = fitter.fit_from(&data, &start).unwrap();
    /// assert!(fit.valid);
    /// assert!((fit.parameters.center - 320.16).abs() < 0.1);
    /// ```
    pub fn fit_from(&self, dataset: &Dataset, initial: &PeakParams) -> Result<FitResult> {
        let config = &self.config;
        config.domain.validate()?;

        let data = dataset.restrict(&config.domain);
        let n_points = data.len();
        if n_points <= N_PARAMETERS {
            return Err(FitError::DegenerateDof {
                points: n_points,
                parameters: N_PARAMETERS,
            });
        }
        let dof = n_points - N_PARAMETERS;

        let bounds = config.bounds();
        let start = initial.to_array();
        for (bound, &value) in bounds.iter().zip(start.iter()) {
            bound.check(value)?;
        }

        let problem = ModelProblem::new(&config.shape, data.x(), data.y(), data.y_error())?;
        let optimizer = LevenbergMarquardt::with_config(config.optimizer.clone())
            .with_calc_jacobian(true);
        debug!(
            "fitting {} to {} points in [{}, {}]",
            config.shape, n_points, config.domain.min, config.domain.max
        );
        let result = optimizer.minimize_bounded(&problem, start, &bounds)?;

        let chi_square = result.cost;
        let scale = if config.scale_covariance {
            chi_square / dof as f64
        } else {
            1.0
        };

        let covariance = match &result.jacobian {
            Some(jacobian) => match calculate_covariance(jacobian, scale) {
                Ok(covariance) => Some(covariance),
                Err(FitError::SingularMatrix) => None,
                Err(e) => return Err(e),
            },
            None => None,
        };
        let errors = match &covariance {
            Some(covariance) => standard_errors_from_covariance(covariance),
            None => ndarray::Array1::from_elem(N_PARAMETERS, f64::NAN),
        };

        let mut message = result.message;
        let mut valid = result.success;
        if valid && covariance.is_none() {
            valid = false;
            message = format!("{}; covariance matrix is singular", message);
        }
        if valid && errors.iter().any(|e| !e.is_finite()) {
            valid = false;
            message = format!("{}; parameter errors are not finite", message);
        }

        let parameters = PeakParams::from_array(&result.params)?;
        let parameter_errors = PeakParams::from_array(&errors)?;
        let derived_fwhm = match config.shape {
            PeakShape::Gaussian if valid => Some(Estimate::new(
                config.shape.fwhm(parameters.width),
                config.shape.fwhm(parameter_errors.width),
            )),
            _ => None,
        };

        let fit = FitResult {
            shape: config.shape,
            parameters,
            parameter_errors,
            chi_square,
            degrees_of_freedom: dof,
            derived_fwhm,
            valid,
            n_points,
            iterations: result.iterations,
            message,
            domain: config.domain,
            covariance,
        };

        if fit.valid {
            info!(
                "{} fit converged after {} iterations: μ = {:.2}, {} = {:.2}, chi2/ndf = {:.2}",
                fit.shape,
                fit.iterations,
                fit.center(),
                fit.shape.width_label(),
                fit.width(),
                fit.chi_square / dof as f64
            );
        } else {
            warn!("{} fit is not valid: {}", fit.shape, fit.message);
        }

        Ok(fit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fmr;
    use crate::models::peak::CENTER;
    use approx::assert_relative_eq;

    #[test]
    fn test_domain_validation() {
        assert!(FitDomain::new(280.0, 350.0).is_ok());
        assert!(matches!(
            FitDomain::new(350.0, 280.0),
            Err(FitError::InvalidInput(_))
        ));
        assert!(FitDomain::new(f64::NEG_INFINITY, 0.0).is_err());
        assert!(FitDomain::new(1.0, 1.0).is_err());

        let domain = FitDomain::default();
        assert!(domain.contains(280.0));
        assert!(domain.contains(350.0));
        assert!(!domain.contains(350.1));
    }

    #[test]
    fn test_presets() {
        let bw = FitConfig::for_shape(PeakShape::BreitWigner);
        assert_eq!(bw.initial, PeakParams::new(30.0, 0.0, 175.0, 321.0, 10.0));
        assert_eq!(bw.width_bounds, Bounds::new(1.0, 30.0).unwrap());
        assert_eq!(bw.optimizer.max_iterations, 500);

        let gauss = FitConfig::for_shape(PeakShape::Gaussian);
        assert_eq!(gauss.initial, PeakParams::new(30.0, 0.0, 30.0, 321.0, 5.0));
        assert_eq!(gauss.width_bounds, Bounds::new(1.0, 20.0).unwrap());
        assert_eq!(gauss.amplitude_bounds, Bounds::new(0.0, 10000.0).unwrap());
        assert_eq!(gauss.domain, FitDomain::default());

        let bounds = gauss.bounds();
        assert_eq!(bounds[0], Bounds::unbounded());
        assert_eq!(bounds[CENTER], Bounds::unbounded());
        assert_eq!(bounds[WIDTH].max, 20.0);
    }

    #[test]
    fn test_gaussian_fit_of_fmr_scan() {
        let data = fmr::dataset().unwrap();
        let fit = PeakFitter::for_shape(PeakShape::Gaussian).fit(&data).unwrap();

        assert!(fit.valid, "{}", fit.message);
        assert_eq!(fit.n_points, 18);
        assert_eq!(fit.degrees_of_freedom, 13);
        assert_relative_eq!(fit.parameters.center, 320.078, epsilon = 0.01);
        assert_relative_eq!(fit.parameters.width, 3.278, epsilon = 0.01);
        assert_relative_eq!(fit.chi_square, 40.605, epsilon = 0.01);
        assert_relative_eq!(
            fit.reduced_chi_square().unwrap(),
            fit.chi_square / 13.0,
            epsilon = 1e-12
        );

        let fwhm = fit.derived_fwhm.unwrap();
        assert_relative_eq!(fwhm.value, 7.72, epsilon = 0.02);
        assert_relative_eq!(
            fwhm.error,
            GAUSSIAN_FWHM * fit.parameter_errors.width,
            epsilon = 1e-12
        );
    }

    const GAUSSIAN_FWHM: f64 = crate::models::GAUSSIAN_FWHM_PER_SIGMA;

    #[test]
    fn test_breit_wigner_fit_of_fmr_scan() {
        let data = fmr::dataset().unwrap();
        let fit = PeakFitter::for_shape(PeakShape::BreitWigner).fit(&data).unwrap();

        assert!(fit.valid, "{}", fit.message);
        assert_relative_eq!(fit.parameters.center, 320.158, epsilon = 0.01);
        assert_relative_eq!(fit.parameters.width, 7.663, epsilon = 0.01);
        assert_relative_eq!(fit.chi_square, 29.105, epsilon = 0.01);
        assert!(fit.derived_fwhm.is_none());

        // Unscaled covariance: errors from inv(JᵀJ) of the weighted residuals.
        assert_relative_eq!(fit.parameter_errors.center, 0.0892, epsilon = 1e-3);
        assert_relative_eq!(fit.parameter_errors.width, 0.382, epsilon = 2e-3);
    }

    #[test]
    fn test_scaled_covariance() {
        let data = fmr::dataset().unwrap();
        let plain = PeakFitter::for_shape(PeakShape::Gaussian).fit(&data).unwrap();
        let scaled = PeakFitter::new(
            FitConfig::for_shape(PeakShape::Gaussian).with_scale_covariance(true),
        )
        .fit(&data)
        .unwrap();

        let redchi = plain.reduced_chi_square().unwrap();
        assert_relative_eq!(
            scaled.parameter_errors.center,
            plain.parameter_errors.center * redchi.sqrt(),
            max_relative = 1e-6
        );
    }

    #[test]
    fn test_too_few_points_in_domain() {
        let data = fmr::dataset().unwrap();
        // 301.1, 303.6, 305.1 and 307.7 mT
        let config = FitConfig::for_shape(PeakShape::Gaussian)
            .with_domain(FitDomain::new(280.0, 308.0).unwrap());

        match PeakFitter::new(config).fit(&data) {
            Err(FitError::DegenerateDof { points, parameters }) => {
                assert_eq!(points, 4);
                assert_eq!(parameters, 5);
            }
            other => panic!("expected DegenerateDof, got {:?}", other),
        }
    }

    #[test]
    fn test_initial_value_outside_bounds() {
        let data = fmr::dataset().unwrap();
        let config = FitConfig::for_shape(PeakShape::Gaussian)
            .with_initial(PeakParams::new(30.0, 0.0, 30.0, 321.0, 25.0));

        assert!(matches!(
            PeakFitter::new(config).fit(&data),
            Err(FitError::Bounds(_))
        ));
    }

    #[test]
    fn test_iteration_budget_exhausted() {
        let data = fmr::dataset().unwrap();
        let config = FitConfig::for_shape(PeakShape::BreitWigner).with_max_iterations(1);
        let fit = PeakFitter::new(config).fit(&data).unwrap();

        assert!(!fit.valid);
        assert!(matches!(
            fit.ensure_valid(),
            Err(FitError::DidNotConverge(_))
        ));
    }

    #[test]
    fn test_background_and_value() {
        let data = fmr::dataset().unwrap();
        let fit = PeakFitter::for_shape(PeakShape::BreitWigner).fit(&data).unwrap();
        let p = fit.parameters;

        let bg = fit.background();
        assert_eq!(bg.intercept, p.a0);
        assert_eq!(bg.slope, p.a1);

        let half_width = p.width / 2.0;
        assert_relative_eq!(
            fit.value(p.center),
            p.a0 + p.a1 * p.center - p.amplitude / (half_width * half_width),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_estimate_display() {
        let e = Estimate::new(320.0779, 0.0872);
        assert_eq!(format!("{:.2}", e), "320.08 ± 0.09");
    }
}
