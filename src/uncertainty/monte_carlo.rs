//! # Monte Carlo Uncertainty Cross-Check
//!
//! Resamples the data around the best fit and refits each replica. The
//! spread of the refitted parameters is an estimate of their uncertainty that
//! does not rely on the linearization behind the covariance matrix, which
//! matters when a parameter sits close to one of its bounds.

use log::{debug, info};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;

use crate::data::Dataset;
use crate::error::{FitError, Result};
use crate::fit::{FitResult, PeakFitter};
use crate::model::Model;
use crate::models::PeakShape;

/// Distribution of one quantity across the converged refits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSummary {
    pub name: String,
    pub mean: f64,
    /// Sample standard deviation
    pub std: f64,
    /// 16th percentile
    pub p16: f64,
    pub median: f64,
    /// 84th percentile
    pub p84: f64,
}

impl ParameterSummary {
    fn from_samples(name: &str, samples: &mut [f64]) -> Self {
        samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let std = if samples.len() > 1 {
            (samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };

        Self {
            name: name.to_string(),
            mean,
            std,
            p16: percentile(samples, 0.16),
            median: percentile(samples, 0.50),
            p84: percentile(samples, 0.84),
        }
    }

    /// Half the 16–84 percentile range, the one-sigma width for a normal
    /// distribution.
    pub fn half_width(&self) -> f64 {
        0.5 * (self.p84 - self.p16)
    }
}

/// Result of [`monte_carlo_refit`].
#[derive(Debug, Clone, Serialize)]
pub struct MonteCarloResult {
    /// One entry per model parameter, in parameter-vector order.
    pub parameters: Vec<ParameterSummary>,
    /// FWHM of Gaussian fits.
    pub fwhm: Option<ParameterSummary>,
    pub n_samples: usize,
    pub n_converged: usize,
}

impl MonteCarloResult {
    /// Summary of the parameter called `name`.
    pub fn get(&self, name: &str) -> Option<&ParameterSummary> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// Linear interpolation between closest ranks of sorted `samples`.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + frac * (sorted[upper] - sorted[lower])
}

/// Refit `n_samples` synthetic replicas of `dataset`.
///
/// Each replica keeps the in-domain `x` values and errors of `dataset` and
/// draws `y* = f(x; best) + N(0, y_error)`. It is refitted with `fitter`,
/// starting from the best-fit parameters, and kept if the refit is valid.
///
/// # Arguments
///
/// * `fitter` - Fitter whose configuration produced `best`
/// * `dataset` - The measurements `best` was fitted to
/// * `best` - A valid fit result
/// * `n_samples` - Number of replicas to draw
/// * `rng` - Random source; a seeded generator makes runs reproducible
///
/// # Returns
///
/// Per-parameter summaries over the converged refits, plus the FWHM summary
/// for Gaussian fits. Fails with [`FitError::DidNotConverge`] if `best` is
/// not valid or no refit converged, and with [`FitError::InvalidInput`] if
/// `n_samples` is zero.
///
/// # Examples
///
/// ```
/// use fmr_fit::data::fmr;
/// use fmr_fit::uncertainty::monte_carlo_refit;
/// use fmr_fit::{PeakFitter, PeakShape};
/// use rand::SeedableRng;
/// use rand_chacha::ChaCha8Rng;
///
/// let data = fmr::dataset().unwrap();
/// let fitter = PeakFitter::for_shape(PeakShape::Gaussian);
/// let best = fitter.fit(&data).unwrap();
///
/// let mut rng = ChaCha8Rng::seed_from_u64(5);
/// let mc = monte_carlo_refit(&fitter, &data, &best, 25, &mut rng).unwrap();
/// assert_eq!(mc.n_samples, 25);
/// assert!(mc.get("center").unwrap().half_width() > 0.0);
/// ```
pub fn monte_carlo_refit<R: Rng + ?Sized>(
    fitter: &PeakFitter,
    dataset: &Dataset,
    best: &FitResult,
    n_samples: usize,
    rng: &mut R,
) -> Result<MonteCarloResult> {
    best.ensure_valid()?;
    if n_samples == 0 {
        return Err(FitError::InvalidInput(
            "Monte Carlo needs at least one sample".to_string(),
        ));
    }

    let data = dataset.restrict(&fitter.config().domain);
    let x = data.x().to_vec();
    let y_error = data.y_error().to_vec();
    let expected = best.shape.eval(&data.x(), &best.parameters.to_array())?;
    let noise = y_error
        .iter()
        .map(|&sigma| {
            Normal::new(0.0, sigma).map_err(|e| FitError::InvalidInput(e.to_string()))
        })
        .collect::<Result<Vec<_>>>()?;

    let names = best.shape.parameter_names();
    let mut samples: Vec<Vec<f64>> = vec![Vec::with_capacity(n_samples); names.len()];
    let mut fwhm_samples = Vec::new();

    for i in 0..n_samples {
        let y: Vec<f64> = expected
            .iter()
            .zip(&noise)
            .map(|(&f, normal)| f + normal.sample(rng))
            .collect();
        let replica = Dataset::from_columns(&x, &y, &y_error)?;

        let refit = fitter.fit_from(&replica, &best.parameters)?;
        if !refit.valid {
            debug!("Monte Carlo replica {} did not converge: {}", i, refit.message);
            continue;
        }

        for (column, value) in samples.iter_mut().zip(refit.parameters.to_array().iter()) {
            column.push(*value);
        }
        if best.shape == PeakShape::Gaussian {
            fwhm_samples.push(best.shape.fwhm(refit.parameters.width));
        }
    }

    let n_converged = samples[0].len();
    if n_converged == 0 {
        return Err(FitError::DidNotConverge(format!(
            "none of {} Monte Carlo refits converged",
            n_samples
        )));
    }
    info!("{} of {} Monte Carlo refits converged", n_converged, n_samples);

    let parameters: Vec<ParameterSummary> = names
        .iter()
        .zip(samples.iter_mut())
        .map(|(name, column)| ParameterSummary::from_samples(name, column))
        .collect();
    for summary in &parameters {
        debug!(
            "{}: mean = {:.5}, std = {:.5}, 16-84 half width = {:.5}",
            summary.name,
            summary.mean,
            summary.std,
            summary.half_width()
        );
    }
    let fwhm = (!fwhm_samples.is_empty())
        .then(|| ParameterSummary::from_samples("fwhm", &mut fwhm_samples));

    Ok(MonteCarloResult {
        parameters,
        fwhm,
        n_samples,
        n_converged,
    })
}
