//! # fmr-fit
//!
//! Lineshape fits of ferromagnetic resonance (FMR) scans: a Breit-Wigner or
//! Gaussian absorption dip on a linear background, fitted by bound-constrained,
//! error-weighted Levenberg-Marquardt least squares.
//!
//! The library provides:
//! - [`Dataset`] construction from raw magnet currents through a [`Calibration`]
//! - [`PeakFitter`] with its [`FitConfig`], producing a [`FitResult`] with
//!   parameter errors, chi-square and the Gaussian FWHM
//! - a Monte Carlo refit to cross-check the covariance errors
//! - a [`PlotSpec`](plot::PlotSpec) figure description and PNG/SVG rendering
//!   (feature `plot`)
//!
//! ## Basic Usage
//!
//! ```
//! use fmr_fit::{data::fmr, PeakFitter, PeakShape};
//!
//! let data = fmr::dataset().unwrap();
//! let fit = PeakFitter::for_shape(PeakShape::Gaussian).fit(&data).unwrap();
//! fit.ensure_valid().unwrap();
//!
//! let fwhm = fit.derived_fwhm.unwrap();
//! assert!(fwhm.value > 5.0 && fwhm.value < 25.0);
//! ```

pub mod data;
pub mod error;
pub mod fit;
pub mod lm;
pub mod model;
pub mod models;
pub mod parameters;
pub mod problem;
pub mod uncertainty;
pub mod utils;

#[cfg(feature = "plot")]
pub mod plot;

// Re-exports for convenience
pub use data::{Calibration, Dataset, Measurement};
pub use error::{FitError, Result};
pub use fit::{Estimate, FitConfig, FitDomain, FitResult, PeakFitter};
pub use lm::{LevenbergMarquardt, LmConfig};
pub use model::Model;
pub use models::{LinearBackground, PeakParams, PeakShape};
pub use parameters::Bounds;
pub use problem::Problem;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
