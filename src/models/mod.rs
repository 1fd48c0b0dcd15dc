//! Lineshape models.
//!
//! [`PeakShape`] implements [`Model`](crate::model::Model) for the two
//! resonance shapes; [`LinearBackground`] is the background read back from a
//! fit for display.

pub mod background;
pub mod peak;

pub use background::LinearBackground;
pub use peak::{gaussian_fwhm, PeakParams, PeakShape, GAUSSIAN_FWHM_PER_SIGMA};
