//! # Uncertainty Calculation
//!
//! Parameter uncertainties of a fit, from the covariance matrix at the
//! optimum and, as a cross-check, from Monte Carlo refits of resampled data.

mod covariance;
mod monte_carlo;

pub use covariance::{calculate_correlation, calculate_covariance, standard_errors_from_covariance};
pub use monte_carlo::{monte_carlo_refit, MonteCarloResult, ParameterSummary};
