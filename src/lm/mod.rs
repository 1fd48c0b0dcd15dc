//! Levenberg-Marquardt algorithm implementation.
//!
//! This module provides an implementation of the Levenberg-Marquardt algorithm
//! for nonlinear least-squares optimization, with box constraints handled by
//! the Minuit parameter transform (see [`BoundedProblem`]).

pub mod algorithm;
pub mod bounded;
pub mod config;

// Re-export key types
pub use algorithm::{LevenbergMarquardt, LmResult};
pub use bounded::BoundedProblem;
pub use config::LmConfig;
