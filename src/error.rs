use thiserror::Error;

use crate::parameters::bounds::BoundsError;

/// Error types for the fmr-fit library.
#[derive(Error, Debug)]
pub enum FitError {
    /// Input data or configuration is malformed (mismatched lengths, bad errors,
    /// malformed fit domain, unreadable lines).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A parameter vector or matrix does not have the expected size.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// A parameter value or bounds pair violates its constraints.
    #[error("Bounds error: {0}")]
    Bounds(#[from] BoundsError),

    /// The optimizer did not reach a usable minimum.
    #[error("Fit did not converge: {0}")]
    DidNotConverge(String),

    /// Too few data points for the number of free parameters.
    #[error("Degenerate degrees of freedom: {points} points for {parameters} parameters")]
    DegenerateDof { points: usize, parameters: usize },

    /// A singular matrix was encountered.
    #[error("Singular matrix encountered")]
    SingularMatrix,

    /// Error while drawing or encoding a plot.
    #[error("Plot error: {0}")]
    Plot(String),

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for fmr-fit operations.
pub type Result<T> = std::result::Result<T, FitError>;
