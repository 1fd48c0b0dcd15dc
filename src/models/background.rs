//! Linear background under the resonance.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// The affine background `a0 + a1·x` of a peak fit.
///
/// It carries no fitting logic of its own; it is read off a fit result and
/// drawn as an overlay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearBackground {
    pub intercept: f64,
    pub slope: f64,
}

impl LinearBackground {
    pub fn new(intercept: f64, slope: f64) -> Self {
        Self { intercept, slope }
    }

    pub fn value(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }

    /// Evaluate at every point of `x`.
    pub fn eval(&self, x: &Array1<f64>) -> Array1<f64> {
        x.mapv(|xi| self.value(xi))
    }

    /// `n` evenly spaced `(x, y)` samples over `[start, end]`.
    pub fn sample(&self, start: f64, end: f64, n: usize) -> Vec<(f64, f64)> {
        Array1::linspace(start, end, n)
            .iter()
            .map(|&x| (x, self.value(x)))
            .collect()
    }
}
