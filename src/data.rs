//! Measurements, datasets and the magnet calibration.
//!
//! A [`Dataset`] is an ordered list of `(x, y, y_error)` measurements. The
//! independent variable is the magnetic field in millitesla, obtained from
//! the raw magnet current through a [`Calibration`].

use crate::error::{FitError, Result};
use crate::fit::FitDomain;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::io::BufRead;

/// One observed point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Magnetic field (mT)
    pub x: f64,
    /// Observed signal
    pub y: f64,
    /// One-sigma uncertainty of `y`
    pub y_error: f64,
}

/// Affine conversion from magnet current to field: `B = (slope·I + offset)·scale`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Tesla per ampere
    pub slope: f64,
    /// Tesla
    pub offset: f64,
    /// Output units per tesla
    pub scale: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            slope: 0.1632,
            offset: 0.0152,
            scale: 1000.0,
        }
    }
}

impl Calibration {
    /// Field for a magnet current `current` (A).
    pub fn field(&self, current: f64) -> f64 {
        (self.slope * current + self.offset) * self.scale
    }
}

/// An ordered sequence of measurements.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    points: Vec<Measurement>,
}

impl Dataset {
    /// Build a dataset from raw magnet currents and signals, with one
    /// uncertainty shared by every point.
    ///
    /// # Arguments
    ///
    /// * `magnet_current` - Magnet currents (A), one per point
    /// * `signal` - Observed signal at each current
    /// * `calibration` - Conversion from current to field
    /// * `y_error` - Uncertainty of every signal value, finite and positive
    ///
    /// # Returns
    ///
    /// The dataset in scan order, or [`FitError::InvalidInput`] if the
    /// columns differ in length or `y_error` is not a positive number
    ///
    /// # Examples
    ///
    /// ```
    /// use fmr_fit::{Calibration, Dataset};
    ///
    /// let calibration = Calibration::default();
    /// let data = Dataset::from_currents(&[1.767, 1.8], &[31.0, 30.5], &calibration, 0.5).unwrap();
    /// assert_eq!(data.len(), 2);
    /// assert!((data.x()[0] - 303.5744).abs() < 1e-9);
    /// assert!(Dataset::from_currents(&[1.767], &[31.0], &calibration, 0.0).is_err());
    /// ```
    pub fn from_currents(
        magnet_current: &[f64],
        signal: &[f64],
        calibration: &Calibration,
        y_error: f64,
    ) -> Result<Self> {
        if magnet_current.len() != signal.len() {
            return Err(FitError::InvalidInput(format!(
                "{} magnet currents but {} signal values",
                magnet_current.len(),
                signal.len()
            )));
        }
        check_error(y_error)?;

        let points = magnet_current
            .iter()
            .zip(signal)
            .map(|(&current, &y)| Measurement {
                x: calibration.field(current),
                y,
                y_error,
            })
            .collect();
        Ok(Self { points })
    }

    /// Build a dataset from columns already in field units.
    pub fn from_columns(x: &[f64], y: &[f64], y_error: &[f64]) -> Result<Self> {
        if x.len() != y.len() || x.len() != y_error.len() {
            return Err(FitError::InvalidInput(format!(
                "Column lengths differ: x = {}, y = {}, y_error = {}",
                x.len(),
                y.len(),
                y_error.len()
            )));
        }

        let points = x
            .iter()
            .zip(y)
            .zip(y_error)
            .map(|((&x, &y), &y_error)| {
                check_error(y_error)?;
                Ok(Measurement { x, y, y_error })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { points })
    }

    /// Read `(magnet current, signal)` pairs from a text stream.
    ///
    /// One pair per line, separated by whitespace or a comma. Blank lines and
    /// lines starting with `#` are skipped; anything after a `#` is ignored.
    pub fn read_pairs<R: BufRead>(
        reader: R,
        calibration: &Calibration,
        y_error: f64,
    ) -> Result<Self> {
        let mut currents = Vec::new();
        let mut signals = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let content = match line.split_once('#') {
                Some((before, _)) => before,
                None => line.as_str(),
            }
            .trim();
            if content.is_empty() {
                continue;
            }

            let fields: Vec<&str> = content
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|f| !f.is_empty())
                .collect();
            let (current, signal) = match fields.as_slice() {
                [current, signal] => (
                    parse_field(current, index + 1)?,
                    parse_field(signal, index + 1)?,
                ),
                _ => {
                    return Err(FitError::InvalidInput(format!(
                        "Line {}: expected 2 values, found {}",
                        index + 1,
                        fields.len()
                    )))
                }
            };
            currents.push(current);
            signals.push(signal);
        }

        Self::from_currents(&currents, &signals, calibration, y_error)
    }

    /// The points whose `x` lies inside `domain`, in their original order.
    pub fn restrict(&self, domain: &FitDomain) -> Dataset {
        Dataset {
            points: self
                .points
                .iter()
                .filter(|p| domain.contains(p.x))
                .copied()
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Measurement> {
        self.points.iter()
    }

    pub fn points(&self) -> &[Measurement] {
        &self.points
    }

    pub fn x(&self) -> Array1<f64> {
        self.points.iter().map(|p| p.x).collect()
    }

    pub fn y(&self) -> Array1<f64> {
        self.points.iter().map(|p| p.y).collect()
    }

    pub fn y_error(&self) -> Array1<f64> {
        self.points.iter().map(|p| p.y_error).collect()
    }

    /// Smallest and largest `x`, or `None` for an empty dataset.
    pub fn x_range(&self) -> Option<(f64, f64)> {
        min_max(self.points.iter().map(|p| p.x))
    }

    /// Smallest and largest `y`, error bars included.
    pub fn y_range(&self) -> Option<(f64, f64)> {
        let low = min_max(self.points.iter().map(|p| p.y - p.y_error))?;
        let high = min_max(self.points.iter().map(|p| p.y + p.y_error))?;
        Some((low.0, high.1))
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Measurement;
    type IntoIter = std::slice::Iter<'a, Measurement>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

fn check_error(y_error: f64) -> Result<()> {
    if y_error.is_finite() && y_error > 0.0 {
        Ok(())
    } else {
        Err(FitError::InvalidInput(format!(
            "y errors must be finite and positive, got {}",
            y_error
        )))
    }
}

fn parse_field(field: &str, line: usize) -> Result<f64> {
    field
        .parse::<f64>()
        .map_err(|e| FitError::InvalidInput(format!("Line {}: '{}': {}", line, field, e)))
}

fn min_max(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// The ferromagnetic resonance scan.
pub mod fmr {
    use super::{Calibration, Dataset};
    use crate::error::Result;

    /// Magnet current (A).
    pub const MAGNET_CURRENT: [f64; 18] = [
        1.752, 1.767, 1.776, 1.792, 1.810, 1.819, 1.835, 1.844, 1.850, 1.862, 1.874, 1.883, 1.891,
        1.900, 1.915, 1.934, 1.953, 1.975,
    ];

    /// Signal current (μA).
    pub const SIGNAL_CURRENT: [f64; 18] = [
        31.0, 30.5, 30.0, 28.5, 27.0, 25.0, 21.0, 17.0, 13.0, 5.0, 2.0, 8.5, 16.5, 25.0, 30.0,
        31.0, 32.0, 32.0,
    ];

    /// Uncertainty of every signal reading (μA).
    pub const SIGNAL_ERROR: f64 = 1.0;

    /// The scan in millitesla with the default calibration.
    pub fn dataset() -> Result<Dataset> {
        Dataset::from_currents(
            &MAGNET_CURRENT,
            &SIGNAL_CURRENT,
            &Calibration::default(),
            SIGNAL_ERROR,
        )
    }
}
