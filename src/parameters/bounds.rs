//! Parameter bounds.
//!
//! Box constraints are handled the way Minuit does it: the optimizer works on
//! an unbounded *internal* value and every evaluation maps it back to an
//! *external* value that can never leave `[min, max]`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when working with parameter bounds
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundsError {
    #[error("Invalid bounds: min ({min}) must not exceed max ({max})")]
    InvalidBounds { min: f64, max: f64 },

    #[error("Parameter value {value} is outside bounds: [{min}, {max}]")]
    ValueOutsideBounds { value: f64, min: f64, max: f64 },

    #[error("Non-finite parameter value is not allowed")]
    NonFiniteValue,
}

/// Closed interval a parameter is allowed to take.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Minimum allowed value for the parameter
    pub min: f64,

    /// Maximum allowed value for the parameter
    pub max: f64,
}

// Infinite limits are written as `null`, JSON has no representation for them.
impl Serialize for Bounds {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("Bounds", 2)?;
        state.serialize_field("min", &self.has_lower_bound().then_some(self.min))?;
        state.serialize_field("max", &self.has_upper_bound().then_some(self.max))?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Bounds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct BoundsHelper {
            #[serde(default)]
            min: Option<f64>,

            #[serde(default)]
            max: Option<f64>,
        }

        let helper = BoundsHelper::deserialize(deserializer)?;
        Bounds::new(
            helper.min.unwrap_or(f64::NEG_INFINITY),
            helper.max.unwrap_or(f64::INFINITY),
        )
        .map_err(serde::de::Error::custom)
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl Bounds {
    /// Create bounds `[min, max]`.
    ///
    /// # Examples
    ///
    /// ```
    /// use fmr_fit::parameters::Bounds;
    ///
    /// let bounds = Bounds::new(1.0, 20.0).unwrap();
    /// assert!(bounds.contains(5.0));
    /// assert!(Bounds::new(20.0, 1.0).is_err());
    /// ```
    pub fn new(min: f64, max: f64) -> Result<Self, BoundsError> {
        if min.is_nan() || max.is_nan() || min > max {
            return Err(BoundsError::InvalidBounds { min, max });
        }

        Ok(Self { min, max })
    }

    /// No constraint at all.
    pub fn unbounded() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }

    /// Lower limit only.
    pub fn min_only(min: f64) -> Self {
        Self {
            min,
            max: f64::INFINITY,
        }
    }

    /// Upper limit only.
    pub fn max_only(max: f64) -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn has_lower_bound(&self) -> bool {
        self.min.is_finite()
    }

    pub fn has_upper_bound(&self) -> bool {
        self.max.is_finite()
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    /// Reject values that are non-finite or outside the interval.
    pub fn check(&self, value: f64) -> Result<(), BoundsError> {
        if !value.is_finite() {
            return Err(BoundsError::NonFiniteValue);
        }
        if !self.contains(value) {
            return Err(BoundsError::ValueOutsideBounds {
                value,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// Minuit-style mapping between internal (unbounded) and external (bounded)
/// parameter values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundsTransform {
    bounds: Bounds,
}

impl BoundsTransform {
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Map an internal value to the external value seen by the model.
    ///
    /// The result always lies in `[min, max]`.
    pub fn to_external(&self, internal: f64) -> f64 {
        let b = &self.bounds;
        match (b.has_lower_bound(), b.has_upper_bound()) {
            (false, false) => internal,
            (true, false) => b.min - 1.0 + (internal * internal + 1.0).sqrt(),
            (false, true) => b.max + 1.0 - (internal * internal + 1.0).sqrt(),
            (true, true) => b.min + (internal.sin() + 1.0) * (b.max - b.min) / 2.0,
        }
    }

    /// Map an external value to an internal starting point for the optimizer.
    pub fn to_internal(&self, external: f64) -> Result<f64, BoundsError> {
        self.bounds.check(external)?;

        let b = &self.bounds;
        let internal = match (b.has_lower_bound(), b.has_upper_bound()) {
            (false, false) => external,
            (true, false) => ((external - b.min + 1.0).powi(2) - 1.0).sqrt(),
            (false, true) => ((b.max - external + 1.0).powi(2) - 1.0).sqrt(),
            (true, true) => {
                if b.max == b.min {
                    0.0
                } else {
                    let scaled = 2.0 * (external - b.min) / (b.max - b.min) - 1.0;
                    scaled.clamp(-1.0, 1.0).asin()
                }
            }
        };

        Ok(internal)
    }

    /// Derivative of the external value with respect to the internal one.
    ///
    /// Used to chain the model Jacobian into internal coordinates.
    pub fn derivative(&self, internal: f64) -> f64 {
        let b = &self.bounds;
        match (b.has_lower_bound(), b.has_upper_bound()) {
            (false, false) => 1.0,
            (true, false) => internal / (internal * internal + 1.0).sqrt(),
            (false, true) => -internal / (internal * internal + 1.0).sqrt(),
            (true, true) => (b.max - b.min) / 2.0 * internal.cos(),
        }
    }

    /// Second derivative of the external value with respect to the internal one.
    ///
    /// Near a bound the first derivative vanishes and this term carries the
    /// curvature of the cost along the internal coordinate.
    pub fn second_derivative(&self, internal: f64) -> f64 {
        let b = &self.bounds;
        match (b.has_lower_bound(), b.has_upper_bound()) {
            (false, false) => 0.0,
            (true, false) => (internal * internal + 1.0).powf(-1.5),
            (false, true) => -(internal * internal + 1.0).powf(-1.5),
            (true, true) => -(b.max - b.min) / 2.0 * internal.sin(),
        }
    }
}
