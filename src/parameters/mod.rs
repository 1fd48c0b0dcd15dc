//! # Parameter Bounds
//!
//! Box constraints for fit parameters. A peak fit keeps its amplitude
//! non-negative and its width strictly positive by giving those parameters
//! [`Bounds`]; the optimizer honours them through a [`BoundsTransform`], so
//! every parameter vector it evaluates is feasible.
//!
//! ```rust
//! use fmr_fit::parameters::{Bounds, BoundsTransform};
//!
//! let width = BoundsTransform::new(Bounds::new(1.0, 20.0).unwrap());
//! let internal = width.to_internal(5.0).unwrap();
//!
//! // Any step in internal space still lands inside the bounds.
//! let external = width.to_external(internal + 100.0);
//! assert!((1.0..=20.0).contains(&external));
//! ```

pub mod bounds;

pub use bounds::{Bounds, BoundsError, BoundsTransform};
