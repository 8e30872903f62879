//! Foundation types for fire.
//!
//! This crate provides the small value types shared by every other fire
//! crate: the validity interval used to key conditions, the per-event context
//! handed to the conditions layer, free-form configuration parameters, and
//! the error taxonomy every crate's error enum maps onto.
//!
//! # Key Types
//!
//! - [`IntervalOfValidity`]: Run range plus data/simulation applicability
//! - [`EventContext`]: Run number, event number, and data/simulation flag
//! - [`Parameters`]: Typed access to a TOML table of configuration values
//! - [`ErrorKind`]: Classification of failures into recoverable and fatal

pub mod context;
pub mod error;
pub mod iov;
pub mod kind;
pub mod params;

pub use context::EventContext;
pub use error::TypeError;
pub use iov::IntervalOfValidity;
pub use kind::{Classify, ErrorKind};
pub use params::Parameters;

/// Run numbers as recorded in headers and validity intervals.
pub type RunNumber = i32;
