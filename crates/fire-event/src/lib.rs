//! The event side of fire.
//!
//! An [`EventStore`] holds the objects of the event being processed: the
//! [`EventHeader`], objects added by processors of the current pass, and
//! objects read on demand from an input file. At the end of each event the
//! store writes every kept object to the output, one row per event.
//! [`UserReader`] walks a finished file through the same store.

pub mod error;
pub mod header;
pub mod reader;
pub mod rules;
pub mod store;

pub use error::{EventError, EventResult};
pub use header::{register_headers, EventHeader, RunHeader};
pub use reader::UserReader;
pub use rules::{DropKeepRule, DropKeepRules};
pub use store::{EventStore, ProductTag};
