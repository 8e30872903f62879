use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification shared by every fire error type.
///
/// Only [`ErrorKind::NotFound`] is recoverable: a processor may abort the
/// current event and the run continues. Everything else ends the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Stored data cannot be interpreted with the registered schemas.
    SchemaMismatch,
    /// A named object or condition is absent.
    NotFound,
    /// Reading or writing a file failed, or a file is corrupt.
    IoFailure,
    /// A conditions provider returned an interval that does not cover the request.
    ProviderContractViolation,
    /// An operation was called in the wrong state (closed, undeclared, repeated).
    StateError,
}

impl ErrorKind {
    /// Returns `true` if the pipeline may skip to the next event.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SchemaMismatch => "schema mismatch",
            Self::NotFound => "not found",
            Self::IoFailure => "I/O failure",
            Self::ProviderContractViolation => "provider contract violation",
            Self::StateError => "state error",
        };
        f.write_str(name)
    }
}

/// Implemented by error enums that map onto the shared taxonomy.
pub trait Classify {
    /// The taxonomy bucket of this error.
    fn kind(&self) -> ErrorKind;

    /// Returns `true` if the error only invalidates the current event.
    fn is_recoverable(&self) -> bool {
        self.kind().is_recoverable()
    }
}
