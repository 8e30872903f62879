use fire_io::StorageError;
use fire_types::{Classify, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("event object `{0}` was already added to this event")]
    Repeat(String),

    #[error("event object `{name}` holds {stored}, not {requested}")]
    TypeMismatch {
        name: String,
        stored: String,
        requested: String,
    },

    #[error("event object `{name}` of type {type_name} not found")]
    NotFound { name: String, type_name: String },

    #[error("event object `{name}` of type {type_name} is ambiguous between passes {passes:?}; provide a pass name")]
    Ambiguous {
        name: String,
        type_name: String,
        passes: Vec<String>,
    },

    #[error("invalid event object name `{0}`")]
    InvalidName(String),

    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("no input file is attached")]
    NoInput,
}

impl Classify for EventError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(e) => e.kind(),
            Self::TypeMismatch { .. } => ErrorKind::SchemaMismatch,
            Self::NotFound { .. } | Self::Ambiguous { .. } => ErrorKind::NotFound,
            Self::Repeat(_) | Self::InvalidName(_) | Self::InvalidPattern { .. } | Self::NoInput => {
                ErrorKind::StateError
            }
        }
    }
}

pub type EventResult<T> = Result<T, EventError>;
