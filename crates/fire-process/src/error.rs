use fire_conditions::ConditionsError;
use fire_event::EventError;
use fire_io::StorageError;
use fire_types::{Classify, ErrorKind, TypeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Conditions(#[from] ConditionsError),

    #[error("bad parameters: {0}")]
    Parameter(#[from] TypeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("unknown processor class `{0}`")]
    UnknownProcessor(String),

    #[error("processor `{processor}` failed: {reason}")]
    Fatal { processor: String, reason: String },
}

impl ProcessError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<toml::de::Error> for ProcessError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.message().to_string())
    }
}

impl Classify for ProcessError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(e) => e.kind(),
            Self::Event(e) => e.kind(),
            Self::Conditions(e) => e.kind(),
            Self::Io(_) => ErrorKind::IoFailure,
            Self::Parameter(_)
            | Self::Config(_)
            | Self::InvalidPattern { .. }
            | Self::UnknownProcessor(_)
            | Self::Fatal { .. } => ErrorKind::StateError,
        }
    }
}

pub type ProcessResult<T> = Result<T, ProcessError>;
