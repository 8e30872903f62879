use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid interval: first run {first} is after last run {last}")]
    InvalidInterval { first: i32, last: i32 },

    #[error("missing parameter: {0}")]
    MissingParameter(String),

    #[error("invalid parameter {key}: {reason}")]
    InvalidParameter { key: String, reason: String },
}
