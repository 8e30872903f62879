use fire_types::{Classify, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid file magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u32),

    #[error("missing footer in {path}: file was not closed cleanly")]
    MissingFooter { path: String },

    #[error("checksum mismatch for block at offset {offset}")]
    ChecksumMismatch { offset: u64 },

    #[error("corrupt data at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    #[error("column `{column}` of stream `{stream}` ran out of values")]
    ColumnExhausted { stream: String, column: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("{type_name} version {version} is not registered")]
    UnregisteredVersion { type_name: String, version: u32 },

    #[error("type mismatch in column `{column}`: stored {expected}, requested {actual}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },

    #[error("unknown parameter type tag {0}")]
    UnknownParameterTag(u8),

    #[error("unknown column `{column}` in stream `{stream}`")]
    UnknownColumn { stream: String, column: String },

    #[error("stream not found: {0}")]
    StreamNotFound(String),

    #[error("parameter not found: {0}")]
    ParameterNotFound(String),

    #[error("parameter `{name}` holds {actual}, not {expected}")]
    ParameterType {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("row {row} is out of range for stream `{stream}` with {entries} entries")]
    RowOutOfRange {
        stream: String,
        row: u64,
        entries: u64,
    },

    #[error("stream `{0}` has not been declared")]
    NotDeclared(String),

    #[error("schema of stream `{0}` is frozen after its first row")]
    SchemaFrozen(String),

    #[error("writer is closed")]
    Closed,

    #[error("writer aborted after an earlier failure")]
    Aborted,

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl Classify for StorageError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_)
            | Self::InvalidMagic { .. }
            | Self::UnsupportedVersion(_)
            | Self::MissingFooter { .. }
            | Self::ChecksumMismatch { .. }
            | Self::Corrupt { .. }
            | Self::ColumnExhausted { .. }
            | Self::Serialization(_)
            | Self::CompressionFailed(_)
            | Self::DecompressionFailed(_) => ErrorKind::IoFailure,
            Self::SchemaMismatch(_)
            | Self::UnregisteredVersion { .. }
            | Self::TypeMismatch { .. }
            | Self::UnknownParameterTag(_)
            | Self::UnknownColumn { .. } => ErrorKind::SchemaMismatch,
            Self::StreamNotFound(_)
            | Self::ParameterNotFound(_)
            | Self::ParameterType { .. }
            | Self::RowOutOfRange { .. } => ErrorKind::NotFound,
            Self::NotDeclared(_)
            | Self::SchemaFrozen(_)
            | Self::Closed
            | Self::Aborted
            | Self::InvalidSchema(_)
            | Self::InvalidConfig(_)
            | Self::InvalidPattern { .. } => ErrorKind::StateError,
        }
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
