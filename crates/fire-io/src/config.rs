use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// On-disk layout of an event file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageFormat {
    /// Chunked columns, one compressed block per column per chunk.
    #[default]
    Columnar,
    /// One compressed record per row holding every column's values.
    RowTree,
}

impl StorageFormat {
    /// Format implied by a file extension, if any.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("fcol") => Some(Self::Columnar),
            Some("ftree") => Some(Self::RowTree),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Columnar => "fcol",
            Self::RowTree => "ftree",
        }
    }
}

impl fmt::Display for StorageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Columnar => write!(f, "columnar"),
            Self::RowTree => write!(f, "row-tree"),
        }
    }
}

/// Writer tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Format used when the path has no recognized extension.
    pub format: StorageFormat,
    /// Rows staged per stream before a chunk is flushed.
    pub rows_per_chunk: usize,
    /// zstd level for column blocks and row records.
    pub compression_level: i32,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            format: StorageFormat::Columnar,
            rows_per_chunk: 10_000,
            compression_level: 6,
        }
    }
}

impl WriterConfig {
    pub fn validate(&self) -> StorageResult<()> {
        if self.rows_per_chunk == 0 {
            return Err(StorageError::InvalidConfig(
                "rows_per_chunk must be at least 1".into(),
            ));
        }
        if !(1..=22).contains(&self.compression_level) {
            return Err(StorageError::InvalidConfig(format!(
                "compression_level {} is outside 1..=22",
                self.compression_level
            )));
        }
        Ok(())
    }

    pub fn with_rows_per_chunk(mut self, rows: usize) -> Self {
        self.rows_per_chunk = rows;
        self
    }

    pub fn with_format(mut self, format: StorageFormat) -> Self {
        self.format = format;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        WriterConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let err = WriterConfig::default()
            .with_rows_per_chunk(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidConfig(_)));
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(
            StorageFormat::from_path(Path::new("out.fcol")),
            Some(StorageFormat::Columnar)
        );
        assert_eq!(
            StorageFormat::from_path(Path::new("a/b.ftree")),
            Some(StorageFormat::RowTree)
        );
        assert_eq!(StorageFormat::from_path(Path::new("x.root")), None);
    }

    #[test]
    fn config_from_toml() {
        let config: WriterConfig = toml::from_str("rows_per_chunk = 50\nformat = \"row_tree\"").unwrap();
        assert_eq!(config.rows_per_chunk, 50);
        assert_eq!(config.format, StorageFormat::RowTree);
        assert_eq!(config.compression_level, 6);
    }
}
