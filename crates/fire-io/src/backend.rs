//! Backend selection by path extension and file magic.

use std::path::Path;

use crate::columnar::{self, ColumnarReader, ColumnarWriter};
use crate::config::{StorageFormat, WriterConfig};
use crate::error::{StorageError, StorageResult};
use crate::framing;
use crate::traits::{Reader, Writer};
use crate::tree::{self, TreeReader, TreeWriter};

/// Create a writer for `path`; the extension wins over `config.format`.
pub fn create_writer(path: &Path, config: &WriterConfig) -> StorageResult<Box<dyn Writer>> {
    let format = StorageFormat::from_path(path).unwrap_or(config.format);
    Ok(match format {
        StorageFormat::Columnar => Box::new(ColumnarWriter::create(path, config.clone())?),
        StorageFormat::RowTree => Box::new(TreeWriter::create(path, config.clone())?),
    })
}

/// Format of an existing file, from its magic bytes.
pub fn detect_format(path: &Path) -> StorageResult<StorageFormat> {
    let magic = framing::sniff_magic(path)?;
    if &magic == columnar::MAGIC {
        Ok(StorageFormat::Columnar)
    } else if &magic == tree::MAGIC {
        Ok(StorageFormat::RowTree)
    } else {
        Err(StorageError::InvalidMagic {
            expected: "FIRC or FIRT".into(),
            actual: String::from_utf8_lossy(&magic).into_owned(),
        })
    }
}

/// Open any fire event file.
pub fn open_reader(path: &Path) -> StorageResult<Box<dyn Reader>> {
    Ok(match detect_format(path)? {
        StorageFormat::Columnar => Box::new(ColumnarReader::open(path)?),
        StorageFormat::RowTree => Box::new(TreeReader::open(path)?),
    })
}
