use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::{RowRecord, TreeFooter, MAGIC};
use crate::column::BufferHandle;
use crate::config::StorageFormat;
use crate::error::{StorageError, StorageResult};
use crate::framing;
use crate::schema::TypeDescriptor;
use crate::stream::ReadStream;
use crate::traits::{FileSummary, Reader, StreamSummary};

struct TreeReadStream {
    slots: ReadStream,
    offsets: Vec<u64>,
    /// The most recently decoded record and its row.
    record: Option<(u64, RowRecord)>,
}

/// Reads a closed row-tree file.
pub struct TreeReader {
    path: PathBuf,
    name: String,
    file: File,
    streams: BTreeMap<String, TreeReadStream>,
}

impl TreeReader {
    pub fn open(path: &Path) -> StorageResult<Self> {
        let name = path.display().to_string();
        let mut file = File::open(path)?;
        framing::check_header(&mut file, MAGIC)?;
        let footer: TreeFooter = framing::read_footer(&mut file, &name)?;

        let mut streams = BTreeMap::new();
        for stream in footer.streams {
            let slots = ReadStream::new(stream.descriptor, stream.rows.len() as u64)?;
            if slots.column_count() != stream.columns.len() {
                return Err(StorageError::Corrupt {
                    offset: 0,
                    reason: format!("column table of stream `{}` is inconsistent", stream.name),
                });
            }
            streams.insert(
                stream.name,
                TreeReadStream {
                    slots,
                    offsets: stream.rows,
                    record: None,
                },
            );
        }
        debug!(path = %name, streams = streams.len(), "opened row-tree reader");
        Ok(Self {
            path: path.to_path_buf(),
            name,
            file,
            streams,
        })
    }

    fn stream_mut(&mut self, stream: &str) -> StorageResult<&mut TreeReadStream> {
        self.streams
            .get_mut(stream)
            .ok_or_else(|| StorageError::StreamNotFound(stream.to_string()))
    }
}

impl std::fmt::Debug for TreeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeReader")
            .field("path", &self.path)
            .field("streams", &self.streams.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Reader for TreeReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn streams(&self) -> Vec<String> {
        self.streams.keys().cloned().collect()
    }

    fn descriptor(&self, stream: &str) -> Option<Arc<TypeDescriptor>> {
        self.streams
            .get(stream)
            .map(|s| Arc::clone(&s.slots.descriptor))
    }

    fn entries(&self, stream: &str) -> StorageResult<u64> {
        self.streams
            .get(stream)
            .map(|s| s.slots.entries)
            .ok_or_else(|| StorageError::StreamNotFound(stream.to_string()))
    }

    fn seek(&mut self, stream: &str, row: u64) -> StorageResult<u64> {
        let entry = self.stream_mut(stream)?;
        entry.slots.check_row(stream, row)?;
        if entry.slots.row != row {
            entry.slots.reposition(row);
        }
        Ok(row)
    }

    fn buffer(&mut self, stream: &str, column: &str) -> StorageResult<&mut dyn BufferHandle> {
        let entry = self
            .streams
            .get_mut(stream)
            .ok_or_else(|| StorageError::StreamNotFound(stream.to_string()))?;
        let index = entry.slots.index(stream, column)?;
        let row = entry.slots.row;
        if !entry.slots.is_loaded(index, row) {
            let Some(&offset) = entry.offsets.get(row as usize) else {
                return Err(StorageError::ColumnExhausted {
                    stream: stream.to_string(),
                    column: column.to_string(),
                });
            };
            if !matches!(&entry.record, Some((cached, _)) if *cached == row) {
                let payload = framing::decompress(&framing::read_record(&mut self.file, offset)?)?;
                let record: RowRecord = bincode::deserialize(&payload)?;
                if record.blocks.len() != entry.slots.column_count() {
                    return Err(StorageError::Corrupt {
                        offset,
                        reason: format!(
                            "record holds {} columns, stream `{stream}` has {}",
                            record.blocks.len(),
                            entry.slots.column_count()
                        ),
                    });
                }
                entry.record = Some((row, record));
            }
            if let Some((_, record)) = &entry.record {
                entry.slots.fill(index, row, &record.blocks[index])?;
            }
        }
        Ok(entry.slots.buffer(index))
    }

    fn end_row(&mut self, stream: &str) -> StorageResult<()> {
        self.stream_mut(stream)?.slots.row += 1;
        Ok(())
    }

    fn reset(&mut self, stream: &str) {
        if let Some(entry) = self.streams.get_mut(stream) {
            entry.slots.reposition(0);
            entry.record = None;
        }
    }

    fn summary(&self) -> FileSummary {
        FileSummary {
            path: self.path.clone(),
            format: StorageFormat::RowTree,
            streams: self
                .streams
                .iter()
                .map(|(name, s)| StreamSummary {
                    name: name.clone(),
                    type_name: s.slots.descriptor.type_name(),
                    version: s.slots.descriptor.version(),
                    entries: s.slots.entries,
                    chunks: s.offsets.len(),
                })
                .collect(),
        }
    }
}
