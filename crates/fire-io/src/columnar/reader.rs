use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::{chunk_of, ChunkFooter, ColumnarFooter, MAGIC};
use crate::column::BufferHandle;
use crate::config::StorageFormat;
use crate::error::{StorageError, StorageResult};
use crate::framing;
use crate::schema::TypeDescriptor;
use crate::stream::ReadStream;
use crate::traits::{FileSummary, Reader, StreamSummary};

struct ColumnarReadStream {
    slots: ReadStream,
    chunks: Vec<ChunkFooter>,
}

/// Reads a closed columnar file, decoding column blocks on demand.
pub struct ColumnarReader {
    path: PathBuf,
    name: String,
    file: File,
    streams: BTreeMap<String, ColumnarReadStream>,
}

impl ColumnarReader {
    pub fn open(path: &Path) -> StorageResult<Self> {
        let name = path.display().to_string();
        let mut file = File::open(path)?;
        framing::check_header(&mut file, MAGIC)?;
        let footer: ColumnarFooter = framing::read_footer(&mut file, &name)?;

        let mut streams = BTreeMap::new();
        for stream in footer.streams {
            let slots = ReadStream::new(stream.descriptor, stream.entries)?;
            if slots.column_count() != stream.columns.len() {
                return Err(StorageError::Corrupt {
                    offset: 0,
                    reason: format!(
                        "stream `{}` lists {} columns but its descriptor has {}",
                        stream.name,
                        stream.columns.len(),
                        slots.column_count()
                    ),
                });
            }
            let covered: u64 = stream.chunks.iter().map(|c| c.rows).sum();
            if covered != stream.entries
                || stream.chunks.iter().any(|c| c.blocks.len() != stream.columns.len())
            {
                return Err(StorageError::Corrupt {
                    offset: 0,
                    reason: format!("chunk table of stream `{}` is inconsistent", stream.name),
                });
            }
            let row_columns = slots
                .descriptor
                .row_columns()?
                .iter()
                .map(|column| slots.index(&stream.name, column))
                .collect::<StorageResult<Vec<usize>>>()?;
            if let Some(chunk) = stream.chunks.iter().find(|chunk| {
                row_columns
                    .iter()
                    .any(|&index| chunk.blocks[index].values != chunk.rows)
            }) {
                return Err(StorageError::Corrupt {
                    offset: 0,
                    reason: format!(
                        "chunk at row {} of stream `{}` is not aligned with its row count",
                        chunk.first_row, stream.name
                    ),
                });
            }
            streams.insert(
                stream.name,
                ColumnarReadStream {
                    slots,
                    chunks: stream.chunks,
                },
            );
        }
        debug!(path = %name, streams = streams.len(), "opened columnar reader");
        Ok(Self {
            path: path.to_path_buf(),
            name,
            file,
            streams,
        })
    }

    fn stream_mut(&mut self, stream: &str) -> StorageResult<&mut ColumnarReadStream> {
        self.streams
            .get_mut(stream)
            .ok_or_else(|| StorageError::StreamNotFound(stream.to_string()))
    }
}

impl std::fmt::Debug for ColumnarReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnarReader")
            .field("path", &self.path)
            .field("streams", &self.streams.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Reader for ColumnarReader {
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
        let first_row = entry.chunks[chunk_of(&entry.chunks, row)].first_row;
        let cursor = entry.slots.row;
        if cursor >= first_row && cursor <= row {
            return Ok(cursor);
        }
        entry.slots.reposition(first_row);
        Ok(first_row)
    }

    fn buffer(&mut self, stream: &str, column: &str) -> StorageResult<&mut dyn BufferHandle> {
        let entry = self
            .streams
            .get_mut(stream)
            .ok_or_else(|| StorageError::StreamNotFound(stream.to_string()))?;
        let index = entry.slots.index(stream, column)?;
        let chunk = chunk_of(&entry.chunks, entry.slots.row);
        if chunk >= entry.chunks.len() {
            return Err(StorageError::ColumnExhausted {
                stream: stream.to_string(),
                column: column.to_string(),
            });
        }
        if !entry.slots.is_loaded(index, chunk as u64) {
            let block = &entry.chunks[chunk].blocks[index];
            let data = framing::read_block(&mut self.file, block.offset, block.length, block.crc32)?;
            entry.slots.fill(index, chunk as u64, &data)?;
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
        }
    }

    fn summary(&self) -> FileSummary {
        FileSummary {
            path: self.path.clone(),
            format: StorageFormat::Columnar,
            streams: self
                .streams
                .iter()
                .map(|(name, s)| StreamSummary {
                    name: name.clone(),
                    type_name: s.slots.descriptor.type_name(),
                    version: s.slots.descriptor.version(),
                    entries: s.slots.entries,
                    chunks: s.chunks.len(),
                })
                .collect(),
        }
    }
}
