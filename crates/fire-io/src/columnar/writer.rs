use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{BlockRef, ChunkFooter, ColumnarFooter, StreamFooter, MAGIC};
use crate::column::ColumnHandle;
use crate::config::{StorageFormat, WriterConfig};
use crate::error::{StorageError, StorageResult};
use crate::framing;
use crate::schema::TypeDescriptor;
use crate::stream::WriteStream;
use crate::traits::{FileSummary, StreamSummary, Writer};

struct ColumnarStream {
    slots: WriteStream,
    chunks: Vec<ChunkFooter>,
}

/// Writes a chunked columnar file.
///
/// The file is unreadable until [`Writer::close`] has written the footer.
pub struct ColumnarWriter {
    path: PathBuf,
    name: String,
    file: Option<BufWriter<File>>,
    offset: u64,
    config: WriterConfig,
    streams: BTreeMap<String, ColumnarStream>,
    failed: bool,
    scratch: Vec<u8>,
}

impl ColumnarWriter {
    /// Create (or truncate) the file at `path`.
    pub fn create(path: &Path, config: WriterConfig) -> StorageResult<Self> {
        config.validate()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = BufWriter::new(File::create(path)?);
        let offset = framing::write_header(&mut file, MAGIC)?;
        debug!(
            path = %path.display(),
            rows_per_chunk = config.rows_per_chunk,
            "opened columnar writer"
        );
        Ok(Self {
            path: path.to_path_buf(),
            name: path.display().to_string(),
            file: Some(file),
            offset,
            config,
            streams: BTreeMap::new(),
            failed: false,
            scratch: Vec::new(),
        })
    }

    /// Chunks flushed so far for `stream`.
    pub fn chunks(&self, stream: &str) -> usize {
        self.streams.get(stream).map_or(0, |s| s.chunks.len())
    }

    fn check_open(&self) -> StorageResult<()> {
        if self.failed {
            Err(StorageError::Aborted)
        } else if self.file.is_none() {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }

    fn poison<T>(&mut self, result: StorageResult<T>) -> StorageResult<T> {
        if let Err(err) = &result {
            warn!(path = %self.name, error = %err, "columnar writer failed; further writes are refused");
            self.failed = true;
        }
        result
    }

    fn flush_stream(&mut self, name: &str) -> StorageResult<()> {
        let file = self.file.as_mut().ok_or(StorageError::Closed)?;
        let Some(stream) = self.streams.get_mut(name) else {
            return Err(StorageError::NotDeclared(name.to_string()));
        };
        if stream.slots.pending == 0 {
            return Ok(());
        }
        let rows = stream.slots.pending as u64;
        let first_row = stream.slots.rows - rows;
        let mut blocks = Vec::with_capacity(stream.slots.columns.len());
        for (_, column) in stream.slots.columns.iter_mut() {
            self.scratch.clear();
            let values = column.drain_into(&mut self.scratch)?;
            let compressed = framing::compress(&self.scratch, self.config.compression_level)?;
            file.write_all(&compressed)?;
            blocks.push(BlockRef {
                offset: self.offset,
                length: compressed.len() as u64,
                crc32: crc32fast::hash(&compressed),
                values,
            });
            self.offset += compressed.len() as u64;
        }
        debug!(stream = name, first_row, rows, "flushed chunk");
        stream.chunks.push(ChunkFooter {
            first_row,
            rows,
            blocks,
        });
        stream.slots.pending = 0;
        stream.slots.commit_row();
        Ok(())
    }

    fn finish(&mut self) -> StorageResult<FileSummary> {
        let names: Vec<String> = self.streams.keys().cloned().collect();
        for name in &names {
            self.flush_stream(name)?;
        }
        let footer = ColumnarFooter {
            streams: self
                .streams
                .iter()
                .map(|(name, stream)| StreamFooter {
                    name: name.clone(),
                    descriptor: (*stream.slots.descriptor).clone(),
                    entries: stream.slots.rows,
                    rows_per_chunk: self.config.rows_per_chunk as u64,
                    columns: stream.slots.specs(),
                    chunks: stream.chunks.clone(),
                })
                .collect(),
        };
        let mut file = self.file.take().ok_or(StorageError::Closed)?;
        self.offset += framing::write_footer(&mut file, self.offset, &footer)?;
        let file = file
            .into_inner()
            .map_err(|e| StorageError::Io(e.into_error()))?;
        file.sync_all()?;
        let summary = self.summary();
        info!(
            path = %self.name,
            streams = summary.streams.len(),
            bytes = self.offset,
            "closed columnar file"
        );
        Ok(summary)
    }

    fn summary(&self) -> FileSummary {
        FileSummary {
            path: self.path.clone(),
            format: StorageFormat::Columnar,
            streams: self
                .streams
                .iter()
                .map(|(name, stream)| StreamSummary {
                    name: name.clone(),
                    type_name: stream.slots.descriptor.type_name(),
                    version: stream.slots.descriptor.version(),
                    entries: stream.slots.rows,
                    chunks: stream.chunks.len(),
                })
                .collect(),
        }
    }
}

impl std::fmt::Debug for ColumnarWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnarWriter")
            .field("path", &self.path)
            .field("streams", &self.streams.keys().collect::<Vec<_>>())
            .field("closed", &self.file.is_none())
            .field("failed", &self.failed)
            .finish()
    }
}

impl Writer for ColumnarWriter {
    fn name(&self) -> &str {
        &self.name
    }

    fn declare(&mut self, stream: &str, descriptor: TypeDescriptor) -> StorageResult<()> {
        self.check_open()?;
        if stream.is_empty() {
            return Err(StorageError::InvalidSchema("stream name is empty".into()));
        }
        if let Some(existing) = self.streams.get(stream) {
            if *existing.slots.descriptor == descriptor {
                return Ok(());
            }
            if existing.slots.rows > 0 {
                return Err(StorageError::SchemaFrozen(stream.to_string()));
            }
        }
        let slots = WriteStream::new(descriptor, self.config.rows_per_chunk)?;
        debug!(
            stream,
            type_name = %slots.descriptor.type_name(),
            columns = slots.columns.len(),
            "declared stream"
        );
        self.streams.insert(
            stream.to_string(),
            ColumnarStream {
                slots,
                chunks: Vec::new(),
            },
        );
        Ok(())
    }

    fn descriptor(&self, stream: &str) -> Option<Arc<TypeDescriptor>> {
        self.streams
            .get(stream)
            .map(|s| Arc::clone(&s.slots.descriptor))
    }

    fn column(&mut self, stream: &str, column: &str) -> StorageResult<&mut dyn ColumnHandle> {
        self.check_open()?;
        self.streams
            .get_mut(stream)
            .ok_or_else(|| StorageError::NotDeclared(stream.to_string()))?
            .slots
            .column(stream, column)
    }

    fn end_row(&mut self, stream: &str) -> StorageResult<()> {
        self.check_open()?;
        let entry = self
            .streams
            .get_mut(stream)
            .ok_or_else(|| StorageError::NotDeclared(stream.to_string()))?;
        entry.slots.rows += 1;
        entry.slots.pending += 1;
        entry.slots.commit_row();
        if entry.slots.pending >= self.config.rows_per_chunk {
            let result = self.flush_stream(stream);
            return self.poison(result);
        }
        Ok(())
    }

    fn discard_row(&mut self, stream: &str) -> StorageResult<()> {
        self.check_open()?;
        self.streams
            .get_mut(stream)
            .ok_or_else(|| StorageError::NotDeclared(stream.to_string()))?
            .slots
            .discard_row();
        Ok(())
    }

    fn entries(&self, stream: &str) -> u64 {
        self.streams.get(stream).map_or(0, |s| s.slots.rows)
    }

    fn streams(&self) -> Vec<String> {
        self.streams.keys().cloned().collect()
    }

    fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    fn close(&mut self) -> StorageResult<FileSummary> {
        self.check_open()?;
        let result = self.finish();
        self.poison(result)
    }
}

impl Drop for ColumnarWriter {
    fn drop(&mut self) {
        if self.file.is_some() && !self.failed {
            warn!(path = %self.name, "columnar writer dropped without close; file has no footer");
        }
    }
}
