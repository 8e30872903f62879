use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{RowRecord, TreeFooter, TreeStreamFooter, MAGIC};
use crate::column::ColumnHandle;
use crate::config::{StorageFormat, WriterConfig};
use crate::error::{StorageError, StorageResult};
use crate::framing;
use crate::schema::TypeDescriptor;
use crate::stream::WriteStream;
use crate::traits::{FileSummary, StreamSummary, Writer};

struct TreeStream {
    slots: WriteStream,
    offsets: Vec<u64>,
}

/// Writes a row-tree file: one framed record per completed row.
pub struct TreeWriter {
    path: PathBuf,
    name: String,
    file: Option<BufWriter<File>>,
    offset: u64,
    config: WriterConfig,
    streams: BTreeMap<String, TreeStream>,
    failed: bool,
}

impl TreeWriter {
    pub fn create(path: &Path, config: WriterConfig) -> StorageResult<Self> {
        config.validate()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = BufWriter::new(File::create(path)?);
        let offset = framing::write_header(&mut file, MAGIC)?;
        debug!(path = %path.display(), "opened row-tree writer");
        Ok(Self {
            path: path.to_path_buf(),
            name: path.display().to_string(),
            file: Some(file),
            offset,
            config,
            streams: BTreeMap::new(),
            failed: false,
        })
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

    fn write_row(&mut self, name: &str) -> StorageResult<()> {
        let file = self.file.as_mut().ok_or(StorageError::Closed)?;
        let stream = self
            .streams
            .get_mut(name)
            .ok_or_else(|| StorageError::NotDeclared(name.to_string()))?;
        let mut record = RowRecord {
            blocks: Vec::with_capacity(stream.slots.columns.len()),
        };
        for (_, column) in stream.slots.columns.iter_mut() {
            let mut block = Vec::new();
            column.drain_into(&mut block)?;
            record.blocks.push(block);
        }
        let payload = framing::compress(&bincode::serialize(&record)?, self.config.compression_level)?;
        stream.offsets.push(self.offset);
        self.offset += framing::write_record(file, &payload)?;
        stream.slots.rows += 1;
        stream.slots.commit_row();
        Ok(())
    }

    fn finish(&mut self) -> StorageResult<FileSummary> {
        let footer = TreeFooter {
            streams: self
                .streams
                .iter()
                .map(|(name, stream)| TreeStreamFooter {
                    name: name.clone(),
                    descriptor: (*stream.slots.descriptor).clone(),
                    columns: stream.slots.specs(),
                    rows: stream.offsets.clone(),
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
            "closed row-tree file"
        );
        Ok(summary)
    }

    fn summary(&self) -> FileSummary {
        FileSummary {
            path: self.path.clone(),
            format: StorageFormat::RowTree,
            streams: self
                .streams
                .iter()
                .map(|(name, stream)| StreamSummary {
                    name: name.clone(),
                    type_name: stream.slots.descriptor.type_name(),
                    version: stream.slots.descriptor.version(),
                    entries: stream.slots.rows,
                    chunks: stream.offsets.len(),
                })
                .collect(),
        }
    }
}

impl std::fmt::Debug for TreeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeWriter")
            .field("path", &self.path)
            .field("streams", &self.streams.keys().collect::<Vec<_>>())
            .field("closed", &self.file.is_none())
            .field("failed", &self.failed)
            .finish()
    }
}

impl Writer for TreeWriter {
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
        let slots = WriteStream::new(descriptor, 1)?;
        debug!(stream, type_name = %slots.descriptor.type_name(), "declared stream");
        self.streams.insert(
            stream.to_string(),
            TreeStream {
                slots,
                offsets: Vec::new(),
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
        let result = self.write_row(stream);
        if let Err(err) = &result {
            if !matches!(err, StorageError::NotDeclared(_)) {
                warn!(path = %self.name, error = %err, "row-tree writer failed; further writes are refused");
                self.failed = true;
            }
        }
        result
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
        if result.is_err() {
            self.failed = true;
        }
        result
    }
}

impl Drop for TreeWriter {
    fn drop(&mut self) {
        if self.file.is_some() && !self.failed {
            warn!(path = %self.name, "row-tree writer dropped without close; file has no footer");
        }
    }
}
