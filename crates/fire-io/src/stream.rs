//! Per-stream column bookkeeping shared by the backends.

use std::collections::HashMap;
use std::sync::Arc;

use crate::atomic::AtomicKind;
use crate::column::{new_buffer, new_column, BufferHandle, ColumnHandle};
use crate::error::{StorageError, StorageResult};
use crate::schema::TypeDescriptor;

/// Write-side state of one declared stream.
pub(crate) struct WriteStream {
    pub descriptor: Arc<TypeDescriptor>,
    pub columns: Vec<(String, Box<dyn ColumnHandle>)>,
    lookup: HashMap<String, usize>,
    /// Rows completed since the stream was declared.
    pub rows: u64,
    /// Rows staged since the last flush.
    pub pending: usize,
    /// Staged length of each column when the last row completed.
    marks: Vec<usize>,
}

impl WriteStream {
    pub fn new(descriptor: TypeDescriptor, capacity: usize) -> StorageResult<Self> {
        let specs = descriptor.columns()?;
        let mut columns = Vec::with_capacity(specs.len());
        let mut lookup = HashMap::with_capacity(specs.len());
        for (index, (name, kind)) in specs.into_iter().enumerate() {
            lookup.insert(name.clone(), index);
            columns.push((name, new_column(kind, capacity)));
        }
        let marks = vec![0; columns.len()];
        Ok(Self {
            descriptor: Arc::new(descriptor),
            columns,
            lookup,
            rows: 0,
            pending: 0,
            marks,
        })
    }

    pub fn column(&mut self, stream: &str, column: &str) -> StorageResult<&mut dyn ColumnHandle> {
        let index = *self
            .lookup
            .get(column)
            .ok_or_else(|| StorageError::UnknownColumn {
                stream: stream.to_string(),
                column: column.to_string(),
            })?;
        Ok(self.columns[index].1.as_mut())
    }

    /// Remember the staged lengths as the boundary of a complete row.
    pub fn commit_row(&mut self) {
        for (mark, (_, column)) in self.marks.iter_mut().zip(self.columns.iter()) {
            *mark = column.len();
        }
    }

    /// Drop values staged since the last complete row.
    pub fn discard_row(&mut self) {
        for (mark, (_, column)) in self.marks.iter().zip(self.columns.iter_mut()) {
            column.truncate(*mark);
        }
    }

    pub fn specs(&self) -> Vec<(String, AtomicKind)> {
        self.columns
            .iter()
            .map(|(name, column)| (name.clone(), column.kind()))
            .collect()
    }
}

/// Read-side state of one stream.
///
/// Each column buffer remembers which storage unit (chunk or row) it was
/// filled from, so a column is decoded at most once per unit.
pub(crate) struct ReadStream {
    pub descriptor: Arc<TypeDescriptor>,
    columns: Vec<(String, AtomicKind)>,
    lookup: HashMap<String, usize>,
    buffers: Vec<Box<dyn BufferHandle>>,
    loaded: Vec<Option<u64>>,
    pub entries: u64,
    /// Row the next typed load reads.
    pub row: u64,
}

impl ReadStream {
    pub fn new(descriptor: TypeDescriptor, entries: u64) -> StorageResult<Self> {
        let columns = descriptor.columns()?;
        let lookup = columns
            .iter()
            .enumerate()
            .map(|(index, (name, _))| (name.clone(), index))
            .collect();
        let buffers = columns.iter().map(|(_, kind)| new_buffer(*kind)).collect();
        let loaded = vec![None; columns.len()];
        Ok(Self {
            descriptor: Arc::new(descriptor),
            columns,
            lookup,
            buffers,
            loaded,
            entries,
            row: 0,
        })
    }

    pub fn index(&self, stream: &str, column: &str) -> StorageResult<usize> {
        self.lookup
            .get(column)
            .copied()
            .ok_or_else(|| StorageError::UnknownColumn {
                stream: stream.to_string(),
                column: column.to_string(),
            })
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_loaded(&self, index: usize, unit: u64) -> bool {
        self.loaded[index] == Some(unit)
    }

    pub fn fill(&mut self, index: usize, unit: u64, block: &[u8]) -> StorageResult<()> {
        self.buffers[index].load(block)?;
        self.loaded[index] = Some(unit);
        Ok(())
    }

    pub fn buffer(&mut self, index: usize) -> &mut dyn BufferHandle {
        self.buffers[index].as_mut()
    }

    /// Move the cursor to `row` and forget every decoded buffer.
    pub fn reposition(&mut self, row: u64) {
        self.row = row;
        for (buffer, loaded) in self.buffers.iter_mut().zip(self.loaded.iter_mut()) {
            buffer.reset();
            *loaded = None;
        }
    }

    pub fn check_row(&self, stream: &str, row: u64) -> StorageResult<()> {
        if row >= self.entries {
            return Err(StorageError::RowOutOfRange {
                stream: stream.to_string(),
                row,
                entries: self.entries,
            });
        }
        Ok(())
    }
}
