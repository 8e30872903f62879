//! In-memory staging for single columns.
//!
//! Writers stage values in a [`ColumnBuffer`] until the stream's chunk is
//! flushed; readers decode one block at a time into a [`Buffer`]. Both are
//! generic over the value type and reached through object-safe handles
//! ([`ColumnHandle`], [`BufferHandle`]) so backends can own a heterogeneous
//! set of columns.

use std::any::Any;
use std::io::Cursor;

use crate::atomic::{Atomic, AtomicKind, Scalar};
use crate::error::{StorageError, StorageResult};

/// Write-side view of one column buffer.
pub trait ColumnHandle: Send {
    fn kind(&self) -> AtomicKind;

    /// Number of staged (not yet flushed) values.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of values already flushed.
    fn flushed(&self) -> u64;

    /// Append a dynamically typed value.
    fn push_scalar(&mut self, value: Scalar) -> StorageResult<()>;

    /// Drop staged values past the first `len`.
    fn truncate(&mut self, len: usize);

    /// Encode the staged values into `out` and clear the buffer for reuse.
    ///
    /// Returns the number of values encoded.
    fn drain_into(&mut self, out: &mut Vec<u8>) -> StorageResult<u64>;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Staging area for one leaf column of one stream.
#[derive(Debug)]
pub struct ColumnBuffer<A: Atomic> {
    entries: Vec<A>,
    capacity: usize,
    flushed: u64,
}

impl<A: Atomic> ColumnBuffer<A> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            flushed: 0,
        }
    }

    pub fn push(&mut self, value: A) {
        self.entries.push(value);
    }

    pub fn entries(&self) -> &[A] {
        &self.entries
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<A: Atomic> ColumnHandle for ColumnBuffer<A> {
    fn kind(&self) -> AtomicKind {
        A::KIND
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn flushed(&self) -> u64 {
        self.flushed
    }

    fn push_scalar(&mut self, value: Scalar) -> StorageResult<()> {
        let actual = value.kind();
        let value = A::from_scalar(value).ok_or_else(|| StorageError::TypeMismatch {
            column: String::new(),
            expected: A::KIND.to_string(),
            actual: actual.to_string(),
        })?;
        self.entries.push(value);
        Ok(())
    }

    fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }

    fn drain_into(&mut self, out: &mut Vec<u8>) -> StorageResult<u64> {
        bincode::serialize_into(&mut *out, &self.entries)?;
        let count = self.entries.len() as u64;
        self.flushed += count;
        self.entries.clear();
        Ok(count)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Read-side view of one decoded block.
pub trait BufferHandle: Send {
    fn kind(&self) -> AtomicKind;

    /// Replace the contents with the values encoded in `block`.
    fn load(&mut self, block: &[u8]) -> StorageResult<()>;

    /// Drop the contents; the next read requires a new `load`.
    fn reset(&mut self);

    /// Values left to read in the current block.
    fn remaining(&self) -> usize;

    fn next_scalar(&mut self) -> Option<Scalar>;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// One decoded block of a column, read front to back.
///
/// The value storage is kept across loads, so moving to the next chunk only
/// reallocates when the new block is larger.
#[derive(Debug, Default)]
pub struct Buffer<A: Atomic> {
    values: Vec<A>,
    cursor: usize,
}

impl<A: Atomic> Buffer<A> {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            cursor: 0,
        }
    }

    /// Take the next value, or `None` when the block is exhausted.
    pub fn read(&mut self) -> Option<A> {
        let value = self.values.get_mut(self.cursor).map(std::mem::take)?;
        self.cursor += 1;
        Some(value)
    }
}

impl<A: Atomic> BufferHandle for Buffer<A> {
    fn kind(&self) -> AtomicKind {
        A::KIND
    }

    fn load(&mut self, block: &[u8]) -> StorageResult<()> {
        let mut cursor = Cursor::new(block);
        let count: u64 = bincode::deserialize_from(&mut cursor)?;
        self.values.clear();
        self.values.reserve(count as usize);
        for _ in 0..count {
            self.values.push(bincode::deserialize_from(&mut cursor)?);
        }
        self.cursor = 0;
        Ok(())
    }

    fn reset(&mut self) {
        self.values.clear();
        self.cursor = 0;
    }

    fn remaining(&self) -> usize {
        self.values.len() - self.cursor
    }

    fn next_scalar(&mut self) -> Option<Scalar> {
        self.read().map(Atomic::into_scalar)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Allocate a write buffer for a column of `kind`.
pub fn new_column(kind: AtomicKind, capacity: usize) -> Box<dyn ColumnHandle> {
    match kind {
        AtomicKind::Bool => Box::new(ColumnBuffer::<bool>::with_capacity(capacity)),
        AtomicKind::U8 => Box::new(ColumnBuffer::<u8>::with_capacity(capacity)),
        AtomicKind::I32 => Box::new(ColumnBuffer::<i32>::with_capacity(capacity)),
        AtomicKind::I64 => Box::new(ColumnBuffer::<i64>::with_capacity(capacity)),
        AtomicKind::U32 => Box::new(ColumnBuffer::<u32>::with_capacity(capacity)),
        AtomicKind::U64 => Box::new(ColumnBuffer::<u64>::with_capacity(capacity)),
        AtomicKind::F32 => Box::new(ColumnBuffer::<f32>::with_capacity(capacity)),
        AtomicKind::F64 => Box::new(ColumnBuffer::<f64>::with_capacity(capacity)),
        AtomicKind::Str => Box::new(ColumnBuffer::<String>::with_capacity(capacity)),
    }
}

/// Allocate a read buffer for a column of `kind`.
pub fn new_buffer(kind: AtomicKind) -> Box<dyn BufferHandle> {
    match kind {
        AtomicKind::Bool => Box::new(Buffer::<bool>::new()),
        AtomicKind::U8 => Box::new(Buffer::<u8>::new()),
        AtomicKind::I32 => Box::new(Buffer::<i32>::new()),
        AtomicKind::I64 => Box::new(Buffer::<i64>::new()),
        AtomicKind::U32 => Box::new(Buffer::<u32>::new()),
        AtomicKind::U64 => Box::new(Buffer::<u64>::new()),
        AtomicKind::F32 => Box::new(Buffer::<f32>::new()),
        AtomicKind::F64 => Box::new(Buffer::<f64>::new()),
        AtomicKind::Str => Box::new(Buffer::<String>::new()),
    }
}
