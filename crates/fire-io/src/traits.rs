use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::column::{BufferHandle, ColumnHandle};
use crate::config::StorageFormat;
use crate::error::StorageResult;
use crate::schema::TypeDescriptor;
use crate::{EVENT_HEADER, RUN_HEADER};

/// Summary of one stream in a file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StreamSummary {
    pub name: String,
    pub type_name: String,
    pub version: Option<u32>,
    pub entries: u64,
    pub chunks: usize,
}

/// Summary of a written or opened file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub path: PathBuf,
    pub format: StorageFormat,
    pub streams: Vec<StreamSummary>,
}

impl FileSummary {
    pub fn stream(&self, name: &str) -> Option<&StreamSummary> {
        self.streams.iter().find(|s| s.name == name)
    }
}

/// Write side of a storage backend.
///
/// A writer owns one column buffer per leaf column of every declared stream
/// and decides when to flush them. Rows of one stream are flushed together,
/// so all columns of a stream stay aligned chunk by chunk.
///
/// Implementations must satisfy:
/// - `declare` with a changed descriptor after the first row of a stream fails.
/// - Every call after `close` fails with a state error.
/// - An I/O failure during a flush poisons the writer.
pub trait Writer {
    /// Display name of the destination (usually its path).
    fn name(&self) -> &str;

    /// Register the layout of `stream` and allocate its column buffers.
    fn declare(&mut self, stream: &str, descriptor: TypeDescriptor) -> StorageResult<()>;

    fn descriptor(&self, stream: &str) -> Option<Arc<TypeDescriptor>>;

    /// The staging buffer of one leaf column.
    fn column(&mut self, stream: &str, column: &str) -> StorageResult<&mut dyn ColumnHandle>;

    /// Mark the current row of `stream` complete; may flush a chunk.
    fn end_row(&mut self, stream: &str) -> StorageResult<()>;

    /// Drop the values staged for the current, unfinished row of `stream`.
    fn discard_row(&mut self, stream: &str) -> StorageResult<()>;

    /// Rows completed so far for `stream` (0 if undeclared).
    fn entries(&self, stream: &str) -> u64;

    /// Names of all declared streams, sorted.
    fn streams(&self) -> Vec<String>;

    fn is_closed(&self) -> bool;

    /// Flush what is left, write the footer, and release the file.
    fn close(&mut self) -> StorageResult<FileSummary>;
}

/// Read side of a storage backend.
///
/// Every stream has a row cursor. Typed loads pull values column by column
/// through [`Reader::buffer`] and finish each row with [`Reader::end_row`].
pub trait Reader {
    fn name(&self) -> &str;

    /// Names of all streams in the file, sorted.
    fn streams(&self) -> Vec<String>;

    fn descriptor(&self, stream: &str) -> Option<Arc<TypeDescriptor>>;

    /// Total rows of `stream`, independent of chunking.
    fn entries(&self, stream: &str) -> StorageResult<u64>;

    /// Number of events in the file.
    fn events(&self) -> u64 {
        self.entries(EVENT_HEADER).unwrap_or(0)
    }

    /// Number of run headers in the file.
    fn runs(&self) -> u64 {
        self.entries(RUN_HEADER).unwrap_or(0)
    }

    /// Move the cursor of `stream` toward `row`.
    ///
    /// Returns the row the cursor now points at, which is `row` itself or an
    /// earlier row of the same chunk; the caller reads and discards rows up
    /// to `row`.
    fn seek(&mut self, stream: &str, row: u64) -> StorageResult<u64>;

    /// The buffer of one column, filled for the chunk under the cursor.
    fn buffer(&mut self, stream: &str, column: &str) -> StorageResult<&mut dyn BufferHandle>;

    /// Advance the cursor of `stream` past the current row.
    fn end_row(&mut self, stream: &str) -> StorageResult<()>;

    /// Forget the cursor and decoded buffers of `stream`, e.g. after a load
    /// failed halfway through a row.
    fn reset(&mut self, stream: &str);

    fn summary(&self) -> FileSummary;
}
