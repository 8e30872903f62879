//! Row-tree backend (`.ftree`).
//!
//! Every completed row becomes one framed record holding the encoded values
//! of each of the stream's columns for that row. The footer keeps the record
//! offsets of every stream, so any row is reachable with one seek:
//!
//! ```text
//! [magic "FIRT"] [version]
//! [len u32 LE] [crc u32 LE] [zstd(bincode(RowRecord))] ...
//! [footer] [trailer]
//! ```

mod reader;
mod writer;

pub use reader::TreeReader;
pub use writer::TreeWriter;

use serde::{Deserialize, Serialize};

use crate::atomic::AtomicKind;
use crate::schema::TypeDescriptor;

pub(crate) const MAGIC: &[u8; 4] = b"FIRT";

/// Values of one row, one encoded block per column.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct RowRecord {
    pub blocks: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TreeStreamFooter {
    pub name: String,
    pub descriptor: TypeDescriptor,
    pub columns: Vec<(String, AtomicKind)>,
    /// Record offset of every row.
    pub rows: Vec<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TreeFooter {
    pub streams: Vec<TreeStreamFooter>,
}
