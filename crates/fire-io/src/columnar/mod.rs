//! Chunked columnar backend (`.fcol`).
//!
//! Rows of a stream are staged per column and flushed every
//! `rows_per_chunk` rows. A flush writes one zstd-compressed, CRC-checked
//! block per leaf column; the footer records, for every stream, its
//! descriptor, its entry count and the block table of every chunk:
//!
//! ```text
//! [magic "FIRC"] [version]
//! [chunk 0 of stream A: block per column] [chunk 0 of stream B] ...
//! [footer] [trailer]
//! ```

mod reader;
mod writer;

pub use reader::ColumnarReader;
pub use writer::ColumnarWriter;

use serde::{Deserialize, Serialize};

use crate::atomic::AtomicKind;
use crate::schema::TypeDescriptor;

pub(crate) const MAGIC: &[u8; 4] = b"FIRC";

/// Location of one compressed column block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct BlockRef {
    pub offset: u64,
    pub length: u64,
    pub crc32: u32,
    pub values: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ChunkFooter {
    pub first_row: u64,
    pub rows: u64,
    /// One block per column, in column order.
    pub blocks: Vec<BlockRef>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StreamFooter {
    pub name: String,
    pub descriptor: TypeDescriptor,
    pub entries: u64,
    pub rows_per_chunk: u64,
    pub columns: Vec<(String, AtomicKind)>,
    pub chunks: Vec<ChunkFooter>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ColumnarFooter {
    pub streams: Vec<StreamFooter>,
}

/// Index of the chunk holding `row`.
pub(crate) fn chunk_of(chunks: &[ChunkFooter], row: u64) -> usize {
    chunks.partition_point(|chunk| chunk.first_row + chunk.rows <= row)
}
