//! Stream copying between files, with optional conversion to the latest
//! registered schema versions.
//!
//! Every row goes through a [`Value`], even when the layout is kept: the
//! destination chunks and compresses on its own terms, so copied files hold
//! the same descriptors and values but not the same bytes.

use std::ops::Range;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::dynamic::Value;
use crate::error::{StorageError, StorageResult};
use crate::schema::{SchemaRegistry, TypeDescriptor};
use crate::traits::{Reader, Writer};
use crate::RUN_HEADER;

/// Which streams and rows to copy.
#[derive(Clone, Debug, Default)]
pub struct CopySelection {
    /// Streams whose full name matches; all streams when unset.
    pub streams: Option<Regex>,
    /// Event rows to copy; all rows when unset. Run headers are always
    /// copied whole.
    pub rows: Option<Range<u64>>,
}

impl CopySelection {
    pub fn all() -> Self {
        Self::default()
    }

    /// Select streams whose whole name matches `pattern`.
    pub fn with_streams(mut self, pattern: &str) -> StorageResult<Self> {
        let anchored = format!("^(?:{pattern})$");
        let regex = Regex::new(&anchored).map_err(|e| StorageError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        self.streams = Some(regex);
        Ok(self)
    }

    pub fn with_rows(mut self, rows: Range<u64>) -> Self {
        self.rows = Some(rows);
        self
    }

    pub fn matches(&self, stream: &str) -> bool {
        self.streams.as_ref().map_or(true, |re| re.is_match(stream))
    }

    fn rows_for(&self, stream: &str, entries: u64) -> Range<u64> {
        match &self.rows {
            Some(rows) if stream != RUN_HEADER => rows.start.min(entries)..rows.end.min(entries),
            _ => 0..entries,
        }
    }
}

/// What a copy did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CopyReport {
    pub streams: usize,
    pub rows: u64,
    /// Streams copied with their stored layout.
    pub passthrough: usize,
    /// Streams converted to a newer registered layout.
    pub converted: usize,
}

/// Copy the selected streams and rows of `source` into `dest`.
///
/// `dest` is not closed.
pub fn copy(
    source: &mut dyn Reader,
    dest: &mut dyn Writer,
    selection: &CopySelection,
    registry: &SchemaRegistry,
) -> StorageResult<CopyReport> {
    let mut report = CopyReport::default();
    for stream in source.streams() {
        if !selection.matches(&stream) {
            continue;
        }
        let stored = source
            .descriptor(&stream)
            .ok_or_else(|| StorageError::StreamNotFound(stream.clone()))?;
        let target = declare_target(dest, registry, &stream, &stored)?;
        let rows = selection.rows_for(&stream, source.entries(&stream)?);
        for row in rows.clone() {
            copy_row(source, dest, registry, &stream, row)?;
        }
        report.streams += 1;
        report.rows += rows.end - rows.start;
        if *target == *stored {
            report.passthrough += 1;
        } else {
            report.converted += 1;
        }
        debug!(stream = %stream, rows = rows.end - rows.start, converted = *target != *stored, "copied stream");
    }
    info!(
        source = source.name(),
        dest = dest.name(),
        streams = report.streams,
        rows = report.rows,
        "copy complete"
    );
    Ok(report)
}

/// Copy one row of `stream`, declaring the stream in `dest` on first use.
///
/// Returns `true` when the row was converted to a newer layout.
pub fn copy_row(
    source: &mut dyn Reader,
    dest: &mut dyn Writer,
    registry: &SchemaRegistry,
    stream: &str,
    row: u64,
) -> StorageResult<bool> {
    let stored = source
        .descriptor(stream)
        .ok_or_else(|| StorageError::StreamNotFound(stream.to_string()))?;
    let target = declare_target(dest, registry, stream, &stored)?;
    let value = Value::read_row(source, registry, stream, row)?;
    let converted = *target != *stored;
    let value = if converted {
        value.evolve(registry, (&stored, &stored.root), (&target, &target.root))?
    } else {
        value
    };
    value.write_row(dest, stream)?;
    Ok(converted)
}

/// The layout a stored stream is written with: every known aggregate moves
/// to its latest registered version.
pub fn target_descriptor(
    registry: &SchemaRegistry,
    stored: &TypeDescriptor,
) -> StorageResult<TypeDescriptor> {
    registry.check_stored(stored)?;
    let upgraded = registry.upgrade(&stored.root);
    if upgraded == stored.root {
        return Ok(stored.clone());
    }
    registry.describe(&upgraded)
}

fn declare_target(
    dest: &mut dyn Writer,
    registry: &SchemaRegistry,
    stream: &str,
    stored: &TypeDescriptor,
) -> StorageResult<std::sync::Arc<TypeDescriptor>> {
    if let Some(existing) = dest.descriptor(stream) {
        return Ok(existing);
    }
    dest.declare(stream, target_descriptor(registry, stored)?)?;
    dest.descriptor(stream)
        .ok_or_else(|| StorageError::NotDeclared(stream.to_string()))
}
