//! Reading event files outside of a process.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fire_io::{open_reader, SchemaRegistry, Storable};
use tracing::{debug, info};

use crate::error::{EventError, EventResult};
use crate::header::EventHeader;
use crate::rules::DropKeepRules;
use crate::store::{EventStore, ProductTag};

/// Steps through the events of a file the way a processor sees them.
///
/// ```no_run
/// # use std::path::Path;
/// # use std::sync::Arc;
/// # use fire_event::{register_headers, UserReader};
/// # fn main() -> fire_event::EventResult<()> {
/// let mut registry = fire_io::SchemaRegistry::new();
/// register_headers(&mut registry)?;
/// let mut reader = UserReader::new(Arc::new(registry), false);
/// reader.open(Path::new("sim.fcol"), 0)?;
/// while reader.next()? {
///     let count: &i32 = reader.get("count", None)?;
///     println!("{count}");
/// }
/// # Ok(())
/// # }
/// ```
///
/// With wrap-around the reader starts over at the first entry instead of
/// running out, so the caller owns the loop.
pub struct UserReader {
    event: EventStore,
    path: Option<PathBuf>,
    /// Next entry `next` loads.
    cursor: u64,
    /// Entry currently held, if any.
    current: Option<u64>,
    wrap_around: bool,
}

impl UserReader {
    /// A reader resolving types through `registry`, which must hold the
    /// header schemas.
    pub fn new(registry: Arc<SchemaRegistry>, wrap_around: bool) -> Self {
        Self {
            event: EventStore::new("readonly", registry, DropKeepRules::default()),
            path: None,
            cursor: 0,
            current: None,
            wrap_around,
        }
    }

    /// Open `path`, positioned so the next call to [`UserReader::next`]
    /// loads entry `skip`.
    ///
    /// When wrapping around, `skip` is taken modulo the number of entries.
    pub fn open(&mut self, path: &Path, skip: u64) -> EventResult<()> {
        let reader = open_reader(path)?;
        let entries = reader.events();
        info!(file = %path.display(), entries, skip, "opening file for reading");
        self.event.attach_input(reader);
        self.event.clear();
        self.path = Some(path.to_path_buf());
        self.current = None;
        self.cursor = if self.wrap_around && entries > 0 {
            skip % entries
        } else {
            skip
        };
        Ok(())
    }

    /// Load the next entry. Returns `false` once the file is exhausted,
    /// or when it holds no events at all.
    pub fn next(&mut self) -> EventResult<bool> {
        let entries = self.event.input_events()?;
        if self.cursor >= entries {
            if !self.wrap_around || entries == 0 {
                return Ok(false);
            }
            debug!(entries, "wrapping around to the first entry");
            self.cursor = 0;
        }
        self.event.clear();
        self.event.load_into(self.cursor)?;
        self.current = Some(self.cursor);
        self.cursor += 1;
        Ok(true)
    }

    /// Number of events in the open file (0 when nothing is open).
    pub fn entries(&self) -> u64 {
        self.event.input_events().unwrap_or(0)
    }

    pub fn is_open(&self) -> bool {
        self.event.input().is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Entry loaded by the last successful [`UserReader::next`].
    pub fn entry(&self) -> Option<u64> {
        self.current
    }

    /// Header of the loaded entry.
    pub fn header(&self) -> EventResult<&EventHeader> {
        match self.current {
            Some(_) => Ok(self.event.header()),
            None => Err(EventError::NoInput),
        }
    }

    /// The object `name` of the loaded entry; see [`EventStore::get`].
    pub fn get<T: Storable>(&mut self, name: &str, pass: Option<&str>) -> EventResult<&T> {
        if self.current.is_none() {
            return Err(EventError::NoInput);
        }
        self.event.get(name, pass)
    }

    pub fn exists(&self, name: &str, pass: Option<&str>) -> bool {
        self.event.exists(name, pass)
    }

    pub fn search(&self, name: &str, pass: &str, type_name: &str) -> EventResult<Vec<ProductTag>> {
        self.event.search(name, pass, type_name)
    }

    pub fn close(&mut self) {
        if self.event.detach_input().is_some() {
            debug!(path = ?self.path, "closed file");
        }
        self.path = None;
        self.current = None;
        self.cursor = 0;
    }
}

impl std::fmt::Debug for UserReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserReader")
            .field("path", &self.path)
            .field("entry", &self.current)
            .field("wrap_around", &self.wrap_around)
            .finish()
    }
}
