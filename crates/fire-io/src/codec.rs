//! Typed serialization onto columns.
//!
//! A [`Storable`] type describes its layout with [`Storable::kind`] and moves
//! its members through a [`Saver`] or [`Loader`]. Aggregates name each member
//! with `field`; the saver and loader turn names into column paths, check
//! them against the stream's descriptor, and apply schema evolution on load.

use std::collections::BTreeMap;

use crate::atomic::{Atomic, AtomicKind};
use crate::column::{Buffer, ColumnBuffer};
use crate::error::{StorageError, StorageResult};
use crate::schema::{join, FieldKind, SchemaRegistry, TypeDescriptor, VersionTag, RESERVED_SIZE};
use crate::traits::{Reader, Writer};

pub(crate) static SIZE_KIND: FieldKind = FieldKind::Atomic(AtomicKind::U64);

/// A type that can be written to and read from columns.
///
/// Aggregates implement it by hand, naming every member:
///
/// ```ignore
/// impl Storable for Hit {
///     fn kind() -> FieldKind {
///         FieldKind::object("Hit", 1)
///     }
///     fn save(&self, saver: &mut Saver<'_>) -> StorageResult<()> {
///         saver.field("energy", &self.energy)?;
///         saver.field("layer", &self.layer)
///     }
///     fn load(&mut self, loader: &mut Loader<'_>) -> StorageResult<()> {
///         loader.field("energy", &mut self.energy)?;
///         loader.field("layer", &mut self.layer)
///     }
/// }
/// ```
///
/// The schema of every aggregate version must be registered in the
/// [`SchemaRegistry`] before a stream of it is declared.
pub trait Storable: Default + 'static {
    /// Column layout of the type.
    fn kind() -> FieldKind;

    fn save(&self, saver: &mut Saver<'_>) -> StorageResult<()>;

    fn load(&mut self, loader: &mut Loader<'_>) -> StorageResult<()>;

    /// Reset to the default value, keeping allocations where possible.
    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Writes one value of a stream into the writer's column buffers.
pub struct Saver<'a> {
    writer: &'a mut dyn Writer,
    stream: &'a str,
    descriptor: &'a TypeDescriptor,
    kind: &'a FieldKind,
    path: String,
}

impl<'a> Saver<'a> {
    pub(crate) fn root(
        writer: &'a mut dyn Writer,
        stream: &'a str,
        descriptor: &'a TypeDescriptor,
    ) -> Self {
        Self {
            writer,
            stream,
            descriptor,
            kind: &descriptor.root,
            path: String::new(),
        }
    }

    pub(crate) fn child<'b>(&'b mut self, segment: &str, kind: &'b FieldKind) -> Saver<'b> {
        Saver {
            writer: &mut *self.writer,
            stream: self.stream,
            descriptor: self.descriptor,
            kind,
            path: join(&self.path, segment),
        }
    }

    pub(crate) fn kind(&self) -> &'a FieldKind {
        self.kind
    }

    pub(crate) fn descriptor(&self) -> &'a TypeDescriptor {
        self.descriptor
    }

    pub(crate) fn writer_column(
        &mut self,
    ) -> StorageResult<&mut dyn crate::column::ColumnHandle> {
        self.writer.column(self.stream, &self.path)
    }

    /// Column path of the value being written.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn shape_mismatch(&self, expected: &str) -> StorageError {
        StorageError::SchemaMismatch(format!(
            "`{}` in stream `{}` is laid out as {}, not {expected}",
            self.path,
            self.stream,
            self.kind.type_name()
        ))
    }

    /// Append one scalar to the column at the current path.
    pub fn atomic<A: Atomic>(&mut self, value: A) -> StorageResult<()> {
        match self.kind {
            FieldKind::Atomic(kind) if *kind == A::KIND => {}
            other => {
                return Err(StorageError::TypeMismatch {
                    column: self.path.clone(),
                    expected: other.type_name(),
                    actual: A::KIND.to_string(),
                })
            }
        }
        let column = self.writer.column(self.stream, &self.path)?;
        let stored = column.kind();
        let buffer = column
            .as_any_mut()
            .downcast_mut::<ColumnBuffer<A>>()
            .ok_or_else(|| StorageError::TypeMismatch {
                column: self.path.clone(),
                expected: stored.to_string(),
                actual: A::KIND.to_string(),
            })?;
        buffer.push(value);
        Ok(())
    }

    /// Write member `name` of the aggregate at the current path.
    pub fn field<T: Storable>(&mut self, name: &str, value: &T) -> StorageResult<()> {
        let descriptor = self.descriptor;
        let FieldKind::Object(tag) = self.kind else {
            return Err(self.shape_mismatch("an aggregate"));
        };
        let spec = descriptor.schema(tag)?.field(name).ok_or_else(|| {
            StorageError::SchemaMismatch(format!("field `{name}` is not part of {tag}"))
        })?;
        let requested = T::kind();
        if spec.kind != requested {
            return Err(StorageError::SchemaMismatch(format!(
                "field `{name}` of {tag} is {}, not {}",
                spec.kind.type_name(),
                requested.type_name()
            )));
        }
        let mut child = self.child(name, &spec.kind);
        value.save(&mut child)
    }

    /// Write a sequence: its length, then every element under `data`.
    pub fn sequence<T: Storable>(&mut self, items: &[T]) -> StorageResult<()> {
        let FieldKind::Sequence(inner) = self.kind else {
            return Err(self.shape_mismatch("a sequence"));
        };
        self.child(RESERVED_SIZE, &SIZE_KIND)
            .atomic(items.len() as u64)?;
        let mut data = self.child("data", inner);
        for item in items {
            item.save(&mut data)?;
        }
        Ok(())
    }

    /// Write a map: its length, then the keys and the values in key order.
    pub fn map<K: Storable, V: Storable>(&mut self, entries: &BTreeMap<K, V>) -> StorageResult<()> {
        let FieldKind::Map(key_kind, value_kind) = self.kind else {
            return Err(self.shape_mismatch("a map"));
        };
        self.child(RESERVED_SIZE, &SIZE_KIND)
            .atomic(entries.len() as u64)?;
        let mut keys = self.child("keys", key_kind);
        for key in entries.keys() {
            key.save(&mut keys)?;
        }
        let mut vals = self.child("vals", value_kind);
        for value in entries.values() {
            value.save(&mut vals)?;
        }
        Ok(())
    }
}

/// Reads one value of a stream from the reader's buffers.
///
/// `kind` is the stored layout at the current path; `current` is the version
/// of the in-memory aggregate being filled, used to follow renames.
pub struct Loader<'a> {
    reader: &'a mut dyn Reader,
    registry: &'a SchemaRegistry,
    stream: &'a str,
    stored: &'a TypeDescriptor,
    kind: &'a FieldKind,
    current: Option<VersionTag>,
    path: String,
}

impl<'a> Loader<'a> {
    pub(crate) fn root(
        reader: &'a mut dyn Reader,
        registry: &'a SchemaRegistry,
        stream: &'a str,
        stored: &'a TypeDescriptor,
        current: Option<VersionTag>,
    ) -> Self {
        Self {
            reader,
            registry,
            stream,
            stored,
            kind: &stored.root,
            current,
            path: String::new(),
        }
    }

    pub(crate) fn typed_root<T: Storable>(
        reader: &'a mut dyn Reader,
        registry: &'a SchemaRegistry,
        stream: &'a str,
        stored: &'a TypeDescriptor,
    ) -> StorageResult<Self> {
        let current = resolve_current::<T>(registry, &stored.root)?;
        Ok(Self::root(reader, registry, stream, stored, current))
    }

    pub(crate) fn child<'b>(
        &'b mut self,
        segment: &str,
        kind: &'b FieldKind,
        current: Option<VersionTag>,
    ) -> Loader<'b> {
        Loader {
            reader: &mut *self.reader,
            registry: self.registry,
            stream: self.stream,
            stored: self.stored,
            kind,
            current,
            path: join(&self.path, segment),
        }
    }

    pub(crate) fn kind(&self) -> &'a FieldKind {
        self.kind
    }

    pub(crate) fn stored(&self) -> &'a TypeDescriptor {
        self.stored
    }

    pub(crate) fn reader_buffer(
        &mut self,
    ) -> StorageResult<&mut dyn crate::column::BufferHandle> {
        self.reader.buffer(self.stream, &self.path)
    }

    pub(crate) fn exhausted(&self) -> StorageError {
        StorageError::ColumnExhausted {
            stream: self.stream.to_string(),
            column: self.path.clone(),
        }
    }

    /// Column path of the value being read.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Version the current aggregate was stored with.
    pub fn stored_version(&self) -> Option<u32> {
        self.kind.tag().map(|tag| tag.version)
    }

    pub(crate) fn shape_mismatch(&self, expected: &str) -> StorageError {
        StorageError::SchemaMismatch(format!(
            "`{}` in stream `{}` is stored as {}, not {expected}",
            self.path,
            self.stream,
            self.kind.type_name()
        ))
    }

    /// Read the next scalar of the column at the current path.
    pub fn atomic<A: Atomic>(&mut self) -> StorageResult<A> {
        match self.kind {
            FieldKind::Atomic(kind) if *kind == A::KIND => {}
            other => {
                return Err(StorageError::TypeMismatch {
                    column: self.path.clone(),
                    expected: other.type_name(),
                    actual: A::KIND.to_string(),
                })
            }
        }
        let handle = self.reader.buffer(self.stream, &self.path)?;
        let stored = handle.kind();
        let buffer = handle
            .as_any_mut()
            .downcast_mut::<Buffer<A>>()
            .ok_or_else(|| StorageError::TypeMismatch {
                column: self.path.clone(),
                expected: stored.to_string(),
                actual: A::KIND.to_string(),
            })?;
        match buffer.read() {
            Some(value) => Ok(value),
            None => Err(self.exhausted()),
        }
    }

    /// Read member `name` of the aggregate at the current path.
    ///
    /// A member renamed since the stored version is read under its stored
    /// name. A member the stored version does not have is cleared.
    pub fn field<T: Storable>(&mut self, name: &str, value: &mut T) -> StorageResult<()> {
        let stored = self.stored;
        let FieldKind::Object(stored_tag) = self.kind else {
            return Err(self.shape_mismatch("an aggregate"));
        };
        let schema = stored.schema(stored_tag)?;
        let stored_name = match &self.current {
            Some(current) => self.registry.stored_name(
                &current.type_name,
                stored_tag.version,
                current.version,
                name,
            ),
            None => name.to_string(),
        };
        match schema.field(&stored_name) {
            Some(spec) => {
                let current = resolve_current::<T>(self.registry, &spec.kind)?;
                let mut child = self.child(&stored_name, &spec.kind, current);
                value.load(&mut child)
            }
            None => {
                value.clear();
                Ok(())
            }
        }
    }

    /// Read a sequence written by [`Saver::sequence`].
    pub fn sequence<T: Storable>(&mut self, out: &mut Vec<T>) -> StorageResult<()> {
        let FieldKind::Sequence(inner) = self.kind else {
            return Err(self.shape_mismatch("a sequence"));
        };
        let len = self
            .child(RESERVED_SIZE, &SIZE_KIND, None)
            .atomic::<u64>()?;
        out.clear();
        out.reserve(len as usize);
        let current = resolve_current::<T>(self.registry, inner)?;
        let mut data = self.child("data", inner, current);
        for _ in 0..len {
            let mut item = T::default();
            item.load(&mut data)?;
            out.push(item);
        }
        Ok(())
    }

    /// Read a map written by [`Saver::map`].
    pub fn map<K: Storable + Ord, V: Storable>(
        &mut self,
        out: &mut BTreeMap<K, V>,
    ) -> StorageResult<()> {
        let FieldKind::Map(key_kind, value_kind) = self.kind else {
            return Err(self.shape_mismatch("a map"));
        };
        let len = self
            .child(RESERVED_SIZE, &SIZE_KIND, None)
            .atomic::<u64>()?;
        let mut keys = Vec::with_capacity(len as usize);
        let key_current = resolve_current::<K>(self.registry, key_kind)?;
        let mut key_loader = self.child("keys", key_kind, key_current);
        for _ in 0..len {
            let mut key = K::default();
            key.load(&mut key_loader)?;
            keys.push(key);
        }
        out.clear();
        let value_current = resolve_current::<V>(self.registry, value_kind)?;
        let mut value_loader = self.child("vals", value_kind, value_current);
        for key in keys {
            let mut value = V::default();
            value.load(&mut value_loader)?;
            out.insert(key, value);
        }
        Ok(())
    }
}

/// Check that an aggregate stored as `stored` can be read into `T`.
///
/// Returns the in-memory version tag of `T` when it is an aggregate.
fn resolve_current<T: Storable>(
    registry: &SchemaRegistry,
    stored: &FieldKind,
) -> StorageResult<Option<VersionTag>> {
    let FieldKind::Object(current) = T::kind() else {
        return Ok(None);
    };
    let FieldKind::Object(stored_tag) = stored else {
        return Err(StorageError::SchemaMismatch(format!(
            "stored {} cannot be read as {}",
            stored.type_name(),
            current.type_name
        )));
    };
    if stored_tag.type_name != current.type_name {
        return Err(StorageError::SchemaMismatch(format!(
            "stored {stored_tag} cannot be read as {current}"
        )));
    }
    if stored_tag.version > current.version {
        return Err(StorageError::SchemaMismatch(format!(
            "stored {stored_tag} is newer than {current}"
        )));
    }
    if stored_tag.version < current.version && registry.schema(stored_tag).is_none() {
        return Err(StorageError::UnregisteredVersion {
            type_name: stored_tag.type_name.to_string(),
            version: stored_tag.version,
        });
    }
    Ok(Some(current))
}

/// Declare a stream of `T` using the registered schemas.
pub fn declare<T: Storable>(
    writer: &mut dyn Writer,
    registry: &SchemaRegistry,
    stream: &str,
) -> StorageResult<()> {
    writer.declare(stream, registry.describe_type::<T>()?)
}

/// Append `value` as the next row of `stream`.
pub fn write<T: Storable>(writer: &mut dyn Writer, stream: &str, value: &T) -> StorageResult<()> {
    let descriptor = writer
        .descriptor(stream)
        .ok_or_else(|| StorageError::NotDeclared(stream.to_string()))?;
    let requested = T::kind();
    if descriptor.root != requested {
        return Err(StorageError::SchemaMismatch(format!(
            "stream `{stream}` holds {}, not {}",
            descriptor.type_name(),
            requested.type_name()
        )));
    }
    let saved = value.save(&mut Saver::root(writer, stream, &descriptor));
    if let Err(err) = saved {
        writer.discard_row(stream)?;
        return Err(err);
    }
    writer.end_row(stream)
}

/// Load row `row` of `stream` into `value`.
///
/// Reading rows in increasing order is the fast path. Any other order is
/// still correct; the reader may have to restart at a chunk boundary.
pub fn load_row<T: Storable>(
    reader: &mut dyn Reader,
    registry: &SchemaRegistry,
    stream: &str,
    row: u64,
    value: &mut T,
) -> StorageResult<()> {
    let stored = reader
        .descriptor(stream)
        .ok_or_else(|| StorageError::StreamNotFound(stream.to_string()))?;
    let mut at = reader.seek(stream, row)?;
    while at < row {
        let mut scratch = T::default();
        load_current(reader, registry, stream, &stored, &mut scratch)?;
        at += 1;
    }
    load_current(reader, registry, stream, &stored, value)
}

/// Load every row of `stream` in order.
pub fn read_all<T: Storable>(
    reader: &mut dyn Reader,
    registry: &SchemaRegistry,
    stream: &str,
) -> StorageResult<Vec<T>> {
    let entries = reader.entries(stream)?;
    let mut rows = Vec::with_capacity(entries as usize);
    for row in 0..entries {
        let mut value = T::default();
        load_row(reader, registry, stream, row, &mut value)?;
        rows.push(value);
    }
    Ok(rows)
}

fn load_current<T: Storable>(
    reader: &mut dyn Reader,
    registry: &SchemaRegistry,
    stream: &str,
    stored: &TypeDescriptor,
    value: &mut T,
) -> StorageResult<()> {
    let loaded = Loader::typed_root::<T>(reader, registry, stream, stored)
        .and_then(|mut loader| value.load(&mut loader));
    if let Err(err) = loaded {
        reader.reset(stream);
        return Err(err);
    }
    reader.end_row(stream)
}

macro_rules! impl_storable_atomic {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Storable for $ty {
                fn kind() -> FieldKind {
                    FieldKind::Atomic(<$ty as Atomic>::KIND)
                }

                fn save(&self, saver: &mut Saver<'_>) -> StorageResult<()> {
                    saver.atomic(*self)
                }

                fn load(&mut self, loader: &mut Loader<'_>) -> StorageResult<()> {
                    *self = loader.atomic()?;
                    Ok(())
                }
            }
        )*
    };
}

impl_storable_atomic!(bool, u8, i32, i64, u32, u64, f32, f64);

impl Storable for String {
    fn kind() -> FieldKind {
        FieldKind::Atomic(AtomicKind::Str)
    }

    fn save(&self, saver: &mut Saver<'_>) -> StorageResult<()> {
        saver.atomic(self.clone())
    }

    fn load(&mut self, loader: &mut Loader<'_>) -> StorageResult<()> {
        *self = loader.atomic()?;
        Ok(())
    }

    fn clear(&mut self) {
        String::clear(self);
    }
}

impl<T: Storable> Storable for Vec<T> {
    fn kind() -> FieldKind {
        FieldKind::sequence(T::kind())
    }

    fn save(&self, saver: &mut Saver<'_>) -> StorageResult<()> {
        saver.sequence(self)
    }

    fn load(&mut self, loader: &mut Loader<'_>) -> StorageResult<()> {
        loader.sequence(self)
    }

    fn clear(&mut self) {
        Vec::clear(self);
    }
}

impl<K: Storable + Ord, V: Storable> Storable for BTreeMap<K, V> {
    fn kind() -> FieldKind {
        FieldKind::map(K::kind(), V::kind())
    }

    fn save(&self, saver: &mut Saver<'_>) -> StorageResult<()> {
        saver.map(self)
    }

    fn load(&mut self, loader: &mut Loader<'_>) -> StorageResult<()> {
        loader.map(self)
    }

    fn clear(&mut self) {
        BTreeMap::clear(self);
    }
}
