//! Schema-driven values for code that has no compiled type at hand.
//!
//! Pass-through copies, format conversion and the `dump` command read rows
//! as [`Value`] trees shaped by the stored descriptor, optionally evolve them
//! to a newer registered schema, and write them back out.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::atomic::Scalar;
use crate::codec::{Loader, Saver, SIZE_KIND};
use crate::error::{StorageError, StorageResult};
use crate::params::ParameterStorage;
use crate::schema::{FieldKind, SchemaRegistry, TypeDescriptor, RESERVED_SIZE};
use crate::traits::{Reader, Writer};

/// One stored value of any layout.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Atomic(Scalar),
    Sequence(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Parameters(ParameterStorage),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// The value a default-constructed object of `kind` stores.
    pub fn default_for(kind: &FieldKind, descriptor: &TypeDescriptor) -> StorageResult<Self> {
        Ok(match kind {
            FieldKind::Atomic(atomic) => Self::Atomic(Scalar::default_for(*atomic)),
            FieldKind::Sequence(_) => Self::Sequence(Vec::new()),
            FieldKind::Map(_, _) => Self::Map(Vec::new()),
            FieldKind::Parameters => Self::Parameters(ParameterStorage::new()),
            FieldKind::Object(tag) => {
                let schema = descriptor.schema(tag)?;
                let mut fields = BTreeMap::new();
                for field in &schema.fields {
                    fields.insert(field.name.clone(), Self::default_for(&field.kind, descriptor)?);
                }
                Self::Object(fields)
            }
        })
    }

    /// Member `name` of an aggregate value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Object(fields) => fields.get(name),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Atomic(scalar) => Some(scalar),
            _ => None,
        }
    }

    /// Read the value at the loader's position, shaped by the stored layout.
    pub fn read(loader: &mut Loader<'_>) -> StorageResult<Self> {
        let stored = loader.stored();
        match loader.kind() {
            FieldKind::Atomic(_) => {
                let next = loader.reader_buffer()?.next_scalar();
                next.map(Self::Atomic).ok_or_else(|| loader.exhausted())
            }
            FieldKind::Sequence(inner) => {
                let len = loader
                    .child(RESERVED_SIZE, &SIZE_KIND, None)
                    .atomic::<u64>()?;
                let mut data = loader.child("data", inner, None);
                let items = (0..len)
                    .map(|_| Self::read(&mut data))
                    .collect::<StorageResult<Vec<_>>>()?;
                Ok(Self::Sequence(items))
            }
            FieldKind::Map(key_kind, value_kind) => {
                let len = loader
                    .child(RESERVED_SIZE, &SIZE_KIND, None)
                    .atomic::<u64>()?;
                let keys = {
                    let mut keys = loader.child("keys", key_kind, None);
                    (0..len)
                        .map(|_| Self::read(&mut keys))
                        .collect::<StorageResult<Vec<_>>>()?
                };
                let mut vals = loader.child("vals", value_kind, None);
                let mut pairs = Vec::with_capacity(keys.len());
                for key in keys {
                    pairs.push((key, Self::read(&mut vals)?));
                }
                Ok(Self::Map(pairs))
            }
            FieldKind::Parameters => {
                let mut storage = ParameterStorage::new();
                loader.parameters(&mut storage)?;
                Ok(Self::Parameters(storage))
            }
            FieldKind::Object(tag) => {
                let schema = stored.schema(tag)?;
                let mut fields = BTreeMap::new();
                for field in &schema.fields {
                    let mut child = loader.child(&field.name, &field.kind, None);
                    fields.insert(field.name.clone(), Self::read(&mut child)?);
                }
                Ok(Self::Object(fields))
            }
        }
    }

    /// Read row `row` of `stream` as it was stored.
    pub fn read_row(
        reader: &mut dyn Reader,
        registry: &SchemaRegistry,
        stream: &str,
        row: u64,
    ) -> StorageResult<Self> {
        let stored = reader
            .descriptor(stream)
            .ok_or_else(|| StorageError::StreamNotFound(stream.to_string()))?;
        let mut at = reader.seek(stream, row)?;
        loop {
            let read = Self::read(&mut Loader::root(reader, registry, stream, &stored, None));
            let value = match read {
                Ok(value) => value,
                Err(err) => {
                    reader.reset(stream);
                    return Err(err);
                }
            };
            reader.end_row(stream)?;
            if at == row {
                return Ok(value);
            }
            at += 1;
        }
    }

    /// Write the value at the saver's position.
    pub fn write(&self, saver: &mut Saver<'_>) -> StorageResult<()> {
        let descriptor = saver.descriptor();
        match (saver.kind(), self) {
            (FieldKind::Atomic(kind), Self::Atomic(scalar)) if scalar.kind() == *kind => {
                saver.writer_column()?.push_scalar(scalar.clone())
            }
            (FieldKind::Sequence(inner), Self::Sequence(items)) => {
                saver
                    .child(RESERVED_SIZE, &SIZE_KIND)
                    .atomic(items.len() as u64)?;
                let mut data = saver.child("data", inner);
                items.iter().try_for_each(|item| item.write(&mut data))
            }
            (FieldKind::Map(key_kind, value_kind), Self::Map(pairs)) => {
                saver
                    .child(RESERVED_SIZE, &SIZE_KIND)
                    .atomic(pairs.len() as u64)?;
                let mut keys = saver.child("keys", key_kind);
                pairs.iter().try_for_each(|(key, _)| key.write(&mut keys))?;
                let mut vals = saver.child("vals", value_kind);
                pairs.iter().try_for_each(|(_, value)| value.write(&mut vals))
            }
            (FieldKind::Parameters, Self::Parameters(storage)) => saver.parameters(storage),
            (FieldKind::Object(tag), Self::Object(fields)) => {
                let schema = descriptor.schema(tag)?;
                for field in &schema.fields {
                    let value = fields.get(&field.name).ok_or_else(|| {
                        StorageError::SchemaMismatch(format!(
                            "value for {tag} has no field `{}`",
                            field.name
                        ))
                    })?;
                    value.write(&mut saver.child(&field.name, &field.kind))?;
                }
                Ok(())
            }
            (kind, _) => Err(saver.shape_mismatch(&format!("a value shaped like {}", kind.type_name()))),
        }
    }

    /// Append the value as the next row of `stream`.
    pub fn write_row(&self, writer: &mut dyn Writer, stream: &str) -> StorageResult<()> {
        let descriptor = writer
            .descriptor(stream)
            .ok_or_else(|| StorageError::NotDeclared(stream.to_string()))?;
        let saved = self.write(&mut Saver::root(writer, stream, &descriptor));
        if let Err(err) = saved {
            writer.discard_row(stream)?;
            return Err(err);
        }
        writer.end_row(stream)
    }

    /// Convert a value stored as `from` into the layout `to`.
    ///
    /// Renamed fields move to their new names, fields added since the stored
    /// version get default values and removed fields are dropped. Moving to
    /// an older version is refused.
    pub fn evolve(
        self,
        registry: &SchemaRegistry,
        from: (&TypeDescriptor, &FieldKind),
        to: (&TypeDescriptor, &FieldKind),
    ) -> StorageResult<Self> {
        let (from_desc, from_kind) = from;
        let (to_desc, to_kind) = to;
        match (from_kind, to_kind, self) {
            (FieldKind::Atomic(a), FieldKind::Atomic(b), value) if a == b => Ok(value),
            (FieldKind::Parameters, FieldKind::Parameters, value) => Ok(value),
            (FieldKind::Sequence(a), FieldKind::Sequence(b), Self::Sequence(items)) => items
                .into_iter()
                .map(|item| item.evolve(registry, (from_desc, &**a), (to_desc, &**b)))
                .collect::<StorageResult<Vec<_>>>()
                .map(Self::Sequence),
            (FieldKind::Map(ka, va), FieldKind::Map(kb, vb), Self::Map(pairs)) => pairs
                .into_iter()
                .map(|(key, value)| -> StorageResult<(Value, Value)> {
                    Ok((
                        key.evolve(registry, (from_desc, &**ka), (to_desc, &**kb))?,
                        value.evolve(registry, (from_desc, &**va), (to_desc, &**vb))?,
                    ))
                })
                .collect::<StorageResult<Vec<_>>>()
                .map(Self::Map),
            (FieldKind::Object(old), FieldKind::Object(new), Self::Object(mut fields)) => {
                if old.type_name != new.type_name {
                    return Err(StorageError::SchemaMismatch(format!(
                        "cannot convert {old} into {new}"
                    )));
                }
                if old.version > new.version {
                    return Err(StorageError::SchemaMismatch(format!(
                        "cannot downgrade {old} to {new}"
                    )));
                }
                let old_schema = from_desc.schema(old)?;
                let new_schema = to_desc.schema(new)?;
                if old.version == new.version && old_schema.same_layout(new_schema) {
                    return Ok(Self::Object(fields));
                }
                let mut evolved = BTreeMap::new();
                for field in &new_schema.fields {
                    let stored =
                        registry.stored_name(&new.type_name, old.version, new.version, &field.name);
                    let value = match (old_schema.field(&stored), fields.remove(&stored)) {
                        (Some(spec), Some(value)) => {
                            value.evolve(registry, (from_desc, &spec.kind), (to_desc, &field.kind))?
                        }
                        _ => Self::default_for(&field.kind, to_desc)?,
                    };
                    evolved.insert(field.name.clone(), value);
                }
                Ok(Self::Object(evolved))
            }
            (from_kind, to_kind, _) => Err(StorageError::SchemaMismatch(format!(
                "cannot convert {} into {}",
                from_kind.type_name(),
                to_kind.type_name()
            ))),
        }
    }
}
