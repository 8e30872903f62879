//! Schema descriptors and the registry of known type versions.
//!
//! Every aggregate type is registered once per version with an explicit
//! field list. Files embed the descriptors they were written with, so a
//! reader can always interpret the stored columns; the registry tells the
//! loader how to map a stored version onto the version compiled into the
//! program (renames, added fields, removed fields).

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::atomic::AtomicKind;
use crate::codec::Storable;
use crate::error::{StorageError, StorageResult};
use crate::params::PARAMETER_COLUMNS;

/// Field name reserved for the element count of sequences and maps.
pub const RESERVED_SIZE: &str = "size";

/// Name and schema version of an aggregate type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionTag {
    pub type_name: Cow<'static, str>,
    pub version: u32,
}

impl VersionTag {
    pub const fn new(type_name: &'static str, version: u32) -> Self {
        Self {
            type_name: Cow::Borrowed(type_name),
            version,
        }
    }

    pub fn owned(type_name: impl Into<String>, version: u32) -> Self {
        Self {
            type_name: Cow::Owned(type_name.into()),
            version,
        }
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.type_name, self.version)
    }
}

/// How one field is laid out in columns.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    /// One column holding one value per row.
    Atomic(AtomicKind),
    /// A `size` column plus the element layout under `data`.
    Sequence(Box<FieldKind>),
    /// A `size` column plus key and value layouts under `keys` and `vals`.
    Map(Box<FieldKind>, Box<FieldKind>),
    /// A dynamically typed parameter bag.
    Parameters,
    /// A registered aggregate; its fields come from the schema of the tag.
    Object(VersionTag),
}

impl FieldKind {
    pub const fn object(type_name: &'static str, version: u32) -> Self {
        Self::Object(VersionTag::new(type_name, version))
    }

    pub fn sequence(inner: FieldKind) -> Self {
        Self::Sequence(Box::new(inner))
    }

    pub fn map(key: FieldKind, value: FieldKind) -> Self {
        Self::Map(Box::new(key), Box::new(value))
    }

    /// The version tag, if this is an aggregate.
    pub fn tag(&self) -> Option<&VersionTag> {
        match self {
            Self::Object(tag) => Some(tag),
            _ => None,
        }
    }

    /// Human-readable type name, e.g. `Vec<Hit>` or `Map<String, f64>`.
    pub fn type_name(&self) -> String {
        match self {
            Self::Atomic(kind) => kind.name().to_string(),
            Self::Sequence(inner) => format!("Vec<{}>", inner.type_name()),
            Self::Map(key, value) => format!("Map<{}, {}>", key.type_name(), value.type_name()),
            Self::Parameters => "Parameters".to_string(),
            Self::Object(tag) => tag.type_name.to_string(),
        }
    }
}

/// One named field of an aggregate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

/// A field renamed when this version was introduced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rename {
    /// Name in the previous version.
    pub from: String,
    /// Name in this version.
    pub to: String,
}

/// The immutable field layout of one version of an aggregate type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub tag: VersionTag,
    pub fields: Vec<FieldSpec>,
    pub renames: Vec<Rename>,
}

impl SchemaDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Two descriptors describe the same on-disk layout.
    pub fn same_layout(&self, other: &Self) -> bool {
        self.tag == other.tag && self.fields == other.fields
    }
}

/// Builds a [`SchemaDescriptor`] for one type version.
#[derive(Clone, Debug)]
pub struct SchemaBuilder {
    tag: VersionTag,
    fields: Vec<FieldSpec>,
    renames: Vec<Rename>,
}

impl SchemaBuilder {
    pub fn new(type_name: impl Into<String>, version: u32) -> Self {
        Self {
            tag: VersionTag::owned(type_name, version),
            fields: Vec::new(),
            renames: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
        });
        self
    }

    /// Add a field laid out as `T` is.
    pub fn field_of<T: Storable>(self, name: impl Into<String>) -> Self {
        self.field(name, T::kind())
    }

    /// Record that field `from` of the previous version is called `to` here.
    pub fn renamed(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.renames.push(Rename {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    pub fn build(self) -> StorageResult<SchemaDescriptor> {
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() || field.name.contains('/') {
                return Err(StorageError::InvalidSchema(format!(
                    "{}: invalid field name `{}`",
                    self.tag, field.name
                )));
            }
            if field.name == RESERVED_SIZE {
                return Err(StorageError::InvalidSchema(format!(
                    "{}: field name `{RESERVED_SIZE}` is reserved",
                    self.tag
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(StorageError::InvalidSchema(format!(
                    "{}: duplicate field `{}`",
                    self.tag, field.name
                )));
            }
        }
        for rename in &self.renames {
            if !seen.contains(rename.to.as_str()) {
                return Err(StorageError::InvalidSchema(format!(
                    "{}: rename target `{}` is not a field",
                    self.tag, rename.to
                )));
            }
        }
        Ok(SchemaDescriptor {
            tag: self.tag,
            fields: self.fields,
            renames: self.renames,
        })
    }
}

/// The complete, self-describing layout of one stream.
///
/// Holds the root kind and every aggregate schema reachable from it. Writers
/// store it in the file footer; readers interpret columns with it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub root: FieldKind,
    pub schemas: Vec<SchemaDescriptor>,
}

impl TypeDescriptor {
    pub fn type_name(&self) -> String {
        self.root.type_name()
    }

    pub fn version(&self) -> Option<u32> {
        self.root.tag().map(|tag| tag.version)
    }

    pub fn schema(&self, tag: &VersionTag) -> StorageResult<&SchemaDescriptor> {
        self.schemas
            .iter()
            .find(|s| &s.tag == tag)
            .ok_or_else(|| StorageError::SchemaMismatch(format!("no schema recorded for {tag}")))
    }

    /// Every leaf column of the stream, in layout order.
    pub fn columns(&self) -> StorageResult<Vec<(String, AtomicKind)>> {
        let mut out = Vec::new();
        self.collect_columns(&self.root, "", &mut out)?;
        Ok(out)
    }

    /// Columns holding exactly one value per row: leaves outside any
    /// sequence, map or parameter set, and the size column of each
    /// outermost container.
    pub fn row_columns(&self) -> StorageResult<Vec<String>> {
        let mut out = Vec::new();
        self.collect_row_columns(&self.root, "", &mut out)?;
        Ok(out)
    }

    fn collect_row_columns(&self, kind: &FieldKind, prefix: &str, out: &mut Vec<String>) -> StorageResult<()> {
        match kind {
            FieldKind::Atomic(_) => out.push(prefix.to_string()),
            FieldKind::Sequence(_) | FieldKind::Map(..) | FieldKind::Parameters => {
                out.push(join(prefix, RESERVED_SIZE))
            }
            FieldKind::Object(tag) => {
                let schema = self.schema(tag)?;
                for field in &schema.fields {
                    self.collect_row_columns(&field.kind, &join(prefix, &field.name), out)?;
                }
            }
        }
        Ok(())
    }

    fn collect_columns(
        &self,
        kind: &FieldKind,
        prefix: &str,
        out: &mut Vec<(String, AtomicKind)>,
    ) -> StorageResult<()> {
        match kind {
            FieldKind::Atomic(atomic) => out.push((prefix.to_string(), *atomic)),
            FieldKind::Sequence(inner) => {
                out.push((join(prefix, RESERVED_SIZE), AtomicKind::U64));
                self.collect_columns(inner, &join(prefix, "data"), out)?;
            }
            FieldKind::Map(key, value) => {
                out.push((join(prefix, RESERVED_SIZE), AtomicKind::U64));
                self.collect_columns(key, &join(prefix, "keys"), out)?;
                self.collect_columns(value, &join(prefix, "vals"), out)?;
            }
            FieldKind::Parameters => {
                for (name, atomic) in PARAMETER_COLUMNS {
                    out.push((join(prefix, name), atomic));
                }
            }
            FieldKind::Object(tag) => {
                let schema = self.schema(tag)?;
                for field in &schema.fields {
                    self.collect_columns(&field.kind, &join(prefix, &field.name), out)?;
                }
            }
        }
        Ok(())
    }
}

/// All registered schema versions, keyed by type name.
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    types: HashMap<String, BTreeMap<u32, SchemaDescriptor>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one version of a type through a builder.
    ///
    /// ```ignore
    /// registry.declare("Hit", 2, |s| {
    ///     s.field("energy", FieldKind::Atomic(AtomicKind::F64))
    ///         .field("layer", FieldKind::Atomic(AtomicKind::I32))
    ///         .renamed("e", "energy")
    /// })?;
    /// ```
    pub fn declare(
        &mut self,
        type_name: &str,
        version: u32,
        build: impl FnOnce(SchemaBuilder) -> SchemaBuilder,
    ) -> StorageResult<()> {
        let schema = build(SchemaBuilder::new(type_name, version)).build()?;
        self.register(schema)
    }

    /// Register a built descriptor.
    ///
    /// Registering the same version again is accepted only if the layout is
    /// identical.
    pub fn register(&mut self, schema: SchemaDescriptor) -> StorageResult<()> {
        let versions = self
            .types
            .entry(schema.tag.type_name.to_string())
            .or_default();
        match versions.get(&schema.tag.version) {
            Some(existing) if existing == &schema => Ok(()),
            Some(_) => Err(StorageError::InvalidSchema(format!(
                "{} is already registered with a different layout",
                schema.tag
            ))),
            None => {
                versions.insert(schema.tag.version, schema);
                Ok(())
            }
        }
    }

    pub fn schema(&self, tag: &VersionTag) -> Option<&SchemaDescriptor> {
        self.types
            .get(&*tag.type_name)
            .and_then(|versions| versions.get(&tag.version))
    }

    /// The highest registered version of a type.
    pub fn latest(&self, type_name: &str) -> Option<&SchemaDescriptor> {
        self.types
            .get(type_name)
            .and_then(|versions| versions.values().next_back())
    }

    pub fn versions(&self, type_name: &str) -> Vec<u32> {
        self.types
            .get(type_name)
            .map(|versions| versions.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_known(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Name under which field `name` of version `current` was stored in
    /// version `stored`, following renames back through every version in
    /// between.
    pub fn stored_name(&self, type_name: &str, stored: u32, current: u32, name: &str) -> String {
        let mut name = name.to_string();
        let Some(versions) = self.types.get(type_name) else {
            return name;
        };
        if stored >= current {
            return name;
        }
        for schema in versions.range(stored + 1..=current).rev().map(|(_, s)| s) {
            if let Some(rename) = schema.renames.iter().find(|r| r.to == name) {
                name = rename.from.clone();
            }
        }
        name
    }

    /// Build the full descriptor of a stream whose root is `root`.
    pub fn describe(&self, root: &FieldKind) -> StorageResult<TypeDescriptor> {
        let mut schemas: Vec<SchemaDescriptor> = Vec::new();
        self.collect_schemas(root, &mut schemas)?;
        Ok(TypeDescriptor {
            root: root.clone(),
            schemas,
        })
    }

    /// Descriptor for a stream of `T`.
    pub fn describe_type<T: Storable>(&self) -> StorageResult<TypeDescriptor> {
        self.describe(&T::kind())
    }

    fn collect_schemas(&self, kind: &FieldKind, out: &mut Vec<SchemaDescriptor>) -> StorageResult<()> {
        match kind {
            FieldKind::Atomic(_) | FieldKind::Parameters => Ok(()),
            FieldKind::Sequence(inner) => self.collect_schemas(inner, out),
            FieldKind::Map(key, value) => {
                self.collect_schemas(key, out)?;
                self.collect_schemas(value, out)
            }
            FieldKind::Object(tag) => {
                if out.iter().any(|s| &s.tag == tag) {
                    return Ok(());
                }
                let schema = self
                    .schema(tag)
                    .ok_or_else(|| StorageError::UnregisteredVersion {
                        type_name: tag.type_name.to_string(),
                        version: tag.version,
                    })?;
                out.push(schema.clone());
                for field in &schema.fields {
                    self.collect_schemas(&field.kind, out)?;
                }
                Ok(())
            }
        }
    }

    /// Replace every aggregate tag in `kind` with the latest registered
    /// version of its type. Unknown types keep their stored version.
    pub fn upgrade(&self, kind: &FieldKind) -> FieldKind {
        match kind {
            FieldKind::Atomic(_) | FieldKind::Parameters => kind.clone(),
            FieldKind::Sequence(inner) => FieldKind::sequence(self.upgrade(inner)),
            FieldKind::Map(key, value) => FieldKind::map(self.upgrade(key), self.upgrade(value)),
            FieldKind::Object(tag) => match self.latest(&tag.type_name) {
                Some(latest) => FieldKind::Object(latest.tag.clone()),
                None => kind.clone(),
            },
        }
    }

    /// Check that every stored schema of a known type is registered with
    /// the same layout.
    pub fn check_stored(&self, stored: &TypeDescriptor) -> StorageResult<()> {
        for schema in &stored.schemas {
            if !self.is_known(&schema.tag.type_name) {
                continue;
            }
            match self.schema(&schema.tag) {
                Some(registered) if registered.same_layout(schema) => {}
                Some(_) => {
                    return Err(StorageError::SchemaMismatch(format!(
                        "stored layout of {} differs from the registered one",
                        schema.tag
                    )))
                }
                None => {
                    return Err(StorageError::UnregisteredVersion {
                        type_name: schema.tag.type_name.to_string(),
                        version: schema.tag.version,
                    })
                }
            }
        }
        Ok(())
    }
}

/// Join a column path prefix and a segment.
pub(crate) fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}/{segment}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f64_kind() -> FieldKind {
        FieldKind::Atomic(AtomicKind::F64)
    }

    fn registry_with_renames() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry.declare("Double", 1, |s| s.field("dv1", f64_kind())).unwrap();
        registry
            .declare("Double", 2, |s| {
                s.field("dv2", f64_kind())
                    .field("i", FieldKind::Atomic(AtomicKind::I32))
                    .renamed("dv1", "dv2")
            })
            .unwrap();
        registry
            .declare("Double", 3, |s| {
                s.field("dv3", f64_kind())
                    .field("i", FieldKind::Atomic(AtomicKind::I32))
                    .renamed("dv2", "dv3")
            })
            .unwrap();
        registry
    }

    #[test]
    fn rename_chain_is_followed_back() {
        let registry = registry_with_renames();
        assert_eq!(registry.stored_name("Double", 1, 3, "dv3"), "dv1");
        assert_eq!(registry.stored_name("Double", 2, 3, "dv3"), "dv2");
        assert_eq!(registry.stored_name("Double", 3, 3, "dv3"), "dv3");
        assert_eq!(registry.stored_name("Double", 1, 3, "i"), "i");
        assert_eq!(registry.stored_name("Unknown", 1, 3, "x"), "x");
    }

    #[test]
    fn latest_and_versions() {
        let registry = registry_with_renames();
        assert_eq!(registry.latest("Double").unwrap().tag.version, 3);
        assert_eq!(registry.versions("Double"), vec![1, 2, 3]);
        assert!(registry.latest("Other").is_none());
    }

    #[test]
    fn reserved_and_duplicate_names_are_rejected() {
        let mut registry = SchemaRegistry::new();
        let err = registry.declare("T", 1, |s| s.field("size", f64_kind())).unwrap_err();
        assert!(matches!(err, StorageError::InvalidSchema(_)));
        let err = registry
            .declare("T", 1, |s| s.field("a", f64_kind()).field("a", f64_kind()))
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidSchema(_)));
        let err = registry
            .declare("T", 1, |s| s.field("a", f64_kind()).renamed("x", "b"))
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidSchema(_)));
    }

    #[test]
    fn registered_layout_is_immutable() {
        let mut registry = SchemaRegistry::new();
        registry.declare("T", 1, |s| s.field("a", f64_kind())).unwrap();
        registry.declare("T", 1, |s| s.field("a", f64_kind())).unwrap();
        let err = registry
            .declare("T", 1, |s| s.field("b", f64_kind()))
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidSchema(_)));
    }

    #[test]
    fn describe_collects_nested_schemas_and_columns() {
        let mut registry = SchemaRegistry::new();
        registry
            .declare("Point", 1, |s| s.field("x", f64_kind()).field("y", f64_kind()))
            .unwrap();
        registry
            .declare("Track", 1, |s| {
                s.field("points", FieldKind::sequence(FieldKind::object("Point", 1)))
                    .field("charge", FieldKind::Atomic(AtomicKind::I32))
            })
            .unwrap();

        let descriptor = registry.describe(&FieldKind::object("Track", 1)).unwrap();
        assert_eq!(descriptor.schemas.len(), 2);
        let columns: Vec<String> = descriptor.columns().unwrap().into_iter().map(|c| c.0).collect();
        assert_eq!(
            columns,
            vec!["points/size", "points/data/x", "points/data/y", "charge"]
        );
    }

    #[test]
    fn describe_unregistered_version_fails() {
        let registry = SchemaRegistry::new();
        let err = registry.describe(&FieldKind::object("Ghost", 4)).unwrap_err();
        assert!(matches!(
            err,
            StorageError::UnregisteredVersion { version: 4, .. }
        ));
    }

    #[test]
    fn check_stored_detects_changed_layout() {
        let registry = registry_with_renames();
        let mut stored = registry.describe(&FieldKind::object("Double", 1)).unwrap();
        registry.check_stored(&stored).unwrap();
        stored.schemas[0].fields[0].name = "renamed".into();
        assert!(matches!(
            registry.check_stored(&stored).unwrap_err(),
            StorageError::SchemaMismatch(_)
        ));
    }

    #[test]
    fn upgrade_moves_to_latest_version() {
        let registry = registry_with_renames();
        let kind = FieldKind::sequence(FieldKind::object("Double", 1));
        assert_eq!(
            registry.upgrade(&kind),
            FieldKind::sequence(FieldKind::object("Double", 3))
        );
        assert_eq!(
            registry.upgrade(&FieldKind::object("Other", 1)),
            FieldKind::object("Other", 1)
        );
    }

    #[test]
    fn type_names() {
        assert_eq!(
            FieldKind::map(FieldKind::Atomic(AtomicKind::Str), f64_kind()).type_name(),
            "Map<String, f64>"
        );
        assert_eq!(
            FieldKind::sequence(FieldKind::object("Hit", 2)).type_name(),
            "Vec<Hit>"
        );
    }
}
