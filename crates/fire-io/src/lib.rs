//! Versioned columnar serialization for fire event files.
//!
//! Every stored object lives in a *stream*: a named sequence of rows sharing
//! one type. A type is broken down into leaf columns of atomic values;
//! sequences and maps add a `size` column, aggregates contribute one column
//! subtree per field. Writers buffer columns and flush them as compressed
//! blocks; readers decode blocks lazily and hand values back to typed code.
//!
//! # Architecture
//!
//! - **Schema registry**: explicit, versioned field lists per aggregate type
//! - **Codec**: [`Storable`] types move through a [`Saver`] / [`Loader`]
//! - **Columnar backend** (`.fcol`): chunked column blocks, random access by row
//! - **Row-tree backend** (`.ftree`): one record per row
//! - **Dynamic values**: schema-driven [`Value`]s for pass-through and dumps
//! - **Copy**: stream selection and conversion to the latest schema versions
//!
//! # Stream names
//!
//! Event objects are stored under `events/<pass>/<name>`, the event header
//! under `events/EventHeader` and run headers under `runs`.

pub mod atomic;
pub mod backend;
pub mod codec;
pub mod column;
pub mod columnar;
pub mod config;
pub mod copy;
pub mod dynamic;
pub mod error;
mod framing;
pub mod params;
pub mod schema;
mod stream;
pub mod traits;
pub mod tree;

pub use atomic::{Atomic, AtomicKind, Scalar};
pub use backend::{create_writer, detect_format, open_reader};
pub use codec::{declare, load_row, read_all, write, Loader, Saver, Storable};
pub use column::{Buffer, BufferHandle, ColumnBuffer, ColumnHandle};
pub use columnar::{ColumnarReader, ColumnarWriter};
pub use config::{StorageFormat, WriterConfig};
pub use copy::{copy, copy_row, target_descriptor, CopyReport, CopySelection};
pub use dynamic::Value;
pub use error::{StorageError, StorageResult};
pub use params::{Parameter, ParameterStorage, ParameterTag, ParameterValue};
pub use schema::{
    FieldKind, FieldSpec, Rename, SchemaBuilder, SchemaDescriptor, SchemaRegistry,
    TypeDescriptor, VersionTag,
};
pub use traits::{FileSummary, Reader, StreamSummary, Writer};
pub use tree::{TreeReader, TreeWriter};

/// Group holding every per-event stream.
pub const EVENT_GROUP: &str = "events";

/// Stream of event headers, one row per saved event.
pub const EVENT_HEADER: &str = "events/EventHeader";

/// Stream of run headers, one row per run.
pub const RUN_HEADER: &str = "runs";

/// Stream name of event object `name` produced by pass `pass`.
pub fn object_stream(pass: &str, name: &str) -> String {
    format!("{EVENT_GROUP}/{pass}/{name}")
}

/// Split an event object stream name into `(pass, name)`.
pub fn parse_object_stream(stream: &str) -> Option<(&str, &str)> {
    let rest = stream.strip_prefix(EVENT_GROUP)?.strip_prefix('/')?;
    let (pass, name) = rest.split_once('/')?;
    if pass.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some((pass, name))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::Path;

    use proptest::prelude::*;

    use super::*;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Hit {
        energy: f64,
        layer: i32,
        label: String,
    }

    impl Storable for Hit {
        fn kind() -> FieldKind {
            FieldKind::object("Hit", 1)
        }

        fn save(&self, saver: &mut Saver<'_>) -> StorageResult<()> {
            saver.field("energy", &self.energy)?;
            saver.field("layer", &self.layer)?;
            saver.field("label", &self.label)
        }

        fn load(&mut self, loader: &mut Loader<'_>) -> StorageResult<()> {
            loader.field("energy", &mut self.energy)?;
            loader.field("layer", &mut self.layer)?;
            loader.field("label", &mut self.label)
        }
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Track {
        hits: Vec<Hit>,
        charge: i32,
        weights: BTreeMap<String, f64>,
        params: ParameterStorage,
    }

    impl Storable for Track {
        fn kind() -> FieldKind {
            FieldKind::object("Track", 1)
        }

        fn save(&self, saver: &mut Saver<'_>) -> StorageResult<()> {
            saver.field("hits", &self.hits)?;
            saver.field("charge", &self.charge)?;
            saver.field("weights", &self.weights)?;
            saver.field("params", &self.params)
        }

        fn load(&mut self, loader: &mut Loader<'_>) -> StorageResult<()> {
            loader.field("hits", &mut self.hits)?;
            loader.field("charge", &mut self.charge)?;
            loader.field("weights", &mut self.weights)?;
            loader.field("params", &mut self.params)
        }
    }

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .declare("Hit", 1, |s| {
                s.field_of::<f64>("energy")
                    .field_of::<i32>("layer")
                    .field_of::<String>("label")
            })
            .unwrap();
        registry
            .declare("Track", 1, |s| {
                s.field_of::<Vec<Hit>>("hits")
                    .field_of::<i32>("charge")
                    .field_of::<BTreeMap<String, f64>>("weights")
                    .field_of::<ParameterStorage>("params")
            })
            .unwrap();
        registry
    }

    fn sample_track(n: usize) -> Track {
        let mut params = ParameterStorage::new();
        params.set("n", n as i64);
        params.set("tags", vec!["a".to_string(), format!("t{n}")]);
        params.set("scale", vec![0.5, n as f64]);
        Track {
            hits: (0..n)
                .map(|i| Hit {
                    energy: i as f64 * 1.5,
                    layer: i as i32,
                    label: format!("hit-{i}"),
                })
                .collect(),
            charge: if n % 2 == 0 { 1 } else { -1 },
            weights: BTreeMap::from([("w".to_string(), n as f64)]),
            params,
        }
    }

    fn round_trip_tracks(path: &Path, rows_per_chunk: usize) {
        let registry = registry();
        let config = WriterConfig::default().with_rows_per_chunk(rows_per_chunk);
        let tracks: Vec<Track> = (0..12).map(sample_track).collect();

        let mut writer = create_writer(path, &config).unwrap();
        declare::<Track>(writer.as_mut(), &registry, "tracks").unwrap();
        for track in &tracks {
            write(writer.as_mut(), "tracks", track).unwrap();
        }
        writer.close().unwrap();

        let mut reader = open_reader(path).unwrap();
        let loaded: Vec<Track> = read_all(reader.as_mut(), &registry, "tracks").unwrap();
        assert_eq!(loaded, tracks);

        let mut one = Track::default();
        load_row(reader.as_mut(), &registry, "tracks", 7, &mut one).unwrap();
        assert_eq!(one, tracks[7]);
        load_row(reader.as_mut(), &registry, "tracks", 3, &mut one).unwrap();
        assert_eq!(one, tracks[3]);
    }

    #[test]
    fn nested_round_trip_columnar() {
        let dir = tempfile::tempdir().unwrap();
        round_trip_tracks(&dir.path().join("t.fcol"), 5);
    }

    #[test]
    fn nested_round_trip_tree() {
        let dir = tempfile::tempdir().unwrap();
        round_trip_tracks(&dir.path().join("t.ftree"), 5);
    }

    #[test]
    fn empty_containers_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.fcol");
        let registry = registry();
        let mut writer = create_writer(&path, &WriterConfig::default()).unwrap();
        declare::<Track>(writer.as_mut(), &registry, "t").unwrap();
        write(writer.as_mut(), "t", &Track::default()).unwrap();
        write(writer.as_mut(), "t", &sample_track(2)).unwrap();
        writer.close().unwrap();

        let mut reader = open_reader(&path).unwrap();
        let rows: Vec<Track> = read_all(reader.as_mut(), &registry, "t").unwrap();
        assert_eq!(rows[0], Track::default());
        assert_eq!(rows[1], sample_track(2));
    }

    #[test]
    fn columns_follow_layout() {
        let registry = registry();
        let descriptor = registry.describe_type::<Track>().unwrap();
        let names: Vec<String> = descriptor.columns().unwrap().into_iter().map(|c| c.0).collect();
        assert_eq!(&names[..5], &[
            "hits/size",
            "hits/data/energy",
            "hits/data/layer",
            "hits/data/label",
            "charge",
        ]);
        assert!(names.contains(&"weights/keys".to_string()));
        assert!(names.contains(&"params/string_vec/data".to_string()));
    }

    #[test]
    fn write_requires_matching_type() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry();
        let mut writer =
            ColumnarWriter::create(&dir.path().join("x.fcol"), WriterConfig::default()).unwrap();
        declare::<Hit>(&mut writer, &registry, "hits").unwrap();
        let err = write(&mut writer, "hits", &1.0f64).unwrap_err();
        assert!(matches!(err, StorageError::SchemaMismatch(_)));
        writer.close().unwrap();
    }

    #[test]
    fn reading_with_wrong_type_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wrong.fcol");
        let registry = registry();
        let mut writer = create_writer(&path, &WriterConfig::default()).unwrap();
        declare::<Hit>(writer.as_mut(), &registry, "hits").unwrap();
        write(writer.as_mut(), "hits", &Hit::default()).unwrap();
        writer.close().unwrap();

        let mut reader = open_reader(&path).unwrap();
        let mut value = 0i32;
        let err = load_row(reader.as_mut(), &registry, "hits", 0, &mut value).unwrap_err();
        assert!(matches!(err, StorageError::TypeMismatch { .. }));
        let mut track = Track::default();
        let err = load_row(reader.as_mut(), &registry, "hits", 0, &mut track).unwrap_err();
        assert!(matches!(err, StorageError::SchemaMismatch(_)));
        // The cursor recovers after a failed load.
        let mut hit = Hit::default();
        load_row(reader.as_mut(), &registry, "hits", 0, &mut hit).unwrap();
    }

    /// Saves `a`, then fails before `b` when `valid` is unset.
    #[derive(Clone, Debug, Default, PartialEq)]
    struct Reading {
        a: i32,
        b: i32,
        valid: bool,
    }

    impl Storable for Reading {
        fn kind() -> FieldKind {
            FieldKind::object("Reading", 1)
        }

        fn save(&self, saver: &mut Saver<'_>) -> StorageResult<()> {
            saver.field("a", &self.a)?;
            if !self.valid {
                return Err(StorageError::SchemaMismatch("reading is not valid".into()));
            }
            saver.field("b", &self.b)
        }

        fn load(&mut self, loader: &mut Loader<'_>) -> StorageResult<()> {
            loader.field("a", &mut self.a)?;
            loader.field("b", &mut self.b)?;
            self.valid = true;
            Ok(())
        }
    }

    fn failed_save_leaves_no_trace(path: &Path) {
        let mut registry = SchemaRegistry::new();
        registry
            .declare("Reading", 1, |s| s.field_of::<i32>("a").field_of::<i32>("b"))
            .unwrap();
        let reading = |v: i32, valid: bool| Reading { a: v, b: v, valid };

        let mut writer = create_writer(path, &WriterConfig::default().with_rows_per_chunk(2)).unwrap();
        declare::<Reading>(writer.as_mut(), &registry, "r").unwrap();
        write(writer.as_mut(), "r", &reading(1, true)).unwrap();
        assert!(write(writer.as_mut(), "r", &reading(9, false)).is_err());
        write(writer.as_mut(), "r", &reading(2, true)).unwrap();
        write(writer.as_mut(), "r", &reading(3, true)).unwrap();
        assert_eq!(writer.entries("r"), 3);
        writer.close().unwrap();

        let mut reader = open_reader(path).unwrap();
        let rows: Vec<Reading> = read_all(reader.as_mut(), &registry, "r").unwrap();
        assert_eq!(rows, vec![reading(1, true), reading(2, true), reading(3, true)]);
    }

    #[test]
    fn failed_save_leaves_no_trace_columnar() {
        let dir = tempfile::tempdir().unwrap();
        failed_save_leaves_no_trace(&dir.path().join("r.fcol"));
    }

    #[test]
    fn failed_save_leaves_no_trace_tree() {
        let dir = tempfile::tempdir().unwrap();
        failed_save_leaves_no_trace(&dir.path().join("r.ftree"));
    }

    #[test]
    fn unknown_parameter_tag_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.fcol");
        let registry = SchemaRegistry::new();
        let mut writer = create_writer(&path, &WriterConfig::default()).unwrap();
        declare::<ParameterStorage>(writer.as_mut(), &registry, "p").unwrap();
        writer.column("p", "size").unwrap().push_scalar(Scalar::U64(1)).unwrap();
        writer
            .column("p", "name")
            .unwrap()
            .push_scalar(Scalar::Str("x".into()))
            .unwrap();
        writer.column("p", "tag").unwrap().push_scalar(Scalar::U8(9)).unwrap();
        writer.end_row("p").unwrap();
        writer.close().unwrap();

        let mut reader = open_reader(&path).unwrap();
        let mut params = ParameterStorage::new();
        let err = load_row(reader.as_mut(), &registry, "p", 0, &mut params).unwrap_err();
        assert!(matches!(err, StorageError::UnknownParameterTag(9)));
    }

    mod evolution {
        use super::*;

        #[derive(Debug, Default, PartialEq)]
        struct DoubleV1 {
            dv1: f64,
        }

        impl Storable for DoubleV1 {
            fn kind() -> FieldKind {
                FieldKind::object("Double", 1)
            }
            fn save(&self, saver: &mut Saver<'_>) -> StorageResult<()> {
                saver.field("dv1", &self.dv1)
            }
            fn load(&mut self, loader: &mut Loader<'_>) -> StorageResult<()> {
                loader.field("dv1", &mut self.dv1)
            }
        }

        #[derive(Debug, Default, PartialEq)]
        struct DoubleV2 {
            dv2: f64,
            i: i32,
        }

        impl Storable for DoubleV2 {
            fn kind() -> FieldKind {
                FieldKind::object("Double", 2)
            }
            fn save(&self, saver: &mut Saver<'_>) -> StorageResult<()> {
                saver.field("dv2", &self.dv2)?;
                saver.field("i", &self.i)
            }
            fn load(&mut self, loader: &mut Loader<'_>) -> StorageResult<()> {
                loader.field("dv2", &mut self.dv2)?;
                loader.field("i", &mut self.i)
            }
        }

        #[derive(Debug, Default, PartialEq)]
        struct DoubleV3 {
            dv3: f64,
            i: i32,
        }

        impl Storable for DoubleV3 {
            fn kind() -> FieldKind {
                FieldKind::object("Double", 3)
            }
            fn save(&self, saver: &mut Saver<'_>) -> StorageResult<()> {
                saver.field("dv3", &self.dv3)?;
                saver.field("i", &self.i)
            }
            fn load(&mut self, loader: &mut Loader<'_>) -> StorageResult<()> {
                loader.field("dv3", &mut self.dv3)?;
                loader.field("i", &mut self.i)
            }
        }

        fn declare_versions(registry: &mut SchemaRegistry, versions: &[u32]) {
            for version in versions {
                match version {
                    1 => registry.declare("Double", 1, |s| s.field_of::<f64>("dv1")),
                    2 => registry.declare("Double", 2, |s| {
                        s.field_of::<f64>("dv2").field_of::<i32>("i").renamed("dv1", "dv2")
                    }),
                    _ => registry.declare("Double", 3, |s| {
                        s.field_of::<f64>("dv3").field_of::<i32>("i").renamed("dv2", "dv3")
                    }),
                }
                .unwrap();
            }
        }

        fn full_registry() -> SchemaRegistry {
            let mut registry = SchemaRegistry::new();
            declare_versions(&mut registry, &[1, 2, 3]);
            registry
        }

        fn write_rows<T: Storable>(path: &Path, rows: &[T]) {
            let registry = full_registry();
            let mut writer = create_writer(path, &WriterConfig::default()).unwrap();
            declare::<T>(writer.as_mut(), &registry, "d").unwrap();
            for row in rows {
                write(writer.as_mut(), "d", row).unwrap();
            }
            writer.close().unwrap();
        }

        #[test]
        fn v1_reads_as_v3() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("v1.fcol");
            write_rows(&path, &[DoubleV1 { dv1: 2.5 }, DoubleV1 { dv1: -1.0 }]);

            let mut reader = open_reader(&path).unwrap();
            let rows: Vec<DoubleV3> = read_all(reader.as_mut(), &full_registry(), "d").unwrap();
            assert_eq!(rows, vec![DoubleV3 { dv3: 2.5, i: 0 }, DoubleV3 { dv3: -1.0, i: 0 }]);
        }

        #[test]
        fn v2_reads_as_v3() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("v2.ftree");
            write_rows(&path, &[DoubleV2 { dv2: 4.0, i: 7 }]);

            let mut reader = open_reader(&path).unwrap();
            let rows: Vec<DoubleV3> = read_all(reader.as_mut(), &full_registry(), "d").unwrap();
            assert_eq!(rows, vec![DoubleV3 { dv3: 4.0, i: 7 }]);
        }

        #[test]
        fn newer_stored_version_is_refused() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("v3.fcol");
            write_rows(&path, &[DoubleV3 { dv3: 1.0, i: 1 }]);

            let mut reader = open_reader(&path).unwrap();
            let mut old = DoubleV1::default();
            let err = load_row(reader.as_mut(), &full_registry(), "d", 0, &mut old).unwrap_err();
            assert!(matches!(err, StorageError::SchemaMismatch(_)));
        }

        #[test]
        fn unregistered_stored_version_is_refused() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("v1-unknown.fcol");
            write_rows(&path, &[DoubleV1 { dv1: 1.0 }]);

            let mut registry = SchemaRegistry::new();
            declare_versions(&mut registry, &[2, 3]);
            let mut reader = open_reader(&path).unwrap();
            let mut current = DoubleV3::default();
            let err = load_row(reader.as_mut(), &registry, "d", 0, &mut current).unwrap_err();
            assert!(matches!(
                err,
                StorageError::UnregisteredVersion { version: 1, .. }
            ));
        }

        #[derive(Debug, Default, PartialEq)]
        struct Pair {
            a: i32,
            b: String,
        }

        #[derive(Debug, Default, PartialEq)]
        struct Triple {
            a: i32,
            b: String,
            c: f64,
        }

        #[derive(Debug, Default, PartialEq)]
        struct Slim {
            a: i32,
            c: f64,
        }

        impl Storable for Pair {
            fn kind() -> FieldKind {
                FieldKind::object("Abc", 1)
            }
            fn save(&self, saver: &mut Saver<'_>) -> StorageResult<()> {
                saver.field("a", &self.a)?;
                saver.field("b", &self.b)
            }
            fn load(&mut self, loader: &mut Loader<'_>) -> StorageResult<()> {
                loader.field("a", &mut self.a)?;
                loader.field("b", &mut self.b)
            }
        }

        impl Storable for Triple {
            fn kind() -> FieldKind {
                FieldKind::object("Abc", 2)
            }
            fn save(&self, saver: &mut Saver<'_>) -> StorageResult<()> {
                saver.field("a", &self.a)?;
                saver.field("b", &self.b)?;
                saver.field("c", &self.c)
            }
            fn load(&mut self, loader: &mut Loader<'_>) -> StorageResult<()> {
                loader.field("a", &mut self.a)?;
                loader.field("b", &mut self.b)?;
                loader.field("c", &mut self.c)
            }
        }

        impl Storable for Slim {
            fn kind() -> FieldKind {
                FieldKind::object("Abc", 3)
            }
            fn save(&self, saver: &mut Saver<'_>) -> StorageResult<()> {
                saver.field("a", &self.a)?;
                saver.field("c", &self.c)
            }
            fn load(&mut self, loader: &mut Loader<'_>) -> StorageResult<()> {
                loader.field("a", &mut self.a)?;
                loader.field("c", &mut self.c)
            }
        }

        fn abc_registry() -> SchemaRegistry {
            let mut registry = SchemaRegistry::new();
            registry
                .declare("Abc", 1, |s| s.field_of::<i32>("a").field_of::<String>("b"))
                .unwrap();
            registry
                .declare("Abc", 2, |s| {
                    s.field_of::<i32>("a").field_of::<String>("b").field_of::<f64>("c")
                })
                .unwrap();
            registry
                .declare("Abc", 3, |s| s.field_of::<i32>("a").field_of::<f64>("c"))
                .unwrap();
            registry
        }

        #[test]
        fn added_field_defaults_and_removed_field_is_dropped() {
            let dir = tempfile::tempdir().unwrap();
            let registry = abc_registry();

            let v1 = dir.path().join("abc1.fcol");
            let mut writer = create_writer(&v1, &WriterConfig::default()).unwrap();
            declare::<Pair>(writer.as_mut(), &registry, "abc").unwrap();
            write(writer.as_mut(), "abc", &Pair { a: 1, b: "x".into() }).unwrap();
            writer.close().unwrap();

            let mut reader = open_reader(&v1).unwrap();
            let mut triple = Triple { a: 0, b: String::new(), c: 9.0 };
            load_row(reader.as_mut(), &registry, "abc", 0, &mut triple).unwrap();
            assert_eq!(triple, Triple { a: 1, b: "x".into(), c: 0.0 });

            let v2 = dir.path().join("abc2.ftree");
            let mut writer = create_writer(&v2, &WriterConfig::default()).unwrap();
            declare::<Triple>(writer.as_mut(), &registry, "abc").unwrap();
            write(writer.as_mut(), "abc", &Triple { a: 2, b: "y".into(), c: 0.5 }).unwrap();
            writer.close().unwrap();

            let mut reader = open_reader(&v2).unwrap();
            let rows: Vec<Slim> = read_all(reader.as_mut(), &registry, "abc").unwrap();
            assert_eq!(rows, vec![Slim { a: 2, c: 0.5 }]);
        }

        #[test]
        fn copy_converts_to_latest_version() {
            let dir = tempfile::tempdir().unwrap();
            let source = dir.path().join("old.fcol");
            let dest = dir.path().join("new.ftree");
            write_rows(&source, &[DoubleV1 { dv1: 3.0 }]);

            let registry = full_registry();
            let mut reader = open_reader(&source).unwrap();
            let mut writer = create_writer(&dest, &WriterConfig::default()).unwrap();
            let report = copy(reader.as_mut(), writer.as_mut(), &CopySelection::all(), &registry)
                .unwrap();
            writer.close().unwrap();
            assert_eq!(report.converted, 1);
            assert_eq!(report.rows, 1);

            let mut reader = open_reader(&dest).unwrap();
            assert_eq!(reader.descriptor("d").unwrap().version(), Some(3));
            let rows: Vec<DoubleV3> = read_all(reader.as_mut(), &registry, "d").unwrap();
            assert_eq!(rows, vec![DoubleV3 { dv3: 3.0, i: 0 }]);
        }
    }

    #[test]
    fn passthrough_copy_keeps_layout_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src.ftree");
        round_trip_tracks(&source, 4);
        let dest = dir.path().join("dst.fcol");

        let registry = registry();
        let mut reader = open_reader(&source).unwrap();
        let mut writer = create_writer(&dest, &WriterConfig::default()).unwrap();
        let selection = CopySelection::all().with_rows(2..5);
        let report = copy(reader.as_mut(), writer.as_mut(), &selection, &registry).unwrap();
        writer.close().unwrap();
        assert_eq!(report.passthrough, 1);
        assert_eq!(report.rows, 3);

        let mut copied = open_reader(&dest).unwrap();
        assert!(copied.descriptor("tracks").is_some());
        assert_eq!(copied.descriptor("tracks"), reader.descriptor("tracks"));
        let rows: Vec<Track> = read_all(copied.as_mut(), &registry, "tracks").unwrap();
        assert_eq!(rows, (2..5).map(sample_track).collect::<Vec<_>>());
    }

    #[test]
    fn dynamic_dump_matches_typed_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.fcol");
        round_trip_tracks(&path, 3);
        let mut reader = open_reader(&path).unwrap();
        let value = Value::read_row(reader.as_mut(), &registry(), "tracks", 2).unwrap();
        assert_eq!(value.field("charge"), Some(&Value::Atomic(Scalar::I32(1))));
        match value.field("hits") {
            Some(Value::Sequence(hits)) => assert_eq!(hits.len(), 2),
            other => panic!("unexpected hits value: {other:?}"),
        }
    }

    #[test]
    fn object_stream_names() {
        assert_eq!(object_stream("sim", "hits"), "events/sim/hits");
        assert_eq!(parse_object_stream("events/sim/hits"), Some(("sim", "hits")));
        assert_eq!(parse_object_stream(EVENT_HEADER), None);
        assert_eq!(parse_object_stream(RUN_HEADER), None);
        assert_eq!(parse_object_stream("events/a/b/c"), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn hits_survive_any_chunking(
            rows in prop::collection::vec((-1.0e6f64..1.0e6, any::<i32>(), "[a-z]{0,8}"), 0..40),
            chunk in 1usize..9,
        ) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("prop.fcol");
            let registry = registry();
            let hits: Vec<Hit> = rows
                .into_iter()
                .map(|(energy, layer, label)| Hit { energy, layer, label })
                .collect();

            let mut writer = create_writer(&path, &WriterConfig::default().with_rows_per_chunk(chunk)).unwrap();
            declare::<Hit>(writer.as_mut(), &registry, "h").unwrap();
            for hit in &hits {
                write(writer.as_mut(), "h", hit).unwrap();
            }
            writer.close().unwrap();

            let mut reader = open_reader(&path).unwrap();
            let loaded: Vec<Hit> = read_all(reader.as_mut(), &registry, "h").unwrap();
            prop_assert_eq!(loaded, hits);
        }
    }
}
