use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use fire_io::{
    copy_row, declare, load_row, object_stream, parse_object_stream, target_descriptor, write,
    Reader, SchemaRegistry, Storable, StorageError, StorageResult, Value, Writer, EVENT_HEADER,
};
use regex::Regex;
use tracing::debug;

use crate::error::{EventError, EventResult};
use crate::header::EventHeader;
use crate::rules::DropKeepRules;

/// Name, pass and type of an object available in the event.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProductTag {
    pub name: String,
    pub pass: String,
    pub type_name: String,
}

impl ProductTag {
    pub fn new(name: &str, pass: &str, type_name: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            pass: pass.to_string(),
            type_name: type_name.into(),
        }
    }

    /// `pass/name`, the string drop/keep rules match against.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.pass, self.name)
    }
}

impl fmt::Display for ProductTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.pass, self.name, self.type_name)
    }
}

/// Type-erased access to one event object.
trait Handle {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn type_name(&self) -> String;
    fn clear(&mut self);
    fn declare(&self, writer: &mut dyn Writer, registry: &SchemaRegistry, stream: &str) -> StorageResult<()>;
    fn save(&self, writer: &mut dyn Writer, stream: &str) -> StorageResult<()>;
    fn load(
        &mut self,
        reader: &mut dyn Reader,
        registry: &SchemaRegistry,
        stream: &str,
        row: u64,
    ) -> StorageResult<()>;
}

struct Slot<T>(T);

impl<T: Storable> Handle for Slot<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn type_name(&self) -> String {
        T::kind().type_name()
    }

    fn clear(&mut self) {
        self.0.clear();
    }

    fn declare(&self, writer: &mut dyn Writer, registry: &SchemaRegistry, stream: &str) -> StorageResult<()> {
        declare::<T>(writer, registry, stream)
    }

    fn save(&self, writer: &mut dyn Writer, stream: &str) -> StorageResult<()> {
        write(writer, stream, &self.0)
    }

    fn load(
        &mut self,
        reader: &mut dyn Reader,
        registry: &SchemaRegistry,
        stream: &str,
        row: u64,
    ) -> StorageResult<()> {
        load_row(reader, registry, stream, row, &mut self.0)
    }
}

struct EventObject {
    tag: ProductTag,
    stream: String,
    handle: Box<dyn Handle>,
    keep: bool,
    from_input: bool,
    /// Added during the current event.
    updated: bool,
    /// Holds the value of the current input entry.
    loaded: bool,
}

struct Product {
    tag: ProductTag,
    from_input: bool,
}

/// The objects of the event being processed.
///
/// Objects added in this pass are saved unless a drop/keep rule drops them;
/// objects from the input file are dropped unless a rule keeps them. Input
/// objects are loaded when first requested and reloaded for every later
/// entry.
pub struct EventStore {
    pass: String,
    registry: Arc<SchemaRegistry>,
    rules: DropKeepRules,
    header: EventHeader,
    /// Insertion order is write-out order.
    objects: Vec<EventObject>,
    index: HashMap<String, usize>,
    products: Vec<Product>,
    /// Resolved pass for `(name, type)` requests made without one.
    lookups: HashMap<(String, String), String>,
    input: Option<Box<dyn Reader>>,
    entry: u64,
}

impl EventStore {
    /// `registry` must know the header schemas and every stored type.
    pub fn new(pass: impl Into<String>, registry: Arc<SchemaRegistry>, rules: DropKeepRules) -> Self {
        Self {
            pass: pass.into(),
            registry,
            rules,
            header: EventHeader::default(),
            objects: Vec::new(),
            index: HashMap::new(),
            products: Vec::new(),
            lookups: HashMap::new(),
            input: None,
            entry: 0,
        }
    }

    pub fn pass(&self) -> &str {
        &self.pass
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn header(&self) -> &EventHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut EventHeader {
        &mut self.header
    }

    /// Every object known to be available: added in this pass or stored in
    /// the input file.
    pub fn products(&self) -> impl Iterator<Item = &ProductTag> {
        self.products.iter().map(|p| &p.tag)
    }

    /// Add `value` as `name` under this store's pass.
    pub fn add<T: Storable>(&mut self, name: &str, value: T) -> EventResult<()> {
        if name.is_empty() || name.contains('/') {
            return Err(EventError::InvalidName(name.to_string()));
        }
        let full_name = format!("{}/{}", self.pass, name);
        let index = match self.index.get(&full_name) {
            Some(&index) => index,
            None => {
                let tag = ProductTag::new(name, &self.pass, T::kind().type_name());
                let keep = self.rules.keep(&full_name, true);
                debug!(object = %full_name, keep, "new event object");
                self.register_product(tag.clone(), false);
                self.insert(EventObject {
                    stream: object_stream(&self.pass, name),
                    tag,
                    handle: Box::new(Slot(T::default())),
                    keep,
                    from_input: false,
                    updated: false,
                    loaded: false,
                })
            }
        };

        let object = &mut self.objects[index];
        if object.updated {
            return Err(EventError::Repeat(full_name));
        }
        let stored = object.handle.type_name();
        let slot = object
            .handle
            .as_any_mut()
            .downcast_mut::<Slot<T>>()
            .ok_or_else(|| EventError::TypeMismatch {
                name: full_name,
                stored,
                requested: T::kind().type_name(),
            })?;
        slot.0 = value;
        object.updated = true;
        Ok(())
    }

    /// The object `name` as a `T`. Without a pass, exactly one available
    /// object of that name and type must exist.
    pub fn get<T: Storable>(&mut self, name: &str, pass: Option<&str>) -> EventResult<&T> {
        let type_name = T::kind().type_name();
        let full_name = self.resolve(name, pass, &type_name)?;
        let index = match self.index.get(&full_name) {
            Some(&index) => index,
            None => self.load_input_object::<T>(&full_name)?,
        };
        let object = &mut self.objects[index];
        if object.from_input && !object.loaded {
            // Cleared or switched input: reload from the current entry.
            match self.input.as_deref_mut() {
                Some(input) if input.descriptor(&object.stream).is_some() => {
                    object.handle.load(input, &self.registry, &object.stream, self.entry)?;
                    object.loaded = true;
                }
                _ => {
                    return Err(EventError::NotFound {
                        name: full_name,
                        type_name,
                    })
                }
            }
        }
        let object = &self.objects[index];
        if !object.from_input && !object.updated {
            return Err(EventError::NotFound {
                name: full_name,
                type_name,
            });
        }
        object
            .handle
            .as_any()
            .downcast_ref::<Slot<T>>()
            .map(|slot| &slot.0)
            .ok_or_else(|| EventError::TypeMismatch {
                name: full_name,
                stored: object.handle.type_name(),
                requested: type_name,
            })
    }

    fn resolve(&mut self, name: &str, pass: Option<&str>, type_name: &str) -> EventResult<String> {
        if let Some(pass) = pass {
            return Ok(format!("{pass}/{name}"));
        }
        let key = (name.to_string(), type_name.to_string());
        if let Some(full_name) = self.lookups.get(&key) {
            return Ok(full_name.clone());
        }
        let candidates: Vec<&ProductTag> = self
            .products
            .iter()
            .map(|p| &p.tag)
            .filter(|tag| tag.name == name && tag.type_name == type_name)
            .collect();
        match candidates.as_slice() {
            [] => Err(EventError::NotFound {
                name: name.to_string(),
                type_name: type_name.to_string(),
            }),
            [only] => {
                let full_name = only.full_name();
                self.lookups.insert(key, full_name.clone());
                Ok(full_name)
            }
            many => Err(EventError::Ambiguous {
                name: name.to_string(),
                type_name: type_name.to_string(),
                passes: many.iter().map(|tag| tag.pass.clone()).collect(),
            }),
        }
    }

    fn load_input_object<T: Storable>(&mut self, full_name: &str) -> EventResult<usize> {
        let not_found = || EventError::NotFound {
            name: full_name.to_string(),
            type_name: T::kind().type_name(),
        };
        let (pass, name) = full_name.split_once('/').ok_or_else(not_found)?;
        let stream = object_stream(pass, name);
        let input = self.input.as_deref_mut().ok_or_else(not_found)?;
        if input.descriptor(&stream).is_none() {
            return Err(not_found());
        }
        let mut handle: Box<dyn Handle> = Box::new(Slot(T::default()));
        handle.load(input, &self.registry, &stream, self.entry)?;
        let keep = self.rules.keep(full_name, false);
        debug!(object = full_name, keep, entry = self.entry, "loaded input object");
        Ok(self.insert(EventObject {
            tag: ProductTag::new(name, pass, T::kind().type_name()),
            stream,
            handle,
            keep,
            from_input: true,
            updated: false,
            loaded: true,
        }))
    }

    fn insert(&mut self, object: EventObject) -> usize {
        let index = self.objects.len();
        self.index.insert(object.tag.full_name(), index);
        self.objects.push(object);
        index
    }

    fn register_product(&mut self, tag: ProductTag, from_input: bool) {
        let known = self
            .products
            .iter()
            .any(|p| p.tag.name == tag.name && p.tag.pass == tag.pass);
        if !known {
            self.products.push(Product { tag, from_input });
            self.lookups.clear();
        }
    }

    /// Whether exactly one available object is called `name` (in `pass`,
    /// when given).
    pub fn exists(&self, name: &str, pass: Option<&str>) -> bool {
        self.products()
            .filter(|tag| tag.name == name && pass.map_or(true, |p| tag.pass == p))
            .count()
            == 1
    }

    /// Available objects whose name, pass and type fully match the given
    /// patterns. An empty pattern matches anything.
    pub fn search(&self, name: &str, pass: &str, type_name: &str) -> EventResult<Vec<ProductTag>> {
        let name = full_match(name)?;
        let pass = full_match(pass)?;
        let type_name = full_match(type_name)?;
        Ok(self
            .products()
            .filter(|tag| {
                name.is_match(&tag.name) && pass.is_match(&tag.pass) && type_name.is_match(&tag.type_name)
            })
            .cloned()
            .collect())
    }

    /// Reset every object in place for the next event.
    pub fn clear(&mut self) {
        self.header.clear();
        for object in &mut self.objects {
            object.updated = false;
            object.loaded = false;
            object.handle.clear();
        }
    }

    /// Read from `reader` from now on, returning the previous input.
    pub fn attach_input(&mut self, reader: Box<dyn Reader>) -> Option<Box<dyn Reader>> {
        self.forget_input();
        for stream in reader.streams() {
            let Some((pass, name)) = parse_object_stream(&stream) else {
                continue;
            };
            if let Some(descriptor) = reader.descriptor(&stream) {
                self.register_product(ProductTag::new(name, pass, descriptor.type_name()), true);
            }
        }
        debug!(input = reader.name(), products = self.products.len(), "attached input");
        self.entry = 0;
        self.input.replace(reader)
    }

    pub fn detach_input(&mut self) -> Option<Box<dyn Reader>> {
        self.forget_input();
        self.input.take()
    }

    fn forget_input(&mut self) {
        self.products.retain(|p| !p.from_input);
        self.lookups.clear();
        for object in self.objects.iter_mut().filter(|o| o.from_input) {
            object.loaded = false;
            object.handle.clear();
        }
    }

    pub fn input(&self) -> Option<&dyn Reader> {
        match &self.input {
            Some(reader) => Some(&**reader),
            None => None,
        }
    }

    /// Number of events in the attached input.
    pub fn input_events(&self) -> EventResult<u64> {
        let input = self.input.as_deref().ok_or(EventError::NoInput)?;
        Ok(input.events())
    }

    /// Entry of the input the store currently holds.
    pub fn entry(&self) -> u64 {
        self.entry
    }

    /// Load the header and every requested input object from entry `row`.
    pub fn load_into(&mut self, row: u64) -> EventResult<()> {
        let input = self.input.as_deref_mut().ok_or(EventError::NoInput)?;
        load_row(input, &self.registry, EVENT_HEADER, row, &mut self.header)?;
        for object in self.objects.iter_mut().filter(|o| o.from_input) {
            object.loaded = false;
            if input.descriptor(&object.stream).is_some() {
                object.handle.load(input, &self.registry, &object.stream, row)?;
                object.loaded = true;
            } else {
                object.handle.clear();
            }
        }
        self.entry = row;
        Ok(())
    }

    /// Write the header, every kept object added this event and every kept
    /// input object as the next event of `writer`.
    pub fn save(&mut self, writer: &mut dyn Writer) -> EventResult<()> {
        if writer.descriptor(EVENT_HEADER).is_none() {
            declare::<EventHeader>(writer, &self.registry, EVENT_HEADER)?;
        }
        let row = writer.entries(EVENT_HEADER);
        write(writer, EVENT_HEADER, &self.header)?;

        // Objects skipped this event are back-filled by the next write.
        for object in self
            .objects
            .iter()
            .filter(|o| o.keep && (o.updated || (o.from_input && o.loaded)))
        {
            if writer.descriptor(&object.stream).is_none() {
                object.handle.declare(writer, &self.registry, &object.stream)?;
            }
            backfill(writer, &object.stream, row)?;
            object.handle.save(writer, &object.stream)?;
        }

        // Kept input objects nobody asked for are copied as stored.
        let Some(input) = self.input.as_deref_mut() else {
            return Ok(());
        };
        for product in self.products.iter().filter(|p| p.from_input) {
            let full_name = product.tag.full_name();
            if self.index.contains_key(&full_name) || !self.rules.keep(&full_name, false) {
                continue;
            }
            let stream = object_stream(&product.tag.pass, &product.tag.name);
            if writer.descriptor(&stream).is_none() {
                let stored = input
                    .descriptor(&stream)
                    .ok_or_else(|| StorageError::StreamNotFound(stream.clone()))?;
                writer.declare(&stream, target_descriptor(&self.registry, &stored)?)?;
            }
            backfill(writer, &stream, row)?;
            copy_row(input, writer, &self.registry, &stream, self.entry)?;
        }
        Ok(())
    }

    /// Bring every event stream of `writer` up to the number of saved
    /// events. Call before closing the output.
    pub fn finish(&self, writer: &mut dyn Writer) -> EventResult<()> {
        let rows = writer.entries(EVENT_HEADER);
        for stream in writer.streams() {
            if parse_object_stream(&stream).is_some() {
                backfill(writer, &stream, rows)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for EventStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStore")
            .field("pass", &self.pass)
            .field("objects", &self.objects.len())
            .field("products", &self.products.len())
            .field("entry", &self.entry)
            .finish()
    }
}

fn full_match(pattern: &str) -> EventResult<Regex> {
    let pattern = if pattern.is_empty() { ".*" } else { pattern };
    Regex::new(&format!("^(?:{pattern})$")).map_err(|e| EventError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Append default rows to `stream` until it has `rows` entries.
fn backfill(writer: &mut dyn Writer, stream: &str, rows: u64) -> EventResult<()> {
    let missing = rows.saturating_sub(writer.entries(stream));
    if missing == 0 {
        return Ok(());
    }
    let descriptor = writer
        .descriptor(stream)
        .ok_or_else(|| StorageError::NotDeclared(stream.to_string()))?;
    let blank = Value::default_for(&descriptor.root, &descriptor)?;
    for _ in 0..missing {
        blank.write_row(writer, stream)?;
    }
    debug!(stream, rows = missing, "back-filled stream");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use fire_io::{
        create_writer, open_reader, read_all, FieldKind, Loader, Saver, WriterConfig,
    };
    use fire_types::{Classify, ErrorKind};

    use super::*;
    use crate::header::register_headers;
    use crate::rules::DropKeepRule;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Hit {
        energy: f64,
        layer: i32,
    }

    impl Storable for Hit {
        fn kind() -> FieldKind {
            FieldKind::object("Hit", 1)
        }

        fn save(&self, saver: &mut Saver<'_>) -> StorageResult<()> {
            saver.field("energy", &self.energy)?;
            saver.field("layer", &self.layer)
        }

        fn load(&mut self, loader: &mut Loader<'_>) -> StorageResult<()> {
            loader.field("energy", &mut self.energy)?;
            loader.field("layer", &mut self.layer)
        }
    }

    fn registry() -> Arc<SchemaRegistry> {
        let mut registry = SchemaRegistry::new();
        register_headers(&mut registry).unwrap();
        registry
            .declare("Hit", 1, |s| s.field_of::<f64>("energy").field_of::<i32>("layer"))
            .unwrap();
        Arc::new(registry)
    }

    fn store(pass: &str, rules: &[DropKeepRule]) -> EventStore {
        EventStore::new(pass, registry(), DropKeepRules::new(rules).unwrap())
    }

    /// Three simulated events with `hits` and `count` in pass `sim`.
    fn write_sim(path: &Path) {
        let mut writer = create_writer(path, &WriterConfig::default()).unwrap();
        let mut store = store("sim", &[]);
        for i in 0..3 {
            store.header_mut().set_number(i);
            store.header_mut().set_run(7);
            store
                .add("hits", vec![Hit { energy: i as f64, layer: 1 }])
                .unwrap();
            store.add("count", i as i32).unwrap();
            store.save(&mut *writer).unwrap();
            store.clear();
        }
        store.finish(&mut *writer).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn add_then_get_in_same_event() {
        let mut store = store("reco", &[]);
        store.add("count", 3i32).unwrap();
        assert_eq!(*store.get::<i32>("count", None).unwrap(), 3);
        assert_eq!(*store.get::<i32>("count", Some("reco")).unwrap(), 3);
        assert!(store.exists("count", None));
        assert!(!store.exists("count", Some("sim")));

        let err = store.add("count", 4i32).unwrap_err();
        assert!(matches!(err, EventError::Repeat(_)));
        assert_eq!(err.kind(), ErrorKind::StateError);

        store.clear();
        let err = store.get::<i32>("count", None).unwrap_err();
        assert!(matches!(err, EventError::NotFound { .. }));
        let err = store.add("count", 1.5f64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
        store.add("count", 5i32).unwrap();
    }

    #[test]
    fn missing_objects_are_recoverable() {
        let mut store = store("reco", &[]);
        let err = store.get::<i32>("nothing", None).unwrap_err();
        assert!(err.is_recoverable());
        let err = store.get::<i32>("nothing", Some("sim")).unwrap_err();
        assert!(matches!(err, EventError::NotFound { .. }));
        assert!(matches!(
            store.add("a/b", 1i32).unwrap_err(),
            EventError::InvalidName(_)
        ));
    }

    #[test]
    fn ambiguous_lookup_needs_a_pass() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.fcol");
        write_sim(&path);

        let mut store = store("reco", &[]);
        store.attach_input(open_reader(&path).unwrap());
        store.load_into(0).unwrap();
        store.add("count", 10i32).unwrap();

        let err = store.get::<i32>("count", None).unwrap_err();
        assert!(matches!(&err, EventError::Ambiguous { passes, .. } if passes.len() == 2));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(*store.get::<i32>("count", Some("sim")).unwrap(), 0);
        assert_eq!(*store.get::<i32>("count", Some("reco")).unwrap(), 10);
        // A different type under the same name is a different object.
        assert!(store.get::<Vec<Hit>>("hits", None).is_ok());
        assert!(!store.exists("count", None));
    }

    #[test]
    fn search_matches_whole_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.ftree");
        write_sim(&path);

        let mut store = store("reco", &[]);
        store.attach_input(open_reader(&path).unwrap());
        store.add("clusters", vec![Hit::default()]).unwrap();

        let all = store.search("", "", "").unwrap();
        assert_eq!(all.len(), 3);
        let vectors = store.search("", "", "Vec<Hit>").unwrap();
        let mut names: Vec<String> = vectors.iter().map(ProductTag::full_name).collect();
        names.sort();
        assert_eq!(names, vec!["reco/clusters", "sim/hits"]);
        assert!(store.search("hit", "", "").unwrap().is_empty());
        assert!(store.search("(", "", "").is_err());
    }

    #[test]
    fn late_objects_are_back_filled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.fcol");
        let mut writer = create_writer(&path, &WriterConfig::default()).unwrap();
        let mut store = store("reco", &[DropKeepRule::drop("reco/scratch")]);
        for i in 0..4 {
            store.header_mut().set_number(i);
            if i != 1 {
                store.add("energy", i as f64).unwrap();
            }
            if i == 2 {
                store.add("late", Hit { energy: 2.5, layer: 3 }).unwrap();
            }
            store.add("scratch", i as i32).unwrap();
            store.save(&mut *writer).unwrap();
            store.clear();
        }
        store.finish(&mut *writer).unwrap();
        writer.close().unwrap();

        let registry = registry();
        let mut reader = open_reader(&path).unwrap();
        assert_eq!(reader.events(), 4);
        let energy: Vec<f64> = read_all(&mut *reader, &registry, "events/reco/energy").unwrap();
        assert_eq!(energy, vec![0.0, 0.0, 2.0, 3.0]);
        let late: Vec<Hit> = read_all(&mut *reader, &registry, "events/reco/late").unwrap();
        assert_eq!(late.len(), 4);
        assert_eq!(late[2], Hit { energy: 2.5, layer: 3 });
        assert_eq!(late[3], Hit::default());
        assert!(reader.descriptor("events/reco/scratch").is_none());
        let headers: Vec<EventHeader> = read_all(&mut *reader, &registry, EVENT_HEADER).unwrap();
        assert_eq!(headers.iter().map(EventHeader::number).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn input_objects_are_dropped_unless_kept() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("sim.fcol");
        write_sim(&input);

        for (rules, mirrored) in [(vec![], false), (vec![DropKeepRule::keep("sim/.*")], true)] {
            let output = dir.path().join(format!("reco-{mirrored}.ftree"));
            let mut writer = create_writer(&output, &WriterConfig::default()).unwrap();
            let mut store = store("reco", &rules);
            store.attach_input(open_reader(&input).unwrap());
            for row in 0..store.input_events().unwrap() {
                store.load_into(row).unwrap();
                let count = *store.get::<i32>("count", None).unwrap();
                store.add("doubled", count * 2).unwrap();
                store.save(&mut *writer).unwrap();
                store.clear();
            }
            store.finish(&mut *writer).unwrap();
            writer.close().unwrap();

            let registry = registry();
            let mut reader = open_reader(&output).unwrap();
            let doubled: Vec<i32> = read_all(&mut *reader, &registry, "events/reco/doubled").unwrap();
            assert_eq!(doubled, vec![0, 2, 4]);
            let headers: Vec<EventHeader> = read_all(&mut *reader, &registry, EVENT_HEADER).unwrap();
            assert_eq!(headers[2].number(), 2);
            assert_eq!(headers[2].run(), 7);

            assert_eq!(reader.descriptor("events/sim/count").is_some(), mirrored);
            assert_eq!(reader.descriptor("events/sim/hits").is_some(), mirrored);
            if mirrored {
                let count: Vec<i32> = read_all(&mut *reader, &registry, "events/sim/count").unwrap();
                assert_eq!(count, vec![0, 1, 2]);
                let hits: Vec<Vec<Hit>> = read_all(&mut *reader, &registry, "events/sim/hits").unwrap();
                assert_eq!(hits[1], vec![Hit { energy: 1.0, layer: 1 }]);
            }
        }
    }

    #[test]
    fn objects_missing_from_the_next_input_are_not_present() {
        let dir = tempfile::tempdir().unwrap();
        let with_count = dir.path().join("sim.fcol");
        write_sim(&with_count);
        let without_count = dir.path().join("gen.fcol");
        {
            let mut writer = create_writer(&without_count, &WriterConfig::default()).unwrap();
            let mut generator = store("gen", &[]);
            generator.header_mut().set_run(8);
            generator.add("seed", 11i32).unwrap();
            generator.save(&mut *writer).unwrap();
            generator.finish(&mut *writer).unwrap();
            writer.close().unwrap();
        }

        let output = dir.path().join("out.fcol");
        let mut writer = create_writer(&output, &WriterConfig::default()).unwrap();
        let mut store = store("reco", &[DropKeepRule::keep("sim/.*")]);
        store.attach_input(open_reader(&with_count).unwrap());
        store.load_into(2).unwrap();
        assert_eq!(*store.get::<i32>("count", Some("sim")).unwrap(), 2);
        store.save(&mut *writer).unwrap();
        store.clear();
        // Cleared input objects reload from the current entry.
        assert_eq!(*store.get::<i32>("count", Some("sim")).unwrap(), 2);
        store.clear();

        store.attach_input(open_reader(&without_count).unwrap());
        store.load_into(0).unwrap();
        let err = store.get::<i32>("count", Some("sim")).unwrap_err();
        assert!(matches!(err, EventError::NotFound { .. }));
        assert!(!store.exists("count", Some("sim")));
        assert_eq!(*store.get::<i32>("seed", None).unwrap(), 11);
        store.save(&mut *writer).unwrap();
        assert_eq!(writer.entries(EVENT_HEADER), 2);
        assert_eq!(writer.entries("events/sim/count"), 1);
        store.finish(&mut *writer).unwrap();
        writer.close().unwrap();

        let registry = registry();
        let mut reader = open_reader(&output).unwrap();
        let count: Vec<i32> = read_all(&mut *reader, &registry, "events/sim/count").unwrap();
        assert_eq!(count, vec![2, 0]);
    }

    #[test]
    fn load_into_requires_input() {
        let mut store = store("reco", &[]);
        assert!(matches!(store.load_into(0).unwrap_err(), EventError::NoInput));
        assert!(store.input().is_none());
        assert!(store.detach_input().is_none());
    }
}
