//! Event and run headers, stored like any other object but owned by the
//! framework.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use fire_io::{
    FieldKind, Loader, ParameterStorage, ParameterValue, Saver, SchemaRegistry, Storable,
    StorageResult,
};
use fire_types::{EventContext, RunNumber};

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Register the header schemas.
pub fn register_headers(registry: &mut SchemaRegistry) -> StorageResult<()> {
    registry.declare(EventHeader::TYPE_NAME, 1, |s| {
        s.field_of::<i64>("number")
            .field_of::<i32>("run")
            .field_of::<i64>("timestamp")
            .field_of::<f64>("weight")
            .field_of::<bool>("real_data")
            .field_of::<ParameterStorage>("parameters")
    })?;
    registry.declare(RunHeader::TYPE_NAME, 1, |s| {
        s.field_of::<i32>("number")
            .field_of::<String>("detector_name")
            .field_of::<String>("description")
            .field_of::<String>("software_tag")
            .field_of::<i64>("start")
            .field_of::<i64>("end")
            .field_of::<ParameterStorage>("parameters")
    })
}

/// Identity and bookkeeping of one event.
#[derive(Clone, Debug, PartialEq)]
pub struct EventHeader {
    number: i64,
    run: RunNumber,
    timestamp: i64,
    weight: f64,
    real_data: bool,
    parameters: ParameterStorage,
}

impl Default for EventHeader {
    fn default() -> Self {
        Self {
            number: -1,
            run: -1,
            timestamp: 0,
            weight: 1.0,
            real_data: false,
            parameters: ParameterStorage::new(),
        }
    }
}

impl EventHeader {
    pub const TYPE_NAME: &'static str = "EventHeader";

    pub fn number(&self) -> i64 {
        self.number
    }

    pub fn run(&self) -> RunNumber {
        self.run
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn is_real_data(&self) -> bool {
        self.real_data
    }

    pub fn set_number(&mut self, number: i64) {
        self.number = number;
    }

    pub fn set_run(&mut self, run: RunNumber) {
        self.run = run;
    }

    /// Stamp the header with the current time.
    pub fn stamp(&mut self) {
        self.timestamp = now();
    }

    pub fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    pub fn set_real_data(&mut self, real_data: bool) {
        self.real_data = real_data;
    }

    pub fn get<T: ParameterValue + Clone>(&self, name: &str) -> StorageResult<T> {
        self.parameters.get(name)
    }

    pub fn set<T: ParameterValue>(&mut self, name: impl Into<String>, value: T) {
        self.parameters.set(name, value);
    }

    pub fn parameters(&self) -> &ParameterStorage {
        &self.parameters
    }

    /// What the conditions layer sees of this event.
    pub fn context(&self) -> EventContext {
        EventContext::new(self.run, self.number, self.real_data)
    }
}

impl Storable for EventHeader {
    fn kind() -> FieldKind {
        FieldKind::object(Self::TYPE_NAME, 1)
    }

    fn save(&self, saver: &mut Saver<'_>) -> StorageResult<()> {
        saver.field("number", &self.number)?;
        saver.field("run", &self.run)?;
        saver.field("timestamp", &self.timestamp)?;
        saver.field("weight", &self.weight)?;
        saver.field("real_data", &self.real_data)?;
        saver.field("parameters", &self.parameters)
    }

    fn load(&mut self, loader: &mut Loader<'_>) -> StorageResult<()> {
        loader.field("number", &mut self.number)?;
        loader.field("run", &mut self.run)?;
        loader.field("timestamp", &mut self.timestamp)?;
        loader.field("weight", &mut self.weight)?;
        loader.field("real_data", &mut self.real_data)?;
        loader.field("parameters", &mut self.parameters)
    }

    /// Only the weight is reset between events; the driver rewrites the
    /// identity fields.
    fn clear(&mut self) {
        self.weight = 1.0;
    }
}

impl fmt::Display for EventHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EventHeader {{ number: {}, run: {}, weight: {}, {}, timestamp: {} }}",
            self.number,
            self.run,
            self.weight,
            if self.real_data { "DATA" } else { "MC" },
            self.timestamp
        )
    }
}

/// Description of one run, written once per run when the output closes.
#[derive(Clone, Debug, PartialEq)]
pub struct RunHeader {
    number: RunNumber,
    detector_name: String,
    description: String,
    software_tag: String,
    start: i64,
    end: i64,
    parameters: ParameterStorage,
}

impl Default for RunHeader {
    fn default() -> Self {
        Self {
            number: 0,
            detector_name: String::new(),
            description: String::new(),
            software_tag: env!("CARGO_PKG_VERSION").to_string(),
            start: 0,
            end: 0,
            parameters: ParameterStorage::new(),
        }
    }
}

impl RunHeader {
    pub const TYPE_NAME: &'static str = "RunHeader";

    pub fn new(number: RunNumber) -> Self {
        Self {
            number,
            ..Self::default()
        }
    }

    pub fn number(&self) -> RunNumber {
        self.number
    }

    pub fn detector_name(&self) -> &str {
        &self.detector_name
    }

    pub fn set_detector_name(&mut self, name: impl Into<String>) {
        self.detector_name = name.into();
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn software_tag(&self) -> &str {
        &self.software_tag
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    /// Begin run `number` now.
    pub fn run_start(&mut self, number: RunNumber) {
        self.number = number;
        self.start = now();
    }

    pub fn run_end(&mut self) {
        self.end = now();
    }

    pub fn get<T: ParameterValue + Clone>(&self, name: &str) -> StorageResult<T> {
        self.parameters.get(name)
    }

    pub fn set<T: ParameterValue>(&mut self, name: impl Into<String>, value: T) {
        self.parameters.set(name, value);
    }

    pub fn parameters(&self) -> &ParameterStorage {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterStorage {
        &mut self.parameters
    }
}

impl Storable for RunHeader {
    fn kind() -> FieldKind {
        FieldKind::object(Self::TYPE_NAME, 1)
    }

    fn save(&self, saver: &mut Saver<'_>) -> StorageResult<()> {
        saver.field("number", &self.number)?;
        saver.field("detector_name", &self.detector_name)?;
        saver.field("description", &self.description)?;
        saver.field("software_tag", &self.software_tag)?;
        saver.field("start", &self.start)?;
        saver.field("end", &self.end)?;
        saver.field("parameters", &self.parameters)
    }

    fn load(&mut self, loader: &mut Loader<'_>) -> StorageResult<()> {
        loader.field("number", &mut self.number)?;
        loader.field("detector_name", &mut self.detector_name)?;
        loader.field("description", &mut self.description)?;
        loader.field("software_tag", &mut self.software_tag)?;
        loader.field("start", &mut self.start)?;
        loader.field("end", &mut self.end)?;
        loader.field("parameters", &mut self.parameters)
    }

    fn clear(&mut self) {
        self.number = -1;
        self.start = 0;
        self.end = 0;
        self.detector_name.clear();
        self.description.clear();
        self.software_tag.clear();
        self.parameters.clear();
    }
}

impl fmt::Display for RunHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RunHeader {{ run: {}, detector: {}, description: {} }}",
            self.number, self.detector_name, self.description
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fire_io::{declare, read_all, write, ColumnarWriter, TreeReader, TreeWriter, Writer, WriterConfig, RUN_HEADER};

    #[test]
    fn event_header_clear_keeps_identity() {
        let mut header = EventHeader::default();
        header.set_number(4);
        header.set_run(2);
        header.set_weight(0.25);
        header.set("trigger", 3i64);
        header.clear();
        assert_eq!(header.weight(), 1.0);
        assert_eq!(header.number(), 4);
        assert_eq!(header.context(), EventContext::simulation(2, 4));
        assert_eq!(header.get::<i64>("trigger").unwrap(), 3);
    }

    #[test]
    fn run_headers_round_trip() {
        let mut registry = SchemaRegistry::new();
        register_headers(&mut registry).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.ftree");

        let mut writer = TreeWriter::create(&path, WriterConfig::default()).unwrap();
        declare::<RunHeader>(&mut writer, &registry, RUN_HEADER).unwrap();
        for number in [1, 2] {
            let mut header = RunHeader::new(number);
            header.set_detector_name("ecal");
            header.set("RandomNumberRootSeed", i64::from(number));
            write(&mut writer, RUN_HEADER, &header).unwrap();
        }
        writer.close().unwrap();

        let mut reader = TreeReader::open(&path).unwrap();
        let runs: Vec<RunHeader> = read_all(&mut reader, &registry, RUN_HEADER).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1].number(), 2);
        assert_eq!(runs[1].detector_name(), "ecal");
        assert_eq!(runs[1].get::<i64>("RandomNumberRootSeed").unwrap(), 2);
        assert_eq!(runs[0].software_tag(), env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn header_layout_is_fixed() {
        let mut registry = SchemaRegistry::new();
        register_headers(&mut registry).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ColumnarWriter::create(&dir.path().join("h.fcol"), WriterConfig::default()).unwrap();
        declare::<EventHeader>(&mut writer, &registry, fire_io::EVENT_HEADER).unwrap();
        let descriptor = writer.descriptor(fire_io::EVENT_HEADER).unwrap();
        let columns: Vec<String> = descriptor.columns().unwrap().into_iter().map(|(c, _)| c).collect();
        assert_eq!(&columns[..5], ["number", "run", "timestamp", "weight", "real_data"]);
        // Registering twice is accepted.
        register_headers(&mut registry).unwrap();
    }
}
