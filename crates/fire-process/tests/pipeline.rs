//! End-to-end runs of the driver: production, filtering, retries and
//! reconstruction from earlier outputs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fire_conditions::{ProviderFactory, RandomSeeds};
use fire_event::{DropKeepRule, EventError, EventStore, RunHeader};
use fire_io::{open_reader, read_all, SchemaRegistry, RUN_HEADER};
use fire_process::{
    ListeningRule, OutputConfig, Process, ProcessConfig, ProcessContext, ProcessError,
    ProcessOutcome, ProcessResult, Processor, ProcessorConfig, ProcessorFactory, ProviderConfig,
    StorageHint,
};
use fire_types::Parameters;

type Journal = Arc<Mutex<Vec<String>>>;

/// Adds the event number under `product` and records every hook it sees.
struct Producer {
    name: String,
    product: String,
    journal: Journal,
}

impl Producer {
    fn note(&self, entry: String) {
        self.journal.lock().unwrap().push(entry);
    }
}

impl Processor for Producer {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, event: &mut EventStore, _ctx: &mut ProcessContext<'_>) -> ProcessOutcome {
        let number = event.header().number() as i32;
        event.add(&self.product, number).map_err(ProcessError::from).into()
    }

    fn on_new_run(&mut self, run: &RunHeader) -> ProcessResult<()> {
        self.note(format!("run:{}", run.number()));
        Ok(())
    }

    fn on_file_open(&mut self, file: &str) -> ProcessResult<()> {
        let name = Path::new(file).file_name().unwrap().to_string_lossy().into_owned();
        self.note(format!("open:{name}"));
        Ok(())
    }

    fn on_process_start(&mut self) -> ProcessResult<()> {
        self.note("start".into());
        Ok(())
    }

    fn on_process_end(&mut self) -> ProcessResult<()> {
        self.note("end".into());
        Ok(())
    }
}

/// Stores the seed the `seeds` condition hands out for its name.
struct Seeded;

impl Seeded {
    fn store_seed(&self, event: &mut EventStore, ctx: &mut ProcessContext<'_>) -> ProcessResult<()> {
        let seed = ctx.condition::<RandomSeeds>("seeds")?.seed(self.name());
        event.add("seed", seed)?;
        Ok(())
    }
}

impl Processor for Seeded {
    fn name(&self) -> &str {
        "seeded"
    }

    fn process(&mut self, event: &mut EventStore, ctx: &mut ProcessContext<'_>) -> ProcessOutcome {
        self.store_seed(event, ctx).into()
    }
}

/// Votes to drop odd-numbered events.
struct OddFilter;

impl Processor for OddFilter {
    fn name(&self) -> &str {
        "filter"
    }

    fn process(&mut self, event: &mut EventStore, ctx: &mut ProcessContext<'_>) -> ProcessOutcome {
        if event.header().number() % 2 == 1 {
            ctx.set_storage_hint(StorageHint::ShouldDrop, "odd");
        }
        ProcessOutcome::Ok
    }
}

/// Aborts the first attempt at every event.
#[derive(Default)]
struct Flaky {
    attempts: HashMap<i64, u32>,
}

impl Processor for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    fn process(&mut self, event: &mut EventStore, _ctx: &mut ProcessContext<'_>) -> ProcessOutcome {
        let attempts = self.attempts.entry(event.header().number()).or_default();
        *attempts += 1;
        if *attempts == 1 {
            ProcessOutcome::AbortEvent
        } else {
            ProcessOutcome::Ok
        }
    }
}

/// Reads `count` from the input and adds `doubled`.
struct Doubler {
    source: String,
}

impl Processor for Doubler {
    fn name(&self) -> &str {
        "doubler"
    }

    fn process(&mut self, event: &mut EventStore, _ctx: &mut ProcessContext<'_>) -> ProcessOutcome {
        double(event, &self.source).map_err(ProcessError::from).into()
    }
}

fn double(event: &mut EventStore, source: &str) -> Result<(), EventError> {
    let count = *event.get::<i32>(source, None)?;
    event.add("doubled", count * 2)
}

struct Boom;

impl Processor for Boom {
    fn name(&self) -> &str {
        "boom"
    }

    fn process(&mut self, _event: &mut EventStore, _ctx: &mut ProcessContext<'_>) -> ProcessOutcome {
        ProcessOutcome::Fatal("detector on fire".into())
    }
}

fn factory(journal: &Journal) -> ProcessorFactory {
    let mut factory = ProcessorFactory::new();
    let journal = Arc::clone(journal);
    factory.register("Producer", move |config| {
        Ok(Box::new(Producer {
            name: config.name.clone(),
            product: config.parameters.get_or("product", "count".to_string())?,
            journal: Arc::clone(&journal),
        }))
    });
    factory.register("Seeded", |_| Ok(Box::new(Seeded)));
    factory.register("OddFilter", |_| Ok(Box::new(OddFilter)));
    factory.register("Flaky", |_| Ok(Box::new(Flaky::default())));
    factory.register("Doubler", |config| {
        Ok(Box::new(Doubler {
            source: config.parameters.get_or("source", "count".to_string())?,
        }))
    });
    factory.register("Boom", |_| Ok(Box::new(Boom)));
    factory
}

fn step(class_name: &str, name: &str) -> ProcessorConfig {
    ProcessorConfig {
        class_name: class_name.into(),
        name: name.into(),
        parameters: Parameters::new(),
    }
}

fn production(path: PathBuf, pass: &str, run: i32, events: u64, sequence: Vec<ProcessorConfig>) -> ProcessConfig {
    ProcessConfig {
        pass_name: pass.into(),
        event_limit: events,
        run,
        output: OutputConfig {
            path,
            ..OutputConfig::default()
        },
        sequence,
        ..ProcessConfig::default()
    }
}

fn run(config: ProcessConfig, journal: &Journal) -> ProcessResult<fire_process::RunSummary> {
    let mut process = Process::new(
        config,
        SchemaRegistry::new(),
        &factory(journal),
        ProviderFactory::with_builtins(),
    )?;
    process.run()
}

fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    fire_event::register_headers(&mut registry).unwrap();
    registry
}

#[test]
fn production_writes_events_and_run_header() {
    let dir = tempfile::tempdir().unwrap();
    let journal = Journal::default();
    let mut config = production(
        dir.path().join("sim.fcol"),
        "sim",
        3,
        5,
        vec![step("Producer", "producer"), step("Seeded", "seeded")],
    );
    config.conditions.providers.push(ProviderConfig {
        class_name: "RandomNumberSeedService".into(),
        tag_name: String::new(),
        parameters: Parameters::new()
            .with("obj_name", "seeds")
            .with("mode", "external")
            .with("root", 11),
    });

    let summary = run(config, &journal).unwrap();
    assert_eq!((summary.processed, summary.saved, summary.aborted), (5, 5, 0));
    assert_eq!(summary.runs, 1);
    assert_eq!(summary.output.stream("events/sim/count").unwrap().entries, 5);

    let registry = registry();
    let mut reader = open_reader(&dir.path().join("sim.fcol")).unwrap();
    let counts: Vec<i32> = read_all(&mut *reader, &registry, "events/sim/count").unwrap();
    assert_eq!(counts, vec![1, 2, 3, 4, 5]);
    let seeds: Vec<u64> = read_all(&mut *reader, &registry, "events/sim/seed").unwrap();
    assert!(seeds.iter().all(|&s| s == RandomSeeds::new(11).seed("seeded")));
    let runs: Vec<RunHeader> = read_all(&mut *reader, &registry, RUN_HEADER).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].number(), 3);
    assert!(runs[0].end() >= runs[0].start());

    assert_eq!(
        *journal.lock().unwrap(),
        vec!["start", "open:sim.fcol", "run:3", "end"]
    );
}

#[test]
fn storage_control_drops_odd_events() {
    let dir = tempfile::tempdir().unwrap();
    let journal = Journal::default();
    let mut config = production(
        dir.path().join("even.ftree"),
        "sim",
        1,
        5,
        vec![step("Producer", "producer"), step("OddFilter", "filter")],
    );
    config.storage.listening_rules.push(ListeningRule {
        processor: "filter".into(),
        purpose: String::new(),
    });

    let summary = run(config, &journal).unwrap();
    assert_eq!((summary.processed, summary.saved), (5, 2));

    let mut reader = open_reader(&dir.path().join("even.ftree")).unwrap();
    let counts: Vec<i32> = read_all(&mut *reader, &registry(), "events/sim/count").unwrap();
    assert_eq!(counts, vec![2, 4]);
}

#[test]
fn aborted_events_are_retried_up_to_max_tries() {
    let dir = tempfile::tempdir().unwrap();
    let journal = Journal::default();
    for (tries, saved) in [(2, 4), (1, 0)] {
        let mut config = production(
            dir.path().join(format!("retry-{tries}.fcol")),
            "sim",
            1,
            4,
            vec![step("Producer", "producer"), step("Flaky", "flaky")],
        );
        config.max_tries = tries;

        let summary = run(config, &journal).unwrap();
        assert_eq!(summary.saved, saved);
        assert_eq!(summary.aborted, 4);
        assert_eq!(summary.output.stream("events/EventHeader").map_or(0, |s| s.entries), saved);
    }
}

#[test]
fn fatal_outcome_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let journal = Journal::default();
    let config = production(
        dir.path().join("boom.fcol"),
        "sim",
        1,
        3,
        vec![step("Producer", "producer"), step("Boom", "boom")],
    );
    let err = run(config, &journal).unwrap_err();
    assert!(matches!(err, ProcessError::Fatal { ref processor, .. } if processor == "boom"));
    assert!(!journal.lock().unwrap().contains(&"end".to_string()));
}

#[test]
fn empty_sequence_and_unknown_classes_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let journal = Journal::default();
    let config = production(dir.path().join("none.fcol"), "sim", 1, 1, vec![]);
    assert!(matches!(run(config, &journal).unwrap_err(), ProcessError::Config(_)));

    let config = production(dir.path().join("none.fcol"), "sim", 1, 1, vec![step("Missing", "m")]);
    assert!(matches!(
        run(config, &journal).unwrap_err(),
        ProcessError::UnknownProcessor(_)
    ));
}

#[test]
fn reconstruction_reads_inputs_and_carries_runs() {
    let dir = tempfile::tempdir().unwrap();
    let journal = Journal::default();
    let first = dir.path().join("run1.fcol");
    let second = dir.path().join("run2.ftree");
    run(production(first.clone(), "sim", 1, 4, vec![step("Producer", "producer")]), &journal).unwrap();
    run(production(second.clone(), "sim", 2, 3, vec![step("Producer", "producer")]), &journal).unwrap();

    journal.lock().unwrap().clear();
    let output = dir.path().join("reco.fcol");
    let mut watcher = step("Producer", "watcher");
    watcher.parameters.insert("product", "tally");
    let config = ProcessConfig {
        pass_name: "reco".into(),
        input_files: vec![first, second],
        output: OutputConfig {
            path: output.clone(),
            ..OutputConfig::default()
        },
        drop_keep_rules: vec![DropKeepRule::keep("sim/.*")],
        sequence: vec![watcher, step("Doubler", "doubler")],
        ..ProcessConfig::default()
    };
    let summary = run(config, &journal).unwrap();
    assert_eq!((summary.processed, summary.saved), (7, 7));
    assert_eq!(summary.runs, 2);

    let registry = registry();
    let mut reader = open_reader(&output).unwrap();
    let doubled: Vec<i32> = read_all(&mut *reader, &registry, "events/reco/doubled").unwrap();
    assert_eq!(doubled, vec![2, 4, 6, 8, 2, 4, 6]);
    let carried: Vec<i32> = read_all(&mut *reader, &registry, "events/sim/count").unwrap();
    assert_eq!(carried, vec![1, 2, 3, 4, 1, 2, 3]);
    let runs: Vec<RunHeader> = read_all(&mut *reader, &registry, RUN_HEADER).unwrap();
    assert_eq!(runs.iter().map(RunHeader::number).collect::<Vec<_>>(), vec![1, 2]);
    let tally: Vec<i32> = read_all(&mut *reader, &registry, "events/reco/tally").unwrap();
    assert_eq!(tally, carried);

    let journal = journal.lock().unwrap();
    assert_eq!(
        *journal,
        vec!["start", "open:run1.fcol", "run:1", "open:run2.ftree", "run:2", "end"]
    );
}

#[test]
fn event_limit_caps_reconstruction_and_missing_objects_abort() {
    let dir = tempfile::tempdir().unwrap();
    let journal = Journal::default();
    let input = dir.path().join("in.fcol");
    run(production(input.clone(), "sim", 1, 6, vec![step("Producer", "producer")]), &journal).unwrap();

    let mut doubler = step("Doubler", "doubler");
    doubler.parameters.insert("source", "absent");
    let config = ProcessConfig {
        pass_name: "reco".into(),
        event_limit: 4,
        input_files: vec![input],
        output: OutputConfig {
            path: dir.path().join("capped.fcol"),
            ..OutputConfig::default()
        },
        sequence: vec![doubler],
        ..ProcessConfig::default()
    };
    let summary = run(config, &journal).unwrap();
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.aborted, 4);
    assert_eq!(summary.saved, 0);
}
