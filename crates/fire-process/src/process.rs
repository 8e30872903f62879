use std::collections::BTreeMap;
use std::sync::Arc;

use fire_conditions::{Conditions, ProviderFactory};
use fire_event::{register_headers, DropKeepRules, EventStore, RunHeader};
use fire_io::{
    create_writer, declare, open_reader, read_all, write, FileSummary, Reader, SchemaRegistry, Writer,
    RUN_HEADER,
};
use fire_types::RunNumber;
use tracing::{debug, info, warn};

use crate::config::ProcessConfig;
use crate::error::{ProcessError, ProcessResult};
use crate::processor::{ProcessContext, ProcessOutcome, Processor, ProcessorFactory};
use crate::storage::StorageControl;

/// Counts of one run of the driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    /// Events that went through the whole sequence.
    pub processed: u64,
    pub saved: u64,
    /// Processing attempts that ended in `AbortEvent`.
    pub aborted: u64,
    pub runs: usize,
    pub output: FileSummary,
}

#[derive(Default)]
struct Counters {
    processed: u64,
    saved: u64,
    aborted: u64,
}

/// Drives a sequence of processors over events.
///
/// With no input files the process produces `event_limit` events from
/// scratch; otherwise it reads every entry of each input file in turn.
pub struct Process {
    config: ProcessConfig,
    registry: Arc<SchemaRegistry>,
    sequence: Vec<Box<dyn Processor>>,
    conditions: Conditions,
    storage: StorageControl,
    event: EventStore,
}

impl Process {
    /// Build the sequence and conditions from configuration.
    pub fn new(
        config: ProcessConfig,
        registry: SchemaRegistry,
        processors: &ProcessorFactory,
        providers: ProviderFactory,
    ) -> ProcessResult<Self> {
        if config.sequence.is_empty() {
            return Err(ProcessError::config(
                "no processors in the sequence; nothing to do",
            ));
        }
        let sequence = config
            .sequence
            .iter()
            .map(|spec| processors.make(spec))
            .collect::<ProcessResult<Vec<_>>>()?;
        let mut conditions = Conditions::new(providers);
        for provider in &config.conditions.providers {
            conditions.declare_provider(
                &provider.class_name,
                &provider.tag_name,
                provider.parameters.clone(),
            )?;
        }
        Self::with_sequence(config, registry, sequence, conditions)
    }

    /// Use an already built sequence and conditions cache.
    pub fn with_sequence(
        config: ProcessConfig,
        mut registry: SchemaRegistry,
        sequence: Vec<Box<dyn Processor>>,
        conditions: Conditions,
    ) -> ProcessResult<Self> {
        config.validate()?;
        register_headers(&mut registry)?;
        let registry = Arc::new(registry);
        let rules = DropKeepRules::new(&config.drop_keep_rules)?;
        let storage = StorageControl::new(&config.storage)?;
        let event = EventStore::new(config.pass_name.clone(), Arc::clone(&registry), rules);
        Ok(Self {
            config,
            registry,
            sequence,
            conditions,
            storage,
            event,
        })
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    pub fn conditions_mut(&mut self) -> &mut Conditions {
        &mut self.conditions
    }

    /// Run the whole process and close the output.
    pub fn run(&mut self) -> ProcessResult<RunSummary> {
        let mut output = create_writer(&self.config.output.path, &self.config.output.writer)?;
        let mut counters = Counters::default();

        self.conditions.on_process_start()?;
        for processor in &mut self.sequence {
            processor.on_process_start()?;
        }

        let runs = if self.config.is_production() {
            info!(events = self.config.event_limit, "no input files, starting production run");
            self.produce(&mut *output, &mut counters)?
        } else {
            info!(files = self.config.input_files.len(), "starting reconstruction run");
            self.reconstruct(&mut *output, &mut counters)?
        };

        self.event.finish(&mut *output)?;
        declare::<RunHeader>(&mut *output, &self.registry, RUN_HEADER)?;
        for run in &runs {
            write(&mut *output, RUN_HEADER, run)?;
        }

        for processor in &mut self.sequence {
            processor.on_process_end()?;
        }
        self.conditions.on_process_end()?;

        let summary = output.close()?;
        info!(
            output = %summary.path.display(),
            processed = counters.processed,
            saved = counters.saved,
            aborted = counters.aborted,
            "process complete"
        );
        Ok(RunSummary {
            processed: counters.processed,
            saved: counters.saved,
            aborted: counters.aborted,
            runs: runs.len(),
            output: summary,
        })
    }

    fn produce(
        &mut self,
        output: &mut dyn Writer,
        counters: &mut Counters,
    ) -> ProcessResult<Vec<RunHeader>> {
        let file = output.name().to_string();
        for processor in &mut self.sequence {
            processor.on_file_open(&file)?;
        }

        let mut run = RunHeader::default();
        run.run_start(self.config.run);
        self.new_run(&mut run)?;

        for n in 0..self.config.event_limit {
            let header = self.event.header_mut();
            header.set_run(self.config.run);
            header.set_number(n as i64 + 1);
            header.set_real_data(false);
            header.stamp();
            for attempt in 0..self.config.max_tries {
                if self.process(n, output, counters)? {
                    break;
                }
                debug!(event = n + 1, attempt, "event aborted");
            }
        }

        for processor in &mut self.sequence {
            processor.on_file_close(&file)?;
        }
        run.run_end();
        info!(%run, "run complete");
        Ok(vec![run])
    }

    fn reconstruct(
        &mut self,
        output: &mut dyn Writer,
        counters: &mut Counters,
    ) -> ProcessResult<Vec<RunHeader>> {
        let mut runs: BTreeMap<RunNumber, RunHeader> = BTreeMap::new();
        let mut current: Option<RunNumber> = None;
        let limit = self.config.event_limit;
        let files = self.config.input_files.clone();

        for path in &files {
            let mut reader = open_reader(path)?;
            if reader.descriptor(RUN_HEADER).is_some() {
                let stored: Vec<RunHeader> = read_all(&mut *reader, &self.registry, RUN_HEADER)?;
                for run in stored {
                    runs.insert(run.number(), run);
                }
            }
            let file = reader.name().to_string();
            info!(file = %file, entries = reader.events(), "opening input");
            for processor in &mut self.sequence {
                processor.on_file_open(&file)?;
            }
            self.event.attach_input(reader);

            let mut entries = self.event.input_events()?;
            if limit > 0 {
                entries = entries.min(limit.saturating_sub(counters.processed));
            }
            for entry in 0..entries {
                self.event.load_into(entry)?;
                let run = self.event.header().run();
                if current != Some(run) {
                    current = Some(run);
                    match runs.get_mut(&run) {
                        Some(header) => {
                            self.new_run(header)?;
                            info!(%header, "new run from input");
                        }
                        None => warn!(run, "run header not found in input"),
                    }
                }
                let n = counters.processed + counters.aborted;
                self.process(n, output, counters)?;
            }
            if limit > 0 && counters.processed >= limit {
                info!(limit, "reached event limit");
            }

            info!(file = %file, "closing input");
            for processor in &mut self.sequence {
                processor.on_file_close(&file)?;
            }
            self.event.detach_input();
        }
        Ok(runs.into_values().collect())
    }

    fn new_run(&mut self, run: &mut RunHeader) -> ProcessResult<()> {
        for processor in &mut self.sequence {
            processor.before_new_run(run)?;
        }
        let number = run.number();
        self.conditions.on_new_run(number, run.parameters_mut())?;
        for processor in &mut self.sequence {
            processor.on_new_run(run)?;
        }
        Ok(())
    }

    /// Run the sequence over the current event. Returns `false` if a
    /// processor aborted it.
    fn process(
        &mut self,
        n: u64,
        output: &mut dyn Writer,
        counters: &mut Counters,
    ) -> ProcessResult<bool> {
        if let Some(every) = self.config.log_frequency {
            if (n + 1) % every == 0 {
                let header = self.event.header();
                info!(n = n + 1, run = header.run(), event = header.number(), "processing");
            }
        }

        self.storage.reset_event_state();
        let context = self.event.header().context();
        for processor in &mut self.sequence {
            let name = processor.name().to_string();
            let mut ctx = ProcessContext::new(&mut self.conditions, &mut self.storage, &name, context);
            match processor.process(&mut self.event, &mut ctx) {
                ProcessOutcome::Ok => {}
                ProcessOutcome::AbortEvent => {
                    debug!(processor = %name, event = context.event, "processor aborted event");
                    counters.aborted += 1;
                    self.event.clear();
                    return Ok(false);
                }
                ProcessOutcome::Fatal(reason) => {
                    return Err(ProcessError::Fatal {
                        processor: name,
                        reason,
                    });
                }
            }
        }

        counters.processed += 1;
        if self.storage.keep_event() {
            self.event.save(output)?;
            counters.saved += 1;
        }
        self.event.clear();
        Ok(true)
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("pass", &self.config.pass_name)
            .field(
                "sequence",
                &self.sequence.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("event", &self.event)
            .finish()
    }
}
