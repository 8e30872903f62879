use std::any::Any;
use std::collections::BTreeMap;

use fire_conditions::Conditions;
use fire_event::{EventStore, RunHeader};
use fire_types::{Classify, EventContext};
use tracing::warn;

use crate::config::ProcessorConfig;
use crate::error::{ProcessError, ProcessResult};
use crate::storage::{StorageControl, StorageHint};

/// How processing one event went.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    Ok,
    /// Skip the rest of this event; the run continues.
    AbortEvent,
    /// Stop the run.
    Fatal(String),
}

impl From<ProcessResult<()>> for ProcessOutcome {
    fn from(result: ProcessResult<()>) -> Self {
        match result {
            Ok(()) => Self::Ok,
            Err(e) if e.is_recoverable() => Self::AbortEvent,
            Err(e) => Self::Fatal(e.to_string()),
        }
    }
}

/// One step of the processing sequence.
///
/// Only `process` is required. The hooks default to doing nothing; an error
/// from a hook ends the run.
pub trait Processor: Send {
    /// Name used in logs and storage hints.
    fn name(&self) -> &str;

    fn process(&mut self, event: &mut EventStore, ctx: &mut ProcessContext<'_>) -> ProcessOutcome;

    /// Called before conditions see the new run; the header may still be
    /// modified.
    fn before_new_run(&mut self, _run: &mut RunHeader) -> ProcessResult<()> {
        Ok(())
    }

    fn on_new_run(&mut self, _run: &RunHeader) -> ProcessResult<()> {
        Ok(())
    }

    fn on_file_open(&mut self, _file: &str) -> ProcessResult<()> {
        Ok(())
    }

    fn on_file_close(&mut self, _file: &str) -> ProcessResult<()> {
        Ok(())
    }

    fn on_process_start(&mut self) -> ProcessResult<()> {
        Ok(())
    }

    fn on_process_end(&mut self) -> ProcessResult<()> {
        Ok(())
    }
}

/// What a processor can reach besides the event.
pub struct ProcessContext<'a> {
    conditions: &'a mut Conditions,
    storage: &'a mut StorageControl,
    processor: &'a str,
    event: EventContext,
}

impl<'a> ProcessContext<'a> {
    pub fn new(
        conditions: &'a mut Conditions,
        storage: &'a mut StorageControl,
        processor: &'a str,
        event: EventContext,
    ) -> Self {
        Self {
            conditions,
            storage,
            processor,
            event,
        }
    }

    /// The condition `name` valid for the current event.
    pub fn condition<T: Any>(&mut self, name: &str) -> ProcessResult<&T> {
        Ok(self.conditions.get::<T>(name, &self.event)?)
    }

    /// Names of the conditions currently cached.
    pub fn conditions(&self) -> Vec<String> {
        self.conditions.cached_names()
    }

    /// Vote on keeping the current event.
    pub fn set_storage_hint(&mut self, hint: StorageHint, purpose: &str) {
        self.storage.add_hint(hint, purpose, self.processor);
    }

    pub fn event_context(&self) -> &EventContext {
        &self.event
    }
}

type Maker = Box<dyn Fn(&ProcessorConfig) -> ProcessResult<Box<dyn Processor>> + Send + Sync>;

/// Processor constructors by class name.
#[derive(Default)]
pub struct ProcessorFactory {
    makers: BTreeMap<String, Maker>,
}

impl ProcessorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor; a repeated class name replaces the earlier one.
    pub fn register<F>(&mut self, class_name: &str, maker: F)
    where
        F: Fn(&ProcessorConfig) -> ProcessResult<Box<dyn Processor>> + Send + Sync + 'static,
    {
        if self
            .makers
            .insert(class_name.to_string(), Box::new(maker))
            .is_some()
        {
            warn!(class = class_name, "processor class registered twice");
        }
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.makers.contains_key(class_name)
    }

    pub fn classes(&self) -> Vec<&str> {
        self.makers.keys().map(String::as_str).collect()
    }

    pub fn make(&self, config: &ProcessorConfig) -> ProcessResult<Box<dyn Processor>> {
        let maker = self
            .makers
            .get(&config.class_name)
            .ok_or_else(|| ProcessError::UnknownProcessor(config.class_name.clone()))?;
        maker(config)
    }
}

impl std::fmt::Debug for ProcessorFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorFactory")
            .field("classes", &self.classes())
            .finish()
    }
}
