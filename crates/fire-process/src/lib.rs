//! The fire processing driver.
//!
//! A [`Process`] owns a sequence of [`Processor`]s, the conditions cache,
//! the event store and the output file. Each event runs through the whole
//! sequence; [`StorageControl`] then decides whether it is written.

pub mod config;
pub mod error;
pub mod process;
pub mod processor;
pub mod storage;

pub use config::{ConditionsConfig, OutputConfig, ProcessConfig, ProcessorConfig, ProviderConfig};
pub use error::{ProcessError, ProcessResult};
pub use process::{Process, RunSummary};
pub use processor::{ProcessContext, ProcessOutcome, Processor, ProcessorFactory};
pub use storage::{ListeningRule, StorageControl, StorageControlConfig, StorageHint};
