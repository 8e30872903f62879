use std::path::{Path, PathBuf};

use fire_event::DropKeepRule;
use fire_io::WriterConfig;
use fire_types::{Parameters, RunNumber};
use serde::{Deserialize, Serialize};

use crate::error::{ProcessError, ProcessResult};
use crate::storage::StorageControlConfig;

/// Where and how events are written.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// The extension picks the backend (`.fcol` or `.ftree`).
    pub path: PathBuf,
    pub writer: WriterConfig,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("output.fcol"),
            writer: WriterConfig::default(),
        }
    }
}

/// A conditions provider to declare.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub class_name: String,
    #[serde(default)]
    pub tag_name: String,
    /// Must contain `obj_name`.
    #[serde(default)]
    pub parameters: Parameters,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionsConfig {
    pub providers: Vec<ProviderConfig>,
}

/// One entry of the processor sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub class_name: String,
    pub name: String,
    #[serde(default)]
    pub parameters: Parameters,
}

/// Configuration of one processing run.
///
/// ```toml
/// pass_name = "reco"
/// event_limit = 100
/// input_files = ["sim.fcol"]
///
/// [output]
/// path = "reco.fcol"
///
/// [[drop_keep_rules]]
/// regex = "sim/.*"
/// keep = true
///
/// [[sequence]]
/// class_name = "Clustering"
/// name = "clusters"
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Pass name of every object added during this run.
    pub pass_name: String,
    /// Events to produce, or the most to read from inputs (0 reads all).
    pub event_limit: u64,
    /// Run number in production mode.
    pub run: RunNumber,
    /// Attempts per event in production mode.
    pub max_tries: u32,
    /// Log progress every this many events.
    pub log_frequency: Option<u64>,
    pub input_files: Vec<PathBuf>,
    pub output: OutputConfig,
    pub drop_keep_rules: Vec<DropKeepRule>,
    pub storage: StorageControlConfig,
    pub conditions: ConditionsConfig,
    pub sequence: Vec<ProcessorConfig>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            pass_name: "fire".to_string(),
            event_limit: 0,
            run: 1,
            max_tries: 1,
            log_frequency: None,
            input_files: Vec::new(),
            output: OutputConfig::default(),
            drop_keep_rules: Vec::new(),
            storage: StorageControlConfig::default(),
            conditions: ConditionsConfig::default(),
            sequence: Vec::new(),
        }
    }
}

impl ProcessConfig {
    pub fn from_toml(text: &str) -> ProcessResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> ProcessResult<Self> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> ProcessResult<()> {
        if self.pass_name.is_empty() || self.pass_name.contains('/') {
            return Err(ProcessError::config(format!(
                "invalid pass name `{}`",
                self.pass_name
            )));
        }
        if self.max_tries == 0 {
            return Err(ProcessError::config("max_tries must be at least 1"));
        }
        if self.log_frequency == Some(0) {
            return Err(ProcessError::config("log_frequency must be positive"));
        }
        self.output.writer.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.input_files.is_empty()
    }
}
