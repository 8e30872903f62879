//! Reproducible random number seeds as a conditions object.

use std::time::{SystemTime, UNIX_EPOCH};

use fire_io::ParameterStorage;
use fire_types::{EventContext, IntervalOfValidity, RunNumber, TypeError};
use tracing::debug;

use crate::cache::Parents;
use crate::error::ConditionsResult;
use crate::object::ConditionsObject;
use crate::provider::{ConditionsProvider, ProviderSpec};

/// Run-header parameter recording the root seed in use.
pub const ROOT_SEED_PARAMETER: &str = "RandomNumberRootSeed";

/// How the root seed is chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeedMode {
    /// The run number is the root seed.
    Run,
    /// A fixed root from configuration.
    External(u64),
    /// Seconds since the epoch when the provider was built.
    Time(u64),
}

/// Seeds derived from one root: each name maps to a fixed offset from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RandomSeeds {
    root: u64,
}

impl RandomSeeds {
    pub fn new(root: u64) -> Self {
        Self { root }
    }

    pub fn root(&self) -> u64 {
        self.root
    }

    /// Seed for the named consumer.
    pub fn seed(&self, name: &str) -> u64 {
        name.bytes()
            .enumerate()
            .fold(self.root, |seed, (i, byte)| {
                seed.wrapping_add(u64::from(byte) << (i % 8))
            })
    }
}

/// Provider publishing [`RandomSeeds`].
#[derive(Debug)]
pub struct RandomSeedService {
    object_name: String,
    tag_name: String,
    mode: SeedMode,
}

impl RandomSeedService {
    pub const CLASS_NAME: &'static str = "RandomNumberSeedService";

    /// Reads `mode` (`run`, `external` or `time`, default `run`) and, for
    /// `external`, the `root` seed.
    pub fn new(spec: &ProviderSpec) -> ConditionsResult<Self> {
        let mode = spec.parameters.get_or("mode", "run".to_string())?;
        let mode = match mode.to_ascii_lowercase().as_str() {
            "run" => SeedMode::Run,
            "external" => SeedMode::External(spec.parameters.get::<u64>("root")?),
            "time" => SeedMode::Time(
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or_default(),
            ),
            other => {
                return Err(TypeError::InvalidParameter {
                    key: "mode".into(),
                    reason: format!("unknown seeding mode `{other}`"),
                }
                .into())
            }
        };
        Ok(Self {
            object_name: spec.object_name.clone(),
            tag_name: spec.tag_name.clone(),
            mode,
        })
    }

    pub fn mode(&self) -> SeedMode {
        self.mode
    }

    fn root_for(&self, run: RunNumber) -> u64 {
        match self.mode {
            SeedMode::Run => run as u64,
            SeedMode::External(root) | SeedMode::Time(root) => root,
        }
    }
}

impl ConditionsProvider for RandomSeedService {
    fn object_name(&self) -> &str {
        &self.object_name
    }

    fn tag_name(&self) -> &str {
        &self.tag_name
    }

    fn get_condition(
        &mut self,
        ctx: &EventContext,
        _parents: &mut Parents<'_>,
    ) -> ConditionsResult<(Box<dyn ConditionsObject>, IntervalOfValidity)> {
        let seeds = RandomSeeds::new(self.root_for(ctx.run));
        let interval = match self.mode {
            SeedMode::Run => IntervalOfValidity::single_run(ctx.run, true, true),
            _ => IntervalOfValidity::all_runs(true, true),
        };
        Ok((Box::new(seeds), interval))
    }

    fn on_new_run(
        &mut self,
        run: RunNumber,
        annotations: &mut ParameterStorage,
    ) -> ConditionsResult<()> {
        let root = self.root_for(run);
        debug!(run, root, "random seed root for run");
        annotations.set(ROOT_SEED_PARAMETER, root as i64);
        Ok(())
    }
}
