use std::collections::BTreeMap;

use fire_io::ParameterStorage;
use fire_types::{EventContext, IntervalOfValidity, Parameters, RunNumber};
use tracing::warn;

use crate::cache::Parents;
use crate::error::{ConditionsError, ConditionsResult};
use crate::object::ConditionsObject;
use crate::seeds::RandomSeedService;

/// Computes one named conditions object on demand.
///
/// The returned interval must contain the requested run and event kind; the
/// cache rejects anything else as a contract violation.
pub trait ConditionsProvider: Send {
    /// Name of the object this provider publishes.
    fn object_name(&self) -> &str;

    /// Free-form version label of the provided data.
    fn tag_name(&self) -> &str {
        ""
    }

    /// Produce the object valid for `ctx`. Other conditions this one
    /// depends on are requested through `parents`.
    fn get_condition(
        &mut self,
        ctx: &EventContext,
        parents: &mut Parents<'_>,
    ) -> ConditionsResult<(Box<dyn ConditionsObject>, IntervalOfValidity)>;

    /// Take back an object the cache no longer holds.
    fn release(&mut self, object: Box<dyn ConditionsObject>) {
        drop(object);
    }

    fn on_process_start(&mut self) -> ConditionsResult<()> {
        Ok(())
    }

    fn on_process_end(&mut self) -> ConditionsResult<()> {
        Ok(())
    }

    /// Called when a new run begins. `annotations` are the run header
    /// parameters, written out with the run.
    fn on_new_run(
        &mut self,
        _run: RunNumber,
        _annotations: &mut ParameterStorage,
    ) -> ConditionsResult<()> {
        Ok(())
    }
}

/// Everything needed to construct a declared provider.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderSpec {
    pub class_name: String,
    pub object_name: String,
    pub tag_name: String,
    pub parameters: Parameters,
}

impl ProviderSpec {
    /// Build a spec from configuration; the object name comes from the
    /// `obj_name` parameter.
    pub fn new(class_name: &str, tag_name: &str, parameters: Parameters) -> ConditionsResult<Self> {
        let object_name = parameters.get::<String>("obj_name")?;
        Ok(Self {
            class_name: class_name.to_string(),
            object_name,
            tag_name: tag_name.to_string(),
            parameters,
        })
    }
}

type Maker = Box<dyn Fn(&ProviderSpec) -> ConditionsResult<Box<dyn ConditionsProvider>> + Send + Sync>;

/// Provider constructors by class name.
#[derive(Default)]
pub struct ProviderFactory {
    makers: BTreeMap<String, Maker>,
}

impl ProviderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory knowing the providers shipped with fire.
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        factory.register(RandomSeedService::CLASS_NAME, |spec| {
            Ok(Box::new(RandomSeedService::new(spec)?))
        });
        factory
    }

    /// Register a constructor; a repeated class name replaces the earlier one.
    pub fn register<F>(&mut self, class_name: &str, maker: F)
    where
        F: Fn(&ProviderSpec) -> ConditionsResult<Box<dyn ConditionsProvider>> + Send + Sync + 'static,
    {
        if self
            .makers
            .insert(class_name.to_string(), Box::new(maker))
            .is_some()
        {
            warn!(class = class_name, "provider class registered twice");
        }
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.makers.contains_key(class_name)
    }

    /// Registered class names, sorted.
    pub fn classes(&self) -> Vec<&str> {
        self.makers.keys().map(String::as_str).collect()
    }

    pub fn make(&self, spec: &ProviderSpec) -> ConditionsResult<Box<dyn ConditionsProvider>> {
        let maker = self
            .makers
            .get(&spec.class_name)
            .ok_or_else(|| ConditionsError::UnknownProviderClass(spec.class_name.clone()))?;
        maker(spec)
    }
}

impl std::fmt::Debug for ProviderFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderFactory")
            .field("classes", &self.classes())
            .finish()
    }
}
