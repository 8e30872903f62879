use std::any::Any;
use std::collections::{BTreeMap, HashMap};

use fire_io::ParameterStorage;
use fire_types::{EventContext, IntervalOfValidity, Parameters, RunNumber};
use tracing::{debug, warn};

use crate::error::{ConditionsError, ConditionsResult};
use crate::object::ConditionsObject;
use crate::provider::{ConditionsProvider, ProviderFactory, ProviderSpec};

struct CacheEntry {
    object: Box<dyn ConditionsObject>,
    interval: IntervalOfValidity,
}

enum Slot {
    /// Declared from configuration, built on first request.
    Declared(ProviderSpec),
    Ready(Box<dyn ConditionsProvider>),
}

/// Cache of conditions objects, each valid for an interval of runs.
///
/// A cached object is returned as long as its interval covers the event;
/// otherwise its provider is asked again and the old object is released
/// back to it.
pub struct Conditions {
    factory: ProviderFactory,
    providers: BTreeMap<String, Slot>,
    cache: HashMap<String, CacheEntry>,
    /// Conditions being computed right now, outermost first.
    in_flight: Vec<String>,
    started: bool,
}

impl Conditions {
    pub fn new(factory: ProviderFactory) -> Self {
        Self {
            factory,
            providers: BTreeMap::new(),
            cache: HashMap::new(),
            in_flight: Vec::new(),
            started: false,
        }
    }

    pub fn factory(&self) -> &ProviderFactory {
        &self.factory
    }

    /// Declare a provider of class `class_name`. It is constructed through
    /// the factory when its object is first requested.
    pub fn declare_provider(
        &mut self,
        class_name: &str,
        tag_name: &str,
        parameters: Parameters,
    ) -> ConditionsResult<()> {
        if !self.factory.contains(class_name) {
            return Err(ConditionsError::UnknownProviderClass(class_name.to_string()));
        }
        let spec = ProviderSpec::new(class_name, tag_name, parameters)?;
        debug!(condition = %spec.object_name, class = class_name, tag = tag_name, "declared provider");
        let name = spec.object_name.clone();
        self.install(name, Slot::Declared(spec));
        Ok(())
    }

    /// Register an already constructed provider.
    pub fn register_provider(
        &mut self,
        mut provider: Box<dyn ConditionsProvider>,
    ) -> ConditionsResult<()> {
        if self.started {
            provider.on_process_start()?;
        }
        let name = provider.object_name().to_string();
        self.install(name, Slot::Ready(provider));
        Ok(())
    }

    fn install(&mut self, name: String, slot: Slot) {
        if let Some(previous) = self.providers.insert(name.clone(), slot) {
            warn!(condition = %name, "replacing provider of an already provided condition");
            if let Some(entry) = self.cache.remove(&name) {
                if let Slot::Ready(mut provider) = previous {
                    provider.release(entry.object);
                }
            }
        }
    }

    /// Whether any provider publishes `name`.
    pub fn provides(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Names of all provided conditions, sorted.
    pub fn provided_names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// The object `name` valid for `ctx`, as a `T`.
    pub fn get<T: Any>(&mut self, name: &str, ctx: &EventContext) -> ConditionsResult<&T> {
        let object = self.get_object(name, ctx)?;
        object
            .downcast_ref::<T>()
            .ok_or_else(|| ConditionsError::TypeMismatch {
                name: name.to_string(),
                actual: object.type_name(),
            })
    }

    /// The object `name` valid for `ctx`.
    pub fn get_object(
        &mut self,
        name: &str,
        ctx: &EventContext,
    ) -> ConditionsResult<&dyn ConditionsObject> {
        let fresh = self
            .cache
            .get(name)
            .is_some_and(|entry| entry.interval.valid_for(ctx));
        if !fresh {
            self.refresh(name, ctx)?;
        }
        self.cache
            .get(name)
            .map(|entry| &*entry.object)
            .ok_or_else(|| ConditionsError::NeverResolved(name.to_string()))
    }

    fn refresh(&mut self, name: &str, ctx: &EventContext) -> ConditionsResult<()> {
        if self.in_flight.iter().any(|n| n == name) {
            let mut chain = self.in_flight.join(" -> ");
            chain.push_str(" -> ");
            chain.push_str(name);
            return Err(ConditionsError::Cycle(chain));
        }
        let mut provider = self.take_provider(name)?;
        if let Some(stale) = self.cache.remove(name) {
            provider.release(stale.object);
        }

        debug!(condition = name, run = ctx.run, event = ctx.event, "requesting condition");
        self.in_flight.push(name.to_string());
        let result = provider.get_condition(
            ctx,
            &mut Parents {
                conditions: self,
                ctx: *ctx,
            },
        );
        self.in_flight.pop();

        let outcome = result.and_then(|(object, interval)| {
            if interval.valid_for(ctx) {
                Ok(CacheEntry { object, interval })
            } else {
                Err(ConditionsError::ContractViolation {
                    name: name.to_string(),
                    interval,
                    run: ctx.run,
                    kind: if ctx.real_data { "data" } else { "simulation" },
                })
            }
        });
        self.providers
            .insert(name.to_string(), Slot::Ready(provider));
        let entry = outcome?;
        debug!(condition = name, interval = %entry.interval, "cached condition");
        self.cache.insert(name.to_string(), entry);
        Ok(())
    }

    /// Remove the provider of `name` from its slot, constructing it first if
    /// it was only declared. The caller puts it back.
    fn take_provider(&mut self, name: &str) -> ConditionsResult<Box<dyn ConditionsProvider>> {
        match self.providers.remove(name) {
            None => Err(ConditionsError::NoProvider(name.to_string())),
            Some(Slot::Ready(provider)) => Ok(provider),
            Some(Slot::Declared(spec)) => match self.construct(&spec) {
                Ok(provider) => Ok(provider),
                Err(e) => {
                    self.providers.insert(name.to_string(), Slot::Declared(spec));
                    Err(e)
                }
            },
        }
    }

    fn construct(&self, spec: &ProviderSpec) -> ConditionsResult<Box<dyn ConditionsProvider>> {
        let mut provider = self.factory.make(spec)?;
        debug!(condition = %spec.object_name, class = %spec.class_name, "constructed provider");
        if self.started {
            provider.on_process_start()?;
        }
        Ok(provider)
    }

    /// Interval of the cached object `name`.
    pub fn get_condition_iov(&self, name: &str) -> ConditionsResult<IntervalOfValidity> {
        self.cache
            .get(name)
            .map(|entry| entry.interval)
            .ok_or_else(|| ConditionsError::NeverResolved(name.to_string()))
    }

    /// Names currently cached, sorted.
    pub fn cached_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cache.keys().cloned().collect();
        names.sort();
        names
    }

    /// Release every cached object to its provider.
    pub fn clear_cache(&mut self) {
        for (name, entry) in self.cache.drain() {
            match self.providers.get_mut(&name) {
                Some(Slot::Ready(provider)) => provider.release(entry.object),
                _ => drop(entry.object),
            }
        }
    }

    pub fn on_process_start(&mut self) -> ConditionsResult<()> {
        self.started = true;
        for provider in self.ready_providers() {
            provider.on_process_start()?;
        }
        Ok(())
    }

    pub fn on_process_end(&mut self) -> ConditionsResult<()> {
        for provider in self.ready_providers() {
            provider.on_process_end()?;
        }
        self.clear_cache();
        self.started = false;
        Ok(())
    }

    /// Tell constructed providers about a new run; they may annotate the
    /// run header through `annotations`.
    pub fn on_new_run(
        &mut self,
        run: RunNumber,
        annotations: &mut ParameterStorage,
    ) -> ConditionsResult<()> {
        for provider in self.ready_providers() {
            provider.on_new_run(run, annotations)?;
        }
        Ok(())
    }

    fn ready_providers(&mut self) -> impl Iterator<Item = &mut Box<dyn ConditionsProvider>> {
        self.providers.values_mut().filter_map(|slot| match slot {
            Slot::Ready(provider) => Some(provider),
            Slot::Declared(_) => None,
        })
    }
}

impl Default for Conditions {
    fn default() -> Self {
        Self::new(ProviderFactory::with_builtins())
    }
}

/// Access to other conditions from inside a provider.
pub struct Parents<'a> {
    conditions: &'a mut Conditions,
    ctx: EventContext,
}

impl Parents<'_> {
    /// The condition `name` for the event being resolved.
    pub fn get<T: Any>(&mut self, name: &str) -> ConditionsResult<&T> {
        self.conditions.get::<T>(name, &self.ctx)
    }

    /// Interval of a condition already resolved.
    pub fn interval(&self, name: &str) -> ConditionsResult<IntervalOfValidity> {
        self.conditions.get_condition_iov(name)
    }

    pub fn context(&self) -> &EventContext {
        &self.ctx
    }
}
