//! Conditions for fire: calibration-like data that changes slowly across
//! runs, computed by providers and cached for as long as it stays valid.
//!
//! A [`Conditions`] cache maps object names to providers. Each request
//! carries the [`fire_types::EventContext`] of the current event; a cached
//! object is reused while its [`fire_types::IntervalOfValidity`] covers that
//! context and recomputed otherwise.

pub mod cache;
pub mod error;
pub mod object;
pub mod provider;
pub mod seeds;

pub use cache::{Conditions, Parents};
pub use error::{ConditionsError, ConditionsResult};
pub use object::ConditionsObject;
pub use provider::{ConditionsProvider, ProviderFactory, ProviderSpec};
pub use seeds::{RandomSeedService, RandomSeeds, SeedMode, ROOT_SEED_PARAMETER};
