use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Configuration parameters handed to processors and conditions providers.
///
/// A thin wrapper around a TOML table: values are deserialized on access, so
/// each consumer decides which Rust type a key should have.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(toml::Table);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a required value.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, TypeError> {
        let value = self
            .0
            .get(key)
            .ok_or_else(|| TypeError::MissingParameter(key.to_string()))?;
        value
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| TypeError::InvalidParameter {
                key: key.to_string(),
                reason: e.message().to_string(),
            })
    }

    /// Fetch a value, falling back to `default` when the key is absent.
    ///
    /// A present key with the wrong type is still an error.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, TypeError> {
        if self.contains(key) {
            self.get(key)
        } else {
            Ok(default)
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Insert a value, replacing any previous value under `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<toml::Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style [`Parameters::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<toml::Table> for Parameters {
    fn from(table: toml::Table) -> Self {
        Self(table)
    }
}
