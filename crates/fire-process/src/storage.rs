//! Event-level keep/drop voting.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ProcessError, ProcessResult};

/// A processor's opinion on whether the current event should be written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageHint {
    NoOpinion,
    ShouldKeep,
    MustKeep,
    ShouldDrop,
    MustDrop,
}

impl StorageHint {
    /// `Some(true)` for a keep vote, `Some(false)` for a drop vote.
    pub fn vote(&self) -> Option<bool> {
        match self {
            Self::NoOpinion => None,
            Self::ShouldKeep | Self::MustKeep => Some(true),
            Self::ShouldDrop | Self::MustDrop => Some(false),
        }
    }
}

/// Hints counted: those from processors matching `processor` with a
/// purpose matching `purpose`. Empty patterns match anything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListeningRule {
    pub processor: String,
    pub purpose: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageControlConfig {
    /// Decision when votes tie or nothing was counted.
    pub default_keep: bool,
    pub listening_rules: Vec<ListeningRule>,
}

impl Default for StorageControlConfig {
    fn default() -> Self {
        Self {
            default_keep: true,
            listening_rules: Vec::new(),
        }
    }
}

/// Collects hints during an event and decides whether to keep it.
#[derive(Debug)]
pub struct StorageControl {
    default_keep: bool,
    rules: Vec<(Regex, Regex)>,
    hints: Vec<StorageHint>,
}

impl StorageControl {
    pub fn new(config: &StorageControlConfig) -> ProcessResult<Self> {
        let rules = config
            .listening_rules
            .iter()
            .map(|rule| -> ProcessResult<(Regex, Regex)> {
                Ok((full_match(&rule.processor)?, full_match(&rule.purpose)?))
            })
            .collect::<ProcessResult<Vec<_>>>()?;
        Ok(Self {
            default_keep: config.default_keep,
            rules,
            hints: Vec::new(),
        })
    }

    /// Record `hint` if some listening rule matches its source.
    pub fn add_hint(&mut self, hint: StorageHint, purpose: &str, processor: &str) {
        let heard = self
            .rules
            .iter()
            .any(|(proc_rule, purpose_rule)| proc_rule.is_match(processor) && purpose_rule.is_match(purpose));
        if heard {
            self.hints.push(hint);
        }
    }

    pub fn hints(&self) -> &[StorageHint] {
        &self.hints
    }

    /// More keep votes than drop votes keeps the event, more drop votes
    /// drops it, and a tie falls back to the default.
    pub fn keep_event(&self) -> bool {
        let (keep, drop) = self
            .hints
            .iter()
            .filter_map(StorageHint::vote)
            .fold((0usize, 0usize), |(keep, drop), vote| {
                if vote {
                    (keep + 1, drop)
                } else {
                    (keep, drop + 1)
                }
            });
        match keep.cmp(&drop) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.default_keep,
        }
    }

    pub fn reset_event_state(&mut self) {
        self.hints.clear();
    }
}

fn full_match(pattern: &str) -> ProcessResult<Regex> {
    let pattern = if pattern.is_empty() { ".*" } else { pattern };
    Regex::new(&format!("^(?:{pattern})$")).map_err(|e| ProcessError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}
