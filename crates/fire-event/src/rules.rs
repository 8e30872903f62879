use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{EventError, EventResult};

/// One drop/keep rule as configured.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropKeepRule {
    /// Pattern matched against the whole `pass/name` of an object.
    pub regex: String,
    pub keep: bool,
}

impl DropKeepRule {
    pub fn keep(regex: impl Into<String>) -> Self {
        Self {
            regex: regex.into(),
            keep: true,
        }
    }

    pub fn drop(regex: impl Into<String>) -> Self {
        Self {
            regex: regex.into(),
            keep: false,
        }
    }
}

/// Compiled drop/keep rules. Matching is case-insensitive and must cover
/// the whole name; the last matching rule decides.
#[derive(Clone, Debug, Default)]
pub struct DropKeepRules {
    rules: Vec<(Regex, bool)>,
}

impl DropKeepRules {
    pub fn new(rules: &[DropKeepRule]) -> EventResult<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                RegexBuilder::new(&format!("^(?:{})$", rule.regex))
                    .case_insensitive(true)
                    .build()
                    .map(|re| (re, rule.keep))
                    .map_err(|e| EventError::InvalidPattern {
                        pattern: rule.regex.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<EventResult<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Whether `full_name` is written out; `default` applies when no rule
    /// matches.
    pub fn keep(&self, full_name: &str, default: bool) -> bool {
        self.rules
            .iter()
            .rev()
            .find(|(re, _)| re.is_match(full_name))
            .map_or(default, |(_, keep)| *keep)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
