use fire_types::{Classify, ErrorKind, IntervalOfValidity, RunNumber, TypeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConditionsError {
    #[error("no provider is available for condition `{0}`")]
    NoProvider(String),

    #[error("condition `{0}` has never been resolved")]
    NeverResolved(String),

    #[error("condition `{name}` is a {actual}, not the requested type")]
    TypeMismatch { name: String, actual: &'static str },

    #[error("provider of `{name}` returned {interval}, which does not cover run {run} ({kind})")]
    ContractViolation {
        name: String,
        interval: IntervalOfValidity,
        run: RunNumber,
        kind: &'static str,
    },

    #[error("unknown provider class `{0}`")]
    UnknownProviderClass(String),

    #[error("conditions request cycle: {0}")]
    Cycle(String),

    #[error("provider of `{name}` failed: {reason}")]
    ProviderFailed { name: String, reason: String },

    #[error("bad provider parameters: {0}")]
    Parameter(#[from] TypeError),
}

impl ConditionsError {
    /// Wrap a provider-specific failure.
    pub fn provider(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProviderFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl Classify for ConditionsError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NoProvider(_) | Self::NeverResolved(_) | Self::TypeMismatch { .. } => {
                ErrorKind::NotFound
            }
            Self::ContractViolation { .. } => ErrorKind::ProviderContractViolation,
            Self::UnknownProviderClass(_)
            | Self::Cycle(_)
            | Self::ProviderFailed { .. }
            | Self::Parameter(_) => ErrorKind::StateError,
        }
    }
}

pub type ConditionsResult<T> = Result<T, ConditionsError>;
