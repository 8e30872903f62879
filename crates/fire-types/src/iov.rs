use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::EventContext;
use crate::error::TypeError;
use crate::RunNumber;

/// The run range and event kinds over which a conditions object stays valid.
///
/// Both ends of the range are inclusive. `None` leaves that end open, so
/// `IntervalOfValidity::all_runs(true, true)` covers every event. The default
/// interval covers nothing: it applies neither to data nor to simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntervalOfValidity {
    first_run: Option<RunNumber>,
    last_run: Option<RunNumber>,
    valid_for_data: bool,
    valid_for_mc: bool,
}

impl IntervalOfValidity {
    /// Create an interval over `first..=last`.
    ///
    /// Fails if both ends are bounded and `first > last`.
    pub fn new(
        first_run: Option<RunNumber>,
        last_run: Option<RunNumber>,
        valid_for_data: bool,
        valid_for_mc: bool,
    ) -> Result<Self, TypeError> {
        if let (Some(first), Some(last)) = (first_run, last_run) {
            if first > last {
                return Err(TypeError::InvalidInterval { first, last });
            }
        }
        Ok(Self {
            first_run,
            last_run,
            valid_for_data,
            valid_for_mc,
        })
    }

    /// Interval over every run.
    pub fn all_runs(valid_for_data: bool, valid_for_mc: bool) -> Self {
        Self {
            first_run: None,
            last_run: None,
            valid_for_data,
            valid_for_mc,
        }
    }

    /// Interval covering exactly one run.
    pub fn single_run(run: RunNumber, valid_for_data: bool, valid_for_mc: bool) -> Self {
        Self {
            first_run: Some(run),
            last_run: Some(run),
            valid_for_data,
            valid_for_mc,
        }
    }

    /// Interval starting at `first` with no upper bound.
    pub fn from_run(first: RunNumber, valid_for_data: bool, valid_for_mc: bool) -> Self {
        Self {
            first_run: Some(first),
            last_run: None,
            valid_for_data,
            valid_for_mc,
        }
    }

    pub fn first_run(&self) -> Option<RunNumber> {
        self.first_run
    }

    pub fn last_run(&self) -> Option<RunNumber> {
        self.last_run
    }

    pub fn valid_for_data(&self) -> bool {
        self.valid_for_data
    }

    pub fn valid_for_mc(&self) -> bool {
        self.valid_for_mc
    }

    /// Returns `true` if `run` is inside the range, ignoring event kind.
    pub fn covers_run(&self, run: RunNumber) -> bool {
        self.first_run.map_or(true, |first| first <= run)
            && self.last_run.map_or(true, |last| run <= last)
    }

    /// Returns `true` if the interval applies to `run` for the given kind of event.
    pub fn contains(&self, run: RunNumber, real_data: bool) -> bool {
        let kind_matches = if real_data {
            self.valid_for_data
        } else {
            self.valid_for_mc
        };
        kind_matches && self.covers_run(run)
    }

    /// Returns `true` if the interval applies to the event described by `ctx`.
    pub fn valid_for(&self, ctx: &EventContext) -> bool {
        self.contains(ctx.run, ctx.real_data)
    }

    /// Returns `true` if the run ranges intersect and both intervals apply
    /// to data, or both apply to simulation.
    pub fn overlaps(&self, other: &Self) -> bool {
        let shares_kind = (self.valid_for_data && other.valid_for_data)
            || (self.valid_for_mc && other.valid_for_mc);
        if !shares_kind {
            return false;
        }
        let starts_before_other_ends = match (self.first_run, other.last_run) {
            (Some(first), Some(last)) => first <= last,
            _ => true,
        };
        let other_starts_before_end = match (other.first_run, self.last_run) {
            (Some(first), Some(last)) => first <= last,
            _ => true,
        };
        starts_before_other_ends && other_starts_before_end
    }
}

impl fmt::Display for IntervalOfValidity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IOV(")?;
        match self.first_run {
            Some(first) => write!(f, "{first}")?,
            None => write!(f, "-infty")?,
        }
        write!(f, "->")?;
        match self.last_run {
            Some(last) => write!(f, "{last}")?,
            None => write!(f, "infty")?,
        }
        if self.valid_for_data {
            write!(f, ", DATA")?;
        }
        if self.valid_for_mc {
            write!(f, ", MC")?;
        }
        write!(f, ")")
    }
}
