use serde::{Deserialize, Serialize};

use crate::RunNumber;

/// What the conditions layer needs to know about the event being processed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    /// Run the event belongs to.
    pub run: RunNumber,
    /// Event number within the run.
    pub event: i64,
    /// `true` for detector data, `false` for simulation.
    pub real_data: bool,
}

impl EventContext {
    pub fn new(run: RunNumber, event: i64, real_data: bool) -> Self {
        Self {
            run,
            event,
            real_data,
        }
    }

    /// Context for a simulated event.
    pub fn simulation(run: RunNumber, event: i64) -> Self {
        Self::new(run, event, false)
    }

    /// Context for a detector-data event.
    pub fn data(run: RunNumber, event: i64) -> Self {
        Self::new(run, event, true)
    }
}
