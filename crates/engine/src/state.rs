//! Engine lifecycle state

use shadow_core::Cause;
use std::fmt;

/// Lifecycle state of an engine
///
/// `Failed` carries the first recorded failure; it is never overwritten or
/// cleared. `Closed` only means resources were torn down without a failure.
#[derive(Debug, Clone)]
pub enum EngineState {
    /// Serving reads
    Open,
    /// Failed with the recorded cause
    Failed(Cause),
    /// Closed without a recorded failure
    Closed,
}

impl EngineState {
    /// True while the engine serves reads
    pub fn is_open(&self) -> bool {
        matches!(self, EngineState::Open)
    }

    /// True once a failure has been recorded
    pub fn is_failed(&self) -> bool {
        matches!(self, EngineState::Failed(_))
    }

    /// Recorded failure, if any
    pub fn failure(&self) -> Option<&Cause> {
        match self {
            EngineState::Failed(cause) => Some(cause),
            EngineState::Open | EngineState::Closed => None,
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Open => f.write_str("open"),
            EngineState::Failed(cause) => write!(f, "failed ({})", cause),
            EngineState::Closed => f.write_str("closed"),
        }
    }
}
