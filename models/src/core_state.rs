use serde::{Deserialize, Serialize};

/// Lifecycle of the supervised core.
///
/// ```text
/// Stopped -> Starting -> Running -> Stopping -> Stopped
///                           |
///                           v
///                        Crashed -> Starting (retry)
/// ```
///
/// `Stopped -> Running` is allowed for orphan adoption, and `Stopping -> Running`
/// for a stop that could not terminate the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoreState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Crashed,
}

impl CoreState {
    pub fn is_running(&self) -> bool {
        matches!(self, CoreState::Running)
    }

    /// States from which `start()` may begin a new attempt.
    pub fn can_start(&self) -> bool {
        matches!(self, CoreState::Stopped | CoreState::Crashed)
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    ///
    /// Staying in the same state is always legal.
    pub fn can_transition_to(&self, next: CoreState) -> bool {
        use CoreState::*;

        if *self == next {
            return true;
        }

        matches!(
            (self, next),
            (Stopped, Starting)
                | (Stopped, Running)
                | (Starting, Running)
                | (Starting, Crashed)
                | (Starting, Stopping)
                | (Starting, Stopped)
                | (Running, Stopping)
                | (Running, Crashed)
                | (Stopping, Stopped)
                | (Stopping, Running)
                | (Crashed, Starting)
                | (Crashed, Stopping)
                | (Crashed, Stopped)
        )
    }
}
