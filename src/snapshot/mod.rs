pub mod procfs;

use std::fmt;

use anyhow::Result;

/// Execution state of a snapshotted thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Actively executing or runnable.
    Running,
    /// Blocked acquiring a lock or on an uninterruptible kernel wait.
    BlockedOnLock,
    /// Idle wait with no deadline.
    Waiting,
    /// Idle wait with a deadline (sleep, timed park).
    TimedWaiting,
    /// Created but not yet started.
    New,
    /// Finished or exiting.
    Terminated,
    /// The host could not classify the state.
    Unknown,
}

/// One stack frame identifier. Line numbers are deliberately absent so that
/// identical call chains collapse to the same signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Module or namespace owning the function. Empty when unavailable.
    pub module: String,
    /// Function name.
    pub function: String,
}

impl Frame {
    pub fn new(module: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.module.is_empty() {
            write!(f, "{}", self.function)
        } else {
            write!(f, "{}::{}", self.module, self.function)
        }
    }
}

/// Point-in-time view of one live thread. Produced fresh each sampling tick
/// and discarded after collapsing.
#[derive(Debug, Clone)]
pub struct ThreadSnapshot {
    pub tid: u64,
    pub name: String,
    pub state: ThreadState,
    /// Call frames ordered leaf-first: index 0 is the currently executing
    /// frame, the last entry is closest to the program root.
    pub frames: Vec<Frame>,
}

/// Host-runtime capability that returns every live thread's execution state
/// and call frames on demand.
///
/// Implementations must not collect lock or monitor ownership detail; the
/// snapshot runs once per tick and has to stay cheap.
pub trait SnapshotProvider: Send + Sync {
    fn snapshot(&self) -> Result<Vec<ThreadSnapshot>>;
}
