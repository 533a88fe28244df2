use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Identity of a worker task: the stage it belongs to and its 1-based index within the stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerId {
    stage: Arc<str>,
    index: u16,
}

impl WorkerId {
    pub fn new(stage: Arc<str>, index: u16) -> Self {
        Self { stage, index }
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn index(&self) -> u16 {
        self.index
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.stage, self.index)
    }
}

/// Counters reported by a worker when it exits after consuming its shutdown message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    pub worker: WorkerId,
    /// Items taken from the input queue, failed ones included.
    pub items: usize,
    /// Items this worker failed. Items that arrived already failed are not counted.
    pub failures: usize,
    /// Shutdown messages consumed, which is always one for a worker that exited normally.
    pub sentinels: usize,
    /// Items whose handling panicked and that could not be marked as failed either.
    pub dropped: usize,
}

impl WorkerStats {
    pub fn new(worker: WorkerId) -> Self {
        Self {
            worker,
            items: 0,
            failures: 0,
            sentinels: 0,
            dropped: 0,
        }
    }
}

/// Extracts the message of a caught panic.
pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
