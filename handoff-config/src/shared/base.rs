use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A stage was configured with no workers, so nothing would ever drain its queue.
    #[error("stage `{stage}` must have at least one worker")]
    WorkerCountZero { stage: String },
    /// Stage names identify queues and workers in logs and must not be blank.
    #[error("stage names cannot be empty")]
    EmptyStageName,
    /// Two stages share a name.
    #[error("stage name `{0}` is used more than once")]
    DuplicateStageName(String),
    /// A field holds a value outside of its allowed range.
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
}
