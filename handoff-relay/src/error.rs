use std::error::Error;

use handoff::error::HandoffError;
use thiserror::Error;

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// Error type of the relay binary.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The pipeline failed to shut down cleanly.
    #[error(transparent)]
    Pipeline(#[from] HandoffError),

    #[error("configuration error: {0}")]
    Config(#[source] Box<dyn Error + Send + Sync>),

    #[error("metrics error: {0}")]
    Metrics(#[source] Box<dyn Error + Send + Sync>),
}

impl RelayError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            RelayError::Pipeline(_) => "pipeline error",
            RelayError::Config(_) => "configuration error",
            RelayError::Metrics(_) => "metrics error",
        }
    }

    /// Creates a configuration error from any source.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        RelayError::Config(Box::new(err))
    }

    pub fn metrics<E: Error + Send + Sync + 'static>(err: E) -> Self {
        RelayError::Metrics(Box::new(err))
    }

    /// Renders the error and its chain of causes for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::from("relay failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {self}\n"));

        let mut source = self.source();
        let mut index = 1usize;
        while let Some(err) = source {
            out.push_str(&format!("cause {index}: {err}\n"));
            source = err.source();
            index += 1;
        }

        out
    }
}
