use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Pacing applied by the dispatcher between two dispatched items.
///
/// The delay before each item is drawn uniformly from `min_delay_ms..=max_delay_ms`. Both default
/// to zero, which dispatches the whole source back to back.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DispatchConfig {
    #[serde(default)]
    pub min_delay_ms: u64,
    #[serde(default)]
    pub max_delay_ms: u64,
}

impl DispatchConfig {
    /// Creates a dispatch configuration with a random delay in `min_delay_ms..=max_delay_ms`.
    pub fn with_delay(min_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            min_delay_ms,
            max_delay_ms,
        }
    }

    /// Returns whether items are dispatched without any delay.
    pub fn is_immediate(&self) -> bool {
        self.max_delay_ms == 0
    }

    /// Ensures the delay range is not inverted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.min_delay_ms > self.max_delay_ms {
            return Err(ValidationError::InvalidFieldValue {
                field: "dispatch.min_delay_ms".to_string(),
                constraint: "must be less than or equal to `dispatch.max_delay_ms`".to_string(),
            });
        }

        Ok(())
    }
}
