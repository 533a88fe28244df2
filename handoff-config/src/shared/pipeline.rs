use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::Config;
use crate::shared::{DispatchConfig, StageConfig, ValidationError};

/// Topology of a handoff pipeline.
///
/// Items are dispatched into the first stage of `stages`, flow through every stage in order and
/// are finally folded into the result by the `aggregator` stage. The topology is strictly linear.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Transforming stages, in the order items traverse them.
    #[serde(default)]
    pub stages: Vec<StageConfig>,
    /// Terminal stage collecting the results.
    #[serde(default = "StageConfig::aggregator")]
    pub aggregator: StageConfig,
    /// Pacing of the dispatcher feeding the first stage.
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl PipelineConfig {
    /// Validates every stage, the aggregator and the dispatcher settings.
    ///
    /// Stage names must be unique across the pipeline, aggregator included.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut names = HashSet::with_capacity(self.stages.len() + 1);

        for stage in self.stages.iter().chain(std::iter::once(&self.aggregator)) {
            stage.validate()?;

            if !names.insert(stage.name.as_str()) {
                return Err(ValidationError::DuplicateStageName(stage.name.clone()));
            }
        }

        self.dispatch.validate()
    }

    /// Returns the total number of worker tasks, aggregator included.
    pub fn total_workers(&self) -> usize {
        self.stages
            .iter()
            .chain(std::iter::once(&self.aggregator))
            .map(|stage| stage.worker_count as usize)
            .sum()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stages: Vec::new(),
            aggregator: StageConfig::aggregator(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl Config for PipelineConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}
