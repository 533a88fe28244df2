use std::time::Duration;

use handoff_config::shared::{DispatchConfig, PipelineConfig, StageConfig, ValidationError};
use handoff_config::{Config, load_config};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, RelayResult};

/// Name of the stage copying files between buckets.
pub const S3_UPLOADER_STAGE: &str = "s3-uploader";

/// Name of the stage uploading file metadata to the API.
pub const API_UPLOADER_STAGE: &str = "api-uploader";

/// Name of the aggregating stage verifying every file.
pub const VERIFIER_STAGE: &str = "verifier";

/// Configuration of the relay binary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RelayConfig {
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Bucket every file is copied into.
    #[serde(default = "default_destination_bucket")]
    pub destination_bucket: String,
    /// Serves Prometheus metrics when present.
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
}

impl RelayConfig {
    /// Checks the pipeline topology and the simulated latencies.
    ///
    /// Both relay stages must be configured, since their transforms are looked up by name.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.pipeline.validate()?;

        for stage in [S3_UPLOADER_STAGE, API_UPLOADER_STAGE] {
            if !self.pipeline.stages.iter().any(|config| config.name == stage) {
                return Err(ValidationError::InvalidFieldValue {
                    field: "pipeline.stages".to_string(),
                    constraint: format!("must contain a stage named `{stage}`"),
                });
            }
        }

        if self.destination_bucket.trim().is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "destination_bucket".to_string(),
                constraint: "must not be empty".to_string(),
            });
        }

        self.simulation.s3_copy.validate("simulation.s3_copy")?;
        self.simulation.api_upload.validate("simulation.api_upload")
    }
}

impl Default for RelayConfig {
    /// Three S3 uploaders, two API uploaders and a single verifier, without simulated latency.
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig {
                stages: vec![
                    StageConfig::new(S3_UPLOADER_STAGE, 3),
                    StageConfig::new(API_UPLOADER_STAGE, 2),
                ],
                aggregator: StageConfig::new(VERIFIER_STAGE, 1),
                dispatch: DispatchConfig::default(),
            },
            simulation: SimulationConfig::default(),
            destination_bucket: default_destination_bucket(),
            metrics: None,
        }
    }
}

impl Config for RelayConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

/// Simulated latency of the external calls made by the relay's transforms.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SimulationConfig {
    #[serde(default)]
    pub s3_copy: LatencyRange,
    #[serde(default)]
    pub api_upload: LatencyRange,
}

/// Latency drawn uniformly from `min_ms..=max_ms` milliseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LatencyRange {
    #[serde(default)]
    pub min_ms: u64,
    #[serde(default)]
    pub max_ms: u64,
}

impl LatencyRange {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Draws a latency, `None` when the range is zero.
    pub fn sample(&self) -> Option<Duration> {
        if self.max_ms == 0 {
            return None;
        }

        let millis = rand::thread_rng().gen_range(self.min_ms..=self.max_ms);
        Some(Duration::from_millis(millis))
    }

    fn validate(&self, field: &str) -> Result<(), ValidationError> {
        if self.min_ms > self.max_ms {
            return Err(ValidationError::InvalidFieldValue {
                field: format!("{field}.min_ms"),
                constraint: format!("must be less than or equal to `{field}.max_ms`"),
            });
        }

        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_destination_bucket() -> String {
    "dest-bucket-proj".to_string()
}

fn default_metrics_port() -> u16 {
    handoff_telemetry::metrics::DEFAULT_METRICS_PORT
}

/// Loads and validates the relay configuration.
pub fn load_relay_config() -> RelayResult<RelayConfig> {
    let config = load_config::<RelayConfig>().map_err(RelayError::config)?;
    config.validate().map_err(RelayError::config)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_topology_is_valid() {
        assert!(RelayConfig::default().validate().is_ok());
    }

    #[test]
    fn both_relay_stages_are_required() {
        let mut config = RelayConfig::default();
        config.pipeline.stages.pop();

        assert_eq!(
            config.validate().unwrap_err(),
            ValidationError::InvalidFieldValue {
                field: "pipeline.stages".to_string(),
                constraint: "must contain a stage named `api-uploader`".to_string(),
            }
        );
    }

    #[test]
    fn inverted_latency_is_rejected() {
        let mut config = RelayConfig::default();
        config.simulation.api_upload = LatencyRange::new(2000, 1000);

        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidFieldValue { field, .. }) if field == "simulation.api_upload.min_ms"
        ));
    }

    #[test]
    fn latency_samples_stay_in_range() {
        let range = LatencyRange::new(5, 7);

        for _ in 0..50 {
            let latency = range.sample().unwrap();
            assert!((5..=7).contains(&(latency.as_millis() as u64)));
        }
        assert_eq!(LatencyRange::default().sample(), None);
    }
}
