//! Metric names and labels emitted by handoff pipelines.

/// Label for the stage name in metrics.
pub const STAGE_LABEL: &str = "stage";

/// Label for the outcome of an item in metrics (`succeeded` or `failed`).
pub const OUTCOME_LABEL: &str = "outcome";

/// Counter for items put on the first queue by the dispatcher.
pub const HANDOFF_ITEMS_DISPATCHED_TOTAL: &str = "handoff_items_dispatched_total";

/// Counter for items handled by stage workers, including failed items they forwarded.
pub const HANDOFF_ITEMS_PROCESSED_TOTAL: &str = "handoff_items_processed_total";

/// Counter for items whose transform failed or panicked.
pub const HANDOFF_ITEMS_FAILED_TOTAL: &str = "handoff_items_failed_total";

/// Counter for items folded into the result by the aggregator.
pub const HANDOFF_ITEMS_AGGREGATED_TOTAL: &str = "handoff_items_aggregated_total";

/// Histogram for the duration of a single transform call.
pub const HANDOFF_TRANSFORM_DURATION_SECONDS: &str = "handoff_transform_duration_seconds";

/// Histogram for the wall-clock lifetime of a stage's worker pool.
pub const HANDOFF_STAGE_DURATION_SECONDS: &str = "handoff_stage_duration_seconds";
