mod config_test;
mod metrics_test;
mod pipeline_test;
mod shutdown_test;
