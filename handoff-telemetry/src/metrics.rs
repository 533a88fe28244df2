use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::Mutex;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::trace;

/// Port the metrics endpoint listens on when none is configured.
pub const DEFAULT_METRICS_PORT: u16 = 9000;

/// Interval between two upkeep runs of a cached handle.
const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

// Installing a recorder is global and fails the second time, while tests call
// `init_metrics_handle` repeatedly, so the first handle is cached.
static PROMETHEUS_HANDLE: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

/// Installs the Prometheus recorder once and returns a handle for rendering metrics.
///
/// Subsequent calls return clones of the first handle. Must be called within a tokio runtime,
/// since it spawns the recorder's periodic upkeep.
pub fn init_metrics_handle() -> Result<PrometheusHandle, BuildError> {
    let mut prometheus_handle = PROMETHEUS_HANDLE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(handle) = &*prometheus_handle {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    *prometheus_handle = Some(handle.clone());

    let upkeep_handle = handle.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(UPKEEP_INTERVAL).await;
            trace!("running metrics upkeep");
            upkeep_handle.run_upkeep();
        }
    });

    Ok(handle)
}

/// Installs the Prometheus recorder and serves it on `[::]:{port}/metrics`.
///
/// Every metric carries the `app` label set to `app_name`.
pub fn init_metrics(app_name: &str, port: u16) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port))
        .add_global_label("app", app_name)
        .install()
}
