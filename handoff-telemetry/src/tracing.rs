use std::sync::Once;

use handoff_config::Environment;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_log::LogTracer;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer};

/// Directory, relative to the working directory, production log files are written to.
const LOGS_DIR: &str = "logs";

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

static INIT_TEST_TRACING: Once = Once::new();

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to determine runtime environment: {0}")]
    Environment(#[from] std::io::Error),

    #[error("failed to redirect `log` records to tracing: {0}")]
    LogTracer(#[from] tracing_log::log::SetLoggerError),

    #[error("failed to install the tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

/// Keeps the background log writer alive. Dropping it flushes buffered log lines.
#[must_use = "dropping the flusher stops writing logs to files"]
pub struct LogFlusher {
    _guard: Option<WorkerGuard>,
}

/// Installs the global tracing subscriber for `app_name`.
///
/// In `dev` logs are pretty printed to stdout. In `prod` they are written as JSON to stdout and
/// to a daily rolling file `logs/{app_name}.log.YYYY-MM-DD`. The filter comes from `RUST_LOG`,
/// defaulting to `info`.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    let environment = Environment::load()?;
    LogTracer::init()?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (layers, guard) = match environment {
        Environment::Dev => {
            let stdout = tracing_subscriber::fmt::layer()
                .with_timer(ChronoUtc::new(TIME_FORMAT.to_string()))
                .pretty()
                .boxed();

            (vec![stdout], None)
        }
        Environment::Prod => {
            let stdout = tracing_subscriber::fmt::layer()
                .with_timer(ChronoUtc::new(TIME_FORMAT.to_string()))
                .json()
                .flatten_event(true)
                .boxed();

            let appender =
                RollingFileAppender::new(Rotation::DAILY, LOGS_DIR, format!("{app_name}.log"));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_timer(ChronoUtc::new(TIME_FORMAT.to_string()))
                .json()
                .flatten_event(true)
                .with_writer(writer)
                .boxed();

            (vec![stdout, file], Some(guard))
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init()?;

    Ok(LogFlusher { _guard: guard })
}

/// Installs a subscriber writing through the test harness, once per test binary.
///
/// Tests are silent unless `ENABLE_TRACING` is set, in which case `RUST_LOG` applies as usual.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var("ENABLE_TRACING").is_err() {
            return;
        }

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        // Another subscriber may already be installed by the test itself, which is fine.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
