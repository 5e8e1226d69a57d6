use std::io;
use std::sync::Once;

use config::Environment;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt, registry};

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "info";

/// Setting this env variable to `1` turns on log output in tests.
const ENABLE_TRACING_ENV_NAME: &str = "ENABLE_TRACING";

static INIT_TEST_TRACING: Once = Once::new();

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to load the environment: {0}")]
    Environment(#[from] io::Error),

    #[error("failed to bridge log records into tracing: {0}")]
    LogTracer(#[from] tracing_log::log::SetLoggerError),

    #[error("failed to install the tracing subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Keeps buffered log lines flowing to stdout until dropped.
///
/// Hold it for the whole life of the process, dropping it flushes what is left.
#[must_use]
pub struct LogFlusher {
    _guard: WorkerGuard,
}

/// Installs the global subscriber for `app_name`.
///
/// Production writes JSON lines, development writes human-readable output. Both go through a
/// non-blocking stdout writer and honour `RUST_LOG`.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    let environment = Environment::load()?;

    LogTracer::init()?;

    let (writer, guard) = tracing_appender::non_blocking(io::stdout());
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    if environment.is_prod() {
        let layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(writer);
        registry().with(filter).with(layer).try_init()?;
    } else {
        let layer = fmt::layer().pretty().with_writer(writer);
        registry().with(filter).with(layer).try_init()?;
    }

    tracing::info!(app_name, environment = %environment, "tracing initialized");

    Ok(LogFlusher { _guard: guard })
}

/// Installs a test writer subscriber once per process when `ENABLE_TRACING=1`.
pub fn init_test_tracing() {
    if std::env::var(ENABLE_TRACING_ENV_NAME).as_deref() != Ok("1") {
        return;
    }

    INIT_TEST_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
        let _ = registry()
            .with(filter)
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}
