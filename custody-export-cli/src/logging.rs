use std::env;
use std::path::PathBuf;

use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Directory for the rolling diagnostic log, overridable with
/// `CUSTODY_EXPORT_LOG_DIR`.
pub fn log_dir() -> PathBuf {
    if let Ok(custom_dir) = env::var("CUSTODY_EXPORT_LOG_DIR") {
        PathBuf::from(custom_dir)
    } else {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("custody-export")
            .join("logs")
    }
}

/// Installs stderr and daily-rolling file output. `RUST_LOG` overrides the
/// default `info` level.
pub fn init_logging() {
    let log_dir = log_dir();
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory {}: {e}", log_dir.display());
    }
    let file_appender = rolling::daily(&log_dir, "custody-export.log");

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_writer(file_appender).with_ansi(false))
        .try_init();
}
