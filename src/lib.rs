//! Receipt printing core for the florist kiosk.
//!
//! [`PrintOrchestrator`] resolves a printer and escalates through raw text,
//! serial ESC/POS and silent HTML until one transport reports success. The
//! [`commands`] module exposes the same operations as JSON commands for the
//! UI layer.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod cancel;
pub mod commands;
pub mod config;
pub mod error;
pub mod escpos;
pub mod formatters;
pub mod orchestrator;
pub mod payload;
pub mod port_detect;
mod preferences;
pub mod printers;
pub mod receipt_renderer;
pub mod serial;
pub mod settings;
pub mod surface;
pub mod thermal;
pub mod transports;

#[cfg(test)]
mod test_support;

pub use config::PrintConfig;
pub use error::{PrintError, PrintResult};
pub use orchestrator::{DirectTarget, Diagnostics, PreferredSerialPort, PrintOrchestrator};
pub use payload::{AttemptRecord, PrintMode, PrintPayload, ReceiptItem, TransportResult};
pub use settings::{JsonFileSettings, MemorySettings, PrintModes, PrintModesUpdate, SettingsStore};

const DEFAULT_LOG_FILTER: &str = "info,florist_pos_print=debug";

/// Console plus daily rolling file logging under `log_dir`.
///
/// The returned guard flushes the file writer on drop; the host keeps it
/// for the lifetime of the process. When a global subscriber is already
/// installed the existing one stays in place.
pub fn init_logging(log_dir: impl AsRef<Path>) -> PrintResult<WorkerGuard> {
    let log_dir = log_dir.as_ref();
    std::fs::create_dir_all(log_dir)?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let file_appender = tracing_appender::rolling::daily(log_dir, "print");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);

    match tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
    {
        Ok(()) => tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            dir = %log_dir.display(),
            "Print logging initialised"
        ),
        Err(e) => tracing::debug!(error = %e, "Logging already initialised"),
    }
    Ok(guard)
}
