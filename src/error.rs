//! Error types for the print-dispatch core.
//!
//! Transport steps convert these into a failed [`TransportResult`] at the
//! step boundary; nothing here ever reaches the UI layer as an `Err`.
//!
//! [`TransportResult`]: crate::payload::TransportResult

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrintError {
    /// A transport library, driver or backend is not present at runtime.
    #[error("{0} unavailable")]
    Unavailable(String),

    /// No printer name or serial port could be resolved by any means.
    #[error("no print target: {0}")]
    NoTarget(String),

    #[error("serial: {0}")]
    Serial(String),

    #[error("spooler: {0}")]
    Spooler(String),

    #[error("render: {0}")]
    Render(String),

    #[error("{operation} timed out after {}ms", after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Blocking work noticed its waiter had already given up.
    #[error("{0} cancelled")]
    Cancelled(&'static str),

    #[error("settings: {0}")]
    Settings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PrintError {
    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        Self::Timeout { operation, after }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type PrintResult<T> = Result<T, PrintError>;
