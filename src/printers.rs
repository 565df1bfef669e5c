//! OS printer queues: enumeration, raw spooling and thermal-printer detection.
//!
//! [`SystemPrinters`] talks to the platform spooler through the `printers`
//! crate (winspool on Windows, CUPS elsewhere). Everything above it goes
//! through the [`PrinterBackend`] trait.

use std::sync::Arc;
use std::time::Duration;

use ::printers::common::base::job::PrinterJobOptions;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cancel::{spawn_cancellable, CancelFlag};
use crate::config::PrintConfig;
use crate::error::{PrintError, PrintResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterInfo {
    pub name: String,
    pub is_default: bool,
}

impl PrinterInfo {
    pub fn new(name: impl Into<String>, is_default: bool) -> Self {
        Self {
            name: name.into(),
            is_default,
        }
    }
}

#[async_trait]
pub trait PrinterBackend: Send + Sync {
    async fn list_printers(&self) -> PrintResult<Vec<PrinterInfo>>;

    /// Hand bytes to the queue untouched (RAW datatype).
    async fn print_raw(&self, printer: &str, data: Vec<u8>, doc_name: &str) -> PrintResult<()>;
}

/// Name of the queue flagged as the OS default.
pub fn default_printer(printers: &[PrinterInfo]) -> Option<String> {
    printers
        .iter()
        .find(|p| p.is_default)
        .map(|p| p.name.clone())
}

// ---------------------------------------------------------------------------
// OS implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPrinters;

fn not_found(name: &str) -> PrintError {
    PrintError::Spooler(format!("printer '{name}' not found"))
}

async fn blocking<T, F>(f: F) -> PrintResult<T>
where
    T: Send + 'static,
    F: FnOnce(CancelFlag) -> PrintResult<T> + Send + 'static,
{
    spawn_cancellable(f)
        .await
        .map_err(|e| PrintError::Spooler(format!("spooler task failed: {e}")))?
}

#[async_trait]
impl PrinterBackend for SystemPrinters {
    async fn list_printers(&self) -> PrintResult<Vec<PrinterInfo>> {
        blocking(|_cancel| {
            let default_name = ::printers::get_default_printer().map(|p| p.name);
            Ok(::printers::get_printers()
                .into_iter()
                .map(|p| {
                    let is_default = default_name.as_deref() == Some(p.name.as_str());
                    PrinterInfo::new(p.name, is_default)
                })
                .collect())
        })
        .await
    }

    /// Queue lookup can stall on a busy spooler; a caller that gave up in
    /// the meantime gets no job submitted.
    async fn print_raw(&self, printer: &str, data: Vec<u8>, doc_name: &str) -> PrintResult<()> {
        let name = printer.to_string();
        let len = data.len();
        blocking(move |cancel| {
            let target = ::printers::get_printer_by_name(&name).ok_or_else(|| not_found(&name))?;
            cancel.check("raw print")?;
            target
                .print(&data, PrinterJobOptions::none())
                .map_err(|e| PrintError::Spooler(format!("raw print to '{name}' failed: {e:?}")))?;
            Ok(())
        })
        .await?;
        info!(printer = %printer, bytes = len, doc = %doc_name, "Raw job spooled");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Thermal printer detection
// ---------------------------------------------------------------------------

/// Pick the thermal printer queue out of `printers`.
///
/// Known names are tried in order, exact then case-insensitive; after that
/// any queue whose name contains a known name (or is contained by one)
/// matches. A machine with a single queue gets that queue.
pub fn match_thermal_printer(known: &[String], printers: &[PrinterInfo]) -> Option<String> {
    for target in known {
        if let Some(p) = printers.iter().find(|p| &p.name == target) {
            return Some(p.name.clone());
        }
        if let Some(p) = printers
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(target))
        {
            return Some(p.name.clone());
        }
    }

    for printer in printers {
        let name = printer.name.trim().to_lowercase();
        if name.is_empty() {
            continue;
        }
        let partial = known.iter().any(|target| {
            let target = target.to_lowercase();
            name.contains(&target) || target.contains(&name)
        });
        if partial {
            return Some(printer.name.clone());
        }
    }

    match printers {
        [only] => Some(only.name.clone()),
        _ => None,
    }
}

#[derive(Clone)]
pub struct PrinterDetector {
    backend: Arc<dyn PrinterBackend>,
    known_names: Vec<String>,
    retries: u32,
    delay: Duration,
    enum_timeout: Duration,
}

impl PrinterDetector {
    pub fn new(backend: Arc<dyn PrinterBackend>, config: &PrintConfig) -> Self {
        Self {
            backend,
            known_names: config.thermal_printer_names.clone(),
            retries: config.printer_enum_retries.max(1),
            delay: config.printer_enum_delay(),
            enum_timeout: config.printer_enum_timeout(),
        }
    }

    /// Enumerate queues, retrying while the spooler reports an empty list.
    /// Errors and timeouts count as an empty attempt.
    pub async fn list_printers(&self) -> Vec<PrinterInfo> {
        for attempt in 1..=self.retries {
            match tokio::time::timeout(self.enum_timeout, self.backend.list_printers()).await {
                Ok(Ok(list)) if !list.is_empty() => return list,
                Ok(Ok(_)) => debug!(attempt, "Printer list empty"),
                Ok(Err(e)) => warn!(attempt, error = %e, "Printer enumeration failed"),
                Err(_) => warn!(attempt, "Printer enumeration timed out"),
            }
            if attempt < self.retries {
                tokio::time::sleep(self.delay).await;
            }
        }
        Vec::new()
    }

    pub async fn detect(&self) -> Option<String> {
        let printers = self.list_printers().await;
        let found = match_thermal_printer(&self.known_names, &printers);
        match &found {
            Some(name) => info!(printer = %name, "Thermal printer detected"),
            None => info!(count = printers.len(), "No thermal printer among installed queues"),
        }
        found
    }
}
