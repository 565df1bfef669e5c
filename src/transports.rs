//! Single-attempt transports.
//!
//! Each function formats its own output from the payload, runs one bounded
//! attempt and folds any error into a failed [`TransportResult`]. None of
//! them retries, escalates or touches settings; that is the orchestrator's job.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{PrintError, PrintResult};
use crate::payload::{PrintMode, PrintPayload, TransportResult};
use crate::printers::PrinterBackend;
use crate::receipt_renderer::{render_escpos, render_html, render_text, HtmlOptions, RenderContext};
use crate::serial::{write_to_port, SerialBackend};
use crate::surface::{HtmlPrintRequest, RenderSurface};
use crate::thermal::print_direct_usb;

/// Attached to every successful HTML print.
pub const HTML_RELIABILITY_WARNING: &str =
    "HTML fallback used: the OS accepted the job but paper output is not confirmed";

/// Device reported for dialog prints when the operator picks the printer.
pub const DIALOG_DEVICE: &str = "system print dialog";

/// Dropping `fut` on timeout is what stops the backend: blocking work
/// behind it sees its cancel flag raised before touching the device.
pub(crate) async fn bounded<T>(
    operation: &'static str,
    after: Duration,
    fut: impl Future<Output = PrintResult<T>>,
) -> PrintResult<T> {
    tokio::time::timeout(after, fut)
        .await
        .unwrap_or_else(|_| Err(PrintError::timeout(operation, after)))
}

fn require<'a, T: ?Sized>(backend: Option<&'a Arc<T>>, what: &str) -> PrintResult<&'a Arc<T>> {
    backend.ok_or_else(|| PrintError::Unavailable(what.to_string()))
}

fn finish(mode: PrintMode, device: &str, outcome: PrintResult<()>) -> TransportResult {
    match outcome {
        Ok(()) => {
            info!(mode = %mode, device = %device, "Transport succeeded");
            TransportResult::ok(mode, device)
        }
        Err(e) => {
            warn!(mode = %mode, device = %device, error = %e, "Transport failed");
            TransportResult::failed(mode, e.to_string())
        }
    }
}

pub async fn raw_text(
    printers: Option<&Arc<dyn PrinterBackend>>,
    device: &str,
    payload: &PrintPayload,
    ctx: &RenderContext,
    after: Duration,
) -> TransportResult {
    let outcome = async {
        let printers = require(printers, "raw printer driver")?;
        let text = render_text(payload, ctx);
        bounded(
            "raw-text print",
            after,
            printers.print_raw(device, text.into_bytes(), "Receipt (raw text)"),
        )
        .await
    }
    .await;
    finish(PrintMode::RawText, device, outcome)
}

pub async fn escpos_serial(
    serial: Option<&Arc<dyn SerialBackend>>,
    port: &str,
    baud_rate: u32,
    payload: &PrintPayload,
    ctx: &RenderContext,
    after: Duration,
) -> TransportResult {
    let outcome = async {
        let serial = require(serial, "serial port driver")?;
        let data = render_escpos(payload, ctx);
        write_to_port(serial.clone(), port, baud_rate, data, after).await
    }
    .await;
    finish(PrintMode::EscposSerial, port, outcome)
}

/// Silent HTML print. Success always carries [`HTML_RELIABILITY_WARNING`].
pub async fn html_silent(
    surface: Option<&Arc<dyn RenderSurface>>,
    device: &str,
    payload: &PrintPayload,
    ctx: &RenderContext,
    after: Duration,
) -> TransportResult {
    let outcome = async {
        let surface = require(surface, "HTML render surface")?;
        let html = render_html(payload, ctx, HtmlOptions::default());
        bounded(
            "html render+print",
            after,
            surface.print_html(&html, &HtmlPrintRequest::silent(device)),
        )
        .await
    }
    .await;
    let result = finish(PrintMode::HtmlSilent, device, outcome);
    if result.success {
        result.with_warning(HTML_RELIABILITY_WARNING)
    } else {
        result
    }
}

pub async fn manual_dialog(
    surface: Option<&Arc<dyn RenderSurface>>,
    device: Option<&str>,
    payload: &PrintPayload,
    ctx: &RenderContext,
    after: Duration,
) -> TransportResult {
    let outcome = async {
        let surface = require(surface, "HTML render surface")?;
        let html = render_html(payload, ctx, HtmlOptions { auto_print_dialog: true });
        let request = HtmlPrintRequest::dialog(device.map(str::to_string));
        bounded("print dialog", after, surface.print_html(&html, &request)).await
    }
    .await;
    finish(PrintMode::ManualDialog, device.unwrap_or(DIALOG_DEVICE), outcome)
}

pub async fn direct_usb(
    printers: Option<&Arc<dyn PrinterBackend>>,
    device: &str,
    payload: &PrintPayload,
    ctx: &RenderContext,
    width: usize,
    after: Duration,
) -> TransportResult {
    let outcome = async {
        let printers = require(printers, "thermal printer driver")?;
        print_direct_usb(printers.clone(), device, payload, ctx, width, after).await
    }
    .await;
    finish(PrintMode::DirectUsb, device, outcome)
}
