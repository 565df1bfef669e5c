//! Scripted fakes for the printer, serial and render backends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use crate::config::PrintConfig;
use crate::error::{PrintError, PrintResult};
use crate::payload::{PrintPayload, ReceiptItem};
use crate::printers::{PrinterBackend, PrinterInfo};
use crate::serial::{SerialBackend, SerialLink, SerialPortCandidate};
use crate::surface::{HtmlPrintRequest, RenderSurface};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

pub fn fixed_now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, 19)
        .and_then(|d| d.and_hms_opt(14, 30, 0))
        .unwrap_or_default()
}

/// Timeouts short enough for tests, long enough for an uncontended fake.
pub fn fast_config() -> PrintConfig {
    PrintConfig {
        serial_probe_timeout_ms: 50,
        serial_write_timeout_ms: 500,
        raw_print_timeout_ms: 500,
        html_print_timeout_ms: 500,
        direct_usb_timeout_ms: 500,
        printer_enum_timeout_ms: 100,
        printer_enum_retries: 3,
        printer_enum_delay_ms: 1,
        ..PrintConfig::default()
    }
}

pub fn sample_payload() -> PrintPayload {
    PrintPayload {
        order_id: "T1".into(),
        total: 25000.0,
        items: vec![ReceiptItem::new("Item", 1, 25000.0)],
        business_name: Some("Test".into()),
        ..PrintPayload::default()
    }
}

// ---------------------------------------------------------------------------
// Serial
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SerialState {
    ports: Vec<SerialPortCandidate>,
    list_error: Option<String>,
    open_errors: HashMap<String, String>,
    open_delays: HashMap<String, Duration>,
    write_errors: HashMap<String, String>,
    fail_close: bool,
    open_attempts: Vec<String>,
    written: HashMap<String, Vec<u8>>,
    closed: usize,
    list_calls: usize,
}

#[derive(Default, Clone)]
pub struct FakeSerial {
    state: Arc<Mutex<SerialState>>,
}

impl FakeSerial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_port(&self, candidate: SerialPortCandidate) {
        lock(&self.state).ports.push(candidate);
    }

    pub fn fail_list(&self, message: &str) {
        lock(&self.state).list_error = Some(message.to_string());
    }

    pub fn fail_open(&self, path: &str, message: &str) {
        lock(&self.state)
            .open_errors
            .insert(path.to_string(), message.to_string());
    }

    pub fn delay_open(&self, path: &str, delay: Duration) {
        lock(&self.state).open_delays.insert(path.to_string(), delay);
    }

    pub fn fail_writes(&self, path: &str, message: &str) {
        lock(&self.state)
            .write_errors
            .insert(path.to_string(), message.to_string());
    }

    pub fn fail_close(&self, fail: bool) {
        lock(&self.state).fail_close = fail;
    }

    pub fn open_attempts(&self) -> Vec<String> {
        lock(&self.state).open_attempts.clone()
    }

    pub fn written(&self, path: &str) -> Vec<u8> {
        lock(&self.state).written.get(path).cloned().unwrap_or_default()
    }

    pub fn closed_count(&self) -> usize {
        lock(&self.state).closed
    }

    pub fn list_calls(&self) -> usize {
        lock(&self.state).list_calls
    }
}

struct FakeLink {
    path: String,
    state: Arc<Mutex<SerialState>>,
}

impl SerialLink for FakeLink {
    fn write_all(&mut self, data: &[u8]) -> PrintResult<()> {
        let mut state = lock(&self.state);
        if let Some(message) = state.write_errors.get(&self.path) {
            return Err(PrintError::Serial(message.clone()));
        }
        state
            .written
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    fn drain(&mut self) -> PrintResult<()> {
        Ok(())
    }

    fn close(self: Box<Self>) -> PrintResult<()> {
        let mut state = lock(&self.state);
        state.closed += 1;
        if state.fail_close {
            return Err(PrintError::Serial("close failed".into()));
        }
        Ok(())
    }
}

impl SerialBackend for FakeSerial {
    fn list_ports(&self) -> PrintResult<Vec<SerialPortCandidate>> {
        let mut state = lock(&self.state);
        state.list_calls += 1;
        if let Some(message) = &state.list_error {
            return Err(PrintError::Serial(message.clone()));
        }
        Ok(state.ports.clone())
    }

    fn open(&self, path: &str, _baud_rate: u32, _timeout: Duration) -> PrintResult<Box<dyn SerialLink>> {
        let delay = {
            let mut state = lock(&self.state);
            state.open_attempts.push(path.to_string());
            state.open_delays.get(path).copied()
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let state = lock(&self.state);
        if let Some(message) = state.open_errors.get(path) {
            return Err(PrintError::Serial(message.clone()));
        }
        if !state.ports.iter().any(|p| p.path == path) {
            return Err(PrintError::Serial(format!("{path}: no such port")));
        }
        Ok(Box::new(FakeLink {
            path: path.to_string(),
            state: self.state.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Printer queues
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PrinterState {
    printers: Vec<PrinterInfo>,
    empty_lists_left: usize,
    /// `(unavailable, message)`
    raw_error: Option<(bool, String)>,
    list_calls: usize,
    raw_jobs: Vec<(String, Vec<u8>)>,
}

#[derive(Default, Clone)]
pub struct FakePrinters {
    state: Arc<Mutex<PrinterState>>,
}

impl FakePrinters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_printer(&self, name: &str, is_default: bool) {
        lock(&self.state)
            .printers
            .push(PrinterInfo::new(name, is_default));
    }

    /// The next `n` enumerations report no printers.
    pub fn empty_list_for(&self, n: usize) {
        lock(&self.state).empty_lists_left = n;
    }

    pub fn fail_raw(&self, message: &str) {
        lock(&self.state).raw_error = Some((false, message.to_string()));
    }

    pub fn raw_unavailable(&self) {
        lock(&self.state).raw_error = Some((true, "raw printer driver".into()));
    }

    pub fn list_calls(&self) -> usize {
        lock(&self.state).list_calls
    }

    pub fn raw_jobs(&self) -> Vec<(String, Vec<u8>)> {
        lock(&self.state).raw_jobs.clone()
    }
}

#[async_trait]
impl PrinterBackend for FakePrinters {
    async fn list_printers(&self) -> PrintResult<Vec<PrinterInfo>> {
        let mut state = lock(&self.state);
        state.list_calls += 1;
        if state.empty_lists_left > 0 {
            state.empty_lists_left -= 1;
            return Ok(Vec::new());
        }
        Ok(state.printers.clone())
    }

    async fn print_raw(&self, printer: &str, data: Vec<u8>, _doc_name: &str) -> PrintResult<()> {
        let mut state = lock(&self.state);
        match &state.raw_error {
            Some((true, what)) => return Err(PrintError::Unavailable(what.clone())),
            Some((false, message)) => return Err(PrintError::Spooler(message.clone())),
            None => {}
        }
        state.raw_jobs.push((printer.to_string(), data));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Render surface
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SurfaceState {
    error: Option<String>,
    delay: Option<Duration>,
    requests: Vec<HtmlPrintRequest>,
    documents: Vec<String>,
}

#[derive(Default, Clone)]
pub struct FakeSurface {
    state: Arc<Mutex<SurfaceState>>,
}

impl FakeSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, message: &str) {
        lock(&self.state).error = Some(message.to_string());
    }

    pub fn delay(&self, delay: Duration) {
        lock(&self.state).delay = Some(delay);
    }

    pub fn calls(&self) -> usize {
        lock(&self.state).requests.len()
    }

    pub fn requests(&self) -> Vec<HtmlPrintRequest> {
        lock(&self.state).requests.clone()
    }

    pub fn documents(&self) -> Vec<String> {
        lock(&self.state).documents.clone()
    }
}

#[async_trait]
impl RenderSurface for FakeSurface {
    async fn print_html(&self, html: &str, request: &HtmlPrintRequest) -> PrintResult<()> {
        let (delay, error) = {
            let mut state = lock(&self.state);
            state.requests.push(request.clone());
            state.documents.push(html.to_string());
            (state.delay, state.error.clone())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match error {
            Some(message) => Err(PrintError::Render(message)),
            None => Ok(()),
        }
    }
}
