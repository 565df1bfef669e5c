//! Print dispatch: device resolution and the transport escalation.
//!
//! `auto_print` walks raw text, serial ESC/POS and silent HTML in that fixed
//! order, one attempt each, stopping at the first success. Devices found by
//! auto-detection are written back to the settings store once they have
//! proved to work, so later calls skip detection.

use std::fmt;
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::PrintConfig;
use crate::payload::{AttemptRecord, PrintMode, PrintPayload, ReceiptItem, TransportResult};
use crate::port_detect::SerialPortDetector;
use crate::printers::{default_printer, PrinterBackend, PrinterDetector, PrinterInfo, SystemPrinters};
use crate::receipt_renderer::RenderContext;
use crate::serial::{SerialBackend, SerialPortCandidate, SystemSerial};
use crate::settings::{
    PrintSettings, SettingsStore, KEY_PREFERRED_PRINTER, KEY_PREFERRED_SERIAL_PORT,
    KEY_SERIAL_BAUD_RATE,
};
use crate::surface::{BrowserSurface, RenderSurface};
use crate::transports;

pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

// ---------------------------------------------------------------------------
// Direct targets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectTarget {
    Serial { path: String, baud_rate: u32 },
    RawText { printer: String },
    DirectUsb { printer: String },
    HtmlSilent { printer: String },
}

impl DirectTarget {
    /// Serial device paths (`COMn`, `/dev/tty*`, `/dev/cu.*`) select the
    /// serial transport; anything else names a printer queue, printed
    /// direct-USB when `preferDirectUsbForPOS58` is set and as raw text
    /// otherwise. Blank input yields `None`.
    pub fn parse(target: &str, settings: &PrintSettings) -> Option<Self> {
        let target = target.trim();
        if target.is_empty() {
            return None;
        }
        if is_serial_path(target) {
            return Some(Self::Serial {
                path: target.to_string(),
                baud_rate: settings.serial_baud_rate,
            });
        }
        let printer = target.to_string();
        if settings.modes.prefer_direct_usb_for_pos58 {
            Some(Self::DirectUsb { printer })
        } else {
            Some(Self::RawText { printer })
        }
    }

    pub fn mode(&self) -> PrintMode {
        match self {
            Self::Serial { .. } => PrintMode::EscposSerial,
            Self::RawText { .. } => PrintMode::RawText,
            Self::DirectUsb { .. } => PrintMode::DirectUsb,
            Self::HtmlSilent { .. } => PrintMode::HtmlSilent,
        }
    }
}

impl fmt::Display for DirectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial { path, baud_rate } => write!(f, "{path} @ {baud_rate}"),
            Self::RawText { printer } | Self::DirectUsb { printer } | Self::HtmlSilent { printer } => {
                f.write_str(printer)
            }
        }
    }
}

pub fn is_serial_path(target: &str) -> bool {
    let upper = target.to_ascii_uppercase();
    let com = upper
        .strip_prefix("COM")
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()));
    com || target.starts_with("/dev/tty") || target.starts_with("/dev/cu.")
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSource {
    Payload,
    Settings,
    Detected,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferredSerialPort {
    pub path: Option<String>,
    pub baud_rate: u32,
    pub auto_detected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Backends {
    pub printers: bool,
    pub serial: bool,
    pub surface: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub raw_text: bool,
    pub escpos_serial: bool,
    pub direct_usb: bool,
    pub html_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<&'static str>,
    pub backends: Backends,
    pub capabilities: Capabilities,
    pub printers: Vec<PrinterInfo>,
    pub detected_thermal_printer: Option<String>,
    pub serial_ports: Vec<SerialPortCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_error: Option<String>,
    pub auto_detected_serial_port: Option<String>,
    pub settings: Map<String, Value>,
    pub recommendations: Vec<String>,
}

fn failure_summary(attempts: &[AttemptRecord]) -> String {
    attempts
        .iter()
        .map(|a| format!("{} failed: {}", a.mode, a.message))
        .collect::<Vec<_>>()
        .join("; ")
}

fn record(attempts: &mut Vec<AttemptRecord>, result: &TransportResult) {
    attempts.push(AttemptRecord {
        mode: result.mode,
        message: result.message_or_default().to_string(),
    });
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Entry point for every print request.
///
/// Backends are optional: a missing one makes its transport fail as
/// unavailable without affecting the others.
#[derive(Clone)]
pub struct PrintOrchestrator {
    settings: Arc<dyn SettingsStore>,
    printers: Option<Arc<dyn PrinterBackend>>,
    serial: Option<Arc<dyn SerialBackend>>,
    surface: Option<Arc<dyn RenderSurface>>,
    config: PrintConfig,
    clock: Clock,
}

impl PrintOrchestrator {
    pub fn new(settings: Arc<dyn SettingsStore>, config: PrintConfig) -> Self {
        Self {
            settings,
            printers: None,
            serial: None,
            surface: None,
            config,
            clock: Arc::new(|| Local::now().naive_local()),
        }
    }

    /// Wired to the OS spooler, the serial ports and the browser print
    /// dialog. Silent HTML needs a host renderer passed to
    /// [`with_surface`](Self::with_surface).
    pub fn system(settings: Arc<dyn SettingsStore>, config: PrintConfig) -> Self {
        Self::new(settings, config)
            .with_surface(Arc::new(BrowserSurface))
            .with_printers(Arc::new(SystemPrinters))
            .with_serial(Arc::new(SystemSerial))
    }

    pub fn with_printers(mut self, printers: Arc<dyn PrinterBackend>) -> Self {
        self.printers = Some(printers);
        self
    }

    pub fn with_serial(mut self, serial: Arc<dyn SerialBackend>) -> Self {
        self.serial = Some(serial);
        self
    }

    pub fn with_surface(mut self, surface: Arc<dyn RenderSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &PrintConfig {
        &self.config
    }

    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }

    /// Typed preferences; an unset baud rate falls back to the configured default.
    pub fn load_settings(&self) -> PrintSettings {
        let mut settings = PrintSettings::load(self.settings.as_ref());
        if self.settings.get(KEY_SERIAL_BAUD_RATE).is_none() {
            settings.serial_baud_rate = self.config.default_baud_rate;
        }
        settings
    }

    fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    fn context(&self, payload: &PrintPayload) -> RenderContext {
        RenderContext::new(&self.config, payload, self.now())
    }

    fn persist(&self, key: &str, value: Value) {
        if let Err(e) = self.settings.set(key, value) {
            warn!(key, error = %e, "Failed to persist detected device");
        }
    }

    pub(crate) fn printer_detector(&self) -> Option<PrinterDetector> {
        self.printers
            .as_ref()
            .map(|p| PrinterDetector::new(p.clone(), &self.config))
    }

    pub(crate) fn serial_detector(&self, baud_rate: u32) -> Option<SerialPortDetector> {
        self.serial.as_ref().map(|s| {
            SerialPortDetector::new(s.clone(), baud_rate, self.config.serial_probe_timeout())
        })
    }

    pub(crate) fn serial_backend(&self) -> Option<&Arc<dyn SerialBackend>> {
        self.serial.as_ref()
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// Payload device, then the saved preference, then thermal-printer
    /// detection (saved when found), then the OS default queue (not saved).
    pub async fn resolve_device(
        &self,
        payload: &PrintPayload,
        settings: &PrintSettings,
    ) -> Option<(String, DeviceSource)> {
        if let Some(name) = payload.device_name() {
            return Some((name.to_string(), DeviceSource::Payload));
        }
        if let Some(name) = &settings.preferred_printer_name {
            return Some((name.clone(), DeviceSource::Settings));
        }
        let detector = self.printer_detector()?;
        if let Some(name) = detector.detect().await {
            self.persist(KEY_PREFERRED_PRINTER, json!(name));
            return Some((name, DeviceSource::Detected));
        }
        let printers = detector.list_printers().await;
        default_printer(&printers).map(|name| {
            info!(printer = %name, "Falling back to OS default printer");
            (name, DeviceSource::Default)
        })
    }

    /// Payload port, then the saved port, then (if allowed) auto-detection.
    /// The flag is true when the port came from detection.
    async fn resolve_serial_port(
        &self,
        payload: &PrintPayload,
        settings: &PrintSettings,
        allow_detect: bool,
    ) -> Option<(String, bool)> {
        if let Some(port) = payload.port_path() {
            return Some((port.to_string(), false));
        }
        if let Some(port) = &settings.preferred_serial_port {
            return Some((port.clone(), false));
        }
        if !allow_detect {
            return None;
        }
        let detector = self.serial_detector(self.baud_rate(payload, settings))?;
        detector.detect().await.map(|port| (port, true))
    }

    fn baud_rate(&self, payload: &PrintPayload, settings: &PrintSettings) -> u32 {
        payload
            .baud_rate
            .filter(|b| *b > 0)
            .unwrap_or(settings.serial_baud_rate)
    }

    async fn serial_attempt(
        &self,
        payload: &PrintPayload,
        settings: &PrintSettings,
        ctx: &RenderContext,
        allow_detect: bool,
    ) -> TransportResult {
        let Some((port, detected)) = self.resolve_serial_port(payload, settings, allow_detect).await
        else {
            return TransportResult::failed(PrintMode::EscposSerial, "no serial port found");
        };
        let baud_rate = self.baud_rate(payload, settings);
        let result = transports::escpos_serial(
            self.serial.as_ref(),
            &port,
            baud_rate,
            payload,
            ctx,
            self.config.serial_write_timeout(),
        )
        .await;
        if result.success && detected {
            info!(port = %port, "Saving auto-detected serial port");
            let mut updates = Map::new();
            updates.insert(KEY_PREFERRED_SERIAL_PORT.to_string(), json!(port));
            updates.insert(KEY_SERIAL_BAUD_RATE.to_string(), json!(baud_rate));
            if let Err(e) = self.settings.update(updates) {
                warn!(error = %e, "Failed to persist detected serial port");
            }
        }
        result
    }

    async fn html_attempt(
        &self,
        device: &str,
        payload: &PrintPayload,
        ctx: &RenderContext,
    ) -> TransportResult {
        transports::html_silent(
            self.surface.as_ref(),
            device,
            payload,
            ctx,
            self.config.html_print_timeout(),
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Raw text, then serial ESC/POS, then silent HTML.
    pub async fn auto_print(&self, payload: &PrintPayload) -> TransportResult {
        let span = info_span!("auto_print", attempt = %Uuid::new_v4(), order = %payload.order_id);
        self.auto_print_inner(payload).instrument(span).await
    }

    async fn auto_print_inner(&self, payload: &PrintPayload) -> TransportResult {
        let settings = self.load_settings();
        let Some((device, source)) = self.resolve_device(payload, &settings).await else {
            warn!("No printer could be resolved, aborting");
            return TransportResult::failed(
                PrintMode::Auto,
                "no print target: no printer name configured or detected",
            );
        };
        info!(device = %device, source = ?source, "Resolved print target");

        let ctx = self.context(payload);
        let mut attempts = Vec::with_capacity(3);

        info!(step = 1, "Trying raw-text print");
        let raw = transports::raw_text(
            self.printers.as_ref(),
            &device,
            payload,
            &ctx,
            self.config.raw_print_timeout(),
        )
        .await;
        if raw.success {
            return raw.with_step(1);
        }
        record(&mut attempts, &raw);

        info!(step = 2, "Trying ESC/POS serial print");
        let serial = self.serial_attempt(payload, &settings, &ctx, true).await;
        if serial.success {
            return serial.with_step(2).with_attempts(attempts);
        }
        record(&mut attempts, &serial);

        info!(step = 3, "Trying HTML silent print");
        let html = self.html_attempt(&device, payload, &ctx).await;
        if html.success {
            warn!(device = %device, "Printed through HTML fallback, output unconfirmed");
            return html.with_step(3).with_attempts(attempts);
        }
        record(&mut attempts, &html);

        let message = failure_summary(&attempts);
        warn!(%message, "All transports failed");
        TransportResult::failed(PrintMode::Auto, message).with_attempts(attempts)
    }

    /// Always opens the OS print dialog; the operator picks the printer.
    pub async fn manual_print(&self, payload: &PrintPayload) -> TransportResult {
        let settings = self.load_settings();
        let device = payload
            .device_name()
            .map(str::to_string)
            .or(settings.preferred_printer_name);
        let ctx = self.context(payload);
        transports::manual_dialog(
            self.surface.as_ref(),
            device.as_deref(),
            payload,
            &ctx,
            self.config.html_print_timeout(),
        )
        .await
    }

    /// One transport against an explicit port or printer. No detection and
    /// no settings writes.
    pub async fn direct_print(&self, payload: &PrintPayload, target: &str) -> TransportResult {
        let settings = self.load_settings();
        match DirectTarget::parse(target, &settings) {
            Some(target) => self.print_to(payload, &target).await,
            None => TransportResult::failed(PrintMode::Auto, "no print target: empty target"),
        }
    }

    pub async fn print_to(&self, payload: &PrintPayload, target: &DirectTarget) -> TransportResult {
        info!(target = %target, mode = %target.mode(), "Direct print");
        let ctx = self.context(payload);
        match target {
            DirectTarget::Serial { path, baud_rate } => {
                transports::escpos_serial(
                    self.serial.as_ref(),
                    path,
                    *baud_rate,
                    payload,
                    &ctx,
                    self.config.serial_write_timeout(),
                )
                .await
            }
            DirectTarget::RawText { printer } => {
                transports::raw_text(
                    self.printers.as_ref(),
                    printer,
                    payload,
                    &ctx,
                    self.config.raw_print_timeout(),
                )
                .await
            }
            DirectTarget::DirectUsb { printer } => {
                transports::direct_usb(
                    self.printers.as_ref(),
                    printer,
                    payload,
                    &ctx,
                    self.config.direct_usb_width,
                    self.config.direct_usb_timeout(),
                )
                .await
            }
            DirectTarget::HtmlSilent { printer } => self.html_attempt(printer, payload, &ctx).await,
        }
    }

    /// Preference-driven receipt print.
    ///
    /// ESC/POS goes first when requested or preferred (configured port only).
    /// Otherwise, or when that fails, the receipt is printed as silent HTML.
    /// With `preferEscPosEvenOnSuccess`, a successful HTML print is followed
    /// by an ESC/POS copy since some drivers report success without feeding
    /// paper.
    pub async fn print_receipt(&self, payload: &PrintPayload, force_escpos: bool) -> TransportResult {
        let settings = self.load_settings();
        let ctx = self.context(payload);
        let mut attempts = Vec::new();

        if force_escpos || settings.modes.prefer_esc_pos || settings.modes.prefer_direct_usb_for_pos58 {
            let serial = self.serial_attempt(payload, &settings, &ctx, false).await;
            if serial.success {
                return serial;
            }
            record(&mut attempts, &serial);
        }

        let Some((device, _)) = self.resolve_device(payload, &settings).await else {
            attempts.push(AttemptRecord {
                mode: PrintMode::HtmlSilent,
                message: "no print target: no printer name configured or detected".into(),
            });
            let message = failure_summary(&attempts);
            return TransportResult::failed(PrintMode::Auto, message).with_attempts(attempts);
        };

        let html = self.html_attempt(&device, payload, &ctx).await;
        if !html.success {
            record(&mut attempts, &html);
            return html.with_attempts(attempts);
        }

        if settings.modes.prefer_esc_pos_even_on_success {
            let extra = self.serial_attempt(payload, &settings, &ctx, true).await;
            let message = if extra.success {
                format!("also printed on {}", extra.device.as_deref().unwrap_or_default())
            } else {
                extra.message_or_default().to_string()
            };
            attempts.push(AttemptRecord {
                mode: PrintMode::EscposSerial,
                message,
            });
        }
        html.with_attempts(attempts)
    }

    /// Fixed sample receipt through the silent HTML transport.
    pub async fn test_print(&self, printer: Option<&str>) -> TransportResult {
        let now = self.now();
        let payload = PrintPayload {
            order_id: format!("TEST_{}", now.and_utc().timestamp_millis()),
            total: 25000.0,
            items: vec![ReceiptItem::new("Test Item POS58", 1, 25000.0)],
            device_name: printer.map(str::to_string),
            ..PrintPayload::default()
        };
        let settings = self.load_settings();
        let Some((device, _)) = self.resolve_device(&payload, &settings).await else {
            return TransportResult::failed(
                PrintMode::HtmlSilent,
                "no print target: no printer name configured or detected",
            );
        };
        let ctx = self.context(&payload);
        self.html_attempt(&device, &payload, &ctx).await
    }

    /// Environment report for the admin screen. Detection results here are
    /// never written to settings.
    pub async fn diagnostics(&self) -> Diagnostics {
        let settings = self.load_settings();
        let backends = Backends {
            printers: self.printers.is_some(),
            serial: self.serial.is_some(),
            surface: self.surface.is_some(),
        };

        let (printers, detected) = match self.printer_detector() {
            Some(detector) => {
                let printers = detector.list_printers().await;
                let detected = crate::printers::match_thermal_printer(
                    &self.config.thermal_printer_names,
                    &printers,
                );
                (printers, detected)
            }
            None => (Vec::new(), None),
        };

        let (serial_ports, serial_error) = match &self.serial {
            Some(serial) => match serial.list_ports() {
                Ok(ports) => (ports, None),
                Err(e) => (Vec::new(), Some(e.to_string())),
            },
            None => (Vec::new(), None),
        };
        let auto_detected = match self.serial_detector(settings.serial_baud_rate) {
            Some(detector) if serial_error.is_none() => detector.detect().await,
            _ => None,
        };

        let mut recommendations = Vec::new();
        if !backends.serial {
            recommendations.push("Enable the serial port driver for ESC/POS printing".to_string());
        }
        if !backends.printers {
            recommendations.push("Enable the OS printer driver for raw and direct USB printing".to_string());
        }
        if settings.preferred_serial_port.is_none() && auto_detected.is_none() {
            recommendations.push(
                "Configure serial port or ensure thermal printer is connected via USB".to_string(),
            );
        }
        if detected.is_none() && printers.is_empty() {
            recommendations.push(
                "Install thermal printer drivers and ensure printer is connected".to_string(),
            );
        }
        if serial_ports.is_empty() {
            recommendations.push(
                "Check USB connections and install USB-to-serial drivers if needed".to_string(),
            );
        }

        Diagnostics {
            timestamp: self.now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            build: option_env!("BUILD_GIT_SHA"),
            backends,
            capabilities: Capabilities {
                raw_text: backends.printers,
                escpos_serial: backends.serial,
                direct_usb: backends.printers,
                html_fallback: self.surface.as_ref().is_some_and(|s| s.supports_silent()),
            },
            printers,
            detected_thermal_printer: detected,
            serial_ports,
            serial_error,
            auto_detected_serial_port: auto_detected,
            settings: self.settings.snapshot(),
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::settings::{
        MemorySettings, KEY_PREFER_DIRECT_USB_POS58, KEY_PREFER_ESCPOS,
        KEY_PREFER_ESCPOS_EVEN_ON_SUCCESS,
    };
    use crate::test_support::{
        fast_config, fixed_now, sample_payload, FakePrinters, FakeSerial, FakeSurface,
    };
    use crate::transports::HTML_RELIABILITY_WARNING;

    struct Rig {
        settings: Arc<MemorySettings>,
        printers: Arc<FakePrinters>,
        serial: Arc<FakeSerial>,
        surface: Arc<FakeSurface>,
        orchestrator: PrintOrchestrator,
    }

    fn rig() -> Rig {
        let settings = Arc::new(MemorySettings::new());
        let printers = Arc::new(FakePrinters::new());
        let serial = Arc::new(FakeSerial::new());
        let surface = Arc::new(FakeSurface::new());
        let orchestrator = PrintOrchestrator::new(settings.clone(), fast_config())
            .with_printers(printers.clone())
            .with_serial(serial.clone())
            .with_surface(surface.clone())
            .with_clock(Arc::new(fixed_now));
        Rig {
            settings,
            printers,
            serial,
            surface,
            orchestrator,
        }
    }

    #[test]
    fn direct_target_parsing() {
        let mut settings = PrintSettings::load(&MemorySettings::new());
        assert_eq!(
            DirectTarget::parse("COM3", &settings),
            Some(DirectTarget::Serial {
                path: "COM3".into(),
                baud_rate: 9600
            })
        );
        assert!(matches!(
            DirectTarget::parse("/dev/ttyUSB0", &settings),
            Some(DirectTarget::Serial { .. })
        ));
        assert!(matches!(
            DirectTarget::parse("/dev/cu.usbserial-10", &settings),
            Some(DirectTarget::Serial { .. })
        ));
        assert_eq!(
            DirectTarget::parse("POS58 Printer", &settings),
            Some(DirectTarget::RawText {
                printer: "POS58 Printer".into()
            })
        );
        assert_eq!(DirectTarget::parse("  ", &settings), None);

        settings.modes.prefer_direct_usb_for_pos58 = true;
        assert_eq!(
            DirectTarget::parse("POS58 Printer", &settings).map(|t| t.mode()),
            Some(PrintMode::DirectUsb)
        );
        assert_eq!(
            DirectTarget::parse("COMPUTER", &settings).map(|t| t.mode()),
            Some(PrintMode::DirectUsb)
        );
    }

    #[tokio::test]
    async fn early_exit_on_raw_text_success() {
        let r = rig();
        r.printers.add_printer("POS58 Printer", true);
        r.serial.add_port(SerialPortCandidate::new("/dev/ttyUSB0"));

        let result = r.orchestrator.auto_print(&sample_payload()).await;
        assert!(result.success);
        assert_eq!(result.mode, PrintMode::RawText);
        assert_eq!(result.step, Some(1));
        assert_eq!(result.device.as_deref(), Some("POS58 Printer"));
        assert_eq!(r.serial.list_calls(), 0);
        assert!(r.serial.open_attempts().is_empty());
        assert_eq!(r.surface.calls(), 0);
    }

    #[tokio::test]
    async fn escalates_to_html_when_earlier_steps_fail() {
        let r = rig();
        r.printers.add_printer("POS58 Printer", true);
        r.printers.fail_raw("spooler offline");
        r.serial.add_port(SerialPortCandidate::new("COM3"));
        r.serial.fail_writes("COM3", "port busy");

        let result = r.orchestrator.auto_print(&sample_payload()).await;
        assert!(result.success);
        assert_eq!(result.mode, PrintMode::HtmlSilent);
        assert_eq!(result.step, Some(3));
        assert_eq!(result.warning.as_deref(), Some(HTML_RELIABILITY_WARNING));
        let modes: Vec<_> = result.attempts.iter().map(|a| a.mode).collect();
        assert_eq!(modes, [PrintMode::RawText, PrintMode::EscposSerial]);
        assert_eq!(r.surface.calls(), 1);
        assert!(r.settings.get(KEY_PREFERRED_SERIAL_PORT).is_none());
    }

    #[tokio::test]
    async fn timed_out_serial_step_never_prints_behind_html() {
        let settings = Arc::new(MemorySettings::new());
        settings.set(KEY_PREFERRED_SERIAL_PORT, json!("COM3")).unwrap();
        let printers = Arc::new(FakePrinters::new());
        printers.add_printer("POS58 Printer", true);
        printers.fail_raw("spooler offline");
        let serial = Arc::new(FakeSerial::new());
        serial.add_port(SerialPortCandidate::new("COM3"));
        serial.delay_open("COM3", Duration::from_millis(200));
        let surface = Arc::new(FakeSurface::new());
        let config = PrintConfig {
            serial_write_timeout_ms: 20,
            ..fast_config()
        };
        let orchestrator = PrintOrchestrator::new(settings, config)
            .with_printers(printers)
            .with_serial(serial.clone())
            .with_surface(surface.clone())
            .with_clock(Arc::new(fixed_now));

        let result = orchestrator.auto_print(&sample_payload()).await;
        assert!(result.success);
        assert_eq!(result.step, Some(3));
        assert!(result.attempts[1].message.contains("timed out"));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(serial.written("COM3").is_empty());
        assert_eq!(serial.closed_count(), 1);
        assert_eq!(surface.calls(), 1);
    }

    #[tokio::test]
    async fn aggregated_failure_names_every_transport() {
        let r = rig();
        r.settings
            .set(KEY_PREFERRED_PRINTER, json!("POS58 Printer"))
            .unwrap();
        r.printers.fail_raw("queue paused");
        r.serial.add_port(SerialPortCandidate::new("COM3"));
        r.serial.fail_writes("COM3", "port busy");
        r.surface.fail("no renderer");

        let result = r.orchestrator.auto_print(&sample_payload()).await;
        assert!(!result.success);
        assert_eq!(result.mode, PrintMode::Auto);
        let message = result.message_or_default();
        for part in ["raw-text failed", "escpos-serial failed", "html-silent failed"] {
            assert!(message.contains(part), "{message}");
        }
        for cause in ["queue paused", "port busy", "no renderer"] {
            assert!(message.contains(cause), "{message}");
        }
        assert_eq!(result.attempts.len(), 3);
    }

    #[tokio::test]
    async fn aborts_without_any_device() {
        let r = rig();
        let result = r.orchestrator.auto_print(&sample_payload()).await;
        assert!(!result.success);
        assert!(result.message_or_default().contains("no print target"));
        assert!(r.printers.raw_jobs().is_empty());
        assert_eq!(r.surface.calls(), 0);
    }

    #[tokio::test]
    async fn html_fallback_on_default_printer() {
        let r = rig();
        r.printers.add_printer("Office Laser", false);
        r.printers.add_printer("Front Desk", true);
        r.printers.raw_unavailable();

        let result = r.orchestrator.auto_print(&sample_payload()).await;
        assert!(result.success);
        assert_eq!(result.mode, PrintMode::HtmlSilent);
        assert_eq!(result.device.as_deref(), Some("Front Desk"));
        assert!(result.warning.is_some());
        assert_eq!(
            result.attempts[0].message,
            "raw printer driver unavailable"
        );
        assert_eq!(result.attempts[1].message, "no serial port found");
        // The OS default is a fallback, not a preference.
        assert!(r.settings.get(KEY_PREFERRED_PRINTER).is_none());
        assert!(r.surface.documents()[0].contains("Test"));
    }

    #[tokio::test]
    async fn detected_serial_port_is_cached_after_success() {
        let r = rig();
        r.printers.add_printer("POS58 Printer", false);
        r.printers.fail_raw("spooler offline");
        r.serial.add_port(SerialPortCandidate::new("/dev/ttyUSB0"));

        let result = r.orchestrator.auto_print(&sample_payload()).await;
        assert_eq!(result.mode, PrintMode::EscposSerial);
        assert_eq!(result.step, Some(2));
        assert_eq!(r.settings.get(KEY_PREFERRED_SERIAL_PORT), Some(json!("/dev/ttyUSB0")));
        assert_eq!(r.settings.get(KEY_PREFERRED_PRINTER), Some(json!("POS58 Printer")));

        let list_calls = r.serial.list_calls();
        let preferred = r.orchestrator.get_preferred_serial_port().await;
        assert_eq!(preferred.path.as_deref(), Some("/dev/ttyUSB0"));
        assert!(!preferred.auto_detected);
        assert_eq!(r.serial.list_calls(), list_calls);
    }

    #[tokio::test]
    async fn payload_targets_override_settings() {
        let r = rig();
        r.settings.set(KEY_PREFERRED_PRINTER, json!("Saved")).unwrap();
        let payload = PrintPayload {
            device_name: Some("Explicit".into()),
            ..sample_payload()
        };
        let result = r.orchestrator.auto_print(&payload).await;
        assert_eq!(result.device.as_deref(), Some("Explicit"));
        assert_eq!(r.printers.list_calls(), 0);
    }

    #[tokio::test]
    async fn manual_print_uses_dialog() {
        let r = rig();
        let result = r.orchestrator.manual_print(&sample_payload()).await;
        assert!(result.success);
        assert_eq!(result.mode, PrintMode::ManualDialog);
        assert_eq!(result.device.as_deref(), Some(transports::DIALOG_DEVICE));
        assert!(!r.surface.requests()[0].silent);
    }

    #[tokio::test]
    async fn direct_print_skips_detection() {
        let r = rig();
        r.serial.add_port(SerialPortCandidate::new("COM9"));
        let result = r.orchestrator.direct_print(&sample_payload(), "COM9").await;
        assert!(result.success);
        assert_eq!(result.mode, PrintMode::EscposSerial);
        assert_eq!(r.serial.list_calls(), 0);
        assert!(r.settings.snapshot().is_empty());

        r.settings.set(KEY_PREFER_DIRECT_USB_POS58, json!(true)).unwrap();
        let usb = r.orchestrator.direct_print(&sample_payload(), "POS58 Printer").await;
        assert!(usb.success);
        assert_eq!(usb.mode, PrintMode::DirectUsb);
        assert_eq!(r.printers.raw_jobs()[0].0, "POS58 Printer");

        let empty = r.orchestrator.direct_print(&sample_payload(), "").await;
        assert!(!empty.success);
    }

    #[tokio::test]
    async fn print_receipt_prefers_escpos_when_configured() {
        let r = rig();
        r.settings.set(KEY_PREFER_ESCPOS, json!(true)).unwrap();
        r.settings.set(KEY_PREFERRED_SERIAL_PORT, json!("COM3")).unwrap();
        r.serial.add_port(SerialPortCandidate::new("COM3"));

        let result = r.orchestrator.print_receipt(&sample_payload(), false).await;
        assert_eq!(result.mode, PrintMode::EscposSerial);
        assert!(result.success);
        assert_eq!(r.surface.calls(), 0);
    }

    #[tokio::test]
    async fn print_receipt_falls_back_to_html_without_port() {
        let r = rig();
        r.settings.set(KEY_PREFER_ESCPOS, json!(true)).unwrap();
        r.settings.set(KEY_PREFERRED_PRINTER, json!("POS58 Printer")).unwrap();
        r.serial.add_port(SerialPortCandidate::new("/dev/ttyUSB0"));

        let result = r.orchestrator.print_receipt(&sample_payload(), false).await;
        assert_eq!(result.mode, PrintMode::HtmlSilent);
        assert!(result.success);
        assert_eq!(result.attempts[0].message, "no serial port found");
        assert_eq!(r.serial.list_calls(), 0);
    }

    #[tokio::test]
    async fn print_receipt_sends_escpos_copy_when_asked() {
        let r = rig();
        r.settings.set(KEY_PREFERRED_PRINTER, json!("POS58 Printer")).unwrap();
        r.settings
            .set(KEY_PREFER_ESCPOS_EVEN_ON_SUCCESS, json!(true))
            .unwrap();
        r.serial.add_port(SerialPortCandidate::new("/dev/ttyUSB0"));

        let result = r.orchestrator.print_receipt(&sample_payload(), false).await;
        assert_eq!(result.mode, PrintMode::HtmlSilent);
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(result.attempts[0].message, "also printed on /dev/ttyUSB0");
        assert!(!r.serial.written("/dev/ttyUSB0").is_empty());
    }

    #[tokio::test]
    async fn test_print_uses_sample_receipt() {
        let r = rig();
        let result = r.orchestrator.test_print(Some("POS58 Printer")).await;
        assert!(result.success);
        assert_eq!(result.mode, PrintMode::HtmlSilent);
        let html = &r.surface.documents()[0];
        assert!(html.contains("Test Item POS58"));
        assert!(html.contains("TEST_"));
        assert!(html.contains("Rp 25.000"));
    }

    #[tokio::test]
    async fn diagnostics_do_not_persist() {
        let r = rig();
        r.printers.add_printer("POS58 Printer", true);
        r.serial.add_port(SerialPortCandidate::new("/dev/ttyUSB0"));

        let report = r.orchestrator.diagnostics().await;
        assert_eq!(report.detected_thermal_printer.as_deref(), Some("POS58 Printer"));
        assert_eq!(report.auto_detected_serial_port.as_deref(), Some("/dev/ttyUSB0"));
        assert!(report.capabilities.raw_text && report.capabilities.html_fallback);
        assert!(report.recommendations.is_empty());
        assert!(r.settings.snapshot().is_empty());
        assert_eq!(report.timestamp, "2026-10-19T14:30:00");
    }

    #[tokio::test]
    async fn diagnostics_recommend_fixes() {
        let settings = Arc::new(MemorySettings::new());
        let orchestrator = PrintOrchestrator::new(settings, fast_config());
        let report = orchestrator.diagnostics().await;
        assert!(!report.capabilities.escpos_serial);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("USB-to-serial drivers")));
        assert!(report.recommendations.len() >= 4);
    }
}
