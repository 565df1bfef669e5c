//! Device listing and preference management on top of the orchestrator.

use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::error::{PrintError, PrintResult};
use crate::orchestrator::{PreferredSerialPort, PrintOrchestrator};
use crate::printers::PrinterInfo;
use crate::serial::SerialPortCandidate;
use crate::settings::{
    PrintModes, PrintModesUpdate, KEY_PREFERRED_PRINTER, KEY_PREFERRED_SERIAL_PORT,
    KEY_PREFER_DIRECT_USB_POS58, KEY_PREFER_ESCPOS, KEY_PREFER_ESCPOS_EVEN_ON_SUCCESS,
    KEY_SERIAL_BAUD_RATE,
};

impl PrintOrchestrator {
    pub fn list_serial_ports(&self) -> PrintResult<Vec<SerialPortCandidate>> {
        let serial = self
            .serial_backend()
            .ok_or_else(|| PrintError::Unavailable("serial port driver".into()))?;
        serial.list_ports()
    }

    /// Installed queues, with the same empty-list retry as detection.
    pub async fn list_printers(&self) -> PrintResult<Vec<PrinterInfo>> {
        let detector = self
            .printer_detector()
            .ok_or_else(|| PrintError::Unavailable("OS printer driver".into()))?;
        Ok(detector.list_printers().await)
    }

    /// Detect and save the thermal printer queue.
    pub async fn detect_thermal_printer(&self) -> Option<String> {
        let found = self.printer_detector()?.detect().await?;
        if let Err(e) = self.settings().set(KEY_PREFERRED_PRINTER, json!(found)) {
            warn!(error = %e, "Failed to save detected printer");
        }
        Some(found)
    }

    pub fn get_print_modes(&self) -> PrintModes {
        self.load_settings().modes
    }

    /// Apply the flags present in `update` and return the resulting modes.
    pub fn set_print_modes(&self, update: PrintModesUpdate) -> PrintResult<PrintModes> {
        let mut values = Map::new();
        let flags = [
            (KEY_PREFER_ESCPOS, update.prefer_esc_pos),
            (KEY_PREFER_ESCPOS_EVEN_ON_SUCCESS, update.prefer_esc_pos_even_on_success),
            (KEY_PREFER_DIRECT_USB_POS58, update.prefer_direct_usb_for_pos58),
        ];
        for (key, flag) in flags {
            if let Some(flag) = flag {
                values.insert(key.to_string(), Value::Bool(flag));
            }
        }
        if !values.is_empty() {
            self.settings().update(values)?;
        }
        let modes = self.get_print_modes();
        info!(?modes, "Print modes updated");
        Ok(modes)
    }

    /// The saved port; when none is saved, auto-detect and save the result.
    pub async fn get_preferred_serial_port(&self) -> PreferredSerialPort {
        let settings = self.load_settings();
        if let Some(path) = settings.preferred_serial_port {
            return PreferredSerialPort {
                path: Some(path),
                baud_rate: settings.serial_baud_rate,
                auto_detected: false,
            };
        }

        let detected = match self.serial_detector(settings.serial_baud_rate) {
            Some(detector) => detector.detect().await,
            None => None,
        };
        if let Some(path) = &detected {
            info!(port = %path, "Saving auto-detected serial port");
            if let Err(e) = self.settings().set(KEY_PREFERRED_SERIAL_PORT, json!(path)) {
                warn!(error = %e, "Failed to save detected serial port");
            }
        }
        PreferredSerialPort {
            auto_detected: detected.is_some(),
            path: detected,
            baud_rate: settings.serial_baud_rate,
        }
    }

    /// `None` clears the saved port.
    pub fn set_preferred_serial_port(&self, path: Option<&str>, baud_rate: Option<u32>) -> PrintResult<()> {
        let mut values = Map::new();
        let path = path.map(str::trim).filter(|p| !p.is_empty());
        values.insert(
            KEY_PREFERRED_SERIAL_PORT.to_string(),
            path.map_or(Value::Null, |p| json!(p)),
        );
        if let Some(baud) = baud_rate.filter(|b| *b > 0) {
            values.insert(KEY_SERIAL_BAUD_RATE.to_string(), json!(baud));
        }
        self.settings().update(values)
    }

    pub fn get_preferred_printer(&self) -> Option<String> {
        self.load_settings().preferred_printer_name
    }

    /// `None` clears the saved printer.
    pub fn set_preferred_printer(&self, name: Option<&str>) -> PrintResult<()> {
        let value = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map_or(Value::Null, |n| json!(n));
        self.settings().set(KEY_PREFERRED_PRINTER, value)
    }
}
