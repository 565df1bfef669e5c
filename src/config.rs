//! Tunables for the print core.
//!
//! User preferences (preferred printer, serial port, print modes) are kept in
//! the settings store; this struct only carries values the host application
//! fixes at startup. Every field has a default, so a partial JSON file is
//! enough to override a single timeout.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PrintResult;

/// Printer queue names used by the 58mm thermal printers this kiosk ships
/// with, in match priority order.
pub const THERMAL_PRINTER_NAMES: &[&str] = &[
    "POS58 Printer",
    "POS-58",
    "POS 58",
    "EP58M",
    "EPPOS",
    "USB Receipt Printer",
    "Thermal Receipt Printer",
    "Generic / Text Only",
];

pub const DEFAULT_BAUD_RATE: u32 = 9600;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PrintConfig {
    /// Column count for 58mm paper.
    pub receipt_width: usize,
    /// Column count used by the direct-USB driver.
    pub direct_usb_width: usize,
    pub business_name: String,
    pub footer: String,
    pub default_baud_rate: u32,
    pub serial_probe_timeout_ms: u64,
    pub serial_write_timeout_ms: u64,
    pub raw_print_timeout_ms: u64,
    pub html_print_timeout_ms: u64,
    pub direct_usb_timeout_ms: u64,
    pub printer_enum_timeout_ms: u64,
    pub printer_enum_retries: u32,
    pub printer_enum_delay_ms: u64,
    pub thermal_printer_names: Vec<String>,
}

impl Default for PrintConfig {
    fn default() -> Self {
        Self {
            receipt_width: 32,
            direct_usb_width: 48,
            business_name: "Florist Kiosk".to_string(),
            footer: "Terima kasih".to_string(),
            default_baud_rate: DEFAULT_BAUD_RATE,
            serial_probe_timeout_ms: 3_000,
            serial_write_timeout_ms: 10_000,
            raw_print_timeout_ms: 8_000,
            html_print_timeout_ms: 10_000,
            direct_usb_timeout_ms: 10_000,
            printer_enum_timeout_ms: 2_000,
            printer_enum_retries: 5,
            printer_enum_delay_ms: 250,
            thermal_printer_names: THERMAL_PRINTER_NAMES
                .iter()
                .map(|name| name.to_string())
                .collect(),
        }
    }
}

impl PrintConfig {
    /// Load overrides from a JSON file. Fields absent from the file keep
    /// their defaults.
    pub fn from_json_file(path: &Path) -> PrintResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        info!(path = %path.display(), "Loaded print config");
        Ok(config)
    }

    pub fn serial_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.serial_probe_timeout_ms)
    }

    pub fn serial_write_timeout(&self) -> Duration {
        Duration::from_millis(self.serial_write_timeout_ms)
    }

    pub fn raw_print_timeout(&self) -> Duration {
        Duration::from_millis(self.raw_print_timeout_ms)
    }

    pub fn html_print_timeout(&self) -> Duration {
        Duration::from_millis(self.html_print_timeout_ms)
    }

    pub fn direct_usb_timeout(&self) -> Duration {
        Duration::from_millis(self.direct_usb_timeout_ms)
    }

    pub fn printer_enum_timeout(&self) -> Duration {
        Duration::from_millis(self.printer_enum_timeout_ms)
    }

    pub fn printer_enum_delay(&self) -> Duration {
        Duration::from_millis(self.printer_enum_delay_ms)
    }
}
