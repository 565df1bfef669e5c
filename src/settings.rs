//! Settings store consumed by the print core.
//!
//! The store itself belongs to the host application; the print core only
//! reads preferences at the start of each attempt and writes back devices
//! that auto-detection proved to work. Two implementations ship here: a
//! whole-file JSON store (one file per installation) and an in-memory map.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::DEFAULT_BAUD_RATE;
use crate::error::{PrintError, PrintResult};

pub const KEY_PREFERRED_PRINTER: &str = "preferredPrinterName";
pub const KEY_PREFERRED_SERIAL_PORT: &str = "preferredSerialPort";
pub const KEY_SERIAL_BAUD_RATE: &str = "serialBaudRate";
pub const KEY_PREFER_ESCPOS: &str = "preferEscPos";
pub const KEY_PREFER_ESCPOS_EVEN_ON_SUCCESS: &str = "preferEscPosEvenOnSuccess";
pub const KEY_PREFER_DIRECT_USB_POS58: &str = "preferDirectUsbForPOS58";

pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: &str, value: Value) -> PrintResult<()>;

    /// Merge several keys in one write.
    fn update(&self, updates: Map<String, Value>) -> PrintResult<()> {
        for (key, value) in updates {
            self.set(&key, value)?;
        }
        Ok(())
    }

    fn snapshot(&self) -> Map<String, Value>;
}

// ---------------------------------------------------------------------------
// JSON file store
// ---------------------------------------------------------------------------

/// Flat JSON object on disk, read and rewritten whole on every access.
///
/// No locking across processes; concurrent writers resolve last-writer-wins.
#[derive(Debug, Clone)]
pub struct JsonFileSettings {
    path: PathBuf,
}

impl JsonFileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Map<String, Value> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Map::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read settings");
                return Map::new();
            }
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!(path = %self.path.display(), "Settings file is not a JSON object");
                Map::new()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to parse settings");
                Map::new()
            }
        }
    }

    fn save(&self, map: &Map<String, Value>) -> PrintResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PrintError::Settings(format!("create settings dir: {e}")))?;
        }
        let body = serde_json::to_string_pretty(map)?;
        std::fs::write(&self.path, body)
            .map_err(|e| PrintError::Settings(format!("write {}: {e}", self.path.display())))?;
        Ok(())
    }
}

impl SettingsStore for JsonFileSettings {
    fn get(&self, key: &str) -> Option<Value> {
        self.load().remove(key).filter(|v| !v.is_null())
    }

    fn set(&self, key: &str, value: Value) -> PrintResult<()> {
        let mut map = self.load();
        map.insert(key.to_string(), value);
        self.save(&map)?;
        debug!(key, "Setting saved");
        Ok(())
    }

    fn update(&self, updates: Map<String, Value>) -> PrintResult<()> {
        let mut map = self.load();
        map.extend(updates);
        self.save(&map)
    }

    fn snapshot(&self) -> Map<String, Value> {
        self.load()
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemorySettings {
    map: Mutex<Map<String, Value>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: Map<String, Value>) -> Self {
        Self {
            map: Mutex::new(values),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Map<String, Value>> {
        self.map.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).filter(|v| !v.is_null()).cloned()
    }

    fn set(&self, key: &str, value: Value) -> PrintResult<()> {
        self.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn snapshot(&self) -> Map<String, Value> {
        self.lock().clone()
    }
}

// ---------------------------------------------------------------------------
// Typed view
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintModes {
    pub prefer_esc_pos: bool,
    pub prefer_esc_pos_even_on_success: bool,
    #[serde(rename = "preferDirectUsbForPOS58")]
    pub prefer_direct_usb_for_pos58: bool,
}

/// Partial update for [`PrintModes`]; `None` leaves the stored flag alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintModesUpdate {
    #[serde(default)]
    pub prefer_esc_pos: Option<bool>,
    #[serde(default)]
    pub prefer_esc_pos_even_on_success: Option<bool>,
    #[serde(default, rename = "preferDirectUsbForPOS58")]
    pub prefer_direct_usb_for_pos58: Option<bool>,
}

/// Snapshot of the print-related preferences, read once per attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintSettings {
    pub preferred_printer_name: Option<String>,
    pub preferred_serial_port: Option<String>,
    pub serial_baud_rate: u32,
    pub modes: PrintModes,
}

impl PrintSettings {
    pub fn load(store: &dyn SettingsStore) -> Self {
        Self {
            preferred_printer_name: text(store, KEY_PREFERRED_PRINTER),
            preferred_serial_port: text(store, KEY_PREFERRED_SERIAL_PORT),
            serial_baud_rate: baud_rate(store),
            modes: PrintModes {
                prefer_esc_pos: flag(store, KEY_PREFER_ESCPOS),
                prefer_esc_pos_even_on_success: flag(store, KEY_PREFER_ESCPOS_EVEN_ON_SUCCESS),
                prefer_direct_usb_for_pos58: flag(store, KEY_PREFER_DIRECT_USB_POS58),
            },
        }
    }
}

fn text(store: &dyn SettingsStore, key: &str) -> Option<String> {
    store
        .get(key)
        .and_then(|v| v.as_str().map(str::trim).map(ToString::to_string))
        .filter(|v| !v.is_empty())
}

/// Accepts booleans, 0/1 and "true"/"false" since older kiosks wrote strings.
fn flag(store: &dyn SettingsStore, key: &str) -> bool {
    match store.get(key) {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_i64().map(|v| v != 0).unwrap_or(false),
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        _ => false,
    }
}

fn baud_rate(store: &dyn SettingsStore) -> u32 {
    let parsed = match store.get(KEY_SERIAL_BAUD_RATE) {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .filter(|v| *v > 0)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(DEFAULT_BAUD_RATE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_file_round_trips_whole_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSettings::new(dir.path().join("nested").join("settings.json"));

        assert!(store.get(KEY_PREFERRED_PRINTER).is_none());
        store.set(KEY_PREFERRED_PRINTER, json!("POS58 Printer")).unwrap();
        store.set(KEY_SERIAL_BAUD_RATE, json!(19200)).unwrap();

        let reopened = JsonFileSettings::new(store.path().to_path_buf());
        assert_eq!(reopened.get(KEY_PREFERRED_PRINTER), Some(json!("POS58 Printer")));
        assert_eq!(reopened.snapshot().len(), 2);
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonFileSettings::new(&path);
        assert!(store.snapshot().is_empty());
        store.set(KEY_PREFER_ESCPOS, json!(true)).unwrap();
        assert_eq!(store.get(KEY_PREFER_ESCPOS), Some(json!(true)));
    }

    #[test]
    fn update_merges_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSettings::new(dir.path().join("settings.json"));
        store.set("unrelated", json!("keep")).unwrap();

        let mut updates = Map::new();
        updates.insert(KEY_PREFERRED_SERIAL_PORT.into(), json!("COM3"));
        updates.insert(KEY_SERIAL_BAUD_RATE.into(), json!(115200));
        store.update(updates).unwrap();

        let snap = store.snapshot();
        assert_eq!(snap["unrelated"], json!("keep"));
        assert_eq!(snap[KEY_PREFERRED_SERIAL_PORT], json!("COM3"));
    }

    #[test]
    fn memory_store_seeded_from_a_file_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFileSettings::new(dir.path().join("settings.json"));
        file.set(KEY_PREFERRED_PRINTER, json!("POS58 Printer")).unwrap();
        file.set(KEY_PREFERRED_SERIAL_PORT, Value::Null).unwrap();
        file.set(KEY_PREFER_ESCPOS, json!(true)).unwrap();

        let memory = MemorySettings::with_values(file.snapshot());
        assert!(memory.get(KEY_PREFERRED_SERIAL_PORT).is_none());
        assert_eq!(PrintSettings::load(&memory), PrintSettings::load(&file));

        memory.set(KEY_PREFERRED_PRINTER, json!("EP58M")).unwrap();
        assert_eq!(file.get(KEY_PREFERRED_PRINTER), Some(json!("POS58 Printer")));
    }

    #[test]
    fn typed_view_applies_defaults() {
        let store = MemorySettings::new();
        let s = PrintSettings::load(&store);
        assert_eq!(s.serial_baud_rate, 9600);
        assert!(s.preferred_printer_name.is_none());
        assert_eq!(s.modes, PrintModes::default());
    }

    #[test]
    fn typed_view_tolerates_legacy_encodings() {
        let store = MemorySettings::new();
        store.set(KEY_PREFERRED_SERIAL_PORT, json!("  COM4 ")).unwrap();
        store.set(KEY_SERIAL_BAUD_RATE, json!("38400")).unwrap();
        store.set(KEY_PREFER_ESCPOS, json!("true")).unwrap();
        store.set(KEY_PREFER_DIRECT_USB_POS58, json!(1)).unwrap();
        store.set(KEY_PREFERRED_PRINTER, json!("")).unwrap();

        let s = PrintSettings::load(&store);
        assert_eq!(s.preferred_serial_port.as_deref(), Some("COM4"));
        assert_eq!(s.serial_baud_rate, 38400);
        assert!(s.modes.prefer_esc_pos);
        assert!(s.modes.prefer_direct_usb_for_pos58);
        assert!(!s.modes.prefer_esc_pos_even_on_success);
        assert!(s.preferred_printer_name.is_none());
    }

    #[test]
    fn modes_serialize_with_ui_field_names() {
        let modes = PrintModes {
            prefer_esc_pos: true,
            prefer_esc_pos_even_on_success: false,
            prefer_direct_usb_for_pos58: true,
        };
        let v = serde_json::to_value(modes).unwrap();
        assert_eq!(v["preferEscPos"], json!(true));
        assert_eq!(v["preferDirectUsbForPOS58"], json!(true));
    }
}
