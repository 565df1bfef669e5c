//! JSON bridge for the UI layer.
//!
//! Every command takes the raw invoke argument (`arg0`) and answers with a
//! JSON object carrying `success`. Print commands always answer `Ok`; a failed
//! print is a `TransportResult` with `success: false`, not an `Err`.

pub mod hardware;
pub mod print;
pub mod settings;

use serde::Serialize;
use serde_json::Value;

pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn value_to_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    }
}

pub(crate) fn value_to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        _ => None,
    }
}

pub(crate) fn payload_string(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| payload.get(*key).and_then(value_to_string))
}

pub(crate) fn payload_u32(payload: &Value, keys: &[&str]) -> Option<u32> {
    keys.iter().find_map(|key| payload.get(*key).and_then(value_to_u32))
}

pub(crate) fn payload_bool(payload: &Value, keys: &[&str]) -> Option<bool> {
    keys.iter()
        .find_map(|key| payload.get(*key).and_then(value_to_bool))
}

/// A bare string argument, or the first non-empty `keys` entry of an object.
pub(crate) fn payload_arg0_as_string(arg0: Option<&Value>, keys: &[&str]) -> Option<String> {
    match arg0? {
        Value::String(_) => arg0.and_then(value_to_string),
        obj @ Value::Object(_) => payload_string(obj, keys),
        _ => None,
    }
}

pub(crate) fn to_value<T: Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| format!("serialize response: {e}"))
}
