use serde_json::{json, Value};
use tracing::info;

use super::{payload_arg0_as_string, payload_u32, to_value};
use crate::orchestrator::PrintOrchestrator;
use crate::settings::PrintModesUpdate;

pub async fn print_modes_get(orch: &PrintOrchestrator) -> Result<Value, String> {
    Ok(json!({
        "success": true,
        "modes": to_value(&orch.get_print_modes())?,
    }))
}

pub async fn print_modes_set(orch: &PrintOrchestrator, arg0: Option<Value>) -> Result<Value, String> {
    let payload = arg0.ok_or("Missing print modes payload")?;
    let update: PrintModesUpdate =
        serde_json::from_value(payload).map_err(|e| format!("Invalid print modes: {e}"))?;
    let modes = orch.set_print_modes(update).map_err(|e| e.to_string())?;
    Ok(json!({
        "success": true,
        "modes": to_value(&modes)?,
    }))
}

pub async fn serial_get_preferred(orch: &PrintOrchestrator) -> Result<Value, String> {
    let preferred = orch.get_preferred_serial_port().await;
    let mut out = to_value(&preferred)?;
    out["success"] = json!(true);
    Ok(out)
}

/// `null`, an empty string or a missing path clears the saved port.
pub async fn serial_set_preferred(orch: &PrintOrchestrator, arg0: Option<Value>) -> Result<Value, String> {
    let path = payload_arg0_as_string(arg0.as_ref(), &["path", "portPath", "port"]);
    let baud_rate = arg0
        .as_ref()
        .and_then(|v| payload_u32(v, &["baudRate", "baud_rate"]));
    orch.set_preferred_serial_port(path.as_deref(), baud_rate)
        .map_err(|e| e.to_string())?;
    info!(port = ?path, baud = ?baud_rate, "Preferred serial port updated");
    Ok(json!({ "success": true, "path": path }))
}

pub async fn printer_get_preferred(orch: &PrintOrchestrator) -> Result<Value, String> {
    Ok(json!({
        "success": true,
        "printerName": orch.get_preferred_printer(),
    }))
}

/// `null`, an empty string or a missing name clears the saved printer.
pub async fn printer_set_preferred(orch: &PrintOrchestrator, arg0: Option<Value>) -> Result<Value, String> {
    let name = payload_arg0_as_string(arg0.as_ref(), &["printerName", "name", "deviceName"]);
    orch.set_preferred_printer(name.as_deref())
        .map_err(|e| e.to_string())?;
    info!(printer = ?name, "Preferred printer updated");
    Ok(json!({ "success": true, "printerName": name }))
}
