use serde_json::{json, Value};

use super::to_value;
use crate::orchestrator::PrintOrchestrator;

pub async fn serial_list_ports(orch: &PrintOrchestrator) -> Result<Value, String> {
    let ports = orch.list_serial_ports().map_err(|e| e.to_string())?;
    Ok(json!({
        "success": true,
        "ports": to_value(&ports)?,
    }))
}

pub async fn printer_list_system_printers(orch: &PrintOrchestrator) -> Result<Value, String> {
    let printers = orch.list_printers().await.map_err(|e| e.to_string())?;
    Ok(json!({
        "success": true,
        "printers": to_value(&printers)?,
    }))
}

/// A miss is not an error: `printerName` is `null` and `success` is false.
pub async fn printer_detect_thermal(orch: &PrintOrchestrator) -> Result<Value, String> {
    let found = orch.detect_thermal_printer().await;
    Ok(json!({
        "success": found.is_some(),
        "printerName": found,
    }))
}
