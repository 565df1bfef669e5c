use serde_json::{json, Value};
use tracing::warn;

use super::{payload_arg0_as_string, payload_bool, payload_string, to_value};
use crate::orchestrator::PrintOrchestrator;
use crate::payload::PrintPayload;

/// The receipt may arrive bare or wrapped as `{ "payload": {...} }`.
fn parse_payload(arg0: Option<&Value>) -> Result<PrintPayload, String> {
    let value = arg0.ok_or("Missing print payload")?;
    let inner = match value.get("payload") {
        Some(inner @ Value::Object(_)) => inner,
        _ => value,
    };
    if !inner.is_object() {
        return Err("Print payload must be an object".into());
    }
    serde_json::from_value(inner.clone()).map_err(|e| {
        warn!(error = %e, "Rejected print payload");
        format!("Invalid print payload: {e}")
    })
}

pub async fn print_auto(orch: &PrintOrchestrator, arg0: Option<Value>) -> Result<Value, String> {
    let payload = parse_payload(arg0.as_ref())?;
    to_value(&orch.auto_print(&payload).await)
}

pub async fn print_manual(orch: &PrintOrchestrator, arg0: Option<Value>) -> Result<Value, String> {
    let payload = parse_payload(arg0.as_ref())?;
    to_value(&orch.manual_print(&payload).await)
}

/// `arg1` names the port or printer; `target` inside the argument object is
/// accepted as well.
pub async fn print_direct(
    orch: &PrintOrchestrator,
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> Result<Value, String> {
    let payload = parse_payload(arg0.as_ref())?;
    let target = payload_arg0_as_string(arg1.as_ref(), &["target", "portPath", "printerName"])
        .or_else(|| {
            arg0.as_ref()
                .and_then(|v| payload_string(v, &["target"]))
        })
        .ok_or("Missing print target")?;
    to_value(&orch.direct_print(&payload, &target).await)
}

pub async fn print_receipt(orch: &PrintOrchestrator, arg0: Option<Value>) -> Result<Value, String> {
    let payload = parse_payload(arg0.as_ref())?;
    let force_escpos = arg0
        .as_ref()
        .and_then(|v| payload_bool(v, &["forceEscPos", "useEscPos"]))
        .unwrap_or(false);
    to_value(&orch.print_receipt(&payload, force_escpos).await)
}

pub async fn print_test(orch: &PrintOrchestrator, arg0: Option<Value>) -> Result<Value, String> {
    let printer = payload_arg0_as_string(arg0.as_ref(), &["printerName", "deviceName", "printer"]);
    to_value(&orch.test_print(printer.as_deref()).await)
}

pub async fn print_diagnostics(orch: &PrintOrchestrator) -> Result<Value, String> {
    let report = orch.diagnostics().await;
    Ok(json!({
        "success": true,
        "diagnostics": to_value(&report)?,
    }))
}
