//! Print payload and transport result types shared by every transport.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptItem {
    pub name: String,
    #[serde(default = "one")]
    pub quantity: u32,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub details: Vec<String>,
}

fn one() -> u32 {
    1
}

impl ReceiptItem {
    pub fn new(name: impl Into<String>, quantity: u32, price: f64) -> Self {
        Self {
            name: name.into(),
            quantity,
            price,
            details: Vec::new(),
        }
    }

    /// Quantity as printed; a zero quantity from a sloppy caller counts as one.
    pub fn effective_quantity(&self) -> u32 {
        self.quantity.max(1)
    }

    pub fn subtotal(&self) -> f64 {
        self.price * f64::from(self.effective_quantity())
    }

    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            "Item"
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Buyer {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryType {
    Pickup,
    Delivery,
}

impl DeliveryType {
    pub fn label(self) -> &'static str {
        match self {
            DeliveryType::Pickup => "Ambil di tempat",
            DeliveryType::Delivery => "Antar ke alamat",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    #[serde(rename = "type", default)]
    pub kind: Option<DeliveryType>,
    #[serde(default)]
    pub address: Option<String>,
    /// Local datetime as sent by the checkout form (`YYYY-MM-DDTHH:MM`).
    #[serde(default)]
    pub datetime: Option<String>,
}

/// One receipt to print. Immutable for the duration of a print call; each
/// transport formats its own output from it.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrintPayload {
    #[serde(default, deserialize_with = "string_or_number")]
    pub order_id: String,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub items: Vec<ReceiptItem>,

    #[serde(default)]
    pub business_name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub whatsapp: Option<String>,
    #[serde(default)]
    pub instagram: Option<String>,

    #[serde(default)]
    pub buyer: Option<Buyer>,
    #[serde(default)]
    pub recipient: Option<Recipient>,
    #[serde(default)]
    pub delivery: Option<Delivery>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default, alias = "notes")]
    pub customer_notes: Option<String>,

    #[serde(default)]
    pub width: Option<usize>,
    #[serde(default)]
    pub cut: Option<bool>,
    #[serde(default)]
    pub drawer: Option<bool>,

    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub port_path: Option<String>,
    #[serde(default)]
    pub baud_rate: Option<u32>,
}

impl PrintPayload {
    pub fn width_or(&self, default: usize) -> usize {
        self.width.filter(|w| *w > 0).unwrap_or(default)
    }

    pub fn should_cut(&self) -> bool {
        self.cut.unwrap_or(true)
    }

    pub fn should_kick_drawer(&self) -> bool {
        self.drawer.unwrap_or(false)
    }

    pub fn device_name(&self) -> Option<&str> {
        non_empty(self.device_name.as_deref())
    }

    pub fn port_path(&self) -> Option<&str> {
        non_empty(self.port_path.as_deref())
    }
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Order ids arrive as either `"T1"` or `42` depending on the checkout path.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(s)) => s,
        Some(Raw::Int(n)) => n.to_string(),
        Some(Raw::Float(n)) => n.to_string(),
        None => String::new(),
    })
}

// ---------------------------------------------------------------------------
// Transport result
// ---------------------------------------------------------------------------

/// Identifier of the transport that produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PrintMode {
    RawText,
    EscposSerial,
    HtmlSilent,
    ManualDialog,
    DirectUsb,
    /// Outcome of the escalation as a whole (no transport succeeded).
    Auto,
}

impl PrintMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PrintMode::RawText => "raw-text",
            PrintMode::EscposSerial => "escpos-serial",
            PrintMode::HtmlSilent => "html-silent",
            PrintMode::ManualDialog => "manual-dialog",
            PrintMode::DirectUsb => "direct-usb",
            PrintMode::Auto => "auto",
        }
    }
}

impl fmt::Display for PrintMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub mode: PrintMode,
    pub message: String,
}

/// Outcome of a transport attempt or of a whole dispatch call.
///
/// Built only through [`TransportResult::ok`] and [`TransportResult::failed`]
/// so that a success always names its device and a failure always carries a
/// message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransportResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    pub mode: PrintMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Set when the transport reported success but paper output is unconfirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// 1-based escalation step, only within `auto_print`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<AttemptRecord>,
}

impl TransportResult {
    pub fn ok(mode: PrintMode, device: impl Into<String>) -> Self {
        Self {
            success: true,
            device: Some(device.into()),
            mode,
            message: None,
            warning: None,
            step: None,
            attempts: Vec::new(),
        }
    }

    pub fn failed(mode: PrintMode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            device: None,
            mode,
            message: Some(message.into()),
            warning: None,
            step: None,
            attempts: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    pub fn with_step(mut self, step: u8) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_attempts(mut self, attempts: Vec<AttemptRecord>) -> Self {
        self.attempts = attempts;
        self
    }

    /// Failure message, or an empty string for successes.
    pub fn message_or_default(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}
