//! Serial port auto-detection for the receipt printer.
//!
//! Enumerated ports are ranked by an ordered rule list, Bluetooth ports are
//! dropped, and the survivors are probed in rank order. The first port the
//! OS lets us open wins; when none opens, the best-ranked one is returned
//! anyway since some drivers refuse a probe open but still accept jobs.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::serial::{probe_port, PortKind, SerialBackend, SerialPortCandidate};

/// Lower ranks are probed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PortRank {
    UsbBridge,
    PrinterModel,
    GenericUsb,
    PrinterVocabulary,
    StandardPort,
}

/// Lowercased view of a candidate used by the rule predicates.
#[derive(Debug, Clone, Default)]
pub struct PortFacts {
    pub path: String,
    pub name: String,
    pub manufacturer: String,
    pub vendor_id: String,
}

impl PortFacts {
    pub fn of(candidate: &SerialPortCandidate) -> Self {
        let lower = |v: &Option<String>| v.as_deref().unwrap_or_default().to_lowercase();
        Self {
            path: candidate.path.to_lowercase(),
            name: lower(&candidate.friendly_name),
            manufacturer: lower(&candidate.manufacturer),
            vendor_id: lower(&candidate.vendor_id),
        }
    }

    fn describes(&self, tokens: &[&str]) -> bool {
        tokens
            .iter()
            .any(|t| self.name.contains(t) || self.manufacturer.contains(t))
    }
}

pub struct PortRule {
    pub rank: PortRank,
    pub label: &'static str,
    matches: fn(&PortFacts) -> bool,
}

impl PortRule {
    pub fn matches(&self, facts: &PortFacts) -> bool {
        (self.matches)(facts)
    }
}

const BRIDGE_CHIPS: &[&str] = &["usb serial", "usb-serial", "ftdi", "ch340", "cp210x", "pl2303"];
/// FTDI, QinHeng (CH340), Silicon Labs (CP210x), Prolific (PL2303).
const BRIDGE_VENDOR_IDS: &[&str] = &["0403", "1a86", "10c4", "067b"];
const PRINTER_MODELS: &[&str] = &["pos58", "pos 58", "pos-58", "ep58"];
const PRINTER_WORDS: &[&str] = &[
    "thermal",
    "epson",
    "printer",
    "pos",
    "receipt",
    "dot matrix",
    "line printing",
];
const EXCLUDED: &[&str] = &["bluetooth", "rfcomm"];

/// Evaluated top to bottom; the first matching rule sets the rank.
pub const PORT_RULES: &[PortRule] = &[
    PortRule {
        rank: PortRank::UsbBridge,
        label: "usb-serial bridge",
        matches: usb_bridge,
    },
    PortRule {
        rank: PortRank::PrinterModel,
        label: "printer model",
        matches: printer_model,
    },
    PortRule {
        rank: PortRank::GenericUsb,
        label: "usb",
        matches: generic_usb,
    },
    PortRule {
        rank: PortRank::PrinterVocabulary,
        label: "printer vocabulary",
        matches: printer_vocabulary,
    },
    PortRule {
        rank: PortRank::StandardPort,
        label: "standard port",
        matches: standard_port,
    },
];

fn usb_bridge(f: &PortFacts) -> bool {
    f.path.contains("usb009")
        || f.path.contains("ttyusb")
        || (is_com_port(&f.path) && f.name.contains("usb"))
        || f.describes(BRIDGE_CHIPS)
        || BRIDGE_VENDOR_IDS.contains(&f.vendor_id.as_str())
}

fn printer_model(f: &PortFacts) -> bool {
    f.describes(PRINTER_MODELS)
}

fn generic_usb(f: &PortFacts) -> bool {
    f.path.contains("usb") || f.name.contains("usb")
}

fn printer_vocabulary(f: &PortFacts) -> bool {
    f.describes(PRINTER_WORDS)
}

fn standard_port(f: &PortFacts) -> bool {
    is_low_com_port(&f.path) || is_linux_usb_tty(&f.path)
}

fn digits_after<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    path.strip_prefix(prefix)
        .filter(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

fn is_com_port(path: &str) -> bool {
    digits_after(path, "com").is_some()
}

/// COM1 through COM9.
fn is_low_com_port(path: &str) -> bool {
    matches!(digits_after(path, "com"), Some(d) if d.len() == 1 && d != "0")
}

fn is_linux_usb_tty(path: &str) -> bool {
    digits_after(path, "/dev/ttyusb").is_some() || digits_after(path, "/dev/ttyacm").is_some()
}

pub fn is_excluded(candidate: &SerialPortCandidate) -> bool {
    let facts = PortFacts::of(candidate);
    candidate.kind == PortKind::Bluetooth
        || EXCLUDED
            .iter()
            .any(|t| facts.name.contains(t) || facts.path.contains(t))
}

/// Rank of a candidate, or `None` when it is excluded or matches no rule.
pub fn rank(candidate: &SerialPortCandidate) -> Option<PortRank> {
    if is_excluded(candidate) {
        return None;
    }
    let facts = PortFacts::of(candidate);
    PORT_RULES.iter().find(|r| r.matches(&facts)).map(|r| r.rank)
}

/// Drop unranked ports and sort the rest by rank, keeping enumeration order
/// among equal ranks.
pub fn rank_candidates(ports: Vec<SerialPortCandidate>) -> Vec<(PortRank, SerialPortCandidate)> {
    let mut ranked: Vec<_> = ports
        .into_iter()
        .filter_map(|c| match rank(&c) {
            Some(r) => Some((r, c)),
            None => {
                debug!(port = %c.path, "Skipping serial port");
                None
            }
        })
        .collect();
    ranked.sort_by_key(|(r, _)| *r);
    ranked
}

#[derive(Clone)]
pub struct SerialPortDetector {
    backend: Arc<dyn SerialBackend>,
    baud_rate: u32,
    probe_timeout: Duration,
}

impl SerialPortDetector {
    pub fn new(backend: Arc<dyn SerialBackend>, baud_rate: u32, probe_timeout: Duration) -> Self {
        Self {
            backend,
            baud_rate,
            probe_timeout,
        }
    }

    /// Best port for the receipt printer, or `None` when nothing qualifies.
    pub async fn detect(&self) -> Option<String> {
        let ports = match self.backend.list_ports() {
            Ok(ports) => ports,
            Err(e) => {
                warn!(error = %e, "Serial port enumeration failed");
                return None;
            }
        };
        info!(count = ports.len(), "Scanning serial ports for receipt printer");

        let ranked = rank_candidates(ports);
        let Some((_, best)) = ranked.first() else {
            info!("No candidate serial ports");
            return None;
        };
        let fallback = best.path.clone();

        for (rank, candidate) in &ranked {
            match probe_port(
                self.backend.clone(),
                &candidate.path,
                self.baud_rate,
                self.probe_timeout,
            )
            .await
            {
                Ok(()) => {
                    info!(port = %candidate.path, rank = ?rank, "Serial port responded to open");
                    return Some(candidate.path.clone());
                }
                Err(e) => {
                    debug!(port = %candidate.path, error = %e, "Serial probe failed");
                }
            }
        }

        warn!(port = %fallback, "No serial port opened, using best-ranked candidate");
        Some(fallback)
    }
}
