//! Serial port access for the ESC/POS transport.
//!
//! The OS layer sits behind [`SerialBackend`] / [`SerialLink`] so the
//! orchestrator and the port detector can be driven without hardware.
//! Blocking calls run on the blocking pool and are raced against a
//! `tokio::time::timeout` that also cancels them; every opened link is held by a [`ScopedLink`],
//! which closes it on all exit paths and discards close errors.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cancel::{spawn_cancellable, CancelFlag};
use crate::error::{PrintError, PrintResult};

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    Usb,
    Bluetooth,
    Pci,
    Unknown,
}

/// One OS-enumerated serial port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialPortCandidate {
    pub path: String,
    #[serde(default)]
    pub friendly_name: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    /// Four lowercase hex digits, e.g. `"1a86"`.
    #[serde(default)]
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    pub kind: PortKind,
}

impl SerialPortCandidate {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            friendly_name: None,
            manufacturer: None,
            vendor_id: None,
            product_id: None,
            kind: PortKind::Unknown,
        }
    }

    pub fn with_friendly_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = Some(name.into());
        self
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vendor_id = Some(format!("{vid:04x}"));
        self.product_id = Some(format!("{pid:04x}"));
        self.kind = PortKind::Usb;
        self
    }

    pub fn with_kind(mut self, kind: PortKind) -> Self {
        self.kind = kind;
        self
    }
}

impl From<serialport::SerialPortInfo> for SerialPortCandidate {
    fn from(info: serialport::SerialPortInfo) -> Self {
        let candidate = SerialPortCandidate::new(info.port_name);
        match info.port_type {
            serialport::SerialPortType::UsbPort(usb) => {
                let mut c = candidate.with_usb_ids(usb.vid, usb.pid);
                c.friendly_name = usb.product;
                c.manufacturer = usb.manufacturer;
                c
            }
            serialport::SerialPortType::BluetoothPort => candidate.with_kind(PortKind::Bluetooth),
            serialport::SerialPortType::PciPort => candidate.with_kind(PortKind::Pci),
            serialport::SerialPortType::Unknown => candidate,
        }
    }
}

// ---------------------------------------------------------------------------
// Backend traits
// ---------------------------------------------------------------------------

/// An open serial handle.
pub trait SerialLink: Send {
    fn write_all(&mut self, data: &[u8]) -> PrintResult<()>;

    /// Block until the OS has transmitted everything written so far.
    fn drain(&mut self) -> PrintResult<()>;

    fn close(self: Box<Self>) -> PrintResult<()>;
}

pub trait SerialBackend: Send + Sync {
    fn list_ports(&self) -> PrintResult<Vec<SerialPortCandidate>>;

    fn open(&self, path: &str, baud_rate: u32, timeout: Duration) -> PrintResult<Box<dyn SerialLink>>;
}

// ---------------------------------------------------------------------------
// OS implementation
// ---------------------------------------------------------------------------

/// [`SerialBackend`] over the `serialport` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSerial;

struct SystemLink {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialLink for SystemLink {
    fn write_all(&mut self, data: &[u8]) -> PrintResult<()> {
        self.port
            .write_all(data)
            .map_err(|e| PrintError::Serial(format!("write failed: {e}")))
    }

    fn drain(&mut self) -> PrintResult<()> {
        self.port
            .flush()
            .map_err(|e| PrintError::Serial(format!("drain failed: {e}")))
    }

    fn close(self: Box<Self>) -> PrintResult<()> {
        drop(self.port);
        Ok(())
    }
}

impl SerialBackend for SystemSerial {
    fn list_ports(&self) -> PrintResult<Vec<SerialPortCandidate>> {
        let ports = serialport::available_ports()
            .map_err(|e| PrintError::Serial(format!("failed to list ports: {e}")))?;
        Ok(ports.into_iter().map(SerialPortCandidate::from).collect())
    }

    fn open(&self, path: &str, baud_rate: u32, timeout: Duration) -> PrintResult<Box<dyn SerialLink>> {
        let port = serialport::new(path, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|e| PrintError::Serial(format!("failed to open {path} @ {baud_rate}: {e}")))?;
        Ok(Box::new(SystemLink { port }))
    }
}

// ---------------------------------------------------------------------------
// Scoped handle
// ---------------------------------------------------------------------------

/// Owns an open link and closes it when dropped.
pub struct ScopedLink {
    link: Option<Box<dyn SerialLink>>,
    path: String,
}

impl ScopedLink {
    pub fn new(link: Box<dyn SerialLink>, path: impl Into<String>) -> Self {
        Self {
            link: Some(link),
            path: path.into(),
        }
    }

    fn link(&mut self) -> PrintResult<&mut Box<dyn SerialLink>> {
        self.link
            .as_mut()
            .ok_or_else(|| PrintError::Serial(format!("{} already closed", self.path)))
    }

    pub fn write_all(&mut self, data: &[u8]) -> PrintResult<()> {
        self.link()?.write_all(data)
    }

    pub fn drain(&mut self) -> PrintResult<()> {
        self.link()?.drain()
    }
}

impl Drop for ScopedLink {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            if let Err(e) = link.close() {
                debug!(port = %self.path, error = %e, "Ignoring serial close error");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Bounded operations
// ---------------------------------------------------------------------------

async fn run_bounded<T, F>(operation: &'static str, after: Duration, f: F) -> PrintResult<T>
where
    T: Send + 'static,
    F: FnOnce(CancelFlag) -> PrintResult<T> + Send + 'static,
{
    match tokio::time::timeout(after, spawn_cancellable(f)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(PrintError::Serial(format!("{operation} task failed: {join}"))),
        Err(_) => Err(PrintError::timeout(operation, after)),
    }
}

/// Time left before `deadline`, never zero so the driver still gets a
/// usable I/O timeout.
fn remaining(deadline: Instant) -> Duration {
    deadline
        .saturating_duration_since(Instant::now())
        .max(Duration::from_millis(1))
}

/// Open `path` and close it again. Success means the OS handed out a handle,
/// nothing more: thermal printers do not answer identification queries.
pub async fn probe_port(
    backend: Arc<dyn SerialBackend>,
    path: &str,
    baud_rate: u32,
    after: Duration,
) -> PrintResult<()> {
    let owned = path.to_string();
    let deadline = Instant::now() + after;
    run_bounded("serial probe", after, move |_cancel| {
        let link = backend.open(&owned, baud_rate, remaining(deadline))?;
        drop(ScopedLink::new(link, owned));
        Ok(())
    })
    .await
}

/// Open, write, drain, close. Open, write and drain share one deadline.
/// Once the deadline passes nothing more is sent: a port that opens late is
/// closed without being written to.
pub async fn write_to_port(
    backend: Arc<dyn SerialBackend>,
    path: &str,
    baud_rate: u32,
    data: Vec<u8>,
    after: Duration,
) -> PrintResult<()> {
    let owned = path.to_string();
    let len = data.len();
    let deadline = Instant::now() + after;
    run_bounded("serial write", after, move |cancel| {
        let link = backend.open(&owned, baud_rate, remaining(deadline))?;
        let mut link = ScopedLink::new(link, owned);
        cancel.check("serial write")?;
        link.write_all(&data)?;
        cancel.check("serial drain")?;
        link.drain()
    })
    .await?;
    info!(port = %path, baud = baud_rate, bytes = len, "ESC/POS data written");
    Ok(())
}
