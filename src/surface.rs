//! Off-screen HTML rendering and printing.
//!
//! A successful return from [`RenderSurface::print_html`] only means the OS
//! accepted the job. Nothing reports whether paper actually fed, so callers
//! attach a reliability warning to HTML results.

use std::io::Write;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::cancel::spawn_cancellable;
use crate::error::{PrintError, PrintResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlPrintRequest {
    /// Target queue. Required for silent jobs; the dialog lets the operator pick.
    pub device_name: Option<String>,
    pub silent: bool,
}

impl HtmlPrintRequest {
    pub fn silent(device: impl Into<String>) -> Self {
        Self {
            device_name: Some(device.into()),
            silent: true,
        }
    }

    pub fn dialog(device: Option<String>) -> Self {
        Self {
            device_name: device,
            silent: false,
        }
    }
}

#[async_trait]
pub trait RenderSurface: Send + Sync {
    async fn print_html(&self, html: &str, request: &HtmlPrintRequest) -> PrintResult<()>;

    /// Whether silent requests can succeed at all. Reported by diagnostics.
    fn supports_silent(&self) -> bool {
        true
    }
}

/// The surface available without a host renderer.
///
/// Spoolers take bytes, not layouts: a queue handed an `.html` file prints
/// the markup itself. Silent jobs therefore fail as unavailable until the
/// host injects a real renderer. Dialog jobs write the document to a kept
/// temporary file and open it in the default browser, where the embedded
/// script raises the print dialog.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserSurface;

fn write_document(html: &str) -> PrintResult<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("receipt-")
        .suffix(".html")
        .tempfile()
        .map_err(|e| PrintError::Render(format!("create render file: {e}")))?;
    file.write_all(html.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| PrintError::Render(format!("write render file: {e}")))?;
    Ok(file)
}

#[async_trait]
impl RenderSurface for BrowserSurface {
    async fn print_html(&self, html: &str, request: &HtmlPrintRequest) -> PrintResult<()> {
        if request.silent {
            debug!(device = ?request.device_name, "No silent HTML renderer installed");
            return Err(PrintError::Unavailable("silent HTML render surface".into()));
        }

        let path = write_document(html)?
            .into_temp_path()
            .keep()
            .map_err(|e| PrintError::Render(format!("keep render file: {e}")))?;
        let target = path.to_string_lossy().into_owned();
        spawn_cancellable(move |cancel| {
            cancel.check("print dialog")?;
            webbrowser::open(&target).map_err(|e| PrintError::Unavailable(format!("print dialog ({e})")))
        })
        .await
        .map_err(|e| PrintError::Render(format!("dialog task failed: {e}")))??;
        info!(file = %path.display(), "Print dialog opened");
        Ok(())
    }

    fn supports_silent(&self) -> bool {
        false
    }
}
