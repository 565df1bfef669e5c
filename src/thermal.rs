//! Direct-USB thermal printer driver.
//!
//! A small command-buffer API in the style of the vendor thermal SDKs:
//! alignment, emphasis, ruled lines and fractional-width tables are
//! accumulated as ESC/POS and sent to the printer's spool queue as one raw
//! job on [`ThermalPrinter::execute`]. The queue is addressed with an
//! interface string of the form `printer:NAME`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{PrintError, PrintResult};
use crate::escpos::{EscPosBuilder, CODE_PAGE_CP437};
use crate::formatters::sanitize_for_escpos;
use crate::payload::PrintPayload;
use crate::printers::PrinterBackend;
use crate::receipt_renderer::{RenderContext, ReceiptView};

pub const INTERFACE_PREFIX: &str = "printer:";
pub const DEFAULT_LINE_CHAR: char = '=';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableCell {
    pub text: String,
    pub align: Align,
    /// Fraction of the paper width, `0.0..=1.0`.
    pub width: f32,
}

impl TableCell {
    pub fn new(text: impl Into<String>, align: Align, width: f32) -> Self {
        Self {
            text: text.into(),
            align,
            width,
        }
    }
}

/// `"POS58 Printer"` and `"printer:POS58 Printer"` both address the same queue.
pub fn interface_for(printer: &str) -> String {
    if printer.starts_with(INTERFACE_PREFIX) {
        printer.to_string()
    } else {
        format!("{INTERFACE_PREFIX}{printer}")
    }
}

fn layout_cell(cell: &TableCell, columns: usize) -> String {
    let text: String = sanitize_for_escpos(&cell.text).chars().take(columns).collect();
    let pad = columns - text.chars().count();
    match cell.align {
        Align::Left => format!("{text}{}", " ".repeat(pad)),
        Align::Right => format!("{}{text}", " ".repeat(pad)),
        Align::Center => {
            let left = pad / 2;
            format!("{}{text}{}", " ".repeat(left), " ".repeat(pad - left))
        }
    }
}

pub struct ThermalPrinter {
    backend: Arc<dyn PrinterBackend>,
    printer_name: String,
    line_char: char,
    builder: EscPosBuilder,
}

impl ThermalPrinter {
    /// Fails with [`PrintError::NoTarget`] when the interface names no queue.
    pub fn new(backend: Arc<dyn PrinterBackend>, interface: &str, width: usize) -> PrintResult<Self> {
        let printer_name = interface
            .strip_prefix(INTERFACE_PREFIX)
            .unwrap_or(interface)
            .trim()
            .to_string();
        if printer_name.is_empty() {
            return Err(PrintError::NoTarget(format!("bad printer interface '{interface}'")));
        }
        let mut builder = EscPosBuilder::new(width);
        builder.init().code_page(CODE_PAGE_CP437);
        Ok(Self {
            backend,
            printer_name,
            line_char: DEFAULT_LINE_CHAR,
            builder,
        })
    }

    pub fn with_line_char(mut self, ch: char) -> Self {
        self.line_char = ch;
        self
    }

    pub fn printer_name(&self) -> &str {
        &self.printer_name
    }

    pub fn width(&self) -> usize {
        self.builder.width()
    }

    pub fn align_left(&mut self) -> &mut Self {
        self.builder.left();
        self
    }

    pub fn align_center(&mut self) -> &mut Self {
        self.builder.center();
        self
    }

    pub fn align_right(&mut self) -> &mut Self {
        self.builder.right();
        self
    }

    pub fn bold(&mut self, on: bool) -> &mut Self {
        self.builder.bold(on);
        self
    }

    pub fn println(&mut self, text: &str) -> &mut Self {
        self.builder.line(&sanitize_for_escpos(text));
        self
    }

    pub fn new_line(&mut self) -> &mut Self {
        self.builder.lf();
        self
    }

    pub fn draw_line(&mut self) -> &mut Self {
        let rule: String = std::iter::repeat(self.line_char).take(self.width()).collect();
        self.builder.line(&rule);
        self
    }

    /// One row of fixed columns. Column widths are floored fractions of the
    /// paper width; cell text longer than its column is cut.
    pub fn table_custom(&mut self, cells: &[TableCell]) -> &mut Self {
        let width = self.width();
        let row: String = cells
            .iter()
            .map(|cell| {
                let columns = (width as f32 * cell.width.clamp(0.0, 1.0)).floor() as usize;
                layout_cell(cell, columns)
            })
            .collect();
        self.builder.line(row.trim_end());
        self
    }

    pub fn cut(&mut self) -> &mut Self {
        self.builder.feed(3).cut();
        self
    }

    pub fn open_drawer(&mut self) -> &mut Self {
        self.builder.pulse();
        self
    }

    /// Whether the queue is currently listed by the spooler. Some drivers
    /// hide ready printers, so the answer is only logged.
    pub async fn is_printer_connected(&self) -> bool {
        match self.backend.list_printers().await {
            Ok(list) => list.iter().any(|p| p.name == self.printer_name),
            Err(e) => {
                debug!(printer = %self.printer_name, error = %e, "Connectivity check failed");
                false
            }
        }
    }

    pub fn buffer(&self) -> Vec<u8> {
        self.builder.clone().build()
    }

    /// Send the buffered commands as one raw job.
    pub async fn execute(self, after: Duration) -> PrintResult<()> {
        let data = self.builder.build();
        match tokio::time::timeout(
            after,
            self.backend.print_raw(&self.printer_name, data, "Receipt (direct USB)"),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PrintError::timeout("direct-usb execute", after)),
        }
    }
}

/// Lay out a receipt on the driver. Column count comes from the driver.
pub fn compose_receipt(printer: &mut ThermalPrinter, payload: &PrintPayload, ctx: &RenderContext) {
    let ctx = ctx.clone().with_width(printer.width());
    let view = ReceiptView::build(payload, &ctx, true);

    printer.align_center().bold(true).println(&view.business_name).bold(false);
    if let Some(address) = &view.address {
        printer.println(address);
    }
    for contact in &view.contacts {
        printer.println(contact);
    }
    printer.draw_line().align_left();
    if let Some(order_line) = &view.order_line {
        printer.println(order_line);
    }
    printer.println(&format!("Tanggal: {}", view.date_line));
    for meta in &view.meta {
        printer.println(meta);
    }
    printer.draw_line();

    for item in &view.items {
        printer.println(&item.name);
        for detail in &item.details {
            printer.println(&format!("  {detail}"));
        }
        printer.table_custom(&[
            TableCell::new(item.left.as_str(), Align::Left, 0.6),
            TableCell::new(item.right.as_str(), Align::Right, 0.4),
        ]);
    }

    printer.draw_line().align_right().bold(true);
    printer.println(&format!("TOTAL: {}", view.total));
    printer.bold(false).draw_line().align_center();
    if let Some(notes) = &view.notes {
        printer.println(notes);
    }
    printer.println(&view.footer).new_line().align_left();

    if payload.should_kick_drawer() {
        printer.open_drawer();
    }
    if payload.should_cut() {
        printer.cut();
    }
}

/// Build, check connectivity (informational), execute.
pub async fn print_direct_usb(
    backend: Arc<dyn PrinterBackend>,
    printer_name: &str,
    payload: &PrintPayload,
    ctx: &RenderContext,
    width: usize,
    after: Duration,
) -> PrintResult<()> {
    let mut printer = ThermalPrinter::new(backend, &interface_for(printer_name), width)?;
    if printer.is_printer_connected().await {
        debug!(printer = %printer.printer_name(), "Printer reports connected");
    } else {
        warn!(printer = %printer.printer_name(), "Printer not reported as connected, printing anyway");
    }
    compose_receipt(&mut printer, payload, ctx);
    printer.execute(after).await?;
    info!(printer = %printer_name, "Direct-USB receipt printed");
    Ok(())
}
