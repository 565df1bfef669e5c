//! Receipt formatting for every transport.
//!
//! Each renderer is a pure function of the payload and a [`RenderContext`];
//! the only time-dependent input is `printed_at`, which the caller injects.
//! Raw-text and ESC/POS output is sanitized to printable ASCII, HTML output
//! is escaped instead.

use chrono::NaiveDateTime;

use crate::config::PrintConfig;
use crate::escpos::{EscPosBuilder, CODE_PAGE_CP437};
use crate::formatters::{
    center_text, escape_html, format_delivery_datetime, format_idr, format_receipt_datetime,
    pad_order_id, sanitize_for_escpos, separator, two_cols,
};
use crate::payload::{non_empty, PrintPayload};

/// Lines fed after a raw-text receipt so the tear bar clears the footer.
const RAW_TEXT_TAIL_FEED: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderContext {
    pub width: usize,
    pub printed_at: NaiveDateTime,
    pub default_business_name: String,
    pub footer: String,
}

impl RenderContext {
    pub fn new(config: &PrintConfig, payload: &PrintPayload, printed_at: NaiveDateTime) -> Self {
        Self {
            width: payload.width_or(config.receipt_width),
            printed_at,
            default_business_name: config.business_name.clone(),
            footer: config.footer.clone(),
        }
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }
}

// ---------------------------------------------------------------------------
// Logical receipt
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ItemView {
    pub name: String,
    pub details: Vec<String>,
    /// `"2 x Rp 12.500"`
    pub left: String,
    /// `"Rp 25.000"`
    pub right: String,
}

/// The receipt after field defaults, labels and money formatting, before
/// any transport-specific layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptView {
    pub business_name: String,
    pub address: Option<String>,
    pub contacts: Vec<String>,
    pub order_line: Option<String>,
    pub date_line: String,
    pub meta: Vec<String>,
    pub items: Vec<ItemView>,
    pub total: String,
    pub notes: Option<String>,
    pub footer: String,
}

impl ReceiptView {
    /// `ascii_only` routes every free-text field through
    /// [`sanitize_for_escpos`] for code-page limited transports.
    pub fn build(payload: &PrintPayload, ctx: &RenderContext, ascii_only: bool) -> Self {
        let clean = |s: &str| -> String {
            if ascii_only {
                sanitize_for_escpos(s)
            } else {
                s.trim().to_string()
            }
        };
        let opt = |s: Option<&str>| non_empty(s).map(|v| clean(v)).filter(|v| !v.is_empty());

        let business_name =
            opt(payload.business_name.as_deref()).unwrap_or_else(|| clean(ctx.default_business_name.as_str()));

        let mut contacts = Vec::new();
        if let Some(web) = opt(payload.website.as_deref()) {
            contacts.push(format!("Web: {web}"));
        }
        if let Some(wa) = opt(payload.whatsapp.as_deref()) {
            contacts.push(format!("WA: {wa}"));
        }
        if let Some(ig) = opt(payload.instagram.as_deref()) {
            contacts.push(format!("IG: {ig}"));
        }

        let order_id = clean(payload.order_id.as_str());
        let order_line = (!order_id.is_empty()).then(|| format!("ID: {}", pad_order_id(&order_id)));

        let mut meta = Vec::new();
        if let Some(buyer) = &payload.buyer {
            if let Some(name) = opt(buyer.name.as_deref()) {
                meta.push(format!("Pembeli : {name}"));
            }
            if let Some(phone) = opt(buyer.phone.as_deref()) {
                meta.push(format!("Telepon : {phone}"));
            }
        }
        if let Some(name) = payload
            .recipient
            .as_ref()
            .and_then(|r| opt(r.name.as_deref()))
        {
            meta.push(format!("Penerima: {name}"));
        }
        if let Some(delivery) = &payload.delivery {
            if let Some(kind) = delivery.kind {
                meta.push(format!("Tipe    : {}", kind.label()));
            }
            if let Some(dt) = non_empty(delivery.datetime.as_deref()) {
                meta.push(format!("Antar   : {}", clean(format_delivery_datetime(dt).as_str())));
            }
            if let Some(addr) = opt(delivery.address.as_deref()) {
                meta.push(format!("Alamat  : {addr}"));
            }
        }
        if let Some(method) = opt(payload.payment_method.as_deref()) {
            meta.push(format!("Bayar   : {}", method.to_uppercase()));
        }

        let items = payload
            .items
            .iter()
            .map(|item| ItemView {
                name: {
                    let name = clean(item.display_name());
                    if name.is_empty() {
                        "Item".to_string()
                    } else {
                        name
                    }
                },
                details: item
                    .details
                    .iter()
                    .map(|d| clean(d.as_str()))
                    .filter(|d| !d.is_empty())
                    .collect(),
                left: format!("{} x {}", item.effective_quantity(), format_idr(item.price)),
                right: format_idr(item.subtotal()),
            })
            .collect();

        Self {
            business_name,
            address: opt(payload.address.as_deref()),
            contacts,
            order_line,
            date_line: format_receipt_datetime(&ctx.printed_at),
            meta,
            items,
            total: format_idr(payload.total.max(0.0)),
            notes: opt(payload.customer_notes.as_deref()),
            footer: clean(ctx.footer.as_str()),
        }
    }
}

// ---------------------------------------------------------------------------
// Plain text (raw spool)
// ---------------------------------------------------------------------------

pub fn render_text_lines(payload: &PrintPayload, ctx: &RenderContext) -> Vec<String> {
    let view = ReceiptView::build(payload, ctx, true);
    let width = ctx.width;
    let rule = separator(width, '-');
    let mut lines = Vec::with_capacity(24 + view.items.len() * 3);

    lines.push(center_text(&view.business_name, width));
    if let Some(address) = &view.address {
        lines.push(center_text(address, width));
    }
    for contact in &view.contacts {
        lines.push(center_text(contact, width));
    }
    lines.push(rule.clone());
    if let Some(order_line) = &view.order_line {
        lines.push(order_line.clone());
    }
    lines.push(view.date_line.clone());
    lines.extend(view.meta.iter().cloned());
    lines.push(rule.clone());

    for item in &view.items {
        lines.push(item.name.clone());
        for detail in &item.details {
            lines.push(format!("  {detail}"));
        }
        lines.push(two_cols(&item.left, &item.right, width));
    }

    lines.push(rule.clone());
    lines.push(two_cols("TOTAL", &view.total, width));
    lines.push(rule);
    lines.push(String::new());
    if let Some(notes) = &view.notes {
        lines.push(center_text(notes, width));
    }
    lines.push(center_text(&view.footer, width));
    lines.extend(std::iter::repeat(String::new()).take(RAW_TEXT_TAIL_FEED));
    lines
}

pub fn render_text(payload: &PrintPayload, ctx: &RenderContext) -> String {
    let mut text = render_text_lines(payload, ctx).join("\n");
    text.push('\n');
    text
}

// ---------------------------------------------------------------------------
// ESC/POS
// ---------------------------------------------------------------------------

pub fn render_escpos(payload: &PrintPayload, ctx: &RenderContext) -> Vec<u8> {
    let view = ReceiptView::build(payload, ctx, true);
    let mut b = EscPosBuilder::new(ctx.width);

    b.init().code_page(CODE_PAGE_CP437);
    b.center().bold(true).line(&view.business_name).bold(false);
    if let Some(address) = &view.address {
        b.line(address);
    }
    for contact in &view.contacts {
        b.line(contact);
    }
    b.left().separator();
    if let Some(order_line) = &view.order_line {
        b.line(order_line);
    }
    b.line(&view.date_line);
    for meta in &view.meta {
        b.line(meta);
    }
    b.separator();

    for item in &view.items {
        b.line(&item.name);
        for detail in &item.details {
            b.line(&format!("  {detail}"));
        }
        b.two_cols(&item.left, &item.right);
    }

    b.separator();
    b.bold(true).two_cols("TOTAL", &view.total).bold(false);
    b.separator().lf();
    b.center();
    if let Some(notes) = &view.notes {
        b.line(notes);
    }
    b.line(&view.footer).left().lf();

    if payload.should_kick_drawer() {
        b.pulse();
    }
    if payload.should_cut() {
        b.feed(3).cut();
    }
    b.build()
}

// ---------------------------------------------------------------------------
// HTML (spooler and dialog transports)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HtmlOptions {
    /// Open the print dialog as soon as the document loads.
    pub auto_print_dialog: bool,
}

fn html_shell(title: &str, body: &str, opts: HtmlOptions) -> String {
    let script = if opts.auto_print_dialog {
        "<script>window.addEventListener('load', function () { window.print(); });</script>"
    } else {
        ""
    };
    format!(
        r#"<!DOCTYPE html>
<html lang="id">
<head>
<meta charset="UTF-8"/>
<title>{}</title>
<style>
@page {{ size: 58mm auto; margin: 2mm; }}
body {{ font-family: 'Courier New', monospace; font-size: 11px; width: 54mm; margin: 0; padding: 0; line-height: 1.2; color: #000; }}
.center {{ text-align: center; }}
.header {{ font-weight: bold; font-size: 13px; }}
.muted {{ font-size: 10px; }}
.row {{ display: flex; justify-content: space-between; gap: 4px; }}
.row .right {{ white-space: nowrap; }}
.detail {{ padding-left: 2mm; font-size: 10px; }}
.total {{ font-weight: bold; font-size: 12px; }}
hr {{ border: none; border-top: 1px dashed #000; margin: 4px 0; }}
.tail {{ height: 10mm; }}
</style>
{}
</head>
<body>{}</body>
</html>"#,
        escape_html(title),
        script,
        body
    )
}

pub fn render_html(payload: &PrintPayload, ctx: &RenderContext, opts: HtmlOptions) -> String {
    let view = ReceiptView::build(payload, ctx, false);
    let mut body = String::with_capacity(2048);

    body.push_str("<div class=\"center\">");
    body.push_str(&format!(
        "<div class=\"header\">{}</div>",
        escape_html(&view.business_name)
    ));
    if let Some(address) = &view.address {
        body.push_str(&format!("<div>{}</div>", escape_html(address)));
    }
    if !view.contacts.is_empty() {
        let contacts: Vec<String> = view.contacts.iter().map(|c| escape_html(c)).collect();
        body.push_str(&format!("<div class=\"muted\">{}</div>", contacts.join("<br/>")));
    }
    body.push_str("</div><hr/><div>");

    let mut meta_lines: Vec<String> = Vec::new();
    if let Some(order_line) = &view.order_line {
        meta_lines.push(escape_html(order_line));
    }
    meta_lines.push(escape_html(&view.date_line));
    meta_lines.extend(view.meta.iter().map(|m| escape_html(m)));
    body.push_str(&meta_lines.join("<br/>"));
    body.push_str("</div><hr/>");

    for item in &view.items {
        body.push_str(&format!("<div><div>{}</div>", escape_html(&item.name)));
        for detail in &item.details {
            body.push_str(&format!("<div class=\"detail\">{}</div>", escape_html(detail)));
        }
        body.push_str(&format!(
            "<div class=\"row\"><span>{}</span><span class=\"right\">{}</span></div></div>",
            escape_html(&item.left),
            escape_html(&item.right)
        ));
    }

    body.push_str(&format!(
        "<hr/><div class=\"row total\"><span>TOTAL</span><span class=\"right\">{}</span></div><hr/>",
        escape_html(&view.total)
    ));
    if let Some(notes) = &view.notes {
        body.push_str(&format!("<div class=\"center\">{}</div>", escape_html(notes)));
    }
    body.push_str(&format!(
        "<div class=\"center muted\">{}</div><div class=\"tail\"></div>",
        escape_html(&view.footer)
    ));

    let title = match &view.order_line {
        Some(order_line) => format!("Struk {order_line}"),
        None => "Struk".to_string(),
    };
    html_shell(&title, &body, opts)
}
