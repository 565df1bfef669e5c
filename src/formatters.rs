//! Column and text helpers shared by every receipt renderer.
//!
//! Widths are counted in characters, which matches the printer's column
//! count once text has gone through [`sanitize_for_escpos`].

use chrono::{DateTime, NaiveDateTime};

/// Rupiah without decimals, dot-grouped: `Rp 25.000`.
pub fn format_idr(amount: f64) -> String {
    let rounded = if amount.is_finite() {
        amount.round() as i64
    } else {
        0
    };
    let digits = rounded.unsigned_abs().to_string();
    let grouped = group_thousands(&digits, '.');
    if rounded < 0 {
        format!("-Rp {grouped}")
    } else {
        format!("Rp {grouped}")
    }
}

fn group_thousands(digits: &str, sep: char) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(ch);
    }
    out
}

/// Left-pad so the text sits in the middle of `width`. Text at or beyond
/// the width comes back unpadded.
pub fn center_text(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    let pad = (width - len) / 2;
    format!("{}{text}", " ".repeat(pad))
}

/// `left` flush left, `right` flush to column `width`. When both do not fit,
/// they are concatenated as-is; overflow is left to the printer to wrap.
pub fn two_cols(left: &str, right: &str, width: usize) -> String {
    let used = left.chars().count() + right.chars().count();
    if used >= width {
        return format!("{left}{right}");
    }
    format!("{left}{}{right}", " ".repeat(width - used))
}

pub fn separator(width: usize, ch: char) -> String {
    std::iter::repeat(ch).take(width).collect()
}

/// `ID: 000042` style order numbers.
pub fn pad_order_id(order_id: &str) -> String {
    format!("{order_id:0>6}")
}

/// Receipt timestamp in the id-ID style the kiosk has always printed.
pub fn format_receipt_datetime(at: &NaiveDateTime) -> String {
    at.format("%d/%m/%Y, %H.%M.%S").to_string()
}

/// Delivery datetimes arrive from an HTML datetime input or as RFC 3339;
/// anything else is printed verbatim.
pub fn format_delivery_datetime(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return format_receipt_datetime(&dt.naive_local());
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, pattern) {
            return format_receipt_datetime(&dt);
        }
    }
    trimmed.to_string()
}

pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

// ---------------------------------------------------------------------------
// ESC/POS sanitization
// ---------------------------------------------------------------------------

/// Reduce free text to printable ASCII for the printer's CP437 code page.
///
/// Unicode spaces become plain spaces, invisible marks are dropped,
/// accented Latin letters lose their accent, typographic dashes and quotes
/// become ASCII, and whatever is left outside 0x20..=0x7E is removed.
pub fn sanitize_for_escpos(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\u{00A0}' | '\u{202F}' | '\u{2007}' | '\t' => out.push(' '),
            '\u{200B}'..='\u{200F}' | '\u{2060}' | '\u{FEFF}' => {}
            '\u{2013}' | '\u{2014}' => out.push('-'),
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{201C}' | '\u{201D}' => out.push('"'),
            '\u{2026}' => out.push_str("..."),
            ' '..='~' => out.push(ch),
            _ => {
                if let Some(folded) = fold_latin(ch) {
                    out.push_str(folded);
                }
            }
        }
    }
    collapse_spaces(&out)
}

fn collapse_spaces(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_space = false;
    for ch in input.chars() {
        if ch == ' ' {
            if !prev_space {
                out.push(ch);
            }
            prev_space = true;
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out.trim_end().to_string()
}

/// ASCII base for accented Latin-1 / Latin Extended-A letters.
fn fold_latin(ch: char) -> Option<&'static str> {
    let folded = match ch {
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ă' | 'Ą' => "A",
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'Æ' => "AE",
        'æ' => "ae",
        'Ç' | 'Ć' | 'Č' => "C",
        'ç' | 'ć' | 'č' => "c",
        'Ď' | 'Đ' => "D",
        'ď' | 'đ' => "d",
        'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ė' | 'Ę' | 'Ě' => "E",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'Ğ' => "G",
        'ğ' => "g",
        'Ì' | 'Í' | 'Î' | 'Ï' | 'Ī' | 'İ' => "I",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'ı' => "i",
        'Ł' => "L",
        'ł' => "l",
        'Ñ' | 'Ń' | 'Ň' => "N",
        'ñ' | 'ń' | 'ň' => "n",
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' | 'Ő' => "O",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'Œ' => "OE",
        'œ' => "oe",
        'Ř' => "R",
        'ř' => "r",
        'Ś' | 'Š' | 'Ş' => "S",
        'ś' | 'š' | 'ş' => "s",
        'ß' => "ss",
        'Ť' | 'Ţ' => "T",
        'ť' | 'ţ' => "t",
        'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ū' | 'Ů' | 'Ű' => "U",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => "u",
        'Ý' | 'Ÿ' => "Y",
        'ý' | 'ÿ' => "y",
        'Ź' | 'Ż' | 'Ž' => "Z",
        'ź' | 'ż' | 'ž' => "z",
        _ => return None,
    };
    Some(folded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn idr_groups_thousands() {
        assert_eq!(format_idr(0.0), "Rp 0");
        assert_eq!(format_idr(999.0), "Rp 999");
        assert_eq!(format_idr(25000.0), "Rp 25.000");
        assert_eq!(format_idr(1_250_000.4), "Rp 1.250.000");
        assert_eq!(format_idr(-1500.0), "-Rp 1.500");
        assert_eq!(format_idr(f64::NAN), "Rp 0");
    }

    #[test]
    fn two_cols_fills_width_exactly() {
        let pairs = [("TOTAL", "Rp 25.000"), ("", "x"), ("1 x Rp 5.000", ""), ("a", "b")];
        for (left, right) in pairs {
            let line = two_cols(left, right, 32);
            assert_eq!(line.chars().count(), 32, "{left:?}/{right:?}");
            assert!(line.starts_with(left));
            assert!(line.ends_with(right));
        }
    }

    #[test]
    fn two_cols_overflow_concatenates() {
        let left = "Buket Mawar Merah Premium Besar";
        let right = "Rp 1.250.000";
        assert_eq!(two_cols(left, right, 32), format!("{left}{right}"));
    }

    #[test]
    fn center_pads_with_floor() {
        assert_eq!(center_text("abc", 8), "  abc");
        assert_eq!(center_text("abcd", 9), "  abcd");
        let long = "x".repeat(40);
        assert_eq!(center_text(&long, 32), long);
        assert_eq!(center_text("", 4), "  ");
    }

    #[test]
    fn sanitize_folds_to_ascii() {
        assert_eq!(sanitize_for_escpos("Café\u{00A0}Mélati"), "Cafe Melati");
        assert_eq!(sanitize_for_escpos("Rp\u{202F}5.000 \u{2014} “Spesial”"), "Rp 5.000 - \"Spesial\"");
        assert_eq!(sanitize_for_escpos("zero\u{200B}width\u{FEFF}"), "zerowidth");
        assert_eq!(sanitize_for_escpos("Bunga 🌹 segar   "), "Bunga segar");
        assert_eq!(sanitize_for_escpos("Straße"), "Strasse");
    }

    #[test]
    fn order_id_padding_and_dates() {
        assert_eq!(pad_order_id("42"), "000042");
        assert_eq!(pad_order_id("T1"), "0000T1");
        assert_eq!(pad_order_id("1234567"), "1234567");

        let at = NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(9, 5, 7)
            .unwrap();
        assert_eq!(format_receipt_datetime(&at), "19/10/2026, 09.05.07");
        assert_eq!(format_delivery_datetime("2026-10-20T14:30"), "20/10/2026, 14.30.00");
        assert_eq!(format_delivery_datetime("besok sore"), "besok sore");
    }

    #[test]
    fn html_escaping() {
        assert_eq!(escape_html("<b>Tom & \"Jerry\"</b>"), "&lt;b&gt;Tom &amp; &quot;Jerry&quot;&lt;/b&gt;");
    }
}
