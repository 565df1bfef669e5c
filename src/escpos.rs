//! Minimal ESC/POS binary command builder for 58mm thermal receipt printers.
//!
//! Produces the byte stream written to the serial port (and to the raw
//! spool queue by the direct-USB driver): initialise, code page, alignment
//! and emphasis control codes, literal text, drawer pulse and paper cut.

const ESC: u8 = 0x1B;
const GS: u8 = 0x1D;
const LF: u8 = 0x0A;

/// ESC t n value for PC437 (USA, Standard Europe).
pub const CODE_PAGE_CP437: u8 = 0;

/// Builder for ESC/POS byte buffers.
///
/// ```rust,ignore
/// let mut b = EscPosBuilder::new(32);
/// b.init()
///     .code_page(CODE_PAGE_CP437)
///     .center()
///     .bold(true).line("FLORIST KIOSK").bold(false)
///     .left()
///     .two_cols("TOTAL", "Rp 25.000")
///     .cut();
/// let bytes = b.build();
/// ```
#[derive(Debug, Clone)]
pub struct EscPosBuilder {
    buffer: Vec<u8>,
    width: usize,
}

impl EscPosBuilder {
    pub fn new(width: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(512),
            width,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    // -----------------------------------------------------------------------
    // Initialization
    // -----------------------------------------------------------------------

    /// ESC @: Initialize printer, reset to defaults.
    pub fn init(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x40]);
        self
    }

    /// ESC t n: Select character code page.
    pub fn code_page(&mut self, page: u8) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x74, page]);
        self
    }

    // -----------------------------------------------------------------------
    // Text formatting
    // -----------------------------------------------------------------------

    /// ESC E n: Bold on/off.
    pub fn bold(&mut self, on: bool) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x45, u8::from(on)]);
        self
    }

    // -----------------------------------------------------------------------
    // Alignment
    // -----------------------------------------------------------------------

    /// ESC a 0
    pub fn left(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x61, 0]);
        self
    }

    /// ESC a 1
    pub fn center(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x61, 1]);
        self
    }

    /// ESC a 2
    pub fn right(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x61, 2]);
        self
    }

    // -----------------------------------------------------------------------
    // Text output
    // -----------------------------------------------------------------------

    /// Append text. Bytes outside printable ASCII (plus LF/CR) become `?`;
    /// callers sanitize free text before it gets here.
    pub fn text(&mut self, s: &str) -> &mut Self {
        for ch in s.chars() {
            match ch {
                ' '..='~' | '\n' | '\r' => self.buffer.push(ch as u8),
                _ => self.buffer.push(b'?'),
            }
        }
        self
    }

    /// Text followed by a line feed.
    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s).lf()
    }

    pub fn lf(&mut self) -> &mut Self {
        self.buffer.push(LF);
        self
    }

    pub fn separator(&mut self) -> &mut Self {
        let dashes = crate::formatters::separator(self.width, '-');
        self.line(&dashes)
    }

    /// Left label, right value flush to the paper width.
    pub fn two_cols(&mut self, left: &str, right: &str) -> &mut Self {
        let row = crate::formatters::two_cols(left, right, self.width);
        self.line(&row)
    }

    // -----------------------------------------------------------------------
    // Feed / cut / drawer
    // -----------------------------------------------------------------------

    /// ESC d n: Feed n lines.
    pub fn feed(&mut self, lines: u8) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x64, lines]);
        self
    }

    /// GS V A 16: Partial cut after a 16-dot feed.
    pub fn cut(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[GS, 0x56, 0x41, 0x10]);
        self
    }

    /// ESC p 0 t1 t2: Drawer kick on pin 2 (50ms on, 500ms off).
    pub fn pulse(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x70, 0x00, 0x19, 0xFA]);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buffer
    }
}
