//! # Command Composer
//!
//! Synthesizes a complete family-native command stream when no prepared
//! buffer is available — the landscape/direct-image path. The composer
//! owns a running vertical position and buffers positioned content; the
//! framing that depends on the finished height (print area bounding box,
//! cut, trailing markers) is assembled by [`Composer::finish`].
//!
//! ## Per-Family Framing
//!
//! | | escpos | sii | star |
//! |---|--------|-----|------|
//! | open | `ESC @ GS a 0`, page mode | `ESC @`, page mode | `ESC @` |
//! | position | `ESC $` / `GS $` | `ESC $` / `GS $` | `ESC GS A`, sequential |
//! | image | `GS v 0`, 256-row chunks | `GS v 0`, 96-row chunks | `ESC k` 24-row bands |
//! | close | `ESC W` area, `FF`, cut | `ESC W` area, `FF`, cut | feed, cut, ack marker |
//!
//! The open/close markers deliberately match what the session's
//! `prepare_job` rewrites, so composed streams ride the same
//! transmission pipeline as external ones.
//!
//! ## Rules and Junctions
//!
//! Horizontal and vertical rules are drawn with CP437 box glyphs. Where
//! rules meet, the junction glyph is picked from a fixed 16-entry table
//! indexed by which of the four arms are present.

use tracing::warn;

use crate::protocol::barcode::{self, Symbology};
use crate::protocol::{PrinterFamily, cp437};
use crate::render::halftone::{Halftone, MonochromeBitmap, RasterImage};

/// ESC (Escape) - command prefix byte
const ESC: u8 = 0x1B;

/// GS (Group Separator) - extended command prefix
const GS: u8 = 0x1D;

/// FF (Form Feed) - print and eject the composed page
const FF: u8 = 0x0C;

/// LF (Line Feed)
const LF: u8 = 0x0A;

/// SI (Shift In) - upside-down printing on star printers
const SI: u8 = 0x0F;

/// Character cell width in dots (12 dots at both supported resolutions).
pub const CELL_WIDTH: u32 = 12;

/// Base line height in dots.
pub const LINE_HEIGHT: u32 = 24;

/// Rule arm flags for [`junction`].
pub const RULE_UP: u8 = 1;
pub const RULE_DOWN: u8 = 2;
pub const RULE_LEFT: u8 = 4;
pub const RULE_RIGHT: u8 = 8;

/// CP437 glyph for each combination of rule arms, indexed by the
/// `RULE_*` bitmask. Single arms degrade to plain line glyphs.
pub const JUNCTIONS: [u8; 16] = [
    0x20, // none
    0xB3, // up
    0xB3, // down
    0xB3, // up|down
    0xC4, // left
    0xD9, // up|left
    0xBF, // down|left
    0xB4, // up|down|left
    0xC4, // right
    0xC0, // up|right
    0xDA, // down|right
    0xC3, // up|down|right
    0xC4, // left|right
    0xC1, // up|left|right
    0xC2, // down|left|right
    0xC5, // all four
];

/// Glyph for a rule cell with the given arms.
#[inline]
pub fn junction(mask: u8) -> u8 {
    JUNCTIONS[(mask & 0x0F) as usize]
}

/// Encode a u16 value as little-endian bytes [low, high].
#[inline]
pub const fn u16_le(value: u16) -> [u8; 2] {
    [value as u8, (value >> 8) as u8]
}

/// Text decorations for one span.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextStyle {
    pub underline: bool,
    pub emphasis: bool,
    pub invert: bool,
    pub double_wide: bool,
    pub double_tall: bool,
}

/// Layout parameters for composed output.
#[derive(Debug, Clone, Copy)]
pub struct ComposeOptions {
    /// Characters per line, 24–96.
    pub chars_per_line: u8,
    /// Left margin in character cells, 0–24.
    pub margin_left: u8,
    /// Right margin in character cells, 0–24.
    pub margin_right: u8,
    /// Rotate output 180 degrees.
    pub upside_down: bool,
    /// Cut the paper in the closing sequence.
    pub cut: bool,
    /// Landscape resolution, 180 or 203 dpi.
    pub resolution: u16,
    /// Image quantization parameters.
    pub halftone: Halftone,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            chars_per_line: 48,
            margin_left: 0,
            margin_right: 0,
            upside_down: false,
            cut: true,
            resolution: 203,
            halftone: Halftone::default(),
        }
    }
}

impl ComposeOptions {
    /// Clamp out-of-range values to their documented bounds.
    pub fn normalized(mut self) -> Self {
        self.chars_per_line = self.chars_per_line.clamp(24, 96);
        self.margin_left = self.margin_left.min(24);
        self.margin_right = self.margin_right.min(24);
        if self.resolution != 180 && self.resolution != 203 {
            self.resolution = 203;
        }
        self
    }
}

/// Family-native command stream builder with a running Y accumulator.
pub struct Composer {
    family: PrinterFamily,
    opts: ComposeOptions,
    /// Vertical position of the next element, in dots.
    y: u32,
    /// Positioned content; framing is added in `finish`.
    buf: Vec<u8>,
}

impl Composer {
    pub fn new(family: PrinterFamily, opts: ComposeOptions) -> Self {
        Self {
            family,
            opts: opts.normalized(),
            y: 0,
            buf: Vec::new(),
        }
    }

    /// Printable width in dots, margins excluded.
    pub fn width_dots(&self) -> u32 {
        u32::from(self.opts.chars_per_line) * CELL_WIDTH
    }

    fn margin_left_dots(&self) -> u32 {
        u32::from(self.opts.margin_left) * CELL_WIDTH
    }

    /// Move the cursor to `x` dots (relative to the print area) on the
    /// current line.
    fn position(&mut self, x: u32) {
        let x = (self.margin_left_dots() + x).min(0xFFFF) as u16;
        match self.family {
            PrinterFamily::Escpos | PrinterFamily::Sii => {
                let y = self.y.min(0xFFFF) as u16;
                self.buf.extend_from_slice(&[ESC, b'$']);
                self.buf.extend_from_slice(&u16_le(x));
                self.buf.extend_from_slice(&[GS, b'$']);
                self.buf.extend_from_slice(&u16_le(y));
            }
            PrinterFamily::Star => {
                self.buf.extend_from_slice(&[ESC, GS, b'A']);
                self.buf.extend_from_slice(&u16_le(x));
            }
        }
    }

    /// Advance the running vertical position without drawing.
    pub fn advance(&mut self, dots: u32) {
        self.y += dots;
        if self.family == PrinterFamily::Star {
            // Star positioning is sequential: emit the feed now, in the
            // ESC J quarter-millimeter units the family uses
            let mut units = dots_to_feed_units(dots, self.opts.resolution);
            while units > 0 {
                let n = units.min(255) as u8;
                self.buf.extend_from_slice(&[ESC, b'J', n]);
                units -= u32::from(n);
            }
        }
    }

    /// Emit one positioned line of text.
    pub fn text(&mut self, content: &str, style: &TextStyle) {
        self.position(0);
        self.style_on(style);
        let encoded = cp437::encode(content);
        self.buf.extend_from_slice(&encoded);
        self.style_off(style);
        if self.family == PrinterFamily::Star {
            self.buf.push(LF);
        }
        // Page-mode families place the next line with the next position
        // command; star advances through the line feed. Either way the
        // accumulator moves down one line.
        self.y += LINE_HEIGHT * if style.double_tall { 2 } else { 1 };
    }

    /// Draw one row of rules: each entry is a `RULE_*` arm bitmask per
    /// character cell. Junction glyphs resolve intersections.
    pub fn rule_row(&mut self, cells: &[u8]) {
        let glyphs: Vec<u8> = cells.iter().map(|&m| junction(m)).collect();
        self.position(0);
        self.buf.extend_from_slice(&glyphs);
        if self.family == PrinterFamily::Star {
            self.buf.push(LF);
        }
        self.y += LINE_HEIGHT;
    }

    fn style_on(&mut self, style: &TextStyle) {
        match self.family {
            PrinterFamily::Escpos | PrinterFamily::Sii => {
                if style.underline {
                    self.buf.extend_from_slice(&[ESC, b'-', 1]);
                }
                if style.emphasis {
                    self.buf.extend_from_slice(&[ESC, b'E', 1]);
                }
                if style.invert {
                    self.buf.extend_from_slice(&[GS, b'B', 1]);
                }
                if style.double_wide || style.double_tall {
                    let n = u8::from(style.double_wide) << 4 | u8::from(style.double_tall);
                    self.buf.extend_from_slice(&[GS, b'!', n]);
                }
            }
            PrinterFamily::Star => {
                if style.underline {
                    self.buf.extend_from_slice(&[ESC, b'-', 1]);
                }
                if style.emphasis {
                    self.buf.extend_from_slice(&[ESC, b'E']);
                }
                if style.invert {
                    self.buf.extend_from_slice(&[ESC, b'4']);
                }
                if style.double_wide || style.double_tall {
                    self.buf.extend_from_slice(&[
                        ESC,
                        b'i',
                        u8::from(style.double_tall),
                        u8::from(style.double_wide),
                    ]);
                }
            }
        }
    }

    fn style_off(&mut self, style: &TextStyle) {
        match self.family {
            PrinterFamily::Escpos | PrinterFamily::Sii => {
                if style.double_wide || style.double_tall {
                    self.buf.extend_from_slice(&[GS, b'!', 0]);
                }
                if style.invert {
                    self.buf.extend_from_slice(&[GS, b'B', 0]);
                }
                if style.emphasis {
                    self.buf.extend_from_slice(&[ESC, b'E', 0]);
                }
                if style.underline {
                    self.buf.extend_from_slice(&[ESC, b'-', 0]);
                }
            }
            PrinterFamily::Star => {
                if style.double_wide || style.double_tall {
                    self.buf.extend_from_slice(&[ESC, b'i', 0, 0]);
                }
                if style.invert {
                    self.buf.extend_from_slice(&[ESC, b'5']);
                }
                if style.emphasis {
                    self.buf.extend_from_slice(&[ESC, b'F']);
                }
                if style.underline {
                    self.buf.extend_from_slice(&[ESC, b'-', 0]);
                }
            }
        }
    }

    /// Maximum scan lines one image command may carry.
    fn image_chunk_rows(&self) -> u32 {
        match self.family {
            PrinterFamily::Escpos => 256,
            PrinterFamily::Sii => 96,
            PrinterFamily::Star => 24,
        }
    }

    /// Embed a monochrome bitmap, chunked to the family's per-command
    /// scan-line limit.
    pub fn image(&mut self, bitmap: &MonochromeBitmap) {
        let row_bytes = bitmap.row_bytes();
        let chunk_rows = self.image_chunk_rows();
        let mut row = 0u32;
        while row < bitmap.height {
            let rows = chunk_rows.min(bitmap.height - row);
            let start = row as usize * row_bytes;
            let end = (row + rows) as usize * row_bytes;
            let data = &bitmap.rows[start..end];
            match self.family {
                PrinterFamily::Escpos | PrinterFamily::Sii => {
                    self.position(0);
                    self.buf.extend_from_slice(&[GS, b'v', b'0', 0]);
                    self.buf.extend_from_slice(&u16_le(row_bytes as u16));
                    self.buf.extend_from_slice(&u16_le(rows as u16));
                    self.buf.extend_from_slice(data);
                }
                PrinterFamily::Star => {
                    // 24-row band, zero-padded at the bottom of the image
                    self.buf
                        .extend_from_slice(&[ESC, b'k', row_bytes as u8, 0]);
                    self.buf.extend_from_slice(data);
                    let pad = (24 - rows as usize) * row_bytes;
                    self.buf.extend(std::iter::repeat_n(0u8, pad));
                }
            }
            self.y += rows;
            row += rows;
        }
    }

    /// Embed a 1-D barcode. The payload runs through the symbology
    /// transform for this family first.
    pub fn barcode(&mut self, symbology: Symbology, payload: &[u8], height: u8) {
        let data = barcode::transform(self.family, symbology, payload);
        self.position(0);
        match self.family {
            PrinterFamily::Escpos | PrinterFamily::Sii => {
                self.buf.extend_from_slice(&[GS, b'h', height.max(1)]);
                self.buf.extend_from_slice(&[GS, b'w', 2]);
                self.buf.extend_from_slice(&[GS, b'H', 0]);
                let m = match symbology {
                    Symbology::UpcE => 66,
                    Symbology::Codabar => 71,
                    Symbology::Code93 => 72,
                    Symbology::Code128 => 73,
                };
                self.buf
                    .extend_from_slice(&[GS, b'k', m, data.len().min(255) as u8]);
                self.buf.extend_from_slice(&data);
            }
            PrinterFamily::Star => {
                let n1 = match symbology {
                    Symbology::UpcE => 48,
                    Symbology::Code128 => 54,
                    Symbology::Code93 => 55,
                    Symbology::Codabar => 56,
                };
                // n2: no HRI, n3: module width, n4: height
                self.buf
                    .extend_from_slice(&[ESC, b'b', n1, 1, 2, height.max(1)]);
                self.buf.extend_from_slice(&data);
                self.buf.push(0x1E);
            }
        }
        self.y += u32::from(height.max(1));
    }

    /// Embed a QR symbol. Generation is delegated to the `qrcode` crate
    /// and the module matrix is drawn through the image path, so all
    /// families render identically. Encoding failures skip the symbol.
    pub fn qr(&mut self, data: &str, cell_size: u32) {
        let code = match qrcode::QrCode::new(data.as_bytes()) {
            Ok(code) => code,
            Err(e) => {
                warn!(error = %e, "qr encoding failed; symbol skipped");
                return;
            }
        };
        let modules = code.to_colors();
        let side = code.width() as u32;
        let cell = cell_size.max(1);
        let px = side * cell;
        let row_bytes = (px as usize).div_ceil(8);
        let mut rows = vec![0u8; row_bytes * px as usize];
        for my in 0..side {
            for mx in 0..side {
                if modules[(my * side + mx) as usize] != qrcode::Color::Dark {
                    continue;
                }
                for dy in 0..cell {
                    let y = my * cell + dy;
                    for dx in 0..cell {
                        let x = mx * cell + dx;
                        rows[y as usize * row_bytes + x as usize / 8] |= 0x80u8 >> (x % 8);
                    }
                }
            }
        }
        self.image(&MonochromeBitmap {
            width: px,
            height: px,
            rows,
        });
    }

    /// Assemble the final stream: opening framing, orientation, the
    /// buffered content, and the closing sequence with the print-area
    /// bounding box and optional cut.
    pub fn finish(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.buf.len() + 64);
        let height = self.y.max(LINE_HEIGHT);
        match self.family {
            PrinterFamily::Escpos | PrinterFamily::Sii => {
                out.extend_from_slice(&[ESC, b'@']);
                if self.family == PrinterFamily::Escpos {
                    // The session strips this back out before transmission
                    out.extend_from_slice(&[GS, b'a', 0]);
                }
                // Page mode with print direction for orientation
                out.extend_from_slice(&[ESC, b'L']);
                out.extend_from_slice(&[ESC, b'T', if self.opts.upside_down { 2 } else { 0 }]);
                // Print area: x origin at the left margin, full composed height
                out.extend_from_slice(&[ESC, b'W']);
                out.extend_from_slice(&u16_le(self.margin_left_dots().min(0xFFFF) as u16));
                out.extend_from_slice(&u16_le(0));
                out.extend_from_slice(&u16_le(self.width_dots().min(0xFFFF) as u16));
                out.extend_from_slice(&u16_le(height.min(0xFFFF) as u16));
                out.extend_from_slice(&self.buf);
                out.push(FF);
                if self.opts.cut {
                    out.extend_from_slice(&[GS, b'V', 66, 0]);
                }
            }
            PrinterFamily::Star => {
                out.extend_from_slice(&[ESC, b'@']);
                if self.opts.upside_down {
                    out.push(SI);
                }
                out.extend_from_slice(&self.buf);
                if self.opts.cut {
                    // Feed clear of the head, then cut at the feed position
                    out.extend_from_slice(&[ESC, b'J', 24]);
                    out.extend_from_slice(&[ESC, b'd', 2]);
                }
                // Trailing acknowledgement marker; the session strips it
                out.extend_from_slice(&[ESC, 0x06, 0x01]);
            }
        }
        out
    }
}

/// Convert dots to the quarter-millimeter units of the feed command.
fn dots_to_feed_units(dots: u32, resolution: u16) -> u32 {
    // units = dots / dpi * 25.4mm * 4, kept in integer math
    (dots * 4 * 254).div_ceil(u32::from(resolution) * 10)
}

/// One-call landscape path: rotate the rendered receipt a quarter turn,
/// halftone it, and wrap it in family framing.
pub fn compose_landscape(
    family: PrinterFamily,
    image: &RasterImage,
    opts: ComposeOptions,
) -> Vec<u8> {
    let opts = opts.normalized();
    let rotated = image.rotate_ccw();
    let bitmap = opts.halftone.encode(&rotated);
    let mut composer = Composer::new(family, opts);
    composer.image(&bitmap);
    composer.finish()
}

// ============================================================================
// TESTS
// ============================================================================
