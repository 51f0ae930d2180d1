//! # Code Page 437 Encoding
//!
//! Composed output addresses printers in their single-byte code page.
//! ASCII passes through unchanged; box-drawing and common Latin glyphs
//! map to their CP437 bytes; anything unmapped prints as `?`.
//!
//! The rule/junction drawing in the composer leans on the box-drawing
//! range (0xB3–0xDA), so those mappings matter more here than the
//! accented letters.

use tracing::warn;

/// Unicode → CP437 upper-half mappings the composer can produce.
///
/// Ordered by Unicode scalar so lookup can bisect.
const CP437_UPPER: &[(char, u8)] = &[
    ('°', 0xF8),
    ('±', 0xF1),
    ('²', 0xFD),
    ('·', 0xFA),
    ('ä', 0x84),
    ('å', 0x86),
    ('ç', 0x87),
    ('é', 0x82),
    ('ñ', 0xA4),
    ('ö', 0x94),
    ('÷', 0xF6),
    ('ü', 0x81),
    ('─', 0xC4),
    ('│', 0xB3),
    ('┌', 0xDA),
    ('┐', 0xBF),
    ('└', 0xC0),
    ('┘', 0xD9),
    ('├', 0xC3),
    ('┤', 0xB4),
    ('┬', 0xC2),
    ('┴', 0xC1),
    ('┼', 0xC5),
    ('═', 0xCD),
    ('║', 0xBA),
    ('■', 0xFE),
];

/// Map a Unicode code point to its CP437 byte (0x80–0xFF), if any.
pub fn to_byte(ch: char) -> Option<u8> {
    CP437_UPPER
        .binary_search_by_key(&ch, |&(c, _)| c)
        .ok()
        .map(|i| CP437_UPPER[i].1)
}

/// Encode a string as CP437 bytes; unmapped characters become `?`.
pub fn encode(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for ch in s.chars() {
        if (ch as u32) < 0x80 {
            out.push(ch as u8);
        } else if let Some(byte) = to_byte(ch) {
            out.push(byte);
        } else {
            warn!(ch = %ch, codepoint = ch as u32, "unmapped character, substituting '?'");
            out.push(b'?');
        }
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_sorted() {
        for pair in CP437_UPPER.windows(2) {
            assert!(pair[0].0 < pair[1].0, "table out of order at {:?}", pair);
        }
    }

    #[test]
    fn test_ascii_passthrough() {
        assert_eq!(encode("Total: 12.50"), b"Total: 12.50".to_vec());
    }

    #[test]
    fn test_box_drawing_bytes() {
        assert_eq!(encode("┌─┐"), vec![0xDA, 0xC4, 0xBF]);
        assert_eq!(encode("└┴┘"), vec![0xC0, 0xC1, 0xD9]);
        assert_eq!(encode("├┼┤"), vec![0xC3, 0xC5, 0xB4]);
    }

    #[test]
    fn test_unmapped_substitution() {
        assert_eq!(encode("日"), vec![b'?']);
    }
}
