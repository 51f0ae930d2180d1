//! # Barcode Payload Transforms
//!
//! Printer barcode commands want their payload in a symbology-specific
//! shape; this module produces those bytes from the raw payload. Symbol
//! rendering itself happens inside the printer (or, for QR, in the
//! `qrcode` crate upstream of the composer) — nothing here draws bars.
//!
//! | Symbology | Transform |
//! |-----------|-----------|
//! | UPC-E | 11/12-digit UPC-A payload compressed to the 6-digit short form |
//! | CODE128 | minimal-length subset (A/B/C) packing with switch codes and checksum |
//! | Codabar | start/stop guard characters added when missing |
//! | Code93 | pass-through |
//!
//! Unsupported or non-compressible payloads pass through unchanged, and
//! anything longer than 255 bytes is truncated first. Lossy by design:
//! a bad payload prints a bad barcode, it never fails the job.

use super::PrinterFamily;

/// Hard cap on barcode payload length.
pub const MAX_PAYLOAD: usize = 255;

/// Symbologies that need a payload transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbology {
    UpcE,
    Code128,
    Codabar,
    Code93,
}

/// Transform a payload for the given family's barcode command.
pub fn transform(family: PrinterFamily, symbology: Symbology, payload: &[u8]) -> Vec<u8> {
    let payload = &payload[..payload.len().min(MAX_PAYLOAD)];
    match symbology {
        Symbology::UpcE => upce(payload),
        Symbology::Code128 => match family {
            // The escpos command computes its own checksum and takes
            // brace-escaped switch codes
            PrinterFamily::Escpos => code128_escpos(payload),
            _ => match code128(payload) {
                Some(packed) => {
                    let mut out = packed.codes;
                    out.push(packed.checksum);
                    out
                }
                None => payload.to_vec(),
            },
        },
        Symbology::Codabar => codabar(payload),
        Symbology::Code93 => payload.to_vec(),
    }
}

// ============================================================================
// UPC-E COMPACTION
// ============================================================================

/// Compress an 11/12-digit UPC-A payload to its UPC-E short form:
/// number system, six compressed digits, check digit.
///
/// The fixed digit-pattern rules (manufacturer code M1–M5, product code
/// P1–P5):
///
/// | Condition | Short form |
/// |-----------|-----------|
/// | M3 ∈ 0–2, M4M5 = 00, P1P2 = 00 | M1 M2 P3 P4 P5 M3 |
/// | M3 ∈ 3–9, M4M5 = 00, P1P2P3 = 000 | M1 M2 M3 P4 P5 `3` |
/// | M5 = 0, P1–P4 = 0000 | M1 M2 M3 M4 P5 `4` |
/// | P1–P4 = 0000, P5 ∈ 5–9 | M1 M2 M3 M4 M5 P5 |
///
/// Payloads that match none of the patterns (or are not 11/12 digits
/// with number system 0/1) pass through unchanged.
pub fn upce(payload: &[u8]) -> Vec<u8> {
    if !(payload.len() == 11 || payload.len() == 12)
        || !payload.iter().all(u8::is_ascii_digit)
    {
        return payload.to_vec();
    }
    let ns = payload[0];
    if ns != b'0' && ns != b'1' {
        return payload.to_vec();
    }

    let m = &payload[1..6];
    let p = &payload[6..11];
    let short: [u8; 6] = if m[3] == b'0' && m[4] == b'0' && p[0] == b'0' && p[1] == b'0' {
        if m[2] <= b'2' {
            [m[0], m[1], p[2], p[3], p[4], m[2]]
        } else if p[2] == b'0' {
            [m[0], m[1], m[2], p[3], p[4], b'3']
        } else {
            return payload.to_vec();
        }
    } else if m[4] == b'0' && p[..4] == *b"0000" {
        [m[0], m[1], m[2], m[3], p[4], b'4']
    } else if p[..4] == *b"0000" && p[4] >= b'5' {
        [m[0], m[1], m[2], m[3], m[4], p[4]]
    } else {
        return payload.to_vec();
    };

    let mut out = Vec::with_capacity(8);
    out.push(ns);
    out.extend_from_slice(&short);
    out.push(upc_check_digit(&payload[..11]));
    out
}

/// Standard UPC check digit over the leading 11 digits.
fn upc_check_digit(digits: &[u8]) -> u8 {
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, &d)| {
            let v = u32::from(d - b'0');
            if i % 2 == 0 { v * 3 } else { v }
        })
        .sum();
    b'0' + ((10 - (sum % 10) as u8) % 10)
}

// ============================================================================
// CODE128 SUBSET PACKING
// ============================================================================

/// Code set switch/start code values.
const START_A: u8 = 103;
const START_B: u8 = 104;
const START_C: u8 = 105;
const SWITCH_A: u8 = 101;
const SWITCH_B: u8 = 100;
const SWITCH_C: u8 = 99;

/// A packed CODE128 symbol: start code, data and switch codes, plus the
/// mod-103 checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code128 {
    pub codes: Vec<u8>,
    pub checksum: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Set {
    A,
    B,
    C,
}

/// Count ASCII digits starting at `i`.
fn digit_run(data: &[u8], i: usize) -> usize {
    data[i..].iter().take_while(|b| b.is_ascii_digit()).count()
}

/// Pick the best code set at position `i`. Set C pays off for a run of
/// four digits at a boundary (six mid-stream); control characters force
/// set A, everything else is set B.
fn pick_set(data: &[u8], i: usize, current: Option<Set>) -> Set {
    let run = digit_run(data, i);
    let threshold = match current {
        None => 4,
        Some(Set::C) => 2,
        Some(_) => 6,
    };
    if run >= threshold && (run % 2 == 0 || run >= threshold + 1) {
        return Set::C;
    }
    if data[i] < 0x20 { Set::A } else { Set::B }
}

/// Pack printable/control ASCII into CODE128 code values with subset
/// switching. Returns `None` for bytes outside the symbology (>= 0x80).
pub fn code128(data: &[u8]) -> Option<Code128> {
    if data.is_empty() || data.iter().any(|&b| b >= 0x80) {
        return None;
    }

    let mut codes: Vec<u8> = Vec::with_capacity(data.len() + 2);
    let mut set = pick_set(data, 0, None);
    codes.push(match set {
        Set::A => START_A,
        Set::B => START_B,
        Set::C => START_C,
    });

    let mut i = 0;
    while i < data.len() {
        let wanted = pick_set(data, i, Some(set));
        if wanted != set {
            codes.push(match wanted {
                Set::A => SWITCH_A,
                Set::B => SWITCH_B,
                Set::C => SWITCH_C,
            });
            set = wanted;
        }
        match set {
            Set::C => {
                let pair = (data[i] - b'0') * 10 + (data[i + 1] - b'0');
                codes.push(pair);
                i += 2;
            }
            Set::B => {
                codes.push(data[i] - 32);
                i += 1;
            }
            Set::A => {
                let b = data[i];
                codes.push(if b < 0x20 { b + 64 } else { b - 32 });
                i += 1;
            }
        }
    }

    let checksum = codes
        .iter()
        .enumerate()
        .fold(0u32, |acc, (i, &c)| {
            acc + u32::from(c) * (i as u32).max(1)
        })
        % 103;

    Some(Code128 {
        codes,
        checksum: checksum as u8,
    })
}

/// Brace-escaped CODE128 payload for the escpos barcode command:
/// `{A`/`{B`/`{C` select the subset and a literal `{` doubles.
pub fn code128_escpos(data: &[u8]) -> Vec<u8> {
    let Some(packed) = code128(data) else {
        return data.to_vec();
    };

    let mut out = Vec::with_capacity(data.len() + 4);
    let mut set = match packed.codes[0] {
        START_A => Set::A,
        START_C => Set::C,
        _ => Set::B,
    };
    out.extend_from_slice(match set {
        Set::A => b"{A",
        Set::B => b"{B",
        Set::C => b"{C",
    });

    for &code in &packed.codes[1..] {
        if set != Set::C && matches!(code, SWITCH_A | SWITCH_B | SWITCH_C)
            || set == Set::C && code > 99
        {
            set = match code {
                SWITCH_A => Set::A,
                SWITCH_B => Set::B,
                _ => Set::C,
            };
            out.extend_from_slice(match set {
                Set::A => b"{A",
                Set::B => b"{B",
                Set::C => b"{C",
            });
            continue;
        }
        match set {
            Set::C => {
                out.push(b'0' + code / 10);
                out.push(b'0' + code % 10);
            }
            Set::B => {
                let b = code + 32;
                out.push(b);
                if b == b'{' {
                    out.push(b'{');
                }
            }
            Set::A => out.push(if code >= 64 { code - 64 } else { code + 32 }),
        }
    }
    out
}

// ============================================================================
// CODABAR / CODE93
// ============================================================================

/// Codabar guard characters.
fn is_codabar_guard(b: u8) -> bool {
    matches!(b, b'A'..=b'D' | b'a'..=b'd')
}

/// Wrap a Codabar payload in start/stop guards when the payload does
/// not carry its own.
pub fn codabar(payload: &[u8]) -> Vec<u8> {
    let guarded = payload.len() >= 2
        && is_codabar_guard(payload[0])
        && is_codabar_guard(payload[payload.len() - 1]);
    if guarded {
        return payload.to_vec();
    }
    let mut out = Vec::with_capacity(payload.len() + 2);
    out.push(b'A');
    out.extend_from_slice(payload);
    out.push(b'A');
    out
}

// ============================================================================
// TESTS
// ============================================================================
