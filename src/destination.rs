//! # Print Destinations
//!
//! A destination string names where the printer lives:
//!
//! | Form | Transport |
//! |------|-----------|
//! | `192.168.1.50`, `fe80::1` | TCP to port 9100 |
//! | `/dev/usb/lp0` | USB character device |
//! | `/dev/ttyUSB0:115200,E,8,1,R` | Serial line |
//!
//! Serial line parameters follow the device path after a colon, in the
//! fixed order baud, parity, data bits, stop bits, flow control. Commas
//! between fields are optional (`/dev/ttyS0:9600N81N` is accepted), and
//! trailing fields may be omitted. Defaults are `115200,N,8,1,N`.
//!
//! A destination is parsed once per session and is immutable thereafter.

use std::net::IpAddr;

use crate::error::ReciboError;

/// Default TCP port for raw printing (the de-facto JetDirect port).
pub const NETWORK_PORT: u16 = 9100;

/// Path prefix that marks a USB printer class character device.
const USB_PREFIX: &str = "/dev/usb/lp";

/// Serial line parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Serial line flow control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    None,
    /// RTS/CTS hardware flow control
    RtsCts,
    /// XON/XOFF software flow control
    XonXoff,
}

/// Serial line parameters, as parsed from the destination string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialParams {
    pub baud_rate: u32,
    pub parity: Parity,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub flow_control: FlowControl,
}

impl Default for SerialParams {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            parity: Parity::None,
            data_bits: 8,
            stop_bits: 1,
            flow_control: FlowControl::None,
        }
    }
}

/// Where a session connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// IPv4/IPv6 literal, reached over TCP port 9100.
    Network(String),
    /// Serial device path plus line parameters.
    Serial(String, SerialParams),
    /// USB printer class character device (`/dev/usb/lp*`).
    Usb(String),
}

impl Destination {
    /// Parse a destination string.
    ///
    /// An IP literal selects the network transport; a path under
    /// `/dev/usb/lp` selects USB; anything else is treated as a serial
    /// device, with optional line parameters after a colon.
    pub fn parse(s: &str) -> Result<Self, ReciboError> {
        if s.is_empty() {
            return Err(ReciboError::Destination("empty destination".to_string()));
        }

        if s.parse::<IpAddr>().is_ok() {
            return Ok(Self::Network(s.to_string()));
        }

        if s.starts_with(USB_PREFIX) {
            return Ok(Self::Usb(s.to_string()));
        }

        match s.split_once(':') {
            Some((path, params)) => {
                Ok(Self::Serial(path.to_string(), parse_serial_params(params)?))
            }
            None => Ok(Self::Serial(s.to_string(), SerialParams::default())),
        }
    }
}

/// Parse the `<baud>[,<parity>[,<databits>[,<stopbits>[,<flowcontrol>]]]]`
/// tail of a serial destination. Commas are optional; omitted fields keep
/// their defaults.
fn parse_serial_params(s: &str) -> Result<SerialParams, ReciboError> {
    let mut params = SerialParams::default();
    let compact: String = s.chars().filter(|c| *c != ',').collect();
    let mut rest = compact.as_str();

    let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        let (baud, tail) = rest.split_at(digits);
        params.baud_rate = baud
            .parse()
            .map_err(|_| ReciboError::Destination(format!("bad baud rate '{baud}'")))?;
        rest = tail;
    }

    let mut chars = rest.chars();
    let mut next = chars.next();

    if let Some(c) = next {
        params.parity = match c.to_ascii_uppercase() {
            'N' => Parity::None,
            'E' => Parity::Even,
            'O' => Parity::Odd,
            other => {
                return Err(ReciboError::Destination(format!("bad parity '{other}'")));
            }
        };
        next = chars.next();
    }

    if let Some(c) = next {
        params.data_bits = match c {
            '7' => 7,
            '8' => 8,
            other => {
                return Err(ReciboError::Destination(format!("bad data bits '{other}'")));
            }
        };
        next = chars.next();
    }

    if let Some(c) = next {
        params.stop_bits = match c {
            '1' => 1,
            '2' => 2,
            other => {
                return Err(ReciboError::Destination(format!("bad stop bits '{other}'")));
            }
        };
        next = chars.next();
    }

    if let Some(c) = next {
        params.flow_control = match c.to_ascii_uppercase() {
            'N' => FlowControl::None,
            'R' => FlowControl::RtsCts,
            'X' => FlowControl::XonXoff,
            other => {
                return Err(ReciboError::Destination(format!(
                    "bad flow control '{other}'"
                )));
            }
        };
        next = chars.next();
    }

    if next.is_some() {
        return Err(ReciboError::Destination(format!(
            "trailing junk in serial parameters '{s}'"
        )));
    }

    Ok(params)
}

// ============================================================================
// TESTS
// ============================================================================
