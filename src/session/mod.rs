//! # Print Sessions
//!
//! A session carries one request — print a prepared command stream, or
//! inquire printer/drawer status — from transport open to terminal
//! [`ResultCode`]. Sessions are fully independent of each other: each
//! owns its transport, receive buffer and timers, and nothing is shared
//! across requests.
//!
//! ## Module Structure
//!
//! - [`machine`]: the per-family handshake/status state machine
//! - [`result`]: the closed set of terminal outcomes
//!
//! ## Example
//!
//! ```no_run
//! use recibo::destination::Destination;
//! use recibo::protocol::PrinterFamily;
//! use recibo::session::{Outcome, PrintSession, SessionOptions};
//!
//! # async fn demo() {
//! let session = PrintSession {
//!     destination: Some(Destination::parse("192.168.1.50").unwrap()),
//!     family: PrinterFamily::Escpos,
//!     options: SessionOptions::default(),
//! };
//! match session.run(vec![0x1B, 0x40, b'h', b'i', 0x0A]).await {
//!     Outcome::Code(code) => println!("{code}"),
//!     Outcome::Passthrough(_) => unreachable!("destination was set"),
//! }
//! # }
//! ```

pub mod machine;
mod result;

pub use result::ResultCode;

use tracing::warn;

use crate::destination::Destination;
use crate::protocol::PrinterFamily;
use crate::transport::{self, Transport};
use machine::Machine;

/// Print deadline applied when none (or an out-of-range value) is given.
pub const DEFAULT_TIMEOUT_SECS: u32 = 300;

/// Upper bound on the configurable print deadline.
pub const MAX_TIMEOUT_SECS: u32 = 3600;

/// Per-request knobs the protocol engine reads.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Print deadline in seconds; 0 disables it. Out-of-range values
    /// fall back to [`DEFAULT_TIMEOUT_SECS`].
    pub timeout_secs: u32,
    /// Resolve on the first definitive online/fault classification and
    /// never transmit the command buffer.
    pub status_only: bool,
    /// With `status_only`: report the cash drawer state where the family
    /// senses it (`draweropen`/`drawerclosed` instead of `online`).
    pub drawer: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            status_only: false,
            drawer: false,
        }
    }
}

impl SessionOptions {
    /// Clamp out-of-range values to their defaults.
    pub fn normalized(mut self) -> Self {
        if self.timeout_secs > MAX_TIMEOUT_SECS {
            self.timeout_secs = DEFAULT_TIMEOUT_SECS;
        }
        if self.drawer {
            self.status_only = true;
        }
        self
    }
}

/// What one invocation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The session ran against a device and resolved.
    Code(ResultCode),
    /// No destination: the command buffer comes back unchanged.
    Passthrough(Vec<u8>),
}

/// One print or status-inquiry request.
#[derive(Debug, Clone)]
pub struct PrintSession {
    /// Where the printer lives; `None` selects the pure transform path.
    pub destination: Option<Destination>,
    pub family: PrinterFamily,
    pub options: SessionOptions,
}

impl PrintSession {
    /// Run the request to completion. Resolves exactly once; never
    /// panics or errors across this boundary — every failure path maps
    /// into a [`ResultCode`].
    pub async fn run(self, data: Vec<u8>) -> Outcome {
        let options = self.options.normalized();
        let Some(destination) = self.destination else {
            return Outcome::Passthrough(data);
        };
        let transport = match transport::open(&destination).await {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "transport open failed");
                return Outcome::Code(ResultCode::Disconnect);
            }
        };
        Outcome::Code(run_with_transport(transport, self.family, data, options).await)
    }
}

/// Run the state machine over an already-open transport.
///
/// Exposed so tests (and embedders with custom links) can drive the
/// engine without a real device.
pub async fn run_with_transport(
    transport: Box<dyn Transport>,
    family: PrinterFamily,
    data: Vec<u8>,
    options: SessionOptions,
) -> ResultCode {
    Machine::new(family, transport, data, options.normalized())
        .run()
        .await
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_normalization() {
        let opts = SessionOptions {
            timeout_secs: 5000,
            ..Default::default()
        };
        assert_eq!(opts.normalized().timeout_secs, DEFAULT_TIMEOUT_SECS);

        let opts = SessionOptions {
            timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(opts.normalized().timeout_secs, 0);

        let opts = SessionOptions {
            timeout_secs: 3600,
            ..Default::default()
        };
        assert_eq!(opts.normalized().timeout_secs, 3600);
    }

    #[test]
    fn test_drawer_implies_status_only() {
        let opts = SessionOptions {
            drawer: true,
            ..Default::default()
        };
        assert!(opts.normalized().status_only);
    }

    #[tokio::test]
    async fn test_no_destination_is_identity() {
        let session = PrintSession {
            destination: None,
            family: PrinterFamily::Escpos,
            options: SessionOptions::default(),
        };
        let data = vec![0x1B, 0x40, 0xAA, 0xBB];
        assert_eq!(
            session.run(data.clone()).await,
            Outcome::Passthrough(data)
        );
    }
}
