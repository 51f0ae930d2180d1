//! # Recibo - Receipt Printer Driver
//!
//! Recibo drives physical receipt printers: it opens a transport (TCP,
//! serial line, or USB character device), runs the printer family's
//! status handshake, transmits a prepared command stream, and reports a
//! single terminal result code. It also carries the two pieces of
//! command synthesis that cannot be delegated upstream — monochrome
//! halftoning and the landscape command composer.
//!
//! ## Quick Start
//!
//! ```no_run
//! use recibo::destination::Destination;
//! use recibo::protocol::PrinterFamily;
//! use recibo::session::{Outcome, PrintSession, SessionOptions};
//!
//! # async fn demo() -> Result<(), recibo::ReciboError> {
//! // A command stream prepared elsewhere
//! let job = std::fs::read("receipt.bin")?;
//!
//! let session = PrintSession {
//!     destination: Some(Destination::parse("192.168.1.50")?),
//!     family: PrinterFamily::Escpos,
//!     options: SessionOptions::default(),
//! };
//!
//! match session.run(job).await {
//!     Outcome::Code(code) => println!("{code}"),
//!     Outcome::Passthrough(bytes) => std::io::Write::write_all(
//!         &mut std::io::stdout(), &bytes)?,
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`session`] | Per-request orchestration and the status state machine |
//! | [`protocol`] | Family decoders, barcode transforms, CP437 |
//! | [`transport`] | TCP / serial / USB backends |
//! | [`compose`] | Landscape/direct-image command synthesis |
//! | [`render`] | Halftoning |
//! | [`destination`] | Destination string parsing |
//! | [`error`] | Error types |

pub mod compose;
pub mod destination;
pub mod error;
pub mod protocol;
pub mod render;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use destination::Destination;
pub use error::ReciboError;
pub use protocol::PrinterFamily;
pub use session::{Outcome, PrintSession, ResultCode, SessionOptions};
