//! # Error Types
//!
//! This module defines error types used throughout the recibo library.
//!
//! Note that printer-side conditions (cover open, paper out, offline, ...)
//! are *not* errors: they resolve through [`crate::session::ResultCode`].
//! The types here cover the plumbing that can fail before a session is
//! running — bad destination strings, unreadable input files, transports
//! that cannot be opened.

use thiserror::Error;

/// Main error type for recibo operations
#[derive(Debug, Error)]
pub enum ReciboError {
    /// Transport-level errors (connection, line configuration, I/O)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Destination string could not be parsed
    #[error("Invalid destination: {0}")]
    Destination(String),

    /// Invalid option value
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// Image decoding/processing error
    #[error("Image error: {0}")]
    Image(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
