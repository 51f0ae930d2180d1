//! # Terminal Result Codes
//!
//! Every session resolves with exactly one [`ResultCode`], whether the
//! request printed a job, queried printer status, or failed before the
//! printer ever answered. There is no error channel besides this one:
//! transport faults, printer faults and liveness faults all funnel into
//! the same closed set.

use serde::Serialize;
use std::fmt;

/// Terminal outcome of one print or status session.
///
/// | Code | Meaning |
/// |------|---------|
/// | `success` | Job transmitted and completion confirmed |
/// | `online` | Status inquiry: printer ready |
/// | `coveropen` | Printer cover is open |
/// | `paperempty` | Out of paper |
/// | `error` | Printer-reported error (cutter, head, ...) |
/// | `offline` | No qualifying status response within the recovery window |
/// | `disconnect` | Transport could not be opened, or dropped mid-session |
/// | `timeout` | Job sent but no completion within the print deadline |
/// | `drawerclosed` | Drawer inquiry: kick-out connector reads closed |
/// | `draweropen` | Drawer inquiry: kick-out connector reads open |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultCode {
    Success,
    Online,
    CoverOpen,
    PaperEmpty,
    Error,
    Offline,
    Disconnect,
    Timeout,
    DrawerClosed,
    DrawerOpen,
}

impl ResultCode {
    /// The wire/CLI spelling of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Online => "online",
            Self::CoverOpen => "coveropen",
            Self::PaperEmpty => "paperempty",
            Self::Error => "error",
            Self::Offline => "offline",
            Self::Disconnect => "disconnect",
            Self::Timeout => "timeout",
            Self::DrawerClosed => "drawerclosed",
            Self::DrawerOpen => "draweropen",
        }
    }

    /// Whether this outcome counts as a healthy exit for the CLI.
    pub fn is_ok(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::Online | Self::DrawerClosed | Self::DrawerOpen
        )
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TESTS
// ============================================================================
