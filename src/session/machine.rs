//! # Session State Machine
//!
//! One machine drives one print or status request from hello to terminal
//! result. The machine is family-agnostic: all byte-level interpretation
//! is delegated to the family's [`StatusDecoder`], and all I/O goes
//! through the injected [`Transport`]. The machine owns the receive
//! buffer, the drain flag and the two timers.
//!
//! ## States
//!
//! ```text
//! Opened ──► HandshakeSent ──► StatusReady ──► Printing ──► Closed
//!               │                  │               │           ▲
//!               └──────────────────┴───────────────┴───────────┘
//!                     (fault / offline / timeout / disconnect)
//! ```
//!
//! The state only ever advances; `Closed` is reached exactly once and
//! every handler is a no-op afterwards.
//!
//! ## Timers
//!
//! - `recovery`: 2 s silence window after the hello and again after the
//!   status enable. Once it fires, retransmission ticks every 1 s (8192
//!   zero bytes to flush misaligned in-flight data, then the hello and
//!   enable sequences) for as long as the transport is drained, and the
//!   10 s offline ceiling is armed.
//! - `deadline`: doubles as the offline ceiling before the job is sent
//!   and as the print timeout after.
//!
//! All waits go through the tokio clock, so tests run on paused time.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::protocol::{Classification, Phase, PrinterFamily, StatusDecoder, Verdict};
use crate::session::{ResultCode, SessionOptions};
use crate::transport::{Transport, TransportEvent};

/// Silence window after the hello / status enable before recovery starts.
const RECOVERY_WINDOW: Duration = Duration::from_secs(2);

/// Retransmission interval once recovery has started.
const RECOVERY_INTERVAL: Duration = Duration::from_secs(1);

/// Ceiling on the whole recovery loop before resolving `offline`.
const OFFLINE_DEADLINE: Duration = Duration::from_secs(10);

/// Wait for the error detail response before resolving `error`.
const ERROR_DETAIL_WINDOW: Duration = Duration::from_secs(1);

/// Zero-byte prefix flushed ahead of recovery retransmissions to push any
/// misaligned in-flight data through the printer's parser.
const FLUSH_LEN: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Opened,
    HandshakeSent,
    StatusReady,
    Printing,
    Closed,
}

enum Wake {
    Event(TransportEvent),
    Recovery,
    Deadline,
}

pub struct Machine {
    decoder: Box<dyn StatusDecoder>,
    transport: Box<dyn Transport>,
    opts: SessionOptions,
    job: Vec<u8>,
    buf: Vec<u8>,
    state: State,
    drain: bool,
    error_pending: bool,
    recovering: bool,
    recovery_at: Option<Instant>,
    deadline_at: Option<Instant>,
    resolved: Option<ResultCode>,
}

impl Machine {
    pub fn new(
        family: PrinterFamily,
        transport: Box<dyn Transport>,
        job: Vec<u8>,
        opts: SessionOptions,
    ) -> Self {
        Self {
            decoder: family.decoder(),
            transport,
            opts,
            job,
            buf: Vec::new(),
            state: State::Opened,
            drain: true,
            error_pending: false,
            recovering: false,
            recovery_at: None,
            deadline_at: None,
            resolved: None,
        }
    }

    /// Drive the session to its terminal result. Resolves exactly once
    /// and always closes the transport on the way out.
    pub async fn run(mut self) -> ResultCode {
        self.start();
        let code = loop {
            if let Some(code) = self.resolved {
                break code;
            }
            // Deterministic tie-breaking: inbound traffic outranks the
            // timers, and the offline/print deadline outranks a recovery
            // tick due at the same instant
            let wake = tokio::select! {
                biased;
                ev = self.transport.next_event() => Wake::Event(ev),
                _ = sleep_opt(self.deadline_at) => Wake::Deadline,
                _ = sleep_opt(self.recovery_at) => Wake::Recovery,
            };
            match wake {
                Wake::Event(TransportEvent::Data(chunk)) => self.on_data(chunk),
                Wake::Event(TransportEvent::Drain) => self.drain = true,
                Wake::Event(TransportEvent::Closed) => self.resolve(ResultCode::Disconnect),
                Wake::Recovery => {
                    self.recovery_at = None;
                    self.on_recovery();
                }
                Wake::Deadline => {
                    self.deadline_at = None;
                    self.on_deadline();
                }
            }
        };
        self.transport.close().await;
        code
    }

    fn wants_drawer(&self) -> bool {
        self.opts.status_only && self.opts.drawer
    }

    /// Write the hello and arm the first recovery window.
    fn start(&mut self) {
        self.state = State::HandshakeSent;
        let hello = self.decoder.hello(self.wants_drawer());
        debug!(family = %self.decoder.family(), "handshake");
        self.drain = self.transport.write(&hello);
        if self.decoder.handshake_is_reset() {
            // No decoded handshake response for this family
            self.enter_status_ready();
        } else {
            self.recovery_at = Some(Instant::now() + RECOVERY_WINDOW);
        }
    }

    fn enter_status_ready(&mut self) {
        self.state = State::StatusReady;
        self.recovering = false;
        debug!("enabling automatic status");
        self.drain = self.transport.write(self.decoder.asb_enable());
        self.recovery_at = Some(Instant::now() + RECOVERY_WINDOW);
    }

    fn enter_printing(&mut self) {
        self.state = State::Printing;
        self.recovering = false;
        self.recovery_at = None;
        self.deadline_at = (self.opts.timeout_secs > 0)
            .then(|| Instant::now() + Duration::from_secs(u64::from(self.opts.timeout_secs)));
        let job = self.decoder.prepare_job(&self.job);
        info!(bytes = job.len(), "transmitting job");
        self.drain = self.transport.write(&job);
    }

    fn on_data(&mut self, chunk: Vec<u8>) {
        if self.state == State::Closed {
            return;
        }
        if self.error_pending {
            // Whatever the detail payload says, the outcome is `error`
            self.resolve(ResultCode::Error);
            return;
        }
        self.buf.extend_from_slice(&chunk);
        // Re-scan from the front until a pass makes no progress; status
        // frames arrive partial and interleaved
        while self.resolved.is_none() && !self.buf.is_empty() {
            let before = self.buf.len();
            self.scan_once();
            if self.buf.len() == before {
                break;
            }
        }
    }

    fn scan_once(&mut self) {
        let phase = if self.state == State::HandshakeSent {
            Phase::Handshake
        } else {
            Phase::Status
        };
        match self.decoder.classify(&self.buf, phase, self.wants_drawer()) {
            Classification::Incomplete => {}
            Classification::Skip(n) => {
                trace!(n, "discarding unrecognized bytes");
                self.buf.drain(..n);
            }
            Classification::Frame { consumed, verdict } => {
                self.buf.drain(..consumed);
                self.on_verdict(verdict);
            }
        }
    }

    fn on_verdict(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Fault(code) => self.resolve(code),
            Verdict::ErrorPending => match self.decoder.error_detail_request() {
                Some(req) => {
                    debug!("error bit set; requesting detail");
                    self.drain = self.transport.write(req);
                    self.error_pending = true;
                    self.recovery_at = Some(Instant::now() + ERROR_DETAIL_WINDOW);
                }
                None => self.resolve(ResultCode::Error),
            },
            Verdict::Busy | Verdict::BlockData => {}
            Verdict::Ready { drawer } | Verdict::Complete { drawer } => {
                let complete = matches!(verdict, Verdict::Complete { .. });
                match self.state {
                    State::HandshakeSent | State::StatusReady if self.opts.status_only => {
                        self.resolve_status(drawer);
                    }
                    State::HandshakeSent => self.enter_status_ready(),
                    State::StatusReady => self.enter_printing(),
                    State::Printing => {
                        if complete && self.drain {
                            self.resolve(ResultCode::Success);
                        }
                    }
                    State::Opened | State::Closed => {}
                }
            }
        }
    }

    /// Resolve a status-only inquiry from a clean frame.
    fn resolve_status(&mut self, drawer: Option<bool>) {
        let code = if self.opts.drawer {
            match drawer {
                Some(true) => ResultCode::DrawerOpen,
                Some(false) => ResultCode::DrawerClosed,
                // Family has no drawer sensing
                None => ResultCode::Online,
            }
        } else {
            ResultCode::Online
        };
        self.resolve(code);
    }

    fn on_recovery(&mut self) {
        if self.error_pending {
            // Detail never arrived
            self.resolve(ResultCode::Error);
            return;
        }
        match self.state {
            State::HandshakeSent | State::StatusReady => {
                if !self.recovering {
                    self.recovering = true;
                    warn!("no status response; starting recovery");
                    self.deadline_at = Some(Instant::now() + OFFLINE_DEADLINE);
                } else if self.drain {
                    let mut payload = vec![0u8; FLUSH_LEN];
                    payload.extend_from_slice(&self.decoder.hello(self.wants_drawer()));
                    payload.extend_from_slice(self.decoder.asb_enable());
                    trace!("recovery retransmission");
                    self.drain = self.transport.write(&payload);
                }
                self.recovery_at = Some(Instant::now() + RECOVERY_INTERVAL);
            }
            _ => {}
        }
    }

    fn on_deadline(&mut self) {
        match self.state {
            State::Printing => {
                warn!("no completion before the print deadline");
                self.resolve(ResultCode::Timeout);
            }
            State::Closed => {}
            _ => {
                warn!("no qualifying status within the offline ceiling");
                self.resolve(ResultCode::Offline);
            }
        }
    }

    fn resolve(&mut self, code: ResultCode) {
        if self.state == State::Closed {
            return;
        }
        self.state = State::Closed;
        self.recovery_at = None;
        self.deadline_at = None;
        self.error_pending = false;
        self.resolved = Some(code);
        info!(result = %code, "session resolved");
    }
}

/// Sleep until the given instant, or forever when there is no timer.
async fn sleep_opt(at: Option<Instant>) {
    match at {
        Some(t) => tokio::time::sleep_until(t).await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    fn opts() -> SessionOptions {
        SessionOptions::default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_loss_resolves_disconnect() {
        let mock = MockTransport::new(vec![]).close_at(50);
        let machine = Machine::new(PrinterFamily::Escpos, Box::new(mock), vec![], opts());
        assert_eq!(machine.run().await, ResultCode::Disconnect);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_detail_timeout_resolves_error() {
        // Realtime response with the error bit: detail request goes out,
        // nothing answers, the 1s sub-timer resolves plain `error`
        let mock = MockTransport::new(vec![(10, vec![0x52])]);
        let log = mock.log();
        let start = Instant::now();
        let machine = Machine::new(PrinterFamily::Escpos, Box::new(mock), vec![], opts());
        assert_eq!(machine.run().await, ResultCode::Error);
        assert_eq!(start.elapsed(), Duration::from_millis(1010));
        let log = log.lock().unwrap();
        assert_eq!(log[0].bytes, vec![0x10, 0x04, 0x02]);
        assert_eq!(log[1].bytes, vec![0x10, 0x04, 0x03]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_detail_reply_resolves_error() {
        let mock = MockTransport::new(vec![(10, vec![0x52]), (200, vec![0x00])]);
        let start = Instant::now();
        let machine = Machine::new(PrinterFamily::Escpos, Box::new(mock), vec![], opts());
        assert_eq!(machine.run().await, ResultCode::Error);
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_disables_print_deadline() {
        // Handshake ok, ASB ready, job sent; nothing completes but the
        // deadline is off, so the eventual fault frame decides
        let mut options = opts();
        options.timeout_secs = 0;
        let mock = MockTransport::new(vec![
            (0, vec![0x12]),
            (10, vec![0x10, 0x00, 0x00, 0x00]),
            (700_000, vec![0x16]),
        ]);
        let machine = Machine::new(
            PrinterFamily::Escpos,
            Box::new(mock),
            vec![0xAA],
            options,
        );
        assert_eq!(machine.run().await, ResultCode::CoverOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sii_skips_handshake_and_reports_online() {
        let mut options = opts();
        options.status_only = true;
        let frame = vec![0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80];
        let mock = MockTransport::new(vec![(20, frame)]);
        let log = mock.log();
        let machine = Machine::new(PrinterFamily::Sii, Box::new(mock), vec![], options);
        assert_eq!(machine.run().await, ResultCode::Online);
        // Reset and enable both go out before any response
        let log = log.lock().unwrap();
        assert_eq!(log[0].bytes, vec![0x1B, 0x40]);
        assert_eq!(log[1].bytes, vec![0x1D, 0x61, 0xFF]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_star_drawer_inquiry() {
        let mut options = opts();
        options.status_only = true;
        options.drawer = true;
        // Clean 7-byte frame with the compulsion switch bit set
        let frame = vec![0x0F, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00];
        let mock = MockTransport::new(vec![(20, frame)]);
        let machine = Machine::new(PrinterFamily::Star, Box::new(mock), vec![], options);
        assert_eq!(machine.run().await, ResultCode::DrawerOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fragmented_frame_reassembly() {
        // An ASB frame split byte-by-byte must still classify
        let mock = MockTransport::new(vec![
            (0, vec![0x12]),
            (10, vec![0x10]),
            (20, vec![0x00]),
            (30, vec![0x00]),
            (40, vec![0x00]),
            (900, vec![0x12]),
        ]);
        let machine = Machine::new(
            PrinterFamily::Escpos,
            Box::new(mock),
            vec![0xAA],
            opts(),
        );
        assert_eq!(machine.run().await, ResultCode::Success);
    }
}
