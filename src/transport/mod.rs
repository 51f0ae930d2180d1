//! # Printer Transport Layer
//!
//! This module provides communication backends for exchanging bytes with
//! printers.
//!
//! ## Available Transports
//!
//! - [`tcp`]: network printers on TCP port 9100
//! - [`serial`]: serial lines (RS-232, USB-serial adapters)
//! - [`usb`]: USB printer class character devices (`/dev/usb/lp*`)
//! - [`mock`]: scripted transport for tests
//!
//! ## Contract
//!
//! A transport is an event source plus a drain-aware writer. Inbound
//! chunks, drain edges and connection loss all surface through
//! [`Transport::next_event`]; [`Transport::write`] queues bytes and
//! reports whether the outbound buffer is still below the high-water
//! mark (`true` = keep writing, `false` = back off until a
//! [`TransportEvent::Drain`]). `close` releases everything and is safe
//! to call any number of times.
//!
//! Each backend runs one reader task and one writer task; the handle the
//! session holds never blocks on device I/O itself.

pub mod mock;
pub mod serial;
pub mod tcp;
pub mod usb;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::destination::Destination;
use crate::error::ReciboError;

/// Outbound bytes queued beyond this count report backpressure.
pub const WRITE_HIGH_WATER: usize = 16 * 1024;

/// Read buffer size for all backends.
pub(crate) const READ_CHUNK: usize = 4096;

/// Something the transport wants the session to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Inbound bytes, exactly as they arrived.
    Data(Vec<u8>),
    /// The outbound queue emptied after a backpressured write.
    Drain,
    /// Connection lost, device vanished, or any other transport fault.
    Closed,
}

/// One open connection to a printer.
#[async_trait]
pub trait Transport: Send {
    /// Wait for the next transport event. Resolves `Closed` forever once
    /// the connection is gone.
    async fn next_event(&mut self) -> TransportEvent;

    /// Queue bytes for transmission. Returns `false` when the outbound
    /// queue is above the high-water mark (drain semantics); the bytes
    /// are still queued and will be written. No-op after close.
    fn write(&mut self, bytes: &[u8]) -> bool;

    /// Whether the outbound queue is currently empty.
    fn is_drained(&self) -> bool;

    /// Release all resources. Idempotent.
    async fn close(&mut self);
}

/// Open the transport for a parsed destination.
pub async fn open(dest: &Destination) -> Result<Box<dyn Transport>, ReciboError> {
    match dest {
        Destination::Network(host) => Ok(Box::new(tcp::TcpTransport::open(host).await?)),
        Destination::Serial(path, params) => {
            Ok(Box::new(serial::SerialTransport::open(path, *params)?))
        }
        Destination::Usb(path) => Ok(Box::new(usb::UsbTransport::open(path)?)),
    }
}

// ============================================================================
// SHARED PLUMBING
// ============================================================================

/// Reader/writer task plumbing shared by the real backends.
///
/// The writer task owns the device handle for writes and pulls chunks off
/// `out_tx`; a shared pending-byte counter implements drain semantics. The
/// reader task pushes [`TransportEvent`]s into `events`.
pub(crate) struct Pump {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    out_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    pending: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

/// The task-side ends of a [`Pump`].
pub(crate) struct PumpTaskSide {
    pub events: mpsc::UnboundedSender<TransportEvent>,
    pub out_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    pub pending: Arc<AtomicUsize>,
    pub closed: Arc<AtomicBool>,
}

impl Pump {
    pub fn new() -> (Self, PumpTaskSide) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicBool::new(false));
        (
            Self {
                events: events_rx,
                out_tx: Some(out_tx),
                pending: Arc::clone(&pending),
                closed: Arc::clone(&closed),
                tasks: Vec::new(),
            },
            PumpTaskSide {
                events: events_tx,
                out_rx,
                pending,
                closed,
            },
        )
    }

    /// Register a task for teardown on close.
    pub fn track(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    pub async fn next_event(&mut self) -> TransportEvent {
        match self.events.recv().await {
            Some(ev) => ev,
            None => TransportEvent::Closed,
        }
    }

    pub fn write(&mut self, bytes: &[u8]) -> bool {
        if self.closed.load(Ordering::SeqCst) || bytes.is_empty() {
            return self.is_drained();
        }
        let Some(out_tx) = &self.out_tx else {
            return self.is_drained();
        };
        let queued = self.pending.fetch_add(bytes.len(), Ordering::SeqCst) + bytes.len();
        if out_tx.send(bytes.to_vec()).is_err() {
            // Writer task is gone; a Closed event is already on its way
            self.pending.fetch_sub(bytes.len(), Ordering::SeqCst);
            return false;
        }
        queued <= WRITE_HIGH_WATER
    }

    pub fn is_drained(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0
    }

    pub async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        // Dropping the sender lets the writer task run down its queue
        self.out_tx = None;
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl PumpTaskSide {
    /// Account for a written chunk; emits `Drain` when the queue empties.
    pub fn wrote(&self, len: usize) {
        if self.pending.fetch_sub(len, Ordering::SeqCst) == len {
            let _ = self.events.send(TransportEvent::Drain);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pump_write_accounting() {
        let (mut pump, side) = Pump::new();
        assert!(pump.is_drained());
        assert!(pump.write(&[0u8; 100]));
        assert!(!pump.is_drained());
        // Past the high-water mark the write still queues but reports false
        assert!(!pump.write(&vec![0u8; WRITE_HIGH_WATER]));
        drop(side);
    }

    #[tokio::test]
    async fn test_pump_drain_event_on_empty_queue() {
        let (mut pump, mut side) = Pump::new();
        pump.write(&[1, 2, 3]);
        let chunk = side.out_rx.recv().await.unwrap();
        assert_eq!(chunk, vec![1, 2, 3]);
        side.wrote(chunk.len());
        assert_eq!(pump.next_event().await, TransportEvent::Drain);
        assert!(pump.is_drained());
    }

    #[tokio::test]
    async fn test_pump_close_is_idempotent() {
        let (mut pump, _side) = Pump::new();
        pump.close().await;
        pump.close().await;
        // Writes after close are no-ops
        assert!(pump.write(&[1, 2, 3]));
        assert!(pump.is_drained());
    }

    #[tokio::test]
    async fn test_pump_closed_channel_yields_closed() {
        let (mut pump, side) = Pump::new();
        drop(side);
        assert_eq!(pump.next_event().await, TransportEvent::Closed);
    }
}
