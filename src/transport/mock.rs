//! # Scripted Mock Transport
//!
//! Test double for session/state-machine tests: inbound traffic is a
//! script of `(offset, bytes)` pairs replayed on the (usually paused)
//! tokio clock, and every write is recorded with its timestamp so tests
//! can assert both content and timing of outbound traffic.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{Transport, TransportEvent};

/// One captured outbound write.
#[derive(Debug, Clone)]
pub struct WriteRecord {
    pub at: Instant,
    pub bytes: Vec<u8>,
}

/// Shared handle to the captured write log.
pub type WriteLog = Arc<Mutex<Vec<WriteRecord>>>;

pub struct MockTransport {
    script: VecDeque<(Duration, TransportEvent)>,
    started: Option<Instant>,
    log: WriteLog,
    closed: bool,
}

impl MockTransport {
    /// Build a transport that replays `Data` events at the given
    /// millisecond offsets from the first poll.
    pub fn new(script: Vec<(u64, Vec<u8>)>) -> Self {
        Self {
            script: script
                .into_iter()
                .map(|(ms, bytes)| (Duration::from_millis(ms), TransportEvent::Data(bytes)))
                .collect(),
            started: None,
            log: Arc::new(Mutex::new(Vec::new())),
            closed: false,
        }
    }

    /// Append a connection loss at the given offset.
    pub fn close_at(mut self, ms: u64) -> Self {
        self.script
            .push_back((Duration::from_millis(ms), TransportEvent::Closed));
        self
    }

    /// Handle to the write log, valid after the transport is consumed.
    pub fn log(&self) -> WriteLog {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn next_event(&mut self) -> TransportEvent {
        let started = *self.started.get_or_insert_with(Instant::now);
        // Peek-sleep-pop keeps this cancel-safe: dropping the future
        // mid-sleep (a session timer fired first) must not lose the event
        match self.script.front() {
            Some(&(offset, _)) => {
                tokio::time::sleep_until(started + offset).await;
                match self.script.pop_front() {
                    Some((_, event)) => event,
                    None => TransportEvent::Closed,
                }
            }
            // Script exhausted: nothing further ever arrives
            None => std::future::pending().await,
        }
    }

    fn write(&mut self, bytes: &[u8]) -> bool {
        if self.closed {
            return true;
        }
        self.log.lock().unwrap().push(WriteRecord {
            at: Instant::now(),
            bytes: bytes.to_vec(),
        });
        // The mock drains instantly
        true
    }

    fn is_drained(&self) -> bool {
        true
    }

    async fn close(&mut self) {
        self.closed = true;
        self.script.clear();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_script_replay_order_and_timing() {
        let mut mock = MockTransport::new(vec![(0, vec![1]), (250, vec![2])]);
        let start = Instant::now();
        assert_eq!(mock.next_event().await, TransportEvent::Data(vec![1]));
        assert_eq!(mock.next_event().await, TransportEvent::Data(vec![2]));
        assert_eq!(start.elapsed(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_write_log_captures_bytes() {
        let mut mock = MockTransport::new(vec![]);
        let log = mock.log();
        mock.write(&[0xAA, 0xBB]);
        assert_eq!(log.lock().unwrap()[0].bytes, vec![0xAA, 0xBB]);
    }

    #[tokio::test]
    async fn test_writes_after_close_are_dropped() {
        let mut mock = MockTransport::new(vec![]);
        let log = mock.log();
        mock.close().await;
        mock.write(&[0xAA]);
        assert!(log.lock().unwrap().is_empty());
    }
}
