//! # USB Character Device Transport
//!
//! USB printer class devices (`/dev/usb/lp*`) are plain character
//! specials: no line discipline, no readiness events. Input is polled at
//! a fixed 100 ms interval with `poll(2)` and surfaced as synthetic data
//! events; writes are synchronous blocking calls wrapped onto the
//! blocking pool to match the async contract.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tracing::debug;

use super::{Pump, READ_CHUNK, Transport, TransportEvent};
use crate::error::ReciboError;

/// Input poll interval.
const POLL_INTERVAL_MS: i32 = 100;

pub struct UsbTransport {
    pump: Pump,
}

impl UsbTransport {
    /// Open the character device for read+write.
    pub fn open(path: &str) -> Result<Self, ReciboError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| ReciboError::Transport(format!("open {path}: {e}")))?;
        debug!(path, "usb device opened");

        let writer_file = file
            .try_clone()
            .map_err(|e| ReciboError::Transport(format!("clone {path}: {e}")))?;
        let (mut pump, mut side) = Pump::new();

        let events = side.events.clone();
        let closed = side.closed.clone();
        let reader = tokio::task::spawn_blocking(move || {
            let mut file = file;
            let mut buf = [0u8; READ_CHUNK];
            loop {
                if closed.load(Ordering::SeqCst) {
                    break;
                }
                match poll_readable(&file) {
                    Ok(false) => continue,
                    Ok(true) => match file.read(&mut buf) {
                        Ok(0) => {
                            let _ = events.send(TransportEvent::Closed);
                            break;
                        }
                        Ok(n) => {
                            if events.send(TransportEvent::Data(buf[..n].to_vec())).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(_) => {
                            let _ = events.send(TransportEvent::Closed);
                            break;
                        }
                    },
                    Err(_) => {
                        let _ = events.send(TransportEvent::Closed);
                        break;
                    }
                }
            }
        });

        let events = side.events.clone();
        let writer = tokio::task::spawn_blocking(move || {
            let mut file = writer_file;
            while let Some(chunk) = side.out_rx.blocking_recv() {
                if file.write_all(&chunk).and_then(|()| file.flush()).is_err() {
                    let _ = events.send(TransportEvent::Closed);
                    break;
                }
                side.wrote(chunk.len());
            }
        });

        pump.track(reader);
        pump.track(writer);
        Ok(Self { pump })
    }
}

#[async_trait]
impl Transport for UsbTransport {
    async fn next_event(&mut self) -> TransportEvent {
        self.pump.next_event().await
    }

    fn write(&mut self, bytes: &[u8]) -> bool {
        self.pump.write(bytes)
    }

    fn is_drained(&self) -> bool {
        self.pump.is_drained()
    }

    async fn close(&mut self) {
        self.pump.close().await;
    }
}

/// Wait up to one poll interval for the device to become readable.
#[cfg(unix)]
fn poll_readable(file: &File) -> Result<bool, ReciboError> {
    let mut fds = libc::pollfd {
        fd: file.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    let rc = unsafe { libc::poll(&mut fds, 1, POLL_INTERVAL_MS) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(ReciboError::Transport(format!("poll failed: {err}")));
    }
    if fds.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
        return Err(ReciboError::Transport("device gone".to_string()));
    }
    Ok(rc > 0 && fds.revents & libc::POLLIN != 0)
}

#[cfg(not(unix))]
fn poll_readable(_file: &File) -> Result<bool, ReciboError> {
    std::thread::sleep(std::time::Duration::from_millis(POLL_INTERVAL_MS as u64));
    Ok(false)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_device_fails() {
        assert!(UsbTransport::open("/dev/usb/lp99").is_err());
    }
}
