//! # TCP Transport
//!
//! Network printers accept raw command streams on TCP port 9100. The
//! socket is split into owned halves: the reader task forwards inbound
//! chunks as [`TransportEvent::Data`], the writer task drains the
//! outbound queue and reports drain edges.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use super::{Pump, READ_CHUNK, Transport, TransportEvent};
use crate::destination::NETWORK_PORT;
use crate::error::ReciboError;

pub struct TcpTransport {
    pump: Pump,
}

impl TcpTransport {
    /// Connect to `host` on the raw printing port.
    ///
    /// Connection refused/reset surfaces as a transport error, which the
    /// session maps to `disconnect`.
    pub async fn open(host: &str) -> Result<Self, ReciboError> {
        let stream = TcpStream::connect((host, NETWORK_PORT))
            .await
            .map_err(|e| ReciboError::Transport(format!("connect {host}:{NETWORK_PORT}: {e}")))?;
        stream.set_nodelay(true).ok();
        debug!(host, port = NETWORK_PORT, "connected");

        let (read_half, write_half) = stream.into_split();
        let (mut pump, mut side) = Pump::new();

        let events = side.events.clone();
        let reader = tokio::spawn(async move {
            let mut half = read_half;
            let mut buf = [0u8; READ_CHUNK];
            loop {
                match half.read(&mut buf).await {
                    Ok(0) | Err(_) => {
                        let _ = events.send(TransportEvent::Closed);
                        break;
                    }
                    Ok(n) => {
                        if events.send(TransportEvent::Data(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let events = side.events.clone();
        let writer = tokio::spawn(async move {
            let mut half = write_half;
            while let Some(chunk) = side.out_rx.recv().await {
                if let Err(e) = half.write_all(&chunk).await {
                    debug!(error = %e, "write failed");
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
impl Transport for TcpTransport {
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

// ============================================================================
// TESTS
// ============================================================================
