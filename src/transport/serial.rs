//! # Serial Line Transport
//!
//! Serial printers are opened through their tty device node and the line
//! is configured with termios: raw mode (no input/output processing, no
//! echo, no canonical buffering) plus the baud rate, parity, character
//! size, stop bits and flow control parsed from the destination string.
//!
//! ## Raw Mode
//!
//! Binary command streams must pass through unmodified, so all of the
//! usual tty translation is disabled:
//!
//! - **Input flags**: IGNBRK, BRKINT, PARMRK, ISTRIP, INLCR, IGNCR, ICRNL
//! - **Output flags**: OPOST
//! - **Local flags**: ECHO, ECHONL, ICANON, ISIG, IEXTEN
//!
//! XON/XOFF (IXON/IXOFF/IXANY) is likewise off unless the destination
//! explicitly selects software flow control — 0x11/0x13 appear freely in
//! raster data.
//!
//! ## Reads
//!
//! The line is polled with `VMIN = 0, VTIME = 1`: a blocking read returns
//! after at most 100 ms with whatever arrived. The reader loop runs on
//! the blocking pool and forwards non-empty chunks as events.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileTypeExt;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tracing::debug;

use super::{Pump, READ_CHUNK, Transport, TransportEvent};
use crate::destination::{FlowControl, Parity, SerialParams};
use crate::error::ReciboError;

pub struct SerialTransport {
    pump: Pump,
}

impl SerialTransport {
    /// Open and configure a serial device.
    ///
    /// The path must name a presently enumerated character device;
    /// anything else (missing node, regular file) is a transport error
    /// and the session reports `disconnect`.
    pub fn open(path: &str, params: SerialParams) -> Result<Self, ReciboError> {
        let meta = std::fs::metadata(path)
            .map_err(|e| ReciboError::Transport(format!("{path}: {e}")))?;
        if !meta.file_type().is_char_device() {
            return Err(ReciboError::Transport(format!(
                "{path} is not a serial device"
            )));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| ReciboError::Transport(format!("open {path}: {e}")))?;
        configure_line(file.as_raw_fd(), params)?;
        debug!(path, baud = params.baud_rate, "serial line configured");

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
                match file.read(&mut buf) {
                    // VTIME expired with nothing on the line
                    Ok(0) => continue,
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
                }
            }
        });

        let events = side.events.clone();
        let writer = tokio::task::spawn_blocking(move || {
            let mut file = writer_file;
            while let Some(chunk) = side.out_rx.blocking_recv() {
                // Chunked writes keep slow lines responsive to teardown
                let mut ok = true;
                for piece in chunk.chunks(READ_CHUNK) {
                    if file.write_all(piece).and_then(|()| file.flush()).is_err() {
                        let _ = events.send(TransportEvent::Closed);
                        ok = false;
                        break;
                    }
                }
                if !ok {
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
impl Transport for SerialTransport {
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

/// Map a requested baud rate to its termios speed constant.
fn baud_constant(baud: u32) -> Result<libc::speed_t, ReciboError> {
    let speed = match baud {
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        230400 => libc::B230400,
        other => {
            return Err(ReciboError::Transport(format!(
                "unsupported baud rate {other}"
            )));
        }
    };
    Ok(speed)
}

/// Configure a serial file descriptor: raw mode plus line parameters.
#[cfg(unix)]
fn configure_line(fd: i32, params: SerialParams) -> Result<(), ReciboError> {
    use std::mem::MaybeUninit;

    let mut termios = MaybeUninit::uninit();
    let result = unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) };
    if result != 0 {
        return Err(ReciboError::Transport(format!(
            "tcgetattr failed: {}",
            io::Error::last_os_error()
        )));
    }
    let mut termios = unsafe { termios.assume_init() };

    // Input flags: disable all processing
    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);

    // Output flags: disable post-processing
    termios.c_oflag &= !libc::OPOST;

    // Local flags: disable echo, canonical mode, signals
    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);

    // Character size
    termios.c_cflag &= !libc::CSIZE;
    termios.c_cflag |= match params.data_bits {
        7 => libc::CS7,
        _ => libc::CS8,
    };

    // Parity
    match params.parity {
        Parity::None => termios.c_cflag &= !libc::PARENB,
        Parity::Even => {
            termios.c_cflag |= libc::PARENB;
            termios.c_cflag &= !libc::PARODD;
        }
        Parity::Odd => termios.c_cflag |= libc::PARENB | libc::PARODD,
    }

    // Stop bits
    if params.stop_bits == 2 {
        termios.c_cflag |= libc::CSTOPB;
    } else {
        termios.c_cflag &= !libc::CSTOPB;
    }

    // Flow control
    match params.flow_control {
        FlowControl::None => termios.c_cflag &= !libc::CRTSCTS,
        FlowControl::RtsCts => termios.c_cflag |= libc::CRTSCTS,
        FlowControl::XonXoff => termios.c_iflag |= libc::IXON | libc::IXOFF,
    }

    // Keep the receiver on and ignore modem control lines
    termios.c_cflag |= libc::CREAD | libc::CLOCAL;

    // Poll reads: return after at most 100ms with whatever arrived
    termios.c_cc[libc::VMIN] = 0;
    termios.c_cc[libc::VTIME] = 1;

    let speed = baud_constant(params.baud_rate)?;
    unsafe {
        libc::cfsetispeed(&mut termios, speed);
        libc::cfsetospeed(&mut termios, speed);
    }

    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) };
    if result != 0 {
        return Err(ReciboError::Transport(format!(
            "tcsetattr failed: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

#[cfg(not(unix))]
fn configure_line(_fd: i32, _params: SerialParams) -> Result<(), ReciboError> {
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
