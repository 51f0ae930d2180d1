//! # Session Tests
//!
//! End-to-end protocol scenarios driven through a scripted mock
//! transport on the paused tokio clock. Timing assertions are exact:
//! virtual time only advances through the state machine's own timers,
//! so recovery/offline/timeout edges land on the expected second.

use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::Instant;

use recibo::protocol::PrinterFamily;
use recibo::session::{self, Outcome, PrintSession, ResultCode, SessionOptions};
use recibo::transport::mock::MockTransport;

/// Escpos realtime status byte with the given fault bits.
fn escpos_realtime(bits: u8) -> Vec<u8> {
    vec![0x12 | bits]
}

/// Escpos 4-byte automatic status frame.
fn escpos_asb(b0_extra: u8, b1: u8, b2: u8, b3: u8) -> Vec<u8> {
    vec![0x10 | b0_extra, b1, b2, b3]
}

/// Sii 8-byte automatic status frame.
fn sii_frame(b0: u8, b1: u8) -> Vec<u8> {
    vec![b0, b1, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80]
}

/// Star 7-byte automatic status frame (header 0x0F declares length 7).
fn star_frame(b2: u8, b3: u8, b5: u8) -> Vec<u8> {
    vec![0x0F, 0x00, b2, b3, 0x00, b5, 0x00]
}

async fn run(
    family: PrinterFamily,
    mock: MockTransport,
    job: Vec<u8>,
    options: SessionOptions,
) -> ResultCode {
    session::run_with_transport(Box::new(mock), family, job, options).await
}

fn opts() -> SessionOptions {
    SessionOptions::default()
}

// ============================================================================
// FAULT CLASSIFICATION
// ============================================================================

#[tokio::test(start_paused = true)]
async fn cover_open_at_handshake_escpos() {
    let mock = MockTransport::new(vec![(10, escpos_realtime(0x04))]);
    let log = mock.log();
    let code = run(PrinterFamily::Escpos, mock, vec![0xAA], opts()).await;
    assert_eq!(code, ResultCode::CoverOpen);
    // Only the hello went out; nothing after closure
    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].bytes, vec![0x10, 0x04, 0x02]);
}

#[tokio::test(start_paused = true)]
async fn cover_open_at_handshake_sii() {
    let mock = MockTransport::new(vec![(10, sii_frame(0xA0, 0x80))]);
    let log = mock.log();
    let code = run(PrinterFamily::Sii, mock, vec![0xAA], opts()).await;
    assert_eq!(code, ResultCode::CoverOpen);
    // Reset + enable during the handshake, nothing after closure
    assert_eq!(log.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn cover_open_at_handshake_star() {
    let mock = MockTransport::new(vec![(10, star_frame(0x20, 0x00, 0x00))]);
    let log = mock.log();
    let code = run(PrinterFamily::Star, mock, vec![0xAA], opts()).await;
    assert_eq!(code, ResultCode::CoverOpen);
    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].bytes, vec![0x1B, 0x06, 0x01]);
}

#[tokio::test(start_paused = true)]
async fn paper_empty_at_handshake() {
    let mock = MockTransport::new(vec![(10, escpos_realtime(0x20))]);
    let code = run(PrinterFamily::Escpos, mock, vec![0xAA], opts()).await;
    assert_eq!(code, ResultCode::PaperEmpty);

    let mock = MockTransport::new(vec![(10, sii_frame(0x80, 0x8C))]);
    let code = run(PrinterFamily::Sii, mock, vec![0xAA], opts()).await;
    assert_eq!(code, ResultCode::PaperEmpty);

    let mock = MockTransport::new(vec![(10, star_frame(0x00, 0x00, 0x08))]);
    let code = run(PrinterFamily::Star, mock, vec![0xAA], opts()).await;
    assert_eq!(code, ResultCode::PaperEmpty);
}

#[tokio::test(start_paused = true)]
async fn paper_empty_at_automatic_status_time() {
    // Healthy handshake, then the fault arrives in ASB traffic
    let mock = MockTransport::new(vec![
        (10, escpos_realtime(0)),
        (500, escpos_asb(0, 0x00, 0x0C, 0x00)),
    ]);
    let code = run(PrinterFamily::Escpos, mock, vec![0xAA], opts()).await;
    assert_eq!(code, ResultCode::PaperEmpty);
}

// ============================================================================
// LIVENESS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn silent_printer_recovers_then_goes_offline() {
    let mock = MockTransport::new(vec![]);
    let log = mock.log();
    let start = Instant::now();
    let code = run(PrinterFamily::Escpos, mock, vec![0xAA], opts()).await;
    assert_eq!(code, ResultCode::Offline);
    // Offline lands at 12s from handshake: 2s silence + 10s ceiling
    assert_eq!(start.elapsed(), Duration::from_secs(12));

    let log = log.lock().unwrap();
    // Hello at 0, then retransmissions each second from 3s through 11s
    assert_eq!(log.len(), 10);
    assert_eq!(log[1].at - start, Duration::from_secs(3));
    assert_eq!(log[9].at - start, Duration::from_secs(11));
    // Each retransmission leads with the 8 KiB zero flush
    assert_eq!(log[1].bytes.len(), 8192 + 3 + 3);
    assert!(log[1].bytes[..8192].iter().all(|&b| b == 0));
    assert_eq!(&log[1].bytes[8192..8195], &[0x10, 0x04, 0x02]);
    assert_eq!(&log[1].bytes[8195..], &[0x1D, 0x61, 0xFF]);
}

#[tokio::test(start_paused = true)]
async fn print_deadline_resolves_timeout_not_before() {
    let mut options = opts();
    options.timeout_secs = 5;
    let mock = MockTransport::new(vec![
        (0, escpos_realtime(0)),
        (100, escpos_asb(0, 0, 0, 0)),
    ]);
    let log = mock.log();
    let start = Instant::now();
    let code = run(PrinterFamily::Escpos, mock, vec![0x1B, 0x40, 0xAA], options).await;
    assert_eq!(code, ResultCode::Timeout);
    // Five seconds from the send instant, not from session start
    assert_eq!(start.elapsed(), Duration::from_millis(5100));
    // hello, enable, then the job itself
    let log = log.lock().unwrap();
    assert_eq!(log.len(), 3);
    assert_eq!(log[2].bytes, vec![0x1B, 0x40, 0xAA]);
    assert_eq!(log[2].at - start, Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn connection_loss_resolves_disconnect() {
    let mock = MockTransport::new(vec![(0, escpos_realtime(0))]).close_at(300);
    let code = run(PrinterFamily::Escpos, mock, vec![0xAA], opts()).await;
    assert_eq!(code, ResultCode::Disconnect);
}

// ============================================================================
// IDENTITY PATH
// ============================================================================

#[tokio::test]
async fn empty_destination_returns_buffer_unchanged() {
    let buffers: [&[u8]; 3] = [&[0x00], &[0x1B, 0x40, 0xFF, 0x00, 0x7F], &[0xAA; 4096]];
    for buf in buffers {
        let session = PrintSession {
            destination: None,
            family: PrinterFamily::Star,
            options: SessionOptions::default(),
        };
        assert_eq!(
            session.run(buf.to_vec()).await,
            Outcome::Passthrough(buf.to_vec())
        );
    }
}

// ============================================================================
// END-TO-END SCENARIOS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn escpos_status_only_resolves_online_without_transmitting() {
    let mut options = opts();
    options.status_only = true;
    let mock = MockTransport::new(vec![
        (10, escpos_realtime(0)),
        (20, escpos_asb(0, 0, 0, 0)),
    ]);
    let log = mock.log();
    let code = run(
        PrinterFamily::Escpos,
        mock,
        vec![0xDE, 0xAD, 0xBE, 0xEF],
        options,
    )
    .await;
    assert_eq!(code, ResultCode::Online);
    // The command buffer never went out
    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].bytes, vec![0x10, 0x04, 0x02]);
}

#[tokio::test(start_paused = true)]
async fn star_print_end_to_end() {
    // Ack response, a clean ready frame, then a clean frame after the
    // job goes out while drained
    let mock = MockTransport::new(vec![
        (10, star_frame(0x00, 0x00, 0x00)),
        (50, star_frame(0x00, 0x00, 0x00)),
        (200, star_frame(0x00, 0x00, 0x00)),
    ]);
    let log = mock.log();
    let job = vec![0x1B, 0x40, 0xCA, 0xFE, 0x1B, 0x06, 0x01];
    let code = run(PrinterFamily::Star, mock, job, opts()).await;
    assert_eq!(code, ResultCode::Success);

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 3);
    // hello, status enable, then the rewritten job: leading reset becomes
    // reset-and-begin, the trailing ack marker is stripped
    assert_eq!(log[0].bytes, vec![0x1B, 0x06, 0x01]);
    assert_eq!(log[1].bytes, vec![0x1B, 0x1E, 0x61, 0x01]);
    assert_eq!(
        log[2].bytes,
        vec![0x1B, 0x40, 0x1B, 0x1E, 0x61, 0x01, 0xCA, 0xFE]
    );
}

#[tokio::test(start_paused = true)]
async fn sii_print_completes_on_idle_frame() {
    // Busy frames keep the session printing; the idle frame completes it
    let mock = MockTransport::new(vec![
        (10, sii_frame(0xC0, 0x80)),
        (50, sii_frame(0xC0, 0x80)),
        (300, sii_frame(0x80, 0x80)),
    ]);
    let start = Instant::now();
    let code = run(PrinterFamily::Sii, mock, vec![0x1B, 0x40, 0x55], opts()).await;
    assert_eq!(code, ResultCode::Success);
    assert_eq!(start.elapsed(), Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn escpos_drawer_inquiry() {
    let mut options = opts();
    options.status_only = true;
    options.drawer = true;
    // DLE EOT 1 response with the pin bit high
    let mock = MockTransport::new(vec![(10, vec![0x16])]);
    let log = mock.log();
    let code = run(PrinterFamily::Escpos, mock, vec![], options).await;
    assert_eq!(code, ResultCode::DrawerOpen);
    // The drawer variant of the hello was used
    assert_eq!(log.lock().unwrap()[0].bytes, vec![0x10, 0x04, 0x01]);

    let mut options = opts();
    options.status_only = true;
    options.drawer = true;
    let mock = MockTransport::new(vec![(10, vec![0x12])]);
    let code = run(PrinterFamily::Escpos, mock, vec![], options).await;
    assert_eq!(code, ResultCode::DrawerClosed);
}

#[tokio::test(start_paused = true)]
async fn noise_before_status_is_absorbed() {
    // Garbage bytes around a valid frame never fault the session
    let mut noisy = vec![0xFF, 0x00, 0x55];
    noisy.extend(escpos_realtime(0));
    let mock = MockTransport::new(vec![(10, noisy), (50, escpos_asb(0, 0, 0, 0)), (90, escpos_realtime(0))]);
    let code = run(PrinterFamily::Escpos, mock, vec![0xAA], opts()).await;
    assert_eq!(code, ResultCode::Success);
}

// ============================================================================
// DETERMINISM
// ============================================================================

#[test]
fn halftone_is_bit_reproducible() {
    use recibo::render::halftone::{Halftone, RasterImage};

    let mut pixels = Vec::new();
    for i in 0..(48 * 16 * 4) {
        pixels.push((i * 131 % 256) as u8);
    }
    let image = RasterImage::new(48, 16, pixels).unwrap();
    let encoder = Halftone {
        threshold: 140,
        gamma: 2.2,
        error_diffusion: true,
        below_sixteenths: 8,
    };
    let first = encoder.encode(&image);
    let second = encoder.encode(&image);
    assert_eq!(first, second);
}
