//! # Recibo CLI
//!
//! Command-line interface for driving receipt printers.
//!
//! ## Usage
//!
//! ```bash
//! # Send a prepared command stream to a network printer
//! recibo print receipt.bin -d 192.168.1.50
//!
//! # Same stream from stdin, over a serial line
//! cat receipt.bin | recibo print - -d /dev/ttyUSB0:19200,E
//!
//! # No destination: the stream passes through unchanged
//! recibo print receipt.bin > out.bin
//!
//! # Printer status / cash drawer status
//! recibo status -d 192.168.1.50 -p escpos
//! recibo status -d /dev/usb/lp0 --drawer
//!
//! # Print an image directly (halftoned, optionally rotated)
//! recibo image photo.png -d 192.168.1.50 --landscape
//! ```
//!
//! The result code is written to stdout (`success`, `coveropen`, ...);
//! the exit status is 0 for healthy outcomes and 1 otherwise.

use std::io::{Read, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use recibo::compose::{self, ComposeOptions};
use recibo::destination::Destination;
use recibo::error::ReciboError;
use recibo::protocol::PrinterFamily;
use recibo::render::halftone::{Halftone, RasterImage};
use recibo::session::{Outcome, PrintSession, SessionOptions};

/// Recibo - receipt printer driver
#[derive(Parser, Debug)]
#[command(name = "recibo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log protocol activity to stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct TargetArgs {
    /// Printer destination: IP literal, serial path[:params], or /dev/usb/lp*
    #[arg(short, long)]
    destination: Option<String>,

    /// Printer command language
    #[arg(short, long, default_value = "escpos")]
    printer: PrinterFamily,

    /// Print timeout in seconds (0 disables, out-of-range resets to 300)
    #[arg(short, long, default_value_t = 300)]
    timeout: u32,

    /// Report the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Transmit a prepared command stream
    Print {
        /// Command stream file, or `-` for stdin
        file: PathBuf,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Query printer status without printing
    Status {
        #[command(flatten)]
        target: TargetArgs,

        /// Report the cash drawer state instead of printer readiness
        #[arg(long)]
        drawer: bool,
    },

    /// Halftone an image file and print it
    Image {
        /// Image file (PNG, JPEG, ...)
        file: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        /// Rotate 90 degrees (landscape emulation)
        #[arg(long)]
        landscape: bool,

        /// Rotate 180 degrees
        #[arg(long)]
        upside_down: bool,

        /// Skip the closing paper cut
        #[arg(long)]
        no_cut: bool,

        /// Characters per line (24-96)
        #[arg(short, long, default_value_t = 48)]
        chars: u8,

        /// Left margin in character cells (0-24)
        #[arg(short = 'l', long, default_value_t = 0)]
        margin_left: u8,

        /// Right margin in character cells (0-24)
        #[arg(short = 'r', long, default_value_t = 0)]
        margin_right: u8,

        /// Halftone threshold (0-255)
        #[arg(long, default_value_t = 128)]
        threshold: u8,

        /// Gamma correction (0.1-10.0)
        #[arg(short, long, default_value_t = 1.8)]
        gamma: f32,

        /// Hard threshold instead of error diffusion
        #[arg(long)]
        no_diffusion: bool,

        /// Landscape resolution in dpi (180 or 203)
        #[arg(long, default_value_t = 203)]
        resolution: u16,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli.command).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Commands) -> Result<i32, ReciboError> {
    match command {
        Commands::Print { file, target } => {
            let data = read_input(&file)?;
            dispatch(&target, data, false, false).await
        }
        Commands::Status { target, drawer } => dispatch(&target, Vec::new(), true, drawer).await,
        Commands::Image {
            file,
            target,
            landscape,
            upside_down,
            no_cut,
            chars,
            margin_left,
            margin_right,
            threshold,
            gamma,
            no_diffusion,
            resolution,
        } => {
            let opts = ComposeOptions {
                chars_per_line: chars,
                margin_left,
                margin_right,
                upside_down,
                cut: !no_cut,
                resolution,
                halftone: Halftone {
                    threshold,
                    gamma,
                    error_diffusion: !no_diffusion,
                    ..Default::default()
                },
            }
            .normalized();
            let data = compose_image(&file, target.printer, landscape, opts)?;
            dispatch(&target, data, false, false).await
        }
    }
}

/// Build a session from the shared target arguments and run it.
async fn dispatch(
    target: &TargetArgs,
    data: Vec<u8>,
    status_only: bool,
    drawer: bool,
) -> Result<i32, ReciboError> {
    let destination = match target.destination.as_deref() {
        Some(s) if !s.is_empty() => Some(Destination::parse(s)?),
        _ => None,
    };
    if destination.is_none() && status_only {
        return Err(ReciboError::InvalidOption(
            "status inquiry needs a destination".to_string(),
        ));
    }

    let session = PrintSession {
        destination,
        family: target.printer,
        options: SessionOptions {
            timeout_secs: target.timeout,
            status_only,
            drawer,
        },
    };

    match session.run(data).await {
        Outcome::Passthrough(bytes) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
            Ok(0)
        }
        Outcome::Code(code) => {
            if target.json {
                println!("{}", serde_json::json!({ "result": code }));
            } else {
                println!("{code}");
            }
            Ok(if code.is_ok() { 0 } else { 1 })
        }
    }
}

/// Read a prepared command stream from a file or stdin.
fn read_input(file: &PathBuf) -> Result<Vec<u8>, ReciboError> {
    if file.as_os_str() == "-" {
        let mut data = Vec::new();
        std::io::stdin().lock().read_to_end(&mut data)?;
        Ok(data)
    } else {
        Ok(std::fs::read(file)?)
    }
}

/// Decode an image, scale it to the print width, and compose the
/// family-native stream.
fn compose_image(
    file: &PathBuf,
    family: PrinterFamily,
    landscape: bool,
    opts: ComposeOptions,
) -> Result<Vec<u8>, ReciboError> {
    let decoded = image::open(file)
        .map_err(|e| ReciboError::Image(format!("{}: {e}", file.display())))?
        .to_rgba8();

    let width_dots = u32::from(opts.chars_per_line) * compose::CELL_WIDTH;
    let (w, h) = decoded.dimensions();
    // The dimension that lands across the paper scales to the print width
    let scaled = if landscape {
        let scale = f64::from(width_dots) / f64::from(h);
        let new_w = (f64::from(w) * scale).round().max(1.0) as u32;
        image::imageops::resize(
            &decoded,
            new_w,
            width_dots,
            image::imageops::FilterType::Triangle,
        )
    } else if w != width_dots {
        let scale = f64::from(width_dots) / f64::from(w);
        let new_h = (f64::from(h) * scale).round().max(1.0) as u32;
        image::imageops::resize(
            &decoded,
            width_dots,
            new_h,
            image::imageops::FilterType::Triangle,
        )
    } else {
        decoded
    };

    let raster = RasterImage::from_rgba(scaled);
    if landscape {
        Ok(compose::compose_landscape(family, &raster, opts))
    } else {
        let bitmap = opts.halftone.encode(&raster);
        let mut composer = compose::Composer::new(family, opts);
        composer.image(&bitmap);
        Ok(composer.finish())
    }
}
