//! CLI Entry Point for barcode-session
//!
//! Provides a command-line interface for:
//! - Running one scan session against mock hardware (`simulate`)
//! - Printing the effective configuration (`show-config`)
//!
//! # Usage
//!
//! Decode on the 20th frame:
//! ```bash
//! barcode-session simulate --frames 100 --decode-at 20 --text 4006381333931
//! ```
//!
//! Cancel with a tap after half a second:
//! ```bash
//! barcode-session simulate --frames 100 --touch-after-ms 500
//! ```
//!
//! Notifications are printed in the host bridge's wire format, one per line.

use anyhow::{Context, Result};
use barcode_session::config::{ScannerConfig, DEFAULT_CONFIG_PATH};
use barcode_session::hardware::decoder::{BarcodeFormat, DecodedBarcode};
use barcode_session::hardware::mock::{
    MockCamera, MockCompositor, MockEventQueue, ScriptedDecoder,
};
use barcode_session::input::{InputEvent, TouchPhase};
use barcode_session::session::{ChannelSink, Phase, ScanSession};
use barcode_session::tracing_setup::{self, OutputFormat, TracingConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

const SIMULATED_CALLBACK_ID: &str = "simulate-1";

#[derive(Parser)]
#[command(name = "barcode-session")]
#[command(about = "Single-shot barcode scan sessions", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log output format (pretty, compact, json)
    #[arg(long, global = true, default_value = "compact")]
    log_format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scan against mock hardware
    Simulate {
        /// Frames to feed before stopping
        #[arg(long, default_value_t = 50)]
        frames: u64,

        /// Frame number (1-based) that decodes
        #[arg(long)]
        decode_at: Option<u64>,

        /// Tap the preview after this many milliseconds
        #[arg(long)]
        touch_after_ms: Option<u64>,

        /// Decoded text
        #[arg(long, default_value = "4006381333931")]
        text: String,

        /// Decoded format, e.g. EAN_13 or QR_CODE
        #[arg(long, default_value = "EAN_13")]
        format: String,

        /// Delay between frames in milliseconds
        #[arg(long, default_value_t = 33)]
        frame_interval_ms: u64,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}

struct SimulateArgs {
    frames: u64,
    decode_at: Option<u64>,
    touch_after_ms: Option<u64>,
    text: String,
    format: String,
    frame_interval: Duration,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ScannerConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    match cli.command {
        Commands::Simulate {
            frames,
            decode_at,
            touch_after_ms,
            text,
            format,
            frame_interval_ms,
        } => {
            let tracing_config = TracingConfig::from_scanner_config(&config)
                .map_err(anyhow::Error::msg)?
                .with_format(cli.log_format);
            tracing_setup::init(tracing_config).map_err(anyhow::Error::msg)?;

            simulate(
                &config,
                SimulateArgs {
                    frames,
                    decode_at,
                    touch_after_ms,
                    text,
                    format,
                    frame_interval: Duration::from_millis(frame_interval_ms),
                },
            )
        }
        Commands::ShowConfig => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn parse_format(name: &str) -> Result<BarcodeFormat> {
    serde_json::from_value(serde_json::Value::String(name.to_uppercase()))
        .with_context(|| format!("Unknown barcode format '{}'", name))
}

fn simulate(config: &ScannerConfig, args: SimulateArgs) -> Result<()> {
    let format = parse_format(&args.format)?;
    let decoder = match args.decode_at {
        Some(n) => ScriptedDecoder::new().decode_on_call(n, DecodedBarcode::new(args.text, format)),
        None => ScriptedDecoder::new(),
    };

    let camera = Arc::new(MockCamera::new());
    let events = Arc::new(MockEventQueue::new());
    let (tx, rx) = mpsc::channel();

    let session = ScanSession::builder(
        camera.clone(),
        Arc::new(decoder),
        Arc::new(MockCompositor::new()),
        events.clone(),
        Arc::new(ChannelSink::new(tx)),
    )
    .with_settings(config.scanner.clone())
    .build()?;

    let session_args = serde_json::json!({ "handle": "1", "group": "barcode-session" });
    let started = session.start_read(SIMULATED_CALLBACK_ID, &session_args.to_string());

    if started.is_ok() {
        let toucher = args.touch_after_ms.map(|ms| {
            let events = Arc::clone(&events);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(ms));
                events.push(InputEvent::Touch(TouchPhase::Down));
            })
        });

        for _ in 0..args.frames {
            if session.phase() != Phase::Streaming {
                break;
            }
            camera.push_noise_frame();
            thread::sleep(args.frame_interval);
        }
        session.stop_read(SIMULATED_CALLBACK_ID)?;

        if let Some(toucher) = toucher {
            if toucher.join().is_err() {
                tracing::warn!("Touch thread panicked");
            }
        }
        tracing::info!(frames = camera.frames_delivered(), "Simulation finished");
    }
    drop(session);

    for notification in rx.try_iter() {
        println!("{}", notification.to_wire_line());
    }
    started.context("Scan session failed to start")
}
