//! Stenograph writer capture CLI
//!
//! Polls a connected writer and prints each live stroke on its own line.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{info, warn};

use steno_driver::keychart::{KEY_BITS, STENO_KEY_CHART};
use steno_driver::transport::list_devices;
use steno_driver::{CaptureConfig, CaptureEvent, CaptureState, StenoCapture, KEYS_LAYOUT};

mod cli;
use cli::{Cli, Commands};

/// Events buffered for the printer before the oldest are dropped
const EVENT_BUFFER: usize = 256;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(CaptureConfig::default_path);
    let mut config = CaptureConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(kind) = cli.transport {
        config.transport = kind;
    }
    if let Some(ms) = cli.read_timeout_ms {
        config.read_timeout_ms = ms;
    }

    match cli.command {
        None | Some(Commands::Capture) => capture(&config),
        Some(Commands::List) => list(&config),
        Some(Commands::Chart) => {
            chart();
            Ok(())
        }
    }
}

fn capture(config: &CaptureConfig) -> Result<()> {
    let (tx, mut rx) = broadcast::channel(EVENT_BUFFER);
    let mut session = StenoCapture::open(config.transport, config.timings(), tx)?;

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    ctrlc::set_handler(move || {
        running_clone.store(false, Ordering::SeqCst);
    })
    .ok();

    info!("Capturing strokes, press Ctrl-C to stop");
    while running.load(Ordering::SeqCst) {
        match rx.try_recv() {
            Ok(CaptureEvent::Stroke(stroke)) => println!("{stroke}"),
            Ok(CaptureEvent::Connection(state)) => info!("Connection: {:?}", state),
            Ok(CaptureEvent::Capture(CaptureState::Stopped)) => break,
            Ok(CaptureEvent::Capture(state)) => info!("Capture: {:?}", state),
            Err(TryRecvError::Lagged(n)) => warn!("Dropped {} capture events", n),
            Err(TryRecvError::Empty) => std::thread::sleep(Duration::from_millis(20)),
            Err(TryRecvError::Closed) => break,
        }
    }

    session.stop();
    info!("Capture stopped");
    Ok(())
}

fn list(config: &CaptureConfig) -> Result<()> {
    let devices = list_devices(config.transport)?;
    if devices.is_empty() {
        println!("No Stenograph writers found");
    }
    for device in &devices {
        println!("{device}");
    }
    Ok(())
}

fn chart() {
    println!("Keyboard layout:{KEYS_LAYOUT}");
    println!("Stroke bits (byte: bit5 .. bit0):");
    for (byte, row) in STENO_KEY_CHART.iter().enumerate() {
        let keys: Vec<String> = row
            .iter()
            .map(|key| format!("{:>3}", key.unwrap_or("-")))
            .collect();
        println!("  {byte}: {}", keys.join(" "));
    }
    println!("  ({KEY_BITS} key bits per byte)");
}
