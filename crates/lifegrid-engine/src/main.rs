//! Engine binary for the Lifegrid simulation.
//!
//! Wires the turn engine to a PGM image store on disk, reads interactive
//! keys from stdin, and prints the event stream. It loads configuration,
//! runs one simulation to completion or quit, and exits.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `lifegrid-config.yaml` (or `LIFEGRID_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Start the image I/O service over the PGM store
//! 4. Create the event bus and start the event printer
//! 5. Start the stdin key reader
//! 6. Run the simulation
//! 7. Wait for the event stream to drain and log the result

mod error;
mod keys;
mod pgm;
mod printer;

use std::path::PathBuf;

use lifegrid_core::bus::EventBus;
use lifegrid_core::config::LifegridConfig;
use lifegrid_core::io::spawn_io_service;
use lifegrid_core::runner::{self, RunDriver};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::pgm::PgmStore;
use crate::printer::Format;

/// Config file used when `LIFEGRID_CONFIG` is unset.
const DEFAULT_CONFIG_PATH: &str = "lifegrid-config.yaml";

/// Capacity of the image I/O request channel.
const IO_REQUEST_BUFFER: usize = 16;

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if configuration is invalid or the run fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging. RUST_LOG wins over the config.
    let default_level = config.logging.level.clone();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!("lifegrid-engine starting");
    let params = config.params();
    info!(
        width = params.width,
        height = params.height,
        turns = params.turns,
        workers = params.workers,
        ticker_interval_ms = config.control.ticker_interval_ms,
        "Configuration loaded"
    );

    // 3. Start the image I/O service.
    let store = PgmStore::new(&config.io.input_dir, &config.io.output_dir);
    let (io, io_task) = spawn_io_service(store, IO_REQUEST_BUFFER);
    info!(
        input_dir = %config.io.input_dir,
        output_dir = %config.io.output_dir,
        "Image I/O service started"
    );

    // 4. Create the event bus and printer.
    let (bus, events) = EventBus::new(config.control.event_buffer.max(1));
    let format = if config.logging.json_events {
        Format::Json
    } else {
        Format::Log
    };
    let printer = printer::spawn_printer(events, format);

    // 5. Start reading keys.
    let (key_tx, key_rx) = mpsc::channel(config.control.key_buffer.max(1));
    keys::spawn_key_reader(key_tx);
    info!("Controls: p = pause/resume, s = save, q = quit");

    // 6. Run the simulation.
    let result = RunDriver::new(params, bus, io)
        .with_ticker_interval(config.control.ticker_interval())
        .run(key_rx)
        .await;

    // 7. Drain the event stream, then report.
    let printed = printer
        .await
        .map_err(|source| EngineError::Printer { source })?;
    let summary = result.map_err(EngineError::from)?;
    runner::log_run_end(&summary);

    // Every IoHandle is gone once the driver returns.
    log_io_service_exit(io_task.await);

    info!(
        end_reason = ?summary.end_reason,
        turns_completed = summary.turns_completed,
        events = printed,
        "lifegrid-engine shutdown complete"
    );

    Ok(())
}

/// Load configuration from `LIFEGRID_CONFIG`, or `lifegrid-config.yaml` in
/// the current working directory.
fn load_config() -> Result<LifegridConfig, EngineError> {
    let path = std::env::var("LIFEGRID_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    Ok(LifegridConfig::from_file(&path)?)
}

/// Log a failed image I/O service task. Returns whether it ended cleanly.
fn log_io_service_exit(joined: Result<(), JoinError>) -> bool {
    match joined {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Image I/O service task failed");
            false
        }
    }
}
