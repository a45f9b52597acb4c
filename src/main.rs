//! # EnOcean Gateway
//!
//! Bridges a radio co-processor on a serial port to the EnOcean gateway:
//! captures are decoded and dispatched, replies are encoded and sent back
//! for transmission, and operator commands are read from stdin.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use enocean_gateway::config::{Config, LoggingConfig};
use enocean_gateway::console::Command;
use enocean_gateway::gateway::Gateway;
use enocean_gateway::radio::link::SerialLine;
use enocean_gateway::radio::serial::{run_reader, run_writer, ChannelRadio, RadioSerial};
use enocean_gateway::radio::{FrameSink, Retransmitter};

/// Capture queue depth between the serial reader and dispatch
const CAPTURE_QUEUE_DEPTH: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "enocean-gateway", version, about = "EnOcean radio gateway")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    config: PathBuf,

    /// Serial port, overriding the configuration file
    #[arg(short, long)]
    port: Option<String>,
}

/// Install the tracing subscriber; the guard must live until exit so the
/// file writer flushes
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let level = Level::from_str(&config.level)
        .with_context(|| format!("invalid log level {:?}", config.level))?;
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let (file_layer, guard) = if config.file_enabled {
        let appender = tracing_appender::rolling::daily(&config.log_dir, "enocean-gateway.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    if let Some(port) = args.port {
        config.serial.port = port;
    }

    let _log_guard = init_logging(&config.logging)?;
    info!("EnOcean gateway v{} starting...", env!("CARGO_PKG_VERSION"));

    let serial = RadioSerial::open(&config.serial)?;
    info!("Radio serial port opened at: {}", serial.device_path());
    let (serial_rx, serial_tx) = serial.into_split();

    let (radio, tx_queue) = ChannelRadio::channel();
    let sink: Arc<dyn FrameSink> = Arc::new(Retransmitter::new(radio));
    let gateway = Arc::new(
        Gateway::open(&config.gateway.state_file, config.gateway.seed(), sink)?
            .with_reassembly_timeout(config.gateway.reassembly_timeout()),
    );
    info!(
        "Gateway {} ready (learning {}, acting {})",
        gateway.txid(),
        gateway.learning(),
        gateway.acting()
    );

    let writer = tokio::spawn(async move {
        let mut link = SerialLine::new(serial_tx);
        run_writer(&mut link, tx_queue).await
    });

    let (capture_tx, mut captures) = mpsc::channel(CAPTURE_QUEUE_DEPTH);
    let reader = tokio::spawn(run_reader(serial_rx, capture_tx));

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            capture = captures.recv() => {
                let Some(capture) = capture else {
                    warn!("Serial reader stopped");
                    break;
                };
                // Dispatch may sleep through a retransmission window
                let gw = Arc::clone(&gateway);
                if let Err(e) = tokio::task::spawn_blocking(move || gw.receive(&capture.data, capture.rssi)).await {
                    warn!("Receive task failed: {}", e);
                }
            }

            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => match line.parse::<Command>() {
                        Ok(command) => {
                            let gw = Arc::clone(&gateway);
                            match tokio::task::spawn_blocking(move || command.execute(&gw)).await {
                                Ok(Ok(output)) => println!("{}", output),
                                Ok(Err(e)) => println!("error: {}", e),
                                Err(e) => warn!("Command task failed: {}", e),
                            }
                        }
                        Err(e) => println!("error: {}", e),
                    },
                    Ok(None) => {
                        info!("stdin closed, console disabled");
                        stdin_open = false;
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        stdin_open = false;
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    let stats = gateway.statistics();
    info!(
        "Frames {}, non-frames {}, CRC errors {}, partial SYS_EX {}",
        stats.frames,
        stats.non_frames,
        stats.crc_errors,
        gateway.pending_sys_ex()
    );

    reader.abort();
    // Last gateway handle: saves the state file and closes the TX queue
    drop(gateway);
    match writer.await {
        Ok(Err(e)) => warn!("Serial writer stopped: {}", e),
        Err(e) => warn!("Serial writer task failed: {}", e),
        Ok(Ok(())) => {}
    }

    Ok(())
}
