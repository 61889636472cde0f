//! main.rs — Driver entry point
//!
//! Two roles, one binary:
//!   1. run: the pose driver with a logging host, polled at the host frame rate
//!   2. hub: the calibration relay, with calibration commands read from stdin

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use pose_types::PacketLayout;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use vrpose_driver::{DriverConfig, Hub, HubCommand, HubConfig, PoseDriver, TracingHost};

#[derive(Parser, Debug)]
#[command(name = "vrpose-driver", about = "VR pose bridge: driver and calibration hub")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Receive pose packets and publish them to a logging host
    Run {
        /// UDP listen port
        #[arg(long)]
        port: Option<u16>,
        /// Watchdog timeout, milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Packet layout: with-trigger (49 bytes) or no-trigger (48 bytes)
        #[arg(long)]
        layout: Option<PacketLayout>,
        /// Host frame rate, Hz
        #[arg(long, default_value = "90")]
        frame_hz: f64,
        /// One pose line per device every N frames (0 = transitions only)
        #[arg(long, default_value = "90")]
        log_every: u64,
    },
    /// Relay tracker packets through the calibration pipeline
    Hub {
        /// UDP listen port for raw tracker packets
        #[arg(long)]
        port: Option<u16>,
        /// Driver address to forward to
        #[arg(long)]
        forward: Option<SocketAddr>,
        /// Calibration store
        #[arg(long)]
        calibration_file: Option<PathBuf>,
        #[arg(long)]
        layout: Option<PacketLayout>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vrpose_driver=info".into()),
        )
        .init();

    match Cli::parse().command {
        Command::Run { port, timeout_ms, layout, frame_hz, log_every } => {
            let mut cfg = DriverConfig::default();
            if let Some(p) = port {
                cfg.udp_port = p;
            }
            if let Some(ms) = timeout_ms {
                cfg.timeout = Duration::from_millis(ms);
            }
            if let Some(l) = layout {
                cfg.layout = l;
            }
            run_driver(cfg, frame_hz, log_every).await
        }
        Command::Hub { port, forward, calibration_file, layout } => {
            let mut cfg = HubConfig::default();
            if let Some(p) = port {
                cfg.listen_port = p;
            }
            if let Some(f) = forward {
                cfg.forward_addr = f;
            }
            if let Some(path) = calibration_file {
                cfg.calibration_file = path;
            }
            if let Some(l) = layout {
                cfg.layout = l;
            }
            run_hub(cfg).await
        }
    }
}

async fn run_driver(cfg: DriverConfig, frame_hz: f64, log_every: u64) -> anyhow::Result<()> {
    anyhow::ensure!(frame_hz.is_finite() && frame_hz > 0.0, "frame rate must be positive, got {frame_hz}");
    info!("🥽 VR pose driver starting...");

    let mut driver = PoseDriver::new();
    driver.init(cfg)?;
    let mut host = TracingHost::new(log_every);

    let mut frames = interval(Duration::from_secs_f64(1.0 / frame_hz));
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_stats = tokio::time::Instant::now();

    loop {
        tokio::select! {
            _ = frames.tick() => {
                driver.run_frame(&mut host);
                if last_stats.elapsed() >= Duration::from_secs(10) {
                    let s = driver.stats();
                    info!(
                        "Net: received={} accepted={} rejected(size={} checksum={} invalid={}) gaps={}",
                        s.received, s.accepted, s.size_rejected, s.checksum_rejected, s.invalid_rejected, s.gaps
                    );
                    last_stats = tokio::time::Instant::now();
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C, shutting down driver");
                break;
            }
        }
    }

    driver.cleanup();
    Ok(())
}

async fn run_hub(cfg: HubConfig) -> anyhow::Result<()> {
    info!("🧭 Calibration hub starting...");
    let hub = Hub::bind(cfg).await?;
    let (tx, rx) = mpsc::channel(16);

    tokio::spawn(async move {
        info!("Commands: recenter <dev> | rotation <dev> | axes <dev> o r u | reset [dev] | status");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match line.parse::<HubCommand>() {
                    Ok(cmd) => {
                        if tx.send(cmd).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("{e}"),
                },
                Ok(None) => break,
                Err(e) => {
                    warn!("stdin read failed: {e}");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = hub.run(rx) => {}
        _ = tokio::signal::ctrl_c() => info!("Ctrl-C, shutting down hub"),
    }
    Ok(())
}
