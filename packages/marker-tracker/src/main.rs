//! main.rs — Marker tracker entry point
//!
//! Runs one pose source until Ctrl-C:
//!   1. synthetic:    simulated markers → corners → PnP → UDP (driver or hub)
//!   2. observations: JSON-lines MarkerObservations on stdin → PnP → UDP
//!   3. gyro:         simulated gyro-mouse rates → orientation → UDP (48-byte layout)
//!
//! A failed estimate sends nothing for that device; the driver keeps the last
//! pose until its watchdog marks the device disconnected.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use pose_types::{PacketLayout, TrackedDeviceId};
use tokio::io::BufReader;
use tokio::time::interval;
use tracing::{info, warn};

use marker_tracker::config::TrackerConfig;
use marker_tracker::gyro::{self, GyroIntegrator};
use marker_tracker::observations::ObservationReader;
use marker_tracker::scenarios;
use marker_tracker::synthetic::SyntheticSource;
use marker_tracker::PoseSender;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Source {
    Synthetic,
    Observations,
    Gyro,
}

#[derive(Parser, Debug)]
#[command(name = "marker-track", about = "Marker pose tracker and UDP pose sender")]
struct Args {
    /// Config file path (built-in defaults if omitted)
    #[arg(short, long)]
    config: Option<String>,
    /// Pose source
    #[arg(long, value_enum, default_value = "synthetic")]
    source: Source,
    /// Override the packet destination (host:port)
    #[arg(long)]
    target: Option<SocketAddr>,
    /// Override the send rate, Hz
    #[arg(long)]
    rate_hz: Option<f64>,
    /// Scenario preset for the synthetic source: none, occlusion, stall, noisy, all
    #[arg(long)]
    scenario: Option<String>,
    /// RNG seed for corner noise
    #[arg(long, default_value = "1")]
    seed: u64,
    /// Device id carried by gyro packets
    #[arg(long, default_value = "2")]
    gyro_device: u8,
    /// Recenter every device (or the gyro heading) after this many seconds
    #[arg(long)]
    recenter_after_s: Option<f64>,
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marker_tracker=info".into()),
        )
        .init();

    let args = Args::parse();
    let mut cfg = TrackerConfig::load(args.config.as_deref())?;
    if let Some(name) = &args.scenario {
        cfg.scenarios = scenarios::preset(name)
            .with_context(|| format!("unknown scenario preset '{name}'"))?;
    }

    let run = async {
        match args.source {
            Source::Synthetic => run_synthetic(&cfg, &args).await,
            Source::Observations => run_observations(&cfg, &args).await,
            Source::Gyro => run_gyro(&cfg, &args).await,
        }
    };

    tokio::select! {
        res = run => res,
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C, stopping tracker");
            Ok(())
        }
    }
}

fn pose_sender(cfg: &TrackerConfig, args: &Args) -> anyhow::Result<PoseSender> {
    let target = match args.target {
        Some(t) => t,
        None => cfg.sender_target()?,
    };
    let sender = PoseSender::new(target, cfg.sender.layout)
        .with_context(|| format!("failed to open UDP socket for {target}"))?;
    info!("Sending {}-byte pose packets to {target}", cfg.sender.layout.len());
    Ok(sender)
}

fn ticker(rate_hz: f64) -> anyhow::Result<(tokio::time::Interval, f64)> {
    anyhow::ensure!(rate_hz.is_finite() && rate_hz > 0.0, "rate must be positive, got {rate_hz}");
    let dt = 1.0 / rate_hz;
    let mut t = interval(Duration::from_secs_f64(dt));
    t.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    Ok((t, dt))
}

// ── Synthetic markers ─────────────────────────────────────────────────────────

async fn run_synthetic(cfg: &TrackerConfig, args: &Args) -> anyhow::Result<()> {
    let mut sender = pose_sender(cfg, args)?;
    let mut estimator = cfg.build_estimator();
    let mut source = SyntheticSource::new(
        cfg.camera,
        cfg.marker.size_m,
        cfg.motion.clone(),
        cfg.scenarios.clone(),
        args.seed,
    );
    let rate_hz = args.rate_hz.unwrap_or(cfg.sender.rate_hz);
    let (mut tick, _) = ticker(rate_hz)?;
    let log_every = rate_hz.round().max(1.0) as u64 * 5;

    info!("Synthetic source at {rate_hz} Hz, scenarios {:?}", source.scenario().active);

    let start = Instant::now();
    let mut recentered = false;
    let mut frame: u64 = 0;
    let mut solved: u64 = 0;
    let mut missed: u64 = 0;

    loop {
        tick.tick().await;
        let t = start.elapsed().as_secs_f64();

        for device in TrackedDeviceId::ALL {
            let obs = source.observe(device, t, frame);
            let Some((device, pose)) = estimator.estimate(&obs) else {
                missed += 1;
                continue;
            };
            solved += 1;
            if source.scenario().is_stalled(device, t) {
                continue;
            }
            sender.send_pose(device, pose);
        }

        if let Some(after) = args.recenter_after_s {
            if !recentered && t >= after {
                for device in TrackedDeviceId::ALL {
                    if estimator.recenter(device) {
                        info!("{device}: recentered");
                    }
                }
                recentered = true;
            }
        }

        frame += 1;
        if frame % log_every == 0 {
            info!("frame={frame} solved={solved} missed={missed} sent={}", sender.sent());
        }
    }
}

// ── External detector on stdin ────────────────────────────────────────────────

async fn run_observations(cfg: &TrackerConfig, args: &Args) -> anyhow::Result<()> {
    let mut sender = pose_sender(cfg, args)?;
    let mut estimator = cfg.build_estimator();
    let mut reader = ObservationReader::new(BufReader::new(tokio::io::stdin()));
    let mut count: u64 = 0;

    info!("Reading marker observations from stdin");

    while let Some(obs) = reader.next().await.context("stdin read failed")? {
        count += 1;
        match estimator.estimate(&obs) {
            Some((device, pose)) => sender.send_pose(device, pose),
            None if estimator.device_for_marker(obs.marker_id).is_none() => {
                warn!("marker {} is not bound to a device", obs.marker_id);
            }
            None => {}
        }
        if count % 500 == 0 {
            info!("observations={count} sent={} skipped_lines={}", sender.sent(), reader.skipped());
        }
    }

    info!("stdin closed after {count} observations ({} packets sent)", sender.sent());
    Ok(())
}

// ── Gyro mouse ────────────────────────────────────────────────────────────────

async fn run_gyro(cfg: &TrackerConfig, args: &Args) -> anyhow::Result<()> {
    let device = TrackedDeviceId::from_u8(args.gyro_device)
        .with_context(|| format!("gyro device id {} is not 0, 1 or 2", args.gyro_device))?;
    let target = match args.target {
        Some(t) => t,
        None => cfg.gyro.target.parse().with_context(|| format!("gyro.target '{}'", cfg.gyro.target))?,
    };
    let mut sender = PoseSender::new(target, PacketLayout::NoTrigger)
        .with_context(|| format!("failed to open UDP socket for {target}"))?;
    let rate_hz = args.rate_hz.unwrap_or(cfg.gyro.rate_hz);
    let (mut tick, dt) = ticker(rate_hz)?;
    let mut integrator = GyroIntegrator::new(cfg.gyro.smoothing_alpha);

    info!("Gyro source for {device} at {rate_hz} Hz → {target} (48-byte packets)");

    let start = Instant::now();
    let mut recentered = false;
    let mut n: u64 = 0;
    loop {
        tick.tick().await;
        let t = start.elapsed().as_secs_f64();
        if let Some(after) = args.recenter_after_s {
            if !recentered && t >= after {
                integrator.reset();
                info!("{device}: gyro orientation recentered");
                recentered = true;
            }
        }
        let pose = integrator.step(gyro::simulated_rates_deg(t), dt as f32);
        sender.send_pose(device, pose);

        n += 1;
        if n % (rate_hz.round().max(1.0) as u64 * 5) == 0 {
            let q = pose.orientation;
            info!("gyro q=({:.3}, {:.3}, {:.3}, {:.3}) sent={}", q.w, q.x, q.y, q.z, sender.sent());
        }
    }
}
