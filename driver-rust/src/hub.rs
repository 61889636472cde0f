//! # hub
//!
//! Calibration hub: sits between the tracker and the driver.
//!
//! ## Architecture
//! A single Tokio task that:
//!   1. Binds UDP on 5554 (`VRPOSE_HUB_LISTEN_PORT`) for raw tracker packets
//!   2. Decodes them (size + checksum) and keeps only the latest raw pose per device
//!   3. At a fixed rate (~90 Hz) applies each device's calibration pipeline and
//!      re-emits to the driver (127.0.0.1:5555) with a hub-owned sequence number
//!   4. Applies calibration commands (recenter / rotation / reset) and persists
//!      the result to the JSON calibration store
//!
//! ## Invariants
//! - Devices not heard from within the freshness window (0.5 s) are not
//!   forwarded, so the driver's watchdog sees the outage
//! - UDP errors are logged and never stop the relay

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::{Duration, Instant};

use anyhow::Context;
use pose_types::{PoseCodec, PosePacket, TrackedDeviceId, Vec3};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::calibration::{CalibrationError, CalibrationSet};
use crate::config::HubConfig;
use crate::persistence;
use crate::transport::RECV_BUFFER_LEN;

// ── Commands ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HubCommand {
    /// Current raw position becomes the device's origin
    Recenter(TrackedDeviceId),
    /// Current raw orientation becomes the rest/frame rotation
    CalibrateRotation(TrackedDeviceId),
    /// Derive the world frame from three recorded positions (origin, right, up)
    CalibrateAxes { device: TrackedDeviceId, origin: Vec3, right: Vec3, up: Vec3 },
    /// One device, or all of them
    Reset(Option<TrackedDeviceId>),
    Status,
}

fn parse_device(s: &str) -> Result<TrackedDeviceId, String> {
    match s.to_ascii_lowercase().as_str() {
        "left" | "l" | "0" => Ok(TrackedDeviceId::Left),
        "right" | "r" | "1" => Ok(TrackedDeviceId::Right),
        "hmd" | "h" | "2" => Ok(TrackedDeviceId::Hmd),
        other => Err(format!("unknown device '{other}'")),
    }
}

fn parse_vec3(s: &str) -> Result<Vec3, String> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>().map_err(|e| format!("bad number '{p}': {e}")))
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(format!("expected x,y,z, got '{s}'")),
    }
}

impl FromStr for HubCommand {
    type Err = String;

    /// `recenter <dev>`, `rotation <dev>`, `axes <dev> x,y,z x,y,z x,y,z`,
    /// `reset [dev]`, `status`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = s.split_whitespace().collect();
        match words.as_slice() {
            ["recenter", dev] => Ok(Self::Recenter(parse_device(dev)?)),
            ["rotation", dev] => Ok(Self::CalibrateRotation(parse_device(dev)?)),
            ["axes", dev, o, r, u] => Ok(Self::CalibrateAxes {
                device: parse_device(dev)?,
                origin: parse_vec3(o)?,
                right: parse_vec3(r)?,
                up: parse_vec3(u)?,
            }),
            ["reset"] => Ok(Self::Reset(None)),
            ["reset", dev] => Ok(Self::Reset(Some(parse_device(dev)?))),
            ["status"] => Ok(Self::Status),
            [] => Err("empty command".into()),
            _ => Err(format!("unknown command '{}'", s.trim())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("no raw pose received yet for {0}")]
    NoData(TrackedDeviceId),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

// ── Relay state ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct RawSample {
    packet: PosePacket,
    received_at: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub received: u64,
    pub accepted: u64,
    pub dropped: u64,
    pub forwarded: u64,
}

/// Everything the relay owns, independent of sockets.
#[derive(Debug, Default)]
pub struct HubState {
    latest: HashMap<TrackedDeviceId, RawSample>,
    calibration: CalibrationSet,
    sequences: HashMap<TrackedDeviceId, u32>,
    stats: HubStats,
}

impl HubState {
    pub fn new(calibration: CalibrationSet) -> Self {
        Self { calibration, ..Default::default() }
    }

    pub fn calibration(&self) -> &CalibrationSet {
        &self.calibration
    }

    pub fn stats(&self) -> HubStats {
        self.stats
    }

    /// Decode one datagram and keep it as the device's latest raw pose.
    pub fn ingest(&mut self, codec: &PoseCodec, data: &[u8], now: Instant) -> Option<TrackedDeviceId> {
        self.stats.received += 1;
        let packet = match codec.decode(data) {
            Ok(p) => p,
            Err(e) => {
                self.stats.dropped += 1;
                debug!("Hub: dropped packet ({e})");
                return None;
            }
        };
        let Some(device) = packet.device() else {
            self.stats.dropped += 1;
            debug!("Hub: dropped packet for unknown device {}", packet.device_id);
            return None;
        };
        self.latest.insert(device, RawSample { packet, received_at: now });
        self.stats.accepted += 1;
        Some(device)
    }

    /// Calibrated packets for every device heard from within `freshness`.
    pub fn outgoing(&mut self, now: Instant, freshness: Duration) -> Vec<PosePacket> {
        let mut out = Vec::with_capacity(TrackedDeviceId::ALL.len());
        for device in TrackedDeviceId::ALL {
            let Some(sample) = self.latest.get(&device) else { continue };
            if now.saturating_duration_since(sample.received_at) > freshness {
                continue;
            }
            let seq = self.sequences.entry(device).or_insert(0);
            let pose = self.calibration.get(device).apply(&sample.packet.pose);
            out.push(PosePacket { sequence: *seq, pose, ..sample.packet });
            *seq = seq.wrapping_add(1);
        }
        self.stats.forwarded += out.len() as u64;
        out
    }

    /// Apply a calibration command. Ok(true) when the calibration changed.
    pub fn apply_command(&mut self, cmd: HubCommand) -> Result<bool, CommandError> {
        match cmd {
            HubCommand::Recenter(device) => {
                let raw = self.latest.get(&device).ok_or(CommandError::NoData(device))?;
                let position = raw.packet.pose.position;
                self.calibration.get_mut(device).recenter(position);
                info!("🎯 {device} recentered at ({:+.3}, {:+.3}, {:+.3})", position.x, position.y, position.z);
                Ok(true)
            }
            HubCommand::CalibrateRotation(device) => {
                let raw = self.latest.get(&device).ok_or(CommandError::NoData(device))?;
                let q = raw.packet.pose.orientation;
                self.calibration.get_mut(device).calibrate_rotation(q);
                info!("🧭 {device} rotation calibrated to ({:.3}, {:.3}, {:.3}, {:.3})", q.w, q.x, q.y, q.z);
                Ok(true)
            }
            HubCommand::CalibrateAxes { device, origin, right, up } => {
                let rest = self
                    .latest
                    .get(&device)
                    .map(|s| s.packet.pose.orientation)
                    .unwrap_or_default();
                self.calibration.get_mut(device).calibrate_axes(origin, right, up, rest)?;
                info!("🧭 {device} axis calibration stored");
                Ok(true)
            }
            HubCommand::Reset(Some(device)) => {
                self.calibration.get_mut(device).reset();
                info!("↺ {device} calibration reset");
                Ok(true)
            }
            HubCommand::Reset(None) => {
                self.calibration = CalibrationSet::default();
                info!("↺ All calibration reset");
                Ok(true)
            }
            HubCommand::Status => {
                let s = self.stats;
                info!(
                    "Hub: received={} accepted={} dropped={} forwarded={} live={:?}",
                    s.received,
                    s.accepted,
                    s.dropped,
                    s.forwarded,
                    self.latest.keys().collect::<Vec<_>>()
                );
                Ok(false)
            }
        }
    }
}

// ── UDP relay task ────────────────────────────────────────────────────────────

pub struct Hub {
    config: HubConfig,
    input: UdpSocket,
    output: UdpSocket,
    codec: PoseCodec,
    state: HubState,
}

impl Hub {
    /// Bind sockets and load the calibration store. Bind failure is fatal.
    pub async fn bind(config: HubConfig) -> anyhow::Result<Self> {
        let listen = config.listen_addr();
        let input = UdpSocket::bind(listen)
            .await
            .with_context(|| format!("hub: could not bind UDP {listen}"))?;
        let out_addr: SocketAddr = if config.forward_addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let output = UdpSocket::bind(out_addr).await.context("hub: could not bind output socket")?;
        let calibration = persistence::load_calibration(&config.calibration_file).await;

        Ok(Self {
            codec: PoseCodec::new(config.layout),
            state: HubState::new(calibration),
            config,
            input,
            output,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.input.local_addr()
    }

    /// Relay until the task is dropped or aborted.
    pub async fn run(mut self, mut commands: mpsc::Receiver<HubCommand>) {
        info!(
            "📡 Hub listening on UDP {} → forwarding to {} at {:.0} Hz",
            self.local_addr().map(|a| a.to_string()).unwrap_or_default(),
            self.config.forward_addr,
            self.config.rate_hz
        );

        let mut ticker = interval(self.config.send_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut buf = [0u8; RECV_BUFFER_LEN];
        let log_every = (self.config.rate_hz.round().max(1.0) as u64) * 10;
        let mut ticks: u64 = 0;

        loop {
            tokio::select! {
                res = self.input.recv_from(&mut buf) => match res {
                    Ok((len, _src)) => {
                        self.state.ingest(&self.codec, &buf[..len], Instant::now());
                    }
                    Err(e) => warn!("Hub: UDP recv error: {e}"),
                },
                _ = ticker.tick() => {
                    self.forward().await;
                    ticks += 1;
                    if ticks % log_every == 0 {
                        let s = self.state.stats();
                        info!("Hub: accepted={} dropped={} forwarded={}", s.accepted, s.dropped, s.forwarded);
                    }
                },
                Some(cmd) = commands.recv() => self.handle_command(cmd).await,
            }
        }
    }

    async fn forward(&mut self) {
        let packets = self.state.outgoing(Instant::now(), self.config.freshness);
        for p in &packets {
            let bytes = self.codec.encode(p);
            if let Err(e) = self.output.send_to(&bytes, self.config.forward_addr).await {
                warn!("Hub: send to {} failed: {e}", self.config.forward_addr);
            }
        }
    }

    async fn handle_command(&mut self, cmd: HubCommand) {
        match self.state.apply_command(cmd) {
            Ok(true) => {
                let path = &self.config.calibration_file;
                if let Err(e) = persistence::save_calibration(path, self.state.calibration()).await {
                    warn!("Hub: failed to save calibration to {}: {e:#}", path.display());
                }
            }
            Ok(false) => {}
            Err(e) => warn!("Hub: {cmd:?} failed: {e}"),
        }
    }
}
