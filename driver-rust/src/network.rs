//! network.rs — Receive thread: datagram → decode → device state
//!
//! One `std::thread` per driver instance:
//!   1. Drain every queued datagram from the non-blocking socket
//!   2. Decode (size check, then checksum); drop failures silently (debug log)
//!   3. Route by device id into that device's mutex-guarded state
//!   4. Sleep one poll interval when the socket was empty
//!
//! Runs until the shared shutdown flag is set. Only the latest pose per
//! device is kept; nothing is queued.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use pose_types::{CodecError, PoseCodec, TrackedDeviceId};
use serde::Serialize;
use tracing::{debug, info};

use crate::device::TrackedDevice;
use crate::transport::{PoseReceiver, RECV_BUFFER_LEN};

// ── Statistics ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct NetworkStats {
    received: AtomicU64,
    accepted: AtomicU64,
    size_rejected: AtomicU64,
    checksum_rejected: AtomicU64,
    invalid_rejected: AtomicU64,
    unknown_device: AtomicU64,
    duplicates: AtomicU64,
    gaps: AtomicU64,
    reordered: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub accepted: u64,
    pub size_rejected: u64,
    pub checksum_rejected: u64,
    /// Non-finite position or angular velocity
    pub invalid_rejected: u64,
    pub unknown_device: u64,
    /// Advisory sequence counters; these packets were still applied
    pub duplicates: u64,
    pub gaps: u64,
    pub reordered: u64,
}

impl NetworkStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            size_rejected: self.size_rejected.load(Ordering::Relaxed),
            checksum_rejected: self.checksum_rejected.load(Ordering::Relaxed),
            invalid_rejected: self.invalid_rejected.load(Ordering::Relaxed),
            unknown_device: self.unknown_device.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            gaps: self.gaps.load(Ordering::Relaxed),
            reordered: self.reordered.load(Ordering::Relaxed),
        }
    }
}

// ── Sequence tracking (advisory) ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqEvent {
    First,
    InOrder,
    Duplicate,
    /// Packets skipped between the last one and this one
    Gap(u32),
    /// Older than the newest seen
    Reordered,
}

/// Classifies sequence numbers per device. Never rejects anything.
#[derive(Debug, Default)]
pub struct SeqTracker {
    last: HashMap<TrackedDeviceId, u32>,
}

impl SeqTracker {
    const HALF_RANGE: u32 = 1 << 31;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, device: TrackedDeviceId, seq: u32) -> SeqEvent {
        let Some(last) = self.last.get_mut(&device) else {
            self.last.insert(device, seq);
            return SeqEvent::First;
        };
        let diff = seq.wrapping_sub(*last);
        match diff {
            0 => SeqEvent::Duplicate,
            1 => {
                *last = seq;
                SeqEvent::InOrder
            }
            d if d < Self::HALF_RANGE => {
                *last = seq;
                SeqEvent::Gap(d - 1)
            }
            _ => SeqEvent::Reordered,
        }
    }
}

// ── Receive loop ──────────────────────────────────────────────────────────────

pub struct NetworkLoop {
    receiver: PoseReceiver,
    codec: PoseCodec,
    devices: Vec<Arc<TrackedDevice>>,
    stats: Arc<NetworkStats>,
    shutdown: Arc<AtomicBool>,
    poll_interval: Duration,
    seq: SeqTracker,
}

impl NetworkLoop {
    pub fn new(
        receiver: PoseReceiver,
        codec: PoseCodec,
        devices: Vec<Arc<TrackedDevice>>,
        stats: Arc<NetworkStats>,
        shutdown: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            receiver,
            codec,
            devices,
            stats,
            shutdown,
            poll_interval,
            seq: SeqTracker::new(),
        }
    }

    /// Run on a dedicated named thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("vrpose-net".into())
            .spawn(move || self.run())
    }

    fn run(mut self) {
        info!("📡 Network thread listening on UDP {}", self.receiver.local_addr());
        let mut buf = [0u8; RECV_BUFFER_LEN];

        while !self.shutdown.load(Ordering::Acquire) {
            let mut drained = 0usize;
            while let Some(data) = self.receiver.try_receive(&mut buf) {
                self.handle_datagram(data, Instant::now());
                drained += 1;
                if self.shutdown.load(Ordering::Acquire) {
                    break;
                }
            }
            if drained == 0 {
                thread::sleep(self.poll_interval);
            }
        }

        let s = self.stats.snapshot();
        info!(
            "Network thread stopped (received={} accepted={} dropped={})",
            s.received,
            s.accepted,
            s.size_rejected + s.checksum_rejected + s.invalid_rejected + s.unknown_device
        );
    }

    /// Decode and route one datagram. Every failure is a silent drop.
    pub fn handle_datagram(&mut self, data: &[u8], now: Instant) {
        NetworkStats::bump(&self.stats.received);

        let packet = match self.codec.decode(data) {
            Ok(p) => p,
            Err(e) => {
                let counter = match e {
                    CodecError::Size { .. } => &self.stats.size_rejected,
                    CodecError::Checksum { .. } => &self.stats.checksum_rejected,
                    CodecError::NonFinite { .. } => &self.stats.invalid_rejected,
                };
                NetworkStats::bump(counter);
                debug!("UDP: dropped packet ({e})");
                return;
            }
        };

        let Some(device) = packet.device().and_then(|id| self.devices.iter().find(|d| d.id() == id)) else {
            NetworkStats::bump(&self.stats.unknown_device);
            debug!("UDP: dropped packet for unknown device {}", packet.device_id);
            return;
        };

        match self.seq.observe(device.id(), packet.sequence) {
            SeqEvent::Duplicate => NetworkStats::bump(&self.stats.duplicates),
            SeqEvent::Gap(n) => {
                self.stats.gaps.fetch_add(n as u64, Ordering::Relaxed);
            }
            SeqEvent::Reordered => NetworkStats::bump(&self.stats.reordered),
            SeqEvent::First | SeqEvent::InOrder => {}
        }

        if device.update_from_packet(&packet, now) {
            NetworkStats::bump(&self.stats.accepted);
        }
    }
}
