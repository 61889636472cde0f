//! host.rs — Seam between the driver and the host's tracking system
//!
//! The host calls [`crate::PoseDriver::run_frame`] once per rendered frame;
//! the driver runs the watchdog and then hands every device's snapshot to a
//! [`HostBinding`], connected or not. The host drops devices that miss frames.

use pose_types::TrackedDeviceId;
use tracing::info;

use crate::device::{LinkState, PoseSnapshot};

pub trait HostBinding {
    /// Latest state of one device for this frame.
    fn on_pose_updated(&mut self, snapshot: &PoseSnapshot);
}

impl<F: FnMut(&PoseSnapshot)> HostBinding for F {
    fn on_pose_updated(&mut self, snapshot: &PoseSnapshot) {
        self(snapshot)
    }
}

/// Host stand-in for running without a VR runtime: logs link transitions and
/// a periodic pose line per device.
#[derive(Debug)]
pub struct TracingHost {
    last_state: [Option<LinkState>; 3],
    updates: u64,
    log_every: u64,
}

impl TracingHost {
    /// `log_every`: one pose line per device every N updates (0 = transitions only).
    pub fn new(log_every: u64) -> Self {
        Self { last_state: [None; 3], updates: 0, log_every }
    }
}

impl HostBinding for TracingHost {
    fn on_pose_updated(&mut self, snap: &PoseSnapshot) {
        let slot = &mut self.last_state[snap.device.as_u8() as usize];
        if *slot != Some(snap.state) {
            match snap.state {
                LinkState::Connected => info!("🎮 {} ({}) connected", snap.device, snap.device.serial_number()),
                LinkState::Disconnected => info!("⚠ {} disconnected (no data)", snap.device),
                LinkState::Uninitialized => info!("{} waiting for first packet", snap.device),
            }
            *slot = Some(snap.state);
        }

        self.updates += 1;
        let per_device = self.updates / TrackedDeviceId::ALL.len() as u64;
        if self.log_every > 0 && snap.connected && per_device % self.log_every == 0 {
            let p = snap.pose.position;
            let q = snap.pose.orientation;
            info!(
                "{} pos=({:+.3}, {:+.3}, {:+.3}) q=({:.3}, {:.3}, {:.3}, {:.3}) seq={:?}",
                snap.device, p.x, p.y, p.z, q.w, q.x, q.y, q.z, snap.sequence
            );
        }
    }
}
