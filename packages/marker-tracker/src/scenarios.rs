//! scenarios.rs — Injectable fault scenarios for the synthetic source
//!
//! Each scenario exercises one degraded mode of the pose pipeline:
//!   - Occlusion: a corner goes missing, the estimator yields no pose
//!   - SenderStall: one device stops sending, the driver watchdog disconnects it
//!   - CornerNoise: pixel noise on every corner, PnP has to absorb it
//!
//! Every scenario is periodic and recovers on its own.

use pose_types::TrackedDeviceId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioType {
    /// Drop one corner of the listed devices' markers for a few frames
    Occlusion,
    /// Stop sending a device's packets for longer than the driver timeout
    SenderStall,
    /// Gaussian pixel noise on every corner
    CornerNoise,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub active: Vec<ScenarioType>,
    pub occluded_devices: Vec<TrackedDeviceId>,
    pub occlusion_frames: u32,
    pub occlusion_period_frames: u32,
    pub stall_device: TrackedDeviceId,
    /// Seconds of silence per stall; > 1.0 trips the driver watchdog
    pub stall_duration_s: f64,
    pub stall_period_s: f64,
    pub corner_noise_px: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            active: vec![],
            occluded_devices: vec![TrackedDeviceId::Right],
            occlusion_frames: 10,
            occlusion_period_frames: 90,
            stall_device: TrackedDeviceId::Left,
            stall_duration_s: 2.0,
            stall_period_s: 8.0,
            corner_noise_px: 0.5,
        }
    }
}

impl ScenarioConfig {
    pub fn has(&self, s: ScenarioType) -> bool {
        self.active.contains(&s)
    }

    /// Whether `device` loses a corner on this frame.
    pub fn is_occluded(&self, device: TrackedDeviceId, frame: u64) -> bool {
        if !self.has(ScenarioType::Occlusion) { return false; }
        if !self.occluded_devices.contains(&device) { return false; }
        let period = self.occlusion_period_frames.max(self.occlusion_frames + 1) as u64;
        frame % period < self.occlusion_frames as u64
    }

    /// Whether `device` is silent at time `t` seconds since start.
    pub fn is_stalled(&self, device: TrackedDeviceId, t: f64) -> bool {
        if !self.has(ScenarioType::SenderStall) || device != self.stall_device { return false; }
        let period = self.stall_period_s.max(self.stall_duration_s + 0.1);
        // First stall starts one full period in, after the driver has connected.
        t >= period && t.rem_euclid(period) < self.stall_duration_s
    }

    /// Corner noise sigma in pixels (0 when the scenario is off).
    pub fn corner_sigma_px(&self) -> f64 {
        if self.has(ScenarioType::CornerNoise) { self.corner_noise_px.max(0.0) } else { 0.0 }
    }
}

/// Presets selectable from the command line
pub fn preset(name: &str) -> Option<ScenarioConfig> {
    let active = match name {
        "none" | "default" => vec![],
        "occlusion" => vec![ScenarioType::Occlusion],
        "stall" => vec![ScenarioType::SenderStall],
        "noisy" => vec![ScenarioType::CornerNoise],
        "all" => vec![ScenarioType::Occlusion, ScenarioType::SenderStall, ScenarioType::CornerNoise],
        _ => return None,
    };
    Some(ScenarioConfig { active, ..Default::default() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_scenarios_never_fire() {
        let sc = ScenarioConfig::default();
        assert!(!sc.is_occluded(TrackedDeviceId::Right, 0));
        assert!(!sc.is_stalled(TrackedDeviceId::Left, 9.0));
        assert_eq!(sc.corner_sigma_px(), 0.0);
    }

    #[test]
    fn occlusion_is_periodic() {
        let sc = preset("occlusion").unwrap();
        assert!(sc.is_occluded(TrackedDeviceId::Right, 0));
        assert!(sc.is_occluded(TrackedDeviceId::Right, 9));
        assert!(!sc.is_occluded(TrackedDeviceId::Right, 10));
        assert!(sc.is_occluded(TrackedDeviceId::Right, 90));
        assert!(!sc.is_occluded(TrackedDeviceId::Left, 0));
    }

    #[test]
    fn stall_only_after_first_period() {
        let sc = preset("stall").unwrap();
        assert!(!sc.is_stalled(TrackedDeviceId::Left, 0.5));
        assert!(sc.is_stalled(TrackedDeviceId::Left, 8.5));
        assert!(!sc.is_stalled(TrackedDeviceId::Left, 10.5));
        assert!(!sc.is_stalled(TrackedDeviceId::Right, 8.5));
    }

    #[test]
    fn unknown_preset_is_none() {
        assert!(preset("rough_sea").is_none());
    }
}
