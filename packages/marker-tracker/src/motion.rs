//! motion.rs — Simulated marker motion in front of the camera
//!
//! Each tracked device carries one marker that drifts on a slow Lissajous path
//! in the camera frame (X right, Y down, Z forward) while wobbling a few
//! degrees around the "facing the camera" attitude. The HMD marker sits
//! higher and further back than the two hand markers.
//!
//! Pure math: no I/O, no randomness. Noise is added when corners are rendered
//! (synthetic.rs).

use nalgebra::{Rotation3, Vector3};
use pose_types::TrackedDeviceId;
use serde::{Deserialize, Serialize};

/// Ground-truth marker pose in the camera frame.
#[derive(Debug, Clone, Copy)]
pub struct MarkerTruth {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionConfig {
    /// Path amplitude, meters
    #[serde(default = "default_amplitude")]
    pub amplitude_m: f64,
    /// Base oscillation frequency, Hz
    #[serde(default = "default_frequency")]
    pub frequency_hz: f64,
    /// Peak attitude wobble, degrees
    #[serde(default = "default_wobble")]
    pub wobble_deg: f64,
}

fn default_amplitude() -> f64 { 0.08 }
fn default_frequency() -> f64 { 0.25 }
fn default_wobble() -> f64 { 12.0 }

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            amplitude_m: default_amplitude(),
            frequency_hz: default_frequency(),
            wobble_deg: default_wobble(),
        }
    }
}

/// Resting point of each device's marker, camera frame.
fn anchor(device: TrackedDeviceId) -> Vector3<f64> {
    match device {
        TrackedDeviceId::Left => Vector3::new(-0.12, 0.05, 0.6),
        TrackedDeviceId::Right => Vector3::new(0.12, 0.05, 0.6),
        TrackedDeviceId::Hmd => Vector3::new(0.0, -0.10, 0.9),
    }
}

/// Phase offset so the devices don't move in lockstep.
fn phase(device: TrackedDeviceId) -> f64 {
    device.as_u8() as f64 * 2.1
}

/// Marker pose for `device` at time `t` seconds.
pub fn marker_pose(device: TrackedDeviceId, t: f64, cfg: &MotionConfig) -> MarkerTruth {
    let w = std::f64::consts::TAU * cfg.frequency_hz;
    let ph = phase(device);
    let a = cfg.amplitude_m;

    let offset = Vector3::new(
        a * (w * t + ph).sin(),
        0.5 * a * (2.0 * w * t + ph).sin(),
        0.5 * a * (0.7 * w * t + ph).cos(),
    );

    let wobble = cfg.wobble_deg.to_radians();
    let tilt = Vector3::new(
        wobble * (0.9 * w * t + ph).sin(),
        wobble * (1.3 * w * t + ph).cos(),
        0.5 * wobble * (0.5 * w * t + ph).sin(),
    );

    // Marker +Z toward the lens, +Y up in the image.
    let facing = Rotation3::from_axis_angle(&Vector3::x_axis(), std::f64::consts::PI);

    MarkerTruth {
        rotation: facing * Rotation3::new(tilt),
        translation: anchor(device) + offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_stay_in_front_of_camera() {
        let cfg = MotionConfig::default();
        for device in TrackedDeviceId::ALL {
            for i in 0..200 {
                let truth = marker_pose(device, i as f64 * 0.05, &cfg);
                assert!(truth.translation.z > 0.3);
            }
        }
    }

    #[test]
    fn zero_wobble_faces_camera() {
        let cfg = MotionConfig { wobble_deg: 0.0, ..Default::default() };
        let truth = marker_pose(TrackedDeviceId::Left, 1.0, &cfg);
        let normal = truth.rotation * Vector3::z();
        assert!((normal.z + 1.0).abs() < 1e-9);
    }
}
