//! estimator.rs — Marker corners → 6-DoF pose in the output frame
//!
//! Pipeline per observation:
//!   1. 4 ordered corners + marker size + intrinsics → PnP (pnp.rs)
//!   2. Rodrigues vector → unit quaternion
//!   3. Camera frame (X right, Y down, Z forward) → output frame (X right, Y up,
//!      Z backward): position (tx, -ty, -tz); rotation per [`RotationRemap`]
//!   4. Per-device affine calibration (calibration.rs)
//!
//! A failed estimate produces no pose. The caller keeps its last pose and the
//! driver's staleness watchdog decides when the device goes stale.

use std::collections::HashMap;

use nalgebra::Vector3;
use pose_types::{Pose, Quat, TrackedDeviceId, Vec3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calibration::AffineCalibration;
use crate::camera::{CameraIntrinsics, ImagePoint};
use crate::error::EstimateError;
use crate::pnp::{self, PnpSolution};

/// Rotation vectors shorter than this map straight to identity.
pub const ROTATION_EPSILON: f64 = 1e-4;

/// Default rejection threshold for the PnP reprojection RMS.
pub const DEFAULT_MAX_REPROJECTION_PX: f64 = 8.0;

// ── Types ─────────────────────────────────────────────────────────────────────

/// One detected marker in one camera frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerObservation {
    pub marker_id: u32,
    /// Top-left, top-right, bottom-right, bottom-left
    pub corners: Vec<ImagePoint>,
}

/// How the camera-frame rotation is carried into the output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationRemap {
    /// Quaternion used as solved (wire-compatible with existing drivers)
    #[default]
    Passthrough,
    /// Conjugate by the same Y/Z flip applied to the position: (w, x, -y, -z)
    MirrorYz,
}

impl RotationRemap {
    pub fn apply(self, q: Quat) -> Quat {
        match self {
            Self::Passthrough => q,
            Self::MirrorYz => Quat::new(q.w, q.x, -q.y, -q.z),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    pub camera: CameraIntrinsics,
    /// Printed marker side length, meters
    pub marker_size_m: f64,
    #[serde(default = "default_max_reprojection_px")]
    pub max_reprojection_error_px: f64,
    #[serde(default)]
    pub rotation_remap: RotationRemap,
}

fn default_max_reprojection_px() -> f64 {
    DEFAULT_MAX_REPROJECTION_PX
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            camera: CameraIntrinsics::default(),
            marker_size_m: 0.05,
            max_reprojection_error_px: DEFAULT_MAX_REPROJECTION_PX,
            rotation_remap: RotationRemap::Passthrough,
        }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

/// Axis-angle → unit quaternion (w, x, y, z).
pub fn rotation_vector_to_quaternion(rvec: &Vector3<f64>) -> Quat {
    let angle = rvec.norm();
    if !(angle >= ROTATION_EPSILON) {
        return Quat::IDENTITY;
    }
    let axis = rvec / angle;
    let (s, c) = (angle / 2.0).sin_cos();
    Quat::new(c as f32, (axis.x * s) as f32, (axis.y * s) as f32, (axis.z * s) as f32).normalized()
}

/// Camera-frame translation → output-frame position.
pub fn remap_position(t: &Vector3<f64>) -> Vec3 {
    Vec3::new(t.x as f32, -t.y as f32, -t.z as f32)
}

// ── Stateless estimate ────────────────────────────────────────────────────────

/// Solve one observation into an uncalibrated output-frame pose.
pub fn estimate_pose(
    observation: &MarkerObservation,
    config: &EstimatorConfig,
) -> Result<(Pose, PnpSolution), EstimateError> {
    let corners: &[ImagePoint; 4] = observation
        .corners
        .as_slice()
        .try_into()
        .map_err(|_| EstimateError::TooFewCorners {
            marker_id: observation.marker_id,
            found: observation.corners.len(),
        })?;
    if corners.iter().any(|c| !(c.x.is_finite() && c.y.is_finite())) {
        return Err(EstimateError::Degenerate);
    }

    let solution = pnp::solve_square(corners, config.marker_size_m, &config.camera)?;
    if !(solution.reprojection_rms_px <= config.max_reprojection_error_px) {
        return Err(EstimateError::NoConvergence { rms_px: solution.reprojection_rms_px });
    }

    let orientation = config
        .rotation_remap
        .apply(rotation_vector_to_quaternion(&solution.rotation_vector));
    let pose = Pose {
        orientation,
        position: remap_position(&solution.translation),
        angular_velocity: Vec3::ZERO,
    };
    Ok((pose, solution))
}

// ── Stateful estimator ────────────────────────────────────────────────────────

/// Maps marker ids to devices and owns their calibration.
#[derive(Debug, Clone)]
pub struct MarkerPoseEstimator {
    config: EstimatorConfig,
    devices: HashMap<u32, TrackedDeviceId>,
    calibration: HashMap<TrackedDeviceId, AffineCalibration>,
    last_raw_position: HashMap<TrackedDeviceId, Vec3>,
}

impl MarkerPoseEstimator {
    /// Estimator with the default marker id per device (LEFT=0, RIGHT=1, HMD=2).
    pub fn new(config: EstimatorConfig) -> Self {
        let devices = TrackedDeviceId::ALL.iter().map(|d| (d.marker_id(), *d)).collect();
        Self {
            config,
            devices,
            calibration: HashMap::new(),
            last_raw_position: HashMap::new(),
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Bind `marker_id` to `device`, replacing any previous binding for that device.
    pub fn assign_marker(&mut self, marker_id: u32, device: TrackedDeviceId) {
        self.devices.retain(|_, d| *d != device);
        self.devices.insert(marker_id, device);
    }

    pub fn device_for_marker(&self, marker_id: u32) -> Option<TrackedDeviceId> {
        self.devices.get(&marker_id).copied()
    }

    pub fn set_calibration(&mut self, device: TrackedDeviceId, calibration: AffineCalibration) {
        self.calibration.insert(device, calibration);
    }

    pub fn calibration(&self, device: TrackedDeviceId) -> AffineCalibration {
        self.calibration.get(&device).copied().unwrap_or_default()
    }

    /// Calibrated pose for a known marker, or None (unknown marker, or no solve).
    pub fn estimate(&mut self, observation: &MarkerObservation) -> Option<(TrackedDeviceId, Pose)> {
        let device = self.device_for_marker(observation.marker_id)?;
        match estimate_pose(observation, &self.config) {
            Ok((mut pose, solution)) => {
                self.last_raw_position.insert(device, pose.position);
                pose.position = self.calibration(device).apply(pose.position);
                debug!(
                    "{device}: tz={:.3}m rms={:.2}px iters={}",
                    solution.translation.z, solution.reprojection_rms_px, solution.iterations
                );
                Some((device, pose))
            }
            Err(e) => {
                debug!("{device}: no pose ({e})");
                None
            }
        }
    }

    /// Make the device's last seen position the origin. False if it was never seen.
    pub fn recenter(&mut self, device: TrackedDeviceId) -> bool {
        let Some(raw) = self.last_raw_position.get(&device).copied() else {
            return false;
        };
        self.calibration.entry(device).or_default().recenter(raw);
        true
    }

    pub fn reset_calibration(&mut self) {
        self.calibration.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiny_rotation_vector_is_exact_identity() {
        let q = rotation_vector_to_quaternion(&Vector3::new(3e-5, -2e-5, 5e-5));
        assert_eq!(q, Quat::IDENTITY);
        assert_eq!(rotation_vector_to_quaternion(&Vector3::zeros()), Quat::IDENTITY);
    }

    #[test]
    fn half_turn_about_z() {
        let q = rotation_vector_to_quaternion(&Vector3::new(0.0, 0.0, std::f64::consts::PI));
        assert!(q.w.abs() < 1e-6);
        assert!((q.z - 1.0).abs() < 1e-6);
    }

    #[test]
    fn position_remap_negates_y_and_z() {
        let p = remap_position(&Vector3::new(0.1, 0.2, 1.5));
        assert_eq!(p, Vec3::new(0.1, -0.2, -1.5));
    }

    #[test]
    fn mirror_remap_flips_rotation_axis_components() {
        let q = Quat::new(0.5, 0.5, 0.5, 0.5);
        assert_eq!(RotationRemap::Passthrough.apply(q), q);
        assert_eq!(RotationRemap::MirrorYz.apply(q), Quat::new(0.5, 0.5, -0.5, -0.5));
    }

    #[test]
    fn three_corners_is_too_few() {
        let obs = MarkerObservation {
            marker_id: 1,
            corners: vec![
                ImagePoint::new(300.0, 220.0),
                ImagePoint::new(340.0, 220.0),
                ImagePoint::new(340.0, 260.0),
            ],
        };
        assert_eq!(
            estimate_pose(&obs, &EstimatorConfig::default()).unwrap_err(),
            EstimateError::TooFewCorners { marker_id: 1, found: 3 }
        );
    }

    #[test]
    fn assign_marker_rebinds_device() {
        let mut est = MarkerPoseEstimator::new(EstimatorConfig::default());
        est.assign_marker(23, TrackedDeviceId::Hmd);
        assert_eq!(est.device_for_marker(23), Some(TrackedDeviceId::Hmd));
        assert_eq!(est.device_for_marker(2), None);
    }
}
