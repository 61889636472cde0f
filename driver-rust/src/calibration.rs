//! calibration.rs — Hub-side per-device calibration pipeline
//!
//! Position:
//!   1. relative = raw − reference            (move origin to the calibration point)
//!   2. rotated  = R(rotation_offset) · relative
//!   3. inverted = per-axis sign flip
//!   4. scaled   = inverted × scale
//!   5. final    = scaled + offset
//!
//! Orientation:
//!   relative = q_raw · conj(q_rest)
//!   world    = q_rot · relative · conj(q_rot)
//!   then optional sign flips of x / y / z, normalized
//!
//! With the default calibration both pipelines are the identity.

use pose_types::{Pose, Quat, TrackedDeviceId, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum hand movement accepted by the axis calibration, meters.
pub const MIN_AXIS_MOVE_M: f32 = 0.20;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    #[error("moved only {moved_m:.3} m along the {axis} axis, need at least {MIN_AXIS_MOVE_M} m")]
    TooSmallMove { axis: &'static str, moved_m: f32 },
    #[error("up movement is parallel to right movement")]
    Collinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceCalibration {
    pub reference_position: Vec3,
    /// Marker/camera frame → world frame
    pub rotation_offset: Quat,
    pub axis_invert: [bool; 3],
    pub scale: Vec3,
    pub offset: Vec3,
    /// Marker orientation at calibration time
    pub rest_orientation: Quat,
    pub rotation_invert: [bool; 3],
}

impl Default for DeviceCalibration {
    fn default() -> Self {
        Self {
            reference_position: Vec3::ZERO,
            rotation_offset: Quat::IDENTITY,
            axis_invert: [false; 3],
            scale: Vec3::ONE,
            offset: Vec3::ZERO,
            rest_orientation: Quat::IDENTITY,
            rotation_invert: [false; 3],
        }
    }
}

fn flip(v: f32, invert: bool) -> f32 {
    if invert { -v } else { v }
}

impl DeviceCalibration {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_position(&self, raw: Vec3) -> Vec3 {
        let relative = raw.sub(self.reference_position);
        let rotated = self.rotation_offset.rotate_vec3(relative);
        let inverted = Vec3::new(
            flip(rotated.x, self.axis_invert[0]),
            flip(rotated.y, self.axis_invert[1]),
            flip(rotated.z, self.axis_invert[2]),
        );
        inverted.mul(self.scale).add(self.offset)
    }

    pub fn apply_orientation(&self, raw: Quat) -> Quat {
        let relative = raw.mul(&self.rest_orientation.conjugate());
        let world = self
            .rotation_offset
            .mul(&relative)
            .mul(&self.rotation_offset.conjugate());
        Quat::new(
            world.w,
            flip(world.x, self.rotation_invert[0]),
            flip(world.y, self.rotation_invert[1]),
            flip(world.z, self.rotation_invert[2]),
        )
        .normalized()
    }

    pub fn apply(&self, raw: &Pose) -> Pose {
        if self.is_identity() {
            return *raw;
        }
        Pose {
            orientation: self.apply_orientation(raw.orientation),
            position: self.apply_position(raw.position),
            angular_velocity: self.rotation_offset.rotate_vec3(raw.angular_velocity),
        }
    }

    /// Current raw position becomes the origin; the device then reads at `offset`.
    pub fn recenter(&mut self, current_raw: Vec3) {
        self.reference_position = current_raw;
    }

    /// Current raw orientation becomes both the rest pose and the frame rotation.
    pub fn calibrate_rotation(&mut self, current_raw: Quat) {
        let q = current_raw.normalized();
        self.rest_orientation = q;
        self.rotation_offset = q;
    }

    /// Derive the world frame from two deliberate hand movements:
    /// `origin` → `right` (world +X), then `right` → `up` (world +Y).
    /// The up movement is orthogonalized against the right axis.
    pub fn calibrate_axes(
        &mut self,
        origin: Vec3,
        right: Vec3,
        up: Vec3,
        rest_orientation: Quat,
    ) -> Result<(), CalibrationError> {
        let right_move = right.sub(origin);
        let up_move = up.sub(right);
        if right_move.length() < MIN_AXIS_MOVE_M {
            return Err(CalibrationError::TooSmallMove { axis: "right", moved_m: right_move.length() });
        }
        if up_move.length() < MIN_AXIS_MOVE_M {
            return Err(CalibrationError::TooSmallMove { axis: "up", moved_m: up_move.length() });
        }

        let x_axis = scale(right_move, 1.0 / right_move.length());
        let along = dot(up_move, x_axis);
        let up_orth = up_move.sub(scale(x_axis, along));
        if up_orth.length() < 1e-3 {
            return Err(CalibrationError::Collinear);
        }
        let y_axis = scale(up_orth, 1.0 / up_orth.length());
        let z_axis = cross(x_axis, y_axis);

        // Rows are the world axes expressed in marker coordinates.
        let r = [x_axis.to_array(), y_axis.to_array(), z_axis.to_array()];
        self.rotation_offset = Quat::from_rotation_matrix(&r);
        self.reference_position = origin;
        self.rest_orientation = rest_orientation.normalized();
        self.axis_invert = [false; 3];
        self.scale = Vec3::ONE;
        Ok(())
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn dot(a: Vec3, b: Vec3) -> f32 {
    a.x * b.x + a.y * b.y + a.z * b.z
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(a.y * b.z - a.z * b.y, a.z * b.x - a.x * b.z, a.x * b.y - a.y * b.x)
}

fn scale(v: Vec3, s: f32) -> Vec3 {
    Vec3::new(v.x * s, v.y * s, v.z * s)
}

// ── Calibration set ───────────────────────────────────────────────────────────

/// Calibration for all three devices, as persisted to disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSet {
    pub left: DeviceCalibration,
    pub right: DeviceCalibration,
    pub hmd: DeviceCalibration,
}

impl CalibrationSet {
    pub fn get(&self, device: TrackedDeviceId) -> &DeviceCalibration {
        match device {
            TrackedDeviceId::Left => &self.left,
            TrackedDeviceId::Right => &self.right,
            TrackedDeviceId::Hmd => &self.hmd,
        }
    }

    pub fn get_mut(&mut self, device: TrackedDeviceId) -> &mut DeviceCalibration {
        match device {
            TrackedDeviceId::Left => &mut self.left,
            TrackedDeviceId::Right => &mut self.right,
            TrackedDeviceId::Hmd => &mut self.hmd,
        }
    }
}
