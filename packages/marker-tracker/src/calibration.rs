//! calibration.rs — Per-device affine position calibration
//!
//! `position' = position * scale + offset`, applied after the camera → output
//! axis remap. Recentering captures the current raw position and sets
//! `offset = -(position * scale)`, so the device reads as the origin from then
//! on whatever the scale (with unit scale this is plain `offset = -position`).

use pose_types::Vec3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineCalibration {
    /// Per-axis multiplier
    #[serde(default = "unit_scale")]
    pub scale: Vec3,
    /// Added after scaling, meters
    #[serde(default)]
    pub offset: Vec3,
}

fn unit_scale() -> Vec3 {
    Vec3::ONE
}

impl Default for AffineCalibration {
    fn default() -> Self {
        Self { scale: Vec3::ONE, offset: Vec3::ZERO }
    }
}

impl AffineCalibration {
    pub fn apply(&self, position: Vec3) -> Vec3 {
        position.mul(self.scale).add(self.offset)
    }

    /// `current` is the uncalibrated position; scale is left alone.
    pub fn recenter(&mut self, current: Vec3) {
        self.offset = current.mul(self.scale).neg();
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }
}
