//! camera.rs — Pinhole camera model with Brown–Conrady distortion
//!
//! Used by:
//!   - pnp.rs: undistorting observed marker corners into normalized coordinates
//!   - synthetic.rs: rendering simulated marker corners from a known pose
//!
//! Intrinsics are approximate (no calibration routine lives here); the
//! defaults match a 640×480 webcam with an ~800 px focal length.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Iterations of the fixed-point undistortion loop
const UNDISTORT_ITERATIONS: usize = 10;

// ── Types ─────────────────────────────────────────────────────────────────────

/// 2D image point, pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImagePoint {
    pub x: f64,
    pub y: f64,
}

impl ImagePoint {
    pub fn new(x: f64, y: f64) -> Self { Self { x, y } }
}

/// Camera intrinsic matrix + lens distortion (k1, k2, p1, p2, k3)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    #[serde(default)]
    pub distortion: [f64; 5],
}

impl Default for CameraIntrinsics {
    fn default() -> Self {
        Self { fx: 800.0, fy: 800.0, cx: 320.0, cy: 240.0, distortion: [0.0; 5] }
    }
}

impl CameraIntrinsics {
    pub fn has_distortion(&self) -> bool {
        self.distortion.iter().any(|k| *k != 0.0)
    }

    /// Apply lens distortion to an ideal normalized point.
    pub fn distort(&self, x: f64, y: f64) -> (f64, f64) {
        let [k1, k2, p1, p2, k3] = self.distortion;
        let r2 = x * x + y * y;
        let radial = 1.0 + k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2;
        let xd = x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
        let yd = y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
        (xd, yd)
    }

    /// Project a camera-frame point to pixels. None if it is not in front of the camera.
    pub fn project(&self, p: &Vector3<f64>) -> Option<ImagePoint> {
        if p.z <= 1e-9 {
            return None;
        }
        let (xd, yd) = self.distort(p.x / p.z, p.y / p.z);
        Some(ImagePoint::new(self.fx * xd + self.cx, self.fy * yd + self.cy))
    }

    /// Pixel → ideal normalized image coordinates (z = 1 plane).
    pub fn undistort(&self, px: &ImagePoint) -> (f64, f64) {
        let xd = (px.x - self.cx) / self.fx;
        let yd = (px.y - self.cy) / self.fy;
        if !self.has_distortion() {
            return (xd, yd);
        }

        let [k1, k2, p1, p2, k3] = self.distortion;
        let (mut x, mut y) = (xd, yd);
        for _ in 0..UNDISTORT_ITERATIONS {
            let r2 = x * x + y * y;
            let radial = 1.0 + k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2;
            let dx = 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
            let dy = p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
            x = (xd - dx) / radial;
            y = (yd - dy) / radial;
        }
        (x, y)
    }
}
