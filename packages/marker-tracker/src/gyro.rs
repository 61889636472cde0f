//! gyro.rs — Gyro-mouse orientation source
//!
//! Angular rates (deg/s) are exponentially smoothed, then integrated into an
//! orientation quaternion every tick:
//!
//!   delta = rotation about (ω / |ω|) by |ω|·dt
//!   q     = delta · q          (world-frame rates)
//!
//! The result goes out with the 48-byte (no trigger) packet layout to the
//! raw gyro port (5556 by default).

use pose_types::{Pose, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Rates below this magnitude (deg/s) are treated as no rotation.
const MIN_RATE_DEG: f32 = 1e-6;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GyroConfig {
    pub target: String,
    pub rate_hz: f64,
    /// Weight of the newest sample, 0 < alpha ≤ 1 (1 = no smoothing)
    pub smoothing_alpha: f32,
}

impl Default for GyroConfig {
    fn default() -> Self {
        Self {
            target: "127.0.0.1:5556".into(),
            rate_hz: 100.0,
            smoothing_alpha: 0.3,
        }
    }
}

/// First-order low-pass on a 3-vector.
#[derive(Debug, Clone, Copy)]
pub struct ExpSmoother {
    alpha: f32,
    state: Option<Vec3>,
}

impl ExpSmoother {
    pub fn new(alpha: f32) -> Self {
        Self { alpha: alpha.clamp(f32::EPSILON, 1.0), state: None }
    }

    pub fn update(&mut self, sample: Vec3) -> Vec3 {
        let next = match self.state {
            None => sample,
            Some(prev) => Vec3::new(
                prev.x + self.alpha * (sample.x - prev.x),
                prev.y + self.alpha * (sample.y - prev.y),
                prev.z + self.alpha * (sample.z - prev.z),
            ),
        };
        self.state = Some(next);
        next
    }
}

/// Simulated gyro-mouse rates at time `t`, deg/s.
pub fn simulated_rates_deg(t: f64) -> Vec3 {
    Vec3::new(
        ((0.5 * t).sin() * 10.0) as f32,
        ((0.3 * t).cos() * 10.0) as f32,
        ((0.2 * t).sin() * 5.0) as f32,
    )
}

/// Smoothed integrator from rates to orientation.
#[derive(Debug, Clone)]
pub struct GyroIntegrator {
    orientation: Quat,
    smoother: ExpSmoother,
    last_rate_rad: Vec3,
}

impl GyroIntegrator {
    pub fn new(alpha: f32) -> Self {
        Self {
            orientation: Quat::IDENTITY,
            smoother: ExpSmoother::new(alpha),
            last_rate_rad: Vec3::ZERO,
        }
    }

    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    /// Current heading becomes identity; smoothing history is kept.
    pub fn reset(&mut self) {
        self.orientation = Quat::IDENTITY;
    }

    /// Feed one raw rate sample (deg/s) covering `dt` seconds.
    pub fn step(&mut self, rate_deg: Vec3, dt: f32) -> Pose {
        let smoothed = self.smoother.update(rate_deg);
        let speed = smoothed.length();
        if speed > MIN_RATE_DEG && dt > 0.0 {
            let angle = (speed * dt).to_radians();
            let (s, c) = (angle / 2.0).sin_cos();
            let k = s / speed;
            let delta = Quat::new(c, smoothed.x * k, smoothed.y * k, smoothed.z * k);
            let q = delta.mul(&self.orientation);
            let n = q.norm_squared().sqrt();
            self.orientation = Quat::new(q.w / n, q.x / n, q.y / n, q.z / n);
        }
        self.last_rate_rad = Vec3::new(
            smoothed.x.to_radians(),
            smoothed.y.to_radians(),
            smoothed.z.to_radians(),
        );
        Pose {
            orientation: self.orientation,
            position: Vec3::ZERO,
            angular_velocity: self.last_rate_rad,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoother_first_sample_passes_through() {
        let mut s = ExpSmoother::new(0.25);
        assert_eq!(s.update(Vec3::new(4.0, 0.0, 0.0)), Vec3::new(4.0, 0.0, 0.0));
        assert_eq!(s.update(Vec3::new(8.0, 0.0, 0.0)), Vec3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn constant_rate_integrates_to_expected_angle() {
        let mut g = GyroIntegrator::new(1.0);
        // 90 deg/s about Z for one second in 100 steps
        for _ in 0..100 {
            g.step(Vec3::new(0.0, 0.0, 90.0), 0.01);
        }
        let q = g.orientation();
        let h = std::f32::consts::FRAC_1_SQRT_2;
        assert!((q.w - h).abs() < 1e-4, "w = {}", q.w);
        assert!((q.z - h).abs() < 1e-4, "z = {}", q.z);
    }

    #[test]
    fn zero_rate_keeps_orientation() {
        let mut g = GyroIntegrator::new(0.5);
        let pose = g.step(Vec3::ZERO, 0.01);
        assert_eq!(pose.orientation, Quat::IDENTITY);
        assert_eq!(pose.angular_velocity, Vec3::ZERO);
    }

    #[test]
    fn reset_recenters_orientation() {
        let mut g = GyroIntegrator::new(1.0);
        for _ in 0..50 {
            g.step(Vec3::new(0.0, 90.0, 0.0), 0.01);
        }
        assert!(g.orientation().w < 0.99);
        g.reset();
        assert_eq!(g.orientation(), Quat::IDENTITY);
        // Integration continues from identity
        let pose = g.step(Vec3::new(0.0, 90.0, 0.0), 0.01);
        assert!(pose.orientation.y > 0.0 && pose.orientation.y < 0.01);
    }

    #[test]
    fn integrated_orientation_stays_unit() {
        let mut g = GyroIntegrator::new(0.3);
        for i in 0..1000 {
            g.step(simulated_rates_deg(i as f64 * 0.01), 0.01);
        }
        assert!((g.orientation().norm_squared() - 1.0).abs() < 1e-4);
    }
}
