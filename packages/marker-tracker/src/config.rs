//! config.rs — Tracker configuration (config.toml)
//!
//! An embedded default (`config.toml` at the package root) is used when no
//! file is given or the file can't be read.

use std::net::SocketAddr;

use anyhow::Context;
use pose_types::{PacketLayout, TrackedDeviceId};
use serde::Deserialize;
use tracing::warn;

use crate::calibration::AffineCalibration;
use crate::camera::CameraIntrinsics;
use crate::estimator::{EstimatorConfig, MarkerPoseEstimator, RotationRemap, DEFAULT_MAX_REPROJECTION_PX};
use crate::gyro::GyroConfig;
use crate::motion::MotionConfig;
use crate::scenarios::ScenarioConfig;

pub const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub camera: CameraIntrinsics,
    pub marker: MarkerConfig,
    pub sender: SenderConfig,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub gyro: GyroConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub scenarios: ScenarioConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkerConfig {
    pub size_m: f64,
    #[serde(default = "default_max_reprojection_px")]
    pub max_reprojection_error_px: f64,
    #[serde(default)]
    pub rotation_remap: RotationRemap,
}

fn default_max_reprojection_px() -> f64 {
    DEFAULT_MAX_REPROJECTION_PX
}

#[derive(Debug, Clone, Deserialize)]
pub struct SenderConfig {
    /// Driver (5555) or calibration hub (5554)
    pub target: String,
    pub rate_hz: f64,
    #[serde(default)]
    pub layout: PacketLayout,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub device: TrackedDeviceId,
    pub marker_id: u32,
    #[serde(default)]
    pub calibration: AffineCalibration,
}

impl TrackerConfig {
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        let cfg: Self = toml::from_str(s).context("invalid tracker config")?;
        anyhow::ensure!(cfg.marker.size_m > 0.0, "marker.size_m must be positive");
        anyhow::ensure!(cfg.sender.rate_hz > 0.0, "sender.rate_hz must be positive");
        Ok(cfg)
    }

    /// Load `path`, falling back to the embedded default if it can't be read.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let text = match path {
            Some(p) => match std::fs::read_to_string(p) {
                Ok(t) => t,
                Err(e) => {
                    warn!("config: can't read {p} ({e}), using built-in defaults");
                    DEFAULT_CONFIG.to_string()
                }
            },
            None => DEFAULT_CONFIG.to_string(),
        };
        Self::from_toml(&text)
    }

    pub fn sender_target(&self) -> anyhow::Result<SocketAddr> {
        self.sender
            .target
            .parse()
            .with_context(|| format!("sender.target '{}' is not host:port", self.sender.target))
    }

    pub fn estimator_config(&self) -> EstimatorConfig {
        EstimatorConfig {
            camera: self.camera,
            marker_size_m: self.marker.size_m,
            max_reprojection_error_px: self.marker.max_reprojection_error_px,
            rotation_remap: self.marker.rotation_remap,
        }
    }

    /// Estimator with this config's marker bindings and calibration applied.
    pub fn build_estimator(&self) -> MarkerPoseEstimator {
        let mut est = MarkerPoseEstimator::new(self.estimator_config());
        for d in &self.devices {
            est.assign_marker(d.marker_id, d.device);
            est.set_calibration(d.device, d.calibration);
        }
        est
    }
}
