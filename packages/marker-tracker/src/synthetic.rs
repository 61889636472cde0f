//! synthetic.rs — Renders simulated marker observations
//!
//! Chain per device per frame:
//!   1. Ground-truth marker pose from motion.rs
//!   2. Project the 4 model corners through the camera (with distortion)
//!   3. Add Gaussian pixel noise (CornerNoise scenario)
//!   4. Drop a corner when the Occlusion scenario fires
//!
//! The output is exactly what an external detector would hand the estimator.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use pose_types::TrackedDeviceId;

use crate::camera::{CameraIntrinsics, ImagePoint};
use crate::estimator::MarkerObservation;
use crate::motion::{self, MarkerTruth, MotionConfig};
use crate::pnp::marker_model_points;
use crate::scenarios::ScenarioConfig;

pub struct SyntheticSource {
    camera: CameraIntrinsics,
    marker_size_m: f64,
    motion: MotionConfig,
    scenario: ScenarioConfig,
    rng: StdRng,
}

impl SyntheticSource {
    pub fn new(
        camera: CameraIntrinsics,
        marker_size_m: f64,
        motion: MotionConfig,
        scenario: ScenarioConfig,
        seed: u64,
    ) -> Self {
        Self {
            camera,
            marker_size_m,
            motion,
            scenario,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn scenario(&self) -> &ScenarioConfig {
        &self.scenario
    }

    pub fn truth(&self, device: TrackedDeviceId, t: f64) -> MarkerTruth {
        motion::marker_pose(device, t, &self.motion)
    }

    /// Observation of `device`'s marker at time `t` (frame index `frame`).
    pub fn observe(&mut self, device: TrackedDeviceId, t: f64, frame: u64) -> MarkerObservation {
        let truth = self.truth(device, t);
        let sigma = self.scenario.corner_sigma_px();
        let noise = Normal::new(0.0, sigma).ok().filter(|_| sigma > 0.0);

        let mut corners: Vec<ImagePoint> = marker_model_points(self.marker_size_m)
            .iter()
            .filter_map(|m| self.camera.project(&(truth.rotation * m + truth.translation)))
            .map(|mut p| {
                if let Some(n) = &noise {
                    p.x += n.sample(&mut self.rng);
                    p.y += n.sample(&mut self.rng);
                }
                p
            })
            .collect();

        if self.scenario.is_occluded(device, frame) {
            corners.pop();
        }

        MarkerObservation { marker_id: device.marker_id(), corners }
    }
}
