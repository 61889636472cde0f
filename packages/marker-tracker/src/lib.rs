//! # marker-tracker
//!
//! Sender side of the VR pose bridge: turns marker observations (or gyro
//! rates) into [`pose_types::PosePacket`]s and ships them over UDP.
//!
//! - `camera` / `pnp`: pinhole model and single-square PnP
//! - `estimator`: corners → output-frame pose, per-device calibration
//! - `udp_tx`: sequenced packet sender
//! - `synthetic`, `motion`, `scenarios`: simulated marker source
//! - `observations`: JSON-lines input from an external detector
//! - `gyro`: gyro-mouse orientation integrator

pub mod calibration;
pub mod camera;
pub mod config;
pub mod error;
pub mod estimator;
pub mod gyro;
pub mod motion;
pub mod observations;
pub mod pnp;
pub mod scenarios;
pub mod synthetic;
pub mod udp_tx;

pub use calibration::AffineCalibration;
pub use camera::{CameraIntrinsics, ImagePoint};
pub use error::EstimateError;
pub use estimator::{
    estimate_pose, remap_position, rotation_vector_to_quaternion, EstimatorConfig,
    MarkerObservation, MarkerPoseEstimator, RotationRemap,
};
pub use udp_tx::PoseSender;
