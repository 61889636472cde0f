//! Marker → pose estimation, end to end through the public API.

use marker_tracker::camera::{CameraIntrinsics, ImagePoint};
use marker_tracker::motion::MotionConfig;
use marker_tracker::scenarios::ScenarioConfig;
use marker_tracker::synthetic::SyntheticSource;
use marker_tracker::{
    estimate_pose, remap_position, rotation_vector_to_quaternion, EstimatorConfig,
    MarkerObservation, MarkerPoseEstimator,
};
use nalgebra::{Rotation3, Vector3};
use pose_types::{Quat, TrackedDeviceId, Vec3};
use proptest::prelude::*;

/// 5 cm marker, facing the camera, 1 m straight ahead: 40 px square at the image center.
fn frontal_square(marker_id: u32) -> MarkerObservation {
    MarkerObservation {
        marker_id,
        corners: vec![
            ImagePoint::new(300.0, 220.0),
            ImagePoint::new(340.0, 220.0),
            ImagePoint::new(340.0, 260.0),
            ImagePoint::new(300.0, 260.0),
        ],
    }
}

#[test]
fn test_frontal_square_at_one_meter() {
    let (pose, solution) = estimate_pose(&frontal_square(0), &EstimatorConfig::default()).unwrap();

    assert!((solution.translation.z.abs() - 1.0).abs() < 0.05, "tz = {}", solution.translation.z);
    assert!(solution.reprojection_rms_px < 1e-3);
    // Output frame: Z backward
    assert!((pose.position.z + 1.0).abs() < 0.05);
    assert!(pose.position.x.abs() < 1e-3 && pose.position.y.abs() < 1e-3);
    assert!((pose.orientation.norm_squared() - 1.0).abs() < 1e-4);
}

#[test]
fn test_identity_rotation_below_epsilon() {
    assert_eq!(rotation_vector_to_quaternion(&Vector3::new(9e-5, 0.0, 0.0)), Quat::IDENTITY);
    assert_eq!(rotation_vector_to_quaternion(&Vector3::new(0.0, -5e-5, 5e-5)), Quat::IDENTITY);
}

#[test]
fn test_axis_remap() {
    assert_eq!(remap_position(&Vector3::new(0.3, -0.4, 2.0)), Vec3::new(0.3, 0.4, -2.0));
}

#[test]
fn test_occluded_marker_produces_no_pose() {
    let mut est = MarkerPoseEstimator::new(EstimatorConfig::default());
    let mut obs = frontal_square(1);
    obs.corners.pop();
    assert!(est.estimate(&obs).is_none());
}

#[test]
fn test_unknown_marker_produces_no_pose() {
    let mut est = MarkerPoseEstimator::new(EstimatorConfig::default());
    assert!(est.estimate(&frontal_square(42)).is_none());
}

#[test]
fn test_implausible_corners_are_rejected() {
    // Not a projection of any square: the solve can't reproject within 8 px.
    let obs = MarkerObservation {
        marker_id: 0,
        corners: vec![
            ImagePoint::new(300.0, 220.0),
            ImagePoint::new(420.0, 200.0),
            ImagePoint::new(310.0, 250.0),
            ImagePoint::new(290.0, 400.0),
        ],
    };
    let mut est = MarkerPoseEstimator::new(EstimatorConfig::default());
    assert!(est.estimate(&obs).is_none());
}

#[test]
fn test_recenter_zeroes_current_position() {
    let mut est = MarkerPoseEstimator::new(EstimatorConfig::default());
    assert!(!est.recenter(TrackedDeviceId::Right), "never seen, nothing to recenter on");

    let (device, before) = est.estimate(&frontal_square(1)).unwrap();
    assert_eq!(device, TrackedDeviceId::Right);
    assert!(before.position.length() > 0.9);

    assert!(est.recenter(TrackedDeviceId::Right));
    let (_, after) = est.estimate(&frontal_square(1)).unwrap();
    assert!(after.position.length() < 1e-5, "{:?}", after.position);

    est.reset_calibration();
    let (_, reset) = est.estimate(&frontal_square(1)).unwrap();
    assert_eq!(reset.position, before.position);
}

#[test]
fn test_synthetic_source_tracks_ground_truth() {
    let cfg = EstimatorConfig::default();
    let mut src = SyntheticSource::new(
        cfg.camera,
        cfg.marker_size_m,
        MotionConfig::default(),
        ScenarioConfig::default(),
        3,
    );
    let mut est = MarkerPoseEstimator::new(cfg);

    for frame in 0..50u64 {
        let t = frame as f64 / 30.0;
        for device in TrackedDeviceId::ALL {
            let truth = src.truth(device, t);
            let obs = src.observe(device, t, frame);
            let (id, pose) = est.estimate(&obs).unwrap();
            assert_eq!(id, device);
            let expected = remap_position(&truth.translation);
            assert!(pose.position.sub(expected).length() < 1e-3, "frame {frame} {device}");
        }
    }
}

proptest! {
    #[test]
    fn test_pnp_recovers_rendered_pose(
        tx in -0.15f64..0.15,
        ty in -0.10f64..0.10,
        tz in 0.4f64..1.5,
        rx in -0.5f64..0.5,
        ry in -0.5f64..0.5,
        rz in -3.0f64..3.0,
    ) {
        let cam = CameraIntrinsics::default();
        let size = 0.05;
        let rotation = Rotation3::from_axis_angle(&Vector3::x_axis(), std::f64::consts::PI)
            * Rotation3::new(Vector3::new(rx, ry, rz));
        let t = Vector3::new(tx, ty, tz);

        let corners: Vec<ImagePoint> = marker_tracker::pnp::marker_model_points(size)
            .iter()
            .map(|m| cam.project(&(rotation * m + t)).unwrap())
            .collect();
        let obs = MarkerObservation { marker_id: 0, corners };

        let (pose, solution) = estimate_pose(&obs, &EstimatorConfig::default()).unwrap();
        prop_assert!((solution.translation - t).norm() < 1e-4);
        let expected = remap_position(&t);
        prop_assert!(pose.position.sub(expected).length() < 1e-4);
        prop_assert!((pose.orientation.norm_squared() - 1.0).abs() < 1e-4);
    }
}
