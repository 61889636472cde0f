//! pnp.rs — Perspective-n-Point solver for a single square marker
//!
//! Algorithm:
//!   1. Undistort the 4 observed corners into normalized image coordinates
//!   2. Fit the plane-to-image homography of the unit square (exact 8×8 solve)
//!   3. Decompose H ∝ [r1 r2 t] into an initial rotation (projected onto SO(3)
//!      via SVD) and translation
//!   4. Refine rotation vector + translation with Levenberg–Marquardt on the
//!      normalized reprojection residuals
//!
//! Output follows the Rodrigues convention: `x_cam = R(rvec) · X_marker + t`.

use nalgebra::{Matrix3, Matrix6, Rotation3, SMatrix, SVector, UnitQuaternion, Vector3, Vector6};

use crate::camera::{CameraIntrinsics, ImagePoint};
use crate::error::EstimateError;

const MAX_ITERATIONS: u32 = 30;
const STEP_TOLERANCE: f64 = 1e-12;
const JACOBIAN_STEP: f64 = 1e-7;
const MAX_DAMPING: f64 = 1e8;

/// Unit-square model corners: top-left, top-right, bottom-right, bottom-left (Y up, Z = 0).
const UNIT_SQUARE: [[f64; 2]; 4] = [[-0.5, 0.5], [0.5, 0.5], [0.5, -0.5], [-0.5, -0.5]];

type Residuals = SVector<f64, 8>;
type Jacobian = SMatrix<f64, 8, 6>;

/// Flat square of side `size` centered at the origin, corners in detector order.
pub fn marker_model_points(size: f64) -> [Vector3<f64>; 4] {
    UNIT_SQUARE.map(|[x, y]| Vector3::new(x * size, y * size, 0.0))
}

#[derive(Debug, Clone, Copy)]
pub struct PnpSolution {
    /// Axis-angle rotation, radians
    pub rotation_vector: Vector3<f64>,
    /// Marker origin in the camera frame, meters
    pub translation: Vector3<f64>,
    /// RMS distance between observed and reprojected corners
    pub reprojection_rms_px: f64,
    pub iterations: u32,
}

/// Solve the marker pose from its 4 ordered image corners.
pub fn solve_square(
    corners: &[ImagePoint; 4],
    marker_size: f64,
    camera: &CameraIntrinsics,
) -> Result<PnpSolution, EstimateError> {
    if !(marker_size.is_finite() && marker_size > 0.0) {
        return Err(EstimateError::InvalidMarkerSize(marker_size));
    }

    let observed: [(f64, f64); 4] = corners.map(|c| camera.undistort(&c));
    let model = marker_model_points(marker_size);

    let (rotation, translation) = initial_pose(&observed, marker_size)?;
    let rvec = UnitQuaternion::from_rotation_matrix(&rotation).scaled_axis();

    let mut params = Vector6::new(rvec.x, rvec.y, rvec.z, translation.x, translation.y, translation.z);
    let mut res = residuals(&params, &model, &observed).ok_or(EstimateError::BehindCamera)?;
    let mut cost = res.norm_squared();
    let mut damping = 1e-3;
    let mut iterations = 0;

    while iterations < MAX_ITERATIONS && damping < MAX_DAMPING {
        iterations += 1;
        let jac = jacobian(&params, &model, &observed).ok_or(EstimateError::BehindCamera)?;
        let jtj: Matrix6<f64> = jac.transpose() * jac;
        let jtr: Vector6<f64> = jac.transpose() * res;

        let mut augmented = jtj;
        for d in 0..6 {
            augmented[(d, d)] += damping * jtj[(d, d)].max(1e-12);
        }
        let Some(step) = augmented.cholesky().map(|c| c.solve(&(-jtr))) else {
            damping *= 10.0;
            continue;
        };

        let candidate = params + step;
        match residuals(&candidate, &model, &observed) {
            Some(r) if r.norm_squared() < cost => {
                params = candidate;
                res = r;
                cost = res.norm_squared();
                damping = (damping * 0.1).max(1e-12);
                if step.norm() < STEP_TOLERANCE {
                    break;
                }
            }
            _ => damping *= 10.0,
        }
    }

    if !params.iter().all(|v| v.is_finite()) {
        return Err(EstimateError::NoConvergence { rms_px: f64::INFINITY });
    }

    let rotation_vector = UnitQuaternion::new(Vector3::new(params[0], params[1], params[2])).scaled_axis();
    let translation = Vector3::new(params[3], params[4], params[5]);
    if translation.z <= 0.0 {
        return Err(EstimateError::BehindCamera);
    }

    let rotation = Rotation3::new(rotation_vector);
    let reprojection_rms_px = reprojection_rms(&rotation, &translation, &model, corners, camera);

    Ok(PnpSolution { rotation_vector, translation, reprojection_rms_px, iterations })
}

/// Homography decomposition for the starting guess.
fn initial_pose(
    observed: &[(f64, f64); 4],
    marker_size: f64,
) -> Result<(Rotation3<f64>, Vector3<f64>), EstimateError> {
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for (i, (&[mx, my], &(x, y))) in UNIT_SQUARE.iter().zip(observed.iter()).enumerate() {
        let r = 2 * i;
        a[(r, 0)] = mx;
        a[(r, 1)] = my;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -x * mx;
        a[(r, 7)] = -x * my;
        b[r] = x;

        a[(r + 1, 3)] = mx;
        a[(r + 1, 4)] = my;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -y * mx;
        a[(r + 1, 7)] = -y * my;
        b[r + 1] = y;
    }
    let h = a.lu().solve(&b).ok_or(EstimateError::Degenerate)?;

    let c1 = Vector3::new(h[0], h[3], h[6]);
    let c2 = Vector3::new(h[1], h[4], h[7]);
    let c3 = Vector3::new(h[2], h[5], 1.0);

    let scale = 0.5 * (c1.norm() + c2.norm());
    if !(scale.is_finite() && scale > 1e-12) {
        return Err(EstimateError::Degenerate);
    }
    let lambda = 1.0 / scale;
    let r1 = c1 * lambda;
    let r2 = c2 * lambda;
    let r3 = r1.cross(&r2);

    let rotation = nearest_rotation(&Matrix3::from_columns(&[r1, r2, r3]))?;
    // Model was fit in marker-size units; H's third column is t / size.
    let translation = c3 * lambda * marker_size;
    Ok((rotation, translation))
}

/// Closest proper rotation (Frobenius norm) to an approximately orthonormal matrix.
fn nearest_rotation(m: &Matrix3<f64>) -> Result<Rotation3<f64>, EstimateError> {
    let svd = m.svd(true, true);
    let (Some(mut u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(EstimateError::Degenerate);
    };
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        u.column_mut(2).neg_mut();
        r = u * v_t;
    }
    if !r.iter().all(|v| v.is_finite()) {
        return Err(EstimateError::Degenerate);
    }
    Ok(Rotation3::from_matrix_unchecked(r))
}

fn residuals(
    params: &Vector6<f64>,
    model: &[Vector3<f64>; 4],
    observed: &[(f64, f64); 4],
) -> Option<Residuals> {
    let rotation = Rotation3::new(Vector3::new(params[0], params[1], params[2]));
    let t = Vector3::new(params[3], params[4], params[5]);
    let mut r = Residuals::zeros();
    for (i, (m, &(x, y))) in model.iter().zip(observed.iter()).enumerate() {
        let pc = rotation * m + t;
        if pc.z <= 1e-9 {
            return None;
        }
        r[2 * i] = pc.x / pc.z - x;
        r[2 * i + 1] = pc.y / pc.z - y;
    }
    Some(r)
}

/// Central-difference Jacobian of the residuals w.r.t. (rvec, t).
fn jacobian(
    params: &Vector6<f64>,
    model: &[Vector3<f64>; 4],
    observed: &[(f64, f64); 4],
) -> Option<Jacobian> {
    let mut jac = Jacobian::zeros();
    for k in 0..6 {
        let h = JACOBIAN_STEP * params[k].abs().max(1.0);
        let mut plus = *params;
        let mut minus = *params;
        plus[k] += h;
        minus[k] -= h;
        let diff = (residuals(&plus, model, observed)? - residuals(&minus, model, observed)?) / (2.0 * h);
        jac.set_column(k, &diff);
    }
    Some(jac)
}

fn reprojection_rms(
    rotation: &Rotation3<f64>,
    translation: &Vector3<f64>,
    model: &[Vector3<f64>; 4],
    corners: &[ImagePoint; 4],
    camera: &CameraIntrinsics,
) -> f64 {
    let mut sum_sq = 0.0;
    for (m, c) in model.iter().zip(corners.iter()) {
        let Some(p) = camera.project(&(rotation * m + translation)) else {
            return f64::INFINITY;
        };
        sum_sq += (p.x - c.x).powi(2) + (p.y - c.y).powi(2);
    }
    (sum_sq / 4.0).sqrt()
}
