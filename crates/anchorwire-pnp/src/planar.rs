//! Pose of a planar point set from a plane-to-image homography.
//!
//! The world points are expressed in a 2-D frame spanned by their two principal axes, a
//! normalized DLT homography maps that frame to normalized image coordinates, and the
//! homography is decomposed into a rotation and translation.

use crate::camera::CameraModel;
use crate::ops::{mat3_to_rows, nearest_rotation, principal_axes, rotation_to_rvec};
use crate::pnp::{check_correspondences, NumericTol, PnPError, PnPResult, PnPSolver, Pose};
use crate::projection::rmse;
use glam::{DMat3, DVec2, DVec3};
use nalgebra::DMatrix;

/// Marker type for the planar homography solver.
pub struct PlanarHomography;

impl PnPSolver for PlanarHomography {
    type Param = PlanarParams;

    fn solve(
        world: &[[f64; 3]],
        image: &[[f64; 2]],
        camera: &CameraModel,
        params: &Self::Param,
    ) -> Result<PnPResult, PnPError> {
        solve_planar(world, image, camera, params)
    }
}

/// Parameters controlling the planar solver.
#[derive(Debug, Clone, Default)]
pub struct PlanarParams {
    /// Shared numeric tolerances.
    pub tol: NumericTol,
}

/// Solve PnP for coplanar world points (N ≥ 4, no three collinear).
pub fn solve_planar(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    camera: &CameraModel,
    params: &PlanarParams,
) -> Result<PnPResult, PnPError> {
    check_correspondences(world, image, 4)?;

    let (c, values, axes) = principal_axes(world);
    if values[0] <= params.tol.eps || values[1] <= params.tol.eps * values[0] {
        return Err(PnPError::DegenerateConfiguration(
            "world points are collinear".to_string(),
        ));
    }

    // Plane frame: x along the major axis, z along the plane normal.
    let c = DVec3::from_array(c);
    let basis = DMat3::from_cols(axes[0], axes[1], axes[0].cross(axes[1]));
    let plane: Vec<DVec2> = world
        .iter()
        .map(|p| {
            let q = basis.transpose() * (DVec3::from_array(*p) - c);
            DVec2::new(q.x, q.y)
        })
        .collect();

    let k = camera.intrinsics;
    let normalized: Vec<DVec2> = image
        .iter()
        .map(|&[u, v]| {
            let (u, v) = camera.undistort_point(u, v);
            DVec2::new((u - k.cx) / k.fx, (v - k.cy) / k.fy)
        })
        .collect();

    let h = homography_dlt(&plane, &normalized, params.tol.eps)?;
    let (r_plane, t_plane) = decompose_homography(&h)?;

    // pc = R_p Bᵀ (pw - c) + t
    let r_world = r_plane * basis.transpose();
    let t_world = t_plane - r_world * c;

    let rotation = mat3_to_rows(&r_world);
    let rvec = rotation_to_rvec(&rotation);
    let translation = t_world.to_array();
    let err = rmse(world, image, &Pose::new(rvec, translation), camera);

    PnPResult {
        rotation,
        translation,
        rvec,
        reproj_rmse: Some(err),
        num_iterations: None,
        converged: Some(true),
    }
    .ensure_finite("planar homography")
}

/// Similarity transform moving the points to zero mean and mean distance `sqrt(2)`.
fn hartley_normalization(pts: &[DVec2], eps: f64) -> Result<DMat3, PnPError> {
    let n = pts.len() as f64;
    let mean = pts.iter().fold(DVec2::ZERO, |acc, &p| acc + p) / n;
    let mean_dist = pts.iter().map(|p| (*p - mean).length()).sum::<f64>() / n;
    if mean_dist <= eps {
        return Err(PnPError::DegenerateConfiguration(
            "points collapse to a single location".to_string(),
        ));
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    Ok(DMat3::from_cols(
        DVec3::new(s, 0.0, 0.0),
        DVec3::new(0.0, s, 0.0),
        DVec3::new(-s * mean.x, -s * mean.y, 1.0),
    ))
}

/// Direct linear transform estimate of `H` with `dst ~ H * src`.
pub(crate) fn homography_dlt(src: &[DVec2], dst: &[DVec2], eps: f64) -> Result<DMat3, PnPError> {
    let t_src = hartley_normalization(src, eps)?;
    let t_dst = hartley_normalization(dst, eps)?;

    let n = src.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for (i, (s, d)) in src.iter().zip(dst.iter()).enumerate() {
        let s = t_src * s.extend(1.0);
        let d = t_dst * d.extend(1.0);
        let (x, y) = (s.x, s.y);
        let (u, v) = (d.x, d.y);
        let r0 = 2 * i;
        let r1 = r0 + 1;
        for (j, val) in [-x, -y, -1.0, 0.0, 0.0, 0.0, u * x, u * y, u].into_iter().enumerate() {
            a[(r0, j)] = val;
        }
        for (j, val) in [0.0, 0.0, 0.0, -x, -y, -1.0, v * x, v * y, v].into_iter().enumerate() {
            a[(r1, j)] = val;
        }
    }

    let eig = (a.transpose() * &a).symmetric_eigen();
    let (i_min, _) = eig.eigenvalues.argmin();
    let h = eig.eigenvectors.column(i_min);
    let h_norm = DMat3::from_cols(
        DVec3::new(h[0], h[3], h[6]),
        DVec3::new(h[1], h[4], h[7]),
        DVec3::new(h[2], h[5], h[8]),
    );

    if t_dst.determinant().abs() <= eps {
        return Err(PnPError::DegenerateConfiguration(
            "singular image normalization".to_string(),
        ));
    }
    Ok(t_dst.inverse() * h_norm * t_src)
}

/// Split a plane-to-normalized-image homography into `(R, t)` with the plane in front of the camera.
fn decompose_homography(h: &DMat3) -> Result<(DMat3, DVec3), PnPError> {
    let (h1, h2, h3) = (h.x_axis, h.y_axis, h.z_axis);
    let norm_sum = h1.length() + h2.length();
    if norm_sum <= f64::EPSILON {
        return Err(PnPError::DegenerateConfiguration(
            "homography has vanishing rotation columns".to_string(),
        ));
    }
    let mut lambda = 2.0 / norm_sum;
    if h3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = h1 * lambda;
    let r2 = h2 * lambda;
    let t = h3 * lambda;
    let r = DMat3::from_cols(r1, r2, r1.cross(r2));
    let r = nearest_rotation(&r).ok_or_else(|| {
        PnPError::SvdFailed("orthonormalizing the homography rotation".to_string())
    })?;
    Ok((r, t))
}

/// Homography between two sets of at least four 2-D points, as a row-major 3×3 matrix.
///
/// Scaled so that the bottom-right entry is one when it is not zero.
pub fn find_homography(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Result<[[f64; 3]; 3], PnPError> {
    if src.len() != dst.len() {
        return Err(PnPError::MismatchedArrayLengths {
            left_name: "source points",
            left_len: src.len(),
            right_name: "destination points",
            right_len: dst.len(),
        });
    }
    if src.len() < 4 {
        return Err(PnPError::InsufficientCorrespondences {
            required: 4,
            actual: src.len(),
        });
    }
    let to_vec = |p: &[[f64; 2]]| p.iter().map(|&q| DVec2::from_array(q)).collect::<Vec<_>>();
    let h = homography_dlt(&to_vec(src), &to_vec(dst), NumericTol::default().eps)?;
    let h = if h.z_axis.z.abs() > f64::EPSILON {
        h * (1.0 / h.z_axis.z)
    } else {
        h
    };
    Ok(mat3_to_rows(&h))
}
