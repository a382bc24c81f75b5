//! Efficient Perspective-n-Point (EPnP) solver
//! Paper: https://www.tugraz.at/fileadmin/user_upload/Institute/ICG/Images/team_lepetit/publications/lepetit_ijcv08.pdf
//! Reference: https://github.com/opencv/opencv/blob/4.x/modules/calib3d/src/epnp.cpp

use crate::camera::{CameraIntrinsics, CameraModel};
use crate::ops::{gauss_newton, kabsch, mat3_to_rows, principal_axes, rotation_to_rvec};
use crate::pnp::{check_correspondences, NumericTol, PnPError, PnPResult, PnPSolver, Pose};
use crate::projection::rmse;
use glam::DVec3;
use nalgebra::{DMatrix, DVector, Matrix3, Vector3, Vector4};

/// Marker type representing the Efficient PnP algorithm.
pub struct EPnP;

impl PnPSolver for EPnP {
    type Param = EPnPParams;

    fn solve(
        world: &[[f64; 3]],
        image: &[[f64; 2]],
        camera: &CameraModel,
        params: &Self::Param,
    ) -> Result<PnPResult, PnPError> {
        solve_epnp(world, image, camera, params)
    }
}

/// Parameters controlling the EPnP solver.
#[derive(Debug, Clone, Default)]
pub struct EPnPParams {
    /// Shared numeric tolerances.
    pub tol: NumericTol,
}

/// Solve Perspective-n-Point (EPnP).
///
/// # Arguments
/// * `world` – 3-D coordinates in the world frame, shape *(N,3)* with `N≥4`.
/// * `image` – Corresponding pixel coordinates, shape *(N,2)*. They are undistorted first
///   when the camera carries distortion.
/// * `camera` – Camera model.
///
/// # Returns
/// The candidate with the lowest pixel RMSE among the three beta approximations, each refined
/// with Gauss-Newton.
pub fn solve_epnp(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    camera: &CameraModel,
    params: &EPnPParams,
) -> Result<PnPResult, PnPError> {
    check_correspondences(world, image, 4)?;

    let undistorted;
    let pixels = if camera.has_distortion() {
        undistorted = camera.undistort_points(image);
        undistorted.as_slice()
    } else {
        image
    };

    let cw = select_control_points(world);
    let alphas = compute_barycentric(world, &cw, params.tol.eps)?;

    let m = build_m(&alphas, pixels, &camera.intrinsics);
    let null4 = null_space4(&(m.transpose() * &m));

    let l = build_l6x10(&null4);
    let rho = rho_ctrlpts(&cw);
    let rho_vec = DVector::<f64>::from_column_slice(&rho);

    let betas = [
        estimate_beta([0, 1, 3, 6], &l, &rho_vec, params.tol.svd),
        estimate_beta([0, 1, 2], &l, &rho_vec, params.tol.svd),
        estimate_beta([0, 1, 2, 3, 4], &l, &rho_vec, params.tol.svd),
    ];

    let mut best: Option<(f64, PnPResult)> = None;
    for beta in betas.into_iter().flatten() {
        let beta = gauss_newton(beta, &null4, &rho);
        let Some((rotation, translation)) = pose_from_betas(&beta, &null4, world, &alphas) else {
            continue;
        };
        let rvec = rotation_to_rvec(&rotation);
        let err = rmse(world, image, &Pose::new(rvec, translation), camera);
        if !err.is_finite() {
            continue;
        }
        if best.as_ref().map_or(true, |(best_err, _)| err < *best_err) {
            let result = PnPResult {
                rotation,
                translation,
                rvec,
                reproj_rmse: Some(err),
                num_iterations: None,
                converged: Some(true),
            };
            best = Some((err, result));
        }
    }

    let (_, result) = best.ok_or_else(|| {
        PnPError::DegenerateConfiguration("EPnP produced no valid beta candidate".to_string())
    })?;
    result.ensure_finite("EPnP")
}

/// Eigenvectors of `MᵀM` for its four smallest eigenvalues, smallest first (shape 12×4).
fn null_space4(mtm: &DMatrix<f64>) -> DMatrix<f64> {
    let eig = mtm.clone().symmetric_eigen();
    let mut order: Vec<usize> = (0..eig.eigenvalues.len()).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[a].total_cmp(&eig.eigenvalues[b]));

    let mut null4 = DMatrix::<f64>::zeros(12, 4);
    for (k, &idx) in order.iter().take(4).enumerate() {
        null4.set_column(k, &eig.eigenvectors.column(idx));
    }
    null4
}

/// Recover `(R, t)` from a beta vector by aligning the world points with their camera-frame
/// reconstruction.
fn pose_from_betas(
    betas: &[f64; 4],
    null4: &DMatrix<f64>,
    world: &[[f64; 3]],
    alphas: &[[f64; 4]],
) -> Option<([[f64; 3]; 3], [f64; 3])> {
    let cc_flat = null4 * Vector4::from_column_slice(betas);
    let cc: [DVec3; 4] =
        std::array::from_fn(|i| DVec3::new(cc_flat[3 * i], cc_flat[3 * i + 1], cc_flat[3 * i + 2]));

    let mut pcs: Vec<DVec3> = alphas
        .iter()
        .map(|a| cc.iter().zip(a.iter()).fold(DVec3::ZERO, |acc, (c, &w)| acc + *c * w))
        .collect();

    // The solution is defined up to sign; keep the points in front of the camera.
    if pcs[0].z < 0.0 {
        pcs.iter_mut().for_each(|p| *p = -*p);
    }

    let pws: Vec<DVec3> = world.iter().map(|p| DVec3::from_array(*p)).collect();
    let (r, t) = kabsch(&pws, &pcs)?;
    Some((mat3_to_rows(&r), t.to_array()))
}

fn select_control_points(world: &[[f64; 3]]) -> [[f64; 3]; 4] {
    let (c, values, axes) = principal_axes(world);

    // Assemble control points: centroid + principal-axis displacements
    let mut cw = [c; 4];
    for (i, (value, axis)) in values.iter().zip(axes.iter()).enumerate() {
        let p = DVec3::from_array(c) + value.sqrt() * *axis;
        cw[i + 1] = p.to_array();
    }
    cw
}

/// Compute barycentric coordinates of world-space points with respect to the
/// 4 control points returned by `select_control_points`.
///
/// Each element is `[α0, α1, α2, α3]` such that `α0 + α1 + α2 + α3 = 1` and `pw_i = Σ αj Cw_j`.
/// When the control-point tetrahedron is flat (determinant below `eps`) a Moore–Penrose
/// pseudo-inverse is used.
fn compute_barycentric(
    world: &[[f64; 3]],
    cw: &[[f64; 3]; 4],
    eps: f64,
) -> Result<Vec<[f64; 4]>, PnPError> {
    let c0 = Vector3::from(cw[0]);
    let b = Matrix3::from_columns(&[
        Vector3::from(cw[1]) - c0,
        Vector3::from(cw[2]) - c0,
        Vector3::from(cw[3]) - c0,
    ]);

    let b_inv = match b.try_inverse() {
        Some(inv) if b.determinant().abs() > eps => inv,
        _ => b
            .pseudo_inverse(eps)
            .map_err(|e| PnPError::SvdFailed(e.to_string()))?,
    };

    Ok(world
        .iter()
        .map(|p| {
            let lamb = b_inv * (Vector3::from(*p) - c0);
            [1.0 - (lamb.x + lamb.y + lamb.z), lamb.x, lamb.y, lamb.z]
        })
        .collect())
}

/// Construct the 2N×12 design matrix **M** used by EPnP.
fn build_m(alphas: &[[f64; 4]], pixels: &[[f64; 2]], k: &CameraIntrinsics) -> DMatrix<f64> {
    let n = alphas.len();
    let mut m = DMatrix::<f64>::zeros(2 * n, 12);

    for (i, (a, uv)) in alphas.iter().zip(pixels.iter()).enumerate() {
        let row_x = 2 * i;
        let row_y = row_x + 1;
        for (j, &alpha) in a.iter().enumerate() {
            let base = 3 * j;
            m[(row_x, base)] = alpha * k.fx;
            m[(row_x, base + 2)] = alpha * (k.cx - uv[0]);
            m[(row_y, base + 1)] = alpha * k.fy;
            m[(row_y, base + 2)] = alpha * (k.cy - uv[1]);
        }
    }

    m
}

/// Build the 6×10 matrix **L** from the 12×4 null-space basis.
///
/// Column layout (with `bij = βi·βj`): `b11 b12 b22 b13 b23 b33 b14 b24 b34 b44`.
fn build_l6x10(null4: &DMatrix<f64>) -> [[f64; 10]; 6] {
    let dv: [[DVec3; 6]; 4] = std::array::from_fn(|c| {
        let col = null4.column(c);
        let block = |k: usize| DVec3::new(col[3 * k], col[3 * k + 1], col[3 * k + 2]);
        CP_PAIRS.map(|(a, b)| block(a) - block(b))
    });

    let mut l = [[0.0f64; 10]; 6];
    for (j, row) in l.iter_mut().enumerate() {
        row[0] = dv[0][j].dot(dv[0][j]);
        row[1] = 2.0 * dv[0][j].dot(dv[1][j]);
        row[2] = dv[1][j].dot(dv[1][j]);
        row[3] = 2.0 * dv[0][j].dot(dv[2][j]);
        row[4] = 2.0 * dv[1][j].dot(dv[2][j]);
        row[5] = dv[2][j].dot(dv[2][j]);
        row[6] = 2.0 * dv[0][j].dot(dv[3][j]);
        row[7] = 2.0 * dv[1][j].dot(dv[3][j]);
        row[8] = 2.0 * dv[2][j].dot(dv[3][j]);
        row[9] = dv[3][j].dot(dv[3][j]);
    }
    l
}

/// Extracts a 6×k `DMatrix` by picking the specified columns from the 6×10 `L` matrix.
fn l_submatrix(l: &[[f64; 10]; 6], cols: &[usize]) -> DMatrix<f64> {
    DMatrix::<f64>::from_fn(6, cols.len(), |r, c| l[r][cols[c]])
}

/// Linearized beta estimate for a column subset of `L`.
///
/// * `[0, 1, 3, 6]` – all four betas from `b11 b12 b13 b14`.
/// * `[0, 1, 2]` – two betas from `b11 b12 b22`.
/// * `[0, 1, 2, 3, 4]` – three betas from `b11 b12 b22 b13 b23`.
fn estimate_beta<const K: usize>(
    cols: [usize; K],
    l: &[[f64; 10]; 6],
    rho: &DVector<f64>,
    tol_svd: f64,
) -> Option<[f64; 4]> {
    let l_sub = l_submatrix(l, &cols);
    let x = l_sub.svd(true, true).solve(rho, tol_svd).ok()?;

    let mut beta = [0.0; 4];
    match K {
        4 => {
            let s = if x[0] < 0.0 { -1.0 } else { 1.0 };
            beta[0] = (s * x[0]).sqrt();
            if beta[0] == 0.0 {
                return None;
            }
            for k in 1..4 {
                beta[k] = s * x[k] / beta[0];
            }
        }
        3 | 5 => {
            if x[0] < 0.0 {
                beta[0] = (-x[0]).sqrt();
                beta[1] = if x[2] < 0.0 { (-x[2]).sqrt() } else { 0.0 };
            } else {
                beta[0] = x[0].sqrt();
                beta[1] = if x[2] > 0.0 { x[2].sqrt() } else { 0.0 };
            }
            if x[1] < 0.0 {
                beta[0] = -beta[0];
            }
            if K == 5 {
                if beta[0] == 0.0 {
                    return None;
                }
                beta[2] = x[3] / beta[0];
            }
        }
        _ => return None,
    }
    Some(beta)
}

const CP_PAIRS: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];

/// Compute the six squared distances (ρ vector) between the 4 control points.
fn rho_ctrlpts(cw: &[[f64; 3]; 4]) -> [f64; 6] {
    CP_PAIRS.map(|(i, j)| {
        cw[i]
            .iter()
            .zip(cw[j].iter())
            .map(|(&a, &b)| (a - b).powi(2))
            .sum::<f64>()
    })
}

#[cfg(test)]
mod solve_epnp_tests {
    use super::*;
    use crate::camera::PolynomialDistortion;
    use crate::ops::rodrigues;
    use crate::projection::project_points;
    use approx::assert_relative_eq;

    fn world_points() -> Vec<[f64; 3]> {
        vec![
            [0.0315, 0.03333, -0.10409],
            [-0.0315, 0.03333, -0.10409],
            [0.0, -0.00102, -0.12977],
            [0.02646, -0.03167, -0.1053],
            [-0.02646, -0.031667, -0.1053],
            [0.0, 0.04515, -0.11033],
            [0.011, -0.02, -0.09],
        ]
    }

    fn camera() -> CameraModel {
        CameraModel::pinhole(CameraIntrinsics::new(800.0, 800.0, 640.0, 480.0))
    }

    #[test]
    fn test_barycentric_reconstructs_points() -> Result<(), PnPError> {
        let world = world_points();
        let cw = select_control_points(&world);
        let alphas = compute_barycentric(&world, &cw, EPnPParams::default().tol.eps)?;

        for (p, alpha) in world.iter().zip(alphas.iter()) {
            let mut recon = [0.0; 3];
            for j in 0..4 {
                for k in 0..3 {
                    recon[k] += alpha[j] * cw[j][k];
                }
            }
            for k in 0..3 {
                assert_relative_eq!(recon[k], p[k], epsilon = 1e-9);
            }
            assert_relative_eq!(alpha.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_build_m_layout() -> Result<(), PnPError> {
        let world = world_points();
        let cw = select_control_points(&world);
        let alphas = compute_barycentric(&world, &cw, 1e-12)?;
        let image = vec![[700.0, 500.0]; world.len()];
        let k = camera().intrinsics;

        let m = build_m(&alphas, &image, &k);
        assert_eq!(m.nrows(), 2 * world.len());
        assert_eq!(m.ncols(), 12);
        for j in 0..4 {
            assert_relative_eq!(m[(0, 3 * j)], alphas[0][j] * k.fx);
            assert_relative_eq!(m[(0, 3 * j + 2)], alphas[0][j] * (k.cx - 700.0));
            assert_relative_eq!(m[(1, 3 * j + 1)], alphas[0][j] * k.fy);
            assert_relative_eq!(m[(1, 3 * j + 2)], alphas[0][j] * (k.cy - 500.0));
        }
        Ok(())
    }

    #[test]
    fn test_solve_epnp_recovers_synthetic_pose() -> Result<(), PnPError> {
        let world = world_points();
        let rvec = [0.1, -0.25, 0.05];
        let t = [0.01, -0.02, 0.6];
        let image = project_points(&world, &Pose::new(rvec, t), &camera());

        let result = EPnP::solve(&world, &image, &camera(), &EPnPParams::default())?;
        let r_true = rodrigues(&rvec);
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(result.rotation[i][j], r_true[i][j], epsilon = 1e-6);
            }
            assert_relative_eq!(result.translation[i], t[i], epsilon = 1e-6);
            assert_relative_eq!(result.rvec[i], rvec[i], epsilon = 1e-6);
        }
        assert!(result.reproj_rmse.is_some_and(|e| e < 1e-4));
        Ok(())
    }

    #[test]
    fn test_solve_epnp_with_distortion() -> Result<(), PnPError> {
        let world = world_points();
        let camera = CameraModel::with_distortion(
            camera().intrinsics,
            PolynomialDistortion::from_coeffs([0.05, -0.01, 0.0, 0.0, 0.0]),
        );
        let pose = Pose::new([-0.1, 0.2, 0.0], [0.0, 0.01, 0.5]);
        let image = project_points(&world, &pose, &camera);

        let result = solve_epnp(&world, &image, &camera, &EPnPParams::default())?;
        assert!(result.reproj_rmse.is_some_and(|e| e < 1e-3));
        for i in 0..3 {
            assert_relative_eq!(result.translation[i], pose.translation[i], epsilon = 1e-5);
        }
        Ok(())
    }

    #[test]
    fn test_solve_epnp_insufficient_points() {
        let world = [[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [0.0, 1.0, 1.0]];
        let image = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let res = solve_epnp(&world, &image, &camera(), &EPnPParams::default());
        assert!(matches!(
            res,
            Err(PnPError::InsufficientCorrespondences {
                required: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_solve_epnp_mismatched_lengths() {
        let world = world_points();
        let image = [[0.0, 0.0]; 4];
        let res = solve_epnp(&world, &image, &camera(), &EPnPParams::default());
        assert!(matches!(res, Err(PnPError::MismatchedArrayLengths { .. })));
    }
}
