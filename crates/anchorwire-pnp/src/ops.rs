use glam::{DMat3, DQuat, DVec3};
use nalgebra::{DMatrix, Matrix3, Matrix3x4, Matrix4, SMatrix, SVector, Vector3, Vector4};

/// Compute the centroid of a set of points.
pub(crate) fn compute_centroid(pts: &[[f64; 3]]) -> [f64; 3] {
    let n = pts.len() as f64;
    let sum = pts
        .iter()
        .fold(DVec3::ZERO, |acc, &p| acc + DVec3::from_array(p));

    let centroid = sum / n;
    centroid.to_array()
}

/// Convert array-form pose to glam matrices/vectors.
pub(crate) fn pose_to_rt(r: &[[f64; 3]; 3], t: &[f64; 3]) -> (DMat3, DVec3) {
    let r_mat = DMat3::from_cols(
        DVec3::new(r[0][0], r[1][0], r[2][0]),
        DVec3::new(r[0][1], r[1][1], r[2][1]),
        DVec3::new(r[0][2], r[1][2], r[2][2]),
    );
    (r_mat, DVec3::from_array(*t))
}

pub(crate) fn mat3_to_rows(m: &DMat3) -> [[f64; 3]; 3] {
    let mut r = [[0.0; 3]; 3];
    for (j, col) in [m.x_axis, m.y_axis, m.z_axis].iter().enumerate() {
        r[0][j] = col.x;
        r[1][j] = col.y;
        r[2][j] = col.z;
    }
    r
}

/// Rotation matrix (row-major) from a Rodrigues axis-angle vector.
pub fn rodrigues(rvec: &[f64; 3]) -> [[f64; 3]; 3] {
    let q = DQuat::from_scaled_axis(DVec3::from_array(*rvec));
    mat3_to_rows(&DMat3::from_quat(q))
}

/// Rodrigues axis-angle vector of a row-major rotation matrix, with angle in `[0, pi]`.
pub fn rotation_to_rvec(r: &[[f64; 3]; 3]) -> [f64; 3] {
    let (r_mat, _) = pose_to_rt(r, &[0.0; 3]);
    let q = DQuat::from_mat3(&r_mat);
    let q = if q.w < 0.0 { -q } else { q };
    q.to_scaled_axis().to_array()
}

/// Eigen-decomposition of the point covariance, sorted by decreasing eigenvalue.
///
/// Returns the centroid, the eigenvalues and the matching unit axes.
pub(crate) fn principal_axes(pts: &[[f64; 3]]) -> ([f64; 3], [f64; 3], [DVec3; 3]) {
    let c = compute_centroid(pts);
    let mut cov = Matrix3::<f64>::zeros();
    for p in pts {
        let d = Vector3::new(p[0] - c[0], p[1] - c[1], p[2] - c[2]);
        cov += d * d.transpose();
    }
    cov /= pts.len() as f64;

    let eig = cov.symmetric_eigen();
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));

    let values = order.map(|i| eig.eigenvalues[i].max(0.0));
    let axes = order.map(|i| {
        let col = eig.eigenvectors.column(i);
        DVec3::new(col[0], col[1], col[2])
    });
    (c, values, axes)
}

/// Whether the points lie (numerically) on a plane.
///
/// Compares the smallest covariance eigenvalue against the largest one.
pub fn is_planar(pts: &[[f64; 3]], tol: f64) -> bool {
    let (_, values, _) = principal_axes(pts);
    values[2] <= tol * values[0]
}

/// Rigid alignment (no scale) of `src` onto `dst` with the Kabsch algorithm.
///
/// Returns `(R, t)` such that `dst ≈ R * src + t`, or `None` when the SVD fails.
pub(crate) fn kabsch(src: &[DVec3], dst: &[DVec3]) -> Option<(DMat3, DVec3)> {
    let n = src.len() as f64;
    let c_src = src.iter().fold(DVec3::ZERO, |acc, &p| acc + p) / n;
    let c_dst = dst.iter().fold(DVec3::ZERO, |acc, &p| acc + p) / n;

    let mut h = Matrix3::<f64>::zeros();
    for (ps, pd) in src.iter().zip(dst.iter()) {
        let ds = *ps - c_src;
        let dd = *pd - c_dst;
        h += Vector3::new(dd.x, dd.y, dd.z) * Vector3::new(ds.x, ds.y, ds.z).transpose();
    }

    let svd = h.svd(true, true);
    let mut u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let (i_min, _) = svd.singular_values.argmin();
        u.column_mut(i_min).neg_mut();
        r = u * v_t;
    }

    let r_mat = DMat3::from_cols(
        DVec3::new(r[(0, 0)], r[(1, 0)], r[(2, 0)]),
        DVec3::new(r[(0, 1)], r[(1, 1)], r[(2, 1)]),
        DVec3::new(r[(0, 2)], r[(1, 2)], r[(2, 2)]),
    );
    let t = c_dst - r_mat * c_src;
    Some((r_mat, t))
}

/// Nearest rotation (Frobenius norm) to an arbitrary 3x3 matrix.
pub(crate) fn nearest_rotation(m: &DMat3) -> Option<DMat3> {
    let basis = [DVec3::X, DVec3::Y, DVec3::Z];
    let mapped = basis.map(|e| *m * e);
    // Aligning the canonical basis onto its image is an orthogonal Procrustes problem.
    kabsch(&basis, &mapped).map(|(r, _)| r)
}

const EPSILON: f64 = 1e-14;
const NUM_CONTROL_POINTS: usize = 4;
const MAX_ITERATIONS: usize = 6;
const PAIRS: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];
const NUM_PAIRS: usize = PAIRS.len(); // 6

/// Solves the linear system A * x = b for a 4x4 symmetric positive-definite matrix A
/// using an unrolled Cholesky decomposition.
///
/// # Returns
/// * `Some(Vector4<f64>)` containing the solution vector `x` if `A` is positive-definite.
/// * `None` if the decomposition fails (i.e., `A` is not positive-definite).
#[inline(always)]
pub(crate) fn solve_4x4_cholesky(a: &Matrix4<f64>, b: &Vector4<f64>) -> Option<Vector4<f64>> {
    // First column of L
    let l_11 = a.m11.sqrt();
    if !(l_11 >= EPSILON) {
        return None;
    }
    let l_21 = a.m21 / l_11;
    let l_31 = a.m31 / l_11;
    let l_41 = a.m41 / l_11;

    // Second column of L
    let l_22_sq = a.m22 - l_21 * l_21;
    if l_22_sq < EPSILON {
        return None;
    }
    let l_22 = l_22_sq.sqrt();
    let l_32 = (a.m32 - l_31 * l_21) / l_22;
    let l_42 = (a.m42 - l_41 * l_21) / l_22;

    // Third column of L
    let l_33_sq = a.m33 - l_31 * l_31 - l_32 * l_32;
    if l_33_sq < EPSILON {
        return None;
    }
    let l_33 = l_33_sq.sqrt();
    let l_43 = (a.m43 - l_41 * l_31 - l_42 * l_32) / l_33;

    // Fourth column of L
    let l_44_sq = a.m44 - l_41 * l_41 - l_42 * l_42 - l_43 * l_43;
    if l_44_sq < EPSILON {
        return None;
    }
    let l_44 = l_44_sq.sqrt();

    // Forward substitution: L * y = b
    let y1 = b[0] / l_11;
    let y2 = (b[1] - l_21 * y1) / l_22;
    let y3 = (b[2] - (l_31 * y1 + l_32 * y2)) / l_33;
    let y4 = (b[3] - (l_41 * y1 + l_42 * y2 + l_43 * y3)) / l_44;

    // Backward substitution: L^T * x = y
    let x4 = y4 / l_44;
    let x3 = (y3 - l_43 * x4) / l_33;
    let x2 = (y2 - (l_32 * x3 + l_42 * x4)) / l_22;
    let x1 = (y1 - (l_21 * x2 + l_31 * x3 + l_41 * x4)) / l_11;
    Some(Vector4::new(x1, x2, x3, x4))
}

/// Refines the EPnP betas with Gauss-Newton so that the control-point distances match `rho`.
///
/// Column `k` of `null4` is the null-space vector weighted by `beta[k]`.
pub(crate) fn gauss_newton(beta_init: [f64; 4], null4: &DMatrix<f64>, rho: &[f64; 6]) -> [f64; 4] {
    const DAMPING: f64 = 1e-12;
    const STOP_EPS: f64 = 1e-12;

    let mut bet = Vector4::from(beta_init);
    let rho_vec = SVector::<f64, NUM_PAIRS>::from_row_slice(rho);

    for _ in 0..MAX_ITERATIONS {
        let mut vs = [Vector3::zeros(); NUM_CONTROL_POINTS];

        for (i, v) in vs.iter_mut().enumerate() {
            let m: Matrix3x4<f64> = null4.fixed_view::<3, 4>(i * 3, 0).into();
            *v = m * bet;
        }

        let mut f = SVector::<f64, NUM_PAIRS>::zeros();
        let mut j = SMatrix::<f64, NUM_PAIRS, NUM_CONTROL_POINTS>::zeros();

        for (r, &(i, jj)) in PAIRS.iter().enumerate() {
            let diff = vs[i] - vs[jj];
            f[r] = diff.norm_squared();

            let rows_i = null4.fixed_rows::<3>(i * 3);
            let rows_jj = null4.fixed_rows::<3>(jj * 3);

            for k in 0..NUM_CONTROL_POINTS {
                let d_col = rows_i.column(k) - rows_jj.column(k);
                j[(r, k)] = 2.0 * diff.dot(&d_col);
            }
        }

        f -= rho_vec;

        let mut a = Matrix4::from(j.transpose() * j);
        let b = Vector4::from(j.transpose() * f);

        for d in 0..NUM_CONTROL_POINTS {
            a[(d, d)] += DAMPING;
        }

        if let Some(delta) = solve_4x4_cholesky(&a, &b) {
            bet -= delta;
            if delta.norm() < STOP_EPS {
                break;
            }
        } else {
            // Not positive-definite; keep the current estimate.
            break;
        }
    }

    bet.into()
}
