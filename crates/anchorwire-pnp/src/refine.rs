//! Levenberg–Marquardt pose refinement for PnP solutions.

use crate::camera::CameraModel;
use crate::pnp::{check_correspondences, PnPError, Pose};
use crate::projection::reprojection_residuals;

/// Parameters controlling the LM pose refinement.
#[derive(Debug, Clone)]
pub struct LMParams {
    /// Maximum number of LM iterations.
    pub max_iters: usize,
    /// Convergence threshold on squared reprojection error decrease.
    pub eps: f64,
    /// Initial damping factor (lambda).
    pub lambda_init: f64,
    /// Multiplicative factor to increase/decrease lambda.
    pub lambda_mul: f64,
}

impl Default for LMParams {
    fn default() -> Self {
        Self {
            max_iters: 20,
            eps: 1e-10,
            lambda_init: 1e-3,
            lambda_mul: 10.0,
        }
    }
}

/// Refine a pose (rvec, t) with Levenberg–Marquardt to minimize pixel reprojection error.
///
/// - `world`: World points (N,3)
/// - `image`: Pixel points (N,2), observed through `camera` (distortion included)
/// - `rvec`: Initial axis-angle rotation (input/output)
/// - `t`: Initial translation (input/output)
///
/// Returns `(rmse, num_iters, converged)` and writes refined `rvec` and `t` in place.
pub fn refine_pose_lm(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    camera: &CameraModel,
    rvec: &mut [f64; 3],
    t: &mut [f64; 3],
    params: &LMParams,
) -> Result<(f64, usize, bool), PnPError> {
    check_correspondences(world, image, 3)?;
    let n = world.len();

    // Parameters vector x = [rx, ry, rz, tx, ty, tz]
    let mut x = [rvec[0], rvec[1], rvec[2], t[0], t[1], t[2]];

    let residuals_of = |x: &[f64; 6], out: &mut [f64]| -> f64 {
        let pose = Pose::new([x[0], x[1], x[2]], [x[3], x[4], x[5]]);
        let mut sum_sq = 0.0;
        for (i, d) in reprojection_residuals(world, image, &pose, camera)
            .iter()
            .enumerate()
        {
            out[2 * i] = d[0];
            out[2 * i + 1] = d[1];
            sum_sq += d[0].mul_add(d[0], d[1] * d[1]);
        }
        sum_sq
    };

    let mut residuals = vec![0.0f64; 2 * n];
    let mut residuals_p = vec![0.0f64; 2 * n];
    let mut residuals_m = vec![0.0f64; 2 * n];

    let mut lambda = params.lambda_init;
    let mut err_sq_base = residuals_of(&x, &mut residuals);
    if !err_sq_base.is_finite() {
        return Err(PnPError::DegenerateConfiguration(
            "initial pose has non-finite reprojection error".to_string(),
        ));
    }

    let mut iters = 0usize;
    let mut converged = false;

    let mut j = vec![0.0f64; 2 * n * 6];

    while iters < params.max_iters {
        iters += 1;
        const H_ROT: f64 = 1e-6; // radians
        let t_scale = x[3].abs().max(x[4].abs()).max(x[5].abs()).max(1.0);
        let h_trans = 1e-6 * t_scale; // world units

        for k_idx in 0..6 {
            // Central differences
            let h = if k_idx < 3 { H_ROT } else { h_trans };
            let mut x_plus = x;
            let mut x_minus = x;
            x_plus[k_idx] += h;
            x_minus[k_idx] -= h;
            residuals_of(&x_plus, &mut residuals_p);
            residuals_of(&x_minus, &mut residuals_m);
            for i in 0..(2 * n) {
                j[i * 6 + k_idx] = (residuals_p[i] - residuals_m[i]) / (2.0 * h);
            }
        }

        // Normal equations: (J^T J + lambda I) delta = -J^T r
        let mut a = [0.0f64; 36];
        let mut b = [0.0f64; 6];
        for (r_i, &r_val) in residuals.iter().enumerate() {
            let row = &j[r_i * 6..r_i * 6 + 6];
            for c in 0..6 {
                b[c] += row[c] * r_val;
                for d in 0..6 {
                    a[c * 6 + d] += row[c] * row[d];
                }
            }
        }
        for d in 0..6 {
            a[d * 6 + d] += lambda;
        }

        let mut rhs = b.map(|v| -v);
        let Some(delta) = solve_6x6(&mut a, &mut rhs) else {
            // Singular system, increase damping
            lambda *= params.lambda_mul;
            continue;
        };

        let mut x_new = x;
        for (xi, di) in x_new.iter_mut().zip(delta.iter()) {
            *xi += di;
        }
        let err_sq_new = residuals_of(&x_new, &mut residuals_p);
        if err_sq_new.is_finite() && err_sq_new < err_sq_base {
            x = x_new;
            residuals.copy_from_slice(&residuals_p);
            let gain = err_sq_base - err_sq_new;
            err_sq_base = err_sq_new;
            if gain < params.eps {
                converged = true;
                break;
            }
            lambda = (lambda / params.lambda_mul).max(1e-12);
        } else {
            lambda *= params.lambda_mul;
        }
    }

    rvec.copy_from_slice(&x[0..3]);
    t.copy_from_slice(&x[3..6]);

    let rmse = (err_sq_base / n as f64).sqrt();
    log::debug!("LM refinement: rmse {rmse:.4} px after {iters} iterations (converged: {converged})");
    Ok((rmse, iters, converged))
}

// Dense 6x6 solver using Gaussian elimination with partial pivoting.
fn solve_6x6(a: &mut [f64; 36], b: &mut [f64; 6]) -> Option<[f64; 6]> {
    for i in 0..6 {
        let mut piv = i;
        let mut max_val = a[i * 6 + i].abs();
        for r in (i + 1)..6 {
            let v = a[r * 6 + i].abs();
            if v > max_val {
                max_val = v;
                piv = r;
            }
        }
        if max_val < 1e-15 {
            return None;
        }
        if piv != i {
            for c in i..6 {
                a.swap(i * 6 + c, piv * 6 + c);
            }
            b.swap(i, piv);
        }
        let diag = a[i * 6 + i];
        for c in i..6 {
            a[i * 6 + c] /= diag;
        }
        b[i] /= diag;
        for r in (i + 1)..6 {
            let factor = a[r * 6 + i];
            if factor == 0.0 {
                continue;
            }
            for c in i..6 {
                a[r * 6 + c] -= factor * a[i * 6 + c];
            }
            b[r] -= factor * b[i];
        }
    }
    // Back substitution
    for i in (0..6).rev() {
        for r in 0..i {
            let factor = a[r * 6 + i];
            if factor != 0.0 {
                a[r * 6 + i] = 0.0;
                b[r] -= factor * b[i];
            }
        }
    }
    Some(*b)
}
