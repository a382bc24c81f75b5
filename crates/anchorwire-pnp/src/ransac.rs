//! RANSAC-based robust wrapper for PnP solvers.

use crate::camera::CameraModel;
use crate::pnp::{check_correspondences, PnPError, PnPResult, Pose};
use crate::projection::reprojection_errors;
use crate::{solve_pnp, PnPMethod};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

/// Parameters for RANSAC over PnP.
#[derive(Debug, Clone)]
pub struct RansacParams {
    /// Maximum number of RANSAC iterations.
    pub max_iterations: usize,
    /// Pixel error threshold to classify an observation as an inlier.
    pub reproj_threshold_px: f64,
    /// Desired probability that at least one sample set is outlier-free.
    pub confidence: f64,
    /// Optional fixed seed for reproducible sampling.
    pub random_seed: Option<u64>,
    /// Whether to refit on all inliers using the base solver.
    pub refine: bool,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            reproj_threshold_px: 8.0,
            confidence: 0.99,
            random_seed: None,
            refine: true,
        }
    }
}

/// RANSAC result for PnP.
#[derive(Debug, Clone)]
pub struct PnPRansacResult {
    /// Best pose found by RANSAC.
    pub pose: PnPResult,
    /// Indices of inlier correspondences, ascending.
    pub inliers: Vec<usize>,
}

/// Solve PnP robustly using a RANSAC loop around a base PnP method.
///
/// - Minimal sample size is 5 (4 when only 4 points are available).
/// - Scoring uses Euclidean pixel reprojection error.
/// - Iterations adapt from the current inlier ratio and desired confidence.
/// - When the refit on all inliers fails, the best minimal model is kept.
pub fn solve_pnp_ransac(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    camera: &CameraModel,
    base: PnPMethod,
    params: &RansacParams,
) -> Result<PnPRansacResult, PnPError> {
    check_correspondences(world, image, 4)?;
    let n = world.len();

    let sample_size: usize = if n == 4 { 4 } else { 5 };

    let mut rng: StdRng = match params.random_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut indices: Vec<usize> = (0..n).collect();
    let mut best: Option<(Vec<usize>, PnPResult)> = None;

    let mut iter: usize = 0;
    let mut required_iters = params.max_iterations;

    while iter < required_iters {
        iter += 1;

        indices.shuffle(&mut rng);
        let sample = &indices[..sample_size];
        let w_min: Vec<[f64; 3]> = sample.iter().map(|&i| world[i]).collect();
        let i_min: Vec<[f64; 2]> = sample.iter().map(|&i| image[i]).collect();

        let pose_min = match solve_pnp(&w_min, &i_min, camera, base.clone()) {
            Ok(p) => p,
            Err(e) => {
                log::debug!("RANSAC iteration {iter}: minimal solve failed: {e}");
                continue;
            }
        };

        // Cheirality: the sample must lie in front of the camera.
        let pose = Pose::from(&pose_min);
        if !w_min.iter().all(|pw| pose.transform_point(pw)[2] > 0.0) {
            log::debug!("RANSAC iteration {iter}: cheirality check failed");
            continue;
        }

        let inliers = classify_inliers(world, image, &pose, camera, params.reproj_threshold_px);
        let best_len = best.as_ref().map_or(0, |(b, _)| b.len());
        if inliers.len() <= best_len {
            continue;
        }

        if inliers.len() >= sample_size {
            if let Some(est) = required_iterations(
                inliers.len() as f64 / n as f64,
                sample_size,
                params.confidence,
            ) {
                required_iters = required_iters.min(est.max(iter));
            }
        }
        best = Some((inliers, pose_min));
    }

    let (best_inliers, best_pose) = match best {
        Some(found) if found.0.len() >= 4 => found,
        other => {
            return Err(PnPError::InsufficientInliers {
                required: 4,
                actual: other.map_or(0, |(inl, _)| inl.len()),
            })
        }
    };

    let w_in: Vec<[f64; 3]> = best_inliers.iter().map(|&i| world[i]).collect();
    let i_in: Vec<[f64; 2]> = best_inliers.iter().map(|&i| image[i]).collect();

    let mut final_pose = if params.refine {
        match solve_pnp(&w_in, &i_in, camera, base) {
            Ok(p) => p,
            Err(e) => {
                log::debug!("RANSAC refit on {} inliers failed: {e}", best_inliers.len());
                best_pose
            }
        }
    } else {
        best_pose
    };

    let errors = reprojection_errors(&w_in, &i_in, &Pose::from(&final_pose), camera);
    let sum_sq: f64 = errors.iter().map(|e| e * e).sum();
    final_pose.reproj_rmse = Some((sum_sq / errors.len() as f64).sqrt());

    log::debug!(
        "RANSAC: {} / {n} inliers after {iter} iterations",
        best_inliers.len()
    );

    Ok(PnPRansacResult {
        pose: final_pose,
        inliers: best_inliers,
    })
}

/// Number of iterations needed to draw one outlier-free sample with probability `confidence`.
fn required_iterations(inlier_ratio: f64, sample_size: usize, confidence: f64) -> Option<usize> {
    if inlier_ratio >= 1.0 {
        return Some(1);
    }
    let ws = inlier_ratio.powi(sample_size as i32);
    if ws <= 1e-12 {
        return None;
    }
    let log_conf = (1.0 - confidence).max(1e-12).ln();
    let log_denom = (1.0 - ws).ln();
    let est = (log_conf / log_denom).ceil();
    (est.is_finite() && est > 0.0).then_some(est as usize)
}

fn classify_inliers(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    pose: &Pose,
    camera: &CameraModel,
    thresh_px: f64,
) -> Vec<usize> {
    reprojection_errors(world, image, pose, camera)
        .iter()
        .enumerate()
        .filter(|(idx, &err)| err < thresh_px && pose.transform_point(&world[*idx])[2] > 0.0)
        .map(|(idx, _)| idx)
        .collect()
}
