//! Pose solving capability used by the cascade, and its numeric implementation.

use anchorwire_pnp::{
    project_points, refine_pose_lm, solve_pnp, solve_pnp_iterative, solve_pnp_ransac,
    CameraModel, IterativeParams, LMParams, PnPError, PnPMethod, Pose, RansacParams,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single solver call. Never fatal on its own; the cascade decides.
#[derive(Debug, Error)]
pub enum SolverError {
    /// The capability is not provided by this solver.
    #[error("{0} is not available")]
    Unavailable(&'static str),

    /// The numeric solver rejected the input or diverged.
    #[error(transparent)]
    PnP(#[from] PnPError),

    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

/// Flavor of a single-shot pose solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveFlags {
    /// Direct minimal-point solve; warm starts are ignored.
    Direct,
    /// Non-linear least squares, started from the warm start when one is given.
    Iterative,
}

/// Settings of the robust (RANSAC) solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobustParams {
    /// Reprojection error below which a correspondence is an inlier, in pixels
    pub inlier_threshold_px: f64,
    /// Probability that one drawn sample is outlier free
    pub confidence: f64,
    /// Upper bound on sampling iterations
    pub max_iterations: usize,
    /// Sampler seed; `None` seeds from the operating system
    pub seed: Option<u64>,
}

impl Default for RobustParams {
    fn default() -> Self {
        Self {
            inlier_threshold_px: 8.0,
            confidence: 0.995,
            max_iterations: 300,
            seed: Some(0),
        }
    }
}

/// Pose and consensus set returned by a robust solve.
#[derive(Debug, Clone, PartialEq)]
pub struct RobustSolution {
    /// Pose of the best consensus set
    pub pose: Pose,
    /// Inlier indices, ascending
    pub inliers: Vec<usize>,
}

/// The geometric primitives the pose cascade depends on.
///
/// Implementations must be shareable across threads since permutation trials run in parallel.
pub trait PoseSolving: Sync {
    /// Single-shot pose from paired world and image points.
    fn solve_pose(
        &self,
        world: &[[f64; 3]],
        image: &[[f64; 2]],
        camera: &CameraModel,
        flags: SolveFlags,
        warm_start: Option<&Pose>,
    ) -> Result<Pose, SolverError>;

    /// Pose robust to outlying correspondences, with its inlier set.
    fn solve_pose_robust(
        &self,
        world: &[[f64; 3]],
        image: &[[f64; 2]],
        camera: &CameraModel,
        params: &RobustParams,
    ) -> Result<RobustSolution, SolverError>;

    /// Local non-linear refinement of `pose`.
    fn refine_local(
        &self,
        _world: &[[f64; 3]],
        _image: &[[f64; 2]],
        _camera: &CameraModel,
        _pose: &Pose,
    ) -> Result<Pose, SolverError> {
        Err(SolverError::Unavailable("local refinement"))
    }

    /// Project world points through the posed camera.
    fn project(&self, world: &[[f64; 3]], pose: &Pose, camera: &CameraModel) -> Vec<[f64; 2]>;
}

/// [`PoseSolving`] backed by the solvers of `anchorwire-pnp`.
///
/// Direct solves use [`PnPMethod::Auto`] (homography for coplanar anchors, EPnP otherwise).
#[derive(Debug, Clone, Default)]
pub struct NumericPoseSolver {
    /// Levenberg–Marquardt settings for iterative solves and local refinement
    pub lm: LMParams,
}

impl PoseSolving for NumericPoseSolver {
    fn solve_pose(
        &self,
        world: &[[f64; 3]],
        image: &[[f64; 2]],
        camera: &CameraModel,
        flags: SolveFlags,
        warm_start: Option<&Pose>,
    ) -> Result<Pose, SolverError> {
        let result = match flags {
            SolveFlags::Direct => solve_pnp(world, image, camera, PnPMethod::Auto)?,
            SolveFlags::Iterative => solve_pnp_iterative(
                world,
                image,
                camera,
                warm_start,
                &IterativeParams {
                    lm: self.lm.clone(),
                },
            )?,
        };
        Ok(Pose::from(&result))
    }

    fn solve_pose_robust(
        &self,
        world: &[[f64; 3]],
        image: &[[f64; 2]],
        camera: &CameraModel,
        params: &RobustParams,
    ) -> Result<RobustSolution, SolverError> {
        let ransac = RansacParams {
            max_iterations: params.max_iterations,
            reproj_threshold_px: params.inlier_threshold_px,
            confidence: params.confidence,
            random_seed: params.seed,
            // the cascade refits the inliers itself, warm-started
            refine: false,
        };
        let result = solve_pnp_ransac(world, image, camera, PnPMethod::Auto, &ransac)?;
        Ok(RobustSolution {
            pose: Pose::from(&result.pose),
            inliers: result.inliers,
        })
    }

    fn refine_local(
        &self,
        world: &[[f64; 3]],
        image: &[[f64; 2]],
        camera: &CameraModel,
        pose: &Pose,
    ) -> Result<Pose, SolverError> {
        let mut rvec = pose.rvec;
        let mut t = pose.translation;
        let (rmse, iters, converged) =
            refine_pose_lm(world, image, camera, &mut rvec, &mut t, &self.lm)?;
        log::debug!("LM refinement: rmse {rmse:.4} px after {iters} iterations (converged: {converged})");
        let refined = Pose::new(rvec, t);
        if !refined.is_finite() {
            return Err(SolverError::Failed(
                "refinement produced a non-finite pose".to_string(),
            ));
        }
        Ok(refined)
    }

    fn project(&self, world: &[[f64; 3]], pose: &Pose, camera: &CameraModel) -> Vec<[f64; 2]> {
        project_points(world, pose, camera)
    }
}
