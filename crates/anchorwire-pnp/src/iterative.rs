//! Iterative PnP: non-linear least squares on the reprojection error.

use crate::camera::CameraModel;
use crate::pnp::{check_correspondences, PnPError, PnPResult, PnPSolver, Pose};
use crate::refine::{refine_pose_lm, LMParams};
use crate::{solve_pnp, PnPMethod};

/// Marker type for the iterative solver started without a guess.
pub struct Iterative;

impl PnPSolver for Iterative {
    type Param = IterativeParams;

    fn solve(
        world: &[[f64; 3]],
        image: &[[f64; 2]],
        camera: &CameraModel,
        params: &Self::Param,
    ) -> Result<PnPResult, PnPError> {
        solve_pnp_iterative(world, image, camera, None, params)
    }
}

/// Parameters of the iterative solver.
#[derive(Debug, Clone, Default)]
pub struct IterativeParams {
    /// Levenberg–Marquardt settings.
    pub lm: LMParams,
}

/// Solve PnP by minimizing the reprojection error.
///
/// When `guess` is given the optimization starts from it ("extrinsic guess"); otherwise the
/// starting pose comes from [`PnPMethod::Auto`]. A starting pose that places the points behind
/// the camera is still refined; the caller judges the result by its error.
pub fn solve_pnp_iterative(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    camera: &CameraModel,
    guess: Option<&Pose>,
    params: &IterativeParams,
) -> Result<PnPResult, PnPError> {
    check_correspondences(world, image, 4)?;

    let start = match guess {
        Some(pose) if pose.is_finite() => *pose,
        Some(_) => {
            return Err(PnPError::DegenerateConfiguration(
                "initial guess is not finite".to_string(),
            ))
        }
        None => Pose::from(&solve_pnp(world, image, camera, PnPMethod::Auto)?),
    };

    let mut rvec = start.rvec;
    let mut t = start.translation;
    let (rmse, iters, converged) =
        refine_pose_lm(world, image, camera, &mut rvec, &mut t, &params.lm)?;

    PnPResult {
        reproj_rmse: Some(rmse),
        num_iterations: Some(iters),
        converged: Some(converged),
        ..PnPResult::from_pose(&Pose::new(rvec, t))
    }
    .ensure_finite("iterative PnP")
}
