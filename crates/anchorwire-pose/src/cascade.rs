//! The pose solver cascade.
//!
//! ```text
//! robust ──(>= 4 inliers)──> iterative refit on inliers ──┐
//!    │ (fail)                                              │
//!    └──> direct ──(fail)──> iterative ──(fail)──> error   │
//!             │                  │                         │
//!             └──────────────────┴────> diagnostics <──────┘
//!                                           │
//!                 permutation search (mean error above threshold)
//!                                           │
//!                                   local refinement
//! ```

use crate::correspondence::Correspondences;
use crate::error::PipelineError;
use crate::permutation::{search_permutations, PermutationOutcome, PermutationParams};
use crate::reprojection::ReprojectionStats;
use crate::solver::{PoseSolving, RobustParams, SolveFlags, SolverError};
use anchorwire_pnp::{CameraModel, Pose};
use serde::{Deserialize, Serialize};

/// Minimum inlier count for the robust branch to be accepted.
const MIN_INLIERS: usize = 4;

/// Settings of the cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseSolverParams {
    /// Robust first attempt
    pub robust: RobustParams,
    /// Mean reprojection error above which the permutation search runs, in pixels
    pub high_error_px: f64,
    /// Permutation search limits
    pub permutation: PermutationParams,
}

impl Default for PoseSolverParams {
    fn default() -> Self {
        Self {
            robust: RobustParams::default(),
            high_error_px: 25.0,
            permutation: PermutationParams::default(),
        }
    }
}

/// A solved pose with the anchor ordering that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoseEstimate {
    /// World (anchor-centered) to camera transform
    pub pose: Pose,
    /// Anchor index paired with each image point; the identity unless re-assigned
    pub order: Vec<usize>,
    /// Reprojection error of `pose` under `order`
    pub stats: ReprojectionStats,
}

impl PoseEstimate {
    /// Mean reprojection error in pixels.
    pub fn mean_error(&self) -> f64 {
        self.stats.mean
    }

    /// Largest reprojection error in pixels.
    pub fn max_error(&self) -> f64 {
        self.stats.max
    }
}

/// Which branch produced the initial pose.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum InitialStrategy {
    /// Robust solve with enough inliers.
    Robust {
        /// Size of the consensus set
        inliers: usize,
        /// Whether the warm-started refit on the inliers succeeded
        refit: bool,
    },
    /// Direct solve on all correspondences.
    Direct,
    /// Iterative solve on all correspondences.
    Iterative,
}

/// Result of the local refinement step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefinementOutcome {
    /// The refined pose was kept.
    Improved {
        /// Mean error before refinement
        before: f64,
        /// Mean error after refinement
        after: f64,
    },
    /// Refinement ran but did not lower the mean error; the previous pose was kept.
    NoImprovement {
        /// Mean error before refinement
        before: f64,
        /// Mean error of the rejected pose
        after: f64,
    },
    /// The solver offers no local refinement.
    Unavailable,
    /// Refinement failed; the previous pose was kept.
    Failed {
        /// Solver error message
        message: String,
    },
}

/// Which branches the cascade took.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolveReport {
    /// Source of the initial pose
    pub initial: InitialStrategy,
    /// Error of the initial pose
    pub initial_error: ReprojectionStats,
    /// Permutation stage result
    pub permutation: PermutationOutcome,
    /// Local refinement result
    pub refinement: RefinementOutcome,
}

/// Final estimate and the report of how it was reached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolveOutcome {
    /// Final pose estimate
    pub estimate: PoseEstimate,
    /// Branches taken
    pub report: SolveReport,
}

/// Reprojection statistics of `pose` with the anchors arranged by `order`.
pub fn evaluate_pose<S: PoseSolving>(
    solver: &S,
    correspondences: &Correspondences,
    camera: &CameraModel,
    pose: &Pose,
    order: &[usize],
) -> ReprojectionStats {
    let world = correspondences.reordered_anchors(order);
    let projected = solver.project(&world, pose, camera);
    ReprojectionStats::from_points(&projected, correspondences.image_points())
}

fn finite_pose(result: Result<Pose, SolverError>) -> Result<Pose, SolverError> {
    result.and_then(|pose| {
        if pose.is_finite() {
            Ok(pose)
        } else {
            Err(SolverError::Failed("non-finite pose".to_string()))
        }
    })
}

fn initial_pose<S: PoseSolving>(
    solver: &S,
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    camera: &CameraModel,
    params: &PoseSolverParams,
) -> Result<(Pose, InitialStrategy), PipelineError> {
    let robust = solver
        .solve_pose_robust(world, image, camera, &params.robust)
        .and_then(|s| {
            if s.pose.is_finite() {
                Ok(s)
            } else {
                Err(SolverError::Failed("non-finite pose".to_string()))
            }
        });
    match robust {
        Ok(solution) if solution.inliers.len() >= MIN_INLIERS => {
            let inliers = solution.inliers.len();
            let w_in: Vec<[f64; 3]> = solution.inliers.iter().map(|&i| world[i]).collect();
            let i_in: Vec<[f64; 2]> = solution.inliers.iter().map(|&i| image[i]).collect();
            let refit = finite_pose(solver.solve_pose(
                &w_in,
                &i_in,
                camera,
                SolveFlags::Iterative,
                Some(&solution.pose),
            ));
            log::info!("robust solve: {inliers}/{} inliers", world.len());
            return Ok(match refit {
                Ok(pose) => (pose, InitialStrategy::Robust { inliers, refit: true }),
                Err(e) => {
                    log::warn!("inlier refit failed ({e}), keeping the robust pose");
                    (solution.pose, InitialStrategy::Robust { inliers, refit: false })
                }
            });
        }
        Ok(solution) => log::warn!(
            "robust solve found only {} inliers, falling back",
            solution.inliers.len()
        ),
        Err(e) => log::warn!("robust solve failed ({e}), falling back"),
    }

    let direct_err = match finite_pose(solver.solve_pose(world, image, camera, SolveFlags::Direct, None)) {
        Ok(pose) => return Ok((pose, InitialStrategy::Direct)),
        Err(e) => e,
    };
    log::warn!("direct solve failed ({direct_err}), trying iterative");

    match finite_pose(solver.solve_pose(world, image, camera, SolveFlags::Iterative, None)) {
        Ok(pose) => Ok((pose, InitialStrategy::Iterative)),
        Err(e) => Err(PipelineError::NoPoseSolution(format!(
            "direct: {direct_err}; iterative: {e}"
        ))),
    }
}

fn refine<S: PoseSolving>(
    solver: &S,
    correspondences: &Correspondences,
    camera: &CameraModel,
    current: PoseEstimate,
) -> (PoseEstimate, RefinementOutcome) {
    let world = correspondences.reordered_anchors(&current.order);
    let image = correspondences.image_points();
    match finite_pose(solver.refine_local(&world, image, camera, &current.pose)) {
        Ok(pose) => {
            let stats = evaluate_pose(solver, correspondences, camera, &pose, &current.order);
            let (before, after) = (current.stats.mean, stats.mean);
            if stats.is_finite() && after <= before {
                log::info!("local refinement: mean error {before:.3} -> {after:.3} px");
                let refined = PoseEstimate {
                    pose,
                    stats,
                    ..current
                };
                (refined, RefinementOutcome::Improved { before, after })
            } else {
                log::debug!("local refinement rejected: mean error {before:.3} -> {after:.3} px");
                (current, RefinementOutcome::NoImprovement { before, after })
            }
        }
        Err(SolverError::Unavailable(what)) => {
            log::debug!("{what} is not available");
            (current, RefinementOutcome::Unavailable)
        }
        Err(e) => {
            log::warn!("local refinement failed: {e}");
            (
                current,
                RefinementOutcome::Failed {
                    message: e.to_string(),
                },
            )
        }
    }
}

/// Resolve the camera pose of a correspondence set.
///
/// World points are the centered anchors. The result is always finite; when no strategy
/// yields a pose the call fails with [`PipelineError::NoPoseSolution`].
pub fn solve_pose<S: PoseSolving>(
    solver: &S,
    correspondences: &Correspondences,
    camera: &CameraModel,
    params: &PoseSolverParams,
) -> Result<SolveOutcome, PipelineError> {
    let world = correspondences.centered_anchors();
    let image = correspondences.image_points();

    let (pose, initial) = initial_pose(solver, world, image, camera, params)?;
    let order: Vec<usize> = (0..correspondences.len()).collect();
    let stats = evaluate_pose(solver, correspondences, camera, &pose, &order);
    log::info!(
        "initial pose: mean error {:.3} px, max {:.3} px",
        stats.mean,
        stats.max
    );
    let estimate = PoseEstimate { pose, order, stats };

    let (estimate, permutation) = if !(stats.mean > params.high_error_px) {
        (estimate, PermutationOutcome::NotNeeded)
    } else {
        search_permutations(solver, correspondences, camera, &estimate, &params.permutation)
    };

    let (estimate, refinement) = refine(solver, correspondences, camera, estimate);

    Ok(SolveOutcome {
        estimate,
        report: SolveReport {
            initial,
            initial_error: stats,
            permutation,
            refinement,
        },
    })
}
