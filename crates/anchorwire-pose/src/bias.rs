//! Vertical focal length search against systematic vertical reprojection offset.
//!
//! A wrong vertical field of view shows up as a one-sided `dy` rather than as a larger random
//! error, which pose refinement alone does not remove. Candidates scale `fy`, re-solve the pose
//! warm-started from the current one, and are scored by `|mean_dy| + weight * mean_error`.

use crate::cascade::{evaluate_pose, PoseEstimate};
use crate::correspondence::Correspondences;
use crate::solver::{PoseSolving, SolveFlags};
use anchorwire_pnp::CameraModel;
use serde::{Deserialize, Serialize};

/// Settings of the vertical bias search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasCorrectionParams {
    /// Whether the search may run at all
    pub enabled: bool,
    /// `|mean_dy|` above which the search runs, in pixels
    pub threshold_px: f64,
    /// Minimum number of correspondences
    pub min_correspondences: usize,
    /// Smallest `fy` scale
    pub scale_min: f64,
    /// Largest `fy` scale
    pub scale_max: f64,
    /// Number of evenly spaced scales, end points included
    pub samples: usize,
    /// Weight of the mean error in the score
    pub error_weight: f64,
}

impl Default for BiasCorrectionParams {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_px: 12.0,
            min_correspondences: 4,
            scale_min: 0.9,
            scale_max: 1.1,
            samples: 21,
            error_weight: 0.25,
        }
    }
}

impl BiasCorrectionParams {
    /// The candidate scales, ascending.
    pub fn scales(&self) -> Vec<f64> {
        match self.samples {
            0 => Vec::new(),
            1 => vec![self.scale_min],
            n => {
                let step = (self.scale_max - self.scale_min) / (n - 1) as f64;
                (0..n).map(|i| self.scale_min + step * i as f64).collect()
            }
        }
    }

    fn score(&self, mean_dy: f64, mean: f64) -> f64 {
        mean_dy.abs() + self.error_weight * mean
    }
}

/// What the bias stage did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BiasOutcome {
    /// The search was switched off.
    Disabled,
    /// `|mean_dy|` was within the threshold.
    NotNeeded {
        /// Mean vertical offset of the pose
        mean_dy: f64,
    },
    /// Too few correspondences to search.
    TooFewCorrespondences {
        /// Number of correspondences
        points: usize,
    },
    /// No scaled camera scored better than the unscaled one.
    NoImprovement {
        /// Mean vertical offset of the pose
        mean_dy: f64,
    },
    /// The camera and pose were replaced.
    Corrected {
        /// Chosen `fy` scale
        scale: f64,
        /// Vertical focal length before
        fy_before: f64,
        /// Vertical focal length after
        fy_after: f64,
        /// Mean vertical offset before
        dy_before: f64,
        /// Mean vertical offset after
        dy_after: f64,
    },
}

/// Camera, pose and outcome after the bias stage.
#[derive(Debug, Clone)]
pub struct BiasCorrection {
    /// Camera, with `fy` scaled when corrected
    pub camera: CameraModel,
    /// Pose estimate under `camera`
    pub estimate: PoseEstimate,
    /// What happened
    pub outcome: BiasOutcome,
}

/// Search `fy` scales for a camera that removes the vertical reprojection bias of `estimate`.
///
/// The unscaled state is the baseline; candidates with a larger `|mean_dy|` than the baseline
/// are never chosen, so `|mean_dy|` cannot grow. A winning scale of exactly 1 is no change.
pub fn correct_vertical_bias<S: PoseSolving>(
    solver: &S,
    correspondences: &Correspondences,
    camera: &CameraModel,
    estimate: &PoseEstimate,
    params: &BiasCorrectionParams,
) -> BiasCorrection {
    let unchanged = |outcome| BiasCorrection {
        camera: *camera,
        estimate: estimate.clone(),
        outcome,
    };
    let baseline = estimate.stats;
    if !params.enabled {
        return unchanged(BiasOutcome::Disabled);
    }
    if !(baseline.mean_dy.abs() > params.threshold_px) {
        return unchanged(BiasOutcome::NotNeeded {
            mean_dy: baseline.mean_dy,
        });
    }
    if correspondences.len() < params.min_correspondences {
        return unchanged(BiasOutcome::TooFewCorrespondences {
            points: correspondences.len(),
        });
    }

    let world = correspondences.reordered_anchors(&estimate.order);
    let image = correspondences.image_points();
    let base_fy = camera.intrinsics.fy;
    log::info!(
        "vertical bias {:.2} px exceeds {:.2} px, searching fy scales",
        baseline.mean_dy,
        params.threshold_px
    );

    let mut best_score = params.score(baseline.mean_dy, baseline.mean);
    let mut best = None;
    for scale in params.scales() {
        let candidate_camera = camera.with_fy(base_fy * scale);
        let pose = match solver.solve_pose(
            &world,
            image,
            &candidate_camera,
            SolveFlags::Iterative,
            Some(&estimate.pose),
        ) {
            Ok(pose) if pose.is_finite() => pose,
            Ok(_) => continue,
            Err(e) => {
                log::debug!("fy scale {scale:.3}: solve failed ({e})");
                continue;
            }
        };
        let stats = evaluate_pose(solver, correspondences, &candidate_camera, &pose, &estimate.order);
        if !stats.is_finite() || stats.mean_dy.abs() > baseline.mean_dy.abs() {
            continue;
        }
        let score = params.score(stats.mean_dy, stats.mean);
        log::debug!(
            "fy scale {scale:.3}: dy {:.3} px, mean {:.3} px, score {score:.3}",
            stats.mean_dy,
            stats.mean
        );
        if score < best_score {
            best_score = score;
            best = Some((scale, candidate_camera, pose, stats));
        }
    }

    match best {
        Some((scale, candidate_camera, pose, stats)) if (scale - 1.0).abs() > 1e-12 => {
            log::info!(
                "fy {base_fy:.2} -> {:.2} (scale {scale:.3}), dy {:.2} -> {:.2} px",
                candidate_camera.intrinsics.fy,
                baseline.mean_dy,
                stats.mean_dy
            );
            BiasCorrection {
                camera: candidate_camera,
                estimate: PoseEstimate {
                    pose,
                    order: estimate.order.clone(),
                    stats,
                },
                outcome: BiasOutcome::Corrected {
                    scale,
                    fy_before: base_fy,
                    fy_after: candidate_camera.intrinsics.fy,
                    dy_before: baseline.mean_dy,
                    dy_after: stats.mean_dy,
                },
            }
        }
        _ => {
            log::info!("no fy scale reduces the vertical bias");
            unchanged(BiasOutcome::NoImprovement {
                mean_dy: baseline.mean_dy,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reprojection::ReprojectionStats;
    use crate::solver::{RobustParams, RobustSolution, SolverError};
    use anchorwire_pnp::{project_points, CameraIntrinsics, Pose};
    use approx::assert_relative_eq;

    /// Keeps the warm-start pose; only the camera changes between candidates.
    struct FixedPose;

    impl PoseSolving for FixedPose {
        fn solve_pose(
            &self,
            _world: &[[f64; 3]],
            _image: &[[f64; 2]],
            _camera: &CameraModel,
            _flags: SolveFlags,
            warm_start: Option<&Pose>,
        ) -> Result<Pose, SolverError> {
            warm_start.copied().ok_or(SolverError::Unavailable("cold start"))
        }

        fn solve_pose_robust(
            &self,
            _world: &[[f64; 3]],
            _image: &[[f64; 2]],
            _camera: &CameraModel,
            _params: &RobustParams,
        ) -> Result<RobustSolution, SolverError> {
            Err(SolverError::Unavailable("robust"))
        }

        fn project(&self, world: &[[f64; 3]], pose: &Pose, camera: &CameraModel) -> Vec<[f64; 2]> {
            project_points(world, pose, camera)
        }
    }

    fn setup(true_fy: f64, used_fy: f64) -> (Correspondences, CameraModel, PoseEstimate) {
        let truth = CameraModel::pinhole(CameraIntrinsics::new(500.0, true_fy, 320.0, 240.0));
        let used = CameraModel::pinhole(CameraIntrinsics::new(500.0, used_fy, 320.0, 240.0));
        // all anchors below the optical axis, so a wrong fy biases dy one way
        let anchors = vec![
            [-1.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
            [1.0, 2.0, 0.0],
            [-1.0, 2.0, 0.0],
            [0.0, 1.5, 0.5],
        ];
        let pose = Pose::new([0.0; 3], [0.0, 0.0, 5.0]);
        let frame = crate::correspondence::AnchorFrame::from_anchors(&anchors);
        let centered = anchorwire_3d::center_points(&anchors, &frame.center);
        let shifted: Vec<[f64; 3]> = centered.iter().map(|p| [p[0], p[1] + 1.5, p[2]]).collect();
        let image = project_points(&shifted, &pose, &truth);
        let c = Correspondences::from_pixels(image, anchors).expect("valid correspondences");
        // the solver keeps this pose, which already accounts for the offset of the centered anchors
        let pose = Pose::new([0.0; 3], [0.0, 1.5, 5.0]);
        let order: Vec<usize> = (0..5).collect();
        let stats = evaluate_pose(&FixedPose, &c, &used, &pose, &order);
        (c, used, PoseEstimate { pose, order, stats })
    }

    #[test]
    fn test_scales_include_unity() {
        let scales = BiasCorrectionParams::default().scales();
        assert_eq!(scales.len(), 21);
        assert_relative_eq!(scales[0], 0.9);
        assert_relative_eq!(scales[10], 1.0, epsilon = 1e-12);
        assert_relative_eq!(scales[20], 1.1, epsilon = 1e-12);
    }

    #[test]
    fn test_recovers_scaled_fy() {
        let (c, camera, estimate) = setup(550.0, 500.0);
        assert!(estimate.stats.mean_dy.abs() > 12.0);
        let result = correct_vertical_bias(
            &FixedPose,
            &c,
            &camera,
            &estimate,
            &BiasCorrectionParams::default(),
        );
        match result.outcome {
            BiasOutcome::Corrected { scale, dy_after, .. } => {
                assert_relative_eq!(scale, 1.1, epsilon = 1e-9);
                assert!(dy_after.abs() < 1e-6);
            }
            other => panic!("expected a correction, got {other:?}"),
        }
        assert_relative_eq!(result.camera.intrinsics.fy, 550.0, epsilon = 1e-9);
        assert!(result.estimate.stats.mean_dy.abs() <= estimate.stats.mean_dy.abs());
    }

    #[test]
    fn test_small_bias_is_left_alone() {
        let (c, camera, estimate) = setup(505.0, 500.0);
        let result = correct_vertical_bias(
            &FixedPose,
            &c,
            &camera,
            &estimate,
            &BiasCorrectionParams::default(),
        );
        assert!(matches!(result.outcome, BiasOutcome::NotNeeded { .. }));
        assert_eq!(result.camera, camera);
    }

    #[test]
    fn test_baseline_wins_when_only_unity_helps() {
        let (c, camera, mut estimate) = setup(500.0, 500.0);
        // the only candidate is the unscaled camera
        estimate.stats = ReprojectionStats {
            mean_dy: 20.0,
            mean: 0.0,
            ..estimate.stats
        };
        let params = BiasCorrectionParams {
            scale_min: 1.0,
            scale_max: 1.0,
            samples: 1,
            ..Default::default()
        };
        let result = correct_vertical_bias(&FixedPose, &c, &camera, &estimate, &params);
        assert!(matches!(result.outcome, BiasOutcome::NoImprovement { .. }));
        assert_eq!(result.camera, camera);
    }

    #[test]
    fn test_disabled() {
        let (c, camera, estimate) = setup(550.0, 500.0);
        let params = BiasCorrectionParams {
            enabled: false,
            ..Default::default()
        };
        let result = correct_vertical_bias(&FixedPose, &c, &camera, &estimate, &params);
        assert_eq!(result.outcome, BiasOutcome::Disabled);
    }
}
