//! Exhaustive re-assignment of anchors to image points.
//!
//! When 2D and 3D points were captured in different orders, every permutation of the anchors is
//! solved against the fixed image order and the one with the lowest mean reprojection error wins.
//! The cost is `n!` direct solves, so the search is capped by point count and by trial count.

use crate::cascade::PoseEstimate;
use crate::correspondence::Correspondences;
use crate::reprojection::ReprojectionStats;
use crate::solver::{PoseSolving, SolveFlags};
use anchorwire_pnp::{CameraModel, Pose};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Limits of the permutation search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermutationParams {
    /// Whether the search may run at all
    pub enabled: bool,
    /// Largest correspondence count that is searched
    pub max_points: usize,
    /// Largest number of trial solves
    pub max_trials: usize,
}

impl Default for PermutationParams {
    fn default() -> Self {
        Self {
            enabled: true,
            max_points: 8,
            max_trials: 40_320,
        }
    }
}

/// What the permutation stage did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PermutationOutcome {
    /// The error was low enough that no search was needed.
    NotNeeded,
    /// The search was switched off.
    Disabled,
    /// Too many points; nothing was attempted.
    Skipped {
        /// Number of correspondences
        points: usize,
        /// Configured point limit
        max_points: usize,
    },
    /// `n!` exceeds the trial cap; nothing was attempted.
    TrialLimit {
        /// Trials an exhaustive search would need
        trials: usize,
        /// Configured trial limit
        max_trials: usize,
    },
    /// Every permutation was tried and none beat the current ordering.
    NoImprovement {
        /// Lowest mean error among successful trials, if any succeeded
        best_mean: Option<f64>,
    },
    /// A different ordering reduced the mean error.
    Improved {
        /// Anchor index paired with each image point
        order: Vec<usize>,
        /// Mean error before the search
        before: f64,
        /// Mean error of the chosen ordering
        after: f64,
    },
}

/// Rearrange `perm` into the next permutation in lexicographic order.
///
/// Returns `false`, leaving `perm` sorted ascending, after the last permutation.
pub fn next_permutation(perm: &mut [usize]) -> bool {
    let n = perm.len();
    if n < 2 {
        return false;
    }
    let mut i = n - 1;
    while i > 0 && perm[i - 1] >= perm[i] {
        i -= 1;
    }
    if i == 0 {
        perm.reverse();
        return false;
    }
    let mut j = n - 1;
    while perm[j] <= perm[i - 1] {
        j -= 1;
    }
    perm.swap(i - 1, j);
    perm[i..].reverse();
    true
}

/// `n!`, or `None` when it does not fit in `usize`.
fn factorial(n: usize) -> Option<usize> {
    (2..=n).try_fold(1usize, |acc, k| acc.checked_mul(k))
}

/// All permutations of `0..n` in lexicographic order, starting with the identity.
fn lexicographic_permutations(n: usize) -> Vec<Vec<usize>> {
    let mut perm: Vec<usize> = (0..n).collect();
    let mut all = vec![perm.clone()];
    while next_permutation(&mut perm) {
        all.push(perm.clone());
    }
    all
}

struct Trial {
    index: usize,
    pose: Pose,
    stats: ReprojectionStats,
}

/// Search every anchor ordering for a pose with lower mean reprojection error than `current`.
///
/// Trials run in parallel and are reduced by mean error, ties going to the earlier
/// permutation. The returned estimate is `current` unless a strictly better ordering exists.
pub fn search_permutations<S: PoseSolving>(
    solver: &S,
    correspondences: &Correspondences,
    camera: &CameraModel,
    current: &PoseEstimate,
    params: &PermutationParams,
) -> (PoseEstimate, PermutationOutcome) {
    let n = correspondences.len();
    if !params.enabled {
        return (current.clone(), PermutationOutcome::Disabled);
    }
    if n > params.max_points {
        log::info!(
            "permutation search skipped: {n} correspondences exceed the limit of {}",
            params.max_points
        );
        let outcome = PermutationOutcome::Skipped {
            points: n,
            max_points: params.max_points,
        };
        return (current.clone(), outcome);
    }
    let trials = factorial(n).unwrap_or(usize::MAX);
    if trials > params.max_trials {
        log::info!(
            "permutation search skipped: {trials} trials exceed the limit of {}",
            params.max_trials
        );
        let outcome = PermutationOutcome::TrialLimit {
            trials,
            max_trials: params.max_trials,
        };
        return (current.clone(), outcome);
    }

    log::info!(
        "mean error {:.2} px, trying {trials} anchor orderings",
        current.stats.mean
    );
    let image = correspondences.image_points();
    let permutations = lexicographic_permutations(n);
    let best = permutations
        .par_iter()
        .enumerate()
        .filter_map(|(index, order)| {
            let world = correspondences.reordered_anchors(order);
            let pose = solver
                .solve_pose(&world, image, camera, SolveFlags::Direct, None)
                .ok()
                .filter(Pose::is_finite)?;
            let projected = solver.project(&world, &pose, camera);
            let stats = ReprojectionStats::from_points(&projected, image);
            stats.is_finite().then_some(Trial { index, pose, stats })
        })
        .min_by(|a, b| {
            a.stats
                .mean
                .total_cmp(&b.stats.mean)
                .then(a.index.cmp(&b.index))
        });

    match best {
        Some(trial) if trial.stats.mean < current.stats.mean => {
            let order = permutations[trial.index].clone();
            log::info!(
                "anchor ordering {order:?} reduces mean error {:.2} -> {:.2} px",
                current.stats.mean,
                trial.stats.mean
            );
            let outcome = PermutationOutcome::Improved {
                order: order.clone(),
                before: current.stats.mean,
                after: trial.stats.mean,
            };
            let estimate = PoseEstimate {
                pose: trial.pose,
                order,
                stats: trial.stats,
            };
            (estimate, outcome)
        }
        best => {
            let best_mean = best.map(|t| t.stats.mean);
            log::info!("no anchor ordering improves on the current one (best: {best_mean:?})");
            (current.clone(), PermutationOutcome::NoImprovement { best_mean })
        }
    }
}
