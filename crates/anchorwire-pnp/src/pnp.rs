//! Common data types shared across Perspective-n-Point (PnP) solvers.

use crate::camera::CameraModel;
use crate::ops::{rodrigues, rotation_to_rvec};
use glam::DVec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for PnP solvers.
#[derive(Debug, Error)]
pub enum PnPError {
    /// Invalid input data - insufficient correspondences for the specific solver
    #[error("PnP solver requires at least {required} 2D-3D correspondences, got {actual}")]
    InsufficientCorrespondences {
        /// Minimum number of correspondences required by the solver
        required: usize,
        /// Actual number of correspondences provided
        actual: usize,
    },

    /// Invalid input data - mismatched array lengths with descriptive labels.
    #[error("Mismatched array lengths: {left_name} ({left_len}) != {right_name} ({right_len})")]
    MismatchedArrayLengths {
        /// Label for the left-hand slice
        left_name: &'static str,
        /// Length of the left-hand slice
        left_len: usize,
        /// Label for the right-hand slice
        right_name: &'static str,
        /// Length of the right-hand slice
        right_len: usize,
    },

    /// Singular value decomposition failed
    #[error("SVD computation failed: {0}")]
    SvdFailed(String),

    /// RANSAC could not find a consensus set large enough
    #[error("RANSAC found {actual} inliers, at least {required} are required")]
    InsufficientInliers {
        /// Minimum number of inliers required
        required: usize,
        /// Number of inliers in the best consensus set
        actual: usize,
    },

    /// The configuration of points does not determine a pose, or the solve produced non-finite values
    #[error("Degenerate configuration: {0}")]
    DegenerateConfiguration(String),
}

/// Checks the length invariants every solver shares.
pub(crate) fn check_correspondences(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    required: usize,
) -> Result<(), PnPError> {
    if world.len() != image.len() {
        return Err(PnPError::MismatchedArrayLengths {
            left_name: "world points",
            left_len: world.len(),
            right_name: "image points",
            right_len: image.len(),
        });
    }
    if world.len() < required {
        return Err(PnPError::InsufficientCorrespondences {
            required,
            actual: world.len(),
        });
    }
    Ok(())
}

/// Numeric tolerances used by linear algebra routines throughout the PnP pipeline.
#[derive(Debug, Clone)]
pub struct NumericTol {
    /// Tolerance for singular-value decomposition.
    pub svd: f64,
    /// Epsilon threshold for determinant / singular-value checks when deciding whether to fall back to a pseudo-inverse.
    pub eps: f64,
}

impl Default for NumericTol {
    fn default() -> Self {
        Self {
            svd: 1e-12,
            eps: 1e-12,
        }
    }
}

/// A rigid camera pose mapping **world** coordinates into the **camera** frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Rodrigues axis-angle rotation vector.
    pub rvec: [f64; 3],
    /// Translation vector.
    pub translation: [f64; 3],
}

impl Pose {
    /// Create a pose from a rotation vector and a translation.
    pub fn new(rvec: [f64; 3], translation: [f64; 3]) -> Self {
        Self { rvec, translation }
    }

    /// The identity pose.
    pub fn identity() -> Self {
        Self::new([0.0; 3], [0.0; 3])
    }

    /// Create a pose from a row-major rotation matrix and a translation.
    pub fn from_rotation(rotation: &[[f64; 3]; 3], translation: [f64; 3]) -> Self {
        Self::new(rotation_to_rvec(rotation), translation)
    }

    /// Row-major rotation matrix of this pose.
    pub fn rotation_matrix(&self) -> [[f64; 3]; 3] {
        rodrigues(&self.rvec)
    }

    /// Whether every component is finite.
    pub fn is_finite(&self) -> bool {
        self.rvec.iter().chain(self.translation.iter()).all(|v| v.is_finite())
    }

    /// Transform a world point into the camera frame.
    pub fn transform_point(&self, point: &[f64; 3]) -> [f64; 3] {
        let pc = self.transform_dvec(DVec3::from_array(*point));
        pc.to_array()
    }

    pub(crate) fn transform_dvec(&self, point: DVec3) -> DVec3 {
        let r = self.rotation_matrix();
        let (r_mat, t_vec) = crate::ops::pose_to_rt(&r, &self.translation);
        r_mat * point + t_vec
    }
}

impl From<&PnPResult> for Pose {
    fn from(result: &PnPResult) -> Self {
        Self::new(result.rvec, result.translation)
    }
}

/// Result returned by any PnP solver.
///
/// The rotation matrix maps coordinates from the **world** frame to the
/// **camera** frame.
#[derive(Debug, Clone)]
pub struct PnPResult {
    /// Estimated rotation matrix.
    pub rotation: [[f64; 3]; 3],
    /// Estimated translation vector.
    pub translation: [f64; 3],
    /// Rodrigues axis-angle representation (log-map) of `rotation`.
    pub rvec: [f64; 3],
    /// Optional root-mean-square reprojection error in pixels.
    pub reproj_rmse: Option<f64>,
    /// Optional number of iterations taken by an iterative solver.
    pub num_iterations: Option<usize>,
    /// Indicates whether an iterative solver reported convergence.
    pub converged: Option<bool>,
}

impl PnPResult {
    /// Build a result from a pose, filling the rotation matrix from its rotation vector.
    pub fn from_pose(pose: &Pose) -> Self {
        Self {
            rotation: pose.rotation_matrix(),
            translation: pose.translation,
            rvec: pose.rvec,
            reproj_rmse: None,
            num_iterations: None,
            converged: None,
        }
    }

    /// Fail with [`PnPError::DegenerateConfiguration`] when any pose component is not finite.
    pub(crate) fn ensure_finite(self, solver: &str) -> Result<Self, PnPError> {
        let finite = self
            .rotation
            .iter()
            .flatten()
            .chain(self.translation.iter())
            .chain(self.rvec.iter())
            .all(|v| v.is_finite());
        if finite {
            Ok(self)
        } else {
            Err(PnPError::DegenerateConfiguration(format!(
                "{solver} produced a non-finite pose"
            )))
        }
    }
}

/// Trait implemented by every PnP solver available in this crate.
pub trait PnPSolver {
    /// Parameter object specific to the solver.
    type Param;

    /// Runs the solver.
    ///
    /// # Arguments
    /// * `world` – 3-D coordinates in the world frame.
    /// * `image` – Corresponding pixel coordinates (may be distorted).
    /// * `camera` – Camera model with intrinsics and distortion.
    /// * `params` – Solver-specific parameters.
    fn solve(
        world: &[[f64; 3]],
        image: &[[f64; 2]],
        camera: &CameraModel,
        params: &Self::Param,
    ) -> Result<PnPResult, PnPError>;
}
