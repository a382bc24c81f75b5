#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Pose resolution
//!
//! Recovers the camera pose from a few image points matched to anchor coordinates, then projects
//! the surrounding BIM points and connects them into a wireframe.
//!
//! - [`solve_pose`] runs a cascade of robust, direct and iterative solves, an optional search
//!   over anchor orderings and a local refinement.
//! - [`correct_vertical_bias`] adjusts `fy` when the pose leaves a systematic vertical offset.
//! - [`build_scene`] selects, downsamples, projects and connects the BIM points.
//! - [`run`] chains all of the above.
//!
//! The numeric primitives sit behind the [`PoseSolving`] trait; [`NumericPoseSolver`] implements
//! it with `anchorwire-pnp`.

/// Vertical focal length search.
pub mod bias;

/// Pinhole camera from image size and field of view.
pub mod camera;

/// The pose solver cascade.
pub mod cascade;

/// Correspondence preprocessing.
pub mod correspondence;

/// Error types for the pipeline.
pub mod error;

/// Anchor re-assignment search.
pub mod permutation;

/// End-to-end pipeline.
pub mod pipeline;

/// Reprojection error statistics.
pub mod reprojection;

/// BIM projection and wireframe.
pub mod scene;

/// Pose solving capability.
pub mod solver;

pub use bias::{correct_vertical_bias, BiasCorrection, BiasCorrectionParams, BiasOutcome};
pub use camera::{camera_from_fov, FieldOfView, ImageSize};
pub use cascade::{
    evaluate_pose, solve_pose, InitialStrategy, PoseEstimate, PoseSolverParams, RefinementOutcome,
    SolveOutcome, SolveReport,
};
pub use correspondence::{AnchorFrame, Correspondences, MIN_CORRESPONDENCES};
pub use error::PipelineError;
pub use permutation::{search_permutations, PermutationOutcome, PermutationParams};
pub use pipeline::{run, PipelineConfig, PipelineInput, PipelineOutput, PipelineReport};
pub use reprojection::ReprojectionStats;
pub use scene::{build_scene, SceneParams, SceneProjection};
pub use solver::{
    NumericPoseSolver, PoseSolving, RobustParams, RobustSolution, SolveFlags, SolverError,
};
