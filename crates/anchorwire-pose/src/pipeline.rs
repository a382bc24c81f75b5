//! End-to-end run: correspondences in, pose and wireframe out.

use crate::bias::{correct_vertical_bias, BiasCorrectionParams, BiasOutcome};
use crate::camera::{camera_from_fov, FieldOfView, ImageSize};
use crate::cascade::{solve_pose, PoseEstimate, PoseSolverParams, SolveReport};
use crate::correspondence::{AnchorFrame, Correspondences};
use crate::error::PipelineError;
use crate::scene::{build_scene, SceneParams, SceneProjection};
use crate::solver::PoseSolving;
use anchorwire_pnp::CameraModel;
use serde::{Deserialize, Serialize};

/// Configuration of every stage. Missing fields take their defaults when deserialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Field of view used to build the camera
    pub fov: FieldOfView,
    /// Pose solver cascade
    pub solver: PoseSolverParams,
    /// Vertical bias search
    pub bias: BiasCorrectionParams,
    /// BIM selection and wireframe
    pub scene: SceneParams,
}

/// Raw inputs of a run.
#[derive(Debug, Clone)]
pub struct PipelineInput {
    /// Image points as percentages of the image width and height
    pub image_pct: Vec<[f64; 2]>,
    /// Anchor coordinates, paired with `image_pct` by position
    pub anchors: Vec<[f64; 3]>,
    /// BIM point cloud in the anchor coordinate system
    pub bim: Vec<[f64; 3]>,
    /// Image dimensions
    pub size: ImageSize,
}

/// Non-fatal decisions taken during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    /// Pose cascade branches
    pub solve: SolveReport,
    /// Vertical bias stage
    pub bias: BiasOutcome,
}

/// Everything a run produces.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    /// Final camera, `fy` possibly adjusted
    pub camera: CameraModel,
    /// Anchor center and radius; poses map centered coordinates into the camera
    pub frame: AnchorFrame,
    /// Final pose
    pub estimate: PoseEstimate,
    /// Image points in pixels
    pub image_points: Vec<[f64; 2]>,
    /// Projection of the anchor paired with each image point
    pub projected_anchors: Vec<[f64; 2]>,
    /// BIM projection and wireframe
    pub scene: SceneProjection,
    /// Stage decisions
    pub report: PipelineReport,
}

/// Run every stage in order and return the combined result.
///
/// Nothing is returned on a fatal error, so callers never see a partial result.
pub fn run<S: PoseSolving>(
    solver: &S,
    input: &PipelineInput,
    config: &PipelineConfig,
) -> Result<PipelineOutput, PipelineError> {
    let camera = camera_from_fov(input.size, &config.fov)?;
    let correspondences =
        Correspondences::from_percent(&input.image_pct, &input.anchors, input.size)?;

    let solved = solve_pose(solver, &correspondences, &camera, &config.solver)?;
    let corrected = correct_vertical_bias(
        solver,
        &correspondences,
        &camera,
        &solved.estimate,
        &config.bias,
    );
    let (camera, estimate) = (corrected.camera, corrected.estimate);
    log::info!(
        "final pose: rvec {:?}, t {:?}, mean error {:.3} px, max {:.3} px",
        estimate.pose.rvec,
        estimate.pose.translation,
        estimate.mean_error(),
        estimate.max_error()
    );

    let world = correspondences.reordered_anchors(&estimate.order);
    let projected_anchors = solver.project(&world, &estimate.pose, &camera);

    let frame = *correspondences.frame();
    let scene = build_scene(
        solver,
        &input.bim,
        &frame,
        &estimate.pose,
        &camera,
        input.size,
        &config.scene,
    )?;

    Ok(PipelineOutput {
        camera,
        frame,
        estimate,
        image_points: correspondences.image_points().to_vec(),
        projected_anchors,
        scene,
        report: PipelineReport {
            solve: solved.report,
            bias: corrected.outcome,
        },
    })
}
