//! Projection of the BIM cloud around the anchors and its wireframe.

use crate::camera::ImageSize;
use crate::correspondence::AnchorFrame;
use crate::error::PipelineError;
use crate::solver::PoseSolving;
use anchorwire_3d::{
    build_wireframe, center_points, edges_in_image, grid_decimate_2d, points_within_radius,
    VoxelGrid, WireframeGraph,
};
use anchorwire_pnp::{CameraModel, Pose};
use serde::{Deserialize, Serialize};

/// Settings of the scene stage, relative to the anchor radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneParams {
    /// BIM points farther than this many anchor radii from the center are dropped
    pub local_radius_factor: f64,
    /// The voxel size is the anchor radius divided by this
    pub voxel_divisor: f64,
    /// Lower bound of the voxel size
    pub min_voxel_size: f64,
    /// Neighbors considered per point when connecting the wireframe
    pub neighbors: usize,
    /// Edges must be shorter than this many voxel sizes
    pub edge_cutoff_factor: f64,
    /// Screen cell size used to thin the projected points for overlays, in pixels
    pub overlay_cell_px: f64,
    /// Projected points kept per overlay cell
    pub overlay_per_cell: usize,
}

impl Default for SceneParams {
    fn default() -> Self {
        Self {
            local_radius_factor: 3.0,
            voxel_divisor: 3.0,
            min_voxel_size: 1.0,
            neighbors: 4,
            edge_cutoff_factor: 4.0,
            overlay_cell_px: 6.0,
            overlay_per_cell: 1,
        }
    }
}

/// Downsampled BIM points, their projections and the wireframe over them.
#[derive(Debug, Clone, Serialize)]
pub struct SceneProjection {
    /// Voxel edge length used for downsampling
    pub voxel_size: f64,
    /// Downsampled points, centered on the anchor center
    pub points: Vec<[f64; 3]>,
    /// Pixel position of each point
    pub projected: Vec<[f64; 2]>,
    /// Proximity graph over `points`
    pub edges: WireframeGraph,
    /// Edges with both endpoints inside the image
    pub visible_edges: Vec<(usize, usize)>,
    /// Indices of in-image points thinned to a screen grid
    pub overlay_points: Vec<usize>,
}

/// Select, downsample, project and connect the BIM points around the anchors.
///
/// Fails with [`PipelineError::NoNearbyBimPoints`] when nothing lies within
/// `local_radius_factor * radius` of the anchor center.
pub fn build_scene<S: PoseSolving>(
    solver: &S,
    bim: &[[f64; 3]],
    frame: &AnchorFrame,
    pose: &Pose,
    camera: &CameraModel,
    size: ImageSize,
    params: &SceneParams,
) -> Result<SceneProjection, PipelineError> {
    let radius = params.local_radius_factor * frame.radius;
    let local = points_within_radius(bim, &frame.center, radius);
    if local.is_empty() {
        return Err(PipelineError::NoNearbyBimPoints { radius });
    }

    let voxel_size = (frame.radius / params.voxel_divisor).max(params.min_voxel_size);
    // the radius filter drops NaN and infinite points, so this never comes back empty
    let kept = VoxelGrid::new(voxel_size)?.downsample(&local)?;
    let points = center_points(&kept, &frame.center);
    log::info!(
        "BIM: {} points, {} within {radius:.2}, {} after voxel {voxel_size:.3}",
        bim.len(),
        local.len(),
        points.len()
    );

    let projected = solver.project(&points, pose, camera);
    let edges = build_wireframe(
        &points,
        params.neighbors,
        params.edge_cutoff_factor * voxel_size,
    )?;
    let (w, h) = (size.width_f64(), size.height_f64());
    let visible_edges = edges_in_image(&edges, &projected, w, h);
    let overlay_points =
        grid_decimate_2d(&projected, params.overlay_cell_px, w, h, params.overlay_per_cell)?;
    log::info!(
        "wireframe: {} edges, {} visible",
        edges.len(),
        visible_edges.len()
    );

    Ok(SceneProjection {
        voxel_size,
        points,
        projected,
        edges,
        visible_edges,
        overlay_points,
    })
}
