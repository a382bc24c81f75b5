//! Projection of world points through a posed camera and reprojection residuals.

use crate::camera::CameraModel;
use crate::pnp::Pose;
use crate::ops::pose_to_rt;
use glam::DVec3;

/// Project world points to pixel coordinates.
///
/// Applies the rigid transform of `pose`, the perspective division and the lens distortion of
/// `camera`, in that order.
pub fn project_points(world: &[[f64; 3]], pose: &Pose, camera: &CameraModel) -> Vec<[f64; 2]> {
    let (r_mat, t_vec) = pose_to_rt(&pose.rotation_matrix(), &pose.translation);
    world
        .iter()
        .map(|pw| camera.project_camera_point(r_mat * DVec3::from_array(*pw) + t_vec))
        .collect()
}

/// Signed residuals `projected - observed` for each correspondence.
pub fn reprojection_residuals(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    pose: &Pose,
    camera: &CameraModel,
) -> Vec<[f64; 2]> {
    project_points(world, pose, camera)
        .iter()
        .zip(image.iter())
        .map(|(p, uv)| [p[0] - uv[0], p[1] - uv[1]])
        .collect()
}

/// Euclidean pixel reprojection error for each correspondence.
pub fn reprojection_errors(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    pose: &Pose,
    camera: &CameraModel,
) -> Vec<f64> {
    reprojection_residuals(world, image, pose, camera)
        .iter()
        .map(|d| d[0].hypot(d[1]))
        .collect()
}

/// Root-mean-square of the per-point pixel errors.
pub(crate) fn rmse(world: &[[f64; 3]], image: &[[f64; 2]], pose: &Pose, camera: &CameraModel) -> f64 {
    let errors = reprojection_errors(world, image, pose, camera);
    if errors.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = errors.iter().map(|e| e * e).sum();
    (sum_sq / errors.len() as f64).sqrt()
}
