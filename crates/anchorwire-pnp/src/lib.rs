#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Perspective-n-Point
//!
//! Camera pose estimation from 2D-3D point correspondences.
//!
//! - **EPnP** for general point sets and a **planar homography** solver for coplanar ones,
//!   selected automatically by [`PnPMethod::Auto`].
//! - **Iterative** Levenberg–Marquardt solve with an optional warm start.
//! - **RANSAC** wrapper with a seeded sampler.
//! - Pinhole projection with five-coefficient lens distortion.
//!
//! ## Example
//!
//! ```rust
//! use anchorwire_pnp::{project_points, solve_pnp, CameraIntrinsics, CameraModel, PnPMethod, Pose};
//!
//! let world = vec![
//!     [0.0, 0.0, 0.0],
//!     [1.0, 0.0, 0.2],
//!     [0.0, 1.0, -0.3],
//!     [1.0, 1.0, 0.5],
//!     [0.5, 0.2, 1.0],
//! ];
//! let camera = CameraModel::pinhole(CameraIntrinsics::new(800.0, 800.0, 320.0, 240.0));
//! let image = project_points(&world, &Pose::new([0.1, 0.0, 0.0], [0.0, 0.0, 5.0]), &camera);
//!
//! let result = solve_pnp(&world, &image, &camera, PnPMethod::Auto)?;
//! println!("Translation: {:?}", result.translation);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Pinhole camera model with lens distortion.
pub mod camera;

/// Efficient Perspective-n-Point (EPnP) solver implementation.
pub mod epnp;

/// Iterative PnP solver.
pub mod iterative;

/// Homography-based solver for coplanar points.
pub mod planar;

/// Common data types and traits for PnP solvers.
pub mod pnp;

/// Projection of world points and reprojection errors.
pub mod projection;

/// RANSAC-based robust PnP pose estimation.
pub mod ransac;

/// Levenberg–Marquardt pose refinement.
pub mod refine;

mod ops;

pub use camera::{CameraIntrinsics, CameraModel, PolynomialDistortion};
pub use epnp::{EPnP, EPnPParams};
pub use iterative::{solve_pnp_iterative, Iterative, IterativeParams};
pub use ops::{is_planar, rodrigues, rotation_to_rvec};
pub use planar::{find_homography, PlanarHomography, PlanarParams};
pub use pnp::{NumericTol, PnPError, PnPResult, PnPSolver, Pose};
pub use projection::{project_points, reprojection_errors, reprojection_residuals};
pub use ransac::{solve_pnp_ransac, PnPRansacResult, RansacParams};
pub use refine::{refine_pose_lm, LMParams};

/// Ratio between the smallest and largest covariance eigenvalue below which
/// [`PnPMethod::Auto`] treats the world points as coplanar.
pub const PLANARITY_TOLERANCE: f64 = 1e-4;

/// Enumeration of the Perspective-n-Point algorithms available in this crate.
#[derive(Debug, Clone)]
pub enum PnPMethod {
    /// Efficient PnP solver with a user-supplied parameter object.
    EPnP(EPnPParams),
    /// Efficient PnP solver with the crate's default parameters.
    EPnPDefault,
    /// Homography decomposition for coplanar world points.
    Homography(PlanarParams),
    /// Homography for coplanar world points, EPnP otherwise.
    Auto,
    /// Levenberg–Marquardt on the reprojection error, started from [`PnPMethod::Auto`].
    Iterative(IterativeParams),
}

/// Dispatch function that routes to the chosen PnP solver.
pub fn solve_pnp(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    camera: &CameraModel,
    method: PnPMethod,
) -> Result<PnPResult, PnPError> {
    match method {
        PnPMethod::EPnP(params) => EPnP::solve(world, image, camera, &params),
        PnPMethod::EPnPDefault => EPnP::solve(world, image, camera, &EPnPParams::default()),
        PnPMethod::Homography(params) => PlanarHomography::solve(world, image, camera, &params),
        PnPMethod::Auto => {
            if world.len() >= 4 && is_planar(world, PLANARITY_TOLERANCE) {
                PlanarHomography::solve(world, image, camera, &PlanarParams::default())
            } else {
                EPnP::solve(world, image, camera, &EPnPParams::default())
            }
        }
        PnPMethod::Iterative(params) => Iterative::solve(world, image, camera, &params),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_dispatches_planar_points() -> Result<(), PnPError> {
        let camera = CameraModel::pinhole(CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0));
        let world = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ];
        let pose = Pose::new([0.0, 0.2, 0.0], [-0.5, -0.5, 4.0]);
        let image = project_points(&world, &pose, &camera);

        let result = solve_pnp(&world, &image, &camera, PnPMethod::Auto)?;
        assert!(result.reproj_rmse.is_some_and(|e| e < 1e-6));
        Ok(())
    }

    #[test]
    fn test_dispatch_propagates_length_errors() {
        let camera = CameraModel::pinhole(CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0));
        let world = [[0.0, 0.0, 1.0]; 5];
        let image = [[0.0, 0.0]; 4];
        for method in [
            PnPMethod::EPnPDefault,
            PnPMethod::Homography(PlanarParams::default()),
            PnPMethod::Iterative(IterativeParams::default()),
        ] {
            assert!(matches!(
                solve_pnp(&world, &image, &camera, method),
                Err(PnPError::MismatchedArrayLengths { .. })
            ));
        }
    }
}
