//! Camera models and distortion handling for PnP solvers.

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Represents the intrinsic parameters of a pinhole camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length in x direction
    pub fx: f64,
    /// Focal length in y direction
    pub fy: f64,
    /// Principal point x coordinate
    pub cx: f64,
    /// Principal point y coordinate
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Create camera intrinsics from focal lengths and principal point.
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Convert to 3x3 intrinsics matrix.
    pub fn to_matrix(&self) -> [[f64; 3]; 3] {
        [
            [self.fx, 0.0, self.cx],
            [0.0, self.fy, self.cy],
            [0.0, 0.0, 1.0],
        ]
    }

    /// Copy of these intrinsics with the vertical focal length replaced.
    pub fn with_fy(&self, fy: f64) -> Self {
        Self { fy, ..*self }
    }
}

/// Brown-Conrady distortion with the five coefficients `(k1, k2, p1, p2, k3)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PolynomialDistortion {
    /// First radial coefficient
    pub k1: f64,
    /// Second radial coefficient
    pub k2: f64,
    /// First tangential coefficient
    pub p1: f64,
    /// Second tangential coefficient
    pub p2: f64,
    /// Third radial coefficient
    pub k3: f64,
}

impl PolynomialDistortion {
    /// Create distortion parameters with all coefficients set to zero (no distortion).
    pub fn none() -> Self {
        Self::default()
    }

    /// Create distortion parameters from a coefficient vector in `(k1, k2, p1, p2, k3)` order.
    pub fn from_coeffs(coeffs: [f64; 5]) -> Self {
        let [k1, k2, p1, p2, k3] = coeffs;
        Self { k1, k2, p1, p2, k3 }
    }

    /// Coefficient vector in `(k1, k2, p1, p2, k3)` order.
    pub fn coeffs(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    /// Check if there is any distortion.
    pub fn has_distortion(&self) -> bool {
        self.coeffs().iter().any(|&c| c != 0.0)
    }

    /// Distort a point given in normalized image coordinates.
    pub fn distort_normalized(&self, x: f64, y: f64) -> (f64, f64) {
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let xy_2 = 2.0 * x * y;
        let xd = x * radial + self.p1 * xy_2 + self.p2 * (r2 + 2.0 * x * x);
        let yd = y * radial + self.p1 * (r2 + 2.0 * y * y) + self.p2 * xy_2;
        (xd, yd)
    }
}

/// A complete camera model with intrinsics and distortion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    /// Camera intrinsics
    pub intrinsics: CameraIntrinsics,
    /// Distortion parameters, all zero for an ideal pinhole
    pub distortion: PolynomialDistortion,
}

impl CameraModel {
    /// Create a camera model without distortion.
    pub fn pinhole(intrinsics: CameraIntrinsics) -> Self {
        Self {
            intrinsics,
            distortion: PolynomialDistortion::none(),
        }
    }

    /// Create a camera model with distortion.
    pub fn with_distortion(intrinsics: CameraIntrinsics, distortion: PolynomialDistortion) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    /// Check if the camera has distortion.
    pub fn has_distortion(&self) -> bool {
        self.distortion.has_distortion()
    }

    /// Get the intrinsics matrix for use with the linear solvers.
    pub fn intrinsics_matrix(&self) -> [[f64; 3]; 3] {
        self.intrinsics.to_matrix()
    }

    /// Copy of this camera with the vertical focal length replaced.
    pub fn with_fy(&self, fy: f64) -> Self {
        Self {
            intrinsics: self.intrinsics.with_fy(fy),
            distortion: self.distortion,
        }
    }

    /// Project a point expressed in the camera frame to pixel coordinates.
    ///
    /// Mirrors OpenCV's `projectPoints`: a point on the `z = 0` plane is divided by one instead of zero.
    pub fn project_camera_point(&self, pc: DVec3) -> [f64; 2] {
        let inv_z = if pc.z != 0.0 { 1.0 / pc.z } else { 1.0 };
        let (x, y) = self.distortion.distort_normalized(pc.x * inv_z, pc.y * inv_z);
        [
            self.intrinsics.fx * x + self.intrinsics.cx,
            self.intrinsics.fy * y + self.intrinsics.cy,
        ]
    }

    /// Apply distortion to an ideal pixel.
    pub fn distort_point(&self, x: f64, y: f64) -> (f64, f64) {
        let CameraIntrinsics { fx, fy, cx, cy } = self.intrinsics;
        let (xd, yd) = self.distortion.distort_normalized((x - cx) / fx, (y - cy) / fy);
        (fx * xd + cx, fy * yd + cy)
    }

    /// Undistort a pixel using the iterative fixed-point method.
    pub fn undistort_point(&self, x: f64, y: f64) -> (f64, f64) {
        if !self.has_distortion() {
            return (x, y);
        }

        let CameraIntrinsics { fx, fy, cx, cy } = self.intrinsics;
        let d = &self.distortion;

        // Normalize coordinates
        let x_dist = (x - cx) / fx;
        let y_dist = (y - cy) / fy;

        // Initial guess: assume no distortion
        let mut xu = x_dist;
        let mut yu = y_dist;

        const MAX_ITERATIONS: usize = 20;
        const EPSILON: f64 = 1e-12;

        for _ in 0..MAX_ITERATIONS {
            let r2 = xu * xu + yu * yu;
            let radial = 1.0 + d.k1 * r2 + d.k2 * r2 * r2 + d.k3 * r2 * r2 * r2;
            let xy_2 = 2.0 * xu * yu;
            let dx_tan = d.p1 * xy_2 + d.p2 * (r2 + 2.0 * xu * xu);
            let dy_tan = d.p1 * (r2 + 2.0 * yu * yu) + d.p2 * xy_2;

            let xu_next = (x_dist - dx_tan) / radial;
            let yu_next = (y_dist - dy_tan) / radial;
            let step = (xu_next - xu).abs().max((yu_next - yu).abs());
            xu = xu_next;
            yu = yu_next;
            if step < EPSILON {
                break;
            }
        }

        (fx * xu + cx, fy * yu + cy)
    }

    /// Undistort multiple pixels.
    pub fn undistort_points(&self, points: &[[f64; 2]]) -> Vec<[f64; 2]> {
        points
            .iter()
            .map(|&[x, y]| {
                let (ux, uy) = self.undistort_point(x, y);
                [ux, uy]
            })
            .collect()
    }
}
