//! Pinhole camera construction from image size and field of view.

use crate::error::PipelineError;
use anchorwire_pnp::{CameraIntrinsics, CameraModel};
use serde::{Deserialize, Serialize};

/// Image dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    /// Width of the image in pixels
    pub width: usize,
    /// Height of the image in pixels
    pub height: usize,
}

impl ImageSize {
    /// Checked constructor rejecting zero dimensions.
    pub fn new(width: usize, height: usize) -> Result<Self, PipelineError> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidImageSize { width, height });
        }
        Ok(Self { width, height })
    }

    /// Width as a float, for pixel arithmetic.
    pub fn width_f64(&self) -> f64 {
        self.width as f64
    }

    /// Height as a float, for pixel arithmetic.
    pub fn height_f64(&self) -> f64 {
        self.height as f64
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl TryFrom<[usize; 2]> for ImageSize {
    type Error = PipelineError;

    fn try_from(size: [usize; 2]) -> Result<Self, Self::Error> {
        Self::new(size[0], size[1])
    }
}

/// Horizontal and optional vertical field of view, in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldOfView {
    /// Horizontal field of view
    pub horizontal_deg: f64,
    /// Vertical field of view; square pixels are assumed when absent
    pub vertical_deg: Option<f64>,
}

impl Default for FieldOfView {
    fn default() -> Self {
        Self {
            horizontal_deg: 91.0,
            vertical_deg: None,
        }
    }
}

fn focal_from_fov(extent: f64, fov_deg: f64) -> Result<f64, PipelineError> {
    if !(fov_deg > 0.0 && fov_deg < 180.0) {
        return Err(PipelineError::InvalidFov(fov_deg));
    }
    Ok(extent / (2.0 * (fov_deg.to_radians() / 2.0).tan()))
}

/// Build an undistorted pinhole camera centered on the image.
///
/// `fx = W / (2 tan(fov_h / 2))`; `fy` uses the vertical field of view when given and equals
/// `fx` otherwise.
pub fn camera_from_fov(size: ImageSize, fov: &FieldOfView) -> Result<CameraModel, PipelineError> {
    let size = ImageSize::new(size.width, size.height)?;
    let fx = focal_from_fov(size.width_f64(), fov.horizontal_deg)?;
    let fy = match fov.vertical_deg {
        Some(v) => focal_from_fov(size.height_f64(), v)?,
        None => fx,
    };
    let (cx, cy) = (size.width_f64() / 2.0, size.height_f64() / 2.0);
    log::info!(
        "intrinsics: fx={fx:.2} fy={fy:.2} cx={cx:.2} cy={cy:.2} (fov_h={} fov_v={})",
        fov.horizontal_deg,
        fov.vertical_deg
            .map_or_else(|| "auto".to_string(), |v| v.to_string())
    );
    Ok(CameraModel::pinhole(CameraIntrinsics::new(fx, fy, cx, cy)))
}
