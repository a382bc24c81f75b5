//! Pairing of image points with anchor coordinates.

use crate::camera::ImageSize;
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

/// Minimum number of points on either side of a correspondence set.
pub const MIN_CORRESPONDENCES: usize = 4;

/// Radius used when the anchors are nearly coincident.
const DEGENERATE_RADIUS: f64 = 100.0;

/// Centering offset and characteristic scale of the anchor points.
///
/// Computed once per correspondence set and shared read-only by every later stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorFrame {
    /// Centroid of the anchor points in the input coordinates
    pub center: [f64; 3],
    /// Largest distance of an anchor from the center, floored to 100 when below 1
    pub radius: f64,
}

impl AnchorFrame {
    /// Compute the frame of a non-empty anchor set.
    pub fn from_anchors(anchors: &[[f64; 3]]) -> Self {
        let n = anchors.len().max(1) as f64;
        let mut center = [0.0; 3];
        for p in anchors {
            for k in 0..3 {
                center[k] += p[k];
            }
        }
        center.iter_mut().for_each(|c| *c /= n);

        let raw = anchors
            .iter()
            .map(|p| anchorwire_3d::euclidean_distance(p, &center))
            .fold(0.0, f64::max);
        let radius = if raw < 1.0 { DEGENERATE_RADIUS } else { raw };
        Self { center, radius }
    }
}

/// Ordered 2D-3D correspondences, paired by position.
#[derive(Debug, Clone)]
pub struct Correspondences {
    image: Vec<[f64; 2]>,
    anchors: Vec<[f64; 3]>,
    centered: Vec<[f64; 3]>,
    frame: AnchorFrame,
}

impl Correspondences {
    /// Build from image points given as percentages of the image size.
    ///
    /// `x_px = x_pct / 100 * width`, `y_px = y_pct / 100 * height`. A zero dimension is
    /// rejected with [`PipelineError::InvalidImageSize`].
    pub fn from_percent(
        image_pct: &[[f64; 2]],
        anchors: &[[f64; 3]],
        size: ImageSize,
    ) -> Result<Self, PipelineError> {
        let size = ImageSize::new(size.width, size.height)?;
        let (w, h) = (size.width_f64(), size.height_f64());
        let image: Vec<[f64; 2]> = image_pct
            .iter()
            .map(|&[x, y]| [x / 100.0 * w, y / 100.0 * h])
            .collect();
        Self::from_pixels(image, anchors.to_vec())
    }

    /// Build from image points already in pixels.
    pub fn from_pixels(image: Vec<[f64; 2]>, anchors: Vec<[f64; 3]>) -> Result<Self, PipelineError> {
        if image.len() < MIN_CORRESPONDENCES {
            return Err(PipelineError::InsufficientCorrespondences {
                kind: "image points",
                required: MIN_CORRESPONDENCES,
                actual: image.len(),
            });
        }
        if anchors.len() < MIN_CORRESPONDENCES {
            return Err(PipelineError::InsufficientCorrespondences {
                kind: "anchor points",
                required: MIN_CORRESPONDENCES,
                actual: anchors.len(),
            });
        }
        if image.len() != anchors.len() {
            return Err(PipelineError::MismatchedCorrespondences {
                image_points: image.len(),
                anchor_points: anchors.len(),
            });
        }

        let frame = AnchorFrame::from_anchors(&anchors);
        let centered = anchorwire_3d::center_points(&anchors, &frame.center);
        log::debug!(
            "{} correspondences, anchor center {:?}, radius {:.3}",
            image.len(),
            frame.center,
            frame.radius
        );

        Ok(Self {
            image,
            anchors,
            centered,
            frame,
        })
    }

    /// Number of correspondences.
    pub fn len(&self) -> usize {
        self.image.len()
    }

    /// Always false; a set holds at least [`MIN_CORRESPONDENCES`] pairs.
    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }

    /// Image points in pixels.
    pub fn image_points(&self) -> &[[f64; 2]] {
        &self.image
    }

    /// Anchor points in their input coordinates.
    pub fn anchor_points(&self) -> &[[f64; 3]] {
        &self.anchors
    }

    /// Anchor points relative to the anchor center.
    pub fn centered_anchors(&self) -> &[[f64; 3]] {
        &self.centered
    }

    /// Center and radius of the anchors.
    pub fn frame(&self) -> &AnchorFrame {
        &self.frame
    }

    /// Centered anchors rearranged so that entry `i` is anchor `order[i]`.
    pub fn reordered_anchors(&self, order: &[usize]) -> Vec<[f64; 3]> {
        order.iter().map(|&i| self.centered[i]).collect()
    }
}
