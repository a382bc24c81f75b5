use anchorwire_3d::CloudError;
use thiserror::Error;

/// Fatal errors of the pose and wireframe pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Fewer than the minimum number of 2D or 3D points were supplied.
    #[error("at least {required} {kind} are required, got {actual}")]
    InsufficientCorrespondences {
        /// Which input is short ("image points" or "anchor points")
        kind: &'static str,
        /// Minimum number of points
        required: usize,
        /// Number of points supplied
        actual: usize,
    },

    /// The 2D and 3D inputs do not pair up.
    #[error("{image_points} image points cannot be paired with {anchor_points} anchor points")]
    MismatchedCorrespondences {
        /// Number of 2D points
        image_points: usize,
        /// Number of 3D points
        anchor_points: usize,
    },

    /// A field of view outside the open interval (0, 180) degrees.
    #[error("field of view must lie strictly between 0 and 180 degrees, got {0}")]
    InvalidFov(f64),

    /// The image has a zero dimension.
    #[error("image size must be positive, got {width}x{height}")]
    InvalidImageSize {
        /// Image width in pixels
        width: usize,
        /// Image height in pixels
        height: usize,
    },

    /// Every strategy of the solver cascade failed.
    #[error("no pose solution: {0}")]
    NoPoseSolution(String),

    /// No BIM point lies within the local inclusion radius of the anchors.
    #[error("no BIM points within {radius} of the anchor center")]
    NoNearbyBimPoints {
        /// Inclusion radius that was used
        radius: f64,
    },

    /// Invalid decimation or wireframe parameters.
    #[error(transparent)]
    Cloud(#[from] CloudError),
}
