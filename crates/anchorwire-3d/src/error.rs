use thiserror::Error;

/// Errors raised while decimating or connecting point sets.
#[derive(Debug, Error, PartialEq)]
pub enum CloudError {
    /// The voxel edge length is zero, negative or not finite.
    #[error("voxel size must be positive and finite, got {0}")]
    InvalidVoxelSize(f64),

    /// The 2D grid cell size is zero, negative or not finite.
    #[error("grid cell size must be positive and finite, got {0}")]
    InvalidCellSize(f64),

    /// The edge cutoff distance is negative or not finite.
    #[error("edge cutoff must be non-negative and finite, got {0}")]
    InvalidCutoff(f64),

    /// A point has a NaN or infinite coordinate and falls into no cell.
    #[error("point {index} has a non-finite coordinate")]
    NonFinitePoint {
        /// Position of the offending point in the input
        index: usize,
    },
}
