#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Error types for point cloud operations.
pub mod error;

/// Screen-space grid decimation of projected points.
pub mod grid2d;

/// Operations on 3D point sets.
pub mod ops;

/// First-seen voxel grid downsampling.
pub mod voxel_grid;

/// Nearest-neighbor proximity graph over 3D points.
pub mod wireframe;

pub use error::CloudError;
pub use grid2d::grid_decimate_2d;
pub use ops::{center_points, euclidean_distance, points_within_radius};
pub use voxel_grid::VoxelGrid;
pub use wireframe::{build_wireframe, edges_in_image, knn_indices, WireframeGraph};
