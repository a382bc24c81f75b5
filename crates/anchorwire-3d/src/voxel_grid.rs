use crate::error::CloudError;
use std::collections::HashSet;

/// A cubic voxel grid that keeps one representative point per occupied cell.
///
/// The first point falling into a cell is kept; later points in the same cell are dropped.
/// Output order follows the order in which cells were first seen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelGrid {
    /// Edge length of a voxel.
    voxel_size: f64,
}

impl VoxelGrid {
    /// Creates a new `VoxelGrid` with the specified edge length.
    ///
    /// # Errors
    /// [`CloudError::InvalidVoxelSize`] if `voxel_size` is not positive and finite.
    pub fn new(voxel_size: f64) -> Result<Self, CloudError> {
        if !(voxel_size.is_finite() && voxel_size > 0.0) {
            return Err(CloudError::InvalidVoxelSize(voxel_size));
        }
        Ok(Self { voxel_size })
    }

    /// The voxel edge length.
    pub fn voxel_size(&self) -> f64 {
        self.voxel_size
    }

    /// Integer cell coordinates of a point: the component-wise floor of `p / voxel_size`.
    pub fn voxel_key(&self, p: &[f64; 3]) -> [i64; 3] {
        p.map(|v| (v / self.voxel_size).floor() as i64)
    }

    /// Indices of the representative points, in first-seen cell order.
    ///
    /// The result is non-empty whenever `points` is.
    ///
    /// # Errors
    /// [`CloudError::NonFinitePoint`] for the first point with a NaN or infinite coordinate.
    pub fn downsample_indices(&self, points: &[[f64; 3]]) -> Result<Vec<usize>, CloudError> {
        let mut occupied: HashSet<[i64; 3]> = HashSet::with_capacity(points.len());
        let mut kept = Vec::new();
        for (index, p) in points.iter().enumerate() {
            if !p.iter().all(|v| v.is_finite()) {
                return Err(CloudError::NonFinitePoint { index });
            }
            if occupied.insert(self.voxel_key(p)) {
                kept.push(index);
            }
        }
        Ok(kept)
    }

    /// Downsample the points to one representative per occupied voxel.
    ///
    /// # Errors
    /// See [`VoxelGrid::downsample_indices`].
    pub fn downsample(&self, points: &[[f64; 3]]) -> Result<Vec<[f64; 3]>, CloudError> {
        Ok(self
            .downsample_indices(points)?
            .into_iter()
            .map(|i| points[i])
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_voxel_size() {
        for size in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(VoxelGrid::new(size).is_err());
        }
    }

    #[test]
    fn test_first_seen_point_wins() -> Result<(), CloudError> {
        let grid = VoxelGrid::new(1.0)?;
        let pts = [
            [0.9, 0.1, 0.5],
            [0.1, 0.2, 0.3],
            [1.5, 0.0, 0.0],
            [0.5, 0.5, 0.5],
            [1.1, 0.9, 0.2],
        ];
        assert_eq!(grid.downsample(&pts)?, vec![[0.9, 0.1, 0.5], [1.5, 0.0, 0.0]]);
        assert_eq!(grid.downsample_indices(&pts)?, vec![0, 2]);
        Ok(())
    }

    #[test]
    fn test_negative_coordinates_use_floor() -> Result<(), CloudError> {
        let grid = VoxelGrid::new(2.0)?;
        assert_eq!(grid.voxel_key(&[-0.5, 0.5, -2.0]), [-1, 0, -1]);
        // -0.5 and 0.5 straddle zero and must not share a cell
        let pts = [[-0.5, 0.0, 0.0], [0.5, 0.0, 0.0]];
        assert_eq!(grid.downsample(&pts)?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_empty_input() -> Result<(), CloudError> {
        let grid = VoxelGrid::new(1.0)?;
        assert!(grid.downsample(&[])?.is_empty());
        Ok(())
    }

    #[test]
    fn test_non_finite_points_are_rejected() -> Result<(), CloudError> {
        let grid = VoxelGrid::new(1.0)?;
        assert_eq!(
            grid.downsample(&[[f64::NAN, 0.0, 0.0], [f64::INFINITY, 1.0, 1.0]]),
            Err(CloudError::NonFinitePoint { index: 0 })
        );
        assert_eq!(
            grid.downsample_indices(&[[0.0, 0.0, 0.0], [1.0, f64::NEG_INFINITY, 1.0]]),
            Err(CloudError::NonFinitePoint { index: 1 })
        );
        Ok(())
    }

    #[test]
    fn test_non_empty_input_keeps_a_point() -> Result<(), CloudError> {
        let grid = VoxelGrid::new(1e6)?;
        let pts = [[3.0, -2.0, 1.0], [3.5, -2.5, 1.5], [-7.0, 4.0, 0.0]];
        assert!(!grid.downsample(&pts)?.is_empty());
        assert_eq!(grid.downsample(&pts[..1])?, vec![pts[0]]);
        Ok(())
    }
}
