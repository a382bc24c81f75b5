use glam::DVec3;

/// Utility function to compute the Euclidean distance between two points.
///
/// Example:
/// ```
/// use anchorwire_3d::ops::euclidean_distance;
///
/// let a = [1.0, 2.0, 3.0];
/// let b = [4.0, 6.0, 3.0];
/// assert_eq!(euclidean_distance(&a, &b), 5.0);
/// ```
pub fn euclidean_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    DVec3::from_array(*a).distance(DVec3::from_array(*b))
}

/// Keep the points whose distance to `center` is at most `radius`, preserving their order.
pub fn points_within_radius(points: &[[f64; 3]], center: &[f64; 3], radius: f64) -> Vec<[f64; 3]> {
    points
        .iter()
        .filter(|p| euclidean_distance(p, center) <= radius)
        .copied()
        .collect()
}

/// Express the points relative to `center`.
pub fn center_points(points: &[[f64; 3]], center: &[f64; 3]) -> Vec<[f64; 3]> {
    let c = DVec3::from_array(*center);
    points
        .iter()
        .map(|p| (DVec3::from_array(*p) - c).to_array())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_within_radius_is_inclusive() {
        let pts = [[0.0, 0.0, 0.0], [3.0, 4.0, 0.0], [3.0, 4.0, 0.1], [-1.0, 0.0, 0.0]];
        let kept = points_within_radius(&pts, &[0.0, 0.0, 0.0], 5.0);
        assert_eq!(kept, vec![[0.0, 0.0, 0.0], [3.0, 4.0, 0.0], [-1.0, 0.0, 0.0]]);
    }

    #[test]
    fn test_center_points() {
        let pts = [[1.0, 2.0, 3.0], [2.0, 2.0, 2.0]];
        let centered = center_points(&pts, &[1.0, 1.0, 1.0]);
        assert_eq!(centered, vec![[0.0, 1.0, 2.0], [1.0, 1.0, 1.0]]);
    }
}
