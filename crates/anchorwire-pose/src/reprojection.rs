use serde::{Deserialize, Serialize};

/// Reprojection error summary of a pose over its correspondences, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReprojectionStats {
    /// Mean Euclidean error
    pub mean: f64,
    /// Largest Euclidean error
    pub max: f64,
    /// Mean signed horizontal offset, projected minus observed
    pub mean_dx: f64,
    /// Mean signed vertical offset, projected minus observed
    pub mean_dy: f64,
}

impl ReprojectionStats {
    /// Compare projected points with the observed ones, pairwise.
    ///
    /// Empty input yields all zeros.
    pub fn from_points(projected: &[[f64; 2]], observed: &[[f64; 2]]) -> Self {
        let n = projected.len().min(observed.len());
        if n == 0 {
            return Self::default();
        }
        let mut stats = Self::default();
        for (p, o) in projected.iter().zip(observed) {
            let (dx, dy) = (p[0] - o[0], p[1] - o[1]);
            let e = dx.hypot(dy);
            stats.mean += e;
            stats.max = stats.max.max(e);
            stats.mean_dx += dx;
            stats.mean_dy += dy;
        }
        let n = n as f64;
        stats.mean /= n;
        stats.mean_dx /= n;
        stats.mean_dy /= n;
        stats
    }

    /// Whether every field is finite.
    pub fn is_finite(&self) -> bool {
        [self.mean, self.max, self.mean_dx, self.mean_dy]
            .iter()
            .all(|v| v.is_finite())
    }
}
