use crate::error::CloudError;
use crate::ops::euclidean_distance;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Undirected edges over a fixed-order point sequence.
///
/// Every edge `(i, j)` satisfies `i < j`; edges are unique and sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WireframeGraph {
    edges: Vec<(usize, usize)>,
}

impl WireframeGraph {
    /// The edges in ascending `(i, j)` order.
    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    /// Number of edges.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether the graph has no edges.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Whether the unordered pair `{a, b}` is an edge.
    pub fn contains(&self, a: usize, b: usize) -> bool {
        let key = (a.min(b), a.max(b));
        self.edges.binary_search(&key).is_ok()
    }
}

/// The `k` nearest neighbors of every point, nearest first.
///
/// Brute force over all pairs. A point is never its own neighbor; equal distances are ordered
/// by index. Points with fewer than `k` others get all of them.
pub fn knn_indices(points: &[[f64; 3]], k: usize) -> Vec<Vec<usize>> {
    (0..points.len())
        .into_par_iter()
        .map(|i| {
            let mut candidates: Vec<(f64, usize)> = points
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(j, p)| (euclidean_distance(&points[i], p), j))
                .collect();
            let by_distance = |a: &(f64, usize), b: &(f64, usize)| {
                a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
            };
            if k < candidates.len() {
                if k == 0 {
                    return Vec::new();
                }
                candidates.select_nth_unstable_by(k - 1, by_distance);
                candidates.truncate(k);
            }
            candidates.sort_unstable_by(by_distance);
            candidates.into_iter().map(|(_, j)| j).collect()
        })
        .collect()
}

/// Connect nearby points into an approximate proximity graph.
///
/// The pair `(i, j)`, `i < j`, is a candidate when `j` is among the `k` nearest neighbors of `i`
/// or `i` is among those of `j`. A candidate becomes an edge iff the distance between the two
/// points is strictly below `cutoff`.
pub fn build_wireframe(
    points: &[[f64; 3]],
    k: usize,
    cutoff: f64,
) -> Result<WireframeGraph, CloudError> {
    if !(cutoff.is_finite() && cutoff >= 0.0) {
        return Err(CloudError::InvalidCutoff(cutoff));
    }

    let neighbors = knn_indices(points, k);
    let edges: BTreeSet<(usize, usize)> = neighbors
        .iter()
        .enumerate()
        .flat_map(|(i, nn)| nn.iter().map(move |&j| (i.min(j), i.max(j))))
        .filter(|&(i, j)| euclidean_distance(&points[i], &points[j]) < cutoff)
        .collect();

    log::debug!(
        "wireframe: {} edges over {} points (k = {k}, cutoff = {cutoff})",
        edges.len(),
        points.len()
    );

    Ok(WireframeGraph {
        edges: edges.into_iter().collect(),
    })
}

/// Edges whose two projected endpoints both lie inside a `width` x `height` image.
pub fn edges_in_image(
    graph: &WireframeGraph,
    projected: &[[f64; 2]],
    width: f64,
    height: f64,
) -> Vec<(usize, usize)> {
    let inside = |idx: usize| {
        projected
            .get(idx)
            .is_some_and(|&[x, y]| (0.0..width).contains(&x) && (0.0..height).contains(&y))
    };
    graph
        .edges()
        .iter()
        .copied()
        .filter(|&(i, j)| inside(i) && inside(j))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize, spacing: f64) -> Vec<[f64; 3]> {
        (0..n).map(|i| [i as f64 * spacing, 0.0, 0.0]).collect()
    }

    #[test]
    fn test_knn_excludes_self_and_breaks_ties_by_index() {
        let pts = line(5, 1.0);
        let nn = knn_indices(&pts, 2);
        assert_eq!(nn[0], vec![1, 2]);
        // 1 and 3 are equally far from 2
        assert_eq!(nn[2], vec![1, 3]);
        assert_eq!(nn[4], vec![3, 2]);
    }

    #[test]
    fn test_knn_with_fewer_points_than_k() {
        let pts = line(3, 1.0);
        let nn = knn_indices(&pts, 4);
        assert_eq!(nn[0], vec![1, 2]);
        assert!(knn_indices(&pts, 0).iter().all(|n| n.is_empty()));
    }

    #[test]
    fn test_cutoff_is_strict() -> Result<(), CloudError> {
        let pts = line(3, 2.0);
        let graph = build_wireframe(&pts, 4, 2.0)?;
        assert!(graph.is_empty());

        let graph = build_wireframe(&pts, 4, 2.0 + 1e-9)?;
        assert_eq!(graph.edges(), &[(0, 1), (1, 2)]);
        Ok(())
    }

    #[test]
    fn test_edges_are_symmetric_union() -> Result<(), CloudError> {
        // (1, 3) is proposed only by the neighbor list of 3
        let pts = [
            [0.0, 0.0, 0.0],
            [0.1, 0.0, 0.0],
            [0.0, 0.1, 0.0],
            [1.0, 0.0, 0.0],
        ];
        let nn = knn_indices(&pts, 1);
        assert_eq!(nn[0], vec![1]);
        assert_eq!(nn[3], vec![1]);

        let graph = build_wireframe(&pts, 1, 10.0)?;
        assert!(graph.contains(1, 3));
        assert!(graph.contains(0, 1));
        assert!(graph.contains(2, 0));
        Ok(())
    }

    #[test]
    fn test_edges_in_image() -> Result<(), CloudError> {
        let pts = line(3, 1.0);
        let graph = build_wireframe(&pts, 2, 5.0)?;
        let projected = [[10.0, 10.0], [20.0, 10.0], [120.0, 10.0]];
        assert_eq!(edges_in_image(&graph, &projected, 100.0, 100.0), vec![(0, 1)]);
        Ok(())
    }

    #[test]
    fn test_rejects_invalid_cutoff() {
        assert_eq!(
            build_wireframe(&line(2, 1.0), 1, f64::NAN).map_err(|e| e.to_string()),
            Err("edge cutoff must be non-negative and finite, got NaN".to_string())
        );
    }
}
