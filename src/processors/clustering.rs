//! Density-based spatial clustering over 3D cylinder centers.
//!
//! Classic DBSCAN backed by a `kiddo` KD-tree for O(log n) neighbor
//! queries. The pipeline is single-threaded end to end, so cluster
//! formation uses a plain union-find rather than anything atomic.
//!
//! Determinism: neighbor lists are sorted by point index, union-find
//! roots resolve to the largest index of a component, and cluster ids
//! are assigned in first-seen point order. Re-running over the same
//! input always yields the same labels.

use std::collections::HashMap;

use kiddo::{ImmutableKdTree, SquaredEuclidean};

/// Union-find with path compression for cluster merging.
pub struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    /// Create a new union-find structure where each element is its own parent.
    #[inline]
    pub fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    /// Find the root of the set containing `x` with path compression.
    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            // Point x at its grandparent to halve the path.
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Union the sets containing `x` and `y`.
    ///
    /// The smaller root is always attached to the larger one, so a
    /// component's final root is its largest member index regardless of
    /// union order. Returns true if a merge actually occurred.
    pub fn union(&mut self, x: usize, y: usize) -> bool {
        let root_x = self.find(x);
        let root_y = self.find(y);

        if root_x == root_y {
            return false;
        }

        let (small, large) = if root_x < root_y {
            (root_x, root_y)
        } else {
            (root_y, root_x)
        };
        self.parent[small] = large;
        true
    }
}

/// DBSCAN clustering over 3D points.
///
/// A point's neighborhood includes the point itself, so `min_samples`
/// counts the point too (sklearn convention). With `min_samples <= 1`
/// every point is core and the clusters are exactly the connected
/// components of the eps-neighbor graph; no point is labelled noise.
///
/// # Algorithm
///
/// 1. Build a KD-tree over the points
/// 2. Collect each point's neighbors within `eps` (inclusive)
/// 3. Mark core points (neighborhood size >= `min_samples`)
/// 4. Union core points with their core neighbors
/// 5. Assign labels: core points get their component's cluster id,
///    border points join their first core neighbor in index order,
///    everything else is noise (-1)
///
/// # Arguments
///
/// * `points` - Slice of 3D coordinates [x, y, z] per point
/// * `eps` - Neighborhood radius
/// * `min_samples` - Minimum neighborhood size to form a cluster core
///
/// # Returns
///
/// Vector of cluster labels (-1 for noise points).
pub fn dbscan(points: &[[f64; 3]], eps: f64, min_samples: usize) -> Vec<i32> {
    let n = points.len();
    if n == 0 {
        return Vec::new();
    }

    let tree: ImmutableKdTree<f64, 3> = ImmutableKdTree::new_from_slice(points);
    let eps_sq = eps * eps;

    // Phase 1: neighbor lists, sorted by index for deterministic
    // tie-breaking downstream.
    let neighbors: Vec<Vec<usize>> = points
        .iter()
        .map(|point| {
            let mut found: Vec<usize> = tree
                .within::<SquaredEuclidean>(point, eps_sq)
                .iter()
                .map(|nn| nn.item as usize)
                .collect();
            found.sort_unstable();
            found
        })
        .collect();

    // Phase 2: core point identification. The query always returns the
    // point itself, so a neighborhood is never empty.
    let min_samples = min_samples.max(1);
    let is_core: Vec<bool> = neighbors
        .iter()
        .map(|neigh| neigh.len() >= min_samples)
        .collect();

    // Phase 3: union core points with their core neighbors.
    let mut uf = UnionFind::new(n);
    for i in 0..n {
        if is_core[i] {
            for &j in &neighbors[i] {
                if is_core[j] {
                    uf.union(i, j);
                }
            }
        }
    }

    // Phase 4: map union-find roots to sequential cluster ids in
    // first-seen point order.
    let mut root_to_cluster: HashMap<usize, i32> = HashMap::new();
    let mut next_cluster_id: i32 = 0;
    for i in 0..n {
        if is_core[i] {
            let root = uf.find(i);
            root_to_cluster.entry(root).or_insert_with(|| {
                let id = next_cluster_id;
                next_cluster_id += 1;
                id
            });
        }
    }

    // Phase 5: label assignment.
    let mut labels = vec![-1i32; n];
    for i in 0..n {
        if is_core[i] {
            let root = uf.find(i);
            labels[i] = root_to_cluster[&root];
        } else {
            // Border point: join the first core neighbor in index order.
            for &j in &neighbors[i] {
                if is_core[j] {
                    let root = uf.find(j);
                    labels[i] = root_to_cluster[&root];
                    break;
                }
            }
        }
    }

    labels
}
