//! Dendrogram: the complete binary merge history of an agglomerative run.
//!
//! Agglomerative clustering starts from `n` singleton nodes and performs
//! exactly `n - 1` merges to reach a single root. The [`Dendrogram`]
//! records every one of those merges and answers the questions that make
//! the history useful afterwards: *cut here, how many clusters?* and
//! *which leaves end up together?*
//!
//! # Flat-array layout
//!
//! Instead of a linked node graph, the tree is a struct of parallel arrays
//! indexed by a *level* in `[0, 2n-2]` — a classic arena layout. Leaves
//! occupy levels `[n-1, 2n-2]`; each merge writes one non-leaf entry,
//! filling levels `n-2` down to `0` (the root). All parent/child links are
//! level indices into the same arrays, which gives O(1) navigation, no
//! ownership cycles, and cheap persistence.
//!
//! ```text
//! level:   0     1     2  │  3     4     5     6        (n = 4)
//!        root  ·mid  ·mid │ leaf  leaf  leaf  leaf
//!        ←───── merges ───┤├────────── leaves ─────→
//!        (filled last→first)
//! ```
//!
//! A node's **ID** is always the minimum original leaf index among its
//! descendants, so the ID returned by [`Dendrogram::merge_nodes`] is
//! `min(id1, id2)`. IDs therefore never collide, and `index_for_id` can
//! track each live node's current level while the tree is only partially
//! built.
//!
//! Tree depth is O(n) in the worst (fully skewed) case, so every traversal
//! here is iterative with an explicit stack — no call recursion.
//!
//! # Coherence
//!
//! Each merge's distance is normalized into a `[0, 1]` *coherence*:
//!
//! ```text
//! coherence = 1 - (distance - min) / (max - min)
//! ```
//!
//! where `max` defaults to the largest observed merge distance. Tight
//! merges score near 1; the root (usually the loosest merge) scores near
//! 0. [`Dendrogram::clusters_with_coherence_exceeding`] turns a coherence
//! target into a cluster count: it scans from the root cut outward and
//! accepts the first cut whose defining merge is coherent enough, so
//! smaller targets yield fewer, coarser clusters.

mod persist;

pub use persist::FORMAT_VERSION;

use crate::cluster::Cluster;
use crate::error::{Error, Result};
use crate::tuple::{self, TupleList};

/// Flat-array binary merge tree over `leaf_count` leaves.
///
/// Built by `leaf_count - 1` calls to [`merge_nodes`](Self::merge_nodes);
/// queries that interpret the finished tree (coherence, cuts, navigation)
/// fail with [`Error::InvalidState`] until then.
#[derive(Debug, Clone)]
pub struct Dendrogram {
    leaf_count: usize,
    /// Counts down from `leaf_count - 1` (all leaves) to 0 (one root).
    current_level: usize,
    /// ID (minimum descendant leaf index) occupying each level.
    node_ids: Vec<usize>,
    parent_index: Vec<Option<usize>>,
    left_index: Vec<Option<usize>>,
    right_index: Vec<Option<usize>>,
    /// Leaf count under each level; 1 for leaves.
    sizes: Vec<usize>,
    /// Merge distance per non-leaf level (indexed by level directly).
    merge_distances: Vec<f64>,
    /// Cached coherences, parallel to `merge_distances`.
    coherences: Vec<f64>,
    coherences_stale: bool,
    min_coherence_threshold: f64,
    /// NaN means "use the observed maximum merge distance".
    max_coherence_threshold: f64,
    /// Current level index of each ID, while live.
    index_for_id: Vec<usize>,
}

impl Dendrogram {
    /// Create an unfinished dendrogram holding `leaf_count` singleton
    /// leaves with IDs `0..leaf_count`.
    pub fn new(leaf_count: usize) -> Result<Self> {
        if leaf_count == 0 {
            return Err(Error::EmptyInput);
        }
        let total = 2 * leaf_count - 1;
        let mut node_ids = vec![0; total];
        let mut sizes = vec![1; total];
        let mut index_for_id = vec![0; leaf_count];
        for id in 0..leaf_count {
            let level = leaf_count - 1 + id;
            node_ids[level] = id;
            sizes[level] = 1;
            index_for_id[id] = level;
        }
        Ok(Self {
            leaf_count,
            current_level: leaf_count - 1,
            node_ids,
            parent_index: vec![None; total],
            left_index: vec![None; total],
            right_index: vec![None; total],
            sizes,
            merge_distances: vec![0.0; leaf_count - 1],
            coherences: vec![0.0; leaf_count - 1],
            coherences_stale: true,
            min_coherence_threshold: 0.0,
            max_coherence_threshold: f64::NAN,
            index_for_id,
        })
    }

    /// Number of original leaves.
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Level the next merge will fill, also "merges remaining".
    pub fn current_level(&self) -> usize {
        self.current_level
    }

    /// Merges performed so far.
    pub fn merges_done(&self) -> usize {
        self.leaf_count - 1 - self.current_level
    }

    /// True once all `leaf_count - 1` merges have been recorded.
    pub fn is_finished(&self) -> bool {
        self.current_level == 0
    }

    fn check_finished(&self) -> Result<()> {
        if !self.is_finished() {
            return Err(Error::InvalidState("dendrogram is not finished"));
        }
        Ok(())
    }

    fn is_leaf_level(&self, level: usize) -> bool {
        level >= self.leaf_count - 1
    }

    /// Level index of a live node, validating that `id` really names one.
    fn live_index(&self, id: usize, name: &'static str) -> Result<usize> {
        if id >= self.leaf_count {
            return Err(Error::InvalidParameter {
                name,
                message: "not a valid node ID",
            });
        }
        let level = self.index_for_id[id];
        if self.node_ids[level] != id || self.parent_index[level].is_some() {
            return Err(Error::InvalidParameter {
                name,
                message: "does not name a live (unmerged) node",
            });
        }
        Ok(level)
    }

    /// Merge the live nodes identified by `id1` and `id2` at `distance`.
    ///
    /// Returns the merged node's ID, always `min(id1, id2)`. Fails with
    /// [`Error::InvalidState`] on a finished dendrogram and
    /// [`Error::InvalidParameter`] if either ID does not name a live node.
    pub fn merge_nodes(&mut self, id1: usize, id2: usize, distance: f64) -> Result<usize> {
        if self.is_finished() {
            return Err(Error::InvalidState("dendrogram is already finished"));
        }
        if id1 == id2 {
            return Err(Error::InvalidParameter {
                name: "id2",
                message: "cannot merge a node with itself",
            });
        }
        let index1 = self.live_index(id1, "id1")?;
        let index2 = self.live_index(id2, "id2")?;

        self.current_level -= 1;
        let level = self.current_level;
        let merged_id = id1.min(id2);
        self.node_ids[level] = merged_id;
        self.left_index[level] = Some(index1);
        self.right_index[level] = Some(index2);
        self.sizes[level] = self.sizes[index1] + self.sizes[index2];
        self.merge_distances[level] = distance;
        self.parent_index[index1] = Some(level);
        self.parent_index[index2] = Some(level);
        self.index_for_id[merged_id] = level;
        self.coherences_stale = true;
        Ok(merged_id)
    }

    /// Leaf count under `level`.
    pub fn size(&self, level: usize) -> Result<usize> {
        self.check_level(level)?;
        Ok(self.sizes[level])
    }

    /// ID occupying `level`.
    pub fn node_id(&self, level: usize) -> Result<usize> {
        self.check_level(level)?;
        Ok(self.node_ids[level])
    }

    fn check_level(&self, level: usize) -> Result<()> {
        let total = 2 * self.leaf_count - 1;
        if level >= total {
            return Err(Error::IndexOutOfBounds { index: level, len: total });
        }
        Ok(())
    }

    fn check_nonleaf_level(&self, level: usize) -> Result<()> {
        if self.leaf_count < 2 || level > self.leaf_count - 2 {
            return Err(Error::IndexOutOfBounds {
                index: level,
                len: self.leaf_count.saturating_sub(1),
            });
        }
        Ok(())
    }

    /// Distance at which the merge occupying non-leaf `level` occurred.
    pub fn merge_distance(&self, level: usize) -> Result<f64> {
        self.check_nonleaf_level(level)?;
        Ok(self.merge_distances[level])
    }

    /// Largest merge distance recorded so far.
    pub fn max_merge_distance(&self) -> f64 {
        self.merge_distances[self.current_level..]
            .iter()
            .fold(0.0f64, |acc, d| acc.max(*d))
    }

    // ------------------------------------------------------------------
    // Coherence
    // ------------------------------------------------------------------

    /// Lower bound used when normalizing distances into coherences.
    /// Invalidates the coherence cache.
    pub fn set_min_coherence_threshold(&mut self, threshold: f64) {
        self.min_coherence_threshold = threshold;
        self.coherences_stale = true;
    }

    /// Upper bound used when normalizing distances into coherences.
    /// NaN restores the default (the observed maximum merge distance).
    /// Invalidates the coherence cache.
    pub fn set_max_coherence_threshold(&mut self, threshold: f64) {
        self.max_coherence_threshold = threshold;
        self.coherences_stale = true;
    }

    fn compute_coherences(&mut self) {
        let mind = self.min_coherence_threshold;
        let maxd = if self.max_coherence_threshold.is_nan() {
            self.max_merge_distance()
        } else {
            self.max_coherence_threshold
        };
        if maxd > mind {
            let span = maxd - mind;
            for (c, d) in self.coherences.iter_mut().zip(self.merge_distances.iter()) {
                *c = (1.0 - (d - mind) / span).clamp(0.0, 1.0);
            }
        } else {
            // Degenerate: every merge happened at the same distance.
            for c in self.coherences.iter_mut() {
                *c = 1.0;
            }
        }
        self.coherences_stale = false;
    }

    /// Coherence of the merge at non-leaf `level`, in `[0, 1]`.
    ///
    /// Requires a finished dendrogram; recomputes the cache if a threshold
    /// changed since the last query.
    pub fn coherence(&mut self, level: usize) -> Result<f64> {
        self.check_finished()?;
        self.check_nonleaf_level(level)?;
        if self.coherences_stale {
            self.compute_coherences();
        }
        Ok(self.coherences[level])
    }

    /// Smallest cluster count whose defining cut has coherence at least
    /// `target`.
    ///
    /// Scans non-leaf levels from the root cut (1 cluster) outward and
    /// returns `level + 1` for the first level whose coherence meets the
    /// target, or `leaf_count` if none does (every point its own cluster).
    /// Smaller targets select fewer, coarser clusters; a target of 1.0
    /// only tolerates merges at the minimum normalized distance.
    pub fn clusters_with_coherence_exceeding(&mut self, target: f64) -> Result<usize> {
        self.check_finished()?;
        if !(0.0..=1.0).contains(&target) {
            return Err(Error::InvalidParameter {
                name: "target",
                message: "coherence target must lie in [0, 1]",
            });
        }
        if self.coherences_stale {
            self.compute_coherences();
        }
        for (level, c) in self.coherences.iter().enumerate() {
            if *c >= target {
                return Ok(level + 1);
            }
        }
        Ok(self.leaf_count)
    }

    // ------------------------------------------------------------------
    // Cuts
    // ------------------------------------------------------------------

    /// Cut the finished tree into exactly `clusters_desired` groups of
    /// leaf IDs.
    ///
    /// Cutting at `clusters_desired` means undoing the last
    /// `clusters_desired - 1` merges: every level at or beyond the cut
    /// whose ancestor has not already been claimed contributes one group
    /// (its full leaf-descendant set). Group sizes always sum to
    /// `leaf_count`.
    pub fn cluster_groupings(&self, clusters_desired: usize) -> Result<Vec<Vec<usize>>> {
        self.check_finished()?;
        if clusters_desired == 0 || clusters_desired > self.leaf_count {
            return Err(Error::InvalidClusterCount {
                requested: clusters_desired,
                n_items: self.leaf_count,
            });
        }
        let total = 2 * self.leaf_count - 1;
        let cut = clusters_desired - 1;
        let mut claimed = vec![false; total];
        let mut groups = Vec::with_capacity(clusters_desired);
        // Parents always sit at lower levels than their children, so an
        // ascending scan meets each forest root before its descendants.
        for level in cut..total {
            if claimed[level] {
                continue;
            }
            groups.push(self.collect_leaves(level, &mut claimed));
        }
        Ok(groups)
    }

    /// Left-to-right leaf IDs under `root`, marking every visited level.
    ///
    /// Iterative left-spine descent with a pending-right stack; the tree
    /// can be arbitrarily skewed.
    fn collect_leaves(&self, root: usize, claimed: &mut [bool]) -> Vec<usize> {
        let mut group = Vec::with_capacity(self.sizes[root]);
        let mut pending: Vec<usize> = Vec::new();
        let mut current = Some(root);
        while let Some(level) = current {
            claimed[level] = true;
            if self.is_leaf_level(level) {
                group.push(self.node_ids[level]);
                current = pending.pop();
            } else {
                if let Some(right) = self.right_index[level] {
                    pending.push(right);
                }
                current = self.left_index[level];
            }
        }
        group
    }

    /// Cut into `clusters_desired` [`Cluster`]s with centroids averaged
    /// from `tuples`.
    pub fn clusters(
        &self,
        clusters_desired: usize,
        tuples: &dyn TupleList,
    ) -> Result<Vec<Cluster>> {
        if tuples.tuple_count() != self.leaf_count {
            return Err(Error::DimensionMismatch {
                expected: self.leaf_count,
                found: tuples.tuple_count(),
            });
        }
        let groups = self.cluster_groupings(clusters_desired)?;
        let mut clusters = Vec::with_capacity(groups.len());
        for group in groups {
            let centroid = tuple::average(tuples, &group)?;
            clusters.push(Cluster::new(group, centroid));
        }
        Ok(clusters)
    }

    /// Sweep cluster counts and return the cut with the best Bayesian
    /// information criterion score.
    ///
    /// Greedy: the sweep stops early once the score is decreasing and has
    /// either gone negative or fallen to half the best seen
    /// (`bic < 0 || max_bic / bic >= 2.0`). The inequality is an inherited
    /// empirical heuristic; changing it changes which cluster count
    /// callers get, so it is kept as-is rather than derived fresh.
    pub fn optimal_clusters(&self, tuples: &dyn TupleList) -> Result<Vec<Cluster>> {
        self.check_finished()?;
        if tuples.tuple_count() != self.leaf_count {
            return Err(Error::DimensionMismatch {
                expected: self.leaf_count,
                found: tuples.tuple_count(),
            });
        }
        let mut best_k = 1;
        let mut max_bic = f64::NEG_INFINITY;
        let mut last_bic = f64::NEG_INFINITY;
        for k in 1..=self.leaf_count {
            let clusters = self.clusters(k, tuples)?;
            let bic = bic_score(tuples, &clusters)?;
            if bic > max_bic {
                max_bic = bic;
                best_k = k;
            }
            let decreasing = bic < last_bic;
            if decreasing && (bic < 0.0 || max_bic / bic >= 2.0) {
                break;
            }
            last_bic = bic;
        }
        self.clusters(best_k, tuples)
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// ID of the left child of the node currently identified by `id`, or
    /// `None` for a leaf.
    pub fn left_child_id(&self, id: usize) -> Result<Option<usize>> {
        self.check_finished()?;
        let level = self.id_level(id)?;
        Ok(self.left_index[level].map(|l| self.node_ids[l]))
    }

    /// ID of the right child of the node currently identified by `id`, or
    /// `None` for a leaf.
    pub fn right_child_id(&self, id: usize) -> Result<Option<usize>> {
        self.check_finished()?;
        let level = self.id_level(id)?;
        Ok(self.right_index[level].map(|r| self.node_ids[r]))
    }

    fn id_level(&self, id: usize) -> Result<usize> {
        if id >= self.leaf_count {
            return Err(Error::IndexOutOfBounds {
                index: id,
                len: self.leaf_count,
            });
        }
        Ok(self.index_for_id[id])
    }

    fn leaf_level(&self, leaf_id: usize) -> Result<usize> {
        if leaf_id >= self.leaf_count {
            return Err(Error::IndexOutOfBounds {
                index: leaf_id,
                len: self.leaf_count,
            });
        }
        Ok(self.leaf_count - 1 + leaf_id)
    }

    /// Leaf immediately to the left of `leaf_id` in dendrogram order, or
    /// `None` if `leaf_id` is the leftmost leaf.
    ///
    /// Walks up until the current node is some parent's right child, then
    /// descends the sibling's rightmost spine.
    pub fn left_neighbor_leaf_id(&self, leaf_id: usize) -> Result<Option<usize>> {
        self.check_finished()?;
        let mut level = self.leaf_level(leaf_id)?;
        loop {
            let parent = match self.parent_index[level] {
                Some(p) => p,
                None => return Ok(None),
            };
            if self.right_index[parent] == Some(level) {
                let mut down = match self.left_index[parent] {
                    Some(l) => l,
                    None => return Ok(None),
                };
                while let Some(right) = self.right_index[down] {
                    down = right;
                }
                return Ok(Some(self.node_ids[down]));
            }
            level = parent;
        }
    }

    /// Leaf immediately to the right of `leaf_id` in dendrogram order, or
    /// `None` if `leaf_id` is the rightmost leaf.
    pub fn right_neighbor_leaf_id(&self, leaf_id: usize) -> Result<Option<usize>> {
        self.check_finished()?;
        let mut level = self.leaf_level(leaf_id)?;
        loop {
            let parent = match self.parent_index[level] {
                Some(p) => p,
                None => return Ok(None),
            };
            if self.left_index[parent] == Some(level) {
                let mut down = match self.right_index[parent] {
                    Some(r) => r,
                    None => return Ok(None),
                };
                while let Some(left) = self.left_index[down] {
                    down = left;
                }
                return Ok(Some(self.node_ids[down]));
            }
            level = parent;
        }
    }

    /// Left-to-right leaf IDs below `level`.
    pub fn ordered_leaf_ids(&self, level: usize) -> Result<Vec<usize>> {
        self.check_finished()?;
        self.check_level(level)?;
        let mut claimed = vec![false; 2 * self.leaf_count - 1];
        Ok(self.collect_leaves(level, &mut claimed))
    }
}

/// Bayesian information criterion for one clustering, after Pelleg & Moore
/// (x-means): per-cluster spherical-Gaussian log-likelihood minus a
/// `(p/2)·ln R` parameter penalty.
fn bic_score(tuples: &dyn TupleList, clusters: &[Cluster]) -> Result<f64> {
    let r = tuples.tuple_count() as f64;
    let m = tuples.tuple_length() as f64;
    let k = clusters.len();

    // Pooled variance of members about their centroids.
    let mut sum_sq = 0.0;
    let mut buf = vec![0.0; tuples.tuple_length()];
    for cluster in clusters {
        for &member in cluster.members() {
            tuples.copy_tuple(member, &mut buf)?;
            let d = tuple::euclidean(&buf, cluster.centroid());
            sum_sq += d * d;
        }
    }
    let denom = r - k as f64;
    let variance = if denom > 0.0 { sum_sq / denom } else { 0.0 };
    if variance <= 0.0 {
        // All-singleton or zero-spread cuts have no finite spherical
        // likelihood; score them as unusable so the sweep stops.
        return Ok(f64::NEG_INFINITY);
    }

    let mut log_likelihood = 0.0;
    for cluster in clusters {
        let n = cluster.size() as f64;
        log_likelihood += -0.5 * n * (2.0 * std::f64::consts::PI).ln()
            - 0.5 * n * m * variance.ln()
            - 0.5 * (n - k as f64)
            + n * n.ln()
            - n * r.ln();
    }
    let params = k as f64 * (m + 1.0);
    Ok(log_likelihood - 0.5 * params * r.ln())
}
