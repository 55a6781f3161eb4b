//! Reverse-nearest-neighbor (RNN) hierarchical clustering.
//!
//! # The Algorithm
//!
//! Classic agglomerative clustering repeatedly merges the globally
//! closest pair, which costs O(n²) distance maintenance per merge. The
//! RNN strategy (Benzécri / de Rham's reciprocal-nearest-neighbor chain)
//! never needs the global minimum:
//!
//! 1. Start a chain at any live node.
//! 2. Hop to its nearest neighbor, then to *that* node's nearest
//!    neighbor, and so on. Chain distances are non-increasing, so the
//!    chain must reach a **reciprocal pair** — two nodes that are each
//!    other's nearest neighbor.
//! 3. Merge the pair immediately; a reciprocal pair stays reciprocal no
//!    matter what merges elsewhere, so this is safe without a global
//!    scan.
//! 4. Restart the chain at a fresh live node until `n - 1` merges have
//!    been recorded in the [`Dendrogram`].
//!
//! Chain starts are drawn from a seeded shuffled permutation, which
//! avoids pathological merge orders on pre-sorted input and makes runs
//! reproducible via [`HierarchicalParams::with_random_seed`].
//!
//! # Centroids and the incremental update
//!
//! A leaf's centroid is its tuple; a merged node's centroid is the
//! size-weighted mean of its children's, maintained incrementally. After
//! each merge, every other live node's cached nearest neighbor is
//! repaired using the Lance-Williams-style weighted distance
//!
//! ```text
//! d' = (n·t)/(n + t) · distance(merged_center, other_center)
//! ```
//!
//! (`n` = other node's size, `t` = merged node's size): keep the merged
//! node as the cached neighbor if it still wins, adopt it if it newly
//! wins, otherwise invalidate and recompute lazily. This is what avoids
//! an all-pairs recomputation per merge.
//!
//! **Known limitation**: that update rule is linkage-exact only for
//! Euclidean distance with centroid (Ward-style) linkage and for cosine
//! distance (group average). Any [`DistanceMetric`] is accepted — no
//! runtime restriction — but other metrics are not guaranteed to
//! reproduce the textbook linkage result.
//!
//! # Parallelism
//!
//! The only concurrency is inside a single nearest-neighbor lookup: the
//! distances from one target centroid to all nodes are partitioned by
//! contiguous index ranges across a per-run worker pool, each worker
//! writing disjoint slots of a shared buffer with its own clone of the
//! metric. Which node gets merged next is decided by a single-threaded
//! scan with ties broken by lower index, so the dendrogram is
//! bit-identical for any worker thread count.

use rand::prelude::*;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::dendrogram::Dendrogram;
use crate::error::{Error, Result};
use crate::metric::DistanceMetric;
use crate::task::TaskMonitor;
use crate::tuple::{self, TupleList};

use super::{Cluster, Criterion, HierarchicalParams};

/// A cached nearest-neighbor candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Neighbor {
    index: usize,
    distance: f64,
}

/// Explicit per-node nearest-neighbor cache.
///
/// An entry is the node's current best known neighbor, or `None` when it
/// must be recomputed from scratch. The cache is an optimization, never
/// the source of truth: invalidating everything only costs speed.
#[derive(Debug)]
struct NeighborCache {
    entries: Vec<Option<Neighbor>>,
}

impl NeighborCache {
    fn new(n: usize) -> Self {
        Self {
            entries: vec![None; n],
        }
    }

    fn get(&self, index: usize) -> Option<Neighbor> {
        self.entries[index]
    }

    fn set(&mut self, index: usize, neighbor: Neighbor) {
        self.entries[index] = Some(neighbor);
    }

    fn invalidate(&mut self, index: usize) {
        self.entries[index] = None;
    }
}

/// Hierarchical clusterer using reciprocal-nearest-neighbor chains.
///
/// ```
/// use clade::cluster::{Criterion, HierarchicalParams, RnnHierarchicalClusterer};
/// use clade::metric::Euclidean;
/// use clade::task::NoopMonitor;
/// use clade::tuple::MemoryTupleList;
///
/// let tuples = MemoryTupleList::from_rows(&[
///     vec![0.0], vec![1.0], vec![5.0], vec![6.0],
/// ]).unwrap();
/// let clusterer = RnnHierarchicalClusterer::new(
///     HierarchicalParams::new(Euclidean)
///         .with_criterion(Criterion::Clusters(2))
///         .with_random_seed(7),
/// );
/// let clusters = clusterer.cluster(&tuples, &NoopMonitor).unwrap();
/// assert_eq!(clusters.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct RnnHierarchicalClusterer<M: DistanceMetric> {
    params: HierarchicalParams<M>,
}

impl<M: DistanceMetric> RnnHierarchicalClusterer<M> {
    /// Create a clusterer from its parameters.
    pub fn new(params: HierarchicalParams<M>) -> Self {
        Self { params }
    }

    /// Run the full merge process and return the finished dendrogram.
    ///
    /// Fails fast with [`Error::EmptyInput`] on zero tuples. Checks
    /// `monitor` for cancellation once per merge and reports progress
    /// across the configured range. On any failure the worker pool is
    /// released and no partial dendrogram is exposed.
    pub fn build_dendrogram(
        &self,
        tuples: &dyn TupleList,
        monitor: &dyn TaskMonitor,
    ) -> Result<Dendrogram> {
        let n = tuples.tuple_count();
        if n == 0 {
            return Err(Error::EmptyInput);
        }
        let mut state = MergeState::new(
            tuples,
            self.params.metric.clone(),
            self.params.resolved_worker_threads(),
        )?;
        let mut dendrogram = Dendrogram::new(n)?;

        let mut order: Vec<usize> = (0..n).collect();
        let mut rng: Box<dyn RngCore> = match self.params.random_seed {
            Some(s) => Box::new(StdRng::seed_from_u64(s)),
            None => Box::new(rand::rng()),
        };
        order.shuffle(&mut rng);

        let (begin, end) = self.params.progress_range;
        let total_merges = n - 1;
        let mut cursor = 0usize;
        for merge_index in 0..total_merges {
            if monitor.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let start = state.next_live(&order, &mut cursor);
            let (id1, id2, distance) = state.find_reciprocal_pair(start);
            let merged = dendrogram.merge_nodes(id1, id2, distance)?;
            state.apply_merge(merged, id1.max(id2));
            monitor.report_progress(
                begin + (end - begin) * (merge_index + 1) as f64 / total_merges as f64,
            );
        }
        Ok(dendrogram)
    }

    /// Build a dendrogram and cut it per the configured criterion.
    pub fn cluster(
        &self,
        tuples: &dyn TupleList,
        monitor: &dyn TaskMonitor,
    ) -> Result<Vec<Cluster>> {
        let mut dendrogram = self.build_dendrogram(tuples, monitor)?;
        self.cut(&mut dendrogram, tuples)
    }

    /// Cut a previously built (possibly persisted) dendrogram instead of
    /// re-running the merge process.
    ///
    /// The dendrogram must be finished and its leaf count must match
    /// `tuples`.
    pub fn cluster_with_dendrogram(
        &self,
        tuples: &dyn TupleList,
        dendrogram: &mut Dendrogram,
    ) -> Result<Vec<Cluster>> {
        if dendrogram.leaf_count() != tuples.tuple_count() {
            return Err(Error::DimensionMismatch {
                expected: dendrogram.leaf_count(),
                found: tuples.tuple_count(),
            });
        }
        if !dendrogram.is_finished() {
            return Err(Error::InvalidState("dendrogram is not finished"));
        }
        self.cut(dendrogram, tuples)
    }

    fn cut(&self, dendrogram: &mut Dendrogram, tuples: &dyn TupleList) -> Result<Vec<Cluster>> {
        dendrogram.set_min_coherence_threshold(self.params.min_coherence_threshold);
        dendrogram.set_max_coherence_threshold(self.params.max_coherence_threshold);
        let k = match self.params.criterion {
            Criterion::Clusters(k) => k,
            Criterion::Coherence(target) => {
                dendrogram.clusters_with_coherence_exceeding(target)?
            }
        };
        dendrogram.clusters(k, tuples)
    }
}

/// Mutable state of one merge run.
///
/// Owned exclusively by the orchestrating thread; workers only ever see
/// immutable borrows of `centroids`, `sizes`, and `unavailable` plus
/// disjoint mutable slots of the scratch buffer.
struct MergeState<M: DistanceMetric> {
    metric: M,
    n: usize,
    /// IDs retired by a merge; never searched again.
    unavailable: Vec<bool>,
    /// Leaf count per live node ID.
    sizes: Vec<usize>,
    /// Centroid per live node ID; a leaf's centroid is its tuple. The
    /// slot of a retired ID is evicted (cleared) to bound memory.
    centroids: Vec<Vec<f64>>,
    cache: NeighborCache,
    /// Scratch buffer for one distance fan-out.
    distances: Vec<f64>,
    #[cfg(feature = "parallel")]
    pool: rayon::ThreadPool,
}

impl<M: DistanceMetric> MergeState<M> {
    fn new(tuples: &dyn TupleList, metric: M, worker_threads: usize) -> Result<Self> {
        let n = tuples.tuple_count();
        let mut centroids = Vec::with_capacity(n);
        for index in 0..n {
            centroids.push(tuples.tuple(index)?);
        }
        #[cfg(not(feature = "parallel"))]
        let _ = worker_threads;
        Ok(Self {
            metric,
            n,
            unavailable: vec![false; n],
            sizes: vec![1; n],
            centroids,
            cache: NeighborCache::new(n),
            distances: vec![f64::INFINITY; n],
            #[cfg(feature = "parallel")]
            pool: rayon::ThreadPoolBuilder::new()
                .num_threads(worker_threads)
                .build()
                .map_err(|_| Error::InvalidParameter {
                    name: "worker_threads",
                    message: "could not build the worker pool",
                })?,
        })
    }

    /// Next live index from the shuffled restart order, wrapping as
    /// needed. At least one live node always exists while merging.
    fn next_live(&self, order: &[usize], cursor: &mut usize) -> usize {
        loop {
            let candidate = order[*cursor % order.len()];
            *cursor += 1;
            if !self.unavailable[candidate] {
                return candidate;
            }
        }
    }

    /// Follow the nearest-neighbor chain from `start` until it closes on
    /// a reciprocal pair; returns `(id1, id2, merge_distance)`.
    fn find_reciprocal_pair(&mut self, start: usize) -> (usize, usize, f64) {
        let mut current = start;
        loop {
            let nn = self.nearest(current);
            let back = self.nearest(nn.index);
            if back.index == current {
                return (nn.index, current, back.distance);
            }
            current = nn.index;
        }
    }

    /// Nearest live neighbor of `index`, from cache or a full fan-out.
    fn nearest(&mut self, index: usize) -> Neighbor {
        if let Some(neighbor) = self.cache.get(index) {
            return neighbor;
        }
        self.fan_out(index, None);
        let mut best = Neighbor {
            index: usize::MAX,
            distance: f64::INFINITY,
        };
        for (j, &d) in self.distances.iter().enumerate() {
            // Strict < keeps the lowest index on ties, for determinism.
            if d < best.distance {
                best = Neighbor {
                    index: j,
                    distance: d,
                };
            }
        }
        self.cache.set(index, best);
        best
    }

    /// Compute distances from `from`'s centroid to every node into the
    /// scratch buffer. Retired nodes and `from` itself get infinity.
    ///
    /// With `weighted_by = Some(total)` each distance is scaled by the
    /// Lance-Williams factor `(size_j · total)/(size_j + total)`.
    ///
    /// The buffer is split into contiguous ranges across the worker
    /// pool; every worker clones the metric and reads only shared
    /// immutable state, so slots are written race-free.
    fn fan_out(&mut self, from: usize, weighted_by: Option<usize>) {
        let n = self.n;
        let unavailable: &[bool] = &self.unavailable;
        let sizes: &[usize] = &self.sizes;
        let centroids: &[Vec<f64>] = &self.centroids;
        let metric: &M = &self.metric;
        let distances: &mut [f64] = &mut self.distances;
        let target: &[f64] = &centroids[from];
        let total = weighted_by.map(|t| t as f64);

        let fill = |chunk_index: usize, chunk_len: usize, out: &mut [f64], metric: &M| {
            let base = chunk_index * chunk_len;
            for (offset, slot) in out.iter_mut().enumerate() {
                let j = base + offset;
                *slot = if j == from || unavailable[j] {
                    f64::INFINITY
                } else {
                    let d = metric.distance(target, &centroids[j]);
                    match total {
                        Some(t) => {
                            let sz = sizes[j] as f64;
                            (sz * t) / (sz + t) * d
                        }
                        None => d,
                    }
                };
            }
        };

        #[cfg(feature = "parallel")]
        {
            let chunk = n.div_ceil(self.pool.current_num_threads()).max(1);
            self.pool.install(|| {
                distances
                    .par_chunks_mut(chunk)
                    .enumerate()
                    .for_each(|(chunk_index, out)| {
                        let metric = metric.clone();
                        fill(chunk_index, chunk, out, &metric);
                    });
            });
        }
        #[cfg(not(feature = "parallel"))]
        {
            fill(0, n, distances, metric);
        }
    }

    /// Retire `dead`, fold it into `merged`, and repair cached neighbor
    /// pointers against the merged node.
    fn apply_merge(&mut self, merged: usize, dead: usize) {
        let merged_centroid = tuple::weighted_mean(
            &self.centroids[merged],
            self.sizes[merged] as f64,
            &self.centroids[dead],
            self.sizes[dead] as f64,
        );
        self.centroids[merged] = merged_centroid;
        self.centroids[dead] = Vec::new();
        self.sizes[merged] += self.sizes[dead];
        self.unavailable[dead] = true;
        self.cache.invalidate(merged);
        self.cache.invalidate(dead);

        // One weighted fan-out from the merged centroid, then repair each
        // live node's cached pointer from the buffer.
        let total = self.sizes[merged];
        self.fan_out(merged, Some(total));
        for j in 0..self.n {
            if j == merged || self.unavailable[j] {
                continue;
            }
            let updated = self.distances[j];
            match self.cache.get(j) {
                Some(nb) if nb.index == merged || nb.index == dead => {
                    if updated <= nb.distance {
                        self.cache.set(
                            j,
                            Neighbor {
                                index: merged,
                                distance: updated,
                            },
                        );
                    } else {
                        self.cache.invalidate(j);
                    }
                }
                Some(nb) if updated < nb.distance => {
                    self.cache.set(
                        j,
                        Neighbor {
                            index: merged,
                            distance: updated,
                        },
                    );
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::metric::Euclidean;
    use crate::task::{CancelFlag, NoopMonitor, TaskMonitor};
    use crate::tuple::MemoryTupleList;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn line_tuples() -> MemoryTupleList {
        MemoryTupleList::from_rows(&[vec![0.0], vec![1.0], vec![5.0], vec![6.0]]).unwrap()
    }

    fn clusterer(seed: u64) -> RnnHierarchicalClusterer<Euclidean> {
        RnnHierarchicalClusterer::new(
            HierarchicalParams::new(Euclidean).with_random_seed(seed),
        )
    }

    #[test]
    fn test_concrete_line_scenario() {
        // Tuples at [0, 1, 5, 6]: the two tight pairs merge at distance
        // 1.0 each, then their centroids (0.5 and 5.5) merge at 5.0.
        let tuples = line_tuples();
        for seed in [0, 1, 7, 99] {
            let d = clusterer(seed)
                .build_dendrogram(&tuples, &NoopMonitor)
                .unwrap();
            assert!(d.is_finished());
            assert_eq!(d.merge_distance(2).unwrap(), 1.0);
            assert_eq!(d.merge_distance(1).unwrap(), 1.0);
            assert_eq!(d.merge_distance(0).unwrap(), 5.0);

            let mut groups = d.cluster_groupings(2).unwrap();
            for g in groups.iter_mut() {
                g.sort_unstable();
            }
            groups.sort();
            assert_eq!(groups, vec![vec![0, 1], vec![2, 3]]);
        }
    }

    #[test]
    fn test_empty_input_fails_fast() {
        let tuples = MemoryTupleList::new(0, 3);
        assert_eq!(
            clusterer(1).build_dendrogram(&tuples, &NoopMonitor).unwrap_err(),
            Error::EmptyInput
        );
    }

    #[test]
    fn test_single_tuple() {
        let tuples = MemoryTupleList::from_rows(&[vec![1.0, 2.0]]).unwrap();
        let clusters = clusterer(1).cluster(&tuples, &NoopMonitor).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members(), &[0]);
        assert_eq!(clusters[0].centroid(), &[1.0, 2.0]);
    }

    #[test]
    fn test_deterministic_across_thread_counts() {
        let rows: Vec<Vec<f64>> = (0..60)
            .map(|i| {
                let x = (i as f64 * 0.73).sin() * 10.0;
                let y = (i as f64 * 1.31).cos() * 10.0;
                vec![x, y]
            })
            .collect();
        let tuples = MemoryTupleList::from_rows(&rows).unwrap();

        let mut encodings = Vec::new();
        for threads in [1usize, 4, 8] {
            let c = RnnHierarchicalClusterer::new(
                HierarchicalParams::new(Euclidean)
                    .with_random_seed(1234)
                    .with_worker_threads(threads),
            );
            let d = c.build_dendrogram(&tuples, &NoopMonitor).unwrap();
            let mut buf = Vec::new();
            d.write_to(&mut buf).unwrap();
            encodings.push(buf);
        }
        assert_eq!(encodings[0], encodings[1]);
        assert_eq!(encodings[0], encodings[2]);
    }

    #[test]
    fn test_cluster_by_coherence() {
        let tuples = line_tuples();
        let c = RnnHierarchicalClusterer::new(
            HierarchicalParams::new(Euclidean)
                .with_criterion(Criterion::Coherence(0.8))
                .with_random_seed(5),
        );
        // Merge distances [5, 1, 1] by level normalize to coherences
        // [0, 0.8, 0.8]: the root cut misses 0.8, level 1 meets it, so
        // the criterion resolves to two clusters.
        let clusters = c.cluster(&tuples, &NoopMonitor).unwrap();
        assert_eq!(clusters.len(), 2);
        let mut sizes: Vec<usize> = clusters.iter().map(Cluster::size).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![2, 2]);
    }

    #[test]
    fn test_reuse_dendrogram() {
        let tuples = line_tuples();
        let c = RnnHierarchicalClusterer::new(
            HierarchicalParams::new(Euclidean)
                .with_criterion(Criterion::Clusters(2))
                .with_random_seed(11),
        );
        let mut d = c.build_dendrogram(&tuples, &NoopMonitor).unwrap();
        assert_eq!(c.cluster_with_dendrogram(&tuples, &mut d).unwrap().len(), 2);

        // Same tree, different cut, no rebuild.
        let c4 = RnnHierarchicalClusterer::new(
            HierarchicalParams::new(Euclidean).with_criterion(Criterion::Clusters(4)),
        );
        assert_eq!(c4.cluster_with_dendrogram(&tuples, &mut d).unwrap().len(), 4);

        let wrong = MemoryTupleList::new(3, 1);
        assert!(matches!(
            c.cluster_with_dendrogram(&wrong, &mut d),
            Err(Error::DimensionMismatch { .. })
        ));

        let mut unfinished = Dendrogram::new(4).unwrap();
        assert!(matches!(
            c.cluster_with_dendrogram(&tuples, &mut unfinished),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_pre_cancelled_run() {
        let tuples = line_tuples();
        let flag = CancelFlag::new();
        flag.cancel();
        assert_eq!(
            clusterer(3).build_dendrogram(&tuples, &flag).unwrap_err(),
            Error::Cancelled
        );
    }

    #[test]
    fn test_cancel_mid_run() {
        /// Cancels after a fixed number of progress reports.
        struct CancelAfter {
            reports: AtomicUsize,
            after: usize,
        }
        impl TaskMonitor for CancelAfter {
            fn report_progress(&self, _fraction: f64) {
                self.reports.fetch_add(1, Ordering::Relaxed);
            }
            fn is_cancelled(&self) -> bool {
                self.reports.load(Ordering::Relaxed) >= self.after
            }
        }
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let tuples = MemoryTupleList::from_rows(&rows).unwrap();
        let monitor = CancelAfter {
            reports: AtomicUsize::new(0),
            after: 3,
        };
        assert_eq!(
            clusterer(0).build_dendrogram(&tuples, &monitor).unwrap_err(),
            Error::Cancelled
        );
        assert_eq!(monitor.reports.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_progress_spans_configured_range() {
        struct Record(Mutex<Vec<f64>>);
        impl TaskMonitor for Record {
            fn report_progress(&self, fraction: f64) {
                self.0.lock().unwrap().push(fraction);
            }
        }
        let tuples = line_tuples();
        let c = RnnHierarchicalClusterer::new(
            HierarchicalParams::new(Euclidean)
                .with_random_seed(2)
                .with_progress_range(0.25, 0.75),
        );
        let monitor = Record(Mutex::new(Vec::new()));
        c.build_dendrogram(&tuples, &monitor).unwrap();
        let reports = monitor.0.into_inner().unwrap();
        assert_eq!(reports.len(), 3);
        assert!(reports.windows(2).all(|w| w[0] <= w[1]));
        assert!((reports[reports.len() - 1] - 0.75).abs() < 1e-12);
        assert!(reports[0] >= 0.25);
    }

    #[test]
    fn test_merged_pairs_are_mutual_nearest_neighbors() {
        // The chain may only ever close on a reciprocal pair: at the
        // moment of every merge, each side is the other's nearest live
        // neighbor. Drive the merge state directly to check it.
        let rows: Vec<Vec<f64>> = (0..30)
            .map(|i| {
                let x = (i as f64 * 0.37).sin() * 5.0;
                let y = (i as f64 * 0.91).cos() * 5.0;
                vec![x, y]
            })
            .collect();
        let tuples = MemoryTupleList::from_rows(&rows).unwrap();
        let mut state = MergeState::new(&tuples, Euclidean, 2).unwrap();
        let mut dendrogram = Dendrogram::new(30).unwrap();
        let order: Vec<usize> = (0..30).collect();
        let mut cursor = 0;
        for _ in 0..29 {
            let start = state.next_live(&order, &mut cursor);
            let (id1, id2, distance) = state.find_reciprocal_pair(start);
            assert_eq!(state.nearest(id1).index, id2);
            assert_eq!(state.nearest(id2).index, id1);
            let merged = dendrogram.merge_nodes(id1, id2, distance).unwrap();
            state.apply_merge(merged, id1.max(id2));
        }
        assert!(dendrogram.is_finished());
    }

    #[test]
    fn test_separated_blobs_stay_separated() {
        // Three tight blobs far apart: any valid agglomeration must keep
        // them intact at the 3-cluster cut, for any seed.
        let mut rows = Vec::new();
        for (cx, cy) in [(0.0, 0.0), (100.0, 0.0), (0.0, 100.0)] {
            for i in 0..8 {
                let angle = i as f64 * 0.785;
                rows.push(vec![cx + angle.cos() * 0.5, cy + angle.sin() * 0.5]);
            }
        }
        let tuples = MemoryTupleList::from_rows(&rows).unwrap();
        for seed in [0u64, 13, 77] {
            let d = clusterer(seed)
                .build_dendrogram(&tuples, &NoopMonitor)
                .unwrap();
            let mut groups = d.cluster_groupings(3).unwrap();
            for g in groups.iter_mut() {
                g.sort_unstable();
            }
            groups.sort();
            assert_eq!(groups[0], (0..8).collect::<Vec<_>>());
            assert_eq!(groups[1], (8..16).collect::<Vec<_>>());
            assert_eq!(groups[2], (16..24).collect::<Vec<_>>());
        }
    }
}
