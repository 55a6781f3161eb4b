//! Configuration for hierarchical clustering runs.

use crate::metric::{DistanceMetric, Euclidean};

/// How to choose the dendrogram cut once the tree is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Criterion {
    /// Cut into exactly this many clusters.
    Clusters(usize),
    /// Cut at the smallest cluster count whose coherence meets this
    /// target in `[0, 1]`.
    Coherence(f64),
}

/// Linkage label carried for reporting and for algorithms that honor it.
///
/// The RNN clusterer's behavior is fixed by its centroid-based weighted
/// update regardless of this field; it is recorded but inert there. Kept
/// for parity with implementations whose cluster-to-cluster distance rule
/// is actually switchable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    /// Minimum pairwise distance between clusters.
    Single,
    /// Maximum pairwise distance between clusters.
    Complete,
    /// Mean pairwise distance between clusters.
    Mean,
}

/// Parameters for a hierarchical clustering run.
///
/// Builder-style; every setting has a default:
///
/// ```
/// use clade::cluster::{Criterion, HierarchicalParams};
/// use clade::metric::Euclidean;
///
/// let params = HierarchicalParams::new(Euclidean)
///     .with_criterion(Criterion::Clusters(3))
///     .with_random_seed(42)
///     .with_worker_threads(4);
/// ```
#[derive(Debug, Clone)]
pub struct HierarchicalParams<M: DistanceMetric = Euclidean> {
    pub(crate) criterion: Criterion,
    pub(crate) linkage: Linkage,
    pub(crate) metric: M,
    pub(crate) min_coherence_threshold: f64,
    /// NaN means "use the observed maximum merge distance".
    pub(crate) max_coherence_threshold: f64,
    /// None means "use available hardware parallelism".
    pub(crate) worker_threads: Option<usize>,
    pub(crate) random_seed: Option<u64>,
    pub(crate) progress_range: (f64, f64),
}

impl Default for HierarchicalParams<Euclidean> {
    fn default() -> Self {
        Self::new(Euclidean)
    }
}

impl<M: DistanceMetric> HierarchicalParams<M> {
    /// Parameters with the given metric and defaults everywhere else:
    /// one cluster, mean linkage label, observed-max coherence
    /// normalization, hardware-sized worker pool, unseeded RNG.
    pub fn new(metric: M) -> Self {
        Self {
            criterion: Criterion::Clusters(1),
            linkage: Linkage::Mean,
            metric,
            min_coherence_threshold: 0.0,
            max_coherence_threshold: f64::NAN,
            worker_threads: None,
            random_seed: None,
            progress_range: (0.0, 1.0),
        }
    }

    /// Set the cut criterion.
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set the informational linkage label.
    pub fn with_linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = linkage;
        self
    }

    /// Lower bound for coherence normalization (default 0).
    pub fn with_min_coherence_threshold(mut self, threshold: f64) -> Self {
        self.min_coherence_threshold = threshold;
        self
    }

    /// Upper bound for coherence normalization; NaN (the default) uses
    /// the observed maximum merge distance.
    pub fn with_max_coherence_threshold(mut self, threshold: f64) -> Self {
        self.max_coherence_threshold = threshold;
        self
    }

    /// Worker threads for the distance fan-out (minimum 1). Default is
    /// the available hardware parallelism.
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads.max(1));
        self
    }

    /// Seed for the merge-order shuffle, for reproducible runs.
    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Progress is reported linearly between `begin` and `end` (both in
    /// `[0, 1]`), for embedding this run inside a larger task.
    pub fn with_progress_range(mut self, begin: f64, end: f64) -> Self {
        self.progress_range = (begin, end);
        self
    }

    pub(crate) fn resolved_worker_threads(&self) -> usize {
        self.worker_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let p = HierarchicalParams::default();
        assert_eq!(p.criterion, Criterion::Clusters(1));
        assert!(p.max_coherence_threshold.is_nan());
        assert!(p.random_seed.is_none());
        assert!(p.resolved_worker_threads() >= 1);
    }

    #[test]
    fn test_worker_threads_clamped() {
        let p = HierarchicalParams::default().with_worker_threads(0);
        assert_eq!(p.resolved_worker_threads(), 1);
    }
}
