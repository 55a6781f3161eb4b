//! Distance metrics over equal-length numeric vectors.
//!
//! A [`DistanceMetric`] is symmetric, non-negative, and (by convention,
//! not enforced) zero only for equal inputs. Metrics are stateless value
//! objects: the `Clone + Send + Sync` supertraits exist so that every
//! worker thread in a parallel distance fan-out can hold its own copy
//! without synchronization. Keep implementations free of per-call mutable
//! state.
//!
//! # Choosing a metric
//!
//! | Metric | Formula | Notes |
//! |--------|---------|-------|
//! | [`Euclidean`] | √Σ(aᵢ−bᵢ)² | The default; exact for centroid linkage |
//! | [`Manhattan`] | Σ\|aᵢ−bᵢ\| | Less outlier-sensitive |
//! | [`Cosine`] | 1 − cos(a,b) | Direction only; common for embeddings |
//!
//! The RNN clusterer accepts any of these (or a caller-supplied impl), but
//! its incremental centroid-distance update is only linkage-exact for
//! Euclidean and cosine distance; see
//! [`RnnHierarchicalClusterer`](crate::cluster::RnnHierarchicalClusterer).

/// A symmetric, non-negative distance over two equal-length vectors.
///
/// Callers guarantee `a.len() == b.len()`; implementations may ignore any
/// excess in the longer slice rather than validate.
pub trait DistanceMetric: Clone + Send + Sync {
    /// Distance between `a` and `b`.
    fn distance(&self, a: &[f64], b: &[f64]) -> f64;
}

/// Euclidean (L2) distance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Euclidean;

impl DistanceMetric for Euclidean {
    #[inline]
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| {
                let d = x - y;
                d * d
            })
            .sum::<f64>()
            .sqrt()
    }
}

/// Manhattan (L1) distance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Manhattan;

impl DistanceMetric for Manhattan {
    #[inline]
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
    }
}

/// Cosine distance: `1 - cos(a, b)`, clamped at zero.
///
/// A zero-norm vector has undefined direction; it compares at distance
/// 1.0 (as if orthogonal) to everything except another zero-norm vector,
/// which compares at distance 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cosine;

impl DistanceMetric for Cosine {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        let mut dot = 0.0;
        let mut na = 0.0;
        let mut nb = 0.0;
        for (x, y) in a.iter().zip(b.iter()) {
            dot += x * y;
            na += x * x;
            nb += y * y;
        }
        if na == 0.0 && nb == 0.0 {
            return 0.0;
        }
        if na == 0.0 || nb == 0.0 {
            return 1.0;
        }
        (1.0 - dot / (na.sqrt() * nb.sqrt())).max(0.0)
    }
}
