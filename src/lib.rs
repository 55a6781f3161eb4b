//! # clade
//!
//! Agglomerative clustering for numeric tuples.
//!
//! The pipeline: store rows in a [`TupleList`], build a full merge tree
//! with [`RnnHierarchicalClusterer`] (reverse-nearest-neighbor
//! agglomeration), then cut the resulting [`Dendrogram`] — by cluster
//! count, by coherence target, or by a BIC sweep — as many times as
//! needed. Building is the expensive step; every cut is cheap, and a
//! dendrogram can be persisted and re-cut later without re-clustering.
//!
//! [`spatial::TupleKdTree`] provides KD-tree nearest-neighbor and range
//! queries over the same tuple rows.
//!
//! ```
//! use clade::cluster::{Criterion, HierarchicalParams, RnnHierarchicalClusterer};
//! use clade::task::NoopMonitor;
//! use clade::tuple::MemoryTupleList;
//!
//! let points = MemoryTupleList::from_rows(&[
//!     vec![0.0, 0.0],
//!     vec![0.5, 0.0],
//!     vec![10.0, 10.0],
//!     vec![10.5, 10.0],
//! ])?;
//! let params = HierarchicalParams::default()
//!     .with_criterion(Criterion::Clusters(2))
//!     .with_random_seed(42);
//! let clusterer = RnnHierarchicalClusterer::new(params);
//! let clusters = clusterer.cluster(&points, &NoopMonitor)?;
//! assert_eq!(clusters.len(), 2);
//! # Ok::<(), clade::Error>(())
//! ```

pub mod cluster;
pub mod dendrogram;
/// Error types used across `clade`.
pub mod error;
pub mod metric;
pub mod spatial;
pub mod task;
pub mod tuple;

pub use cluster::{Cluster, Criterion, HierarchicalParams, Linkage, RnnHierarchicalClusterer};
pub use dendrogram::Dendrogram;
pub use error::{Error, Result};
pub use metric::{Cosine, DistanceMetric, Euclidean, Manhattan};
pub use spatial::TupleKdTree;
pub use task::{CancelFlag, NoopMonitor, TaskMonitor};
pub use tuple::{MemoryTupleList, TupleList};
