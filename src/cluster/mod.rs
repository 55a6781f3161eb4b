//! Clustering: grouping tuples by distance.
//!
//! The algorithm provided here is reverse-nearest-neighbor (RNN)
//! agglomeration — see [`RnnHierarchicalClusterer`] — which produces a
//! [`Dendrogram`](crate::dendrogram::Dendrogram) and then cuts it by a
//! configured [`Criterion`]. The output of any cut is a set of
//! [`Cluster`]s: member row indices plus a centroid averaged from the
//! backing [`TupleList`](crate::tuple::TupleList).
//!
//! Clusters are produced fresh on every cut and never stored inside the
//! dendrogram, so one expensive build can be re-cut cheaply with
//! different parameters (or persisted and re-cut later).

mod params;
mod rnn;

pub use params::{Criterion, HierarchicalParams, Linkage};
pub use rnn::RnnHierarchicalClusterer;

/// One cluster from a dendrogram cut: member tuple indices and their
/// arithmetic-mean centroid.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    members: Vec<usize>,
    centroid: Vec<f64>,
}

impl Cluster {
    /// Build a cluster from its members and a precomputed centroid.
    pub fn new(members: Vec<usize>, centroid: Vec<f64>) -> Self {
        Self { members, centroid }
    }

    /// Member tuple row indices.
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    /// Arithmetic mean of the member tuples.
    pub fn centroid(&self) -> &[f64] {
        &self.centroid
    }

    /// Number of members.
    pub fn size(&self) -> usize {
        self.members.len()
    }
}
