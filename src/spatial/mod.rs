//! Spatial indexing over tuple rows.
//!
//! Currently one structure: [`TupleKdTree`], a KD-tree keyed on the rows
//! of a [`TupleList`](crate::tuple::TupleList). It answers the
//! nearest-neighbor and range queries the rest of the library (and its
//! callers) lean on without O(n) scans.

mod kdtree;

pub use kdtree::TupleKdTree;
