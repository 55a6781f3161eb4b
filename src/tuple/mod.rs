//! Tuple storage: fixed-length numeric vectors addressed by row index.
//!
//! A *tuple* is one row of a rectangular `f64` matrix — the unit every
//! algorithm in this crate clusters, indexes, and averages. The
//! [`TupleList`] trait is the storage seam: algorithms only ever see the
//! trait, so the backing representation can range from a memory-resident
//! matrix ([`MemoryTupleList`]) to disk-resident or memory-mapped stores
//! supplied by downstream crates.
//!
//! Shape is fixed at construction: `tuple_count()` rows of
//! `tuple_length()` columns. Out-of-range access fails with
//! [`Error::IndexOutOfBounds`](crate::Error::IndexOutOfBounds) before any
//! mutation.

mod math;
mod memory;

pub use math::{average, euclidean, weighted_mean};
pub use memory::MemoryTupleList;

use crate::error::{Error, Result};

/// Random-access storage for equal-length `f64` tuples.
///
/// Implementations must be safe to *read* from multiple threads
/// (`Send + Sync`); mutation (`set_tuple`) is single-threaded like the
/// rest of the crate and takes `&mut self`.
pub trait TupleList: Send + Sync {
    /// Number of tuples (rows).
    fn tuple_count(&self) -> usize;

    /// Length of every tuple (columns).
    fn tuple_length(&self) -> usize;

    /// Copy tuple `index` into `out`, which must be `tuple_length()` long.
    fn copy_tuple(&self, index: usize, out: &mut [f64]) -> Result<()>;

    /// Single value at (`index`, `col`).
    fn value(&self, index: usize, col: usize) -> Result<f64>;

    /// Overwrite tuple `index` with `values` (length must match).
    fn set_tuple(&mut self, index: usize, values: &[f64]) -> Result<()>;

    /// Tuple `index` as a fresh vector.
    fn tuple(&self, index: usize) -> Result<Vec<f64>> {
        let mut buf = vec![0.0; self.tuple_length()];
        self.copy_tuple(index, &mut buf)?;
        Ok(buf)
    }

    /// Column `col` across all tuples as a fresh vector.
    fn column(&self, col: usize) -> Result<Vec<f64>> {
        if col >= self.tuple_length() {
            return Err(Error::IndexOutOfBounds {
                index: col,
                len: self.tuple_length(),
            });
        }
        (0..self.tuple_count()).map(|i| self.value(i, col)).collect()
    }
}
