//! Memory-resident tuple storage backed by an `ndarray` matrix.

use ndarray::Array2;

use crate::error::{Error, Result};

use super::TupleList;

/// A [`TupleList`] holding all tuples in a dense `Array2<f64>`.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTupleList {
    data: Array2<f64>,
}

impl MemoryTupleList {
    /// A zero-filled list of `count` tuples of length `length`.
    pub fn new(count: usize, length: usize) -> Self {
        Self {
            data: Array2::zeros((count, length)),
        }
    }

    /// Build from row vectors. All rows must be the same length; at least
    /// one row is required (an empty list has no well-defined width).
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        if rows.is_empty() {
            return Err(Error::EmptyInput);
        }
        let length = rows[0].len();
        let mut flat = Vec::with_capacity(rows.len() * length);
        for row in rows {
            if row.len() != length {
                return Err(Error::DimensionMismatch {
                    expected: length,
                    found: row.len(),
                });
            }
            flat.extend_from_slice(row);
        }
        let data = Array2::from_shape_vec((rows.len(), length), flat)
            .map_err(|e| Error::Io(e.to_string()))?;
        Ok(Self { data })
    }

    /// Wrap an existing matrix; rows become tuples.
    pub fn from_array(data: Array2<f64>) -> Self {
        Self { data }
    }

    /// Borrow the backing matrix.
    pub fn as_array(&self) -> &Array2<f64> {
        &self.data
    }

    fn check_row(&self, index: usize) -> Result<()> {
        if index >= self.data.nrows() {
            return Err(Error::IndexOutOfBounds {
                index,
                len: self.data.nrows(),
            });
        }
        Ok(())
    }
}

impl TupleList for MemoryTupleList {
    fn tuple_count(&self) -> usize {
        self.data.nrows()
    }

    fn tuple_length(&self) -> usize {
        self.data.ncols()
    }

    fn copy_tuple(&self, index: usize, out: &mut [f64]) -> Result<()> {
        self.check_row(index)?;
        if out.len() != self.data.ncols() {
            return Err(Error::DimensionMismatch {
                expected: self.data.ncols(),
                found: out.len(),
            });
        }
        for (slot, v) in out.iter_mut().zip(self.data.row(index).iter()) {
            *slot = *v;
        }
        Ok(())
    }

    fn value(&self, index: usize, col: usize) -> Result<f64> {
        self.check_row(index)?;
        if col >= self.data.ncols() {
            return Err(Error::IndexOutOfBounds {
                index: col,
                len: self.data.ncols(),
            });
        }
        Ok(self.data[[index, col]])
    }

    fn set_tuple(&mut self, index: usize, values: &[f64]) -> Result<()> {
        self.check_row(index)?;
        if values.len() != self.data.ncols() {
            return Err(Error::DimensionMismatch {
                expected: self.data.ncols(),
                found: values.len(),
            });
        }
        for (col, v) in values.iter().enumerate() {
            self.data[[index, col]] = *v;
        }
        Ok(())
    }
}
