//! Small vector helpers shared by the clustering code.

use crate::error::{Error, Result};

use super::TupleList;

/// Arithmetic mean of the selected rows of `tuples`.
///
/// This is how cluster centroids are computed when a dendrogram is cut.
pub fn average(tuples: &dyn TupleList, members: &[usize]) -> Result<Vec<f64>> {
    if members.is_empty() {
        return Err(Error::EmptyInput);
    }
    let length = tuples.tuple_length();
    let mut sum = vec![0.0; length];
    let mut buf = vec![0.0; length];
    for &index in members {
        tuples.copy_tuple(index, &mut buf)?;
        for (s, v) in sum.iter_mut().zip(buf.iter()) {
            *s += *v;
        }
    }
    let n = members.len() as f64;
    for s in sum.iter_mut() {
        *s /= n;
    }
    Ok(sum)
}

/// Weighted mean of two vectors: `(wa·a + wb·b) / (wa + wb)`.
///
/// Used to maintain merged-node centroids incrementally, with the weights
/// being the two nodes' leaf counts.
pub fn weighted_mean(a: &[f64], wa: f64, b: &[f64], wb: f64) -> Vec<f64> {
    let total = wa + wb;
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (wa * x + wb * y) / total)
        .collect()
}

/// Euclidean distance between two equal-length slices.
#[inline]
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::MemoryTupleList;

    #[test]
    fn test_average() {
        let list =
            MemoryTupleList::from_rows(&[vec![0.0, 0.0], vec![2.0, 4.0], vec![4.0, 8.0]]).unwrap();
        assert_eq!(average(&list, &[0, 1, 2]).unwrap(), vec![2.0, 4.0]);
        assert_eq!(average(&list, &[1]).unwrap(), vec![2.0, 4.0]);
        assert!(average(&list, &[]).is_err());
    }

    #[test]
    fn test_weighted_mean() {
        // 3 parts of [0, 0], 1 part of [4, 8]
        assert_eq!(
            weighted_mean(&[0.0, 0.0], 3.0, &[4.0, 8.0], 1.0),
            vec![1.0, 2.0]
        );
    }

    #[test]
    fn test_euclidean() {
        assert_eq!(euclidean(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
    }
}
