//! Versioned binary persistence for [`Dendrogram`].
//!
//! Building a dendrogram is the expensive part of a hierarchical run;
//! cutting it is cheap. Persisting the finished (or even partial) tree
//! lets callers re-cut with different parameters without re-clustering.
//!
//! The record is a format-version tag followed by every parallel array
//! (`node_ids`, parent/left/right links with absent links encoded as -1,
//! sizes, the ID reverse lookup, merge distances, cached coherences) and
//! the `leaf_count`/`current_level` pair. A reader rejects unknown
//! version tags with [`Error::UnsupportedVersion`]; I/O and decode
//! failures surface as [`Error::Io`], which callers should treat as an
//! ordinary recoverable outcome (recompute instead).

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::Dendrogram;

/// Newest record version this build reads and writes.
pub const FORMAT_VERSION: u32 = 1;

/// Absent parent/child link on the wire.
const NO_LINK: i64 = -1;

#[derive(Serialize, Deserialize)]
struct DendrogramRecord {
    node_ids: Vec<u64>,
    parent_index: Vec<i64>,
    left_index: Vec<i64>,
    right_index: Vec<i64>,
    sizes: Vec<u64>,
    index_for_id: Vec<u64>,
    merge_distances: Vec<f64>,
    coherences: Vec<f64>,
    leaf_count: u64,
    current_level: u64,
}

fn encode_links(links: &[Option<usize>]) -> Vec<i64> {
    links
        .iter()
        .map(|l| l.map_or(NO_LINK, |v| v as i64))
        .collect()
}

fn decode_links(links: &[i64], total: usize) -> Result<Vec<Option<usize>>> {
    links
        .iter()
        .map(|&l| {
            if l == NO_LINK {
                Ok(None)
            } else if l >= 0 && (l as usize) < total {
                Ok(Some(l as usize))
            } else {
                Err(Error::Io(format!("link index {l} out of range")))
            }
        })
        .collect()
}

impl Dendrogram {
    /// Serialize into `writer` as a versioned binary record.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        bincode::serialize_into(&mut writer, &FORMAT_VERSION)
            .map_err(|e| Error::Io(e.to_string()))?;
        let record = DendrogramRecord {
            node_ids: self.node_ids.iter().map(|&v| v as u64).collect(),
            parent_index: encode_links(&self.parent_index),
            left_index: encode_links(&self.left_index),
            right_index: encode_links(&self.right_index),
            sizes: self.sizes.iter().map(|&v| v as u64).collect(),
            index_for_id: self.index_for_id.iter().map(|&v| v as u64).collect(),
            merge_distances: self.merge_distances.clone(),
            coherences: self.coherences.clone(),
            leaf_count: self.leaf_count as u64,
            current_level: self.current_level as u64,
        };
        bincode::serialize_into(&mut writer, &record).map_err(|e| Error::Io(e.to_string()))
    }

    /// Deserialize a dendrogram previously written by
    /// [`write_to`](Self::write_to), validating the version tag and the
    /// record's internal consistency.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let version: u32 =
            bincode::deserialize_from(&mut reader).map_err(|e| Error::Io(e.to_string()))?;
        if version != FORMAT_VERSION {
            return Err(Error::UnsupportedVersion {
                found: version,
                supported: FORMAT_VERSION,
            });
        }
        let record: DendrogramRecord =
            bincode::deserialize_from(&mut reader).map_err(|e| Error::Io(e.to_string()))?;

        let leaf_count = record.leaf_count as usize;
        if leaf_count == 0 {
            return Err(Error::Io("record has zero leaves".to_string()));
        }
        let total = 2 * leaf_count - 1;
        let current_level = record.current_level as usize;
        let consistent = record.node_ids.len() == total
            && record.parent_index.len() == total
            && record.left_index.len() == total
            && record.right_index.len() == total
            && record.sizes.len() == total
            && record.index_for_id.len() == leaf_count
            && record.merge_distances.len() == leaf_count - 1
            && record.coherences.len() == leaf_count - 1
            && current_level <= leaf_count - 1;
        if !consistent {
            return Err(Error::Io("record arrays have inconsistent lengths".to_string()));
        }

        Ok(Dendrogram {
            leaf_count,
            current_level,
            node_ids: record.node_ids.iter().map(|&v| v as usize).collect(),
            parent_index: decode_links(&record.parent_index, total)?,
            left_index: decode_links(&record.left_index, total)?,
            right_index: decode_links(&record.right_index, total)?,
            sizes: record.sizes.iter().map(|&v| v as usize).collect(),
            merge_distances: record.merge_distances,
            coherences: record.coherences,
            coherences_stale: true,
            min_coherence_threshold: 0.0,
            max_coherence_threshold: f64::NAN,
            index_for_id: record.index_for_id.iter().map(|&v| v as usize).collect(),
        })
    }

    /// Write to a file path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        self.write_to(BufWriter::new(file))
    }

    /// Read from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::read_from(BufReader::new(file))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> Dendrogram {
        let mut d = Dendrogram::new(4).unwrap();
        d.merge_nodes(0, 1, 1.0).unwrap();
        d.merge_nodes(2, 3, 1.5).unwrap();
        d.merge_nodes(0, 2, 5.0).unwrap();
        d
    }

    #[test]
    fn test_round_trip_finished() {
        let d = sample();
        let mut buf = Vec::new();
        d.write_to(&mut buf).unwrap();
        let mut restored = Dendrogram::read_from(buf.as_slice()).unwrap();

        assert_eq!(restored.leaf_count(), 4);
        assert!(restored.is_finished());
        assert_eq!(restored.merge_distance(0).unwrap(), 5.0);
        assert_eq!(restored.merge_distance(2).unwrap(), 1.0);
        assert_eq!(restored.ordered_leaf_ids(0).unwrap(), vec![0, 1, 2, 3]);
        let mut groups = restored.cluster_groupings(2).unwrap();
        for g in groups.iter_mut() {
            g.sort_unstable();
        }
        groups.sort();
        assert_eq!(groups, vec![vec![0, 1], vec![2, 3]]);
        // Distances [5, 1.5, 1] normalize to coherences [0, 0.7, 0.8].
        assert_eq!(restored.clusters_with_coherence_exceeding(0.7).unwrap(), 2);
        assert_eq!(restored.clusters_with_coherence_exceeding(1.0).unwrap(), 4);
    }

    #[test]
    fn test_round_trip_unfinished() {
        let mut d = Dendrogram::new(4).unwrap();
        d.merge_nodes(0, 3, 1.0).unwrap();
        let mut buf = Vec::new();
        d.write_to(&mut buf).unwrap();
        let mut restored = Dendrogram::read_from(buf.as_slice()).unwrap();

        assert_eq!(restored.merges_done(), 1);
        assert!(!restored.is_finished());
        // The restored tree keeps accepting merges where the original
        // left off.
        restored.merge_nodes(0, 1, 2.0).unwrap();
        restored.merge_nodes(0, 2, 3.0).unwrap();
        assert!(restored.is_finished());
    }

    #[test]
    fn test_rejects_unknown_version() {
        let d = sample();
        let mut buf = Vec::new();
        d.write_to(&mut buf).unwrap();
        // The version tag is the first encoded field; corrupt it.
        buf[0] = 99;
        let err = Dendrogram::read_from(buf.as_slice()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion { found: 99, .. }));
    }

    #[test]
    fn test_truncated_record_is_io_error() {
        let d = sample();
        let mut buf = Vec::new();
        d.write_to(&mut buf).unwrap();
        buf.truncate(buf.len() / 2);
        assert!(matches!(
            Dendrogram::read_from(buf.as_slice()),
            Err(Error::Io(_))
        ));
    }
}
