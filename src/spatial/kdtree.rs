//! KD-tree over the rows of a [`TupleList`].
//!
//! The tree stores tuple *row indices*, never coordinates: every
//! comparison reads the backing list, so the index stays valid for any
//! [`TupleList`] implementation and adds only three `usize` words per
//! node. Nodes live in parallel arena arrays (`nodes`, `lefts`,
//! `rights`) with a `NIL` sentinel instead of boxed links, the same
//! struct-of-arrays layout the dendrogram uses.
//!
//! Splitting follows the classic Bentley scheme: the discriminating
//! dimension cycles with depth (`depth % tuple_length`), and values equal
//! to a node's coordinate descend left. [`for_tuple_list_balanced`]
//! bulk-loads by recursive median splitting, using a median-of-three
//! quickselect over an index permutation so the tuples themselves are
//! never moved or copied.
//!
//! Nearest-neighbor and range queries walk the tree depth-first, keeping
//! the hyper-rectangle of the current subtree up to date by mutating one
//! bound on the way down and restoring it on the way back up. A subtree
//! is pruned when the rectangle's closest point is already farther than
//! the worst candidate retained. Distances are Euclidean; equal distances
//! are broken toward the lower tuple index so results are deterministic.
//!
//! [`for_tuple_list_balanced`]: TupleKdTree::for_tuple_list_balanced
//!
//! References:
//! - Bentley, "Multidimensional Binary Search Trees Used for Associative
//!   Searching" (1975)
//! - Friedman, Bentley & Finkel, "An Algorithm for Finding Best Matches
//!   in Logarithmic Expected Time" (1977)

use crate::error::{Error, Result};
use crate::tuple::{self, TupleList};

/// Absent child/slot marker in the arena arrays.
const NIL: usize = usize::MAX;

/// KD-tree indexing the rows of a borrowed [`TupleList`].
///
/// The tree holds a shared borrow for its whole lifetime, so the list
/// cannot be mutated out from under it.
///
/// ```
/// use clade::spatial::TupleKdTree;
/// use clade::tuple::MemoryTupleList;
///
/// let points = MemoryTupleList::from_rows(&[
///     vec![0.0, 0.0],
///     vec![5.0, 5.0],
///     vec![0.5, 0.0],
/// ])?;
/// let tree = TupleKdTree::for_tuple_list_balanced(&points)?;
/// assert_eq!(tree.nearest_neighbor(0)?, Some(2));
/// # Ok::<(), clade::Error>(())
/// ```
pub struct TupleKdTree<'a> {
    tuples: &'a dyn TupleList,
    /// Tuple row index stored at each arena slot.
    nodes: Vec<usize>,
    lefts: Vec<usize>,
    rights: Vec<usize>,
}

impl<'a> TupleKdTree<'a> {
    /// An empty tree over `tuples`. Fails if tuples have zero length,
    /// since there would be no dimension to discriminate on.
    pub fn new(tuples: &'a dyn TupleList) -> Result<Self> {
        if tuples.tuple_length() == 0 {
            return Err(Error::InvalidParameter {
                name: "tuples",
                message: "tuple length must be positive",
            });
        }
        Ok(Self {
            tuples,
            nodes: Vec::new(),
            lefts: Vec::new(),
            rights: Vec::new(),
        })
    }

    /// Index every row of `tuples` in row order.
    ///
    /// Insertion order shapes the tree; pre-sorted data degenerates it
    /// into a linked list. Prefer [`for_tuple_list_balanced`] unless the
    /// input order is known to be unbiased.
    ///
    /// [`for_tuple_list_balanced`]: Self::for_tuple_list_balanced
    pub fn for_tuple_list(tuples: &'a dyn TupleList) -> Result<Self> {
        let mut tree = Self::new(tuples)?;
        for index in 0..tuples.tuple_count() {
            tree.insert(index)?;
        }
        Ok(tree)
    }

    /// Index every row of `tuples`, balanced by recursive median splits.
    ///
    /// At each level the row indices are partitioned around the median of
    /// the current discriminating dimension (quickselect on an index
    /// permutation, median-of-three pivots), the median is inserted, and
    /// the halves recurse. The result is depth `O(log n)` regardless of
    /// input order.
    pub fn for_tuple_list_balanced(tuples: &'a dyn TupleList) -> Result<Self> {
        let mut tree = Self::new(tuples)?;
        let mut indices: Vec<usize> = (0..tuples.tuple_count()).collect();
        tree.build_balanced(&mut indices, 0)?;
        Ok(tree)
    }

    /// Number of indexed tuples.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree indexes no tuples.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert tuple row `index`. Inserting an index already in the tree
    /// is a no-op.
    pub fn insert(&mut self, index: usize) -> Result<()> {
        let count = self.tuples.tuple_count();
        if index >= count {
            return Err(Error::IndexOutOfBounds { index, len: count });
        }
        if self.nodes.is_empty() {
            self.push_node(index);
            return Ok(());
        }
        let length = self.tuples.tuple_length();
        let mut slot = 0;
        let mut depth = 0;
        loop {
            let node = self.nodes[slot];
            if node == index {
                return Ok(());
            }
            let dim = depth % length;
            let left = self.tuples.value(index, dim)? <= self.tuples.value(node, dim)?;
            let child = if left { self.lefts[slot] } else { self.rights[slot] };
            if child == NIL {
                let new_slot = self.push_node(index);
                if left {
                    self.lefts[slot] = new_slot;
                } else {
                    self.rights[slot] = new_slot;
                }
                return Ok(());
            }
            slot = child;
            depth += 1;
        }
    }

    /// Whether tuple row `index` has been inserted.
    pub fn contains(&self, index: usize) -> Result<bool> {
        let count = self.tuples.tuple_count();
        if index >= count {
            return Err(Error::IndexOutOfBounds { index, len: count });
        }
        Ok(self.slot_of(index)?.is_some())
    }

    /// Tuple row index whose coordinates equal `coords` exactly, if any.
    ///
    /// With duplicate coordinate vectors in the list, the match closest
    /// to the root wins.
    pub fn search(&self, coords: &[f64]) -> Result<Option<usize>> {
        self.check_coords(coords)?;
        let length = self.tuples.tuple_length();
        let mut buf = vec![0.0; length];
        let mut slot = if self.nodes.is_empty() { NIL } else { 0 };
        let mut depth = 0;
        while slot != NIL {
            let node = self.nodes[slot];
            self.tuples.copy_tuple(node, &mut buf)?;
            if buf == coords {
                return Ok(Some(node));
            }
            let dim = depth % length;
            slot = if coords[dim] <= buf[dim] {
                self.lefts[slot]
            } else {
                self.rights[slot]
            };
            depth += 1;
        }
        Ok(None)
    }

    /// The `k` indexed tuples nearest to `coords`, closest first.
    ///
    /// Returns fewer than `k` indices when the tree holds fewer tuples.
    pub fn nearest(&self, coords: &[f64], k: usize) -> Result<Vec<usize>> {
        self.check_coords(coords)?;
        self.run_nearest(coords, k, None)
    }

    /// The `k` indexed tuples nearest to tuple row `index`, excluding
    /// the row itself.
    pub fn nearest_to(&self, index: usize, k: usize) -> Result<Vec<usize>> {
        let target = self.tuples.tuple(index)?;
        self.run_nearest(&target, k, Some(index))
    }

    /// The single nearest indexed tuple to tuple row `index`, excluding
    /// the row itself. `None` when nothing else is indexed.
    pub fn nearest_neighbor(&self, index: usize) -> Result<Option<usize>> {
        Ok(self.nearest_to(index, 1)?.into_iter().next())
    }

    /// All indexed tuples within `max_distance` of `coords`, closest
    /// first.
    pub fn close_to(&self, coords: &[f64], max_distance: f64) -> Result<Vec<usize>> {
        self.check_coords(coords)?;
        self.run_close_to(coords, max_distance, None)
    }

    /// All indexed tuples within `max_distance` of tuple row `index`,
    /// excluding the row itself, closest first.
    pub fn close_to_index(&self, index: usize, max_distance: f64) -> Result<Vec<usize>> {
        let target = self.tuples.tuple(index)?;
        self.run_close_to(&target, max_distance, Some(index))
    }

    /// All indexed tuples inside the axis-aligned rectangle
    /// `[min, max]` (bounds inclusive), in ascending index order.
    pub fn inside(&self, min: &[f64], max: &[f64]) -> Result<Vec<usize>> {
        self.check_coords(min)?;
        self.check_coords(max)?;
        let mut hits = Vec::new();
        let mut buf = vec![0.0; self.tuples.tuple_length()];
        if !self.nodes.is_empty() {
            self.collect_inside(0, 0, min, max, &mut buf, &mut hits)?;
        }
        hits.sort_unstable();
        Ok(hits)
    }

    /// Left-to-right descendant-count ratio at the node holding tuple
    /// row `index`, as a balance diagnostic.
    ///
    /// Magnitude is at least 1: positive `left/right` when left-heavy,
    /// negative `right/left` when right-heavy. One empty side yields
    /// `±inf`; a leaf yields NaN.
    pub fn balance_factor(&self, index: usize) -> Result<f64> {
        let slot = self.slot_of(index)?.ok_or(Error::InvalidParameter {
            name: "index",
            message: "tuple is not in the tree",
        })?;
        let left = self.subtree_size(self.lefts[slot]) as f64;
        let right = self.subtree_size(self.rights[slot]) as f64;
        Ok(if left == 0.0 && right == 0.0 {
            f64::NAN
        } else if right == 0.0 {
            f64::INFINITY
        } else if left == 0.0 {
            f64::NEG_INFINITY
        } else if left >= right {
            left / right
        } else {
            -(right / left)
        })
    }

    fn push_node(&mut self, index: usize) -> usize {
        self.nodes.push(index);
        self.lefts.push(NIL);
        self.rights.push(NIL);
        self.nodes.len() - 1
    }

    fn check_coords(&self, coords: &[f64]) -> Result<()> {
        let length = self.tuples.tuple_length();
        if coords.len() != length {
            return Err(Error::DimensionMismatch {
                expected: length,
                found: coords.len(),
            });
        }
        Ok(())
    }

    /// Arena slot holding tuple `index`, found by replaying its
    /// insertion path. Placement is a pure function of coordinates, so
    /// the replay visits the node if it was ever inserted.
    fn slot_of(&self, index: usize) -> Result<Option<usize>> {
        let length = self.tuples.tuple_length();
        let mut slot = if self.nodes.is_empty() { NIL } else { 0 };
        let mut depth = 0;
        while slot != NIL {
            let node = self.nodes[slot];
            if node == index {
                return Ok(Some(slot));
            }
            let dim = depth % length;
            slot = if self.tuples.value(index, dim)? <= self.tuples.value(node, dim)? {
                self.lefts[slot]
            } else {
                self.rights[slot]
            };
            depth += 1;
        }
        Ok(None)
    }

    fn subtree_size(&self, root: usize) -> usize {
        let mut count = 0;
        let mut stack = vec![root];
        while let Some(slot) = stack.pop() {
            if slot == NIL {
                continue;
            }
            count += 1;
            stack.push(self.lefts[slot]);
            stack.push(self.rights[slot]);
        }
        count
    }

    fn build_balanced(&mut self, indices: &mut [usize], depth: usize) -> Result<()> {
        if indices.is_empty() {
            return Ok(());
        }
        let dim = depth % self.tuples.tuple_length();
        let mid = indices.len() / 2;
        self.select_nth(indices, mid, dim)?;
        self.insert(indices[mid])?;
        let (lower, rest) = indices.split_at_mut(mid);
        self.build_balanced(lower, depth + 1)?;
        self.build_balanced(&mut rest[1..], depth + 1)?;
        Ok(())
    }

    /// Quickselect: place the `nth`-smallest element (by coordinate
    /// `dim`) at position `nth` of the index permutation.
    fn select_nth(&self, indices: &mut [usize], nth: usize, dim: usize) -> Result<()> {
        let mut lo = 0;
        let mut hi = indices.len();
        while hi - lo > 1 {
            let p = self.partition(indices, lo, hi, dim)?;
            if nth < p {
                hi = p;
            } else if nth > p {
                lo = p + 1;
            } else {
                break;
            }
        }
        Ok(())
    }

    fn partition(&self, indices: &mut [usize], lo: usize, hi: usize, dim: usize) -> Result<usize> {
        if hi - lo >= 3 {
            let mid = lo + (hi - lo) / 2;
            let a = self.tuples.value(indices[lo], dim)?;
            let b = self.tuples.value(indices[mid], dim)?;
            let c = self.tuples.value(indices[hi - 1], dim)?;
            let median_at = if (a <= b) == (b <= c) {
                mid
            } else if (b <= a) == (a <= c) {
                lo
            } else {
                hi - 1
            };
            indices.swap(median_at, hi - 1);
        }
        let pivot = self.tuples.value(indices[hi - 1], dim)?;
        let mut store = lo;
        for i in lo..hi - 1 {
            if self.tuples.value(indices[i], dim)? < pivot {
                indices.swap(i, store);
                store += 1;
            }
        }
        indices.swap(store, hi - 1);
        Ok(store)
    }

    fn run_nearest(&self, target: &[f64], k: usize, exclude: Option<usize>) -> Result<Vec<usize>> {
        if k == 0 || self.nodes.is_empty() {
            return Ok(Vec::new());
        }
        let length = self.tuples.tuple_length();
        let mut query = NearestQuery {
            exclude,
            buf: vec![0.0; length],
            rect: HyperRect::unbounded(length),
            best: NearestList::with_capacity(k),
        };
        self.collect_nearest(0, 0, target, &mut query)?;
        Ok(query.best.into_indices())
    }

    fn collect_nearest(
        &self,
        slot: usize,
        depth: usize,
        target: &[f64],
        query: &mut NearestQuery,
    ) -> Result<()> {
        let node = self.nodes[slot];
        if query.exclude != Some(node) {
            self.tuples.copy_tuple(node, &mut query.buf)?;
            query.best.offer(tuple::euclidean(target, &query.buf), node);
        }
        let dim = depth % self.tuples.tuple_length();
        let node_coord = self.tuples.value(node, dim)?;
        let left_first = target[dim] <= node_coord;
        // Near subtree unconditionally, far subtree only if its
        // rectangle can still beat the worst retained candidate. `<=`
        // because an equal distance at a lower index still displaces.
        for (side_is_left, prune) in [(left_first, false), (!left_first, true)] {
            let child = if side_is_left {
                self.lefts[slot]
            } else {
                self.rights[slot]
            };
            if child == NIL {
                continue;
            }
            let saved = if side_is_left {
                std::mem::replace(&mut query.rect.max[dim], node_coord)
            } else {
                std::mem::replace(&mut query.rect.min[dim], node_coord)
            };
            if !prune || query.rect.min_distance(target) <= query.best.worst_distance() {
                self.collect_nearest(child, depth + 1, target, query)?;
            }
            if side_is_left {
                query.rect.max[dim] = saved;
            } else {
                query.rect.min[dim] = saved;
            }
        }
        Ok(())
    }

    fn run_close_to(
        &self,
        target: &[f64],
        max_distance: f64,
        exclude: Option<usize>,
    ) -> Result<Vec<usize>> {
        let mut hits: Vec<(f64, usize)> = Vec::new();
        let length = self.tuples.tuple_length();
        let mut rect = HyperRect::unbounded(length);
        let mut buf = vec![0.0; length];
        if !self.nodes.is_empty() {
            self.collect_close(0, 0, target, max_distance, exclude, &mut rect, &mut buf, &mut hits)?;
        }
        hits.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        Ok(hits.into_iter().map(|(_, index)| index).collect())
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_close(
        &self,
        slot: usize,
        depth: usize,
        target: &[f64],
        max_distance: f64,
        exclude: Option<usize>,
        rect: &mut HyperRect,
        buf: &mut [f64],
        hits: &mut Vec<(f64, usize)>,
    ) -> Result<()> {
        let node = self.nodes[slot];
        if exclude != Some(node) {
            self.tuples.copy_tuple(node, buf)?;
            let distance = tuple::euclidean(target, buf);
            if distance <= max_distance {
                hits.push((distance, node));
            }
        }
        let dim = depth % self.tuples.tuple_length();
        let node_coord = self.tuples.value(node, dim)?;
        for side_is_left in [true, false] {
            let child = if side_is_left {
                self.lefts[slot]
            } else {
                self.rights[slot]
            };
            if child == NIL {
                continue;
            }
            let saved = if side_is_left {
                std::mem::replace(&mut rect.max[dim], node_coord)
            } else {
                std::mem::replace(&mut rect.min[dim], node_coord)
            };
            if rect.min_distance(target) <= max_distance {
                self.collect_close(
                    child,
                    depth + 1,
                    target,
                    max_distance,
                    exclude,
                    rect,
                    buf,
                    hits,
                )?;
            }
            if side_is_left {
                rect.max[dim] = saved;
            } else {
                rect.min[dim] = saved;
            }
        }
        Ok(())
    }

    fn collect_inside(
        &self,
        slot: usize,
        depth: usize,
        min: &[f64],
        max: &[f64],
        buf: &mut [f64],
        hits: &mut Vec<usize>,
    ) -> Result<()> {
        let node = self.nodes[slot];
        self.tuples.copy_tuple(node, buf)?;
        let within = buf
            .iter()
            .zip(min.iter().zip(max.iter()))
            .all(|(v, (lo, hi))| *lo <= *v && *v <= *hi);
        if within {
            hits.push(node);
        }
        let dim = depth % self.tuples.tuple_length();
        let node_coord = buf[dim];
        // Left subtree holds coords <= node_coord, right holds strictly
        // greater ones.
        if min[dim] <= node_coord && self.lefts[slot] != NIL {
            self.collect_inside(self.lefts[slot], depth + 1, min, max, buf, hits)?;
        }
        if max[dim] > node_coord && self.rights[slot] != NIL {
            self.collect_inside(self.rights[slot], depth + 1, min, max, buf, hits)?;
        }
        Ok(())
    }
}

struct NearestQuery {
    exclude: Option<usize>,
    buf: Vec<f64>,
    rect: HyperRect,
    best: NearestList,
}

/// Axis-aligned bounding box of the subtree under inspection, mutated
/// on the way down a branch and restored on the way back up.
struct HyperRect {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl HyperRect {
    fn unbounded(length: usize) -> Self {
        Self {
            min: vec![f64::NEG_INFINITY; length],
            max: vec![f64::INFINITY; length],
        }
    }

    /// Euclidean distance from `point` to the closest point of the
    /// rectangle; zero when the point lies inside.
    fn min_distance(&self, point: &[f64]) -> f64 {
        point
            .iter()
            .zip(self.min.iter().zip(self.max.iter()))
            .map(|(p, (lo, hi))| {
                let shortfall = if p < lo {
                    lo - p
                } else if p > hi {
                    p - hi
                } else {
                    0.0
                };
                shortfall * shortfall
            })
            .sum::<f64>()
            .sqrt()
    }
}

/// Bounded candidate list, sorted ascending by `(distance, index)`.
struct NearestList {
    capacity: usize,
    entries: Vec<(f64, usize)>,
}

impl NearestList {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity.min(64)),
        }
    }

    fn offer(&mut self, distance: f64, index: usize) {
        if self.entries.len() == self.capacity {
            match self.entries.last() {
                Some(&(worst_distance, worst_index)) => {
                    if distance > worst_distance
                        || (distance == worst_distance && index >= worst_index)
                    {
                        return;
                    }
                }
                None => return, // capacity zero
            }
        }
        let position = self
            .entries
            .partition_point(|&(d, i)| d < distance || (d == distance && i < index));
        self.entries.insert(position, (distance, index));
        if self.entries.len() > self.capacity {
            self.entries.pop();
        }
    }

    /// Worst distance still retained; infinity while the list has room.
    fn worst_distance(&self) -> f64 {
        if self.entries.len() < self.capacity {
            return f64::INFINITY;
        }
        self.entries.last().map_or(f64::INFINITY, |&(d, _)| d)
    }

    fn into_indices(self) -> Vec<usize> {
        self.entries.into_iter().map(|(_, index)| index).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tuple::MemoryTupleList;
    use proptest::prelude::*;
    use rand::prelude::*;

    fn random_points(seed: u64, count: usize, length: usize) -> MemoryTupleList {
        let mut rng = StdRng::seed_from_u64(seed);
        let rows: Vec<Vec<f64>> = (0..count)
            .map(|_| (0..length).map(|_| rng.random_range(-10.0..10.0)).collect())
            .collect();
        MemoryTupleList::from_rows(&rows).unwrap()
    }

    /// Exhaustive k-NN over the whole list, ties broken by index.
    fn exhaustive_nearest(
        tuples: &dyn TupleList,
        target: &[f64],
        k: usize,
        exclude: Option<usize>,
    ) -> Vec<usize> {
        let mut scored: Vec<(f64, usize)> = (0..tuples.tuple_count())
            .filter(|i| exclude != Some(*i))
            .map(|i| (tuple::euclidean(target, &tuples.tuple(i).unwrap()), i))
            .collect();
        scored.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        scored.into_iter().take(k).map(|(_, i)| i).collect()
    }

    #[test]
    fn test_nearest_matches_exhaustive_search() {
        let points = random_points(7, 80, 3);
        let by_insertion = TupleKdTree::for_tuple_list(&points).unwrap();
        let balanced = TupleKdTree::for_tuple_list_balanced(&points).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..20 {
            let target: Vec<f64> = (0..3).map(|_| rng.random_range(-12.0..12.0)).collect();
            for k in [1, 5, 17] {
                let expected = exhaustive_nearest(&points, &target, k, None);
                assert_eq!(by_insertion.nearest(&target, k).unwrap(), expected);
                assert_eq!(balanced.nearest(&target, k).unwrap(), expected);
            }
        }
    }

    #[test]
    fn test_nearest_to_excludes_the_query_tuple() {
        let points = random_points(3, 40, 2);
        let tree = TupleKdTree::for_tuple_list_balanced(&points).unwrap();
        for index in [0, 7, 39] {
            let target = points.tuple(index).unwrap();
            let expected = exhaustive_nearest(&points, &target, 4, Some(index));
            let got = tree.nearest_to(index, 4).unwrap();
            assert_eq!(got, expected);
            assert!(!got.contains(&index));
            assert_eq!(tree.nearest_neighbor(index).unwrap(), Some(expected[0]));
        }
    }

    #[test]
    fn test_equal_distances_resolve_to_lower_indices() {
        // Rows 1, 2, 3 are identical; 0 and 4 are farther away.
        let points = MemoryTupleList::from_rows(&[
            vec![9.0, 9.0],
            vec![1.0, 1.0],
            vec![1.0, 1.0],
            vec![1.0, 1.0],
            vec![-9.0, -9.0],
        ])
        .unwrap();
        let tree = TupleKdTree::for_tuple_list(&points).unwrap();
        assert_eq!(tree.nearest(&[1.0, 1.0], 2).unwrap(), vec![1, 2]);
        assert_eq!(tree.nearest_to(2, 2).unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_insert_duplicate_index_is_noop() {
        let points = MemoryTupleList::from_rows(&[vec![1.0], vec![2.0], vec![2.0]]).unwrap();
        let mut tree = TupleKdTree::new(&points).unwrap();
        tree.insert(0).unwrap();
        tree.insert(1).unwrap();
        tree.insert(2).unwrap();
        assert_eq!(tree.len(), 3);
        tree.insert(1).unwrap();
        tree.insert(2).unwrap();
        assert_eq!(tree.len(), 3);
        assert!(tree.contains(2).unwrap());
        assert!(matches!(
            tree.insert(3),
            Err(Error::IndexOutOfBounds { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_search_exact_match() {
        let points = random_points(19, 30, 2);
        let tree = TupleKdTree::for_tuple_list_balanced(&points).unwrap();
        for index in 0..30 {
            let coords = points.tuple(index).unwrap();
            assert_eq!(tree.search(&coords).unwrap(), Some(index));
        }
        assert_eq!(tree.search(&[100.0, 100.0]).unwrap(), None);
        assert!(matches!(
            tree.search(&[1.0]),
            Err(Error::DimensionMismatch { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_close_to_matches_exhaustive_filter() {
        let points = random_points(29, 60, 3);
        let tree = TupleKdTree::for_tuple_list_balanced(&points).unwrap();
        let target = [0.0, 0.0, 0.0];
        for radius in [0.5, 4.0, 50.0] {
            let expected: Vec<usize> = exhaustive_nearest(&points, &target, 60, None)
                .into_iter()
                .filter(|&i| tuple::euclidean(&target, &points.tuple(i).unwrap()) <= radius)
                .collect();
            assert_eq!(tree.close_to(&target, radius).unwrap(), expected);
        }
        // Excluding the query tuple itself.
        let near_zero = tree.close_to_index(0, 50.0).unwrap();
        assert!(!near_zero.contains(&0));
        assert_eq!(near_zero.len(), 59);
    }

    #[test]
    fn test_inside_rectangle() {
        let points = MemoryTupleList::from_rows(&[
            vec![0.0, 0.0],
            vec![1.0, 1.0],
            vec![2.0, 2.0],
            vec![1.0, 3.0],
            vec![-1.0, 1.0],
        ])
        .unwrap();
        let tree = TupleKdTree::for_tuple_list(&points).unwrap();
        // Bounds are inclusive on both sides.
        assert_eq!(tree.inside(&[0.0, 0.0], &[2.0, 2.0]).unwrap(), vec![0, 1, 2]);
        assert_eq!(tree.inside(&[-1.0, 1.0], &[1.0, 3.0]).unwrap(), vec![1, 3, 4]);
        assert_eq!(tree.inside(&[5.0, 5.0], &[6.0, 6.0]).unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn test_balance_factor() {
        // Ascending 1-D inserts degenerate into a right chain.
        let points =
            MemoryTupleList::from_rows(&[vec![0.0], vec![1.0], vec![2.0], vec![3.0]]).unwrap();
        let chain = TupleKdTree::for_tuple_list(&points).unwrap();
        assert_eq!(chain.balance_factor(0).unwrap(), f64::NEG_INFINITY);
        assert!(chain.balance_factor(3).unwrap().is_nan());

        // Balanced bulk load of 15 distinct values splits 7/7 at the root.
        let rows: Vec<Vec<f64>> = (0..15).map(|i| vec![i as f64]).collect();
        let points = MemoryTupleList::from_rows(&rows).unwrap();
        let balanced = TupleKdTree::for_tuple_list_balanced(&points).unwrap();
        assert_eq!(balanced.balance_factor(balanced.nodes[0]).unwrap(), 1.0);
    }

    #[test]
    fn test_empty_tree_queries() {
        let points = MemoryTupleList::from_rows(&[vec![1.0, 2.0]]).unwrap();
        let tree = TupleKdTree::new(&points).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.nearest(&[0.0, 0.0], 3).unwrap(), Vec::<usize>::new());
        assert_eq!(tree.search(&[1.0, 2.0]).unwrap(), None);
        assert_eq!(tree.close_to(&[0.0, 0.0], 10.0).unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn test_zero_k_and_oversized_k() {
        let points = random_points(5, 10, 2);
        let tree = TupleKdTree::for_tuple_list(&points).unwrap();
        assert_eq!(tree.nearest(&[0.0, 0.0], 0).unwrap(), Vec::<usize>::new());
        assert_eq!(tree.nearest(&[0.0, 0.0], 100).unwrap().len(), 10);
    }

    proptest! {
        /// Balanced and insertion-order trees both agree with the
        /// exhaustive scan on arbitrary point sets.
        #[test]
        fn prop_nearest_equals_exhaustive(
            rows in proptest::collection::vec(
                proptest::collection::vec(-100.0f64..100.0, 3),
                1..40,
            ),
            k in 1usize..8,
        ) {
            let points = MemoryTupleList::from_rows(&rows).unwrap();
            let balanced = TupleKdTree::for_tuple_list_balanced(&points).unwrap();
            let by_insertion = TupleKdTree::for_tuple_list(&points).unwrap();
            let target = points.tuple(0).unwrap();
            let expected = exhaustive_nearest(&points, &target, k, None);
            let got_balanced = balanced.nearest(&target, k).unwrap();
            let got_insertion = by_insertion.nearest(&target, k).unwrap();
            prop_assert_eq!(&got_balanced, &expected);
            prop_assert_eq!(&got_insertion, &expected);
        }
    }
}
