use std::ops::Range;

use ordered_float::OrderedFloat;

use crate::geometry::WorldPoint;

use super::BuildError;

/// Triangle indices sorted by centroid along each of the three axes.
///
/// All three orderings always describe the same set of triangles within any range
/// produced by [`AxisOrderings::partition`], each sorted along its own axis.
#[derive(Clone, Debug)]
pub(super) struct AxisOrderings {
    orderings: [Vec<u32>; 3],
    /// Side of each triangle during the current partition, indexed by triangle.
    in_left: Vec<bool>,
    scratch: Vec<u32>,
}

impl AxisOrderings {
    pub fn new(centroids: &[WorldPoint]) -> Result<Self, BuildError> {
        let count = centroids.len();

        let mut orderings = [Vec::new(), Vec::new(), Vec::new()];
        for (axis, ordering) in orderings.iter_mut().enumerate() {
            ordering.try_reserve_exact(count)?;
            ordering.extend(0..count as u32);
            // Ties broken by triangle index, so that all orderings are fully deterministic
            ordering.sort_unstable_by_key(|i| (OrderedFloat(centroids[*i as usize][axis]), *i));
        }

        let mut in_left = Vec::new();
        in_left.try_reserve_exact(count)?;
        in_left.resize(count, false);

        let mut scratch = Vec::new();
        scratch.try_reserve_exact(count)?;

        Ok(AxisOrderings {
            orderings,
            in_left,
            scratch,
        })
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.in_left.len()
    }

    /// Triangles of `range`, sorted along `axis`.
    pub fn ordering(&self, axis: usize, range: Range<usize>) -> &[u32] {
        &self.orderings[axis][range]
    }

    /// Splits `range` so that the first `split` triangles of the ordering along `axis`
    /// end up in `range.start..range.start + split` of every ordering.
    /// Relative order of triangles on each side is preserved on all axes.
    pub fn partition(&mut self, range: Range<usize>, axis: usize, split: usize) {
        assert!(split <= range.len());
        let middle = range.start + split;

        for (position, i) in self.orderings[axis][range.clone()].iter().enumerate() {
            self.in_left[*i as usize] = position < split;
        }

        for other in (0..3).filter(|other| *other != axis) {
            let ordering = &mut self.orderings[other][range.clone()];

            self.scratch.clear();
            let mut left = 0;
            for j in 0..ordering.len() {
                let i = ordering[j];
                if self.in_left[i as usize] {
                    ordering[left] = i;
                    left += 1;
                } else {
                    self.scratch.push(i);
                }
            }
            debug_assert_eq!(range.start + left, middle);
            ordering[left..].copy_from_slice(&self.scratch);
        }
    }
}
