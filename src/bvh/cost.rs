//! Surface area heuristic.

use crate::geometry::{FloatType, WorldBox};

use super::BuildSettings;

#[derive(Copy, Clone, Debug, PartialEq)]
pub(super) struct SahCost {
    traversal: FloatType,
    intersection: FloatType,
}

/// Cheapest split found along one axis.
#[derive(Copy, Clone, Debug, PartialEq)]
pub(super) struct SplitCandidate {
    pub axis: usize,
    /// Number of sweep items that go to the left child.
    pub position: usize,
    pub cost: FloatType,
}

impl SahCost {
    pub fn new(settings: &BuildSettings) -> SahCost {
        SahCost {
            traversal: settings.traversal_cost,
            intersection: settings.intersection_cost,
        }
    }

    /// Cost of keeping `count` triangles in a single leaf.
    pub fn leaf_cost(&self, count: usize) -> FloatType {
        count as FloatType * self.intersection
    }

    /// Expected cost of an inner node whose children have the given triangle counts and areas.
    /// `parent_area` must be positive.
    pub fn split_cost(
        &self,
        parent_area: FloatType,
        left_count: usize,
        left_area: FloatType,
        right_count: usize,
        right_area: FloatType,
    ) -> FloatType {
        let weighted = left_count as FloatType * left_area + right_count as FloatType * right_area;
        self.traversal + weighted / parent_area * self.intersection
    }

    /// Evaluates the cost of splitting between every two neighbouring items of an ordered
    /// sequence of `(triangle count, box)` pairs along `axis`.
    /// Returns the cheapest candidate that puts at least one triangle on each side.
    ///
    /// `right_areas` is scratch space for the suffix counts and areas, it should have
    /// capacity for `len` elements.
    pub fn sweep(
        &self,
        axis: usize,
        parent_area: FloatType,
        len: usize,
        item: impl Fn(usize) -> (usize, WorldBox),
        right_areas: &mut Vec<(usize, FloatType)>,
    ) -> Option<SplitCandidate> {
        if parent_area <= 0.0 || len < 2 {
            return None;
        }

        right_areas.clear();
        let mut right = WorldBox::empty();
        let mut right_count = 0;
        for i in (0..len).rev() {
            let (count, b) = item(i);
            right.enlarge_box(&b);
            right_count += count;
            right_areas.push((right_count, right.surface_area_along(axis)));
        }
        right_areas.reverse();

        let mut best: Option<SplitCandidate> = None;
        let mut left = WorldBox::empty();
        let mut left_count = 0;
        for position in 1..len {
            let (count, b) = item(position - 1);
            left.enlarge_box(&b);
            left_count += count;

            let (right_count, right_area) = right_areas[position];
            if left_count == 0 || right_count == 0 {
                continue;
            }

            let cost = self.split_cost(
                parent_area,
                left_count,
                left.surface_area_along(axis),
                right_count,
                right_area,
            );
            if best.is_none_or(|best| cost < best.cost) {
                best = Some(SplitCandidate {
                    axis,
                    position,
                    cost,
                });
            }
        }
        best
    }
}

/// Picks the cheaper of two candidates, keeping the first one on ties.
pub(super) fn cheaper(
    a: Option<SplitCandidate>,
    b: Option<SplitCandidate>,
) -> Option<SplitCandidate> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b.cost < a.cost { b } else { a }),
        (a, None) => a,
        (None, b) => b,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::geometry::WorldPoint;
    use assert2::{assert, let_assert};

    fn unit_cube_at(x: FloatType) -> WorldBox {
        WorldBox::new(
            WorldPoint::new(x, 0.0, 0.0),
            WorldPoint::new(x + 1.0, 1.0, 1.0),
        )
    }

    fn cost() -> SahCost {
        SahCost::new(&BuildSettings::default())
    }

    #[test]
    fn leaf_cost() {
        assert!(cost().leaf_cost(3) == 12.0);
    }

    #[test]
    fn split_cost_formula() {
        // Two halves, each with half of the triangles and a third of the parent area
        let c = cost().split_cost(12.0, 2, 4.0, 2, 4.0);
        assert!(c == 1.0 + (8.0 + 8.0) / 12.0 * 4.0);
    }

    #[test]
    fn sweep_finds_gap() {
        let boxes = [0.0, 1.0, 2.0, 10.0, 11.0].map(unit_cube_at);
        let parent = boxes.iter().fold(WorldBox::empty(), |acc, b| acc.union(b));
        let mut scratch = Vec::new();

        let_assert!(
            Some(candidate) =
                cost().sweep(0, parent.surface_area(), boxes.len(), |i| (1, boxes[i]), &mut scratch)
        );
        assert!(candidate.axis == 0);
        assert!(candidate.position == 3);
        assert!(candidate.cost < cost().leaf_cost(5));
    }

    #[test]
    fn sweep_skips_empty_sides() {
        let boxes = [unit_cube_at(0.0), WorldBox::empty(), unit_cube_at(5.0)];
        let counts = [1, 0, 1];
        let parent = boxes[0].union(&boxes[2]);
        let mut scratch = Vec::new();

        let_assert!(
            Some(candidate) = cost().sweep(
                0,
                parent.surface_area(),
                3,
                |i| (counts[i], boxes[i]),
                &mut scratch
            )
        );
        assert!(candidate.position == 1);
    }

    #[test]
    fn sweep_of_flat_parent() {
        let mut scratch = Vec::new();
        assert!(cost().sweep(0, 0.0, 2, |_| (1, unit_cube_at(0.0)), &mut scratch) == None);
    }

    #[test]
    fn coincident_boxes_are_not_worth_splitting() {
        let b = unit_cube_at(0.0);
        let mut scratch = Vec::new();
        let_assert!(
            Some(candidate) = cost().sweep(1, b.surface_area(), 8, |_| (1, b), &mut scratch)
        );
        assert!(candidate.cost > cost().leaf_cost(8));
    }

    #[test]
    fn cheaper_prefers_first_on_tie() {
        let a = SplitCandidate {
            axis: 0,
            position: 1,
            cost: 2.0,
        };
        let b = SplitCandidate { axis: 1, ..a };
        assert!(cheaper(Some(a), Some(b)) == Some(a));
        assert!(cheaper(None, Some(b)) == Some(b));
        assert!(cheaper(Some(a), None) == Some(a));
    }
}
