//! Exact SAH builder, evaluating every split position of the centroid-sorted triangles.

use std::ops::Range;

use log::debug;

use crate::geometry::{FloatType, WorldBox};

use super::{Decision, Split, Topology, decide, forced_leaf};
use crate::bvh::{
    BuildError, BuildSettings, ChildLink,
    cost::{SahCost, cheaper},
    node::BvhNode,
    orderings::AxisOrderings,
    primitives::BuildPrimitives,
};

pub(in crate::bvh) fn build(
    primitives: &BuildPrimitives,
    settings: &BuildSettings,
) -> Result<Topology, BuildError> {
    let count = primitives.len();

    let mut right_areas = Vec::new();
    right_areas.try_reserve_exact(count)?;

    let mut builder = SequentialBuilder {
        primitives,
        settings,
        cost: SahCost::new(settings),
        orderings: AxisOrderings::new(&primitives.centroids)?,
        right_areas,
        topology: Topology::new(),
    };
    debug!("Sorted {count} centroids");

    let root = builder.build_node(0..count, primitives.bounds, 0)?;
    builder.topology.into_rooted(root, primitives.bounds)
}

struct SequentialBuilder<'a> {
    primitives: &'a BuildPrimitives,
    settings: &'a BuildSettings,
    cost: SahCost,
    orderings: AxisOrderings,
    right_areas: Vec<(usize, FloatType)>,
    topology: Topology,
}

impl SequentialBuilder<'_> {
    /// Builds subtree over the triangles at `range` of the orderings.
    /// Nodes are allocated in pre-order, so the first node allocated is the subtree root.
    fn build_node(
        &mut self,
        range: Range<usize>,
        bounds: WorldBox,
        depth: usize,
    ) -> Result<ChildLink, BuildError> {
        let count = range.len();

        let decision = match forced_leaf(count, depth, self.settings) {
            Some(reason) => Decision::Leaf(reason),
            None => {
                let split = self.find_split(range.clone(), &bounds);
                decide(count, depth, &self.cost, split)
            }
        };

        let left_count = match decision {
            Decision::Leaf(reason) => {
                return self.topology.make_leaf(
                    self.orderings.ordering(0, range),
                    depth,
                    reason,
                );
            }
            Decision::Split(split) => split.left_count,
            Decision::Median => {
                self.topology.statistics.median_splits += 1;
                count / 2
            }
        };

        let axis = match decision {
            Decision::Split(split) => split.candidate.axis,
            _ => self
                .primitives
                .centroid_bounds_of(self.orderings.ordering(0, range.clone()))
                .longest_axis(),
        };
        self.orderings.partition(range.clone(), axis, left_count);

        let middle = range.start + left_count;
        let left_range = range.start..middle;
        let right_range = middle..range.end;
        let left_bounds = self
            .primitives
            .bounds_of(self.orderings.ordering(0, left_range.clone()));
        let right_bounds = self
            .primitives
            .bounds_of(self.orderings.ordering(0, right_range.clone()));

        let index = self.topology.push_node(BvhNode::default())?;
        let left = self.build_node(left_range, left_bounds, depth + 1)?;
        let right = self.build_node(right_range, right_bounds, depth + 1)?;
        self.topology.nodes[index] = BvhNode::new((left_bounds, left), (right_bounds, right));

        Ok(ChildLink::new_inner(index))
    }

    fn find_split(&mut self, range: Range<usize>, bounds: &WorldBox) -> Option<Split<()>> {
        let parent_area = bounds.surface_area();
        let boxes = &self.primitives.boxes;

        let mut best = None;
        for axis in 0..3 {
            let ordering = self.orderings.ordering(axis, range.clone());
            let candidate = self.cost.sweep(
                axis,
                parent_area,
                ordering.len(),
                |i| (1, boxes[ordering[i] as usize]),
                &mut self.right_areas,
            );
            best = cheaper(best, candidate);
        }

        best.map(|candidate| Split {
            candidate,
            left_count: candidate.position,
            extra: (),
        })
    }
}
