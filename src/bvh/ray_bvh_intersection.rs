use arrayvec::ArrayVec;
use wide::{CmpGe as _, CmpLe as _, f32x4};

use super::{
    Bvh, ChildLink, MAX_DEPTH, NodeIdx, NodeLink,
    node::{NodeRay, Side},
};
use crate::{
    geometry::{BarycentricCoordinates, FloatType, Ray, RayIntersectionExt as _, RayLanes},
    util::bit_iter,
};

/// Closest intersection found by [`Bvh::closest_hit`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Hit {
    /// Distance along the (normalized) ray direction.
    pub distance: FloatType,
    pub uv: BarycentricCoordinates<FloatType>,
    /// Index of the triangle in the source the tree was built from.
    pub triangle_index: usize,
}

#[derive(Copy, Clone, Debug)]
struct StackFrame {
    link: ChildLink,
    t_min: FloatType,
    t_max: FloatType,
}

/// Scratch space of a single query.
/// Every thread running queries needs its own, it can be reused between queries.
#[derive(Clone, Debug, Default)]
pub struct TraversalStack {
    frames: ArrayVec<StackFrame, { MAX_DEPTH + 1 }>,
}

impl Bvh {
    /// Finds the nearest triangle hit with distance in `[ray.min_t, max_t]`.
    /// Of several hits at exactly the same distance, the one found first is reported.
    pub fn closest_hit(
        &self,
        ray: &Ray,
        max_t: FloatType,
        stack: &mut TraversalStack,
    ) -> Option<Hit> {
        self.traverse::<false>(ray, max_t, stack)
    }

    /// Checks whether any triangle is hit with distance in `[ray.min_t, max_t]`.
    pub fn any_hit(&self, ray: &Ray, max_t: FloatType, stack: &mut TraversalStack) -> bool {
        self.traverse::<true>(ray, max_t, stack).is_some()
    }

    fn traverse<const ANY_HIT: bool>(
        &self,
        ray: &Ray,
        max_t: FloatType,
        stack: &mut TraversalStack,
    ) -> Option<Hit> {
        stack.frames.clear();

        let (t_min, t_max) = self.bounds.intersect(ray, ray.min_t, max_t)?;

        let node_ray = NodeRay::from(ray);
        let ray_lanes = RayLanes::from(ray);
        let min_t_lanes = f32x4::splat(ray.min_t);
        let max_t_lanes = f32x4::splat(max_t);

        let mut best: Option<Hit> = None;
        let mut current = Some(StackFrame {
            link: ChildLink::new_inner(NodeIdx::from_raw(0)),
            t_min,
            t_max,
        });

        while let Some(frame) = current.take().or_else(|| stack.frames.pop()) {
            // Nothing entered after the best hit so far can improve it
            let limit = best.map_or(frame.t_max, |hit| frame.t_max.min(hit.distance));
            if frame.t_min > limit {
                continue;
            }

            match frame.link.decode() {
                NodeLink::Empty => {}
                NodeLink::Inner { index } => {
                    let node = &self.nodes[index];
                    let intervals = node.intersect(&node_ray, frame.t_min, limit);

                    let [left, right] = Side::BOTH.map(|side| {
                        let (entry, exit) = intervals[side as usize];
                        (entry <= exit).then_some(StackFrame {
                            link: node.link(side),
                            t_min: entry,
                            t_max: exit,
                        })
                    });

                    current = match (left, right) {
                        (Some(left), Some(right)) => {
                            let (near, far) = if right.t_min < left.t_min {
                                (right, left)
                            } else {
                                (left, right)
                            };
                            assert!(
                                !stack.frames.is_full(),
                                "Traversal stack overflow, tree is deeper than {MAX_DEPTH}"
                            );
                            stack.frames.push(far);
                            Some(near)
                        }
                        (near, None) | (None, near) => near,
                    };
                }
                NodeLink::Leaf { batches } => {
                    for batch in batches.iter() {
                        let (mask, t, uv) = self.triangles[batch].intersect(&ray_lanes);
                        let mask = mask & t.cmp_ge(min_t_lanes) & t.cmp_le(max_t_lanes);
                        let t = t.as_array_ref();

                        for lane in bit_iter(mask.move_mask() as u32) {
                            let distance = t[lane];
                            if best.is_none_or(|hit| distance < hit.distance) {
                                best = Some(Hit {
                                    distance,
                                    uv: uv.lane(lane),
                                    triangle_index: self.leaves[batch][lane] as usize,
                                });
                                if ANY_HIT {
                                    return best;
                                }
                            }
                        }
                    }
                }
            }
        }

        best
    }
}
