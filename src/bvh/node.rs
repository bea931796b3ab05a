use wide::{CmpEq as _, f32x4};

use crate::geometry::{FloatType, Ray, WorldBox, WorldPoint, widen_far};

use super::ChildLink;

/// Inner node of the tree, holding boxes and links of both children in one cache line.
///
/// Boxes are stored per axis as `[left min, right min, left max, right max]`, so that
/// one 4-wide slab evaluation per axis covers both children.
/// A missing child has the empty box, which the slab test rejects without a special case.
#[repr(C, align(64))]
#[derive(Clone, Copy, Debug)]
pub(crate) struct BvhNode {
    slabs: [[FloatType; 4]; 3],
    links: [ChildLink; 2],
}

const _: () = assert!(std::mem::size_of::<BvhNode>() == 64);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Side {
    Left = 0,
    Right = 1,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];
}

/// Per-ray values for the node slab test, prepared once per query.
#[derive(Copy, Clone, Debug)]
pub(crate) struct NodeRay {
    origin: [f32x4; 3],
    inv_direction: [f32x4; 3],
    negative: [bool; 3],
    /// All lanes set for axes the ray is parallel to.
    parallel: [f32x4; 3],
}

impl From<&Ray> for NodeRay {
    fn from(ray: &Ray) -> Self {
        NodeRay {
            origin: [0, 1, 2].map(|axis| f32x4::splat(ray.origin[axis])),
            inv_direction: [0, 1, 2].map(|axis| f32x4::splat(ray.inv_direction[axis])),
            negative: [0, 1, 2].map(|axis| ray.inv_direction[axis].is_sign_negative()),
            parallel: [0, 1, 2]
                .map(|axis| f32x4::splat(ray.direction[axis]).cmp_eq(f32x4::ZERO)),
        }
    }
}

impl Default for BvhNode {
    /// Node with both children missing.
    fn default() -> Self {
        Self::new(
            (WorldBox::empty(), ChildLink::EMPTY),
            (WorldBox::empty(), ChildLink::EMPTY),
        )
    }
}

impl BvhNode {
    pub fn new(left: (WorldBox, ChildLink), right: (WorldBox, ChildLink)) -> BvhNode {
        let (left_box, left_link) = left;
        let (right_box, right_link) = right;
        BvhNode {
            slabs: [0, 1, 2].map(|axis| {
                [
                    left_box.min[axis],
                    right_box.min[axis],
                    left_box.max[axis],
                    right_box.max[axis],
                ]
            }),
            links: [left_link, right_link],
        }
    }

    /// Node with a single child on the left side.
    pub fn new_single(child: (WorldBox, ChildLink)) -> BvhNode {
        Self::new(child, (WorldBox::empty(), ChildLink::EMPTY))
    }

    pub fn link(&self, side: Side) -> ChildLink {
        self.links[side as usize]
    }

    pub fn set_link(&mut self, side: Side, link: ChildLink) {
        self.links[side as usize] = link;
    }

    pub fn child_box(&self, side: Side) -> WorldBox {
        let side = side as usize;
        WorldBox::new(
            WorldPoint::new(self.slabs[0][side], self.slabs[1][side], self.slabs[2][side]),
            WorldPoint::new(
                self.slabs[0][side + 2],
                self.slabs[1][side + 2],
                self.slabs[2][side + 2],
            ),
        )
    }

    /// Slab test of both children, clipped to `[t_min, t_max]`.
    /// Returns `(entry, exit)` for left and right child, the child is hit if `entry <= exit`.
    /// Gives the same values as [`crate::geometry::RayIntersectionExt`] on the child boxes.
    #[inline(always)]
    pub fn intersect(
        &self,
        ray: &NodeRay,
        t_min: FloatType,
        t_max: FloatType,
    ) -> [(FloatType, FloatType); 2] {
        // Far distances are negated so that a single max accumulates both bounds.
        let flip = f32x4::new([1.0, 1.0, -1.0, -1.0]);
        let mut acc = f32x4::new([t_min, t_min, -t_max, -t_max]);

        for axis in 0..3 {
            let [l_min, r_min, l_max, r_max] = self.slabs[axis];
            let planes = if ray.negative[axis] {
                f32x4::new([l_max, r_max, l_min, r_min])
            } else {
                f32x4::new([l_min, r_min, l_max, r_max])
            };
            let offsets = planes - ray.origin[axis];
            let t = offsets * ray.inv_direction[axis] * flip;
            // Parallel ray lying in a plane of the slab, the slab doesn't limit it
            let unbounded = offsets.cmp_eq(f32x4::ZERO) & ray.parallel[axis];
            acc = acc.max(unbounded.blend(f32x4::splat(FloatType::NEG_INFINITY), t));
        }

        let [l_entry, r_entry, l_exit, r_exit] = acc.to_array();
        [(l_entry, widen_far(-l_exit)), (r_entry, widen_far(-r_exit))]
    }
}
