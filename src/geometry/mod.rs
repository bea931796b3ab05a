mod aabb;
mod ray_box_intersection;
mod ray_triangle_intersection;
mod triangle;

use nalgebra::{Point3, Unit, Vector3};
use wide::f32x4;

pub use aabb::AABB;
pub use ray_box_intersection::RayIntersectionExt;
pub use ray_triangle_intersection::{RayLanes, TriangleBatch};
pub use triangle::{BarycentricCoordinates, Triangle};

pub type FloatType = f32;
pub type SimdFloatType = f32x4;

pub type WorldPoint = Point3<FloatType>;
pub type WorldVector = Vector3<FloatType>;
pub type WorldBox = AABB<WorldPoint>;

pub const EPSILON: FloatType = 1e-9;

/// Relative slack added to far slab distances, so that rounding in the slab test
/// never rejects a box the ray actually touches.
pub(crate) const FAR_SLACK: FloatType = 4.0 * FloatType::EPSILON;

/// Widens a far intersection distance by [`FAR_SLACK`], keeping infinities intact.
#[inline(always)]
pub(crate) fn widen_far(t: FloatType) -> FloatType {
    if t > 0.0 {
        t * (1.0 + FAR_SLACK)
    } else {
        t * (1.0 - FAR_SLACK)
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Ray {
    pub origin: WorldPoint,
    /// Normalized direction of the ray
    pub direction: Unit<WorldVector>,

    /// Componentwise inverse of the ray direction.
    /// Infinities coming from zero components are replaced by the largest finite value
    /// with the sign of the zero.
    pub inv_direction: WorldVector,

    /// Intersections closer than this are ignored.
    pub min_t: FloatType,
}

impl Ray {
    /// Creates a ray with `min_t` = 0.
    /// Panics if direction is zero.
    pub fn new(origin: WorldPoint, direction: WorldVector) -> Ray {
        Self::try_new(origin, direction).expect("Ray direction must be non-zero")
    }

    /// Creates a ray with `min_t` = 0, returns None if direction is zero.
    pub fn try_new(origin: WorldPoint, direction: WorldVector) -> Option<Ray> {
        let direction = Unit::try_new(direction, EPSILON)?;
        let inv_direction = direction.map(|x| {
            let inv = 1.0 / x;
            if inv.is_infinite() {
                FloatType::MAX.copysign(inv)
            } else {
                inv
            }
        });

        Some(Ray {
            origin,
            direction,
            inv_direction,
            min_t: 0.0,
        })
    }

    pub fn with_min_t(self, min_t: FloatType) -> Ray {
        Ray { min_t, ..self }
    }

    pub fn point_at(&self, distance: FloatType) -> WorldPoint {
        self.origin + self.direction.as_ref() * distance
    }
}
