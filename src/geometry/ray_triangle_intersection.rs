use wide::{CmpEq as _, CmpGe as _, CmpLe as _, f32x4};

use crate::util::simd::{Lane, LaneVector};

use super::{BarycentricCoordinates, FloatType, Ray, SimdFloatType, Triangle, WorldPoint};

/// Möller–Trumbore, two sided.
/// Adapted from https://en.wikipedia.org/wiki/M%C3%B6ller%E2%80%93Trumbore_intersection_algorithm#Rust_implementation
///
/// Returns determinant, distance along the ray and barycentric u, v.
/// The result is only meaningful where the determinant is non-zero.
#[inline(always)]
fn moller_trumbore<T: Lane>(
    origin: &LaneVector<T>,
    direction: &LaneVector<T>,
    v0: &LaneVector<T>,
    e1: &LaneVector<T>,
    e2: &LaneVector<T>,
) -> (T, T, T, T) {
    let ray_cross_e2 = direction.cross(e2);
    let det = e1.dot(&ray_cross_e2);

    let inv_det = T::ONE / det; // May be infinite
    let s = *origin - *v0;
    let u = inv_det * s.dot(&ray_cross_e2);

    let s_cross_e1 = s.cross(e1);
    let v = inv_det * direction.dot(&s_cross_e1);
    let t = inv_det * e2.dot(&s_cross_e1);

    (det, t, u, v)
}

/// Ray origin and direction splatted to all lanes.
#[derive(Copy, Clone, Debug)]
pub struct RayLanes {
    pub origin: LaneVector<SimdFloatType>,
    pub direction: LaneVector<SimdFloatType>,
}

impl From<&Ray> for RayLanes {
    fn from(ray: &Ray) -> Self {
        RayLanes {
            origin: LaneVector::splat_point(&ray.origin),
            direction: LaneVector::splat(ray.direction.as_ref()),
        }
    }
}

/// Four triangles in structure-of-arrays layout, stored as first vertex and two edges.
#[derive(Copy, Clone, Debug, Default)]
pub struct TriangleBatch {
    pub v0: LaneVector<SimdFloatType>,
    pub e1: LaneVector<SimdFloatType>,
    pub e2: LaneVector<SimdFloatType>,
}

impl TriangleBatch {
    pub fn new(triangles: [Triangle<WorldPoint>; 4]) -> TriangleBatch {
        let v0 = triangles.map(|t| LaneVector::from(&t[0]));
        let e1 = triangles.map(|t| LaneVector::from(&t[1]) - LaneVector::from(&t[0]));
        let e2 = triangles.map(|t| LaneVector::from(&t[2]) - LaneVector::from(&t[0]));
        TriangleBatch {
            v0: LaneVector::gather(v0),
            e1: LaneVector::gather(e1),
            e2: LaneVector::gather(e2),
        }
    }

    /// Calculates ray intersection with the (two sided) triangle pack.
    /// Returns mask of valid intersections, distance along ray, and barycentric uv coordinates.
    /// Degenerate triangles never report a valid intersection.
    /// Each lane gives bit-for-bit the same result as [`Triangle::intersect`].
    #[inline(always)]
    pub fn intersect(
        &self,
        ray: &RayLanes,
    ) -> (SimdFloatType, SimdFloatType, BarycentricCoordinates<SimdFloatType>) {
        let (det, t, u, v) =
            moller_trumbore(&ray.origin, &ray.direction, &self.v0, &self.e1, &self.e2);

        let mask = !det.cmp_eq(f32x4::ZERO)
            & u.cmp_ge(f32x4::ZERO)
            & v.cmp_ge(f32x4::ZERO)
            & (u + v).cmp_le(f32x4::ONE);
        (mask, t, BarycentricCoordinates { u, v })
    }
}

impl Triangle<WorldPoint> {
    /// Scalar version of the batched intersection test.
    /// Returns distance along the ray and barycentric coordinates of the hit, if any.
    /// No distance limits are applied.
    pub fn intersect(&self, ray: &Ray) -> Option<(FloatType, BarycentricCoordinates<FloatType>)> {
        let v0 = LaneVector::from(&self[0]);
        let e1 = LaneVector::from(&self[1]) - v0;
        let e2 = LaneVector::from(&self[2]) - v0;
        let origin = LaneVector::from(&ray.origin);
        let direction = LaneVector::splat(ray.direction.as_ref());

        let (det, t, u, v) = moller_trumbore(&origin, &direction, &v0, &e1, &e2);

        if det != 0.0 && u >= 0.0 && v >= 0.0 && u + v <= 1.0 {
            Some((t, BarycentricCoordinates { u, v }))
        } else {
            None
        }
    }
}
