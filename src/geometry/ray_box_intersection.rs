use crate::geometry::{FloatType, Ray, WorldBox, widen_far};

pub trait RayIntersectionExt {
    /// Calculate first and last ray intersection with the box, clipped to `[t_min, t_max]`.
    /// Returns None if the clipped interval is empty.
    fn intersect(
        &self,
        ray: &Ray,
        t_min: FloatType,
        t_max: FloatType,
    ) -> Option<(FloatType, FloatType)>;
}

impl RayIntersectionExt for WorldBox {
    /// The near and far planes of each slab are picked by the sign of the inverse direction,
    /// so a box with min > max (the empty box in particular) always produces an empty interval.
    fn intersect(
        &self,
        ray: &Ray,
        t_min: FloatType,
        t_max: FloatType,
    ) -> Option<(FloatType, FloatType)> {
        let mut entry = t_min;
        let mut far = t_max;

        for axis in 0..3 {
            let inv = ray.inv_direction[axis];
            let origin = ray.origin[axis];
            let (near_plane, far_plane) = if inv.is_sign_negative() {
                (self.max[axis], self.min[axis])
            } else {
                (self.min[axis], self.max[axis])
            };

            // A ray parallel to the slab and lying in one of its planes stays inside
            // the slab for its whole length.
            let parallel = ray.direction[axis] == 0.0;
            let distance = |plane: FloatType, unbounded: FloatType| {
                if parallel && plane == origin {
                    unbounded
                } else {
                    (plane - origin) * inv
                }
            };

            entry = entry.max(distance(near_plane, FloatType::NEG_INFINITY));
            far = far.min(distance(far_plane, FloatType::INFINITY));
        }

        let exit = widen_far(far);
        if entry <= exit {
            Some((entry, exit))
        } else {
            None
        }
    }
}

#[cfg(test)]
pub mod test {
    use assert2::{assert, let_assert};
    use test_case::{test_case, test_matrix};

    use super::*;

    use crate::geometry::{WorldPoint, WorldVector};

    fn test_box() -> WorldBox {
        WorldBox::new([5.0, 5.0, 5.0].into(), [10.0, 10.0, 10.0].into())
    }

    /// Checks cases when the ray hits the box, including some corner cases.
    #[test_matrix(
        [5.0, 7.0, 10.0],
        [5.0, 7.0, 10.0],
        [5.0, 7.0, 10.0],
        [-1.0, 0.0, 2.0],
        [-1.0, 0.0, 2.0],
        [-1.0, 0.0, 2.0],
        [-10.0, -1.0, 0.0, 2.0, 5.0, 20.0]
    )]
    fn hit(px: f32, py: f32, pz: f32, dx: f32, dy: f32, dz: f32, origin_pos: f32) {
        if dx == 0.0 && dy == 0.0 && dz == 0.0 {
            return;
        }

        let b = test_box();

        let p = WorldPoint::new(px, py, pz);
        let d = WorldVector::new(dx, dy, dz);
        // Moving along the unnormalized direction keeps the origin exact, so that rays
        // grazing corners and edges really touch them.
        let r = Ray::new(p + d * origin_pos, d);

        let_assert!(
            Some((t1, t2)) = b.intersect(&r, FloatType::NEG_INFINITY, FloatType::INFINITY),
            "The ray passes through {p:?}, we should always have an intersection"
        );

        let p1 = r.point_at(t1);
        let p2 = r.point_at(t2);

        assert!(point_is_on_box_surface(&p1, &b), "{p1:?} must be in {b:?}");
        assert!(point_is_on_box_surface(&p2, &b), "{p2:?} must be in {b:?}");
    }

    /// Just a manual example of ray grazing along an edge.
    #[test]
    fn hit_along_edge() {
        let r = Ray::new(
            WorldPoint::new(5.0, 5.0, 0.0),
            WorldVector::new(0.0, 0.0, 1.0),
        );

        let_assert!(Some((t1, t2)) = test_box().intersect(&r, 0.0, FloatType::INFINITY));
        assert!(t1 == 5.0);
        assert!((t2 - 10.0).abs() < 1e-4);
    }

    /// Rays parallel to a face, lying in its plane.
    #[test_case( 5.0,  7.0,  0.0,   0.0, 0.0, 1.0 ; "min_x_face")]
    #[test_case(10.0,  7.0,  0.0,   0.0, 0.0, 1.0 ; "max_x_face")]
    #[test_case( 7.0, 10.0, 20.0,   0.0, 0.0, -1.0 ; "max_y_face_backwards")]
    #[test_case( 0.0,  7.0, 10.0,   1.0, 0.0, 0.0 ; "max_z_face")]
    #[test_case( 0.0, 10.0, 10.0,   1.0, -0.0, 0.0 ; "max_edge_negative_zero")]
    fn hit_in_face_plane(px: f32, py: f32, pz: f32, dx: f32, dy: f32, dz: f32) {
        let r = Ray::new(WorldPoint::new(px, py, pz), WorldVector::new(dx, dy, dz));

        let_assert!(Some((t1, t2)) = test_box().intersect(&r, 0.0, FloatType::INFINITY));
        assert!(t1 == 5.0 || t1 == 10.0);
        assert!(t2 > t1);
        assert!(point_is_on_box_surface(&r.point_at(t1), &test_box()));
        assert!(point_is_on_box_surface(&r.point_at(t2), &test_box()));
    }

    /// Rays that lie parallel to one axis and start outside the corresponding slab
    /// must miss, even if they move toward the box on other axes or remain unchanged.
    #[test_case( 0.0,  7.0,  7.0,   0.0, 1.0, 0.0,   0.0 ; "low_x_parallel_miss")]
    #[test_case(12.0,  7.0,  7.0,   0.0, 1.0, 0.0,   0.0 ; "high_x_parallel_miss")]
    #[test_case( 7.0,  0.0,  7.0,   1.0, 0.0, 0.0,   0.0 ; "low_y_parallel_miss")]
    #[test_case( 7.0, 12.0,  7.0,   1.0, 0.0, 0.0,   0.0 ; "high_y_parallel_miss")]
    #[test_case( 7.0,  7.0,  0.0,   1.0, 0.0, 0.0,   0.0 ; "low_z_parallel_miss")]
    #[test_case( 7.0,  7.0, 12.0,   1.0, 0.0, 0.0,   0.0 ; "high_z_parallel_miss")]
    #[test_case( 0.0,  5.0,  7.0,   1.0, 0.0, 1.0,   0.0 ; "corner_miss")]
    #[test_case( 0.0,  0.0,  0.0,  -1.0, 1.0, 1.0,   0.0 ; "corner_miss2")]
    #[test_case( 0.0,  7.0,  7.0,  -1.0, 0.0, 0.0,   0.0 ; "pointing_away")]
    fn only_misses(px: f32, py: f32, pz: f32, dx: f32, dy: f32, dz: f32, origin_pos: f32) {
        let p = WorldPoint::new(px, py, pz);
        let d = WorldVector::new(dx, dy, dz);
        let temp_r = Ray::new(p, d);
        let origin = temp_r.point_at(origin_pos);
        let r = Ray::new(origin, d);

        assert!(test_box().intersect(&r, 0.0, FloatType::INFINITY) == None);
    }

    #[test_case(1.0, 0.0, 0.0)]
    #[test_case(-1.0, 0.0, 0.0)]
    #[test_case(0.0, -0.0, 1.0)]
    #[test_case(1.0, 1.0, 1.0)]
    fn empty_box_misses(dx: f32, dy: f32, dz: f32) {
        let r = Ray::new(WorldPoint::new(1.0, 2.0, 3.0), WorldVector::new(dx, dy, dz));
        assert!(
            WorldBox::empty().intersect(&r, FloatType::NEG_INFINITY, FloatType::INFINITY) == None
        );
    }

    #[test]
    fn interval_is_clipped() {
        let r = Ray::new(WorldPoint::new(7.0, 7.0, 0.0), WorldVector::z());
        let b = test_box();

        assert!(b.intersect(&r, 6.0, 8.0) == Some((6.0, widen_far(8.0))));
        assert!(b.intersect(&r, 0.0, 4.0) == None);
        assert!(b.intersect(&r, 11.0, FloatType::INFINITY) == None);
    }

    #[test]
    fn origin_inside_box() {
        let r = Ray::new(WorldPoint::new(7.0, 7.0, 7.0), WorldVector::new(0.0, 0.0, -1.0));
        let_assert!(Some((t1, t2)) = test_box().intersect(&r, 0.0, FloatType::INFINITY));
        assert!(t1 == 0.0);
        assert!((t2 - 2.0).abs() < 1e-4);
    }

    fn point_is_on_box_surface(p: &WorldPoint, b: &WorldBox) -> bool {
        const TOLERANCE: f32 = 1e-3;

        let within = |axis: usize| {
            p[axis] >= b.min[axis] - TOLERANCE && p[axis] <= b.max[axis] + TOLERANCE
        };
        let on_face = |axis: usize| {
            (p[axis] - b.min[axis]).abs() <= TOLERANCE || (p[axis] - b.max[axis]).abs() <= TOLERANCE
        };

        (0..3).all(within) && (0..3).any(on_face)
    }
}
