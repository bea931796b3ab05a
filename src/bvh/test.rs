//! Whole-tree tests, comparing queries against brute force intersection of all triangles.

use super::*;
use crate::{
    geometry::{FloatType, Ray, Triangle, WorldPoint, WorldVector},
    mesh::{TriangleVertexSource, random_triangle_soup},
};

use assert2::{assert, check, let_assert};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use rand_distr::{Distribution as _, UnitSphere};
use rayon::prelude::*;
use test_case::test_case;

fn brute_force(
    triangles: &[Triangle<WorldPoint>],
    ray: &Ray,
    max_t: FloatType,
) -> Option<(FloatType, usize)> {
    triangles
        .iter()
        .enumerate()
        .filter_map(|(i, triangle)| triangle.intersect(ray).map(|(t, _)| (t, i)))
        .filter(|(t, _)| *t >= ray.min_t && *t <= max_t)
        .min_by(|a, b| a.0.total_cmp(&b.0))
}

/// Checks both queries of every ray against brute force, returns the number of hits.
fn check_against_brute_force(
    bvh: &Bvh,
    triangles: &[Triangle<WorldPoint>],
    rays: &[Ray],
    max_t: FloatType,
) -> usize {
    let mut stack = TraversalStack::default();
    let mut hits = 0;

    for ray in rays {
        let expected = brute_force(triangles, ray, max_t);
        let hit = bvh.closest_hit(ray, max_t, &mut stack);

        check!(hit.is_some() == expected.is_some(), "{ray:?}");
        if let (Some(hit), Some((distance, _))) = (hit, expected) {
            hits += 1;
            check!((hit.distance - distance).abs() <= 1e-4 * distance.abs().max(1.0));
            // The reported triangle must really be hit at the reported place
            check!(
                triangles[hit.triangle_index].intersect(ray) == Some((hit.distance, hit.uv))
            );
        }

        check!(bvh.any_hit(ray, max_t, &mut stack) == expected.is_some(), "{ray:?}");
    }

    hits
}

fn random_rays(
    rng: &mut impl Rng,
    count: usize,
    extent: FloatType,
    targets: &[Triangle<WorldPoint>],
) -> Vec<Ray> {
    let half = extent / 2.0;
    (0..count)
        .map(|i| {
            let origin = WorldPoint::new(
                rng.random_range(-half..half),
                rng.random_range(-half..half),
                rng.random_range(-half..half),
            );
            // Every other ray aims at a triangle, so that there are plenty of hits
            let direction = if i % 2 == 0 && !targets.is_empty() {
                targets[rng.random_range(0..targets.len())].centroid() - origin
            } else {
                let [x, y, z]: [FloatType; 3] = UnitSphere.sample(rng);
                WorldVector::new(x, y, z)
            };
            Ray::try_new(origin, direction)
                .filter(|ray| ray.direction.iter().all(|c| c.is_finite()))
                .unwrap_or_else(|| Ray::new(origin, WorldVector::x()))
        })
        .collect()
}

fn scenario_a() -> Vec<Triangle<WorldPoint>> {
    vec![
        Triangle::new(
            WorldPoint::new(0.0, 0.0, 0.0),
            WorldPoint::new(1.0, 0.0, 0.0),
            WorldPoint::new(1.0, 1.0, 0.0),
        ),
        Triangle::new(
            WorldPoint::new(0.0, 0.0, 0.0),
            WorldPoint::new(1.0, 1.0, 0.0),
            WorldPoint::new(0.0, 1.0, 0.0),
        ),
    ]
}

fn settings(strategy: BuildStrategy) -> BuildSettings {
    BuildSettings::builder()
        .strategy(strategy)
        .task_threshold(64)
        .build()
}

#[test_case(BuildStrategy::Sequential)]
#[test_case(BuildStrategy::Parallel)]
fn square(strategy: BuildStrategy) {
    let triangles = scenario_a();
    let bvh = Bvh::build(&triangles, &settings(strategy)).unwrap();
    let mut stack = TraversalStack::default();
    let down = WorldVector::new(0.0, 0.0, -1.0);

    let ray = Ray::new(WorldPoint::new(0.5, 0.5, 5.0), down);
    let_assert!(Some(hit) = bvh.closest_hit(&ray, FloatType::INFINITY, &mut stack));
    assert!(hit.distance == 5.0);
    assert!(hit.triangle_index < 2);
    assert!(bvh.any_hit(&ray, FloatType::INFINITY, &mut stack));

    let ray = Ray::new(WorldPoint::new(2.0, 2.0, 5.0), down);
    assert!(bvh.closest_hit(&ray, FloatType::INFINITY, &mut stack).is_none());
    assert!(!bvh.any_hit(&ray, FloatType::INFINITY, &mut stack));
}

#[test_case(BuildStrategy::Sequential)]
#[test_case(BuildStrategy::Parallel)]
fn random_soup_matches_brute_force(strategy: BuildStrategy) {
    let mut rng = SmallRng::seed_from_u64(1234);
    let triangles = random_triangle_soup(&mut rng, 10_000, 100.0, 1.0);
    let rays = random_rays(&mut rng, 1000, 120.0, &triangles);

    let bvh = Bvh::build(&triangles, &settings(strategy)).unwrap();
    let_assert!(Ok(()) = bvh.validate(&triangles));

    let hits = check_against_brute_force(&bvh, &triangles, &rays, FloatType::INFINITY);
    assert!(hits >= 400);

    // Limited distance, so that some of the hits are cut off
    check_against_brute_force(&bvh, &triangles, &rays, 30.0);
}

#[test_case(BuildStrategy::Sequential)]
#[test_case(BuildStrategy::Parallel)]
fn empty(strategy: BuildStrategy) {
    let triangles: Vec<Triangle<WorldPoint>> = Vec::new();
    let bvh = Bvh::build(&triangles, &settings(strategy)).unwrap();
    let mut stack = TraversalStack::default();

    assert!(bvh.root_bounds().is_empty());
    assert!(bvh.triangle_count() == 0);
    assert!(bvh.leaf_count() == 0);
    assert!(bvh.node_count() == 1);

    let mut rng = SmallRng::seed_from_u64(5);
    for ray in random_rays(&mut rng, 100, 10.0, &[]) {
        assert!(bvh.closest_hit(&ray, FloatType::INFINITY, &mut stack).is_none());
        assert!(!bvh.any_hit(&ray, FloatType::INFINITY, &mut stack));
    }
}

#[test_case(BuildStrategy::Sequential)]
#[test_case(BuildStrategy::Parallel)]
fn single_triangle(strategy: BuildStrategy) {
    let triangles = vec![scenario_a()[0]];
    let bvh = Bvh::build(&triangles, &settings(strategy)).unwrap();
    let mut stack = TraversalStack::default();

    assert!(bvh.leaf_count() == 1);
    assert!(bvh.statistics().leaf_fill.sum == 1);
    assert!(bvh.root_bounds() == triangles[0].bounding_box());
    let_assert!(Ok(()) = bvh.validate(&triangles));

    let ray = Ray::new(WorldPoint::new(0.75, 0.25, -2.0), WorldVector::z());
    let_assert!(Some(hit) = bvh.closest_hit(&ray, FloatType::INFINITY, &mut stack));
    assert!(hit.triangle_index == 0);
    assert!(hit.distance == 2.0);
}

/// Grid of small triangles, tested with rays parallel to coordinate axes and planes.
#[test_case(BuildStrategy::Sequential)]
#[test_case(BuildStrategy::Parallel)]
fn axis_aligned_rays(strategy: BuildStrategy) {
    let triangles: Vec<_> = (0..20)
        .flat_map(|i| (0..20).map(move |j| (i, j)))
        .map(|(i, j)| {
            let corner = WorldPoint::new(i as FloatType, j as FloatType, (i + j) as FloatType * 0.1);
            Triangle::new(
                corner,
                corner + WorldVector::new(0.8, 0.0, 0.0),
                corner + WorldVector::new(0.0, 0.8, 0.3),
            )
        })
        .collect();
    let bvh = Bvh::build(&triangles, &settings(strategy)).unwrap();

    let mut rays = Vec::new();
    for i in 0..40 {
        for j in 0..40 {
            let x = i as FloatType * 0.5 + 0.1;
            let y = j as FloatType * 0.5 + 0.1;
            rays.push(Ray::new(WorldPoint::new(x, y, 10.0), WorldVector::new(0.0, 0.0, -1.0)));
            rays.push(Ray::new(WorldPoint::new(x, y, -10.0), WorldVector::new(-0.0, 0.0, 1.0)));
            rays.push(Ray::new(WorldPoint::new(-5.0, y, x * 0.2), WorldVector::x()));
            rays.push(Ray::new(
                WorldPoint::new(x, y, 10.0),
                WorldVector::new(0.3, 0.0, -1.0),
            ));
        }
    }

    let hits = check_against_brute_force(&bvh, &triangles, &rays, FloatType::INFINITY);
    assert!(hits > 1000);
}

/// Rays parallel to an axis, lying exactly in a face plane of the bounding boxes.
#[test_case(BuildStrategy::Sequential)]
#[test_case(BuildStrategy::Parallel)]
fn rays_in_box_face_planes(strategy: BuildStrategy) {
    let triangles = vec![Triangle::new(
        WorldPoint::new(0.0, 0.0, 0.0),
        WorldPoint::new(2.0, 0.0, 1.0),
        WorldPoint::new(0.0, 2.0, 1.0),
    )];
    let bvh = Bvh::build(&triangles, &settings(strategy)).unwrap();

    // Passes through the edge at z = 1, the top of the root box
    let ray = Ray::new(WorldPoint::new(-5.0, 0.5, 1.0), WorldVector::x());
    let_assert!(Some((distance, 0)) = brute_force(&triangles, &ray, FloatType::INFINITY));
    assert!((distance - 6.5).abs() < 1e-5);
    let hits = check_against_brute_force(&bvh, &triangles, &[ray], FloatType::INFINITY);
    assert!(hits == 1);

    // Unit cube, grazed along its faces and edges
    let corners: Vec<_> = (0..8)
        .map(|i: u32| {
            WorldPoint::new(
                (i & 1) as FloatType,
                ((i >> 1) & 1) as FloatType,
                (i >> 2) as FloatType,
            )
        })
        .collect();
    let faces = [
        [0, 1, 3, 2],
        [4, 5, 7, 6],
        [0, 1, 5, 4],
        [2, 3, 7, 6],
        [0, 2, 6, 4],
        [1, 3, 7, 5],
    ];
    let cube: Vec<_> = faces
        .iter()
        .flat_map(|[a, b, c, d]| {
            [
                Triangle::new(corners[*a], corners[*b], corners[*c]),
                Triangle::new(corners[*a], corners[*c], corners[*d]),
            ]
        })
        .collect();
    let bvh = Bvh::build(&cube, &settings(strategy)).unwrap();

    let mut rays = Vec::new();
    for a in [0.0, 0.5, 1.0] {
        for b in [0.0, 0.25, 1.0] {
            rays.push(Ray::new(WorldPoint::new(-3.0, a, b), WorldVector::x()));
            rays.push(Ray::new(WorldPoint::new(a, 4.0, b), -WorldVector::y()));
            rays.push(Ray::new(WorldPoint::new(a, b, -3.0), WorldVector::z()));
            rays.push(Ray::new(WorldPoint::new(a, b, 2.0), WorldVector::new(-0.0, 0.0, -1.0)));
        }
    }
    let hits = check_against_brute_force(&bvh, &cube, &rays, FloatType::INFINITY);
    assert!(hits > 0);
}

#[test_case(BuildStrategy::Sequential)]
#[test_case(BuildStrategy::Parallel)]
fn coincident_triangles(strategy: BuildStrategy) {
    let triangles = vec![scenario_a()[1]; 500];
    let bvh = Bvh::build(&triangles, &settings(strategy)).unwrap();
    let mut stack = TraversalStack::default();

    let_assert!(Ok(()) = bvh.validate(&triangles));
    // Too many to fit a single leaf, no split is worth it according to the cost model
    assert!(bvh.statistics().median_splits > 0);
    assert!(bvh.statistics().leaf_depth.max <= MAX_DEPTH);

    let ray = Ray::new(WorldPoint::new(0.25, 0.75, 1.0), WorldVector::new(0.0, 0.0, -1.0));
    let_assert!(Some(hit) = bvh.closest_hit(&ray, FloatType::INFINITY, &mut stack));
    assert!(hit.distance == 1.0);
}

#[test_case(BuildStrategy::Sequential)]
#[test_case(BuildStrategy::Parallel)]
fn degenerate_and_nan_triangles(strategy: BuildStrategy) {
    let mut rng = SmallRng::seed_from_u64(99);
    let mut triangles = random_triangle_soup(&mut rng, 300, 20.0, 1.0);

    let nan = WorldPoint::new(FloatType::NAN, FloatType::NAN, FloatType::NAN);
    for i in 0..30 {
        let p = triangles[i * 10][0];
        triangles[i * 10 + 1] = Triangle::new(p, p, p);
        triangles[i * 10 + 2] = Triangle::new(p, p + WorldVector::x(), p + WorldVector::x() * 2.0);
        triangles[i * 10 + 3] = Triangle::new(nan, p, p + WorldVector::y());
        triangles[i * 10 + 4] = Triangle::new(nan, nan, nan);
    }

    let_assert!(Ok(bvh) = Bvh::build(&triangles, &settings(strategy)));
    let_assert!(Ok(()) = bvh.validate(&triangles));

    let rays = random_rays(&mut rng, 500, 30.0, &triangles);
    check_against_brute_force(&bvh, &triangles, &rays, FloatType::INFINITY);
}

/// Triangles sharing a corner with sizes growing exponentially, giving very unbalanced splits.
#[test_case(BuildStrategy::Sequential)]
#[test_case(BuildStrategy::Parallel)]
fn nested_triangles(strategy: BuildStrategy) {
    let triangles: Vec<_> = (0..60)
        .map(|i| {
            let size = (2.0 as FloatType).powi(i - 20);
            Triangle::new(
                WorldPoint::new(0.0, 0.0, i as FloatType * 1e-3),
                WorldPoint::new(size, 0.0, 0.0),
                WorldPoint::new(0.0, size, 0.0),
            )
        })
        .collect();
    let bvh = Bvh::build(&triangles, &settings(strategy)).unwrap();

    let_assert!(Ok(()) = bvh.validate(&triangles));
    assert!(bvh.statistics().leaf_depth.max <= MAX_DEPTH);

    let mut rng = SmallRng::seed_from_u64(3);
    let rays = random_rays(&mut rng, 300, 4.0, &triangles);
    check_against_brute_force(&bvh, &triangles, &rays, FloatType::INFINITY);
}

#[test_case(BuildStrategy::Sequential)]
#[test_case(BuildStrategy::Parallel)]
fn rebuild_gives_same_answers(strategy: BuildStrategy) {
    let mut rng = SmallRng::seed_from_u64(77);
    let triangles = random_triangle_soup(&mut rng, 2000, 50.0, 1.0);
    let rays = random_rays(&mut rng, 300, 60.0, &triangles);

    let a = Bvh::build(&triangles, &settings(strategy)).unwrap();
    let b = Bvh::build(&triangles, &settings(strategy)).unwrap();
    assert!(a.leaves.raw == b.leaves.raw);

    let mut stack = TraversalStack::default();
    for ray in &rays {
        let hit_a = a.closest_hit(ray, FloatType::INFINITY, &mut stack);
        let hit_b = b.closest_hit(ray, FloatType::INFINITY, &mut stack);
        assert!(hit_a == hit_b);
    }
}

#[test]
fn min_t_skips_starting_surface() {
    let triangles = scenario_a();
    let bvh = Bvh::build(&triangles, &BuildSettings::default()).unwrap();
    let mut stack = TraversalStack::default();

    let ray = Ray::new(WorldPoint::new(0.25, 0.75, 0.0), WorldVector::z());
    let_assert!(Some(hit) = bvh.closest_hit(&ray, FloatType::INFINITY, &mut stack));
    assert!(hit.distance == 0.0);

    let ray = ray.with_min_t(1e-3);
    assert!(bvh.closest_hit(&ray, FloatType::INFINITY, &mut stack).is_none());
    assert!(!bvh.any_hit(&ray, FloatType::INFINITY, &mut stack));
}

#[test]
fn concurrent_queries() {
    let mut rng = SmallRng::seed_from_u64(11);
    let triangles = random_triangle_soup(&mut rng, 3000, 50.0, 1.0);
    let rays = random_rays(&mut rng, 2000, 60.0, &triangles);
    let bvh = Bvh::build(&triangles, &BuildSettings::default()).unwrap();

    let mut stack = TraversalStack::default();
    let sequential: Vec<_> = rays
        .iter()
        .map(|ray| bvh.closest_hit(ray, FloatType::INFINITY, &mut stack))
        .collect();
    let parallel: Vec<_> = rays
        .par_iter()
        .map_init(TraversalStack::default, |stack, ray| {
            bvh.closest_hit(ray, FloatType::INFINITY, stack)
        })
        .collect();

    assert!(sequential == parallel);
}

#[test]
fn sink_receives_statistics() {
    let triangles = scenario_a();
    let mut received = Vec::new();
    let bvh = Bvh::build_with_sink(
        &triangles,
        &BuildSettings::default(),
        &mut |statistics: &BuildStatistics| received.push(statistics.clone()),
    )
    .unwrap();

    assert!(received.len() == 1);
    assert!(&received[0] == bvh.statistics());
    assert!(received[0].triangle_count == 2);
    assert!(received[0].node_count == bvh.node_count());
}

#[test]
fn parallel_build_counts_tasks() {
    let mut rng = SmallRng::seed_from_u64(8);
    let triangles = random_triangle_soup(&mut rng, 5000, 50.0, 1.0);
    let settings = BuildSettings::builder()
        .strategy(BuildStrategy::Parallel)
        .task_threshold(256)
        .build();
    let bvh = Bvh::build(&triangles, &settings).unwrap();

    let statistics = bvh.statistics();
    assert!(statistics.parallel_tasks > 1);
    assert!(statistics.leaf_fill.sum == 5000);
    assert!(statistics.leaf_count == bvh.leaf_count());
    let_assert!(Ok(()) = bvh.validate(&triangles));
}

#[test]
fn invalid_settings_are_rejected() {
    let settings = BuildSettings::builder().bin_count(0).build();
    let_assert!(Err(BuildError::InvalidSettings(_)) = Bvh::build(&scenario_a(), &settings));
}

struct Huge;

impl TriangleVertexSource for Huge {
    fn triangle_count(&self) -> usize {
        MAX_TRIANGLES + 1
    }

    fn position(&self, _triangle: usize, _vertex: usize) -> WorldPoint {
        WorldPoint::origin()
    }
}

#[test]
fn too_many_triangles() {
    let_assert!(
        Err(BuildError::TooManyTriangles { count, max }) =
            Bvh::build(&Huge, &BuildSettings::default())
    );
    assert!(count == MAX_TRIANGLES + 1);
    assert!(max == MAX_TRIANGLES);
}
