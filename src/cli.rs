use std::{num::NonZeroUsize, path::PathBuf, time::Instant};

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use rand::{Rng, SeedableRng as _, rngs::SmallRng};
use rand_distr::{Distribution as _, UnitSphere};
use rayon::prelude::*;

use tribvh::{
    BuildSettings, BuildStrategy, Bvh, IndexedMesh, Ray, TraversalStack, TriangleVertexSource,
    WorkerCount,
    geometry::{FloatType, Triangle, WorldBox, WorldPoint, WorldVector},
    mesh::random_triangle_soup,
};

const RAY_CHUNK: usize = 4096;

#[derive(Parser)]
#[command(name = "tribvh-cli")]
#[command(about = "Builds a BVH over a triangle mesh and traces random rays against it", long_about = None)]
struct Cli {
    /// Wavefront OBJ file to load, a random triangle soup is generated if missing
    #[arg(long)]
    obj: Option<PathBuf>,

    /// Number of triangles of the random soup
    #[arg(long, default_value_t = 100_000)]
    triangles: usize,

    /// Number of random rays to trace
    #[arg(long, default_value_t = 1_000_000)]
    rays: usize,

    #[arg(long, value_enum, default_value_t = Strategy::Parallel)]
    strategy: Strategy,

    /// Worker threads for building and tracing, one per CPU if missing
    #[arg(long)]
    threads: Option<NonZeroUsize>,

    /// Centroid bins per axis of the parallel builder
    #[arg(long, default_value_t = 16)]
    bins: usize,

    /// Check structural invariants of the built tree
    #[arg(long)]
    validate: bool,

    /// Dump the node hierarchy to stdout
    #[arg(long)]
    print_tree: bool,

    #[arg(long, default_value_t = 0)]
    seed: u64,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Strategy {
    Sequential,
    Parallel,
}

impl From<Strategy> for BuildStrategy {
    fn from(value: Strategy) -> Self {
        match value {
            Strategy::Sequential => BuildStrategy::Sequential,
            Strategy::Parallel => BuildStrategy::Parallel,
        }
    }
}

enum Source {
    Mesh(IndexedMesh),
    Soup(Vec<Triangle<WorldPoint>>),
}

impl Source {
    fn as_dyn(&self) -> &dyn TriangleVertexSource {
        match self {
            Source::Mesh(mesh) => mesh,
            Source::Soup(triangles) => triangles,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut rng = SmallRng::seed_from_u64(cli.seed);

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads.get())
            .build_global()
            .context("Failed to set up tracing threads")?;
    }

    let source = match &cli.obj {
        Some(path) => Source::Mesh(
            IndexedMesh::from_obj(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
        ),
        None => {
            let side = (cli.triangles as FloatType).cbrt() * 2.0;
            Source::Soup(random_triangle_soup(&mut rng, cli.triangles, side, 1.0))
        }
    };
    let source = source.as_dyn();

    let settings = BuildSettings::builder()
        .strategy(cli.strategy.into())
        .bin_count(cli.bins)
        .worker_count(cli.threads.map_or(WorkerCount::Auto, WorkerCount::Manual))
        .build();
    let bvh = Bvh::build(source, &settings)?;
    println!("{}", bvh.statistics());

    if cli.validate {
        bvh.validate(source)?;
        info!("Tree is valid");
    }

    if cli.print_tree {
        let mut tree = String::new();
        bvh.write_tree(&mut tree)?;
        print!("{tree}");
    }

    let rays = random_rays(&mut rng, cli.rays, &bvh.root_bounds());
    let max_t = bvh.root_bounds().size().norm() * 2.0;

    let bar = ProgressBar::new(rays.len() as u64);
    bar.set_style(ProgressStyle::with_template(
        "{wide_bar} {pos}/{len} rays, {per_sec}, eta {eta}",
    )?);

    let start = Instant::now();
    let (closest_hits, any_hits) = rays
        .par_chunks(RAY_CHUNK)
        .map_init(TraversalStack::default, |stack, chunk| {
            let mut counts = (0usize, 0usize);
            for ray in chunk {
                if bvh.closest_hit(ray, FloatType::INFINITY, stack).is_some() {
                    counts.0 += 1;
                }
                if bvh.any_hit(ray, max_t, stack) {
                    counts.1 += 1;
                }
            }
            bar.inc(chunk.len() as u64);
            counts
        })
        .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1));
    let elapsed = start.elapsed();
    bar.finish_and_clear();

    println!(
        "Traced {} rays in {:.2?} ({:.0} rays/s): {} closest hits, {} within {:.1}",
        rays.len(),
        elapsed,
        rays.len() as f64 / elapsed.as_secs_f64(),
        closest_hits,
        any_hits,
        max_t
    );

    Ok(())
}

/// Rays starting anywhere within the (slightly enlarged) bounds, in uniformly random directions.
fn random_rays(rng: &mut impl Rng, count: usize, bounds: &WorldBox) -> Vec<Ray> {
    if bounds.is_empty() {
        return (0..count)
            .map(|_| Ray::new(WorldPoint::origin(), WorldVector::z()))
            .collect();
    }

    let margin = bounds.size() * 0.1;
    let min = bounds.min - margin;
    let max = bounds.max + margin;
    (0..count)
        .map(|_| {
            let origin = WorldPoint::new(
                rng.random_range(min.x..=max.x),
                rng.random_range(min.y..=max.y),
                rng.random_range(min.z..=max.z),
            );
            let [x, y, z]: [FloatType; 3] = UnitSphere.sample(rng);
            Ray::new(origin, WorldVector::new(x, y, z))
        })
        .collect()
}
