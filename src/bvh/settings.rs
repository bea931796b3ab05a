use std::num::NonZeroUsize;

use bon::bon;

use super::{BuildError, MAX_LEAF_TRIANGLES};
use crate::geometry::FloatType;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum BuildStrategy {
    /// Exact SAH over fully sorted centroids, single threaded and deterministic.
    #[default]
    Sequential,
    /// Binned SAH, subtrees built as independent tasks on a thread pool.
    Parallel,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum WorkerCount {
    /// One worker per logical CPU.
    #[default]
    Auto,
    Manual(NonZeroUsize),
}

impl WorkerCount {
    pub fn resolve(&self) -> usize {
        match self {
            WorkerCount::Auto => num_cpus::get().max(1),
            WorkerCount::Manual(count) => count.get(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BuildSettings {
    pub strategy: BuildStrategy,

    /// Nodes with this many triangles or fewer always become leaves.
    pub leaf_threshold: usize,

    /// Cost of visiting one inner node, relative to `intersection_cost`.
    pub traversal_cost: FloatType,
    /// Cost of intersecting one triangle.
    pub intersection_cost: FloatType,

    /// Number of centroid bins per axis of the parallel builder.
    pub bin_count: usize,
    /// Subtrees with fewer triangles than this are built as one task by the parallel builder.
    pub task_threshold: usize,

    pub worker_count: WorkerCount,
}

#[bon]
impl BuildSettings {
    #[builder]
    pub fn new(
        #[builder(default)] strategy: BuildStrategy,
        #[builder(default = 4)] leaf_threshold: usize,
        #[builder(default = 1.0)] traversal_cost: FloatType,
        #[builder(default = 4.0)] intersection_cost: FloatType,
        #[builder(default = 16)] bin_count: usize,
        #[builder(default = 4096)] task_threshold: usize,
        #[builder(default)] worker_count: WorkerCount,
    ) -> Self {
        BuildSettings {
            strategy,
            leaf_threshold,
            traversal_cost,
            intersection_cost,
            bin_count,
            task_threshold,
            worker_count,
        }
    }
}

impl BuildSettings {
    pub const MIN_BIN_COUNT: usize = 2;
    pub const MAX_BIN_COUNT: usize = 256;

    pub fn validate(&self) -> Result<(), BuildError> {
        if !(1..=MAX_LEAF_TRIANGLES).contains(&self.leaf_threshold) {
            return Err(BuildError::InvalidSettings(
                "leaf threshold must be between 1 and the maximum leaf size",
            ));
        }
        if !(self.traversal_cost.is_finite() && self.traversal_cost > 0.0) {
            return Err(BuildError::InvalidSettings(
                "traversal cost must be finite and positive",
            ));
        }
        if !(self.intersection_cost.is_finite() && self.intersection_cost > 0.0) {
            return Err(BuildError::InvalidSettings(
                "intersection cost must be finite and positive",
            ));
        }
        if !(Self::MIN_BIN_COUNT..=Self::MAX_BIN_COUNT).contains(&self.bin_count) {
            return Err(BuildError::InvalidSettings(
                "bin count must be between 2 and 256",
            ));
        }
        if self.task_threshold == 0 {
            return Err(BuildError::InvalidSettings("task threshold must be positive"));
        }
        Ok(())
    }
}

impl Default for BuildSettings {
    fn default() -> Self {
        BuildSettings::builder().build()
    }
}
