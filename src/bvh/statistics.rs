use std::{fmt, time::Duration};

use log::info;

use crate::util::Stats;

use super::BATCH_WIDTH;

/// Why the builder stopped splitting a node.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) enum LeafReason {
    /// Few enough triangles to never split.
    Threshold,
    /// No split was cheaper than intersecting all triangles.
    Cost,
    /// Maximum depth reached.
    DepthLimit,
}

/// Diagnostic counters collected while building.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuildStatistics {
    pub triangle_count: usize,
    pub node_count: usize,
    pub leaf_count: usize,
    /// Triangle references stored in leaves, including padding.
    pub padded_references: usize,

    pub leaf_depth: Stats,
    /// Real triangles per leaf.
    pub leaf_fill: Stats,

    pub threshold_leaves: usize,
    pub cost_leaves: usize,
    pub depth_limit_leaves: usize,
    pub median_splits: usize,

    /// Subtrees built as independent tasks by the parallel builder.
    pub parallel_tasks: usize,

    pub build_time: Duration,
}

impl BuildStatistics {
    pub(super) fn record_leaf(&mut self, depth: usize, triangles: usize, reason: LeafReason) {
        self.leaf_count += 1;
        self.padded_references += triangles.div_ceil(BATCH_WIDTH) * BATCH_WIDTH;
        self.leaf_depth.add_sample(depth);
        self.leaf_fill.add_sample(triangles);
        match reason {
            LeafReason::Threshold => self.threshold_leaves += 1,
            LeafReason::Cost => self.cost_leaves += 1,
            LeafReason::DepthLimit => self.depth_limit_leaves += 1,
        }
    }

    /// Adds counters of a part of the tree built separately.
    pub(super) fn merge(&mut self, other: &BuildStatistics) {
        self.leaf_count += other.leaf_count;
        self.padded_references += other.padded_references;
        self.leaf_depth.merge(&other.leaf_depth);
        self.leaf_fill.merge(&other.leaf_fill);
        self.threshold_leaves += other.threshold_leaves;
        self.cost_leaves += other.cost_leaves;
        self.depth_limit_leaves += other.depth_limit_leaves;
        self.median_splits += other.median_splits;
        self.parallel_tasks += other.parallel_tasks;
    }
}

impl fmt::Display for BuildStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Triangles: {} ({} references with padding)",
            self.triangle_count, self.padded_references
        )?;
        writeln!(f, "Nodes: {}, leaves: {}", self.node_count, self.leaf_count)?;
        writeln!(f, "Leaf depth: {}", self.leaf_depth)?;
        writeln!(f, "Leaf fill: {}", self.leaf_fill)?;
        writeln!(
            f,
            "Leaves by reason: {} threshold, {} cost, {} depth limit",
            self.threshold_leaves, self.cost_leaves, self.depth_limit_leaves
        )?;
        writeln!(f, "Median splits: {}", self.median_splits)?;
        writeln!(f, "Parallel tasks: {}", self.parallel_tasks)?;
        write!(f, "Build time: {:.1?}", self.build_time)
    }
}

/// Receives statistics of finished builds.
pub trait DiagnosticsSink {
    fn build_finished(&mut self, statistics: &BuildStatistics);
}

impl<F: FnMut(&BuildStatistics)> DiagnosticsSink for F {
    fn build_finished(&mut self, statistics: &BuildStatistics) {
        self(statistics)
    }
}

/// Logs a one line summary of every build.
#[derive(Copy, Clone, Debug, Default)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn build_finished(&mut self, statistics: &BuildStatistics) {
        info!(
            "Built BVH over {} triangles in {:.1?}: {} nodes, {} leaves, leaf depth {}",
            statistics.triangle_count,
            statistics.build_time,
            statistics.node_count,
            statistics.leaf_count,
            statistics.leaf_depth,
        );
    }
}
