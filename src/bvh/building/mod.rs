mod binned;
mod sequential;

use std::time::Instant;

use index_vec::IndexVec;
use log::debug;

use crate::{
    geometry::{TriangleBatch, WorldBox},
    mesh::TriangleVertexSource,
};

use super::{
    BATCH_WIDTH, BatchIdx, BuildError, BuildSettings, BuildStatistics, BuildStrategy, Bvh,
    ChildLink, DiagnosticsSink, LogSink, MAX_DEPTH, MAX_LEAF_BATCHES, MAX_LEAF_TRIANGLES,
    MAX_TRIANGLES, NodeIdx, NodeLink,
    cost::{SahCost, SplitCandidate},
    node::{BvhNode, Side},
    primitives::BuildPrimitives,
    statistics::LeafReason,
};

impl Bvh {
    /// Builds the hierarchy, logging a summary when done.
    pub fn build<S: TriangleVertexSource + ?Sized>(
        source: &S,
        settings: &BuildSettings,
    ) -> Result<Bvh, BuildError> {
        Self::build_with_sink(source, settings, &mut LogSink)
    }

    /// Builds the hierarchy, passing statistics of the finished build to `sink`.
    /// Blocks until all worker tasks finish.
    pub fn build_with_sink<S: TriangleVertexSource + ?Sized>(
        source: &S,
        settings: &BuildSettings,
        sink: &mut impl DiagnosticsSink,
    ) -> Result<Bvh, BuildError> {
        settings.validate()?;

        let triangle_count = source.triangle_count();
        if triangle_count > MAX_TRIANGLES {
            return Err(BuildError::TooManyTriangles {
                count: triangle_count,
                max: MAX_TRIANGLES,
            });
        }

        let start = Instant::now();
        let primitives = BuildPrimitives::new(source)?;

        let mut topology = if triangle_count == 0 {
            Topology::new().into_rooted(ChildLink::EMPTY, WorldBox::empty())?
        } else {
            match settings.strategy {
                BuildStrategy::Sequential => sequential::build(&primitives, settings)?,
                BuildStrategy::Parallel => binned::build(&primitives, settings)?,
            }
        };
        debug!(
            "Built topology: {} nodes, {} batches",
            topology.nodes.len(),
            topology.leaves.len()
        );

        let triangles = build_triangle_cache(source, &topology.leaves)?;
        debug!("Built triangle cache");

        topology.statistics.triangle_count = triangle_count;
        topology.statistics.node_count = topology.nodes.len();
        topology.statistics.build_time = start.elapsed();

        let bvh = Bvh {
            bounds: primitives.bounds,
            nodes: topology.nodes,
            leaves: topology.leaves,
            triangles,
            triangle_count,
            statistics: topology.statistics,
        };
        sink.build_finished(&bvh.statistics);

        Ok(bvh)
    }
}

/// Intersection-ready copy of the triangles, in leaf order.
fn build_triangle_cache<S: TriangleVertexSource + ?Sized>(
    source: &S,
    leaves: &IndexVec<BatchIdx, [u32; BATCH_WIDTH]>,
) -> Result<IndexVec<BatchIdx, TriangleBatch>, BuildError> {
    let mut triangles = IndexVec::new();
    triangles.raw.try_reserve_exact(leaves.len())?;
    triangles.extend(
        leaves
            .iter()
            .map(|batch| TriangleBatch::new(batch.map(|i| source.triangle(i as usize)))),
    );
    Ok(triangles)
}

/// Nodes and leaves of a tree (or a part of it) under construction.
#[derive(Debug, Default)]
pub(super) struct Topology {
    pub nodes: IndexVec<NodeIdx, BvhNode>,
    pub leaves: IndexVec<BatchIdx, [u32; BATCH_WIDTH]>,
    pub statistics: BuildStatistics,
}

impl Topology {
    pub fn new() -> Topology {
        Topology::default()
    }

    /// Topology with enough space preallocated for any tree over `triangle_count` triangles.
    pub fn with_capacity(triangle_count: usize) -> Result<Topology, BuildError> {
        let mut topology = Topology::new();
        topology
            .nodes
            .raw
            .try_reserve_exact(triangle_count.saturating_sub(1).max(1))?;
        topology.leaves.raw.try_reserve_exact(triangle_count)?;
        Ok(topology)
    }

    pub fn push_node(&mut self, node: BvhNode) -> Result<NodeIdx, BuildError> {
        self.nodes.raw.try_reserve(1)?;
        Ok(self.nodes.push(node))
    }

    /// Stores the triangles as a leaf, padding the last batch by repeating the last triangle.
    /// Panics if the triangles don't fit into a single leaf.
    pub fn make_leaf(
        &mut self,
        triangles: &[u32],
        depth: usize,
        reason: LeafReason,
    ) -> Result<ChildLink, BuildError> {
        let batch_count = triangles.len().div_ceil(BATCH_WIDTH);
        assert!(
            (1..=MAX_LEAF_BATCHES).contains(&batch_count),
            "Leaf with {} triangles doesn't fit into {MAX_LEAF_BATCHES} batches",
            triangles.len()
        );

        self.leaves.raw.try_reserve(batch_count)?;
        let first = self.leaves.next_idx();
        for chunk in triangles.chunks(BATCH_WIDTH) {
            let mut batch = [chunk[chunk.len() - 1]; BATCH_WIDTH];
            batch[..chunk.len()].copy_from_slice(chunk);
            self.leaves.push(batch);
        }

        self.statistics.record_leaf(depth, triangles.len(), reason);
        Ok(ChildLink::new_leaf(first, batch_count as u32))
    }

    /// Appends a separately built topology, returning its root link valid in self.
    pub fn append(&mut self, other: Topology, root: ChildLink) -> Result<ChildLink, BuildError> {
        let node_base = self.nodes.len();
        let batch_base = self.leaves.len();

        self.nodes.raw.try_reserve(other.nodes.len())?;
        self.nodes.extend(other.nodes.into_iter().map(|mut node| {
            for side in Side::BOTH {
                node.set_link(side, node.link(side).rebased(node_base, batch_base));
            }
            node
        }));

        self.leaves.raw.try_reserve(other.leaves.len())?;
        self.leaves.extend(other.leaves);

        self.statistics.merge(&other.statistics);

        Ok(root.rebased(node_base, batch_base))
    }

    /// Makes node 0 the root inner node.
    /// Trees whose root is a leaf (or nothing at all) get a node with the root on the left
    /// and an empty right child.
    pub fn into_rooted(mut self, root: ChildLink, bounds: WorldBox) -> Result<Topology, BuildError> {
        match root.decode() {
            NodeLink::Inner { index } => {
                assert!(index.raw() == 0, "Root must be the first allocated node");
            }
            NodeLink::Leaf { .. } | NodeLink::Empty => {
                assert!(self.nodes.is_empty(), "Leaf root with allocated nodes");
                self.push_node(BvhNode::new_single((bounds, root)))?;
            }
        }
        Ok(self)
    }
}

/// Best split of a node, with the builder specific data needed to carry it out.
#[derive(Copy, Clone, Debug)]
pub(super) struct Split<T> {
    pub candidate: SplitCandidate,
    pub left_count: usize,
    pub extra: T,
}

#[derive(Copy, Clone, Debug)]
pub(super) enum Decision<T> {
    Leaf(LeafReason),
    Split(Split<T>),
    /// Split by centroid median along the longest axis.
    Median,
}

/// Leaf decisions that don't need any split evaluated.
pub(super) fn forced_leaf(count: usize, depth: usize, settings: &BuildSettings) -> Option<LeafReason> {
    if count <= settings.leaf_threshold {
        Some(LeafReason::Threshold)
    } else if depth >= MAX_DEPTH {
        Some(LeafReason::DepthLimit)
    } else {
        None
    }
}

/// Chooses between the best split and a leaf.
/// Falls back to a median split whenever keeping the cost model's choice could produce
/// a leaf too large to store.
pub(super) fn decide<T>(
    count: usize,
    depth: usize,
    cost: &SahCost,
    split: Option<Split<T>>,
) -> Decision<T> {
    match split {
        Some(split) if split.candidate.cost < cost.leaf_cost(count) => {
            let right_count = count - split.left_count;
            if fits_below(split.left_count, depth + 1) && fits_below(right_count, depth + 1) {
                Decision::Split(split)
            } else {
                Decision::Median
            }
        }
        _ if count <= MAX_LEAF_TRIANGLES => Decision::Leaf(LeafReason::Cost),
        // A leaf link counts at most MAX_LEAF_BATCHES batches, larger nodes must be split
        // even when the cost model prefers a leaf.
        _ => Decision::Median,
    }
}

/// Can a subtree with `count` triangles rooted at `depth` be built with median splits
/// without exceeding the leaf size at maximum depth.
pub(super) fn fits_below(count: usize, depth: usize) -> bool {
    let levels = MAX_DEPTH.saturating_sub(depth);
    if levels >= 32 {
        true
    } else {
        (count as u64) <= (MAX_LEAF_TRIANGLES as u64) << levels
    }
}
