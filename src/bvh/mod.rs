//! Binary SAH bounding volume hierarchy over a static set of triangles.
//!
//! The tree is stored as an arena of cache line sized nodes. Each node holds the boxes
//! of both of its children and a packed link per child that either points to another
//! node or to a range of 4-wide triangle batches.

mod building;
mod cost;
mod error;
mod node;
mod orderings;
mod primitives;
mod printing;
mod ray_bvh_intersection;
mod settings;
mod statistics;
mod validation;

#[cfg(test)]
mod test;

use index_vec::IndexVec;

use crate::geometry::{TriangleBatch, WorldBox};

use node::BvhNode;

pub use error::BuildError;
pub use ray_bvh_intersection::{Hit, TraversalStack};
pub use settings::{BuildSettings, BuildStrategy, WorkerCount};
pub use statistics::{BuildStatistics, DiagnosticsSink, LogSink};
pub use validation::ValidationError;

/// Maximum depth of a leaf, root being at depth 0.
pub const MAX_DEPTH: usize = 63;
/// Number of triangles intersected together.
pub const BATCH_WIDTH: usize = 4;
pub const MAX_LEAF_BATCHES: usize = ChildLink::MAX_COUNT as usize;
pub const MAX_LEAF_TRIANGLES: usize = BATCH_WIDTH * MAX_LEAF_BATCHES;

/// Largest number of triangles a BVH can hold, limited by the packed batch index.
pub const MAX_TRIANGLES: usize = ChildLink::MAX_INDEX as usize;

#[derive(Clone, Debug)]
pub struct Bvh {
    bounds: WorldBox,

    /// Node 0 is the root and is always an inner node.
    nodes: IndexVec<NodeIdx, BvhNode>,

    /// Triangle indices of leaves, padded to full batches by repeating the last index.
    leaves: IndexVec<BatchIdx, [u32; BATCH_WIDTH]>,
    /// Intersection-ready triangles, parallel to `leaves`.
    triangles: IndexVec<BatchIdx, TriangleBatch>,

    triangle_count: usize,
    statistics: BuildStatistics,
}

impl Bvh {
    /// Bounding box of all triangles, the empty box if there are none.
    pub fn root_bounds(&self) -> WorldBox {
        self.bounds
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.statistics.leaf_count
    }

    pub fn triangle_count(&self) -> usize {
        self.triangle_count
    }

    pub fn statistics(&self) -> &BuildStatistics {
        &self.statistics
    }
}

/// Packed reference to a child of a node.
///
/// Low [`ChildLink::COUNT_BITS`] bits hold the number of triangle batches of a leaf,
/// zero meaning an inner node. The remaining bits hold index of the node or of the first batch.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChildLink(u32);

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum NodeLink {
    Empty,
    Inner { index: NodeIdx },
    Leaf { batches: BatchRange },
}

impl ChildLink {
    const COUNT_BITS: u32 = 4;
    const COUNT_MASK: u32 = (1 << Self::COUNT_BITS) - 1;
    const EMPTY_VALUE: u32 = (u32::MAX >> Self::COUNT_BITS) << Self::COUNT_BITS;

    pub const MAX_INDEX: u32 = (u32::MAX >> Self::COUNT_BITS) - 1;
    pub const MIN_COUNT: u32 = 1;
    pub const MAX_COUNT: u32 = (1 << Self::COUNT_BITS) - 1;

    pub const EMPTY: Self = Self(Self::EMPTY_VALUE);

    /// Create a new leaf link, panics if index or count are out of range
    pub fn new_leaf(first: BatchIdx, count: u32) -> Self {
        assert!(count >= Self::MIN_COUNT, "Leaf must have at least one batch");
        assert!(
            count <= Self::MAX_COUNT,
            "Leaf with {count} batches exceeds {}",
            Self::MAX_COUNT
        );
        assert!(first.raw() <= Self::MAX_INDEX, "Batch index out of range");
        Self(first.raw() << Self::COUNT_BITS | count)
    }

    /// Create a new inner node link, panics if index is out of range
    pub fn new_inner(index: NodeIdx) -> Self {
        assert!(index.raw() <= Self::MAX_INDEX, "Node index out of range");
        Self(index.raw() << Self::COUNT_BITS)
    }

    #[inline(always)]
    pub fn decode(&self) -> NodeLink {
        if self.is_empty() {
            NodeLink::Empty
        } else {
            let count = self.0 & Self::COUNT_MASK;
            let index = self.0 >> Self::COUNT_BITS;

            if count == 0 {
                NodeLink::Inner {
                    index: NodeIdx::from_raw_unchecked(index),
                }
            } else {
                NodeLink::Leaf {
                    batches: BatchRange::new(BatchIdx::from_raw_unchecked(index), count),
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0 == Self::EMPTY_VALUE
    }

    /// Moves the link into an arena where this link's node and batch arrays start
    /// at the given offsets.
    pub fn rebased(self, node_base: usize, batch_base: usize) -> Self {
        match self.decode() {
            NodeLink::Empty => self,
            NodeLink::Inner { index } => Self::new_inner(index + node_base),
            NodeLink::Leaf { batches } => {
                Self::new_leaf(batches.first + batch_base, batches.len())
            }
        }
    }
}

impl Default for ChildLink {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl std::fmt::Debug for ChildLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildLink")
            .field("0", &self.0)
            .field("<decoded>", &self.decode())
            .finish()
    }
}

index_vec::define_index_type! {
    pub(crate) struct NodeIdx = u32;
    MAX_INDEX = ChildLink::MAX_INDEX as usize;
    IMPL_RAW_CONVERSIONS = true;
}

index_vec::define_index_type! {
    pub(crate) struct BatchIdx = u32;
    MAX_INDEX = ChildLink::MAX_INDEX as usize;
    IMPL_RAW_CONVERSIONS = true;
}

/// Range of triangle batches of a single leaf.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct BatchRange {
    pub first: BatchIdx,
    pub count: u32,
}

impl BatchRange {
    pub fn new(first: BatchIdx, count: u32) -> BatchRange {
        BatchRange { first, count }
    }

    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn end(&self) -> usize {
        self.first.index() + self.count as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = BatchIdx> {
        (self.first.raw()..self.first.raw() + self.count).map(BatchIdx::from_raw_unchecked)
    }
}
