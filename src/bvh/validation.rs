use thiserror::Error;

use super::{BATCH_WIDTH, BatchIdx, BatchRange, Bvh, MAX_DEPTH, NodeIdx, NodeLink, node::Side};
use crate::{geometry::WorldBox, mesh::TriangleVertexSource};

/// Broken structural invariant found by [`Bvh::validate`].
/// Children are numbered 0 for left and 1 for right.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Tree holds {actual} triangles, the source has {expected}")]
    TriangleCountMismatch { expected: usize, actual: usize },

    #[error("Tree has no root node")]
    MissingRoot,

    #[error("Child {child} of node {node} points outside of the arena")]
    LinkOutOfRange { node: usize, child: usize },

    #[error("Child {child} of node {node} is at depth {depth}, deeper than the maximum")]
    TooDeep {
        node: usize,
        child: usize,
        depth: usize,
    },

    #[error("Node {node} is referenced more than once")]
    NodeReferencedTwice { node: usize },

    #[error("Node {node} is not reachable from the root")]
    UnreferencedNode { node: usize },

    #[error("Batch {batch} is not referenced by exactly one leaf")]
    BatchReferenceCount { batch: usize },

    #[error("Box of child {child} of node {node} doesn't contain all of its triangles")]
    BoundsNotConservative { node: usize, child: usize },

    #[error("Missing child {child} of node {node} has a non-empty box")]
    MissingChildBox { node: usize, child: usize },

    #[error("Root bounds don't contain all triangles")]
    RootBounds,

    #[error("Leaf starting at batch {batch} references triangle {triangle}, which doesn't exist")]
    TriangleOutOfRange { batch: usize, triangle: u32 },

    #[error("Leaf starting at batch {batch} has {padding} padding entries")]
    BadPadding { batch: usize, padding: usize },

    #[error("Triangle {triangle} is stored in {count} leaves")]
    TriangleReferenceCount { triangle: usize, count: usize },
}

impl Bvh {
    /// Checks structural invariants of the tree against the source it was built from:
    /// Links stay within the arena, every node is reachable exactly once and no deeper than
    /// [`MAX_DEPTH`], child boxes contain the boxes of all triangles below them,
    /// every triangle is stored in exactly one leaf and leaf padding only repeats the
    /// last triangle of the leaf.
    pub fn validate<S: TriangleVertexSource + ?Sized>(
        &self,
        source: &S,
    ) -> Result<(), ValidationError> {
        if source.triangle_count() != self.triangle_count {
            return Err(ValidationError::TriangleCountMismatch {
                expected: source.triangle_count(),
                actual: self.triangle_count,
            });
        }
        if self.nodes.is_empty() {
            return Err(ValidationError::MissingRoot);
        }

        let mut validator = Validator {
            bvh: self,
            source,
            node_seen: vec![false; self.nodes.len()],
            batch_seen: vec![false; self.leaves.len()],
            triangle_counts: vec![0; self.triangle_count],
        };

        let bounds = validator.check_node(NodeIdx::from_raw(0), 0)?;
        if !self.bounds.contains_box(&bounds) {
            return Err(ValidationError::RootBounds);
        }

        if let Some(node) = validator.node_seen.iter().position(|seen| !seen) {
            return Err(ValidationError::UnreferencedNode { node });
        }
        if let Some(batch) = validator.batch_seen.iter().position(|seen| !seen) {
            return Err(ValidationError::BatchReferenceCount { batch });
        }
        if let Some((triangle, count)) = validator
            .triangle_counts
            .iter()
            .enumerate()
            .find(|(_, count)| **count != 1)
        {
            return Err(ValidationError::TriangleReferenceCount {
                triangle,
                count: *count,
            });
        }

        Ok(())
    }
}

struct Validator<'a, S: ?Sized> {
    bvh: &'a Bvh,
    source: &'a S,
    node_seen: Vec<bool>,
    batch_seen: Vec<bool>,
    triangle_counts: Vec<usize>,
}

impl<S: TriangleVertexSource + ?Sized> Validator<'_, S> {
    /// Returns the union of boxes of all triangles below the node.
    fn check_node(&mut self, index: NodeIdx, depth: usize) -> Result<WorldBox, ValidationError> {
        let node_number = index.index();
        if std::mem::replace(&mut self.node_seen[node_number], true) {
            return Err(ValidationError::NodeReferencedTwice { node: node_number });
        }

        let bvh = self.bvh;
        let node = &bvh.nodes[index];
        let mut bounds = WorldBox::empty();

        for side in Side::BOTH {
            let child = side as usize;
            let child_box = node.child_box(side);

            let subtree = match node.link(side).decode() {
                NodeLink::Empty => {
                    if !child_box.is_empty() {
                        return Err(ValidationError::MissingChildBox {
                            node: node_number,
                            child,
                        });
                    }
                    continue;
                }
                _ if depth + 1 > MAX_DEPTH => {
                    return Err(ValidationError::TooDeep {
                        node: node_number,
                        child,
                        depth: depth + 1,
                    });
                }
                NodeLink::Inner { index } => {
                    if index.index() >= bvh.nodes.len() {
                        return Err(ValidationError::LinkOutOfRange {
                            node: node_number,
                            child,
                        });
                    }
                    self.check_node(index, depth + 1)?
                }
                NodeLink::Leaf { batches } => {
                    if batches.end() > bvh.leaves.len() {
                        return Err(ValidationError::LinkOutOfRange {
                            node: node_number,
                            child,
                        });
                    }
                    self.check_leaf(batches)?
                }
            };

            if !child_box.contains_box(&subtree) {
                return Err(ValidationError::BoundsNotConservative {
                    node: node_number,
                    child,
                });
            }
            bounds.enlarge_box(&subtree);
        }

        Ok(bounds)
    }

    fn check_leaf(&mut self, batches: BatchRange) -> Result<WorldBox, ValidationError> {
        let first_batch = batches.first.index();

        for batch in batches.iter() {
            if std::mem::replace(&mut self.batch_seen[batch.index()], true) {
                return Err(ValidationError::BatchReferenceCount {
                    batch: batch.index(),
                });
            }
        }

        let entries: Vec<u32> = batches
            .iter()
            .flat_map(|batch: BatchIdx| self.bvh.leaves[batch])
            .collect();
        let last = entries[entries.len() - 1];
        let padding = entries.iter().rev().take_while(|i| **i == last).count() - 1;
        if padding >= BATCH_WIDTH {
            return Err(ValidationError::BadPadding {
                batch: first_batch,
                padding,
            });
        }

        let mut bounds = WorldBox::empty();
        for triangle in &entries[..entries.len() - padding] {
            let Some(count) = self.triangle_counts.get_mut(*triangle as usize) else {
                return Err(ValidationError::TriangleOutOfRange {
                    batch: first_batch,
                    triangle: *triangle,
                });
            };
            *count += 1;
            bounds.enlarge_box(&self.source.triangle(*triangle as usize).bounding_box());
        }

        Ok(bounds)
    }
}
