use std::fmt;

use super::{Bvh, ChildLink, NodeIdx, NodeLink, node::Side};
use crate::geometry::WorldBox;

impl Bvh {
    /// Writes the hierarchy as an indented list, one line per node and per triangle batch.
    pub fn write_tree(&self, out: &mut impl fmt::Write) -> fmt::Result {
        writeln!(
            out,
            "{} triangles, {} nodes, {} leaves",
            self.triangle_count,
            self.nodes.len(),
            self.statistics.leaf_count
        )?;
        self.write_recursive(out, 0, ChildLink::new_inner(NodeIdx::from_raw(0)), &self.bounds)
    }

    fn write_recursive(
        &self,
        out: &mut impl fmt::Write,
        indent: usize,
        link: ChildLink,
        bounds: &WorldBox,
    ) -> fmt::Result {
        let prefix = "  ".repeat(indent);

        match link.decode() {
            NodeLink::Empty => writeln!(out, "{prefix}- <EMPTY>"),
            NodeLink::Inner { index } => {
                writeln!(
                    out,
                    "{prefix}- I{}: {:?}-{:?}",
                    index.raw(),
                    bounds.min,
                    bounds.max
                )?;
                let node = &self.nodes[index];
                for side in Side::BOTH {
                    self.write_recursive(out, indent + 1, node.link(side), &node.child_box(side))?;
                }
                Ok(())
            }
            NodeLink::Leaf { batches } => {
                writeln!(
                    out,
                    "{prefix}- L{}+{}: {:?}-{:?}",
                    batches.first.raw(),
                    batches.len(),
                    bounds.min,
                    bounds.max
                )?;
                for batch in batches.iter() {
                    writeln!(out, "{prefix}    {:?}", self.leaves[batch])?;
                }
                Ok(())
            }
        }
    }
}
