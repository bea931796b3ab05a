//! Bounding volume hierarchy for closest-hit and any-hit ray queries against static
//! triangle meshes.

pub mod bvh;
pub mod geometry;
pub mod mesh;
mod util;

pub use bvh::{BuildError, BuildSettings, BuildStrategy, Bvh, Hit, TraversalStack, WorkerCount};
pub use geometry::Ray;
pub use mesh::{IndexedMesh, MeshError, TriangleVertexSource};
pub use util::Stats;
