use log::debug;

use crate::{
    geometry::{WorldBox, WorldPoint},
    mesh::TriangleVertexSource,
};

use super::BuildError;

/// Per-triangle boxes and centroids used during the build.
#[derive(Clone, Debug)]
pub(super) struct BuildPrimitives {
    pub boxes: Vec<WorldBox>,
    pub centroids: Vec<WorldPoint>,
    /// Union of all triangle boxes.
    pub bounds: WorldBox,
}

impl BuildPrimitives {
    pub fn new<S: TriangleVertexSource + ?Sized>(source: &S) -> Result<Self, BuildError> {
        let count = source.triangle_count();

        let mut boxes = Vec::new();
        boxes.try_reserve_exact(count)?;
        let mut centroids = Vec::new();
        centroids.try_reserve_exact(count)?;

        let mut bounds = WorldBox::empty();
        for i in 0..count {
            let triangle = source.triangle(i);
            let b = triangle.bounding_box();
            bounds.enlarge_box(&b);
            boxes.push(b);
            centroids.push(triangle.centroid());
        }

        debug!("Prepared {count} build primitives, bounds {bounds:?}");

        Ok(BuildPrimitives {
            boxes,
            centroids,
            bounds,
        })
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    /// Union of boxes of the given triangles.
    pub fn bounds_of(&self, triangles: &[u32]) -> WorldBox {
        triangles.iter().fold(WorldBox::empty(), |mut acc, i| {
            acc.enlarge_box(&self.boxes[*i as usize]);
            acc
        })
    }

    /// Bounding box of centroids of the given triangles.
    pub fn centroid_bounds_of(&self, triangles: &[u32]) -> WorldBox {
        WorldBox::from_points(triangles.iter().map(|i| &self.centroids[*i as usize]))
    }
}
