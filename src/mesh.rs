//! Triangle sources the BVH can be built from.

use std::{fs, path::Path};

use indexmap::IndexMap;
use rand::Rng;
use rand_distr::{Distribution as _, UnitSphere};
use thiserror::Error;

use crate::geometry::{FloatType, Triangle, WorldPoint, WorldVector};

/// Read-only access to triangle vertex positions.
pub trait TriangleVertexSource {
    fn triangle_count(&self) -> usize;

    /// Position of vertex `vertex` (0..3) of triangle `triangle`.
    fn position(&self, triangle: usize, vertex: usize) -> WorldPoint;

    fn triangle(&self, triangle: usize) -> Triangle<WorldPoint> {
        Triangle::new(
            self.position(triangle, 0),
            self.position(triangle, 1),
            self.position(triangle, 2),
        )
    }
}

impl TriangleVertexSource for [Triangle<WorldPoint>] {
    fn triangle_count(&self) -> usize {
        self.len()
    }

    fn position(&self, triangle: usize, vertex: usize) -> WorldPoint {
        self[triangle][vertex]
    }

    fn triangle(&self, triangle: usize) -> Triangle<WorldPoint> {
        self[triangle]
    }
}

impl TriangleVertexSource for Vec<Triangle<WorldPoint>> {
    fn triangle_count(&self) -> usize {
        self.len()
    }

    fn position(&self, triangle: usize, vertex: usize) -> WorldPoint {
        self[triangle][vertex]
    }

    fn triangle(&self, triangle: usize) -> Triangle<WorldPoint> {
        self[triangle]
    }
}

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Failed to read file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse file: {0}")]
    ParseError(#[from] wavefront_obj::ParseError),

    #[error("Triangle {triangle} references vertex {index}, but there are only {vertex_count}")]
    VertexIndexOutOfRange {
        triangle: usize,
        index: u32,
        vertex_count: usize,
    },
}

/// Triangles sharing a common vertex array.
#[derive(Clone, Debug, Default)]
pub struct IndexedMesh {
    positions: Vec<WorldPoint>,
    triangles: Vec<Triangle<u32>>,
}

impl IndexedMesh {
    pub fn new(
        positions: Vec<WorldPoint>,
        triangles: Vec<Triangle<u32>>,
    ) -> Result<IndexedMesh, MeshError> {
        for (i, triangle) in triangles.iter().enumerate() {
            if let Some(index) = triangle
                .iter()
                .find(|index| **index as usize >= positions.len())
            {
                return Err(MeshError::VertexIndexOutOfRange {
                    triangle: i,
                    index: *index,
                    vertex_count: positions.len(),
                });
            }
        }
        Ok(IndexedMesh {
            positions,
            triangles,
        })
    }

    pub fn from_obj(p: impl AsRef<Path>) -> Result<IndexedMesh, MeshError> {
        let content = fs::read_to_string(p)?;
        Self::from_obj_str(&content)
    }

    /// Loads triangles of all objects in the file.
    /// Vertices are shared between triangles of one object, other primitives are skipped.
    pub fn from_obj_str(content: &str) -> Result<IndexedMesh, MeshError> {
        let parsed = wavefront_obj::obj::parse(content)?;

        let mut positions = IndexMap::new();
        let mut triangles = Vec::new();
        let mut skipped = 0usize;

        for (object_index, o) in parsed.objects.iter().enumerate() {
            for geometry in &o.geometry {
                for shape in &geometry.shapes {
                    let wavefront_obj::obj::Primitive::Triangle(a, b, c) = shape.primitive else {
                        skipped += 1;
                        continue;
                    };

                    let mut handle_vertex = |vtindex: wavefront_obj::obj::VTNIndex| {
                        let entry = positions.entry((object_index, vtindex.0));
                        let index = entry.index() as u32;
                        entry.or_insert_with(|| {
                            let vertex = &o.vertices[vtindex.0];
                            WorldPoint::new(vertex.x as f32, vertex.y as f32, vertex.z as f32)
                        });
                        index
                    };

                    let a = handle_vertex(a);
                    let b = handle_vertex(b);
                    let c = handle_vertex(c);

                    triangles.push(Triangle::new(a, b, c));
                }
            }
        }

        if skipped > 0 {
            log::warn!("Skipped {skipped} non-triangle primitives");
        }
        log::debug!(
            "Loaded {} triangles, {} vertices",
            triangles.len(),
            positions.len()
        );

        Self::new(positions.into_values().collect(), triangles)
    }

    pub fn positions(&self) -> &[WorldPoint] {
        &self.positions
    }

    pub fn triangles(&self) -> &[Triangle<u32>] {
        &self.triangles
    }
}

impl TriangleVertexSource for IndexedMesh {
    fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    fn position(&self, triangle: usize, vertex: usize) -> WorldPoint {
        self.positions[self.triangles[triangle][vertex] as usize]
    }
}

/// Generates `count` triangles with centroids uniformly distributed in a cube of side `extent`
/// centered on origin. Vertices lie at distance `size` from the centroid.
pub fn random_triangle_soup(
    rng: &mut impl Rng,
    count: usize,
    extent: FloatType,
    size: FloatType,
) -> Vec<Triangle<WorldPoint>> {
    let half = extent / 2.0;
    (0..count)
        .map(|_| {
            let center = WorldPoint::new(
                rng.random_range(-half..=half),
                rng.random_range(-half..=half),
                rng.random_range(-half..=half),
            );
            let mut vertex = || {
                let [x, y, z]: [FloatType; 3] = UnitSphere.sample(rng);
                center + WorldVector::new(x, y, z) * size
            };
            Triangle::new(vertex(), vertex(), vertex())
        })
        .collect()
}
