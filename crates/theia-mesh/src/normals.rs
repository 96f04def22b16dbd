//! Per-vertex normal estimation.

use glam::Vec3;
use theia_core::{Result, TriMesh};

use crate::label_mesh::{LabelMesh, SurfaceAppearance};

/// Computes area-weighted vertex normals for shading.
///
/// Vertices are never split at sharp features, so the vertex count of the
/// input mesh is preserved exactly.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalEstimator;

impl NormalEstimator {
    /// Creates a normal estimator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Attaches normals and appearance to `mesh`, producing a renderable surface.
    pub fn estimate(&self, mesh: TriMesh, appearance: SurfaceAppearance) -> Result<LabelMesh> {
        mesh.validate()?;
        let normals = vertex_normals(&mesh);
        LabelMesh::new(mesh, normals, appearance)
    }
}

/// Computes the unit normal of each triangle. Degenerate triangles get zero.
#[must_use]
pub fn face_normals(mesh: &TriMesh) -> Vec<Vec3> {
    mesh.triangles
        .iter()
        .map(|tri| {
            let [p0, p1, p2] = tri.map(|v| mesh.positions[v as usize]);
            (p1 - p0).cross(p2 - p0).normalize_or_zero()
        })
        .collect()
}

/// Computes vertex normals by summing the area-weighted normals of incident triangles.
///
/// Isolated vertices, and vertices whose incident triangles cancel out, get a
/// zero normal.
#[must_use]
pub fn vertex_normals(mesh: &TriMesh) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; mesh.positions.len()];
    for tri in &mesh.triangles {
        let [p0, p1, p2] = tri.map(|v| mesh.positions[v as usize]);
        // Cross product length is twice the area
        let weighted = (p1 - p0).cross(p2 - p0);
        for &v in tri {
            normals[v as usize] += weighted;
        }
    }
    for n in &mut normals {
        *n = n.normalize_or_zero();
    }
    normals
}
