//! Indexed triangle meshes and the connectivity queries the pipeline stages share.

use std::collections::HashMap;

use glam::Vec3;

use crate::error::{Result, TheiaError};

/// An indexed triangle mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriMesh {
    /// Vertex positions.
    pub positions: Vec<Vec3>,
    /// Triangles as triples of vertex indices.
    pub triangles: Vec<[u32; 3]>,
}

/// Compressed vertex adjacency: neighbours of vertex `v` are
/// `indices[offsets[v]..offsets[v + 1]]`.
#[derive(Debug, Clone, Default)]
pub struct VertexAdjacency {
    offsets: Vec<usize>,
    indices: Vec<u32>,
}

impl VertexAdjacency {
    /// Returns the neighbours of vertex `v`.
    #[must_use]
    pub fn neighbors(&self, v: usize) -> &[u32] {
        &self.indices[self.offsets[v]..self.offsets[v + 1]]
    }

    /// Returns the number of vertices covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Returns true if no vertices are covered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TriMesh {
    /// Creates a mesh from positions and triangles.
    pub fn new(positions: Vec<Vec3>, triangles: Vec<[u32; 3]>) -> Self {
        Self {
            positions,
            triangles,
        }
    }

    /// Returns the number of vertices.
    #[must_use]
    pub fn num_vertices(&self) -> usize {
        self.positions.len()
    }

    /// Returns the number of triangles.
    #[must_use]
    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Returns true if the mesh has no triangles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Checks that every index references a vertex and no triangle repeats a vertex.
    pub fn validate(&self) -> Result<()> {
        let n = self.positions.len();
        for (t, tri) in self.triangles.iter().enumerate() {
            if let Some(&bad) = tri.iter().find(|&&v| v as usize >= n) {
                return Err(TheiaError::MalformedMesh(format!(
                    "triangle {t} references vertex {bad}, mesh has {n}"
                )));
            }
            if tri[0] == tri[1] || tri[1] == tri[2] || tri[2] == tri[0] {
                return Err(TheiaError::MalformedMesh(format!(
                    "triangle {t} repeats a vertex: {tri:?}"
                )));
            }
        }
        if let Some(i) = self.positions.iter().position(|p| !p.is_finite()) {
            return Err(TheiaError::MalformedMesh(format!(
                "vertex {i} has a non-finite position"
            )));
        }
        Ok(())
    }

    /// Returns the axis-aligned bounding box, or `None` for a mesh without vertices.
    #[must_use]
    pub fn bounding_box(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.positions.first()?;
        Some(
            self.positions
                .iter()
                .fold((first, first), |(min, max), &p| (min.min(p), max.max(p))),
        )
    }

    /// Counts, for every undirected edge, the triangles using it.
    #[must_use]
    pub fn edge_face_counts(&self) -> HashMap<(u32, u32), u32> {
        let mut counts = HashMap::with_capacity(self.triangles.len() * 3 / 2);
        for tri in &self.triangles {
            for (a, b) in tri_edges(tri) {
                *counts.entry(canonical_edge(a, b)).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Flags vertices lying on a boundary edge (an edge used by exactly one triangle).
    #[must_use]
    pub fn boundary_vertices(&self) -> Vec<bool> {
        let mut boundary = vec![false; self.positions.len()];
        for ((a, b), count) in self.edge_face_counts() {
            if count == 1 {
                boundary[a as usize] = true;
                boundary[b as usize] = true;
            }
        }
        boundary
    }

    /// Builds sorted, deduplicated vertex adjacency from the triangles.
    #[must_use]
    pub fn vertex_adjacency(&self) -> VertexAdjacency {
        let mut lists: Vec<Vec<u32>> = vec![Vec::new(); self.positions.len()];
        for tri in &self.triangles {
            for (a, b) in tri_edges(tri) {
                lists[a as usize].push(b);
                lists[b as usize].push(a);
            }
        }

        let mut offsets = Vec::with_capacity(lists.len() + 1);
        let mut indices = Vec::with_capacity(self.triangles.len() * 6);
        offsets.push(0);
        for mut list in lists {
            list.sort_unstable();
            list.dedup();
            indices.extend_from_slice(&list);
            offsets.push(indices.len());
        }
        VertexAdjacency { offsets, indices }
    }

    /// Counts connected components of triangles (triangles sharing a vertex are connected).
    #[must_use]
    pub fn connected_components(&self) -> usize {
        let mut parent: Vec<u32> = (0..self.positions.len() as u32).collect();
        for tri in &self.triangles {
            union(&mut parent, tri[0], tri[1]);
            union(&mut parent, tri[1], tri[2]);
        }

        let mut roots: Vec<u32> = self
            .triangles
            .iter()
            .map(|tri| find(&mut parent, tri[0]))
            .collect();
        roots.sort_unstable();
        roots.dedup();
        roots.len()
    }

    /// Drops vertices no triangle references, remapping indices.
    #[must_use]
    pub fn compact(self) -> Self {
        let mut remap = vec![u32::MAX; self.positions.len()];
        let mut positions = Vec::with_capacity(self.positions.len());
        let mut triangles = Vec::with_capacity(self.triangles.len());

        for tri in &self.triangles {
            let mut out = [0u32; 3];
            for (slot, &v) in out.iter_mut().zip(tri) {
                if remap[v as usize] == u32::MAX {
                    remap[v as usize] = positions.len() as u32;
                    positions.push(self.positions[v as usize]);
                }
                *slot = remap[v as usize];
            }
            triangles.push(out);
        }

        Self {
            positions,
            triangles,
        }
    }
}

/// Returns the three directed edges of a triangle.
#[inline]
#[must_use]
pub fn tri_edges(tri: &[u32; 3]) -> [(u32, u32); 3] {
    [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])]
}

/// Creates a canonical edge key (smaller index first).
#[inline]
#[must_use]
pub fn canonical_edge(a: u32, b: u32) -> (u32, u32) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

fn find(parent: &mut [u32], mut v: u32) -> u32 {
    while parent[v as usize] != v {
        let next = parent[parent[v as usize] as usize];
        parent[v as usize] = next;
        v = next;
    }
    v
}

fn union(parent: &mut [u32], a: u32, b: u32) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        parent[ra as usize] = rb;
    }
}

#[cfg(test)]
pub(crate) mod test_shapes {
    use super::*;

    /// A closed octahedron centred at `center`.
    pub fn octahedron(center: Vec3, radius: f32) -> TriMesh {
        let positions = vec![
            center + Vec3::X * radius,
            center - Vec3::X * radius,
            center + Vec3::Y * radius,
            center - Vec3::Y * radius,
            center + Vec3::Z * radius,
            center - Vec3::Z * radius,
        ];
        let triangles = vec![
            [0, 2, 4],
            [2, 1, 4],
            [1, 3, 4],
            [3, 0, 4],
            [2, 0, 5],
            [1, 2, 5],
            [3, 1, 5],
            [0, 3, 5],
        ];
        TriMesh::new(positions, triangles)
    }
}
