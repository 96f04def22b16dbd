//! The renderable surface of one label.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use theia_core::{Result, TheiaError, TriMesh};

/// Color and opacity of a surface. Changing either never touches geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceAppearance {
    /// RGB color, each channel in `[0, 1]`.
    pub color: Vec3,
    /// Opacity in `[0, 1]`.
    pub opacity: f32,
}

impl SurfaceAppearance {
    pub fn new(color: Vec3, opacity: f32) -> Self {
        Self { color, opacity }
    }
}

impl Default for SurfaceAppearance {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            opacity: 1.0,
        }
    }
}

/// Interleaved vertex layout handed to a GPU vertex buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RenderVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

/// A triangle mesh with per-vertex normals and an appearance.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMesh {
    mesh: TriMesh,
    normals: Vec<Vec3>,
    appearance: SurfaceAppearance,
}

impl LabelMesh {
    /// Pairs geometry with normals. The normal count must match the vertex count.
    pub fn new(mesh: TriMesh, normals: Vec<Vec3>, appearance: SurfaceAppearance) -> Result<Self> {
        if normals.len() != mesh.num_vertices() {
            return Err(TheiaError::MalformedMesh(format!(
                "{} normals for {} vertices",
                normals.len(),
                mesh.num_vertices()
            )));
        }
        Ok(Self {
            mesh,
            normals,
            appearance,
        })
    }

    /// Returns the geometry.
    #[must_use]
    pub fn mesh(&self) -> &TriMesh {
        &self.mesh
    }

    #[must_use]
    pub fn positions(&self) -> &[Vec3] {
        &self.mesh.positions
    }

    #[must_use]
    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.mesh.triangles
    }

    #[must_use]
    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    #[must_use]
    pub fn num_vertices(&self) -> usize {
        self.mesh.num_vertices()
    }

    #[must_use]
    pub fn num_triangles(&self) -> usize {
        self.mesh.num_triangles()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mesh.is_empty()
    }

    /// Returns the axis-aligned bounding box, or `None` when empty.
    #[must_use]
    pub fn bounding_box(&self) -> Option<(Vec3, Vec3)> {
        self.mesh.bounding_box()
    }

    #[must_use]
    pub fn appearance(&self) -> SurfaceAppearance {
        self.appearance
    }

    /// Replaces the appearance, leaving geometry untouched.
    pub fn set_appearance(&mut self, appearance: SurfaceAppearance) {
        self.appearance = appearance;
    }

    /// Returns interleaved position/normal vertices.
    #[must_use]
    pub fn render_vertices(&self) -> Vec<RenderVertex> {
        self.mesh
            .positions
            .iter()
            .zip(&self.normals)
            .map(|(p, n)| RenderVertex {
                position: p.to_array(),
                normal: n.to_array(),
            })
            .collect()
    }

    /// Returns the vertex buffer contents as raw bytes.
    #[must_use]
    pub fn vertex_bytes(&self) -> Vec<u8> {
        bytemuck::cast_slice(&self.render_vertices()).to_vec()
    }

    /// Returns the index buffer contents as raw bytes (`u32` indices, three per triangle).
    #[must_use]
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.mesh.triangles)
    }
}
