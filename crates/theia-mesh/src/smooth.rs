//! Uniform Laplacian relaxation.

use glam::Vec3;
use theia_core::{Result, TheiaError, TriMesh};

/// Moves each vertex a fraction of the way toward the centroid of its neighbours.
///
/// Interior vertices relax toward all edge neighbours. Vertices on an open
/// boundary relax only along the boundary, and vertices where the boundary
/// branches (or where an edge is shared by more than two triangles) stay fixed.
/// Connectivity is never touched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshSmoother {
    relaxation_factor: f32,
}

impl MeshSmoother {
    /// Creates a smoother with the given step size in `(0, 1]`.
    pub fn new(relaxation_factor: f32) -> Result<Self> {
        if !(relaxation_factor > 0.0 && relaxation_factor <= 1.0) {
            return Err(TheiaError::invalid_config(
                "relaxation_factor",
                format!("{relaxation_factor} is outside (0, 1]"),
            ));
        }
        Ok(Self { relaxation_factor })
    }

    #[must_use]
    pub fn relaxation_factor(&self) -> f32 {
        self.relaxation_factor
    }

    /// Runs `iterations` relaxation passes. Zero iterations returns the mesh as is.
    pub fn smooth(&self, mut mesh: TriMesh, iterations: u32) -> Result<TriMesh> {
        if iterations == 0 || mesh.is_empty() {
            return Ok(mesh);
        }
        mesh.validate()?;

        let stencils = smoothing_stencils(&mesh);
        let r = self.relaxation_factor;
        let mut current = std::mem::take(&mut mesh.positions);
        let mut next = current.clone();

        for _ in 0..iterations {
            for (v, stencil) in stencils.iter().enumerate() {
                next[v] = if stencil.is_empty() {
                    current[v]
                } else {
                    let sum: Vec3 = stencil.iter().map(|&u| current[u as usize]).sum();
                    let centroid = sum / stencil.len() as f32;
                    current[v] + r * (centroid - current[v])
                };
            }
            std::mem::swap(&mut current, &mut next);
        }

        log::trace!(
            "smoothed {} vertices, {iterations} iterations, factor {r}",
            current.len()
        );
        mesh.positions = current;
        Ok(mesh)
    }
}

impl Default for MeshSmoother {
    fn default() -> Self {
        Self {
            relaxation_factor: 0.01,
        }
    }
}

/// Builds, per vertex, the neighbours it relaxes toward. Empty means fixed.
fn smoothing_stencils(mesh: &TriMesh) -> Vec<Vec<u32>> {
    let n = mesh.num_vertices();
    let mut boundary_neighbors: Vec<Vec<u32>> = vec![Vec::new(); n];
    let mut pinned = vec![false; n];
    for ((a, b), count) in mesh.edge_face_counts() {
        match count {
            1 => {
                boundary_neighbors[a as usize].push(b);
                boundary_neighbors[b as usize].push(a);
            }
            2 => {}
            _ => {
                pinned[a as usize] = true;
                pinned[b as usize] = true;
            }
        }
    }

    let adjacency = mesh.vertex_adjacency();
    (0..n)
        .map(|v| {
            if pinned[v] {
                Vec::new()
            } else if boundary_neighbors[v].is_empty() {
                adjacency.neighbors(v).to_vec()
            } else if boundary_neighbors[v].len() == 2 {
                std::mem::take(&mut boundary_neighbors[v])
            } else {
                Vec::new()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ball_mesh;
    use proptest::prelude::*;

    fn mean_radius(mesh: &TriMesh, center: Vec3) -> f32 {
        mesh.positions.iter().map(|p| p.distance(center)).sum::<f32>() / mesh.num_vertices() as f32
    }

    #[test]
    fn test_rejects_bad_factor() {
        assert!(MeshSmoother::new(0.0).is_err());
        assert!(MeshSmoother::new(1.5).is_err());
        assert!(MeshSmoother::new(f32::NAN).is_err());
        assert!(MeshSmoother::new(1.0).is_ok());
    }

    #[test]
    fn test_zero_iterations_is_identity() {
        let mesh = ball_mesh(12, 4.0);
        let out = MeshSmoother::default().smooth(mesh.clone(), 0).unwrap();
        assert_eq!(out, mesh);
    }

    #[test]
    fn test_connectivity_unchanged() {
        let mesh = ball_mesh(12, 4.0);
        let out = MeshSmoother::new(0.5).unwrap().smooth(mesh.clone(), 20).unwrap();
        assert_eq!(out.triangles, mesh.triangles);
        assert_eq!(out.num_vertices(), mesh.num_vertices());
    }

    #[test]
    fn test_closed_surface_shrinks() {
        let center = crate::test_support::ball_center(14);
        let mesh = ball_mesh(14, 5.0);
        let out = MeshSmoother::new(0.1).unwrap().smooth(mesh.clone(), 50).unwrap();
        assert!(mean_radius(&out, center) < mean_radius(&mesh, center));
    }

    #[test]
    fn test_single_step_matches_formula() {
        // A fan around vertex 0 closed into an octahedron: vertex 0 has neighbours 1..=4
        let mesh = TriMesh::new(
            vec![
                Vec3::new(0.0, 0.0, 2.0),
                Vec3::X,
                Vec3::Y,
                -Vec3::X,
                -Vec3::Y,
                -Vec3::Z,
            ],
            vec![
                [0, 1, 2],
                [0, 2, 3],
                [0, 3, 4],
                [0, 4, 1],
                [5, 2, 1],
                [5, 3, 2],
                [5, 4, 3],
                [5, 1, 4],
            ],
        );
        let out = MeshSmoother::new(0.25).unwrap().smooth(mesh, 1).unwrap();
        // centroid of the ring is the origin
        assert!((out.positions[0] - Vec3::new(0.0, 0.0, 1.5)).length() < 1e-6);
    }

    #[test]
    fn test_boundary_moves_along_boundary_only() {
        // Open square fan: the center relaxes, the corners are boundary vertices
        // whose boundary neighbours are the adjacent corners.
        let mesh = TriMesh::new(
            vec![
                Vec3::new(0.2, 0.1, 0.0),
                Vec3::new(-1.0, -1.0, 0.0),
                Vec3::new(1.0, -1.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(-1.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3], [0, 3, 4], [0, 4, 1]],
        );
        let out = MeshSmoother::new(1.0).unwrap().smooth(mesh, 1).unwrap();
        assert!(out.positions[0].length() < 1e-6);
        // Corner (-1,-1) averages (1,-1) and (-1,1): the origin
        assert!(out.positions[1].length() < 1e-6);
        assert!(out.positions.iter().all(|p| p.z.abs() < 1e-6));
    }

    #[test]
    fn test_empty_mesh() {
        let out = MeshSmoother::default().smooth(TriMesh::default(), 10).unwrap();
        assert!(out.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        #[test]
        fn prop_zero_iterations_identity(radius in 2.5f32..5.0, factor in 0.001f32..1.0) {
            let mesh = ball_mesh(12, radius);
            let out = MeshSmoother::new(factor).unwrap().smooth(mesh.clone(), 0).unwrap();
            prop_assert_eq!(out, mesh);
        }

        #[test]
        fn prop_counts_stable(radius in 2.5f32..5.0, iterations in 1u32..30) {
            let mesh = ball_mesh(12, radius);
            let out = MeshSmoother::default().smooth(mesh.clone(), iterations).unwrap();
            prop_assert_eq!(out.num_vertices(), mesh.num_vertices());
            prop_assert_eq!(out.num_triangles(), mesh.num_triangles());
        }
    }
}
