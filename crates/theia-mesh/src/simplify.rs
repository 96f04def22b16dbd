//! Topology-preserving mesh decimation.
//!
//! Greedy shortest-edge collapse driven by a lazy priority queue. Collapses that
//! would change topology, pinch the surface, flip a face, or move a boundary
//! vertex are refused, so the output keeps the input's connected components and
//! outer boundary.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use glam::Vec3;
use theia_core::{canonical_edge, Result, TheiaError, TriMesh};

/// Meshes with fewer triangles than this are returned unchanged.
pub const MIN_TRIANGLES: usize = 8;

/// Outcome of a simplification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimplifyStatus {
    /// Triangles were removed.
    Reduced { from: usize, to: usize },
    /// Nothing could be (or needed to be) removed.
    Unchanged,
}

/// A simplified mesh and its status.
#[derive(Debug, Clone)]
pub struct Simplified {
    /// The decimated, compacted mesh.
    pub mesh: TriMesh,
    /// What the pass did.
    pub status: SimplifyStatus,
}

/// Reduces triangle count while preserving topology and open boundaries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshSimplifier {
    target_reduction: f32,
}

impl MeshSimplifier {
    /// Creates a simplifier discarding roughly `target_reduction` of the triangles.
    pub fn new(target_reduction: f32) -> Result<Self> {
        if !(0.0..1.0).contains(&target_reduction) {
            return Err(TheiaError::invalid_config(
                "target_reduction",
                format!("{target_reduction} is outside [0, 1)"),
            ));
        }
        Ok(Self { target_reduction })
    }

    /// Returns the configured reduction fraction.
    #[must_use]
    pub fn target_reduction(&self) -> f32 {
        self.target_reduction
    }

    /// Simplifies `mesh` by the configured reduction fraction.
    pub fn simplify(&self, mesh: TriMesh) -> Result<Simplified> {
        let from = mesh.num_triangles();
        if from < MIN_TRIANGLES || self.target_reduction <= 0.0 {
            return Ok(Simplified {
                mesh,
                status: SimplifyStatus::Unchanged,
            });
        }
        mesh.validate()?;

        #[allow(clippy::cast_sign_loss)]
        let target = ((from as f64) * f64::from(1.0 - self.target_reduction)).ceil() as usize;

        let mut decimator = Decimator::new(mesh);
        let collapses = decimator.run(target.max(1));
        let mesh = decimator.into_mesh();
        let to = mesh.num_triangles();

        log::debug!("simplified {from} -> {to} triangles ({collapses} collapses)");
        let status = if to < from {
            SimplifyStatus::Reduced { from, to }
        } else {
            SimplifyStatus::Unchanged
        };
        Ok(Simplified { mesh, status })
    }
}

impl Default for MeshSimplifier {
    fn default() -> Self {
        Self {
            target_reduction: 0.5,
        }
    }
}

/// Heap entry for one edge; stale once either endpoint's version moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Candidate {
    // Bit pattern of a non-negative f32 orders the same as the float itself
    length_bits: u32,
    a: u32,
    b: u32,
    version_a: u32,
    version_b: u32,
}

struct Decimator {
    positions: Vec<Vec3>,
    faces: Vec<[u32; 3]>,
    face_alive: Vec<bool>,
    vertex_faces: Vec<Vec<u32>>,
    locked: Vec<bool>,
    version: Vec<u32>,
    alive_faces: usize,
    heap: BinaryHeap<Reverse<Candidate>>,
}

impl Decimator {
    fn new(mesh: TriMesh) -> Self {
        let n = mesh.positions.len();
        let mut vertex_faces = vec![Vec::new(); n];
        for (f, tri) in mesh.triangles.iter().enumerate() {
            for &v in tri {
                vertex_faces[v as usize].push(f as u32);
            }
        }

        // Boundary and non-manifold vertices never move
        let mut locked = vec![false; n];
        let edge_counts = mesh.edge_face_counts();
        for (&(a, b), &count) in &edge_counts {
            if count != 2 {
                locked[a as usize] = true;
                locked[b as usize] = true;
            }
        }

        let alive_faces = mesh.triangles.len();
        let mut decimator = Self {
            positions: mesh.positions,
            face_alive: vec![true; alive_faces],
            faces: mesh.triangles,
            vertex_faces,
            locked,
            version: vec![0; n],
            alive_faces,
            heap: BinaryHeap::with_capacity(edge_counts.len()),
        };
        for &(a, b) in edge_counts.keys() {
            decimator.push_edge(a, b);
        }
        decimator
    }

    fn push_edge(&mut self, a: u32, b: u32) {
        let (a, b) = canonical_edge(a, b);
        let length = self.positions[a as usize].distance(self.positions[b as usize]);
        self.heap.push(Reverse(Candidate {
            length_bits: length.to_bits(),
            a,
            b,
            version_a: self.version[a as usize],
            version_b: self.version[b as usize],
        }));
    }

    fn run(&mut self, target_faces: usize) -> usize {
        let mut collapses = 0;
        while self.alive_faces > target_faces {
            let Some(Reverse(candidate)) = self.heap.pop() else {
                break;
            };
            if self.version[candidate.a as usize] != candidate.version_a
                || self.version[candidate.b as usize] != candidate.version_b
            {
                continue;
            }
            if self.try_collapse(candidate.a, candidate.b) {
                collapses += 1;
            }
        }
        collapses
    }

    fn live_faces(&self, v: u32) -> impl Iterator<Item = u32> + '_ {
        self.vertex_faces[v as usize]
            .iter()
            .copied()
            .filter(|&f| self.face_alive[f as usize])
    }

    fn neighbors(&self, v: u32) -> Vec<u32> {
        let mut out: Vec<u32> = self
            .live_faces(v)
            .flat_map(|f| self.faces[f as usize])
            .filter(|&u| u != v)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    fn try_collapse(&mut self, a: u32, b: u32) -> bool {
        if self.locked[a as usize] && self.locked[b as usize] {
            return false;
        }

        // Interior manifold edge: exactly two faces, two distinct opposite vertices
        let shared: Vec<u32> = self
            .live_faces(a)
            .filter(|&f| self.faces[f as usize].contains(&b))
            .collect();
        if shared.len() != 2 {
            return false;
        }
        let opposite = |f: u32| -> Option<u32> {
            self.faces[f as usize]
                .iter()
                .copied()
                .find(|&v| v != a && v != b)
        };
        let (Some(c), Some(d)) = (opposite(shared[0]), opposite(shared[1])) else {
            return false;
        };
        if c == d {
            return false;
        }

        // Link condition
        let na = self.neighbors(a);
        let nb = self.neighbors(b);
        let common: Vec<u32> = na.iter().copied().filter(|v| nb.binary_search(v).is_ok()).collect();
        if common.len() != 2 || !common.contains(&c) || !common.contains(&d) {
            return false;
        }

        // Collapsing next to a valence-3 vertex would fold it into a fin
        if self.neighbors(c).len() <= 3 || self.neighbors(d).len() <= 3 {
            return false;
        }

        let (keep, remove, target) = if self.locked[a as usize] {
            (a, b, self.positions[a as usize])
        } else if self.locked[b as usize] {
            (b, a, self.positions[b as usize])
        } else {
            (a, b, (self.positions[a as usize] + self.positions[b as usize]) * 0.5)
        };

        if self.would_flip(a, b, target) {
            return false;
        }

        // Apply
        self.positions[keep as usize] = target;
        for &f in &shared {
            self.face_alive[f as usize] = false;
        }
        self.alive_faces -= shared.len();

        let moved: Vec<u32> = self.live_faces(remove).collect();
        for f in moved {
            for v in &mut self.faces[f as usize] {
                if *v == remove {
                    *v = keep;
                }
            }
            self.vertex_faces[keep as usize].push(f);
        }
        self.vertex_faces[remove as usize].clear();
        let alive = &self.face_alive;
        self.vertex_faces[keep as usize].retain(|&f| alive[f as usize]);

        self.version[keep as usize] += 1;
        self.version[remove as usize] += 1;
        for n in self.neighbors(keep) {
            self.push_edge(keep, n);
        }
        true
    }

    /// Checks whether moving `a` and `b` to `target` flips or flattens a surviving face.
    fn would_flip(&self, a: u32, b: u32, target: Vec3) -> bool {
        let faces = self.live_faces(a).chain(self.live_faces(b));
        for f in faces {
            let tri = self.faces[f as usize];
            if tri.contains(&a) && tri.contains(&b) {
                continue;
            }
            let before = tri.map(|v| self.positions[v as usize]);
            let after = tri.map(|v| {
                if v == a || v == b {
                    target
                } else {
                    self.positions[v as usize]
                }
            });
            let n_before = face_normal(before);
            if n_before.length_squared() <= f32::EPSILON * f32::EPSILON {
                continue;
            }
            if n_before.dot(face_normal(after)) <= 0.0 {
                return true;
            }
        }
        false
    }

    fn into_mesh(self) -> TriMesh {
        let triangles = self
            .faces
            .into_iter()
            .zip(self.face_alive)
            .filter_map(|(tri, alive)| alive.then_some(tri))
            .collect();
        TriMesh::new(self.positions, triangles).compact()
    }
}

#[inline]
fn face_normal([p0, p1, p2]: [Vec3; 3]) -> Vec3 {
    (p1 - p0).cross(p2 - p0)
}
