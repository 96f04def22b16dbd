//! Isosurface extraction from volume grids.
//!
//! Marching cubes over the node lattice, ported from the public-domain
//! `MarchingCubeCpp` tables. Two sampling modes share the same triangulation:
//! a continuous threshold surface for intensity scans and an exact-match
//! surface for discrete label masks.

#![allow(
    clippy::unreadable_literal,
    clippy::too_many_arguments,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::mesh::TriMesh;
use crate::volume::VolumeGrid;

/// How samples are compared against the isovalue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionMode {
    /// A node is inside when its sample exceeds the isovalue.
    Continuous,
    /// A node is inside when its sample equals the isovalue exactly.
    Discrete,
}

/// Outcome of one extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStatus {
    /// The isovalue produced geometry.
    Surface { triangles: usize },
    /// No cell brackets the isovalue.
    Empty,
}

/// A freshly extracted triangle soup and its status.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Vertices in world space.
    pub mesh: TriMesh,
    /// Whether anything was extracted.
    pub status: ExtractionStatus,
}

impl Extraction {
    fn empty() -> Self {
        Self {
            mesh: TriMesh::default(),
            status: ExtractionStatus::Empty,
        }
    }

    fn from_mesh(mesh: TriMesh) -> Self {
        let status = if mesh.is_empty() {
            ExtractionStatus::Empty
        } else {
            ExtractionStatus::Surface {
                triangles: mesh.num_triangles(),
            }
        };
        Self { mesh, status }
    }

    /// Returns true if no triangles were produced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.status == ExtractionStatus::Empty
    }
}

/// Converts a scalar grid and an isovalue into a triangle mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceExtractor {
    mode: ExtractionMode,
}

impl SurfaceExtractor {
    /// Creates an extractor using the given sampling mode.
    pub fn new(mode: ExtractionMode) -> Self {
        Self { mode }
    }

    /// Extractor for continuous intensity volumes.
    pub fn continuous() -> Self {
        Self::new(ExtractionMode::Continuous)
    }

    /// Extractor for discrete label masks.
    pub fn discrete() -> Self {
        Self::new(ExtractionMode::Discrete)
    }

    /// Returns the sampling mode.
    #[must_use]
    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    /// Extracts the isosurface at `isovalue`.
    ///
    /// Isovalues outside the grid's scalar range yield an empty extraction.
    /// Triangles are wound so that face normals point out of the inside region.
    #[must_use]
    pub fn extract(&self, grid: &VolumeGrid, isovalue: f32) -> Extraction {
        if !isovalue.is_finite() || !grid.in_range(isovalue) {
            log::debug!("isovalue {isovalue} outside scalar range, nothing to extract");
            return Extraction::empty();
        }

        let values = grid.values();
        let mut mesh = match self.mode {
            ExtractionMode::Continuous => {
                march(grid, |idx| continuous_sample(values[idx], isovalue))
            }
            ExtractionMode::Discrete => march(grid, |idx| discrete_sample(values[idx], isovalue)),
        };

        for p in &mut mesh.positions {
            *p = grid.to_world(*p);
        }

        log::debug!(
            "extracted {} triangles / {} vertices at isovalue {isovalue}",
            mesh.num_triangles(),
            mesh.num_vertices()
        );
        Extraction::from_mesh(mesh)
    }

    /// Returns true if extraction at `isovalue` would produce any triangle.
    ///
    /// Scans cube configurations without building geometry; every non-trivial
    /// configuration emits at least one triangle.
    #[must_use]
    pub fn has_surface(&self, grid: &VolumeGrid, isovalue: f32) -> bool {
        self.scan(grid, isovalue, true) > 0
    }

    fn scan(&self, grid: &VolumeGrid, isovalue: f32, stop_at_first: bool) -> usize {
        if !isovalue.is_finite() || !grid.in_range(isovalue) {
            return 0;
        }
        let values = grid.values();
        match self.mode {
            ExtractionMode::Continuous => {
                count_active(grid, |idx| continuous_sample(values[idx], isovalue), stop_at_first)
            }
            ExtractionMode::Discrete => count_active(
                grid,
                |idx| discrete_sample(values[idx], isovalue),
                stop_at_first,
            ),
        }
    }
}

/// Non-finite samples count as outside so no crossing interpolates against them.
#[inline]
fn continuous_sample(value: f32, isovalue: f32) -> f32 {
    if value.is_finite() {
        isovalue - value
    } else {
        1.0
    }
}

#[inline]
#[allow(clippy::float_cmp)]
fn discrete_sample(value: f32, label: f32) -> f32 {
    if value == label {
        -0.5
    } else {
        0.5
    }
}

/// Gathers the eight shifted corner samples of cell `(x, y, z)`.
#[inline]
fn corner_samples(
    grid: &VolumeGrid,
    sample: &impl Fn(usize) -> f32,
    x: u32,
    y: u32,
    z: u32,
) -> [f32; 8] {
    [
        sample(grid.index(x, y, z)),
        sample(grid.index(x + 1, y, z)),
        sample(grid.index(x, y + 1, z)),
        sample(grid.index(x + 1, y + 1, z)),
        sample(grid.index(x, y, z + 1)),
        sample(grid.index(x + 1, y, z + 1)),
        sample(grid.index(x, y + 1, z + 1)),
        sample(grid.index(x + 1, y + 1, z + 1)),
    ]
}

/// Builds the 8-bit configuration index from corner signs (bit set = inside).
#[inline]
fn config_index(vs: &[f32; 8]) -> usize {
    vs.iter()
        .enumerate()
        .fold(0, |acc, (i, &v)| acc | (usize::from(v < 0.0) << i))
}

fn count_active(grid: &VolumeGrid, sample: impl Fn(usize) -> f32, stop_at_first: bool) -> usize {
    let dims = grid.dims();
    let mut active = 0;
    for z in 0..dims.z - 1 {
        for y in 0..dims.y - 1 {
            for x in 0..dims.x - 1 {
                let config = config_index(&corner_samples(grid, &sample, x, y, z));
                if config != 0 && config != 255 {
                    active += 1;
                    if stop_at_first {
                        return active;
                    }
                }
            }
        }
    }
    active
}

/// Runs marching cubes over every cell. `sample` returns the node value shifted
/// so that the surface sits at zero and the inside is negative.
///
/// Output vertices are in grid-index space.
fn march(grid: &VolumeGrid, sample: impl Fn(usize) -> f32) -> TriMesh {
    let dims = grid.dims();
    let size = [dims.x, dims.y, dims.z];
    let mut mesh = TriMesh::default();

    // Vertex index per (x, y) position and edge axis, for two z-slabs (k % 2)
    let slab_len = (dims.x as usize) * (dims.y as usize) * 2;
    let mut slab_inds: Vec<[u32; 3]> = vec![[0; 3]; slab_len];
    let mut edge_indices = [0_u32; 12];
    let mut corners = [0_u32; 15];

    for z in 0..dims.z - 1 {
        for y in 0..dims.y - 1 {
            for x in 0..dims.x - 1 {
                let vs = corner_samples(grid, &sample, x, y, z);
                let config_n = config_index(&vs);

                // Skip fully inside or fully outside
                if config_n == 0 || config_n == 255 {
                    continue;
                }

                // Edge vertices not shared with an already-visited cell
                let mut edge = |va: f32, vb: f32, axis: usize, ex: u32, ey: u32, ez: u32| {
                    compute_edge(&mut slab_inds, &mut mesh, va, vb, axis, ex, ey, ez, &size);
                };

                // X-axis edges
                if y == 0 && z == 0 {
                    edge(vs[0], vs[1], 0, x, y, z);
                }
                if z == 0 {
                    edge(vs[2], vs[3], 0, x, y + 1, z);
                }
                if y == 0 {
                    edge(vs[4], vs[5], 0, x, y, z + 1);
                }
                edge(vs[6], vs[7], 0, x, y + 1, z + 1);

                // Y-axis edges
                if x == 0 && z == 0 {
                    edge(vs[0], vs[2], 1, x, y, z);
                }
                if z == 0 {
                    edge(vs[1], vs[3], 1, x + 1, y, z);
                }
                if x == 0 {
                    edge(vs[4], vs[6], 1, x, y, z + 1);
                }
                edge(vs[5], vs[7], 1, x + 1, y, z + 1);

                // Z-axis edges
                if x == 0 && y == 0 {
                    edge(vs[0], vs[4], 2, x, y, z);
                }
                if y == 0 {
                    edge(vs[1], vs[5], 2, x + 1, y, z);
                }
                if x == 0 {
                    edge(vs[2], vs[6], 2, x, y + 1, z);
                }
                edge(vs[3], vs[7], 2, x + 1, y + 1, z);

                let slab =
                    |ex: u32, ey: u32, ez: u32| slab_inds[to_index_1d_slab(ex, ey, ez, &size)];
                edge_indices[0] = slab(x, y, z)[0];
                edge_indices[1] = slab(x, y + 1, z)[0];
                edge_indices[2] = slab(x, y, z + 1)[0];
                edge_indices[3] = slab(x, y + 1, z + 1)[0];
                edge_indices[4] = slab(x, y, z)[1];
                edge_indices[5] = slab(x + 1, y, z)[1];
                edge_indices[6] = slab(x, y, z + 1)[1];
                edge_indices[7] = slab(x + 1, y, z + 1)[1];
                edge_indices[8] = slab(x, y, z)[2];
                edge_indices[9] = slab(x + 1, y, z)[2];
                edge_indices[10] = slab(x, y + 1, z)[2];
                edge_indices[11] = slab(x + 1, y + 1, z)[2];

                // Look up triangle configuration
                let config = MC_TRIS[config_n];
                let n_triangles = (config & 0xF) as usize;
                let mut offset = 4;
                for corner in corners.iter_mut().take(n_triangles * 3) {
                    *corner = edge_indices[((config >> offset) & 0xF) as usize];
                    offset += 4;
                }
                for tri in corners[..n_triangles * 3].chunks_exact(3) {
                    mesh.triangles.push([tri[0], tri[1], tri[2]]);
                }
            }
        }
    }

    mesh
}

/// Converts 3D coordinates to a slab index (modular z for memory reuse).
#[inline]
fn to_index_1d_slab(i: u32, j: u32, k: u32, size: &[u32; 3]) -> usize {
    (size[0] as usize) * (size[1] as usize) * ((k as usize) % 2)
        + (j as usize) * (size[0] as usize)
        + (i as usize)
}

/// Adds the crossing vertex on an edge whose endpoints straddle zero and
/// records its index in the slab.
#[inline]
fn compute_edge(
    slab_inds: &mut [[u32; 3]],
    mesh: &mut TriMesh,
    va: f32,
    vb: f32,
    axis: usize,
    x: u32,
    y: u32,
    z: u32,
    size: &[u32; 3],
) {
    if (va < 0.0) == (vb < 0.0) {
        return;
    }
    let mut v = Vec3::new(x as f32, y as f32, z as f32);
    v[axis] += va / (va - vb);
    let idx = mesh.positions.len() as u32;
    slab_inds[to_index_1d_slab(x, y, z, size)][axis] = idx;
    mesh.positions.push(v);
}

/// Look-up table for triangle configurations (256 entries, one per cube configuration).
///
/// Each entry is a `u64` encoding:
/// - Bits `[3:0]`: Number of triangles (0-5)
/// - Bits `[7:4]`, `[11:8]`, ...: Edge indices (0-11) for each triangle vertex, 4 bits each
///
/// Ported from `MarchingCubeCpp` (public domain).
#[rustfmt::skip]
static MC_TRIS: [u64; 256] = [
    0, 33793, 36945, 159668546,
    18961, 144771090, 5851666, 595283255635,
    20913, 67640146, 193993474, 655980856339,
    88782242, 736732689667, 797430812739, 194554754,
    26657, 104867330, 136709522, 298069416227,
    109224258, 8877909667, 318136408323, 1567994331701604,
    189884450, 350847647843, 559958167731, 3256298596865604,
    447393122899, 651646838401572, 2538311371089956, 737032694307,
    29329, 43484162, 91358498, 374810899075,
    158485010, 178117478419, 88675058979, 433581536604804,
    158486962, 649105605635, 4866906995, 3220959471609924,
    649165714851, 3184943915608436, 570691368417972, 595804498035,
    124295042, 431498018963, 508238522371, 91518530,
    318240155763, 291789778348404, 1830001131721892, 375363605923,
    777781811075, 1136111028516116, 3097834205243396, 508001629971,
    2663607373704004, 680242583802939237, 333380770766129845, 179746658,
    42545, 138437538, 93365810, 713842853011,
    73602098, 69575510115, 23964357683, 868078761575828,
    28681778, 713778574611, 250912709379, 2323825233181284,
    302080811955, 3184439127991172, 1694042660682596, 796909779811,
    176306722, 150327278147, 619854856867, 1005252473234484,
    211025400963, 36712706, 360743481544788, 150627258963,
    117482600995, 1024968212107700, 2535169275963444, 4734473194086550421,
    628107696687956, 9399128243, 5198438490361643573, 194220594,
    104474994, 566996932387, 427920028243, 2014821863433780,
    492093858627, 147361150235284, 2005882975110676, 9671606099636618005,
    777701008947, 3185463219618820, 482784926917540, 2900953068249785909,
    1754182023747364, 4274848857537943333, 13198752741767688709, 2015093490989156,
    591272318771, 2659758091419812, 1531044293118596, 298306479155,
    408509245114388, 210504348563, 9248164405801223541, 91321106,
    2660352816454484, 680170263324308757, 8333659837799955077, 482966828984116,
    4274926723105633605, 3184439197724820, 192104450, 15217,
    45937, 129205250, 129208402, 529245952323,
    169097138, 770695537027, 382310500883, 2838550742137652,
    122763026, 277045793139, 81608128403, 1991870397907988,
    362778151475, 2059003085103236, 2132572377842852, 655681091891,
    58419234, 239280858627, 529092143139, 1568257451898804,
    447235128115, 679678845236084, 2167161349491220, 1554184567314086709,
    165479003923, 1428768988226596, 977710670185060, 10550024711307499077,
    1305410032576132, 11779770265620358997, 333446212255967269, 978168444447012,
    162736434, 35596216627, 138295313843, 891861543990356,
    692616541075, 3151866750863876, 100103641866564, 6572336607016932133,
    215036012883, 726936420696196, 52433666, 82160664963,
    2588613720361524, 5802089162353039525, 214799000387, 144876322,
    668013605731, 110616894681956, 1601657732871812, 430945547955,
    3156382366321172, 7644494644932993285, 3928124806469601813, 3155990846772900,
    339991010498708, 10743689387941597493, 5103845475, 105070898,
    3928064910068824213, 156265010, 1305138421793636, 27185,
    195459938, 567044449971, 382447549283, 2175279159592324,
    443529919251, 195059004769796, 2165424908404116, 1554158691063110021,
    504228368803, 1436350466655236, 27584723588724, 1900945754488837749,
    122971970, 443829749251, 302601798803, 108558722,
    724700725875, 43570095105972, 2295263717447940, 2860446751369014181,
    2165106202149444, 69275726195, 2860543885641537797, 2165106320445780,
    2280890014640004, 11820349930268368933, 8721082628082003989, 127050770,
    503707084675, 122834978, 2538193642857604, 10129,
    801441490467, 2923200302876740, 1443359556281892, 2901063790822564949,
    2728339631923524, 7103874718248233397, 12775311047932294245, 95520290,
    2623783208098404, 1900908618382410757, 137742672547, 2323440239468964,
    362478212387, 727199575803140, 73425410, 34337,
    163101314, 668566030659, 801204361987, 73030562,
    591509145619, 162574594, 100608342969108, 5553,
    724147968595, 1436604830452292, 176259090, 42001,
    143955266, 2385, 18433, 0,
];

#[cfg(test)]
mod tests {
    use super::*;
    use glam::UVec3;

    fn ball(n: u32, radius: f32, spacing: Vec3, origin: Vec3) -> VolumeGrid {
        let center = Vec3::splat((n - 1) as f32 / 2.0);
        VolumeGrid::from_fn(UVec3::splat(n), spacing, origin, |i, j, k| {
            radius - (Vec3::new(i as f32, j as f32, k as f32) - center).length()
        })
        .unwrap()
    }

    fn labeled_blocks() -> VolumeGrid {
        // Label 1 slab, label 2 cube, label 4 cube, background 0; no voxel holds 3
        VolumeGrid::from_fn(UVec3::splat(12), Vec3::ONE, Vec3::ZERO, |i, j, k| {
            if (2..5).contains(&i) && (2..5).contains(&j) && (2..5).contains(&k) {
                2.0
            } else if (6..10).contains(&i) && (6..10).contains(&j) && (6..10).contains(&k) {
                4.0
            } else if k == 10 && (1..11).contains(&i) && (1..11).contains(&j) {
                1.0
            } else {
                0.0
            }
        })
        .unwrap()
    }

    #[test]
    fn test_constant_field_is_empty() {
        let grid = VolumeGrid::from_values(UVec3::splat(3), vec![1.0; 27]).unwrap();
        let extraction = SurfaceExtractor::continuous().extract(&grid, 1.0);
        assert!(extraction.is_empty());
        assert!(extraction.mesh.is_empty());
    }

    #[test]
    fn test_isovalue_outside_range_is_empty() {
        let grid = ball(10, 3.0, Vec3::ONE, Vec3::ZERO);
        let (min, max) = grid.scalar_range();
        let extractor = SurfaceExtractor::continuous();
        assert!(extractor.extract(&grid, max + 1.0).is_empty());
        assert!(extractor.extract(&grid, min - 1.0).is_empty());
        assert!(extractor.extract(&grid, f32::NAN).is_empty());
        assert!(!extractor.has_surface(&grid, max + 1.0));
    }

    #[test]
    fn test_single_crossing() {
        let mut values = vec![0.0_f32; 8];
        values[0] = 1.0;
        let grid = VolumeGrid::from_values(UVec3::splat(2), values).unwrap();
        let extraction = SurfaceExtractor::continuous().extract(&grid, 0.5);

        assert_eq!(extraction.status, ExtractionStatus::Surface { triangles: 1 });
        let mesh = &extraction.mesh;
        assert_eq!(mesh.num_vertices(), 3);
        for p in &mesh.positions {
            assert!((p.element_sum() - 0.5).abs() < 1e-6, "vertex {p} not at edge midpoint");
        }

        // Face normal points away from the inside corner
        let [a, b, c] = mesh.triangles[0].map(|v| mesh.positions[v as usize]);
        let normal = (b - a).cross(c - a);
        assert!(normal.dot(Vec3::ONE) > 0.0);
    }

    #[test]
    fn test_ball_surface() {
        let spacing = Vec3::new(0.5, 0.5, 1.0);
        let origin = Vec3::new(-3.0, 2.0, 0.0);
        let grid = ball(20, 6.0, spacing, origin);
        let extraction = SurfaceExtractor::continuous().extract(&grid, 0.0);
        let mesh = &extraction.mesh;

        assert!(
            mesh.num_triangles() > 100,
            "Expected >100 triangles, got {}",
            mesh.num_triangles()
        );
        assert!(mesh.validate().is_ok());
        assert_eq!(mesh.connected_components(), 1);

        // Vertices sit near the ellipsoid in world space
        let center = grid.to_world(Vec3::splat(9.5));
        for p in &mesh.positions {
            let local = (*p - center) / spacing;
            assert!(
                (local.length() - 6.0).abs() < 1.0,
                "vertex {p} is {} from the centre in index units",
                local.length()
            );
        }

        // Faces are oriented outwards
        let outward = mesh
            .triangles
            .iter()
            .filter(|tri| {
                let [a, b, c] = tri.map(|v| mesh.positions[v as usize]);
                (b - a).cross(c - a).dot((a + b + c) / 3.0 - center) > 0.0
            })
            .count();
        assert!(outward * 100 >= mesh.num_triangles() * 95);
    }

    #[test]
    fn test_non_finite_samples_give_finite_vertices() {
        let base = ball(9, 3.3, Vec3::ONE, Vec3::ZERO);
        let mut values = base.values().to_vec();
        values[base.index(7, 4, 4)] = f32::NAN;
        values[base.index(4, 1, 4)] = f32::INFINITY;
        values[base.index(4, 4, 7)] = f32::NEG_INFINITY;
        let grid = VolumeGrid::from_values(UVec3::splat(9), values).unwrap();

        let extractor = SurfaceExtractor::continuous();
        let extraction = extractor.extract(&grid, 0.0);
        assert!(!extraction.is_empty());
        assert!(extraction.mesh.positions.iter().all(|p| p.is_finite()));
        assert!(extraction.mesh.validate().is_ok());
        assert!(extractor.has_surface(&grid, 0.0));
    }

    #[test]
    fn test_extraction_is_repeatable() {
        let grid = ball(12, 4.0, Vec3::ONE, Vec3::ZERO);
        let extractor = SurfaceExtractor::continuous();
        let first = extractor.extract(&grid, 0.5);
        let second = extractor.extract(&grid, 0.5);
        assert_eq!(first.mesh, second.mesh);
    }

    #[test]
    fn test_discrete_exact_match() {
        let grid = labeled_blocks();
        let extractor = SurfaceExtractor::discrete();

        let label2 = extractor.extract(&grid, 2.0);
        assert!(!label2.is_empty());
        // Boundary vertices sit halfway between differing voxels
        for p in &label2.mesh.positions {
            for c in p.to_array() {
                assert!(((c * 2.0).round() - c * 2.0).abs() < 1e-6);
            }
            assert!(p.min_element() >= 1.5 && p.max_element() <= 4.5);
        }

        // Label 3 is inside the scalar range but has no voxels
        assert!(grid.in_range(3.0));
        assert!(extractor.extract(&grid, 3.0).is_empty());
        assert!(!extractor.extract(&grid, 4.0).is_empty());
        assert!(!extractor.extract(&grid, 1.0).is_empty());
    }

    #[test]
    fn test_discrete_label_surface_ignores_other_labels() {
        let grid = labeled_blocks();
        let extractor = SurfaceExtractor::discrete();
        let label4 = extractor.extract(&grid, 4.0);
        for p in &label4.mesh.positions {
            assert!(p.min_element() >= 5.5 && p.max_element() <= 9.5);
        }
    }

    #[test]
    fn test_probe_agrees_with_extraction() {
        let grid = labeled_blocks();
        let extractor = SurfaceExtractor::discrete();
        for label in 0..=5 {
            let value = label as f32;
            let extracted = !extractor.extract(&grid, value).is_empty();
            assert_eq!(extractor.has_surface(&grid, value), extracted, "label {label}");
            assert_eq!(extractor.scan(&grid, value, false) > 0, extracted);
        }
    }

    #[test]
    fn test_open_surface_at_grid_border() {
        // Everything at k == 0 is inside: the surface touches the border and is open
        let grid = VolumeGrid::from_fn(UVec3::splat(4), Vec3::ONE, Vec3::ZERO, |_, _, k| {
            if k == 0 {
                1.0
            } else {
                0.0
            }
        })
        .unwrap();
        let mesh = SurfaceExtractor::continuous().extract(&grid, 0.5).mesh;
        assert_eq!(mesh.num_triangles(), 18);
        assert!(mesh.boundary_vertices().iter().any(|&b| b));
    }
}
