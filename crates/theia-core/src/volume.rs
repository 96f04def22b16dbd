//! Regular 3D scalar grids and the seam to the external volume decoder.
//!
//! A [`VolumeGrid`] is immutable once built and is shared read-only (via `Arc`)
//! between every extraction that runs against it.

use glam::{UVec3, Vec3};

use crate::error::{Result, TheiaError};

/// A decoded 3D scalar volume.
///
/// Samples are stored with x varying fastest: the value at node `(i, j, k)` lives
/// at index `i + nx * (j + ny * k)`.
#[derive(Debug, Clone)]
pub struct VolumeGrid {
    dims: UVec3,
    spacing: Vec3,
    origin: Vec3,
    values: Vec<f32>,
    scalar_range: (f32, f32),
}

impl VolumeGrid {
    /// Builds a grid from decoded samples.
    ///
    /// Fails if the sample count does not match `dims`, if any dimension is
    /// smaller than 2, or if the spacing is not strictly positive.
    pub fn new(dims: UVec3, spacing: Vec3, origin: Vec3, values: Vec<f32>) -> Result<Self> {
        let expected = (dims.x as usize) * (dims.y as usize) * (dims.z as usize);
        if values.len() != expected {
            return Err(TheiaError::SizeMismatch {
                expected,
                actual: values.len(),
            });
        }
        if dims.min_element() < 2 {
            return Err(TheiaError::InvalidGrid(format!(
                "all dimensions must be >= 2, got {}x{}x{}",
                dims.x, dims.y, dims.z
            )));
        }
        if !spacing.is_finite() || spacing.min_element() <= 0.0 {
            return Err(TheiaError::InvalidGrid(format!(
                "spacing must be positive, got {spacing}"
            )));
        }
        if !origin.is_finite() {
            return Err(TheiaError::InvalidGrid(format!(
                "origin must be finite, got {origin}"
            )));
        }

        let scalar_range = compute_range(&values);
        log::debug!(
            "volume grid {}x{}x{} spacing {spacing} range [{}, {}]",
            dims.x,
            dims.y,
            dims.z,
            scalar_range.0,
            scalar_range.1
        );

        Ok(Self {
            dims,
            spacing,
            origin,
            values,
            scalar_range,
        })
    }

    /// Builds a grid with unit spacing at the origin.
    pub fn from_values(dims: UVec3, values: Vec<f32>) -> Result<Self> {
        Self::new(dims, Vec3::ONE, Vec3::ZERO, values)
    }

    /// Builds a grid by evaluating `f(i, j, k)` at every node.
    pub fn from_fn(
        dims: UVec3,
        spacing: Vec3,
        origin: Vec3,
        mut f: impl FnMut(u32, u32, u32) -> f32,
    ) -> Result<Self> {
        let mut values =
            Vec::with_capacity((dims.x as usize) * (dims.y as usize) * (dims.z as usize));
        for k in 0..dims.z {
            for j in 0..dims.y {
                for i in 0..dims.x {
                    values.push(f(i, j, k));
                }
            }
        }
        Self::new(dims, spacing, origin, values)
    }

    /// Returns the number of nodes in each dimension.
    #[must_use]
    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    /// Returns the distance between adjacent nodes along each axis.
    #[must_use]
    pub fn spacing(&self) -> Vec3 {
        self.spacing
    }

    /// Returns the world position of node `(0, 0, 0)`.
    #[must_use]
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Returns `(min, max)` over all finite samples, `(0, 0)` if there are none.
    #[must_use]
    pub fn scalar_range(&self) -> (f32, f32) {
        self.scalar_range
    }

    /// Returns the raw samples.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Returns the total number of nodes.
    #[must_use]
    pub fn num_voxels(&self) -> usize {
        self.values.len()
    }

    /// Flattens a node index.
    #[inline]
    #[must_use]
    pub fn index(&self, i: u32, j: u32, k: u32) -> usize {
        let (nx, ny) = (self.dims.x as usize, self.dims.y as usize);
        (i as usize) + nx * ((j as usize) + ny * (k as usize))
    }

    /// Returns the sample at node `(i, j, k)`.
    #[inline]
    #[must_use]
    pub fn value(&self, i: u32, j: u32, k: u32) -> f32 {
        self.values[self.index(i, j, k)]
    }

    /// Maps a point in index space to world space.
    #[inline]
    #[must_use]
    pub fn to_world(&self, p: Vec3) -> Vec3 {
        self.origin + p * self.spacing
    }

    /// Returns the world-space bounding box of the grid.
    #[must_use]
    pub fn bounds(&self) -> (Vec3, Vec3) {
        let extent = (self.dims - UVec3::ONE).as_vec3();
        (self.origin, self.to_world(extent))
    }

    /// Returns `true` if `v` lies within the scalar range.
    #[must_use]
    pub fn in_range(&self, v: f32) -> bool {
        v >= self.scalar_range.0 && v <= self.scalar_range.1
    }

    /// Counts the samples exactly equal to `v`.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn count_equal(&self, v: f32) -> usize {
        self.values.iter().filter(|&&x| x == v).count()
    }
}

fn compute_range(values: &[f32]) -> (f32, f32) {
    let mut min = f32::MAX;
    let mut max = f32::MIN;
    for &v in values {
        if v.is_finite() {
            min = min.min(v);
            max = max.max(v);
        }
    }
    if min > max {
        (0.0, 0.0)
    } else {
        (min, max)
    }
}

/// The external volume decoder, seen from the core.
///
/// Implementations read a file format (or anything else) into a [`VolumeGrid`].
/// A failed load must be reported as an error; the core never builds labels
/// without a valid grid.
pub trait VolumeSource {
    /// Human-readable name of the source (usually a file name).
    fn name(&self) -> &str;

    /// Decodes the volume.
    fn load(&self) -> Result<VolumeGrid>;
}

/// A source wrapping samples that were already decoded in memory.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    name: String,
    dims: UVec3,
    spacing: Vec3,
    origin: Vec3,
    values: Vec<f32>,
}

impl InMemorySource {
    /// Wraps decoded samples under a name.
    pub fn new(
        name: impl Into<String>,
        dims: UVec3,
        spacing: Vec3,
        origin: Vec3,
        values: Vec<f32>,
    ) -> Self {
        Self {
            name: name.into(),
            dims,
            spacing,
            origin,
            values,
        }
    }
}

impl VolumeSource for InMemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<VolumeGrid> {
        VolumeGrid::new(self.dims, self.spacing, self.origin, self.values.clone()).map_err(|e| {
            TheiaError::Decode {
                source_name: self.name.clone(),
                reason: e.to_string(),
            }
        })
    }
}
