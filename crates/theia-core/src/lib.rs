//! Core types for theia-rs.
//!
//! This crate provides the pieces every other theia crate builds on:
//! - [`VolumeGrid`] and the [`VolumeSource`] seam to the external decoder
//! - [`TriMesh`], the indexed triangle mesh passed between pipeline stages
//! - [`SurfaceExtractor`] for continuous and discrete isosurfaces
//! - [`Options`] and [`ObjectPreset`] configuration

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]
// Grid indices are u32 and mesh indices are u32 by convention
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

pub mod error;
pub mod marching_cubes;
pub mod mesh;
pub mod options;
pub mod volume;

pub use error::{Result, TheiaError};
pub use marching_cubes::{Extraction, ExtractionMode, ExtractionStatus, SurfaceExtractor};
pub use mesh::{canonical_edge, tri_edges, TriMesh, VertexAdjacency};
pub use options::{ObjectKind, ObjectPreset, Options, ProbeStrategy};
pub use volume::{InMemorySource, VolumeGrid, VolumeSource};

// Re-export glam types for convenience
pub use glam::{UVec3, Vec3};
