//! theia-rs: interactive surface reconstruction for labeled 3D medical scans.
//!
//! A scan or segmentation volume is decoded into a [`VolumeGrid`] and attached
//! to a [`Scene`]. Each attached object owns a set of labels; every label that
//! occurs in the volume gets a smooth, simplified triangle surface ready for a
//! display layer to draw.
//!
//! # Quick Start
//!
//! ```no_run
//! use theia::*;
//!
//! fn main() -> Result<()> {
//!     init();
//!
//!     let dims = UVec3::splat(16);
//!     let values = vec![0.0; 16 * 16 * 16];
//!     let source = InMemorySource::new("mask.nii", dims, Vec3::ONE, Vec3::ZERO, values);
//!
//!     let mut scene = Scene::default();
//!     let mask = scene.attach_segmentation(&source)?;
//!     for view in mask.views() {
//!         println!("label {}: {:?}", view.id, view.presence);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Pipeline
//!
//! Each label surface is produced by four stages:
//!
//! - [`SurfaceExtractor`] - marching cubes at the label's isovalue
//! - [`MeshSimplifier`] - edge-collapse decimation
//! - [`MeshSmoother`] - Laplacian relaxation
//! - [`NormalEstimator`] - per-vertex normals for shading
//!
//! The [`PipelineController`] of each object reruns only the stages a change
//! requires: color and opacity never touch geometry, smoothing restarts from
//! the cached simplified mesh, and an isovalue change reruns everything.

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

pub mod scene;

pub use scene::Scene;

// Re-export core types
pub use theia_core::{
    error::{Result, TheiaError},
    options::{ObjectKind, ObjectPreset, Options, ProbeStrategy},
    Extraction, ExtractionMode, ExtractionStatus, InMemorySource, SurfaceExtractor, TriMesh,
    UVec3, Vec3, VolumeGrid, VolumeSource,
};

// Re-export mesh processing
pub use theia_mesh::{
    LabelMesh, MeshSimplifier, MeshSmoother, NormalEstimator, PipelineOutput, RebuildScope,
    RenderVertex, SimplifyStatus, Stage, StageReport, SurfaceAppearance, SurfaceParams,
    SurfacePipeline,
};

// Re-export the label model
pub use theia_labels::{
    ColorMode, CommitStatus, DetectionReport, JobOutcome, Label, LabelConfig, LabelSet,
    LabelState, LabelView, MissingLabelDetector, Palette, PipelineController, Presence,
    RebuildJob, RebuildResult, RebuildSummary, SurfaceChange, SurfaceEvent, SurfaceEventKind,
};

/// Initializes logging from the `RUST_LOG` environment variable.
///
/// Safe to call more than once; later calls do nothing.
pub fn init() {
    init_logging();
    log::info!("theia-rs initialized");
}

/// Installs the `env_logger` backend if no logger is set yet.
pub fn init_logging() {
    let _ = env_logger::try_init();
}
