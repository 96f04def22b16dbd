//! Mesh post-processing stages for theia-rs.
//!
//! Turns an extracted triangle soup into a renderable [`LabelMesh`]:
//!
//! 1. [`MeshSimplifier`] decimates while preserving topology and open boundaries.
//! 2. [`MeshSmoother`] relaxes vertices with a uniform Laplacian.
//! 3. [`NormalEstimator`] attaches area-weighted vertex normals.
//!
//! [`SurfacePipeline`] chains extraction and the three stages, and can restart
//! from a cached pre-smoothing mesh when only the smoothing amount changed.

#![allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::module_name_repetitions
)]

pub mod label_mesh;
pub mod normals;
pub mod pipeline;
pub mod simplify;
pub mod smooth;

pub use label_mesh::{LabelMesh, RenderVertex, SurfaceAppearance};
pub use normals::{face_normals, vertex_normals, NormalEstimator};
pub use pipeline::{
    PipelineOutput, RebuildScope, RunOutcome, Stage, StageReport, SurfaceParams, SurfacePipeline,
};
pub use simplify::{MeshSimplifier, SimplifyStatus, Simplified, MIN_TRIANGLES};
pub use smooth::MeshSmoother;
