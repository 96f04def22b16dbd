//! Label model for theia-rs.
//!
//! An attached object is a [`LabelSet`]: one label for a continuous scan, or
//! one label per candidate value for a segmentation mask. The
//! [`MissingLabelDetector`] decides which candidates actually occur, and the
//! [`PipelineController`] keeps every surface consistent with its settings,
//! rebuilding only what a change requires.

#![allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::module_name_repetitions
)]

pub mod controller;
pub mod detect;
pub mod label;
pub mod label_set;
pub mod palette;
pub mod rebuild;

pub use controller::{PipelineController, SurfaceChange, SurfaceEvent, SurfaceEventKind};
pub use detect::{DetectionReport, MissingLabelDetector};
pub use label::{Label, LabelConfig, LabelState, LabelView, Presence};
pub use label_set::{LabelSet, RebuildSummary};
pub use palette::{ColorMode, Palette};
pub use rebuild::{CommitStatus, JobOutcome, RebuildJob, RebuildResult};
