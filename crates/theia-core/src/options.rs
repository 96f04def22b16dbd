//! Configuration options for theia.
//!
//! Everything that used to be a module-level constant in a viewer script lives
//! here and is passed explicitly into label sets and controllers.

use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TheiaError};

/// Pipeline-wide configuration constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Fraction of triangles the simplifier tries to discard.
    pub target_reduction: f32,

    /// Step size of each Laplacian smoothing iteration.
    pub relaxation_factor: f32,

    /// Maximum number of labels visualized for one segmentation object.
    pub max_labels: u32,

    /// Upper bound accepted for a label's smoothing iterations.
    pub max_smoothing_iterations: u32,

    /// How candidate labels are probed for presence.
    pub probe_strategy: ProbeStrategy,

    /// Probe candidates in parallel (requires the `parallel` feature).
    pub parallel_probe: bool,

    /// Preset for continuous-intensity objects.
    pub intensity: ObjectPreset,

    /// Preset for segmentation objects.
    pub segmentation: ObjectPreset,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            target_reduction: 0.5,
            relaxation_factor: 0.01,
            max_labels: 10,
            max_smoothing_iterations: 5000,
            probe_strategy: ProbeStrategy::CellScan,
            parallel_probe: false,
            intensity: ObjectPreset::brain(),
            segmentation: ObjectPreset::mask(),
        }
    }
}

impl Options {
    /// Parses options from a JSON document. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Loads options from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::debug!("loading options from {}", path.as_ref().display());
        Self::from_json_str(&text)
    }

    /// Checks that every constant is usable.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.target_reduction) {
            return Err(TheiaError::invalid_config(
                "target_reduction",
                format!("{} is outside [0, 1)", self.target_reduction),
            ));
        }
        if !(self.relaxation_factor > 0.0 && self.relaxation_factor <= 1.0) {
            return Err(TheiaError::invalid_config(
                "relaxation_factor",
                format!("{} is outside (0, 1]", self.relaxation_factor),
            ));
        }
        if self.max_labels == 0 {
            return Err(TheiaError::invalid_config("max_labels", "must be at least 1"));
        }
        self.intensity.validate(self.max_smoothing_iterations)?;
        self.segmentation.validate(self.max_smoothing_iterations)?;
        Ok(())
    }
}

/// Strategy used to decide whether a label value has any geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProbeStrategy {
    /// Scan cube configurations without building triangles.
    #[default]
    CellScan,
    /// Run extraction and simplification, then count triangles.
    FullPipeline,
}

/// Whether an object is a continuous scan or a discrete label mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Continuous intensities; one user-tunable threshold surface.
    Intensity,
    /// Discrete label values; one surface per label.
    Segmentation,
}

/// Initial per-label settings for a kind of object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectPreset {
    /// Object kind this preset applies to.
    pub kind: ObjectKind,
    /// Initial isovalue (ignored for segmentation labels, which use their id).
    pub isovalue: f32,
    /// Initial smoothing iterations.
    pub smoothing_iterations: u32,
    /// Initial opacity.
    pub opacity: f32,
    /// Colors assigned in label order, cycling when exhausted.
    pub colors: Vec<Vec3>,
}

impl ObjectPreset {
    /// Anatomical scan defaults.
    pub fn brain() -> Self {
        Self {
            kind: ObjectKind::Intensity,
            isovalue: 20.0,
            smoothing_iterations: 500,
            opacity: 0.2,
            colors: vec![Vec3::new(1.0, 0.9, 0.9)],
        }
    }

    /// Segmentation mask defaults.
    pub fn mask() -> Self {
        Self {
            kind: ObjectKind::Segmentation,
            isovalue: 1.0,
            smoothing_iterations: 500,
            opacity: 1.0,
            colors: vec![
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 0.0, 1.0),
                Vec3::new(1.0, 0.0, 1.0),
                Vec3::new(0.0, 1.0, 1.0),
                Vec3::new(1.0, 0.5, 0.5),
                Vec3::new(0.5, 1.0, 0.5),
                Vec3::new(0.5, 0.5, 1.0),
            ],
        }
    }

    fn validate(&self, max_smoothing_iterations: u32) -> Result<()> {
        if !self.isovalue.is_finite() {
            return Err(TheiaError::invalid_config("isovalue", "must be finite"));
        }
        if self.smoothing_iterations > max_smoothing_iterations {
            return Err(TheiaError::invalid_config(
                "smoothing_iterations",
                format!(
                    "{} exceeds the maximum of {max_smoothing_iterations}",
                    self.smoothing_iterations
                ),
            ));
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(TheiaError::invalid_config(
                "opacity",
                format!("{} is outside [0, 1]", self.opacity),
            ));
        }
        if self.colors.is_empty() {
            return Err(TheiaError::invalid_config("colors", "at least one color is required"));
        }
        Ok(())
    }
}
