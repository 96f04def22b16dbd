//! The ordered labels of one attached object.

use std::sync::Arc;

use theia_core::{ExtractionMode, ObjectKind, ObjectPreset, Options, Result, TheiaError, VolumeGrid};
use theia_mesh::{RebuildScope, SurfacePipeline};

use crate::label::{validate_opacity, Label, LabelConfig, LabelView, Presence};
use crate::palette::{ColorMode, Palette};
use crate::rebuild::{CommitStatus, RebuildJob, RebuildResult};

/// Totals from [`LabelSet::rebuild_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildSummary {
    /// Labels that received a new surface.
    pub built: usize,
    /// Built labels whose surface has no triangles.
    pub empty: usize,
    /// Labels skipped because they are absent.
    pub skipped: usize,
    /// Labels whose rebuild failed; they kept their previous state.
    pub failed: Vec<u32>,
}

/// An object's labels, ordered by ascending id, plus the grid they are built from.
#[derive(Debug)]
pub struct LabelSet {
    name: String,
    kind: ObjectKind,
    grid: Arc<VolumeGrid>,
    labels: Vec<Label>,
    palette: Palette,
    color_mode: ColorMode,
}

impl LabelSet {
    /// A continuous-intensity object: one label (id 0) at the preset threshold.
    pub fn intensity(
        name: impl Into<String>,
        grid: Arc<VolumeGrid>,
        preset: &ObjectPreset,
        options: &Options,
    ) -> Result<Self> {
        let palette = Palette::new(preset.colors.clone());
        let config = LabelConfig {
            isovalue: preset.isovalue,
            color: palette.primary(),
            opacity: preset.opacity,
            smoothing_iterations: preset.smoothing_iterations,
        };
        config.validate(options.max_smoothing_iterations)?;

        let name = name.into();
        log::info!("attaching intensity object '{name}'");
        Ok(Self {
            name,
            kind: ObjectKind::Intensity,
            grid,
            labels: vec![Label::new(0, config, Presence::Present)],
            palette,
            color_mode: ColorMode::Multi,
        })
    }

    /// A segmentation object: labels `1..=min(floor(max), max_labels)` where
    /// `max` is the grid's scalar maximum. Presence starts unknown.
    pub fn segmentation(
        name: impl Into<String>,
        grid: Arc<VolumeGrid>,
        preset: &ObjectPreset,
        options: &Options,
    ) -> Result<Self> {
        let palette = Palette::new(preset.colors.clone());
        let highest = candidate_count(grid.scalar_range().1, options.max_labels);

        let mut labels = Vec::with_capacity(highest as usize);
        for id in 1..=highest {
            let config = LabelConfig {
                isovalue: id as f32,
                color: palette.color_for(id),
                opacity: preset.opacity,
                smoothing_iterations: preset.smoothing_iterations,
            };
            config.validate(options.max_smoothing_iterations)?;
            labels.push(Label::new(id, config, Presence::Unknown));
        }

        let name = name.into();
        log::info!("attaching segmentation object '{name}' with {highest} candidate labels");
        Ok(Self {
            name,
            kind: ObjectKind::Segmentation,
            grid,
            labels,
            palette,
            color_mode: ColorMode::Multi,
        })
    }

    /// Builds the set matching `preset.kind`.
    pub fn from_preset(
        name: impl Into<String>,
        grid: Arc<VolumeGrid>,
        preset: &ObjectPreset,
        options: &Options,
    ) -> Result<Self> {
        match preset.kind {
            ObjectKind::Intensity => Self::intensity(name, grid, preset, options),
            ObjectKind::Segmentation => Self::segmentation(name, grid, preset, options),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// How this object's grid is sampled.
    #[must_use]
    pub fn extraction_mode(&self) -> ExtractionMode {
        match self.kind {
            ObjectKind::Intensity => ExtractionMode::Continuous,
            ObjectKind::Segmentation => ExtractionMode::Discrete,
        }
    }

    #[must_use]
    pub fn grid(&self) -> &Arc<VolumeGrid> {
        &self.grid
    }

    #[must_use]
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    #[must_use]
    pub fn color_mode(&self) -> ColorMode {
        self.color_mode
    }

    #[must_use]
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Returns the label with the given id.
    #[must_use]
    pub fn label(&self, id: u32) -> Option<&Label> {
        self.position(id).map(|i| &self.labels[i])
    }

    /// Like [`LabelSet::label`], reporting a missing id as an error.
    pub fn require(&self, id: u32) -> Result<&Label> {
        self.label(id).ok_or_else(|| self.not_found(id))
    }

    pub(crate) fn require_mut(&mut self, id: u32) -> Result<&mut Label> {
        match self.position(id) {
            Some(i) => Ok(&mut self.labels[i]),
            None => Err(self.not_found(id)),
        }
    }

    /// Labels currently drawn.
    pub fn renderable_labels(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter().filter(|l| l.is_renderable())
    }

    /// Labels offered to the user as toggleable surfaces.
    pub fn toggleable_labels(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter().filter(|l| l.is_toggleable())
    }

    /// Snapshots of every label, in display order.
    #[must_use]
    pub fn views(&self) -> Vec<LabelView<'_>> {
        self.labels.iter().map(Label::view).collect()
    }

    /// Builds the surface of every label that is not absent.
    ///
    /// A failing label keeps its previous state and is listed in the summary;
    /// the other labels are still built.
    pub fn rebuild_all(&mut self, pipeline: &SurfacePipeline) -> RebuildSummary {
        let mut summary = RebuildSummary::default();
        let mut jobs = Vec::with_capacity(self.labels.len());
        for label in &mut self.labels {
            if label.presence() == Presence::Absent {
                summary.skipped += 1;
                continue;
            }
            jobs.push(label.begin_rebuild(Arc::clone(&self.grid), RebuildScope::Full));
        }

        for result in run_jobs(jobs, pipeline) {
            let Some(i) = self.position(result.label()) else {
                continue;
            };
            match self.labels[i].commit(result) {
                Ok(CommitStatus::Committed(report)) => {
                    summary.built += 1;
                    if report.triangles == 0 {
                        summary.empty += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!("object '{}': {e}", self.name);
                    summary.failed.push(self.labels[i].id());
                }
            }
        }

        log::info!(
            "object '{}': built {} labels ({} empty, {} absent, {} failed)",
            self.name,
            summary.built,
            summary.empty,
            summary.skipped,
            summary.failed.len()
        );
        summary
    }

    /// Sets the opacity of every label. Returns the ids that changed.
    pub fn set_opacity_all(&mut self, opacity: f32) -> Result<Vec<u32>> {
        validate_opacity(opacity)?;
        let mut changed = Vec::new();
        for label in &mut self.labels {
            if label.set_opacity(opacity)? {
                changed.push(label.id());
            }
        }
        Ok(changed)
    }

    /// Switches between per-label colors and one shared color. Returns the ids
    /// whose displayed color changed.
    pub fn set_color_mode(&mut self, mode: ColorMode) -> Result<Vec<u32>> {
        let color = match mode {
            ColorMode::Multi => None,
            ColorMode::Single(c) => {
                crate::label::validate_color(c)?;
                Some(c)
            }
        };
        self.color_mode = mode;
        let mut changed = Vec::new();
        for label in &mut self.labels {
            let before = label.display_color();
            label.set_color_override(color);
            if label.display_color() != before {
                changed.push(label.id());
            }
        }
        Ok(changed)
    }

    fn position(&self, id: u32) -> Option<usize> {
        self.labels.binary_search_by_key(&id, Label::id).ok()
    }

    fn not_found(&self, id: u32) -> TheiaError {
        TheiaError::LabelNotFound {
            object: self.name.clone(),
            label: id,
        }
    }
}

/// Number of segmentation candidates for a grid whose largest value is `max`.
#[allow(clippy::cast_sign_loss)]
fn candidate_count(max: f32, cap: u32) -> u32 {
    if max.is_nan() || max < 1.0 {
        return 0;
    }
    let observed = max.floor().min(u32::MAX as f32) as u32;
    observed.min(cap)
}

#[cfg(not(feature = "parallel"))]
fn run_jobs(jobs: Vec<RebuildJob>, pipeline: &SurfacePipeline) -> Vec<RebuildResult> {
    jobs.into_iter().map(|job| job.run(pipeline)).collect()
}

#[cfg(feature = "parallel")]
fn run_jobs(jobs: Vec<RebuildJob>, pipeline: &SurfacePipeline) -> Vec<RebuildResult> {
    use rayon::prelude::*;
    jobs.into_par_iter().map(|job| job.run(pipeline)).collect()
}
