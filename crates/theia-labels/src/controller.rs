//! Routing configuration changes to the smallest amount of pipeline work.
//!
//! Opacity and color only touch the rendering attributes of an existing
//! surface. Isovalue changes rerun the whole pipeline; smoothing changes
//! restart from the cached simplified mesh. Every observable change is
//! announced as a [`SurfaceEvent`].

use std::collections::VecDeque;
use std::sync::Arc;

use glam::Vec3;
use theia_core::{ObjectKind, Options, Result, TheiaError};
use theia_mesh::{RebuildScope, StageReport, SurfacePipeline};

use crate::detect::{DetectionReport, MissingLabelDetector};
use crate::label::{validate_isovalue, validate_smoothing, Label, LabelView, Presence};
use crate::label_set::{LabelSet, RebuildSummary};
use crate::palette::ColorMode;
use crate::rebuild::{CommitStatus, RebuildJob, RebuildResult};

/// What a mutator did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceChange {
    /// Geometry was rebuilt.
    Rebuilt(StageReport),
    /// Only color or opacity changed.
    Appearance,
    /// The label was shown or hidden.
    Visibility,
    /// Nothing changed.
    Unchanged,
}

/// Kinds of [`SurfaceEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEventKind {
    GeometryChanged,
    AppearanceChanged,
    VisibilityChanged,
    PresenceResolved(Presence),
}

/// A notification that a label's surface changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceEvent {
    pub object: String,
    pub label: u32,
    pub kind: SurfaceEventKind,
}

type Listener = Box<dyn FnMut(&SurfaceEvent) + Send>;

/// Owns one object's labels and keeps their surfaces consistent with their settings.
pub struct PipelineController {
    set: LabelSet,
    pipeline: SurfacePipeline,
    detector: MissingLabelDetector,
    max_smoothing_iterations: u32,
    detection: Option<DetectionReport>,
    initial_build: RebuildSummary,
    events: VecDeque<SurfaceEvent>,
    listeners: Vec<Listener>,
}

impl std::fmt::Debug for PipelineController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineController")
            .field("object", &self.set.name())
            .field("labels", &self.set.len())
            .field("pending_events", &self.events.len())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl PipelineController {
    /// Takes ownership of a label set, probes segmentation labels for
    /// presence, and builds every surface that has data.
    pub fn attach(mut set: LabelSet, options: &Options) -> Result<Self> {
        options.validate()?;
        let pipeline = SurfacePipeline::from_options(set.extraction_mode(), options)?;
        let detector = MissingLabelDetector::from_options(options);
        let mut events = VecDeque::new();

        let detection = if set.kind() == ObjectKind::Segmentation {
            let report = detector.detect(&mut set, &pipeline);
            for label in set.labels() {
                events.push_back(SurfaceEvent {
                    object: set.name().to_string(),
                    label: label.id(),
                    kind: SurfaceEventKind::PresenceResolved(label.presence()),
                });
            }
            Some(report)
        } else {
            None
        };

        let initial_build = set.rebuild_all(&pipeline);
        for label in set.labels().iter().filter(|l| l.mesh().is_some()) {
            events.push_back(SurfaceEvent {
                object: set.name().to_string(),
                label: label.id(),
                kind: SurfaceEventKind::GeometryChanged,
            });
        }

        Ok(Self {
            set,
            pipeline,
            detector,
            max_smoothing_iterations: options.max_smoothing_iterations,
            detection,
            initial_build,
            events,
            listeners: Vec::new(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.set.name()
    }

    #[must_use]
    pub fn label_set(&self) -> &LabelSet {
        &self.set
    }

    pub fn label(&self, id: u32) -> Result<&Label> {
        self.set.require(id)
    }

    #[must_use]
    pub fn views(&self) -> Vec<LabelView<'_>> {
        self.set.views()
    }

    #[must_use]
    pub fn pipeline(&self) -> &SurfacePipeline {
        &self.pipeline
    }

    #[must_use]
    pub fn detector(&self) -> &MissingLabelDetector {
        &self.detector
    }

    /// Presence found at attach time; `None` for intensity objects.
    #[must_use]
    pub fn detection(&self) -> Option<&DetectionReport> {
        self.detection.as_ref()
    }

    /// Outcome of the build performed at attach time.
    #[must_use]
    pub fn initial_build(&self) -> &RebuildSummary {
        &self.initial_build
    }

    /// Registers a callback invoked for every event, in order.
    pub fn subscribe(&mut self, listener: impl FnMut(&SurfaceEvent) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Takes every event queued since the last call.
    pub fn drain_events(&mut self) -> Vec<SurfaceEvent> {
        self.events.drain(..).collect()
    }

    /// Changes the threshold and rebuilds the label's surface.
    pub fn set_isovalue(&mut self, id: u32, isovalue: f32) -> Result<SurfaceChange> {
        validate_isovalue(isovalue)?;
        let label = self.geometry_target(id)?;
        let iterations = label.smoothing_iterations();
        if !label.set_geometry(isovalue, iterations) && label.mesh().is_some() {
            return Ok(SurfaceChange::Unchanged);
        }
        self.rebuild(id, RebuildScope::Full)
    }

    /// Changes the smoothing amount. Reuses the cached simplified mesh.
    pub fn set_smoothing_iterations(&mut self, id: u32, iterations: u32) -> Result<SurfaceChange> {
        validate_smoothing(iterations, self.max_smoothing_iterations)?;
        let label = self.geometry_target(id)?;
        let isovalue = label.isovalue();
        if !label.set_geometry(isovalue, iterations) && label.mesh().is_some() {
            return Ok(SurfaceChange::Unchanged);
        }
        self.rebuild(id, RebuildScope::FromSmoothing)
    }

    pub fn set_opacity(&mut self, id: u32, opacity: f32) -> Result<SurfaceChange> {
        let changed = self.set.require_mut(id)?.set_opacity(opacity)?;
        Ok(self.appearance_change(id, changed))
    }

    pub fn set_color(&mut self, id: u32, color: Vec3) -> Result<SurfaceChange> {
        let changed = self.set.require_mut(id)?.set_color(color)?;
        Ok(self.appearance_change(id, changed))
    }

    /// Shows or hides a label. Enabling an absent label does nothing.
    pub fn set_enabled(&mut self, id: u32, enabled: bool) -> Result<SurfaceChange> {
        if !self.set.require_mut(id)?.set_enabled(enabled) {
            return Ok(SurfaceChange::Unchanged);
        }
        self.emit(id, SurfaceEventKind::VisibilityChanged);
        Ok(SurfaceChange::Visibility)
    }

    /// Sets the opacity of every label.
    pub fn set_opacity_all(&mut self, opacity: f32) -> Result<Vec<u32>> {
        let changed = self.set.set_opacity_all(opacity)?;
        for &id in &changed {
            self.emit(id, SurfaceEventKind::AppearanceChanged);
        }
        Ok(changed)
    }

    /// Switches between per-label colors and one shared color.
    pub fn set_color_mode(&mut self, mode: ColorMode) -> Result<Vec<u32>> {
        let changed = self.set.set_color_mode(mode)?;
        for &id in &changed {
            self.emit(id, SurfaceEventKind::AppearanceChanged);
        }
        Ok(changed)
    }

    /// Sets the smoothing amount of every present label.
    ///
    /// Labels are rebuilt one by one; a label whose rebuild fails keeps its
    /// previous surface and settings while the rest are still updated, and
    /// the first failure is returned.
    pub fn set_smoothing_all(&mut self, iterations: u32) -> Result<Vec<(u32, SurfaceChange)>> {
        validate_smoothing(iterations, self.max_smoothing_iterations)?;
        let ids: Vec<u32> = self
            .set
            .labels()
            .iter()
            .filter(|l| l.presence() != Presence::Absent)
            .map(Label::id)
            .collect();

        let mut changes = Vec::with_capacity(ids.len());
        let mut first_error = None;
        for id in ids {
            match self.set_smoothing_iterations(id, iterations) {
                Ok(change) => changes.push((id, change)),
                Err(e) => {
                    log::warn!("object '{}': {e}", self.set.name());
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(changes),
        }
    }

    /// Applies new geometry settings and hands back a job to run elsewhere.
    ///
    /// The settings take effect immediately; the surface follows when the
    /// job's result is passed to [`PipelineController::complete`]. Issuing
    /// another job for the same label supersedes this one.
    pub fn request_rebuild(
        &mut self,
        id: u32,
        isovalue: f32,
        smoothing_iterations: u32,
    ) -> Result<RebuildJob> {
        validate_isovalue(isovalue)?;
        validate_smoothing(smoothing_iterations, self.max_smoothing_iterations)?;
        let grid = Arc::clone(self.set.grid());
        let label = self.geometry_target(id)?;
        let scope = if isovalue.to_bits() == label.isovalue().to_bits() {
            RebuildScope::FromSmoothing
        } else {
            RebuildScope::Full
        };
        label.set_geometry(isovalue, smoothing_iterations);
        Ok(label.begin_rebuild(grid, scope))
    }

    /// Commits a finished job. Stale results are dropped without effect.
    pub fn complete(&mut self, result: RebuildResult) -> Result<SurfaceChange> {
        let id = result.label();
        let status = self.set.require_mut(id)?.commit(result)?;
        Ok(self.rebuild_change(id, status))
    }

    fn rebuild(&mut self, id: u32, scope: RebuildScope) -> Result<SurfaceChange> {
        let grid = Arc::clone(self.set.grid());
        let label = self.set.require_mut(id)?;
        let job = label.begin_rebuild(grid, scope);
        let status = label.commit(job.run(&self.pipeline))?;
        Ok(self.rebuild_change(id, status))
    }

    fn rebuild_change(&mut self, id: u32, status: CommitStatus) -> SurfaceChange {
        match status {
            CommitStatus::Committed(report) => {
                log::debug!(
                    "object '{}' label {id}: rebuilt {:?}, {} triangles",
                    self.set.name(),
                    report.stages,
                    report.triangles
                );
                self.emit(id, SurfaceEventKind::GeometryChanged);
                SurfaceChange::Rebuilt(report)
            }
            CommitStatus::Superseded | CommitStatus::Cancelled => SurfaceChange::Unchanged,
        }
    }

    fn geometry_target(&mut self, id: u32) -> Result<&mut Label> {
        let object = self.set.name().to_string();
        let label = self.set.require_mut(id)?;
        if label.presence() == Presence::Absent {
            return Err(TheiaError::LabelAbsent { object, label: id });
        }
        Ok(label)
    }

    fn appearance_change(&mut self, id: u32, changed: bool) -> SurfaceChange {
        if changed {
            self.emit(id, SurfaceEventKind::AppearanceChanged);
            SurfaceChange::Appearance
        } else {
            SurfaceChange::Unchanged
        }
    }

    fn emit(&mut self, label: u32, kind: SurfaceEventKind) {
        let event = SurfaceEvent {
            object: self.set.name().to_string(),
            label,
            kind,
        };
        for listener in &mut self.listeners {
            listener(&event);
        }
        self.events.push_back(event);
    }
}
