//! Off-thread geometry rebuilds with latest-wins semantics.
//!
//! A [`RebuildJob`] snapshots everything a rebuild needs, so it can run on any
//! thread while the label stays usable. Each job carries the generation it was
//! issued under; issuing a newer job makes older ones stop at the next stage
//! boundary, and a result from an older generation is discarded on commit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use theia_core::{Result, TheiaError, TriMesh, VolumeGrid};
use theia_mesh::{
    PipelineOutput, RebuildScope, RunOutcome, StageReport, SurfaceAppearance, SurfacePipeline,
};

use crate::label::{Label, LabelConfig, LabelState, SurfaceCache};

/// A pending rebuild of one label.
#[derive(Debug)]
pub struct RebuildJob {
    label: u32,
    generation: u64,
    latest: Arc<AtomicU64>,
    config: LabelConfig,
    appearance: SurfaceAppearance,
    scope: RebuildScope,
    cache: Option<Arc<TriMesh>>,
    grid: Arc<VolumeGrid>,
}

/// What running a job produced.
#[derive(Debug)]
pub enum JobOutcome {
    Built(PipelineOutput),
    /// A newer job was issued before this one finished.
    Cancelled,
    Failed(TheiaError),
}

/// A finished job, ready to be committed to its label.
#[derive(Debug)]
pub struct RebuildResult {
    label: u32,
    generation: u64,
    config: LabelConfig,
    outcome: JobOutcome,
}

/// What a commit did to the label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitStatus {
    /// The new surface replaced the old one.
    Committed(StageReport),
    /// The result belonged to an older generation and was dropped.
    Superseded,
    /// The job stopped early; nothing changed.
    Cancelled,
}

impl RebuildJob {
    #[must_use]
    pub fn label(&self) -> u32 {
        self.label
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn scope(&self) -> RebuildScope {
        self.scope
    }

    /// True once a newer job has been issued for the same label.
    #[must_use]
    pub fn is_superseded(&self) -> bool {
        self.latest.load(Ordering::Acquire) != self.generation
    }

    /// Runs the pipeline. Safe to call from any thread.
    #[must_use]
    pub fn run(self, pipeline: &SurfacePipeline) -> RebuildResult {
        let latest = &self.latest;
        let generation = self.generation;
        let is_cancelled = || latest.load(Ordering::Acquire) != generation;

        let outcome = match pipeline.run_cancellable(
            &self.grid,
            self.config.surface_params(),
            self.appearance,
            self.scope,
            self.cache.as_ref(),
            &is_cancelled,
        ) {
            Ok(RunOutcome::Completed(output)) => JobOutcome::Built(output),
            Ok(RunOutcome::Cancelled) => {
                log::debug!("label {} rebuild {generation} cancelled", self.label);
                JobOutcome::Cancelled
            }
            Err(e) => JobOutcome::Failed(e),
        };

        RebuildResult {
            label: self.label,
            generation,
            config: self.config,
            outcome,
        }
    }
}

impl RebuildResult {
    #[must_use]
    pub fn label(&self) -> u32 {
        self.label
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn outcome(&self) -> &JobOutcome {
        &self.outcome
    }
}

impl Label {
    /// Issues a rebuild job for the current configuration, superseding any in flight.
    ///
    /// `FromSmoothing` is only honoured when the cached mesh was extracted at the
    /// current isovalue; otherwise the job runs the full pipeline.
    pub fn begin_rebuild(&mut self, grid: Arc<VolumeGrid>, scope: RebuildScope) -> RebuildJob {
        let generation = self.generation_handle().fetch_add(1, Ordering::AcqRel) + 1;
        if self.state() == LabelState::Built {
            self.mark_stale();
        }

        let cache = match scope {
            RebuildScope::FromSmoothing => self
                .cache()
                .filter(|c| c.isovalue.to_bits() == self.isovalue().to_bits())
                .map(|c| Arc::clone(&c.mesh)),
            RebuildScope::Full => None,
        };
        let scope = if cache.is_some() {
            RebuildScope::FromSmoothing
        } else {
            RebuildScope::Full
        };

        RebuildJob {
            label: self.id(),
            generation,
            latest: self.generation_handle(),
            config: *self.config(),
            appearance: self.appearance(),
            scope,
            cache,
            grid,
        }
    }

    /// Applies a finished job if it is still the latest one.
    ///
    /// A failed job leaves the previous surface in place and returns the
    /// label's geometry settings to the last configuration that built.
    pub fn commit(&mut self, result: RebuildResult) -> Result<CommitStatus> {
        if result.label != self.id() {
            return Err(TheiaError::invalid_config(
                "label",
                format!("result for label {} committed to label {}", result.label, self.id()),
            ));
        }
        if result.generation != self.generation() {
            log::debug!(
                "label {}: dropping superseded rebuild {} (latest {})",
                self.id(),
                result.generation,
                self.generation()
            );
            return Ok(CommitStatus::Superseded);
        }

        match result.outcome {
            JobOutcome::Built(output) => {
                let cache = SurfaceCache {
                    isovalue: result.config.isovalue,
                    mesh: output.presmoothed,
                };
                self.install(output.surface, cache);
                Ok(CommitStatus::Committed(output.report))
            }
            JobOutcome::Cancelled => Ok(CommitStatus::Cancelled),
            JobOutcome::Failed(source) => {
                log::warn!(
                    "label {} rebuild failed, keeping previous surface: {source}",
                    self.id()
                );
                self.revert_geometry();
                Err(TheiaError::RebuildFailed {
                    label: self.id(),
                    source: Box::new(source),
                })
            }
        }
    }
}
