//! The per-label surface pipeline: extract, simplify, smooth, estimate normals.
//!
//! Each stage is a pure function of its input mesh and parameters, so the
//! output of a run depends only on the grid, the isovalue, and the smoothing
//! iteration count. The simplified (pre-smoothing) mesh is returned as a shared
//! cache so that a smoothing-only change can restart from there.

use std::sync::Arc;

use theia_core::{
    ExtractionMode, ExtractionStatus, Options, Result, SurfaceExtractor, TheiaError, TriMesh,
    VolumeGrid,
};

use crate::label_mesh::{LabelMesh, SurfaceAppearance};
use crate::normals::NormalEstimator;
use crate::simplify::{MeshSimplifier, SimplifyStatus};
use crate::smooth::MeshSmoother;

/// One step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Extract,
    Simplify,
    Smooth,
    Normals,
}

/// Where a rebuild starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebuildScope {
    /// Re-extract from the grid.
    #[default]
    Full,
    /// Reuse the cached simplified mesh and redo smoothing and normals only.
    FromSmoothing,
}

/// Geometry parameters of one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceParams {
    pub isovalue: f32,
    pub smoothing_iterations: u32,
}

/// What a run did, stage by stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Stages that actually ran, in order.
    pub stages: Vec<Stage>,
    /// Triangles out of extraction, if it ran.
    pub extracted_triangles: Option<usize>,
    /// Simplifier outcome, if it ran.
    pub simplify: Option<SimplifyStatus>,
    /// Final triangle count.
    pub triangles: usize,
    /// Final vertex count.
    pub vertices: usize,
}

/// A finished surface together with the cache for later smoothing-only runs.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub surface: LabelMesh,
    pub presmoothed: Arc<TriMesh>,
    pub report: StageReport,
}

/// Result of a run that may be abandoned between stages.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(PipelineOutput),
    /// The cancellation hook fired; nothing was produced.
    Cancelled,
}

/// The configured chain of stages for one kind of object.
#[derive(Debug, Clone)]
pub struct SurfacePipeline {
    extractor: SurfaceExtractor,
    simplifier: MeshSimplifier,
    smoother: MeshSmoother,
    normals: NormalEstimator,
}

impl SurfacePipeline {
    /// Assembles a pipeline from explicit stages.
    pub fn new(
        extractor: SurfaceExtractor,
        simplifier: MeshSimplifier,
        smoother: MeshSmoother,
    ) -> Self {
        Self {
            extractor,
            simplifier,
            smoother,
            normals: NormalEstimator::new(),
        }
    }

    /// Assembles a pipeline for `mode` using the shared constants in `options`.
    pub fn from_options(mode: ExtractionMode, options: &Options) -> Result<Self> {
        Ok(Self::new(
            SurfaceExtractor::new(mode),
            MeshSimplifier::new(options.target_reduction)?,
            MeshSmoother::new(options.relaxation_factor)?,
        ))
    }

    #[must_use]
    pub fn extractor(&self) -> &SurfaceExtractor {
        &self.extractor
    }

    #[must_use]
    pub fn simplifier(&self) -> &MeshSimplifier {
        &self.simplifier
    }

    #[must_use]
    pub fn smoother(&self) -> &MeshSmoother {
        &self.smoother
    }

    /// Runs the pipeline to completion.
    pub fn run(
        &self,
        grid: &VolumeGrid,
        params: SurfaceParams,
        appearance: SurfaceAppearance,
        scope: RebuildScope,
        cache: Option<&Arc<TriMesh>>,
    ) -> Result<PipelineOutput> {
        match self.run_cancellable(grid, params, appearance, scope, cache, &|| false)? {
            RunOutcome::Completed(output) => Ok(output),
            RunOutcome::Cancelled => Err(TheiaError::Cancelled),
        }
    }

    /// Runs the pipeline, checking `is_cancelled` before each stage.
    ///
    /// `FromSmoothing` without a cache falls back to a full run.
    pub fn run_cancellable(
        &self,
        grid: &VolumeGrid,
        params: SurfaceParams,
        appearance: SurfaceAppearance,
        scope: RebuildScope,
        cache: Option<&Arc<TriMesh>>,
        is_cancelled: &dyn Fn() -> bool,
    ) -> Result<RunOutcome> {
        let mut report = StageReport::default();

        let presmoothed = match (scope, cache) {
            (RebuildScope::FromSmoothing, Some(cached)) => {
                log::debug!("reusing cached mesh ({} triangles)", cached.num_triangles());
                Arc::clone(cached)
            }
            (scope, _) => {
                if scope == RebuildScope::FromSmoothing {
                    log::debug!("no cached mesh, falling back to a full rebuild");
                }
                if is_cancelled() {
                    return Ok(RunOutcome::Cancelled);
                }
                let extraction = self.extractor.extract(grid, params.isovalue);
                report.stages.push(Stage::Extract);
                report.extracted_triangles = Some(match extraction.status {
                    ExtractionStatus::Surface { triangles } => triangles,
                    ExtractionStatus::Empty => 0,
                });

                if is_cancelled() {
                    return Ok(RunOutcome::Cancelled);
                }
                let simplified = self.simplifier.simplify(extraction.mesh)?;
                report.stages.push(Stage::Simplify);
                report.simplify = Some(simplified.status);
                Arc::new(simplified.mesh)
            }
        };

        if is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }
        let smoothed = self
            .smoother
            .smooth(TriMesh::clone(&presmoothed), params.smoothing_iterations)?;
        report.stages.push(Stage::Smooth);

        if is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }
        let surface = if smoothed.is_empty() {
            LabelMesh::new(smoothed, Vec::new(), appearance)?
        } else {
            self.normals.estimate(smoothed, appearance)?
        };
        report.stages.push(Stage::Normals);
        report.triangles = surface.num_triangles();
        report.vertices = surface.num_vertices();

        Ok(RunOutcome::Completed(PipelineOutput {
            surface,
            presmoothed,
            report,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ball_grid;
    use std::cell::Cell;

    fn pipeline() -> SurfacePipeline {
        SurfacePipeline::from_options(ExtractionMode::Continuous, &Options::default()).unwrap()
    }

    fn params(iterations: u32) -> SurfaceParams {
        SurfaceParams {
            isovalue: 0.0,
            smoothing_iterations: iterations,
        }
    }

    #[test]
    fn test_full_run() {
        let grid = ball_grid(14, 5.0);
        let output = pipeline()
            .run(&grid, params(10), SurfaceAppearance::default(), RebuildScope::Full, None)
            .unwrap();

        let report = &output.report;
        assert_eq!(
            report.stages,
            vec![Stage::Extract, Stage::Simplify, Stage::Smooth, Stage::Normals]
        );
        let extracted = report.extracted_triangles.unwrap();
        assert!(report.triangles > 0);
        assert!(report.triangles < extracted);
        assert_eq!(output.surface.num_triangles(), output.presmoothed.num_triangles());
        assert_eq!(output.surface.normals().len(), output.surface.num_vertices());
    }

    #[test]
    fn test_empty_isovalue_gives_empty_surface() {
        let grid = ball_grid(10, 3.0);
        let output = pipeline()
            .run(
                &grid,
                SurfaceParams {
                    isovalue: 1000.0,
                    smoothing_iterations: 5,
                },
                SurfaceAppearance::default(),
                RebuildScope::Full,
                None,
            )
            .unwrap();
        assert!(output.surface.is_empty());
        assert_eq!(output.report.extracted_triangles, Some(0));
        assert_eq!(output.report.simplify, Some(SimplifyStatus::Unchanged));
    }

    #[test]
    fn test_smoothing_only_matches_full_rebuild() {
        let grid = ball_grid(12, 4.0);
        let pipeline = pipeline();
        let first = pipeline
            .run(&grid, params(5), SurfaceAppearance::default(), RebuildScope::Full, None)
            .unwrap();

        let partial = pipeline
            .run(
                &grid,
                params(40),
                SurfaceAppearance::default(),
                RebuildScope::FromSmoothing,
                Some(&first.presmoothed),
            )
            .unwrap();
        let full = pipeline
            .run(&grid, params(40), SurfaceAppearance::default(), RebuildScope::Full, None)
            .unwrap();

        assert_eq!(partial.report.stages, vec![Stage::Smooth, Stage::Normals]);
        assert_eq!(partial.surface, full.surface);
        assert!(Arc::ptr_eq(&partial.presmoothed, &first.presmoothed));
        assert_eq!(partial.surface.num_vertices(), first.surface.num_vertices());
        assert_eq!(partial.surface.num_triangles(), first.surface.num_triangles());
    }

    #[test]
    fn test_from_smoothing_without_cache_runs_everything() {
        let grid = ball_grid(10, 3.0);
        let output = pipeline()
            .run(
                &grid,
                params(1),
                SurfaceAppearance::default(),
                RebuildScope::FromSmoothing,
                None,
            )
            .unwrap();
        assert_eq!(output.report.stages.first(), Some(&Stage::Extract));
    }

    #[test]
    fn test_cancellation_between_stages() {
        let grid = ball_grid(10, 3.0);
        let checks = Cell::new(0);
        let cancel_after_two = || {
            checks.set(checks.get() + 1);
            checks.get() > 2
        };
        let outcome = pipeline()
            .run_cancellable(
                &grid,
                params(3),
                SurfaceAppearance::default(),
                RebuildScope::Full,
                None,
                &cancel_after_two,
            )
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Cancelled));
        assert_eq!(checks.get(), 3);
    }

    #[test]
    fn test_deterministic() {
        let grid = ball_grid(12, 4.2);
        let a = pipeline()
            .run(&grid, params(20), SurfaceAppearance::default(), RebuildScope::Full, None)
            .unwrap();
        let b = pipeline()
            .run(&grid, params(20), SurfaceAppearance::default(), RebuildScope::Full, None)
            .unwrap();
        assert_eq!(a.surface, b.surface);
        assert_eq!(a.report, b.report);
    }
}
