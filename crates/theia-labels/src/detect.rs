//! Finding which candidate label values actually occur in a volume.

use std::sync::Arc;

use theia_core::{Options, ProbeStrategy, VolumeGrid};
use theia_mesh::SurfacePipeline;

use crate::label::Presence;
use crate::label_set::LabelSet;

/// Label ids split by presence, each in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionReport {
    pub present: Vec<u32>,
    pub absent: Vec<u32>,
}

/// Probes every candidate label of a set and marks the ones without geometry absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MissingLabelDetector {
    strategy: ProbeStrategy,
    parallel: bool,
}

impl MissingLabelDetector {
    /// `parallel` only takes effect when the `parallel` feature is enabled.
    #[must_use]
    pub fn new(strategy: ProbeStrategy, parallel: bool) -> Self {
        Self { strategy, parallel }
    }

    #[must_use]
    pub fn from_options(options: &Options) -> Self {
        Self::new(options.probe_strategy, options.parallel_probe)
    }

    #[must_use]
    pub fn strategy(&self) -> ProbeStrategy {
        self.strategy
    }

    /// Returns true if `value` yields at least one triangle.
    ///
    /// Values above the grid's maximum are never probed. A pipeline error
    /// while probing counts as no geometry.
    #[must_use]
    pub fn probe(&self, pipeline: &SurfacePipeline, grid: &VolumeGrid, value: f32) -> bool {
        if value > grid.scalar_range().1 {
            return false;
        }
        match self.strategy {
            ProbeStrategy::CellScan => pipeline.extractor().has_surface(grid, value),
            ProbeStrategy::FullPipeline => {
                let extraction = pipeline.extractor().extract(grid, value);
                if extraction.is_empty() {
                    return false;
                }
                match pipeline.simplifier().simplify(extraction.mesh) {
                    Ok(simplified) => !simplified.mesh.is_empty(),
                    Err(e) => {
                        log::warn!("probe of value {value} failed: {e}");
                        false
                    }
                }
            }
        }
    }

    /// Classifies each value without touching any label.
    #[must_use]
    pub fn classify(
        &self,
        pipeline: &SurfacePipeline,
        grid: &VolumeGrid,
        values: &[f32],
    ) -> Vec<Presence> {
        let to_presence = |&value: &f32| {
            if self.probe(pipeline, grid, value) {
                Presence::Present
            } else {
                Presence::Absent
            }
        };

        map_values(values, self.parallel, to_presence)
    }

    /// Resolves the presence of every label still marked unknown.
    ///
    /// Absent labels are disabled and lose any surface they had. Labels whose
    /// presence is already known are reported as they are.
    pub fn detect(&self, set: &mut LabelSet, pipeline: &SurfacePipeline) -> DetectionReport {
        let unknown: Vec<(u32, f32)> = set
            .labels()
            .iter()
            .filter(|l| l.presence() == Presence::Unknown)
            .map(|l| (l.id(), l.isovalue()))
            .collect();
        let values: Vec<f32> = unknown.iter().map(|&(_, v)| v).collect();
        let grid = Arc::clone(set.grid());
        let results = self.classify(pipeline, &grid, &values);

        for (&(id, _), presence) in unknown.iter().zip(results) {
            if let Ok(label) = set.require_mut(id) {
                label.set_presence(presence);
            }
        }

        let mut report = DetectionReport::default();
        for label in set.labels() {
            match label.presence() {
                Presence::Present => report.present.push(label.id()),
                Presence::Absent => report.absent.push(label.id()),
                Presence::Unknown => {}
            }
        }
        log::info!(
            "object '{}': labels present {:?}, absent {:?}",
            set.name(),
            report.present,
            report.absent
        );
        report
    }
}

#[cfg(feature = "parallel")]
fn map_values<F>(values: &[f32], parallel: bool, f: F) -> Vec<Presence>
where
    F: Fn(&f32) -> Presence + Sync + Send,
{
    use rayon::prelude::*;
    if parallel {
        values.par_iter().map(f).collect()
    } else {
        values.iter().map(f).collect()
    }
}

#[cfg(not(feature = "parallel"))]
fn map_values<F>(values: &[f32], _parallel: bool, f: F) -> Vec<Presence>
where
    F: Fn(&f32) -> Presence,
{
    values.iter().map(f).collect()
}
