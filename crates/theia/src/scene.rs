//! The set of objects currently attached to a viewing session.

use std::sync::Arc;

use theia_core::{ObjectKind, ObjectPreset, Options, Result, TheiaError, VolumeSource};
use theia_labels::{LabelSet, PipelineController};

/// Named objects in attach order, each with its own controller.
///
/// There is no global scene; callers own one and pass it around.
#[derive(Debug, Default)]
pub struct Scene {
    options: Options,
    objects: Vec<PipelineController>,
}

impl Scene {
    /// Creates an empty scene that attaches objects with `options`.
    pub fn new(options: Options) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            objects: Vec::new(),
        })
    }

    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Decodes a continuous scan and attaches it with the intensity preset.
    pub fn attach_intensity(
        &mut self,
        source: &dyn VolumeSource,
    ) -> Result<&mut PipelineController> {
        let preset = ObjectPreset {
            kind: ObjectKind::Intensity,
            ..self.options.intensity.clone()
        };
        self.attach(source, &preset)
    }

    /// Decodes a label mask and attaches it with the segmentation preset.
    pub fn attach_segmentation(
        &mut self,
        source: &dyn VolumeSource,
    ) -> Result<&mut PipelineController> {
        let preset = ObjectPreset {
            kind: ObjectKind::Segmentation,
            ..self.options.segmentation.clone()
        };
        self.attach(source, &preset)
    }

    /// Attaches an object with an explicit preset; `preset.kind` picks the
    /// label layout.
    ///
    /// Nothing is attached if the name is taken, the source fails to decode,
    /// or the preset is invalid.
    pub fn attach(
        &mut self,
        source: &dyn VolumeSource,
        preset: &ObjectPreset,
    ) -> Result<&mut PipelineController> {
        let name = source.name().to_string();
        if self.contains(&name) {
            return Err(TheiaError::ObjectExists(name));
        }

        let grid = source.load().map_err(|e| match e {
            e @ TheiaError::Decode { .. } => e,
            other => TheiaError::Decode {
                source_name: name.clone(),
                reason: other.to_string(),
            },
        })?;
        let (lo, hi) = grid.scalar_range();
        log::debug!(
            "decoded '{name}': {} voxels, scalar range [{lo}, {hi}]",
            grid.num_voxels()
        );

        let set = LabelSet::from_preset(name, Arc::new(grid), preset, &self.options)?;
        let controller = PipelineController::attach(set, &self.options)?;

        let index = self.objects.len();
        self.objects.push(controller);
        Ok(&mut self.objects[index])
    }

    /// Removes an object and hands back its controller.
    pub fn detach(&mut self, name: &str) -> Result<PipelineController> {
        let index = self
            .objects
            .iter()
            .position(|o| o.name() == name)
            .ok_or_else(|| TheiaError::ObjectNotFound(name.to_string()))?;
        log::info!("detaching object '{name}'");
        Ok(self.objects.remove(index))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.objects.iter().any(|o| o.name() == name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PipelineController> {
        self.objects.iter().find(|o| o.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut PipelineController> {
        self.objects.iter_mut().find(|o| o.name() == name)
    }

    /// Like [`Scene::get_mut`] but fails with `ObjectNotFound`.
    pub fn require_mut(&mut self, name: &str) -> Result<&mut PipelineController> {
        self.get_mut(name)
            .ok_or_else(|| TheiaError::ObjectNotFound(name.to_string()))
    }

    /// Objects in the order they were attached.
    #[must_use]
    pub fn objects(&self) -> &[PipelineController] {
        &self.objects
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Detaches every object.
    pub fn clear(&mut self) {
        self.objects.clear();
    }
}
