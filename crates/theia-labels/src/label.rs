//! A single label: its configuration, presence, and current surface.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::Vec3;
use theia_core::{Result, TheiaError, TriMesh};
use theia_mesh::{LabelMesh, SurfaceAppearance, SurfaceParams};

/// Whether a label value occurs in the volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Presence {
    /// Not probed yet.
    #[default]
    Unknown,
    Present,
    Absent,
}

/// Where a label's surface stands relative to its configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LabelState {
    /// No surface has been built yet.
    #[default]
    Empty,
    /// The surface matches the configuration.
    Built,
    /// A geometry field changed since the surface was built.
    Stale,
}

/// User-tunable settings of one label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelConfig {
    pub isovalue: f32,
    pub color: Vec3,
    pub opacity: f32,
    pub smoothing_iterations: u32,
}

impl LabelConfig {
    /// Checks every field, rejecting anything a surface cannot be built from.
    pub fn validate(&self, max_smoothing_iterations: u32) -> Result<()> {
        validate_isovalue(self.isovalue)?;
        validate_color(self.color)?;
        validate_opacity(self.opacity)?;
        validate_smoothing(self.smoothing_iterations, max_smoothing_iterations)
    }

    /// The fields that shape geometry.
    #[must_use]
    pub fn surface_params(&self) -> SurfaceParams {
        SurfaceParams {
            isovalue: self.isovalue,
            smoothing_iterations: self.smoothing_iterations,
        }
    }
}

pub(crate) fn validate_isovalue(isovalue: f32) -> Result<()> {
    if isovalue.is_finite() {
        Ok(())
    } else {
        Err(TheiaError::invalid_config("isovalue", format!("{isovalue} is not finite")))
    }
}

pub(crate) fn validate_opacity(opacity: f32) -> Result<()> {
    if (0.0..=1.0).contains(&opacity) {
        Ok(())
    } else {
        Err(TheiaError::invalid_config(
            "opacity",
            format!("{opacity} is outside [0, 1]"),
        ))
    }
}

pub(crate) fn validate_color(color: Vec3) -> Result<()> {
    if color.to_array().iter().all(|c| (0.0..=1.0).contains(c)) {
        Ok(())
    } else {
        Err(TheiaError::invalid_config(
            "color",
            format!("{color} has a channel outside [0, 1]"),
        ))
    }
}

pub(crate) fn validate_smoothing(iterations: u32, max: u32) -> Result<()> {
    if iterations <= max {
        Ok(())
    } else {
        Err(TheiaError::invalid_config(
            "smoothing_iterations",
            format!("{iterations} exceeds the maximum of {max}"),
        ))
    }
}

/// The simplified mesh a surface was smoothed from, and the isovalue it came from.
#[derive(Debug, Clone)]
pub(crate) struct SurfaceCache {
    pub(crate) isovalue: f32,
    pub(crate) mesh: Arc<TriMesh>,
}

/// Read-only snapshot handed to a display collaborator.
#[derive(Debug, Clone, Copy)]
pub struct LabelView<'a> {
    pub id: u32,
    pub presence: Presence,
    pub enabled: bool,
    pub state: LabelState,
    pub isovalue: f32,
    /// Color as displayed, after any set-wide color mode.
    pub color: Vec3,
    pub opacity: f32,
    pub smoothing_iterations: u32,
    pub mesh: Option<&'a LabelMesh>,
}

/// One surface of an attached object.
#[derive(Debug)]
pub struct Label {
    id: u32,
    config: LabelConfig,
    presence: Presence,
    enabled: bool,
    state: LabelState,
    color_override: Option<Vec3>,
    mesh: Option<LabelMesh>,
    cache: Option<SurfaceCache>,
    last_good: Option<LabelConfig>,
    generation: Arc<AtomicU64>,
}

impl Label {
    /// Creates a label with no surface yet.
    pub fn new(id: u32, config: LabelConfig, presence: Presence) -> Self {
        Self {
            id,
            config,
            presence,
            enabled: presence != Presence::Absent,
            state: LabelState::Empty,
            color_override: None,
            mesh: None,
            cache: None,
            last_good: None,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn config(&self) -> &LabelConfig {
        &self.config
    }

    #[must_use]
    pub fn isovalue(&self) -> f32 {
        self.config.isovalue
    }

    /// The label's own color, regardless of color mode.
    #[must_use]
    pub fn color(&self) -> Vec3 {
        self.config.color
    }

    /// The color the surface is drawn with.
    #[must_use]
    pub fn display_color(&self) -> Vec3 {
        self.color_override.unwrap_or(self.config.color)
    }

    #[must_use]
    pub fn opacity(&self) -> f32 {
        self.config.opacity
    }

    #[must_use]
    pub fn smoothing_iterations(&self) -> u32 {
        self.config.smoothing_iterations
    }

    #[must_use]
    pub fn presence(&self) -> Presence {
        self.presence
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn state(&self) -> LabelState {
        self.state
    }

    #[must_use]
    pub fn mesh(&self) -> Option<&LabelMesh> {
        self.mesh.as_ref()
    }

    /// Latest rebuild generation issued for this label.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn appearance(&self) -> SurfaceAppearance {
        SurfaceAppearance::new(self.display_color(), self.config.opacity)
    }

    /// True iff the label is present, enabled, and has at least one triangle.
    #[must_use]
    pub fn is_renderable(&self) -> bool {
        self.presence == Presence::Present
            && self.enabled
            && self.mesh.as_ref().is_some_and(|m| !m.is_empty())
    }

    /// True if the label may be offered as a user-toggleable surface.
    #[must_use]
    pub fn is_toggleable(&self) -> bool {
        self.presence == Presence::Present
    }

    #[must_use]
    pub fn view(&self) -> LabelView<'_> {
        LabelView {
            id: self.id,
            presence: self.presence,
            enabled: self.enabled,
            state: self.state,
            isovalue: self.config.isovalue,
            color: self.display_color(),
            opacity: self.config.opacity,
            smoothing_iterations: self.config.smoothing_iterations,
            mesh: self.mesh.as_ref(),
        }
    }

    pub(crate) fn cache(&self) -> Option<&SurfaceCache> {
        self.cache.as_ref()
    }

    pub(crate) fn generation_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.generation)
    }

    pub(crate) fn set_presence(&mut self, presence: Presence) {
        self.presence = presence;
        if presence == Presence::Absent {
            self.enabled = false;
            self.mesh = None;
            self.cache = None;
            self.state = LabelState::Empty;
            // Outstanding jobs must not resurrect a surface
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Returns whether the value changed.
    pub(crate) fn set_opacity(&mut self, opacity: f32) -> Result<bool> {
        validate_opacity(opacity)?;
        if opacity.to_bits() == self.config.opacity.to_bits() {
            return Ok(false);
        }
        self.config.opacity = opacity;
        self.sync_appearance();
        Ok(true)
    }

    pub(crate) fn set_color(&mut self, color: Vec3) -> Result<bool> {
        validate_color(color)?;
        if color == self.config.color {
            return Ok(false);
        }
        self.config.color = color;
        self.sync_appearance();
        Ok(true)
    }

    pub(crate) fn set_color_override(&mut self, color: Option<Vec3>) -> bool {
        if self.color_override == color {
            return false;
        }
        self.color_override = color;
        self.sync_appearance();
        true
    }

    /// Only a present label can be enabled; otherwise enabling is a no-op.
    pub(crate) fn set_enabled(&mut self, enabled: bool) -> bool {
        if enabled && self.presence != Presence::Present {
            return false;
        }
        let changed = self.enabled != enabled;
        self.enabled = enabled;
        changed
    }

    /// Applies new geometry fields and marks a built surface stale.
    pub(crate) fn set_geometry(&mut self, isovalue: f32, smoothing_iterations: u32) -> bool {
        let changed = isovalue.to_bits() != self.config.isovalue.to_bits()
            || smoothing_iterations != self.config.smoothing_iterations;
        self.config.isovalue = isovalue;
        self.config.smoothing_iterations = smoothing_iterations;
        if changed && self.state == LabelState::Built {
            self.state = LabelState::Stale;
        }
        changed
    }

    pub(crate) fn mark_stale(&mut self) {
        self.state = LabelState::Stale;
    }

    /// Installs a finished surface.
    pub(crate) fn install(&mut self, mut surface: LabelMesh, cache: SurfaceCache) {
        surface.set_appearance(self.appearance());
        self.mesh = Some(surface);
        self.cache = Some(cache);
        self.last_good = Some(self.config);
        self.state = LabelState::Built;
    }

    /// Returns geometry fields to the last successfully built configuration.
    pub(crate) fn revert_geometry(&mut self) {
        if let Some(good) = self.last_good {
            self.config.isovalue = good.isovalue;
            self.config.smoothing_iterations = good.smoothing_iterations;
        }
        self.state = if self.mesh.is_some() {
            LabelState::Built
        } else {
            LabelState::Empty
        };
    }

    fn sync_appearance(&mut self) {
        let appearance = self.appearance();
        if let Some(mesh) = &mut self.mesh {
            mesh.set_appearance(appearance);
        }
    }
}
