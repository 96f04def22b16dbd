//! Label color assignment.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// How the labels of one object are colored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum ColorMode {
    /// Every label shows its own color.
    #[default]
    Multi,
    /// Every label shows the same color.
    Single(Vec3),
}

/// An ordered color table indexed by label id.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    colors: Vec<Vec3>,
}

impl Palette {
    /// Wraps a color table. An empty table falls back to white.
    pub fn new(colors: Vec<Vec3>) -> Self {
        if colors.is_empty() {
            log::warn!("empty color table, using white");
            return Self {
                colors: vec![Vec3::ONE],
            };
        }
        Self { colors }
    }

    /// Returns the color for a label id.
    ///
    /// Label 0 (the single surface of an intensity object) and label 1 both
    /// take the first entry; the table wraps when ids exceed its length.
    #[must_use]
    pub fn color_for(&self, label: u32) -> Vec3 {
        let slot = label.saturating_sub(1) as usize % self.colors.len();
        self.colors[slot]
    }

    /// The color used by [`ColorMode::Single`] unless another is given.
    #[must_use]
    pub fn primary(&self) -> Vec3 {
        self.colors[0]
    }

    /// Shorthand for a single-color mode using the primary color.
    #[must_use]
    pub fn single_mode(&self) -> ColorMode {
        ColorMode::Single(self.primary())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use theia_core::ObjectPreset;

    #[test]
    fn test_mask_palette_order() {
        let palette = Palette::new(ObjectPreset::mask().colors);
        assert_eq!(palette.color_for(1), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(palette.color_for(2), Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(palette.color_for(9), Vec3::new(0.5, 0.5, 1.0));
    }

    #[test]
    fn test_wraps_past_table_end() {
        let palette = Palette::new(ObjectPreset::mask().colors);
        assert_eq!(palette.len(), 9);
        assert_eq!(palette.color_for(10), palette.color_for(1));
        assert_eq!(palette.color_for(0), palette.primary());
    }

    #[test]
    fn test_empty_table_falls_back() {
        let palette = Palette::new(Vec::new());
        assert_eq!(palette.color_for(4), Vec3::ONE);
        assert!(!palette.is_empty());
    }

    #[test]
    fn test_single_mode_uses_primary() {
        let palette = Palette::new(ObjectPreset::mask().colors);
        assert_eq!(palette.single_mode(), ColorMode::Single(Vec3::new(1.0, 0.0, 0.0)));
    }
}
