//! Detection configuration.
//!
//! One sub-config per check, each independently enable/disable-able.
//! Defaults match field-proven values for consumer MSLA printers.

use crate::error::{DetectError, DetectResult};

/// Island detection settings.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IslandConfig {
    /// Master switch for the check.
    pub enabled: bool,

    /// Layers to check; `None` checks every layer. Layer 0 is never
    /// checked (nothing below it to support).
    pub white_list_layers: Option<Vec<u32>>,

    /// Combine island and overhang detection to discard false positives:
    /// a provisional island with some support is kept only when an
    /// overhang confirms it.
    pub enhanced_detection: bool,

    /// Consider diagonal neighbors when labeling components.
    pub allow_diagonal_bonds: bool,

    /// Binarize the layer above this brightness before labeling;
    /// 0 disables the threshold.
    pub binary_threshold: u8,

    /// Minimum component pixel area to bother checking.
    pub min_area_px: u32,

    /// Minimum brightness for a pixel to count as part of a component.
    pub min_pixel_brightness: u8,

    /// Minimum brightness on the previous layer for a pixel to count as
    /// supporting.
    pub support_brightness: u8,

    /// Fraction of a component's pixels that must be supported for it to
    /// not be an island (floored at one pixel).
    pub support_multiplier: f64,

    /// With `enhanced_detection`, a provisional island with at least this
    /// many supporting pixels is re-tested as an overhang.
    pub required_support_px: u32,
}

impl Default for IslandConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            white_list_layers: None,
            enhanced_detection: true,
            allow_diagonal_bonds: false,
            binary_threshold: 1,
            min_area_px: 1,
            min_pixel_brightness: 10,
            support_brightness: 150,
            support_multiplier: 0.25,
            required_support_px: 10,
        }
    }
}

impl IslandConfig {
    /// A disabled config.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Whether this layer is eligible for the check.
    #[must_use]
    pub fn applies_to(&self, layer_index: u32) -> bool {
        if !self.enabled || layer_index == 0 {
            return false;
        }
        self.white_list_layers
            .as_ref()
            .is_none_or(|list| list.contains(&layer_index))
    }
}

/// Overhang detection settings.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OverhangConfig {
    /// Master switch for the check.
    pub enabled: bool,

    /// Layers to check; `None` checks every layer. Layer 0 is never
    /// checked.
    pub white_list_layers: Option<Vec<u32>>,

    /// Run the whole-frame overhang scan regardless of island results.
    /// When false the scan piggybacks on island components.
    pub independent_from_islands: bool,

    /// Pixels that must survive the erode for an overhang to be reported.
    pub min_pixels: u32,

    /// Erosion iterations applied to `current - previous` before counting;
    /// removes slivers that are normal layer-to-layer growth.
    pub erode_iterations: u32,
}

impl Default for OverhangConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            white_list_layers: None,
            independent_from_islands: true,
            min_pixels: 1,
            erode_iterations: 40,
        }
    }
}

impl OverhangConfig {
    /// A disabled config.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Whether this layer is eligible for the check.
    #[must_use]
    pub fn applies_to(&self, layer_index: u32) -> bool {
        if !self.enabled || layer_index == 0 {
            return false;
        }
        self.white_list_layers
            .as_ref()
            .is_none_or(|list| list.contains(&layer_index))
    }
}

/// Resin trap / suction cup detection settings.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResinTrapConfig {
    /// Master switch for the sweep.
    pub enabled: bool,

    /// First layer of the sweep, which is also treated as a drain layer.
    /// Raise this to step over rafts.
    pub start_layer_index: u32,

    /// Binarize layers above this brightness before contour extraction;
    /// 0 disables the threshold.
    pub binary_threshold: u8,

    /// Minimum hollow-region pixel area to test at all.
    pub min_area_px: u32,

    /// Brightest pixel resin can still flow past. The air-map view of each
    /// layer treats pixels above this as solid.
    pub drain_brightness: u8,

    /// Air pixels a hollow region must overlap to count as drained.
    pub required_overlap_px: u32,

    /// Also classify drainable-but-sealed-below voids as suction cups.
    pub detect_suction_cups: bool,

    /// Minimum per-layer area for a suction cup witness to be reported.
    pub min_suction_cup_area: u64,

    /// Minimum total height in mm for a suction cup group to be reported.
    pub min_suction_cup_height: f32,
}

impl Default for ResinTrapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            start_layer_index: 0,
            binary_threshold: 127,
            min_area_px: 1,
            drain_brightness: 30,
            required_overlap_px: 10,
            detect_suction_cups: true,
            min_suction_cup_area: 100,
            min_suction_cup_height: 0.5,
        }
    }
}

impl ResinTrapConfig {
    /// A disabled config.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Touching-bound detection settings.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TouchingBoundConfig {
    /// Master switch for the check.
    pub enabled: bool,

    /// Minimum brightness for a margin pixel to count as touching.
    pub min_pixel_brightness: u8,

    /// Margin band thickness from the left edge, in pixels.
    pub margin_left: u32,
    /// Margin band thickness from the top edge, in pixels.
    pub margin_top: u32,
    /// Margin band thickness from the right edge, in pixels.
    pub margin_right: u32,
    /// Margin band thickness from the bottom edge, in pixels.
    pub margin_bottom: u32,
}

impl Default for TouchingBoundConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_pixel_brightness: 127,
            margin_left: 5,
            margin_top: 5,
            margin_right: 5,
            margin_bottom: 5,
        }
    }
}

impl TouchingBoundConfig {
    /// A disabled config.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Print-height detection settings.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PrintHeightConfig {
    /// Master switch for the check.
    pub enabled: bool,

    /// Extra height in mm added to the machine Z before flagging.
    pub offset: f32,
}

impl PrintHeightConfig {
    /// An enabled config with no offset.
    #[must_use]
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            offset: 0.0,
        }
    }
}

/// Empty-layer detection settings.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EmptyLayerConfig {
    /// Master switch for the check.
    pub enabled: bool,
}

impl Default for EmptyLayerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Full configuration for one detection run.
///
/// # Example
///
/// ```
/// use slice_printability::DetectionConfig;
///
/// let config = DetectionConfig::default();
/// assert!(config.validate().is_ok());
/// assert!(config.resin_trap.detect_suction_cups);
/// ```
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DetectionConfig {
    /// Island detection.
    pub island: IslandConfig,
    /// Overhang detection.
    pub overhang: OverhangConfig,
    /// Resin trap / suction cup sweep.
    pub resin_trap: ResinTrapConfig,
    /// Touching-bound detection.
    pub touching_bound: TouchingBoundConfig,
    /// Print-height detection.
    pub print_height: PrintHeightConfig,
    /// Empty-layer detection.
    pub empty_layer: EmptyLayerConfig,
}

impl DetectionConfig {
    /// A config with every check disabled. Useful as a base for enabling
    /// exactly one check.
    #[must_use]
    pub fn all_disabled() -> Self {
        Self {
            island: IslandConfig::disabled(),
            overhang: OverhangConfig::disabled(),
            resin_trap: ResinTrapConfig::disabled(),
            touching_bound: TouchingBoundConfig::disabled(),
            print_height: PrintHeightConfig::default(),
            empty_layer: EmptyLayerConfig { enabled: false },
        }
    }

    /// Check configured thresholds before a run starts.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::InvalidConfig`] for out-of-range values;
    /// nothing is ever rejected mid-run.
    pub fn validate(&self) -> DetectResult<()> {
        if !(0.0..=1.0).contains(&self.island.support_multiplier) {
            return Err(DetectError::config(format!(
                "island support multiplier {} must be within 0..=1",
                self.island.support_multiplier
            )));
        }
        if self.resin_trap.enabled && self.resin_trap.required_overlap_px == 0 {
            return Err(DetectError::config(
                "resin trap required overlap must be at least 1 pixel",
            ));
        }
        if self.resin_trap.min_suction_cup_height < 0.0 {
            return Err(DetectError::config(format!(
                "suction cup minimum height {} must not be negative",
                self.resin_trap.min_suction_cup_height
            )));
        }
        if self.print_height.enabled && self.print_height.offset < 0.0 {
            return Err(DetectError::config(format!(
                "print height offset {} must not be negative",
                self.print_height.offset
            )));
        }
        Ok(())
    }
}
