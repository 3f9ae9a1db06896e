//! The cross-section source seam.
//!
//! The engine never owns a slicer file: it consumes layers through
//! [`CrossSectionSource`], which hands out cheap per-layer metadata and
//! decodes brightness bitmaps on demand. [`SliceStack`] is the in-memory
//! implementation used by tests, examples, and callers without a container
//! format of their own.

#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_possible_truncation)]

use crate::bounds::PixelRect;
use crate::error::{DetectError, DetectResult};
use crate::raster::Raster;

/// Cheap metadata for one layer; available without decoding the bitmap.
#[derive(Debug, Clone, Copy)]
pub struct LayerMeta {
    /// Layer index, 0 at the build plate.
    pub index: u32,
    /// Absolute Z position of the layer top in mm.
    pub z: f32,
    /// Layer thickness in mm.
    pub height: f32,
    /// Bounding box of the cured pixels; empty for an empty layer.
    pub bounds: PixelRect,
    /// True when the layer has no cured pixels.
    pub is_empty: bool,
}

/// A full ordered stack of rasterized cross-sections.
///
/// Implementations own the layer bitmaps; the engine borrows them for the
/// duration of a scan step. `decode` failures are fatal for a detection run
/// (the air sweep cannot skip a layer), so implementations should not paper
/// over unreadable layers.
pub trait CrossSectionSource: Sync {
    /// Number of layers in the stack.
    fn layer_count(&self) -> u32;

    /// Bitmap resolution shared by every layer, `(width, height)`.
    fn resolution(&self) -> (u32, u32);

    /// Bounding box of the cured pixels across the whole stack.
    fn bounding_rect(&self) -> PixelRect;

    /// Usable machine build height in mm; 0 disables print-height checks.
    fn machine_z(&self) -> f32;

    /// Metadata for one layer.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::LayerOutOfRange`] for a bad index.
    fn meta(&self, index: u32) -> DetectResult<LayerMeta>;

    /// Decode one layer's brightness bitmap.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::LayerOutOfRange`] for a bad index or
    /// [`DetectError::LayerDecode`] when the bitmap cannot be produced.
    fn decode(&self, index: u32) -> DetectResult<Raster>;
}

/// Round a height to the 0.01 mm the Z axis actually resolves.
#[must_use]
pub fn round_height(height: f32) -> f32 {
    (height * 100.0).round() / 100.0
}

/// In-memory [`CrossSectionSource`].
///
/// # Example
///
/// ```
/// use slice_printability::{CrossSectionSource, Raster, SliceStack};
///
/// let layers = vec![Raster::new(8, 8); 3];
/// let stack = SliceStack::from_layers(layers, 0.05, 150.0);
/// assert_eq!(stack.layer_count(), 3);
/// assert!(stack.meta(0).unwrap().is_empty);
/// ```
#[derive(Debug, Clone)]
pub struct SliceStack {
    layers: Vec<Raster>,
    metas: Vec<LayerMeta>,
    resolution: (u32, u32),
    bounding_rect: PixelRect,
    machine_z: f32,
}

impl SliceStack {
    /// Build a stack from uniform-thickness layers.
    ///
    /// Bounding boxes and empty flags are computed up front so `meta` never
    /// touches pixel data.
    ///
    /// # Panics
    ///
    /// Panics when layers disagree on resolution.
    #[must_use]
    pub fn from_layers(layers: Vec<Raster>, layer_height: f32, machine_z: f32) -> Self {
        let resolution = layers
            .first()
            .map_or((0, 0), |l| (l.width(), l.height()));
        let mut bounding_rect = PixelRect::default();
        let metas = layers
            .iter()
            .enumerate()
            .map(|(i, layer)| {
                assert_eq!(
                    (layer.width(), layer.height()),
                    resolution,
                    "all layers must share one resolution"
                );
                let bounds = content_bounds(layer);
                bounding_rect = bounding_rect.union(&bounds);
                LayerMeta {
                    index: i as u32,
                    z: round_height(layer_height * (i as f32 + 1.0)),
                    height: layer_height,
                    bounds,
                    is_empty: bounds.is_empty(),
                }
            })
            .collect();
        Self {
            layers,
            metas,
            resolution,
            bounding_rect,
            machine_z,
        }
    }

    fn check_index(&self, index: u32) -> DetectResult<usize> {
        if index >= self.layer_count() {
            return Err(DetectError::LayerOutOfRange {
                layer_index: index,
                layer_count: self.layer_count(),
            });
        }
        Ok(index as usize)
    }
}

impl CrossSectionSource for SliceStack {
    fn layer_count(&self) -> u32 {
        self.layers.len() as u32
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn bounding_rect(&self) -> PixelRect {
        self.bounding_rect
    }

    fn machine_z(&self) -> f32 {
        self.machine_z
    }

    fn meta(&self, index: u32) -> DetectResult<LayerMeta> {
        Ok(self.metas[self.check_index(index)?])
    }

    fn decode(&self, index: u32) -> DetectResult<Raster> {
        Ok(self.layers[self.check_index(index)?].clone())
    }
}

fn content_bounds(layer: &Raster) -> PixelRect {
    let mut min_x = i32::MAX;
    let mut min_y = i32::MAX;
    let mut max_x = i32::MIN;
    let mut max_y = i32::MIN;
    for y in 0..layer.height() as i32 {
        for x in 0..layer.width() as i32 {
            if layer.pixel(x, y) != 0 {
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
    }
    if min_x > max_x {
        return PixelRect::default();
    }
    #[allow(clippy::cast_sign_loss)]
    PixelRect::new(
        min_x,
        min_y,
        (max_x - min_x + 1) as u32,
        (max_y - min_y + 1) as u32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_height() {
        assert!((round_height(0.049_999) - 0.05).abs() < 1e-6);
        assert!((round_height(1.234) - 1.23).abs() < 1e-6);
    }

    #[test]
    fn test_stack_metadata() {
        let mut solid = Raster::new(10, 10);
        solid.set_pixel(3, 4, 255);
        solid.set_pixel(6, 7, 255);
        let stack = SliceStack::from_layers(vec![Raster::new(10, 10), solid], 0.05, 150.0);

        let empty = stack.meta(0).unwrap();
        assert!(empty.is_empty);
        assert!(empty.bounds.is_empty());

        let filled = stack.meta(1).unwrap();
        assert!(!filled.is_empty);
        assert_eq!(filled.bounds, PixelRect::new(3, 4, 4, 4));
        assert!((filled.z - 0.1).abs() < 1e-6);

        assert_eq!(stack.bounding_rect(), PixelRect::new(3, 4, 4, 4));
    }

    #[test]
    fn test_out_of_range() {
        let stack = SliceStack::from_layers(vec![Raster::new(4, 4)], 0.05, 150.0);
        assert!(stack.meta(1).is_err());
        assert!(stack.decode(9).is_err());
    }
}
