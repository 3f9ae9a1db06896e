//! Single-channel 8-bit raster and the binary-image toolbox.
//!
//! The detection engine works on brightness bitmaps: one byte per pixel,
//! zero is empty space, anything above zero (or above a configured
//! threshold) is cured resin. All cross-layer reasoning reduces to a small
//! set of whole-raster and masked operations implemented here.

// Pixel indices fit comfortably in the integer types used here.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

use std::collections::VecDeque;

use crate::bounds::{PixelPoint, PixelRect};

/// Pixel connectivity for component labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// Orthogonal neighbors only.
    Four,
    /// Orthogonal and diagonal neighbors.
    Eight,
}

/// One connected component found by [`Raster::label_components`].
#[derive(Debug, Clone)]
pub struct ComponentStats {
    /// Label value in the label map (1-based; 0 is background).
    pub label: u32,
    /// Bounding box of the component.
    pub bounds: PixelRect,
    /// Number of pixels in the component.
    pub area_px: u64,
    /// True when any component pixel lies on the raster border.
    pub touches_border: bool,
}

/// Label map produced by [`Raster::label_components`].
#[derive(Debug, Clone)]
pub struct ComponentLabels {
    /// Per-pixel label, row-major; 0 is background.
    pub labels: Vec<u32>,
    /// Stats per component, indexed by `label - 1`.
    pub components: Vec<ComponentStats>,
}

/// An owned single-channel raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Raster {
    /// Create a zero-filled raster.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    /// Create a raster from raw row-major bytes.
    ///
    /// # Panics
    ///
    /// Panics when `data.len() != width * height`.
    #[must_use]
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Self {
        assert_eq!(
            data.len(),
            width as usize * height as usize,
            "raster data length must match dimensions"
        );
        Self {
            width,
            height,
            data,
        }
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Raw row-major pixel data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    fn idx(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Pixel value at `(x, y)`; zero outside the raster.
    #[inline]
    #[must_use]
    pub fn pixel(&self, x: i32, y: i32) -> u8 {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return 0;
        }
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Set the pixel at `(x, y)`; out-of-bounds writes are ignored.
    #[inline]
    pub fn set_pixel(&mut self, x: i32, y: i32, value: u8) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let i = y as usize * self.width as usize + x as usize;
        self.data[i] = value;
    }

    /// Number of nonzero pixels.
    #[must_use]
    pub fn count_nonzero(&self) -> u64 {
        self.data.iter().filter(|&&v| v != 0).count() as u64
    }

    /// Invert every pixel (`255 - v`).
    pub fn invert(&mut self) {
        for v in &mut self.data {
            *v = 255 - *v;
        }
    }

    /// Inverted copy.
    #[must_use]
    pub fn inverted(&self) -> Self {
        let mut out = self.clone();
        out.invert();
        out
    }

    /// Logical complement: 255 where the pixel is zero, 0 elsewhere.
    ///
    /// Unlike [`Raster::inverted`] this is brightness-independent, so it is
    /// safe on bitmaps that were never binarized.
    #[must_use]
    pub fn complement(&self) -> Self {
        let data = self
            .data
            .iter()
            .map(|&v| if v == 0 { 255 } else { 0 })
            .collect();
        Self {
            width: self.width,
            height: self.height,
            data,
        }
    }

    /// Binarize in place: pixels above `threshold` become 255, the rest 0.
    pub fn threshold(&mut self, threshold: u8) {
        for v in &mut self.data {
            *v = if *v > threshold { 255 } else { 0 };
        }
    }

    /// Binarized copy.
    #[must_use]
    pub fn thresholded(&self, threshold: u8) -> Self {
        let mut out = self.clone();
        out.threshold(threshold);
        out
    }

    /// Per-pixel saturating subtraction of `other`.
    ///
    /// # Panics
    ///
    /// Panics when dimensions differ.
    pub fn subtract(&mut self, other: &Self) {
        assert_eq!((self.width, self.height), (other.width, other.height));
        for (v, o) in self.data.iter_mut().zip(&other.data) {
            *v = v.saturating_sub(*o);
        }
    }

    /// Per-pixel bitwise OR of `other`.
    ///
    /// # Panics
    ///
    /// Panics when dimensions differ.
    pub fn or(&mut self, other: &Self) {
        assert_eq!((self.width, self.height), (other.width, other.height));
        for (v, o) in self.data.iter_mut().zip(&other.data) {
            *v |= *o;
        }
    }

    /// Copy of the sub-rectangle `rect`, clamped to the raster.
    #[must_use]
    pub fn crop(&self, rect: &PixelRect) -> Self {
        let full = PixelRect::new(0, 0, self.width, self.height);
        let Some(clamped) = rect.intersection(&full) else {
            return Self::new(0, 0);
        };
        let mut out = Self::new(clamped.width, clamped.height);
        for y in 0..clamped.height {
            let src_y = (clamped.y as u32 + y) as usize;
            let src_start = src_y * self.width as usize + clamped.x as usize;
            let dst_start = y as usize * clamped.width as usize;
            out.data[dst_start..dst_start + clamped.width as usize]
                .copy_from_slice(&self.data[src_start..src_start + clamped.width as usize]);
        }
        out
    }

    /// Count pixels that are nonzero in both `self` and `mask`, with the
    /// mask's top-left corner placed at `origin`.
    #[must_use]
    pub fn overlap_count(&self, mask: &Raster, origin: PixelPoint) -> u64 {
        let mut count = 0;
        for my in 0..mask.height as i32 {
            for mx in 0..mask.width as i32 {
                if mask.pixel(mx, my) != 0 && self.pixel(origin.x + mx, origin.y + my) != 0 {
                    count += 1;
                }
            }
        }
        count
    }

    /// Set every pixel under a nonzero `mask` pixel to `value`, with the
    /// mask's top-left corner placed at `origin`.
    pub fn stamp_mask(&mut self, mask: &Raster, origin: PixelPoint, value: u8) {
        for my in 0..mask.height as i32 {
            for mx in 0..mask.width as i32 {
                if mask.pixel(mx, my) != 0 {
                    self.set_pixel(origin.x + mx, origin.y + my, value);
                }
            }
        }
    }

    /// Clear every pixel under a nonzero `mask` pixel.
    pub fn erase_mask(&mut self, mask: &Raster, origin: PixelPoint) {
        self.stamp_mask(mask, origin, 0);
    }

    /// Binary erosion with a 3x3 rectangular kernel, repeated `iterations`
    /// times. Pixels outside the raster count as solid, the morphology
    /// default border, so content touching the edge holds its edge and a
    /// crop erodes the same as the uncropped frame.
    #[must_use]
    pub fn eroded(&self, iterations: u32) -> Self {
        let mut current = self.clone();
        for _ in 0..iterations {
            let mut next = Self::new(self.width, self.height);
            for y in 0..self.height as i32 {
                for x in 0..self.width as i32 {
                    if current.pixel(x, y) == 0 {
                        continue;
                    }
                    let mut keep = true;
                    'kernel: for dy in -1..=1 {
                        for dx in -1..=1 {
                            let nx = x + dx;
                            let ny = y + dy;
                            let inside = nx >= 0
                                && ny >= 0
                                && nx < self.width as i32
                                && ny < self.height as i32;
                            if inside && current.pixel(nx, ny) == 0 {
                                keep = false;
                                break 'kernel;
                            }
                        }
                    }
                    if keep {
                        next.set_pixel(x, y, 255);
                    }
                }
            }
            if next.count_nonzero() == 0 {
                return next;
            }
            current = next;
        }
        current
    }

    /// Label connected components of nonzero pixels.
    #[must_use]
    pub fn label_components(&self, connectivity: Connectivity) -> ComponentLabels {
        let mut labels = vec![0_u32; self.data.len()];
        let mut components = Vec::new();
        let offsets: &[(i32, i32)] = match connectivity {
            Connectivity::Four => &[(1, 0), (-1, 0), (0, 1), (0, -1)],
            Connectivity::Eight => &[
                (1, 0),
                (-1, 0),
                (0, 1),
                (0, -1),
                (1, 1),
                (1, -1),
                (-1, 1),
                (-1, -1),
            ],
        };

        let mut queue = VecDeque::new();
        let mut next_label = 0_u32;
        for start_y in 0..self.height as i32 {
            for start_x in 0..self.width as i32 {
                let start_idx = self.idx(start_x as u32, start_y as u32);
                if self.data[start_idx] == 0 || labels[start_idx] != 0 {
                    continue;
                }
                next_label += 1;
                let mut area = 0_u64;
                let mut bounds = PixelRect::new(start_x, start_y, 1, 1);
                let mut touches_border = false;
                labels[start_idx] = next_label;
                queue.push_back((start_x, start_y));
                while let Some((x, y)) = queue.pop_front() {
                    area += 1;
                    bounds = bounds.union(&PixelRect::new(x, y, 1, 1));
                    if x == 0 || y == 0 || x == self.width as i32 - 1 || y == self.height as i32 - 1
                    {
                        touches_border = true;
                    }
                    for (dx, dy) in offsets {
                        let (nx, ny) = (x + dx, y + dy);
                        if nx < 0 || ny < 0 || nx >= self.width as i32 || ny >= self.height as i32 {
                            continue;
                        }
                        let ni = self.idx(nx as u32, ny as u32);
                        if self.data[ni] != 0 && labels[ni] == 0 {
                            labels[ni] = next_label;
                            queue.push_back((nx, ny));
                        }
                    }
                }
                components.push(ComponentStats {
                    label: next_label,
                    bounds,
                    area_px: area,
                    touches_border,
                });
            }
        }

        ComponentLabels { labels, components }
    }

    /// The background reachable from the raster border: every zero pixel
    /// 4-connected to the border becomes 255, everything else 0.
    ///
    /// This is the "outside of the model" region of a solid cross-section;
    /// internal holes stay black. Strict border reachability, deliberately:
    /// background pinched between disjoint solids without being any single
    /// contour's hole counts as inside here, where a fill of each external
    /// contour would leave it outside. Such a region still has to prove air
    /// contact through the sweep's overlap test before it drains.
    #[must_use]
    pub fn outside_background(&self) -> Self {
        let mut out = Self::new(self.width, self.height);
        if self.width == 0 || self.height == 0 {
            return out;
        }
        let mut queue = VecDeque::new();
        let mut push = |out: &mut Self, queue: &mut VecDeque<(i32, i32)>, x: i32, y: i32| {
            if self.pixel(x, y) == 0 && out.pixel(x, y) == 0 {
                out.set_pixel(x, y, 255);
                queue.push_back((x, y));
            }
        };
        for x in 0..self.width as i32 {
            push(&mut out, &mut queue, x, 0);
            push(&mut out, &mut queue, x, self.height as i32 - 1);
        }
        for y in 0..self.height as i32 {
            push(&mut out, &mut queue, 0, y);
            push(&mut out, &mut queue, self.width as i32 - 1, y);
        }
        while let Some((x, y)) = queue.pop_front() {
            for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= self.width as i32 || ny >= self.height as i32 {
                    continue;
                }
                push(&mut out, &mut queue, nx, ny);
            }
        }
        out
    }

    /// Fill a closed polygon (even-odd rule) with `value`, translating the
    /// outline by `origin`. The outline pixels themselves are always set.
    pub fn fill_polygon(&mut self, outline: &[PixelPoint], origin: PixelPoint, value: u8) {
        if outline.is_empty() {
            return;
        }
        let min_y = outline.iter().map(|p| p.y).min().unwrap_or(0);
        let max_y = outline.iter().map(|p| p.y).max().unwrap_or(0);
        let mut xs: Vec<i32> = Vec::new();
        for y in min_y..=max_y {
            xs.clear();
            for i in 0..outline.len() {
                let a = outline[i];
                let b = outline[(i + 1) % outline.len()];
                if a.y == b.y {
                    continue;
                }
                let (lo, hi) = if a.y < b.y { (a, b) } else { (b, a) };
                // Half-open rule: [lo.y, hi.y) so shared vertices count once.
                if y < lo.y || y >= hi.y {
                    continue;
                }
                let t = f64::from(y - lo.y) / f64::from(hi.y - lo.y);
                let x = f64::from(lo.x) + t * f64::from(hi.x - lo.x);
                xs.push(x.round() as i32);
            }
            xs.sort_unstable();
            for pair in xs.chunks_exact(2) {
                for x in pair[0]..=pair[1] {
                    self.set_pixel(origin.x + x, origin.y + y, value);
                }
            }
        }
        for p in outline {
            self.set_pixel(origin.x + p.x, origin.y + p.y, value);
        }
    }

    /// Stamp a filled disk of the given radius centered at `center`.
    pub fn draw_disk(&mut self, center: PixelPoint, radius: i32, value: u8) {
        let r2 = i64::from(radius) * i64::from(radius);
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if i64::from(dx) * i64::from(dx) + i64::from(dy) * i64::from(dy) <= r2 {
                    self.set_pixel(center.x + dx, center.y + dy, value);
                }
            }
        }
    }
}

/// True when two offset masks share at least one nonzero pixel.
pub(crate) fn masks_intersect(
    a: &Raster,
    a_bounds: &PixelRect,
    b: &Raster,
    b_bounds: &PixelRect,
) -> bool {
    let Some(overlap) = a_bounds.intersection(b_bounds) else {
        return false;
    };
    for y in overlap.y..overlap.bottom() {
        for x in overlap.x..overlap.right() {
            if a.pixel(x - a_bounds.x, y - a_bounds.y) != 0
                && b.pixel(x - b_bounds.x, y - b_bounds.y) != 0
            {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect_raster(w: u32, h: u32, solid: PixelRect) -> Raster {
        let mut r = Raster::new(w, h);
        for y in solid.y..solid.bottom() {
            for x in solid.x..solid.right() {
                r.set_pixel(x, y, 255);
            }
        }
        r
    }

    #[test]
    fn test_invert_and_threshold() {
        let mut r = Raster::from_raw(2, 1, vec![10, 200]);
        r.invert();
        assert_eq!(r.data(), &[245, 55]);
        r.threshold(100);
        assert_eq!(r.data(), &[255, 0]);
    }

    #[test]
    fn test_subtract_saturates() {
        let mut a = Raster::from_raw(2, 1, vec![100, 10]);
        let b = Raster::from_raw(2, 1, vec![30, 50]);
        a.subtract(&b);
        assert_eq!(a.data(), &[70, 0]);
    }

    #[test]
    fn test_crop() {
        let r = rect_raster(10, 10, PixelRect::new(2, 2, 4, 4));
        let c = r.crop(&PixelRect::new(2, 2, 4, 4));
        assert_eq!(c.width(), 4);
        assert_eq!(c.count_nonzero(), 16);
    }

    #[test]
    fn test_overlap_and_stamp() {
        let mut base = rect_raster(10, 10, PixelRect::new(0, 0, 5, 10));
        let mask = rect_raster(4, 4, PixelRect::new(0, 0, 4, 4));
        // Mask at (3, 0): columns 3-6, of which 3 and 4 overlap the solid half.
        assert_eq!(base.overlap_count(&mask, PixelPoint::new(3, 0)), 8);
        base.erase_mask(&mask, PixelPoint::new(3, 0));
        assert_eq!(base.overlap_count(&mask, PixelPoint::new(3, 0)), 0);
        base.stamp_mask(&mask, PixelPoint::new(3, 0), 255);
        assert_eq!(base.overlap_count(&mask, PixelPoint::new(3, 0)), 16);
    }

    #[test]
    fn test_erode_shrinks() {
        let r = rect_raster(10, 10, PixelRect::new(2, 2, 5, 5));
        let e = r.eroded(1);
        assert_eq!(e.count_nonzero(), 9); // 5x5 -> 3x3
        let e2 = r.eroded(2);
        assert_eq!(e2.count_nonzero(), 1);
        let gone = r.eroded(3);
        assert_eq!(gone.count_nonzero(), 0);
    }

    #[test]
    fn test_erode_holds_the_raster_edge() {
        // Touches the left and top borders; only the interior sides erode.
        let r = rect_raster(10, 10, PixelRect::new(0, 0, 5, 5));
        let e = r.eroded(1);
        assert_eq!(e.count_nonzero(), 16); // 5x5 -> 4x4
        assert_eq!(e.pixel(0, 0), 255);
        assert_eq!(e.pixel(4, 4), 0);
    }

    #[test]
    fn test_label_components() {
        let mut r = Raster::new(8, 8);
        r.set_pixel(0, 0, 255);
        r.set_pixel(1, 1, 255); // Diagonal neighbor of (0, 0)
        r.set_pixel(5, 5, 255);

        let four = r.label_components(Connectivity::Four);
        assert_eq!(four.components.len(), 3);

        let eight = r.label_components(Connectivity::Eight);
        assert_eq!(eight.components.len(), 2);
        let big = eight
            .components
            .iter()
            .find(|c| c.area_px == 2)
            .map(|c| c.bounds);
        assert_eq!(big, Some(PixelRect::new(0, 0, 2, 2)));
    }

    #[test]
    fn test_outside_background_keeps_holes_dark() {
        // Solid 6x6 block with a 2x2 hole inside, on a 10x10 canvas.
        let mut r = rect_raster(10, 10, PixelRect::new(2, 2, 6, 6));
        for y in 4..6 {
            for x in 4..6 {
                r.set_pixel(x, y, 0);
            }
        }
        let outside = r.outside_background();
        // The hole stays black, the surrounding frame is white.
        assert_eq!(outside.pixel(4, 4), 0);
        assert_eq!(outside.pixel(0, 0), 255);
        assert_eq!(outside.pixel(9, 9), 255);
        // 100 - 36 solid = 64 outside pixels; the 4 hole pixels are excluded.
        assert_eq!(outside.count_nonzero(), 60);
    }

    #[test]
    fn test_fill_polygon_rect() {
        let outline = [
            PixelPoint::new(0, 0),
            PixelPoint::new(9, 0),
            PixelPoint::new(9, 9),
            PixelPoint::new(0, 9),
        ];
        let mut r = Raster::new(10, 10);
        r.fill_polygon(&outline, PixelPoint::new(0, 0), 255);
        assert_eq!(r.count_nonzero(), 100);
    }

    #[test]
    fn test_masks_intersect() {
        let a = rect_raster(4, 4, PixelRect::new(0, 0, 4, 4));
        let b = rect_raster(4, 4, PixelRect::new(0, 0, 4, 4));
        assert!(masks_intersect(
            &a,
            &PixelRect::new(0, 0, 4, 4),
            &b,
            &PixelRect::new(3, 3, 4, 4)
        ));
        assert!(!masks_intersect(
            &a,
            &PixelRect::new(0, 0, 4, 4),
            &b,
            &PixelRect::new(4, 0, 4, 4)
        ));
    }

    #[test]
    fn test_draw_disk() {
        let mut r = Raster::new(11, 11);
        r.draw_disk(PixelPoint::new(5, 5), 2, 255);
        assert_eq!(r.pixel(5, 5), 255);
        assert_eq!(r.pixel(5, 3), 255);
        assert_eq!(r.pixel(3, 3), 0); // Corner outside the disk
    }
}
