//! Hierarchical contour extraction.
//!
//! A [`ContourTree`] is an ordered list of closed pixel loops with a parent
//! index per loop: top-level loops are solid (positive) regions, their
//! direct children are holes, holes may contain further solids, and so on,
//! alternating by depth.
//!
//! The extractor is a trait seam so callers can plug in their own contour
//! engine; [`BorderFollower`] is the built-in implementation (component
//! labeling plus Moore boundary tracing).

// Pixel coordinates fit i32 for any realistic print resolution.
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

use crate::bounds::{PixelPoint, PixelRect};
use crate::raster::{Connectivity, Raster};

/// One closed loop of a contour tree.
#[derive(Debug, Clone)]
pub struct Contour {
    /// Border pixels of the region, in traversal order.
    pub points: Vec<PixelPoint>,
    /// Index of the enclosing contour, `None` for top-level loops.
    pub parent: Option<usize>,
    /// True for negative (hollow) loops, false for solid loops.
    pub is_hole: bool,
    /// Bounding box of the region.
    pub bounds: PixelRect,
    /// Exact pixel area of the region.
    pub area_px: u64,
    /// Region pixels as a mask cropped to `bounds`.
    pub mask: Raster,
}

/// Hierarchical contours of one binary cross-section.
#[derive(Debug, Clone, Default)]
pub struct ContourTree {
    /// All loops, solids and holes interleaved.
    pub contours: Vec<Contour>,
}

impl ContourTree {
    /// Iterate the top-level solid loops.
    pub fn externals(&self) -> impl Iterator<Item = &Contour> {
        self.contours
            .iter()
            .filter(|c| !c.is_hole && c.parent.is_none())
    }

    /// Iterate the negative (hollow) loops at any depth.
    pub fn holes(&self) -> impl Iterator<Item = &Contour> {
        self.contours.iter().filter(|c| c.is_hole)
    }
}

/// Extracts a [`ContourTree`] from a binary cross-section bitmap.
///
/// Nonzero pixels are solid. Implementations must report every hole
/// (background region not connected to the bitmap border) as a negative
/// loop with the correct parent.
pub trait ContourExtractor: Sync {
    /// Extract the contour hierarchy of `bitmap`.
    fn extract(&self, bitmap: &Raster) -> ContourTree;
}

/// Built-in contour extractor.
///
/// Labels solid components (8-connected) and background components
/// (4-connected), classifies border-connected background as "outside", and
/// traces each remaining region's boundary with a Moore neighborhood walk.
/// Parents are resolved with the west-neighbor rule: the pixel west of a
/// region's first (topmost-leftmost) pixel belongs to the directly
/// enclosing region.
#[derive(Debug, Clone, Copy, Default)]
pub struct BorderFollower;

impl ContourExtractor for BorderFollower {
    fn extract(&self, bitmap: &Raster) -> ContourTree {
        let width = bitmap.width() as i32;
        let solids = bitmap.label_components(Connectivity::Eight);
        let background = bitmap.complement().label_components(Connectivity::Four);

        let first_pixel_of = |labels: &[u32], count: usize| -> Vec<PixelPoint> {
            let mut firsts = vec![PixelPoint::new(-1, -1); count];
            for (i, &label) in labels.iter().enumerate() {
                if label == 0 {
                    continue;
                }
                let slot = &mut firsts[label as usize - 1];
                if slot.x < 0 {
                    *slot = PixelPoint::new(i as i32 % width, i as i32 / width);
                }
            }
            firsts
        };
        let solid_firsts = first_pixel_of(&solids.labels, solids.components.len());
        let bg_firsts = first_pixel_of(&background.labels, background.components.len());

        let label_at = |labels: &[u32], x: i32, y: i32| -> u32 {
            if x < 0 || y < 0 || x >= width || y >= bitmap.height() as i32 {
                return 0;
            }
            labels[y as usize * width as usize + x as usize]
        };

        let mut tree = ContourTree::default();
        // Contour index per solid label and per hole (background) label.
        let mut solid_contour = vec![usize::MAX; solids.components.len()];
        let mut hole_contour = vec![usize::MAX; background.components.len()];

        for (ci, comp) in solids.components.iter().enumerate() {
            let start = solid_firsts[ci];
            let points = trace_boundary(
                |x, y| label_at(&solids.labels, x, y) == comp.label,
                start,
                comp.area_px,
            );
            solid_contour[ci] = tree.contours.len();
            tree.contours.push(Contour {
                points,
                parent: None, // Fixed up after holes exist
                is_hole: false,
                bounds: comp.bounds,
                area_px: comp.area_px,
                mask: component_mask(&solids.labels, width, comp.label, &comp.bounds),
            });
        }

        for (ci, comp) in background.components.iter().enumerate() {
            if comp.touches_border {
                continue; // Outside of the model, not a hole
            }
            let start = bg_firsts[ci];
            // West of a hole's first pixel is always the enclosing solid.
            let west_solid = label_at(&solids.labels, start.x - 1, start.y);
            let parent = (west_solid != 0).then(|| solid_contour[west_solid as usize - 1]);
            let points = trace_boundary(
                |x, y| label_at(&background.labels, x, y) == comp.label,
                start,
                comp.area_px,
            );
            hole_contour[ci] = tree.contours.len();
            tree.contours.push(Contour {
                points,
                parent,
                is_hole: true,
                bounds: comp.bounds,
                area_px: comp.area_px,
                mask: component_mask(&background.labels, width, comp.label, &comp.bounds),
            });
        }

        // Second pass: a solid's parent is the hole west of its first pixel,
        // unless that background reaches the border (top-level solid).
        for (ci, comp) in solids.components.iter().enumerate() {
            let start = solid_firsts[ci];
            let west_bg = label_at(&background.labels, start.x - 1, start.y);
            if west_bg == 0 {
                continue; // First pixel on the bitmap edge: top-level
            }
            let bg_comp = &background.components[west_bg as usize - 1];
            if bg_comp.touches_border {
                continue;
            }
            tree.contours[solid_contour[ci]].parent = Some(hole_contour[west_bg as usize - 1]);
        }

        tree
    }
}

fn component_mask(labels: &[u32], width: i32, label: u32, bounds: &PixelRect) -> Raster {
    let mut mask = Raster::new(bounds.width, bounds.height);
    for y in bounds.y..bounds.bottom() {
        for x in bounds.x..bounds.right() {
            if labels[y as usize * width as usize + x as usize] == label {
                mask.set_pixel(x - bounds.x, y - bounds.y, 255);
            }
        }
    }
    mask
}

/// Moore-neighbor boundary trace starting at a region's topmost-leftmost
/// pixel. Returns the border pixels in traversal order; a single isolated
/// pixel yields a one-point loop.
fn trace_boundary(
    is_inside: impl Fn(i32, i32) -> bool,
    start: PixelPoint,
    area_px: u64,
) -> Vec<PixelPoint> {
    const DIRS: [(i32, i32); 8] = [
        (-1, 0),
        (-1, -1),
        (0, -1),
        (1, -1),
        (1, 0),
        (1, 1),
        (0, 1),
        (-1, 1),
    ];

    let mut points = vec![start];
    let mut cur = start;
    let mut backtrack = 0_usize; // West: never inside for a topmost-leftmost start
    let initial_backtrack = backtrack;
    // A boundary pixel is visited at most four times.
    let mut remaining = 4 * area_px + 8;

    while remaining > 0 {
        remaining -= 1;
        let mut found = None;
        for step in 1..=8 {
            let dir = (backtrack + step) % 8;
            let (dx, dy) = DIRS[dir];
            if is_inside(cur.x + dx, cur.y + dy) {
                found = Some((dir, PixelPoint::new(cur.x + dx, cur.y + dy)));
                break;
            }
        }
        let Some((dir, next)) = found else {
            break; // Isolated pixel
        };
        cur = next;
        backtrack = (dir + 6) % 8;
        if cur == start && backtrack == initial_backtrack {
            break;
        }
        points.push(cur);
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap_from(rows: &[&str]) -> Raster {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        let mut r = Raster::new(width, height);
        for (y, row) in rows.iter().enumerate() {
            for (x, ch) in row.chars().enumerate() {
                if ch == '#' {
                    r.set_pixel(x as i32, y as i32, 255);
                }
            }
        }
        r
    }

    #[test]
    fn test_solid_square_no_holes() {
        let bitmap = bitmap_from(&["....", ".##.", ".##.", "...."]);
        let tree = BorderFollower.extract(&bitmap);
        assert_eq!(tree.externals().count(), 1);
        assert_eq!(tree.holes().count(), 0);
        let outer = &tree.contours[0];
        assert_eq!(outer.area_px, 4);
        assert_eq!(outer.bounds, PixelRect::new(1, 1, 2, 2));
    }

    #[test]
    fn test_ring_has_one_hole_with_parent() {
        let bitmap = bitmap_from(&[
            "......", //
            ".####.", //
            ".#..#.", //
            ".#..#.", //
            ".####.", //
            "......",
        ]);
        let tree = BorderFollower.extract(&bitmap);
        assert_eq!(tree.externals().count(), 1);
        let holes: Vec<_> = tree.holes().collect();
        assert_eq!(holes.len(), 1);
        assert_eq!(holes[0].area_px, 4);
        assert_eq!(holes[0].bounds, PixelRect::new(2, 2, 2, 2));
        // The hole's parent is the ring.
        let parent = holes[0].parent.map(|i| tree.contours[i].is_hole);
        assert_eq!(parent, Some(false));
    }

    #[test]
    fn test_nested_solid_inside_hole() {
        let bitmap = bitmap_from(&[
            ".......", //
            ".#####.", //
            ".#...#.", //
            ".#.#.#.", //
            ".#...#.", //
            ".#####.", //
            ".......",
        ]);
        let tree = BorderFollower.extract(&bitmap);
        // Outer ring + inner dot are solids; the gap is one hole.
        assert_eq!(tree.contours.iter().filter(|c| !c.is_hole).count(), 2);
        let holes: Vec<_> = tree.holes().collect();
        assert_eq!(holes.len(), 1);
        assert_eq!(holes[0].area_px, 8); // 3x3 gap minus the 1px island
    }

    #[test]
    fn test_open_shape_has_no_hole() {
        // A "C" shape: the cavity is connected to the outside.
        let bitmap = bitmap_from(&[
            "......", //
            ".####.", //
            ".#....", //
            ".#....", //
            ".####.", //
            "......",
        ]);
        let tree = BorderFollower.extract(&bitmap);
        assert_eq!(tree.holes().count(), 0);
    }

    #[test]
    fn test_boundary_trace_square() {
        let bitmap = bitmap_from(&["###", "###", "###"]);
        let tree = BorderFollower.extract(&bitmap);
        let outer = &tree.contours[0];
        // The center pixel is not on the boundary.
        assert_eq!(outer.points.len(), 8);
        assert!(!outer.points.contains(&PixelPoint::new(1, 1)));
    }
}
