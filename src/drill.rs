//! Vent drill-point calculation for suction cups.
//!
//! The engine only computes where a vent hole may safely go; applying it to
//! the bitmap stack belongs to the caller. A drill point is safe when the
//! polygon centroid lies inside the void and the full vent disk around it
//! still fits inside the void, so the drill never cuts into cured walls.

#![allow(clippy::cast_possible_truncation)]

use tracing::debug;

use crate::bounds::{PixelPoint, PixelRect};
use crate::issues::{IssueType, MainIssue, Witness};
use crate::progress::ProgressSink;
use crate::raster::Raster;

/// One vent hole for the external layer-modification collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DrillOperation {
    /// Layer to drill on, the lowest layer of the suction cup.
    pub layer_index: u32,
    /// Center of the vent hole, full-frame coordinates.
    pub center: PixelPoint,
    /// Vent hole diameter in pixels.
    pub diameter: u32,
}

/// Compute vent holes for every suction cup in `issues`.
///
/// Returns the subset of issues that received a valid drill point, paired
/// with the drill operations to apply. Issues of other types, and suction
/// cups whose void cannot host the vent disk, are skipped.
#[must_use]
pub fn drill_suction_cups(
    issues: &[MainIssue],
    vent_diameter: u32,
    progress: &dyn ProgressSink,
) -> (Vec<MainIssue>, Vec<DrillOperation>) {
    let cups: Vec<&MainIssue> = issues
        .iter()
        .filter(|issue| issue.issue_type == IssueType::SuctionCup)
        .collect();
    progress.reset("Drilling vent holes", cups.len() as u32, 0);

    let mut drilled = Vec::new();
    let mut operations = Vec::new();
    for issue in cups {
        if let Some(center) = drill_point(issue, vent_diameter) {
            operations.push(DrillOperation {
                layer_index: issue.start_layer_index,
                center,
                diameter: vent_diameter,
            });
            drilled.push(issue.clone());
        }
        progress.increment();
    }
    debug!(
        requested = issues.len(),
        drilled = drilled.len(),
        "vent drill pass done"
    );
    (drilled, operations)
}

/// Safe drill point for one suction cup, or `None` when no safe point
/// exists. The candidate is the centroid of the first witness contour, the
/// one on the lowest layer where the vent is most effective.
#[must_use]
pub fn drill_point(issue: &MainIssue, vent_diameter: u32) -> Option<PixelPoint> {
    let first = issue.issues.first()?;
    let Witness::Contour(outline) = &first.witness else {
        return None;
    };
    let centroid = polygon_centroid(outline)?;
    if !point_in_polygon(centroid, outline) {
        // Concave void: the centroid can fall outside the material.
        return None;
    }
    if !disk_fits(centroid, vent_diameter, outline, &first.bounds) {
        return None;
    }
    Some(centroid)
}

/// Area-weighted centroid of a closed polygon; `None` for degenerate
/// outlines, falling back to the vertex mean for near-zero areas.
fn polygon_centroid(outline: &[PixelPoint]) -> Option<PixelPoint> {
    if outline.is_empty() {
        return None;
    }
    let mut doubled_area = 0.0_f64;
    let mut cx = 0.0_f64;
    let mut cy = 0.0_f64;
    for i in 0..outline.len() {
        let a = outline[i];
        let b = outline[(i + 1) % outline.len()];
        let cross = f64::from(a.x) * f64::from(b.y) - f64::from(b.x) * f64::from(a.y);
        doubled_area += cross;
        cx += (f64::from(a.x) + f64::from(b.x)) * cross;
        cy += (f64::from(a.y) + f64::from(b.y)) * cross;
    }
    if doubled_area.abs() < f64::EPSILON {
        let n = outline.len() as i64;
        let sx: i64 = outline.iter().map(|p| i64::from(p.x)).sum();
        let sy: i64 = outline.iter().map(|p| i64::from(p.y)).sum();
        return Some(PixelPoint::new((sx / n) as i32, (sy / n) as i32));
    }
    let scale = 3.0 * doubled_area;
    Some(PixelPoint::new(
        (cx / scale).round() as i32,
        (cy / scale).round() as i32,
    ))
}

/// Even-odd ray cast.
fn point_in_polygon(point: PixelPoint, outline: &[PixelPoint]) -> bool {
    let mut inside = false;
    for i in 0..outline.len() {
        let a = outline[i];
        let b = outline[(i + 1) % outline.len()];
        if (a.y > point.y) != (b.y > point.y) {
            let t = f64::from(point.y - a.y) / f64::from(b.y - a.y);
            let x = f64::from(a.x) + t * f64::from(b.x - a.x);
            if f64::from(point.x) < x {
                inside = !inside;
            }
        }
    }
    inside
}

/// True when the whole vent disk lies inside the polygon. Rasterizes both
/// into the contour's bounding box and requires every disk pixel to land on
/// a filled polygon pixel.
fn disk_fits(center: PixelPoint, diameter: u32, outline: &[PixelPoint], bounds: &PixelRect) -> bool {
    if bounds.is_empty() {
        return false;
    }
    let mut polygon = Raster::new(bounds.width, bounds.height);
    polygon.fill_polygon(outline, PixelPoint::new(-bounds.x, -bounds.y), 255);

    let mut disk = Raster::new(bounds.width, bounds.height);
    let radius = (diameter / 2) as i32;
    let local = PixelPoint::new(center.x - bounds.x, center.y - bounds.y);
    // Any part of the disk outside the bounding box is outside the polygon.
    if local.x - radius < 0
        || local.y - radius < 0
        || local.x + radius >= bounds.width as i32
        || local.y + radius >= bounds.height as i32
    {
        return false;
    }
    disk.draw_disk(local, radius, 255);
    disk.subtract(&polygon);
    disk.count_nonzero() == 0
}
