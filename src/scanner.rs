//! Per-layer defect scanner: touching-bound, island, overhang,
//! print-height, and empty-layer checks.
//!
//! Layers are independent here, so the scan runs fully parallel across the
//! stack. A layer whose enabled checks need no pixel data is never decoded;
//! decode dominates the cost of a scan and the skip must be preserved.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss)]

use rayon::prelude::*;
use tracing::debug;

use crate::bounds::PixelPoint;
use crate::cache::LayerCache;
use crate::config::{DetectionConfig, IslandConfig, OverhangConfig, TouchingBoundConfig};
use crate::error::DetectResult;
use crate::issues::{Issue, IssueType};
use crate::progress::{CancelToken, ProgressSink};
use crate::raster::{Connectivity, Raster};
use crate::stack::{round_height, CrossSectionSource, LayerMeta};

/// Run every per-layer check over the whole stack.
///
/// Issues come back grouped by layer in layer order, so results are
/// deterministic regardless of worker scheduling. Cancellation skips the
/// remaining layers and returns what finished.
pub(crate) fn scan_layers<S: CrossSectionSource + ?Sized>(
    source: &S,
    config: &DetectionConfig,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
) -> DetectResult<Vec<Issue>> {
    let layer_count = source.layer_count();
    progress.reset("Detecting issues", layer_count, 0);

    let cache = LayerCache::new(source).with_cancel(cancel.clone());
    let keep_window = (rayon::current_num_threads() as u32).max(1) * 5;

    let per_layer: Vec<Vec<Issue>> = (0..layer_count)
        .into_par_iter()
        .map(|index| {
            if cancel.is_cancelled() {
                return Ok(Vec::new());
            }
            let issues = scan_one_layer(source, &cache, config, index)?;
            cache.clear_but_keep(index, keep_window);
            progress.increment();
            Ok(issues)
        })
        .collect::<DetectResult<_>>()?;

    let issues: Vec<Issue> = per_layer.into_iter().flatten().collect();
    debug!(layer_count, issue_count = issues.len(), "per-layer scan done");
    Ok(issues)
}

fn scan_one_layer<S: CrossSectionSource + ?Sized>(
    source: &S,
    cache: &LayerCache<'_, S>,
    config: &DetectionConfig,
    index: u32,
) -> DetectResult<Vec<Issue>> {
    let meta = source.meta(index)?;
    let mut issues = Vec::new();

    if config.print_height.enabled && source.machine_z() > 0.0 {
        let limit = round_height(source.machine_z() + config.print_height.offset);
        if round_height(meta.z) > limit {
            issues.push(Issue::whole_layer(IssueType::PrintHeight, index));
        }
    }

    if meta.is_empty {
        if config.empty_layer.enabled {
            issues.push(Issue::whole_layer(IssueType::EmptyLayer, index));
        }
        // No pixels, nothing for the raster checks to see.
        return Ok(issues);
    }

    let wants_bound = config.touching_bound.enabled && touches_margin(source, &meta, &config.touching_bound);
    let wants_island = config.island.applies_to(index);
    let wants_overhang = config.overhang.applies_to(index);
    if !wants_bound && !wants_island && !wants_overhang {
        return Ok(issues);
    }

    let current = cache.get(index)?;
    let current = &current[0];

    if wants_bound {
        if let Some(issue) = check_touching_bound(current, index, &config.touching_bound) {
            issues.push(issue);
        }
    }

    if wants_island || wants_overhang {
        // applies_to excludes layer 0, so index - 1 is valid here.
        let previous = cache.get(index - 1)?;
        let previous = &previous[0];
        if wants_island {
            issues.extend(check_islands(
                current,
                previous,
                index,
                &config.island,
                &config.overhang,
            ));
        }
        // The fallback to the frame scan keys off the global island switch;
        // a layer the island allow-list skips is skipped entirely.
        if wants_overhang && (config.overhang.independent_from_islands || !config.island.enabled) {
            if let Some(issue) = check_overhang_frame(current, previous, index, &config.overhang) {
                issues.push(issue);
            }
        }
    }

    Ok(issues)
}

/// False when the layer's content cannot reach any margin band, which makes
/// the decode unnecessary for this check.
fn touches_margin<S: CrossSectionSource + ?Sized>(
    source: &S,
    meta: &LayerMeta,
    config: &TouchingBoundConfig,
) -> bool {
    let (width, height) = source.resolution();
    let b = &meta.bounds;
    b.x < config.margin_left as i32
        || b.y < config.margin_top as i32
        || b.right() > width.saturating_sub(config.margin_right) as i32
        || b.bottom() > height.saturating_sub(config.margin_bottom) as i32
}

/// Scan the four margin bands for bright pixels. The bands are disjoint
/// (side bands exclude the top/bottom rows) so corner pixels count once.
fn check_touching_bound(layer: &Raster, index: u32, config: &TouchingBoundConfig) -> Option<Issue> {
    let width = layer.width() as i32;
    let height = layer.height() as i32;
    let top = (config.margin_top as i32).min(height);
    let bottom = (height - config.margin_bottom as i32).max(top);
    let mut points = Vec::new();
    let mut probe = |x: i32, y: i32, points: &mut Vec<PixelPoint>| {
        if layer.pixel(x, y) >= config.min_pixel_brightness {
            points.push(PixelPoint::new(x, y));
        }
    };
    for y in 0..top {
        for x in 0..width {
            probe(x, y, &mut points);
        }
    }
    for y in bottom..height {
        for x in 0..width {
            probe(x, y, &mut points);
        }
    }
    for y in top..bottom {
        for x in 0..(config.margin_left as i32).min(width) {
            probe(x, y, &mut points);
        }
        for x in (width - config.margin_right as i32).max(0)..width {
            probe(x, y, &mut points);
        }
    }
    if points.is_empty() {
        return None;
    }
    Some(Issue::from_points(IssueType::TouchingBound, index, points))
}

fn check_islands(
    current: &Raster,
    previous: &Raster,
    index: u32,
    island: &IslandConfig,
    overhang: &OverhangConfig,
) -> Vec<Issue> {
    let binary = if island.binary_threshold > 0 {
        current.thresholded(island.binary_threshold)
    } else {
        current.clone()
    };
    let connectivity = if island.allow_diagonal_bonds {
        Connectivity::Eight
    } else {
        Connectivity::Four
    };
    let labeled = binary.label_components(connectivity);

    let mut issues = Vec::new();
    for component in &labeled.components {
        if component.area_px < u64::from(island.min_area_px) {
            continue;
        }
        let mut points = Vec::new();
        let mut supporting = 0_usize;
        for y in component.bounds.y..component.bounds.bottom() {
            for x in component.bounds.x..component.bounds.right() {
                let i = y as usize * binary.width() as usize + x as usize;
                if labeled.labels[i] != component.label {
                    continue;
                }
                if current.pixel(x, y) < island.min_pixel_brightness {
                    continue;
                }
                points.push(PixelPoint::new(x, y));
                if previous.pixel(x, y) >= island.support_brightness {
                    supporting += 1;
                }
            }
        }
        if points.is_empty() {
            continue;
        }

        let required = (points.len() as f64 * island.support_multiplier).max(1.0);
        let mut is_island = (supporting as f64) < required;

        // A bare component rules itself an island directly. A component
        // with meaningful contact below is re-tested as an overhang: a
        // slanted surface grows sideways every layer, which erosion
        // distinguishes from a genuinely floating blob.
        let test_overhang = (overhang.enabled && !overhang.independent_from_islands && !is_island)
            || (is_island
                && island.enhanced_detection
                && supporting >= island.required_support_px as usize);
        if test_overhang {
            let member = Some((labeled.labels.as_slice(), component.label));
            match overhang_points(current, previous, &component.bounds, overhang, member) {
                Some(overhang_pts) => {
                    issues.push(Issue::from_points(IssueType::Overhang, index, overhang_pts));
                }
                None if island.enhanced_detection => is_island = false,
                None => {}
            }
        }

        if is_island {
            issues.push(Issue::from_points(IssueType::Island, index, points));
        }
    }
    issues
}

/// Whole-frame overhang scan, used when the check runs independently of
/// island components.
fn check_overhang_frame(
    current: &Raster,
    previous: &Raster,
    index: u32,
    config: &OverhangConfig,
) -> Option<Issue> {
    let frame = crate::bounds::PixelRect::new(0, 0, current.width(), current.height());
    let points = overhang_points(current, previous, &frame, config, None)?;
    Some(Issue::from_points(IssueType::Overhang, index, points))
}

/// Pixels of `rect` that are new on this layer and survive the erosion,
/// in full-frame coordinates. `None` when fewer than `min_pixels` survive.
///
/// When `member` carries a label map and label, pixels belonging to other
/// components inside `rect` are ignored; the island re-test must not pick
/// up an unrelated neighbor sharing the bounding box.
fn overhang_points(
    current: &Raster,
    previous: &Raster,
    rect: &crate::bounds::PixelRect,
    config: &OverhangConfig,
    member: Option<(&[u32], u32)>,
) -> Option<Vec<PixelPoint>> {
    let mut diff = current.crop(rect);
    diff.subtract(&previous.crop(rect));
    diff.threshold(127);
    let survived = diff.eroded(config.erode_iterations);
    let stride = current.width() as usize;
    let mut points = Vec::new();
    for y in 0..survived.height() as i32 {
        for x in 0..survived.width() as i32 {
            if survived.pixel(x, y) == 0 {
                continue;
            }
            let fx = rect.x + x;
            let fy = rect.y + y;
            if let Some((labels, label)) = member {
                if labels[fy as usize * stride + fx as usize] != label {
                    continue;
                }
            }
            points.push(PixelPoint::new(fx, fy));
        }
    }
    if points.len() < config.min_pixels.max(1) as usize {
        return None;
    }
    Some(points)
}
