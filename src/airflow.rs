//! The air-connectivity sweep: classifies every hollow region as
//! air-connected, resin trap, or suction cup.
//!
//! A single bottom-to-top pass cannot tell a sealed void from one whose
//! only air path lies above the sweep position, so the sweep runs twice.
//! Pass 1 climbs the stack carrying a cumulative air map and provisionally
//! marks every unreachable hollow as a trap. Pass 2 descends from the top
//! surface, re-tests the candidates against air discovered from above, and
//! when one turns out to drain upward it drags its whole temporal group
//! ([`TemporalGroups`]) into the suction-cup class with it.
//!
//! All raster work happens in ROI-local coordinates (cropped to the model
//! bounding rectangle); the aggregator shifts results back afterwards.

#![allow(clippy::cast_possible_truncation)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use rayon::prelude::*;
use tracing::debug;

use crate::bounds::PixelPoint;
use crate::cache::{Direction, LayerCache};
use crate::config::ResinTrapConfig;
use crate::contour::ContourExtractor;
use crate::error::DetectResult;
use crate::groups::{HollowRegion, RegionState, TemporalGroups};
use crate::progress::{CancelToken, ProgressSink};
use crate::raster::Raster;
use crate::stack::CrossSectionSource;

/// Per-layer classification produced by the sweep.
pub(crate) struct AirSweepResult {
    /// Confirmed resin traps, indexed by layer.
    pub traps: Vec<Vec<Arc<HollowRegion>>>,
    /// Suction cups, indexed by layer.
    pub suctions: Vec<Vec<Arc<HollowRegion>>>,
    /// True when cancellation interrupted the sweep; the classification is
    /// then unresolved and must not be reported.
    pub cancelled: bool,
}

impl AirSweepResult {
    fn empty(layer_count: u32, cancelled: bool) -> Self {
        Self {
            traps: vec![Vec::new(); layer_count as usize],
            suctions: vec![Vec::new(); layer_count as usize],
            cancelled,
        }
    }
}

/// Shared state of one pass, mutated only inside the per-layer exclusive
/// section.
struct SweepState {
    air_map: Raster,
    states: HashMap<u64, RegionState>,
    groups: TemporalGroups,
}

fn origin_of(region: &HollowRegion) -> PixelPoint {
    PixelPoint::new(region.bounds.x, region.bounds.y)
}

/// Run both passes over `[config.start_layer_index, layer_count)`.
pub(crate) fn sweep_air_connectivity<S: CrossSectionSource + ?Sized>(
    source: &S,
    extractor: &dyn ContourExtractor,
    config: &ResinTrapConfig,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
) -> DetectResult<AirSweepResult> {
    let layer_count = source.layer_count();
    let roi = source.bounding_rect();
    if layer_count == 0 || roi.is_empty() || config.start_layer_index >= layer_count {
        return Ok(AirSweepResult::empty(layer_count, false));
    }
    let start = config.start_layer_index;

    // Each cache slot carries the ROI crop twice: the air-map view
    // (thresholded at drain brightness) and the contour view (thresholded
    // for geometry). Both thresholds may be disabled independently.
    let transform = move |threshold_a: u8, threshold_b: u8| {
        move |_index: u32, decoded: Raster| {
            let cropped = decoded.crop(&roi);
            let mut air_view = cropped.clone();
            if threshold_a > 0 {
                air_view.threshold(threshold_a);
            }
            let mut contour_view = cropped;
            if threshold_b > 0 {
                contour_view.threshold(threshold_b);
            }
            vec![air_view, contour_view]
        }
    };

    let mut next_id = 0_u64;
    let mut candidates: Vec<Vec<Arc<HollowRegion>>> = vec![Vec::new(); layer_count as usize];
    let mut air_regions: Vec<Vec<Arc<HollowRegion>>> = vec![Vec::new(); layer_count as usize];
    let mut state = SweepState {
        air_map: Raster::new(roi.width, roi.height),
        states: HashMap::new(),
        groups: TemporalGroups::new(),
    };

    // Pass 1, bottom to top: provisional classification.
    progress.reset("Detection pass 1 of 2 (Resin traps)", layer_count, start);
    let cache = LayerCache::new(source)
        .with_cancel(cancel.clone())
        .with_transform(Box::new(transform(config.drain_brightness, config.binary_threshold)));
    for layer_index in start..layer_count {
        if cancel.is_cancelled() {
            return Ok(AirSweepResult::empty(layer_count, true));
        }
        let slot = cache.consume(layer_index)?;
        let solid = &slot[0];
        let layer_air = solid.outside_background();

        if layer_index == start {
            state.air_map = layer_air.clone();
        }
        state.air_map.subtract(solid);
        state.air_map.or(&layer_air);

        let hollows = extract_hollows(extractor, &slot[1], layer_index, config, &mut next_id);
        let shared = Mutex::new((&mut state, &mut candidates, &mut air_regions));
        hollows.into_par_iter().for_each(|region| {
            if cancel.is_cancelled() {
                return;
            }
            let mut guard = shared.lock().unwrap_or_else(PoisonError::into_inner);
            let (state, candidates, air_regions) = &mut *guard;
            let origin = origin_of(&region);
            let overlap = state.air_map.overlap_count(&region.mask, origin);
            if overlap == 0 {
                state.states.insert(region.id, RegionState::ResinTrap);
                candidates[layer_index as usize].push(region);
            } else if overlap >= u64::from(config.required_overlap_px) {
                state.states.insert(region.id, RegionState::AirConnected);
                state.air_map.stamp_mask(&region.mask, origin, 255);
                air_regions[layer_index as usize].push(region);
            } else {
                // Too little overlap to drain; counts as solid from here on.
                state.air_map.erase_mask(&region.mask, origin);
            }
        });
        progress.increment();
    }

    // Pass 2, top to bottom: re-test candidates against air from above.
    progress.reset("Detection pass 2 of 2 (Resin traps)", layer_count, start);
    let cache = LayerCache::new(source)
        .with_direction(Direction::Backward)
        .with_cancel(cancel.clone())
        .with_transform(Box::new(transform(config.drain_brightness, config.binary_threshold)));
    for layer_index in (start..layer_count).rev() {
        if cancel.is_cancelled() {
            return Ok(AirSweepResult::empty(layer_count, true));
        }
        let slot = cache.consume(layer_index)?;
        let solid = &slot[0];

        if layer_index == layer_count - 1 {
            // Everything hollow on the top surface is air by definition, so
            // the seed is a plain complement with no exterior exclusion.
            state.air_map = solid.complement();
        }

        let mut layer_air = solid.outside_background();
        for region in &air_regions[layer_index as usize] {
            layer_air.stamp_mask(&region.mask, origin_of(region), 255);
        }
        state.air_map.subtract(solid);
        state.air_map.or(&layer_air);

        let layer_candidates = candidates[layer_index as usize].clone();
        let shared = Mutex::new(&mut state);
        layer_candidates.into_par_iter().for_each(|region| {
            if cancel.is_cancelled() {
                return;
            }
            let mut guard = shared.lock().unwrap_or_else(PoisonError::into_inner);
            let state = &mut **guard;
            if state.states.get(&region.id) != Some(&RegionState::ResinTrap) {
                return;
            }
            let origin = origin_of(&region);
            let overlap = state.air_map.overlap_count(&region.mask, origin);
            if overlap >= u64::from(config.required_overlap_px) {
                state.air_map.stamp_mask(&region.mask, origin, 255);
                state.states.insert(region.id, RegionState::SuctionCup);
                // Air reached this void from above: the whole chain it
                // belongs to drains the same way.
                for entry in state.groups.remove_matching(&region) {
                    state.states.insert(entry.id, RegionState::SuctionCup);
                }
            } else {
                state.air_map.erase_mask(&region.mask, origin);
                state.groups.insert(region);
            }
        });
        progress.increment();
    }

    let mut result = AirSweepResult::empty(layer_count, false);
    let mut trap_count = 0_usize;
    let mut suction_count = 0_usize;
    for (layer_index, layer_candidates) in candidates.into_iter().enumerate() {
        for region in layer_candidates {
            match state.states.get(&region.id) {
                Some(RegionState::SuctionCup) => {
                    suction_count += 1;
                    result.suctions[layer_index].push(region);
                }
                _ => {
                    trap_count += 1;
                    result.traps[layer_index].push(region);
                }
            }
        }
    }
    debug!(trap_count, suction_count, "air-connectivity sweep done");
    Ok(result)
}

/// Hollow regions of one layer, ROI-local, above the area threshold.
fn extract_hollows(
    extractor: &dyn ContourExtractor,
    contour_view: &Raster,
    layer_index: u32,
    config: &ResinTrapConfig,
    next_id: &mut u64,
) -> Vec<Arc<HollowRegion>> {
    let tree = extractor.extract(contour_view);
    tree.holes()
        .filter(|hole| hole.area_px >= u64::from(config.min_area_px))
        .map(|hole| {
            let id = *next_id;
            *next_id += 1;
            Arc::new(HollowRegion {
                id,
                layer_index,
                outline: hole.points.clone(),
                bounds: hole.bounds,
                mask: hole.mask.clone(),
                area_px: hole.area_px,
            })
        })
        .collect()
}
