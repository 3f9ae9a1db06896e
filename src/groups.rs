//! Hollow regions and their temporal grouping across layers.
//!
//! The air sweep classifies hollow regions one layer at a time, but a
//! physical void spans many layers. [`TemporalGroups`] chains region
//! instances on consecutive layers into one group when they geometrically
//! overlap, merging transitively, so a late connectivity discovery on one
//! layer can reclassify the whole void.

use std::sync::Arc;

use crate::bounds::{PixelPoint, PixelRect};
use crate::raster::{masks_intersect, Raster};

/// Classification of a hollow region, mutated at most once per sweep pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    /// Not yet tested, or below the area threshold.
    Unclassified,
    /// Proven path to open air.
    AirConnected,
    /// No proven path to open air.
    ResinTrap,
    /// Air path exists but only from above; vacuum risk.
    SuctionCup,
}

/// One hole in one layer's solid geometry.
///
/// Coordinates are ROI-local (relative to the model bounding rectangle);
/// the aggregator shifts them back to full-frame coordinates at the end.
#[derive(Debug, Clone)]
pub struct HollowRegion {
    /// Identity within one detection run.
    pub id: u64,
    /// Layer the hole lives on.
    pub layer_index: u32,
    /// Closed outline of the hole.
    pub outline: Vec<PixelPoint>,
    /// Bounding box of the hole.
    pub bounds: PixelRect,
    /// Filled mask cropped to `bounds`, 255 inside the hole.
    pub mask: Raster,
    /// Pixel area of the hole.
    pub area_px: u64,
}

impl HollowRegion {
    /// True when the two regions share at least one pixel.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        masks_intersect(&self.mask, &self.bounds, &other.mask, &other.bounds)
    }
}

/// A chain of hollow regions across consecutive layers believed to be one
/// physical void. Entries are kept in descending layer order, the order the
/// top-down pass discovers them in.
#[derive(Debug, Clone, Default)]
pub struct RegionGroup {
    /// Member regions, newest (lowest layer) last.
    pub entries: Vec<Arc<HollowRegion>>,
}

impl RegionGroup {
    /// The most recently appended region.
    #[must_use]
    pub fn newest(&self) -> Option<&Arc<HollowRegion>> {
        self.entries.last()
    }

    /// Lowest layer index among the entries.
    #[must_use]
    pub fn start_layer(&self) -> u32 {
        self.entries.iter().map(|r| r.layer_index).min().unwrap_or(0)
    }

    /// Highest layer index among the entries.
    #[must_use]
    pub fn end_layer(&self) -> u32 {
        self.entries.iter().map(|r| r.layer_index).max().unwrap_or(0)
    }
}

/// Group store with adjacency + intersection matching and transitive merge.
///
/// Insertion scans every group linearly, so the cost is quadratic in the
/// group count. Real models carry a handful of open groups at a time, which
/// keeps this well below the raster work per layer.
#[derive(Debug, Default)]
pub struct TemporalGroups {
    groups: Vec<RegionGroup>,
}

impl TemporalGroups {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Indices of groups whose newest entry sits on `region`'s layer or the
    /// layer above it and geometrically intersects `region`.
    fn matching(&self, region: &HollowRegion) -> Vec<usize> {
        self.groups
            .iter()
            .enumerate()
            .filter(|(_, group)| {
                group.newest().is_some_and(|newest| {
                    (newest.layer_index == region.layer_index
                        || newest.layer_index == region.layer_index + 1)
                        && newest.intersects(region)
                })
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// Insert a region, merging every group it bridges.
    pub fn insert(&mut self, region: Arc<HollowRegion>) {
        let matched = self.matching(&region);
        match matched.as_slice() {
            [] => self.groups.push(RegionGroup {
                entries: vec![region],
            }),
            [single] => self.groups[*single].entries.push(region),
            [first, rest @ ..] => {
                // Drain back to front so the indices stay valid.
                let mut merged = Vec::new();
                for &i in rest.iter().rev() {
                    merged.append(&mut self.groups.remove(i).entries);
                }
                let target = &mut self.groups[*first].entries;
                target.append(&mut merged);
                target.sort_by(|a, b| b.layer_index.cmp(&a.layer_index));
                target.push(region);
            }
        }
    }

    /// Remove every group matching `region` and return their members.
    ///
    /// Used when a trap candidate is re-proven air-connected: the whole
    /// chain it belongs to changes class with it. Unlike [`insert`], the
    /// test walks every entry on `region`'s layer or the layer above, not
    /// just the newest one; a merged group can hold several entries
    /// adjacent to the trigger and any of them links the chain.
    ///
    /// [`insert`]: Self::insert
    pub fn remove_matching(&mut self, region: &HollowRegion) -> Vec<Arc<HollowRegion>> {
        let matched: Vec<usize> = self
            .groups
            .iter()
            .enumerate()
            .filter(|(_, group)| {
                group.entries.iter().any(|entry| {
                    (entry.layer_index == region.layer_index
                        || entry.layer_index == region.layer_index + 1)
                        && entry.intersects(region)
                })
            })
            .map(|(i, _)| i)
            .collect();
        let mut removed = Vec::new();
        for &i in matched.iter().rev() {
            removed.append(&mut self.groups.remove(i).entries);
        }
        removed
    }

    /// The groups accumulated so far.
    #[must_use]
    pub fn groups(&self) -> &[RegionGroup] {
        &self.groups
    }

    /// Consume the store.
    #[must_use]
    pub fn into_groups(self) -> Vec<RegionGroup> {
        self.groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(id: u64, layer: u32, x: i32) -> Arc<HollowRegion> {
        let mut mask = Raster::new(4, 4);
        for y in 0..4 {
            for px in 0..4 {
                mask.set_pixel(px, y, 255);
            }
        }
        Arc::new(HollowRegion {
            id,
            layer_index: layer,
            outline: vec![
                PixelPoint::new(x, 0),
                PixelPoint::new(x + 3, 0),
                PixelPoint::new(x + 3, 3),
                PixelPoint::new(x, 3),
            ],
            bounds: PixelRect::new(x, 0, 4, 4),
            mask,
            area_px: 16,
        })
    }

    #[test]
    fn test_chain_grows_down_the_stack() {
        let mut groups = TemporalGroups::new();
        groups.insert(region(1, 10, 0));
        groups.insert(region(2, 9, 1));
        groups.insert(region(3, 8, 2));
        assert_eq!(groups.groups().len(), 1);
        let group = &groups.groups()[0];
        assert_eq!(group.start_layer(), 8);
        assert_eq!(group.end_layer(), 10);
    }

    #[test]
    fn test_gap_or_miss_starts_new_group() {
        let mut groups = TemporalGroups::new();
        groups.insert(region(1, 10, 0));
        // Two layers below: not adjacent.
        groups.insert(region(2, 8, 0));
        // Adjacent layer but 20px away: no intersection.
        groups.insert(region(3, 9, 20));
        assert_eq!(groups.groups().len(), 3);
    }

    #[test]
    fn test_bridging_region_merges_transitively() {
        let mut groups = TemporalGroups::new();
        // Two separate columns of void on layer 10.
        groups.insert(region(1, 10, 0));
        groups.insert(region(2, 10, 6));
        assert_eq!(groups.groups().len(), 2);
        // A wide region on layer 9 touching both columns.
        let mut mask = Raster::new(10, 4);
        for y in 0..4 {
            for x in 0..10 {
                mask.set_pixel(x, y, 255);
            }
        }
        let bridge = Arc::new(HollowRegion {
            id: 3,
            layer_index: 9,
            outline: vec![PixelPoint::new(0, 0), PixelPoint::new(9, 3)],
            bounds: PixelRect::new(0, 0, 10, 4),
            mask,
            area_px: 40,
        });
        groups.insert(bridge);
        assert_eq!(groups.groups().len(), 1);
        assert_eq!(groups.groups()[0].entries.len(), 3);
    }

    #[test]
    fn test_remove_matching_drains_the_chain() {
        let mut groups = TemporalGroups::new();
        groups.insert(region(1, 10, 0));
        groups.insert(region(2, 9, 0));
        groups.insert(region(3, 5, 0)); // Unrelated chain

        let trigger = region(9, 8, 0);
        let removed = groups.remove_matching(&trigger);
        assert_eq!(removed.len(), 2);
        assert_eq!(groups.groups().len(), 1);
        assert_eq!(groups.groups()[0].entries[0].id, 3);
    }

    #[test]
    fn test_remove_matching_reaches_merged_entries() {
        let mut groups = TemporalGroups::new();
        groups.insert(region(1, 10, 0));
        groups.insert(region(2, 10, 6));
        // Bridge over x 0..8 merges both layer-10 entries into one group
        // and becomes its newest entry.
        let mut mask = Raster::new(8, 4);
        for y in 0..4 {
            for x in 0..8 {
                mask.set_pixel(x, y, 255);
            }
        }
        groups.insert(Arc::new(HollowRegion {
            id: 3,
            layer_index: 9,
            outline: vec![PixelPoint::new(0, 0)],
            bounds: PixelRect::new(0, 0, 8, 4),
            mask,
            area_px: 32,
        }));
        assert_eq!(groups.groups().len(), 1);

        // Intersects entry 2 on layer 10 but not the newest entry.
        let trigger = region(9, 9, 8);
        let removed = groups.remove_matching(&trigger);
        assert_eq!(removed.len(), 3);
        assert!(groups.groups().is_empty());
    }

    #[test]
    fn test_adjacency_invariant_after_merge() {
        let mut groups = TemporalGroups::new();
        groups.insert(region(1, 10, 0));
        groups.insert(region(2, 10, 6));
        let mut mask = Raster::new(10, 4);
        for y in 0..4 {
            for x in 0..10 {
                mask.set_pixel(x, y, 255);
            }
        }
        groups.insert(Arc::new(HollowRegion {
            id: 3,
            layer_index: 9,
            outline: vec![PixelPoint::new(0, 0)],
            bounds: PixelRect::new(0, 0, 10, 4),
            mask,
            area_px: 40,
        }));
        for group in groups.groups() {
            for pair in group.entries.windows(2) {
                assert!(pair[0].layer_index.abs_diff(pair[1].layer_index) <= 1);
            }
        }
    }
}
