//! Windowed, direction-aware cache of decoded layer bitmaps.
//!
//! Decode dominates the cost of a scan, so both sweep passes stream through
//! the stack via this cache: a miss decodes a whole window ahead of the scan
//! direction in parallel, and the caller evicts behind itself with
//! [`LayerCache::consume`] and [`LayerCache::clear_but_keep`] to bound
//! memory on stacks of thousands of layers.
//!
//! Each slot holds the decoded bitmap plus any derived rasters produced by
//! the injected post-decode transform (the air sweep uses this for the
//! ROI-crop and drain threshold). Slot writes are publish-once: a populated
//! slot is never overwritten, so a prefetch worker racing a direct `get`
//! is harmless.

#![allow(clippy::cast_possible_truncation)]

use std::sync::{Arc, Mutex, PoisonError};

use rayon::prelude::*;

use crate::error::DetectResult;
use crate::progress::CancelToken;
use crate::raster::Raster;
use crate::stack::CrossSectionSource;

/// Scan direction the prefetch window extends toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Bottom to top, increasing layer index.
    Forward,
    /// Top to bottom, decreasing layer index.
    Backward,
}

/// Post-decode transform: maps a decoded layer bitmap to the slot content.
///
/// Runs exactly once per decode, on the prefetch worker. The first element
/// of the returned vector is conventionally the (possibly transformed)
/// layer bitmap itself; further elements are derived rasters.
pub type PostDecode<'a> = dyn Fn(u32, Raster) -> Vec<Raster> + Send + Sync + 'a;

type Slot = Mutex<Option<Arc<Vec<Raster>>>>;

/// Bounded cache of decoded layers with parallel window prefetch.
pub struct LayerCache<'a, S: CrossSectionSource + ?Sized> {
    source: &'a S,
    slots: Vec<Slot>,
    direction: Direction,
    capacity: u32,
    transform: Option<Box<PostDecode<'a>>>,
    cancel: CancelToken,
}

impl<'a, S: CrossSectionSource + ?Sized> LayerCache<'a, S> {
    /// Create a forward cache with the default window of five layers per
    /// worker thread.
    #[must_use]
    pub fn new(source: &'a S) -> Self {
        let capacity = (rayon::current_num_threads() as u32).max(1) * 5;
        Self::with_capacity(source, capacity)
    }

    /// Create a forward cache with an explicit window size.
    #[must_use]
    pub fn with_capacity(source: &'a S, capacity: u32) -> Self {
        let mut slots = Vec::with_capacity(source.layer_count() as usize);
        slots.resize_with(source.layer_count() as usize, || Mutex::new(None));
        Self {
            source,
            slots,
            direction: Direction::Forward,
            capacity: capacity.max(1),
            transform: None,
            cancel: CancelToken::new(),
        }
    }

    /// Set the scan direction. Call [`LayerCache::clear`] first when
    /// switching direction on a cache that already holds slots.
    #[must_use]
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Install the post-decode transform.
    #[must_use]
    pub fn with_transform(mut self, transform: Box<PostDecode<'a>>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Share a cancellation token: once cancelled, prefetch stops decoding
    /// ahead (the directly requested layer still decodes).
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn slot(&self, index: u32) -> std::sync::MutexGuard<'_, Option<Arc<Vec<Raster>>>> {
        self.slots[index as usize]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Indices of the prefetch window starting at `index`, in scan order.
    fn window(&self, index: u32) -> Vec<u32> {
        let count = self.source.layer_count();
        match self.direction {
            Direction::Forward => (index..count.min(index + self.capacity)).collect(),
            Direction::Backward => {
                let lo = index.saturating_sub(self.capacity - 1);
                (lo..=index).rev().collect()
            }
        }
    }

    fn decode_into_slot(&self, index: u32) -> DetectResult<()> {
        if self.slot(index).is_some() {
            return Ok(());
        }
        let decoded = self.source.decode(index)?;
        let content = match &self.transform {
            Some(transform) => transform(index, decoded),
            None => vec![decoded],
        };
        let mut slot = self.slot(index);
        // Publish once; a racing worker's copy wins and ours is dropped.
        if slot.is_none() {
            *slot = Some(Arc::new(content));
        }
        Ok(())
    }

    /// Get the cached content for `index`, decoding a window on a miss.
    ///
    /// # Errors
    ///
    /// Propagates the source's decode error for any layer in the window.
    pub fn get(&self, index: u32) -> DetectResult<Arc<Vec<Raster>>> {
        if index >= self.source.layer_count() {
            return Err(crate::error::DetectError::LayerOutOfRange {
                layer_index: index,
                layer_count: self.source.layer_count(),
            });
        }
        if let Some(content) = self.slot(index).as_ref() {
            return Ok(Arc::clone(content));
        }
        let window = self.window(index);
        window.par_iter().try_for_each(|&i| {
            if i != index && self.cancel.is_cancelled() {
                return Ok(());
            }
            self.decode_into_slot(i)
        })?;
        let slot = self.slot(index);
        match slot.as_ref() {
            Some(content) => Ok(Arc::clone(content)),
            // Unreachable: decode_into_slot(index) either filled it or
            // returned the error propagated above.
            None => Err(crate::error::DetectError::LayerDecode {
                layer_index: index,
                message: "cache slot empty after prefetch".to_string(),
            }),
        }
    }

    /// Get and evict in one step, for layers the sweep will not revisit.
    ///
    /// # Errors
    ///
    /// Propagates decode errors as [`LayerCache::get`] does.
    pub fn consume(&self, index: u32) -> DetectResult<Arc<Vec<Raster>>> {
        let content = self.get(index)?;
        *self.slot(index) = None;
        Ok(content)
    }

    /// Evict every slot farther than `keep_last` layers from `index`.
    pub fn clear_but_keep(&self, index: u32, keep_last: u32) {
        for i in 0..self.slots.len() as u32 {
            if index.abs_diff(i) > keep_last {
                *self.slot(i) = None;
            }
        }
    }

    /// Evict everything. Required before reusing the cache in the other
    /// direction.
    pub fn clear(&self) {
        for i in 0..self.slots.len() as u32 {
            *self.slot(i) = None;
        }
    }

    /// Number of populated slots, for tests and memory accounting.
    #[must_use]
    pub fn cached_count(&self) -> u32 {
        (0..self.slots.len() as u32)
            .filter(|&i| self.slot(i).is_some())
            .count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::SliceStack;

    fn stack_of(n: u32) -> SliceStack {
        let layers = (0..n)
            .map(|i| {
                let mut r = Raster::new(4, 4);
                r.set_pixel(i as i32 % 4, 0, 255);
                r
            })
            .collect();
        SliceStack::from_layers(layers, 0.05, 150.0)
    }

    #[test]
    fn test_get_prefetches_forward_window() {
        let stack = stack_of(20);
        let cache = LayerCache::with_capacity(&stack, 4);
        cache.get(3).unwrap();
        assert_eq!(cache.cached_count(), 4);
        // The window is ahead of the scan, never behind it.
        assert!(cache.slot(2).is_none());
        assert!(cache.slot(6).is_some());
    }

    #[test]
    fn test_backward_window() {
        let stack = stack_of(20);
        let cache = LayerCache::with_capacity(&stack, 4).with_direction(Direction::Backward);
        cache.get(10).unwrap();
        assert!(cache.slot(7).is_some());
        assert!(cache.slot(11).is_none());
    }

    #[test]
    fn test_consume_evicts_and_redecodes() {
        let stack = stack_of(8);
        let cache = LayerCache::with_capacity(&stack, 2);
        let first = cache.consume(0).unwrap();
        assert!(cache.slot(0).is_none());
        let again = cache.get(0).unwrap();
        assert_eq!(first[0], again[0]);
    }

    #[test]
    fn test_clear_but_keep_window() {
        let stack = stack_of(12);
        let cache = LayerCache::with_capacity(&stack, 12);
        cache.get(0).unwrap();
        assert_eq!(cache.cached_count(), 12);
        cache.clear_but_keep(6, 2);
        assert_eq!(cache.cached_count(), 5);
        for i in 4..=8 {
            assert!(cache.slot(i).is_some());
        }
    }

    #[test]
    fn test_transform_runs_once_per_decode() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let stack = stack_of(6);
        let calls = AtomicU32::new(0);
        let cache = LayerCache::with_capacity(&stack, 3).with_transform(Box::new(|_, raster| {
            calls.fetch_add(1, Ordering::Relaxed);
            let derived = raster.thresholded(100);
            vec![raster, derived]
        }));
        let content = cache.get(0).unwrap();
        assert_eq!(content.len(), 2);
        assert_eq!(calls.load(Ordering::Relaxed), 3);
        // Hits decode nothing.
        cache.get(1).unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_decode_error_propagates() {
        let stack = stack_of(4);
        let cache = LayerCache::with_capacity(&stack, 2);
        assert!(cache.get(99).is_err());
    }
}
