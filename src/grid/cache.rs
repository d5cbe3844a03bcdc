// SPDX-License-Identifier: GPL-3.0-only

//! Thumbnail preheating for the asset grid
//!
//! [`ImagePickerAssetCacheItem`] owns the fetch result the grid displays and
//! keeps the image cache warm for a window around the visible area. The window
//! ("preheat rectangle") is the viewport grown by three quarters of its extent
//! on both sides of the scroll axis. It is only recomputed once the viewport
//! midpoint has moved by more than a third of its extent, so small scroll
//! deltas do not thrash the cache.

use super::geometry::{Rect, ScrollDirection, Size};
use super::layout::AssetGridLayout;
use crate::constants::preheat::{EXPANSION_FACTOR, UPDATE_THRESHOLD_FACTOR};
use crate::library::{
    AssetFetchResult, ContentMode, FetchOptions, ImageCacheManager, PhotoLibrary,
};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ImagePickerAssetCacheItem {
    fetch_result: AssetFetchResult,
    user_provided: bool,
    image_manager: Arc<dyn ImageCacheManager>,
    layout: AssetGridLayout,
    thumbnail_size: Option<Size>,
    previous_preheat_rect: Rect,
}

impl ImagePickerAssetCacheItem {
    /// Cache item showing the library's most recent assets
    pub fn new(
        library: &dyn PhotoLibrary,
        image_manager: Arc<dyn ImageCacheManager>,
        layout: AssetGridLayout,
    ) -> Self {
        let fetch_result = library.fetch_assets(&FetchOptions::most_recent());
        debug!(count = fetch_result.count(), "Fetched default assets");
        Self {
            fetch_result,
            user_provided: false,
            image_manager,
            layout,
            thumbnail_size: None,
            previous_preheat_rect: Rect::ZERO,
        }
    }

    pub fn fetch_result(&self) -> &AssetFetchResult {
        &self.fetch_result
    }

    /// Whether the fetch result was set by the host rather than fetched by default
    pub fn has_user_fetch_result(&self) -> bool {
        self.user_provided
    }

    /// Replace the displayed assets; the cache starts over
    pub fn set_fetch_result(&mut self, fetch_result: AssetFetchResult) {
        self.fetch_result = fetch_result;
        self.user_provided = true;
        self.reset_cached_assets();
    }

    /// Apply a library change to the displayed assets without resetting the cache
    pub fn apply_fetch_result_after_changes(&mut self, fetch_result: AssetFetchResult) {
        self.fetch_result = fetch_result;
    }

    pub fn thumbnail_size(&self) -> Option<Size> {
        self.thumbnail_size
    }

    pub fn set_thumbnail_size(&mut self, size: Size) {
        self.thumbnail_size = Some(size);
    }

    pub fn layout(&self) -> &AssetGridLayout {
        &self.layout
    }

    pub fn set_layout(&mut self, layout: AssetGridLayout) {
        self.layout = layout;
        self.reset_cached_assets();
    }

    pub fn previous_preheat_rect(&self) -> Rect {
        self.previous_preheat_rect
    }

    /// Stop all caching and forget the preheat window
    pub fn reset_cached_assets(&mut self) {
        self.image_manager.stop_caching_all();
        self.previous_preheat_rect = Rect::ZERO;
    }

    /// Update the preheat window for the visible `viewport`
    ///
    /// Returns whether the cache was touched.
    pub fn update_cached_assets(&mut self, viewport: Rect) -> bool {
        let Some(thumbnail_size) = self.thumbnail_size else {
            warn!("Thumbnail size not set, skipping asset caching");
            return false;
        };

        let direction = self.layout.scroll_direction;
        let (_, extent, _) = viewport.span(direction);
        let preheat_rect = match direction {
            ScrollDirection::Vertical => viewport.outset_by(0.0, EXPANSION_FACTOR * extent),
            ScrollDirection::Horizontal => viewport.outset_by(EXPANSION_FACTOR * extent, 0.0),
        };

        if !self.previous_preheat_rect.is_empty() {
            let (_, _, new_mid) = preheat_rect.span(direction);
            let (_, _, old_mid) = self.previous_preheat_rect.span(direction);
            if (new_mid - old_mid).abs() <= extent * UPDATE_THRESHOLD_FACTOR {
                return false;
            }
        }

        let (added, removed) =
            rect_differences(self.previous_preheat_rect, preheat_rect, direction);
        let count = self.fetch_result.count();
        let added_indexes: Vec<usize> = added
            .iter()
            .flat_map(|rect| self.layout.items_in_rect(rect, count))
            .collect();
        let removed_indexes: Vec<usize> = removed
            .iter()
            .flat_map(|rect| self.layout.items_in_rect(rect, count))
            .collect();

        let added_assets = self.fetch_result.objects_at(&added_indexes);
        let removed_assets = self.fetch_result.objects_at(&removed_indexes);

        debug!(
            start = added_assets.len(),
            stop = removed_assets.len(),
            "Updating cached assets"
        );
        if !added_assets.is_empty() {
            self.image_manager
                .start_caching(&added_assets, thumbnail_size, ContentMode::AspectFill);
        }
        if !removed_assets.is_empty() {
            self.image_manager
                .stop_caching(&removed_assets, thumbnail_size, ContentMode::AspectFill);
        }

        self.previous_preheat_rect = preheat_rect;
        true
    }
}

impl std::fmt::Debug for ImagePickerAssetCacheItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePickerAssetCacheItem")
            .field("assets", &self.fetch_result.count())
            .field("user_provided", &self.user_provided)
            .field("thumbnail_size", &self.thumbnail_size)
            .field("previous_preheat_rect", &self.previous_preheat_rect)
            .finish()
    }
}

/// Regions that became part of the preheat window and regions that left it
///
/// Both rectangles span the same cross-axis range; only the scroll-axis
/// extents are compared.
pub fn rect_differences(
    old: Rect,
    new: Rect,
    direction: ScrollDirection,
) -> (Vec<Rect>, Vec<Rect>) {
    if !old.intersects(&new) {
        let added = if new.is_empty() { vec![] } else { vec![new] };
        let removed = if old.is_empty() { vec![] } else { vec![old] };
        return (added, removed);
    }

    let (old_start, old_extent, _) = old.span(direction);
    let (new_start, new_extent, _) = new.span(direction);
    let (old_end, new_end) = (old_start + old_extent, new_start + new_extent);

    let band = |start: f64, end: f64| match direction {
        ScrollDirection::Vertical => Rect::new(new.min_x(), start, new.size.width, end - start),
        ScrollDirection::Horizontal => Rect::new(start, new.min_y(), end - start, new.size.height),
    };

    let mut added = Vec::new();
    if new_end > old_end {
        added.push(band(old_end, new_end));
    }
    if old_start > new_start {
        added.push(band(new_start, old_start));
    }

    let mut removed = Vec::new();
    if new_end < old_end {
        removed.push(band(new_end, old_end));
    }
    if old_start < new_start {
        removed.push(band(old_start, new_start));
    }

    (added, removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrolling_down_adds_below_removes_above() {
        let old = Rect::new(0.0, 0.0, 100.0, 100.0);
        let new = Rect::new(0.0, 50.0, 100.0, 100.0);
        let (added, removed) = rect_differences(old, new, ScrollDirection::Vertical);
        assert_eq!(added, vec![Rect::new(0.0, 100.0, 100.0, 50.0)]);
        assert_eq!(removed, vec![Rect::new(0.0, 0.0, 100.0, 50.0)]);
    }

    #[test]
    fn test_disjoint_rects_swap_wholesale() {
        let old = Rect::new(0.0, 0.0, 100.0, 100.0);
        let new = Rect::new(500.0, 0.0, 100.0, 100.0);
        let (added, removed) = rect_differences(old, new, ScrollDirection::Horizontal);
        assert_eq!(added, vec![new]);
        assert_eq!(removed, vec![old]);
    }

    #[test]
    fn test_first_update_from_empty() {
        let new = Rect::new(0.0, -75.0, 100.0, 250.0);
        let (added, removed) = rect_differences(Rect::ZERO, new, ScrollDirection::Vertical);
        assert_eq!(added, vec![new]);
        assert!(removed.is_empty());
    }
}
