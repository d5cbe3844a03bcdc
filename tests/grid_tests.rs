// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for thumbnail preheating and grid update coordination

use image_picker::backends::virtual_camera::{
    CacheCall, ViewCall, VirtualCollectionView, VirtualImageCache, VirtualLibrary,
};
use image_picker::config::LayoutConfiguration;
use image_picker::grid::{
    AssetGridLayout, ChangeDetails, CollectionViewUpdatesCoordinator, GridMutation,
    ImagePickerAssetCacheItem, IndexPath, Rect, ScrollDirection, Size,
};
use image_picker::library::{Asset, FetchOptions, MediaType, PhotoLibrary};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const ASSETS_SECTION: usize = 2;

fn vertical_config() -> LayoutConfiguration {
    LayoutConfiguration {
        shows_first_action_item: false,
        shows_second_action_item: false,
        shows_camera_item: false,
        scroll_direction: ScrollDirection::Vertical,
        asset_items_per_line: 4,
        interitem_spacing: 0.0,
        action_section_spacing: 0.0,
    }
}

fn vertical_layout() -> AssetGridLayout {
    AssetGridLayout::new(&vertical_config(), 400.0)
}

fn cache_item(count: usize) -> (ImagePickerAssetCacheItem, Arc<VirtualImageCache>) {
    let library = VirtualLibrary::with_photos(count);
    let cache = Arc::new(VirtualImageCache::new());
    let mut item = ImagePickerAssetCacheItem::new(&library, cache.clone(), vertical_layout());
    item.set_thumbnail_size(Size::new(200.0, 200.0));
    (item, cache)
}

fn started_ids(calls: &[CacheCall]) -> Vec<String> {
    calls
        .iter()
        .flat_map(|call| match call {
            CacheCall::Start { ids, .. } => ids.clone(),
            _ => Vec::new(),
        })
        .collect()
}

fn stopped_ids(calls: &[CacheCall]) -> Vec<String> {
    calls
        .iter()
        .flat_map(|call| match call {
            CacheCall::Stop { ids, .. } => ids.clone(),
            _ => Vec::new(),
        })
        .collect()
}

fn photo(id: &str) -> Asset {
    Asset {
        local_identifier: id.to_string(),
        media_type: MediaType::Image,
        pixel_width: 10,
        pixel_height: 10,
        creation_date: None,
        is_live_photo: false,
    }
}

// ===== Preheating =====

#[test]
fn test_first_update_warms_preheat_window() {
    let (mut item, cache) = cache_item(100);

    assert!(item.update_cached_assets(Rect::new(0.0, 0.0, 400.0, 800.0)));

    // viewport grown by 600 on both sides: lines 0..14
    let calls = cache.calls();
    assert_eq!(started_ids(&calls).len(), 56);
    assert!(stopped_ids(&calls).is_empty());
    assert_eq!(
        item.previous_preheat_rect(),
        Rect::new(0.0, -600.0, 400.0, 2000.0)
    );
    assert!(calls.iter().all(|call| match call {
        CacheCall::Start { size, .. } => *size == Size::new(200.0, 200.0),
        _ => true,
    }));
}

#[test]
fn test_small_scroll_does_not_touch_cache() {
    let (mut item, cache) = cache_item(100);
    item.update_cached_assets(Rect::new(0.0, 0.0, 400.0, 800.0));
    cache.clear_calls();

    assert!(!item.update_cached_assets(Rect::new(0.0, 100.0, 400.0, 800.0)));
    assert!(!item.update_cached_assets(Rect::new(0.0, 250.0, 400.0, 800.0)));
    assert!(cache.calls().is_empty());
}

#[test]
fn test_large_scroll_updates_only_the_difference() {
    let (mut item, cache) = cache_item(100);
    item.update_cached_assets(Rect::new(0.0, 0.0, 400.0, 800.0));
    cache.clear_calls();

    assert!(item.update_cached_assets(Rect::new(0.0, 400.0, 400.0, 800.0)));
    let calls = cache.calls();
    assert_eq!(started_ids(&calls).len(), 16, "lines 14..18 became visible");
    assert!(stopped_ids(&calls).is_empty(), "nothing above the first line");
    cache.clear_calls();

    assert!(item.update_cached_assets(Rect::new(0.0, 1200.0, 400.0, 800.0)));
    let calls = cache.calls();
    assert_eq!(started_ids(&calls).len(), 28, "lines 18..25");
    assert_eq!(stopped_ids(&calls).len(), 24, "lines 0..6");
    assert_eq!(cache.cached_count(), 56 + 16 + 28 - 24);
}

#[test]
fn test_missing_thumbnail_size_skips_caching() {
    let library = VirtualLibrary::with_photos(10);
    let cache = Arc::new(VirtualImageCache::new());
    let mut item = ImagePickerAssetCacheItem::new(&library, cache.clone(), vertical_layout());

    assert!(!item.update_cached_assets(Rect::new(0.0, 0.0, 400.0, 800.0)));
    assert!(cache.calls().is_empty());
}

#[test]
fn test_reset_forgets_window() {
    let (mut item, cache) = cache_item(100);
    item.update_cached_assets(Rect::new(0.0, 0.0, 400.0, 800.0));

    item.reset_cached_assets();
    assert_eq!(item.previous_preheat_rect(), Rect::ZERO);
    assert_eq!(cache.calls().last(), Some(&CacheCall::StopAll));

    cache.clear_calls();
    assert!(item.update_cached_assets(Rect::new(0.0, 0.0, 400.0, 800.0)));
    assert_eq!(started_ids(&cache.calls()).len(), 56);
}

#[test]
fn test_layout_change_restarts_preheat() {
    let (mut item, cache) = cache_item(100);
    item.update_cached_assets(Rect::new(0.0, 0.0, 400.0, 800.0));

    let config = LayoutConfiguration {
        asset_items_per_line: 2,
        ..vertical_config()
    };
    let wide = AssetGridLayout::new(&config, 400.0);
    item.set_thumbnail_size(wide.thumbnail_size(2.0));
    item.set_layout(wide);
    assert_eq!(item.previous_preheat_rect(), Rect::ZERO);
    assert_eq!(cache.calls().last(), Some(&CacheCall::StopAll));

    cache.clear_calls();
    assert!(item.update_cached_assets(Rect::new(0.0, 0.0, 400.0, 800.0)));
    let calls = cache.calls();
    // seven lines of two 200 point cells
    assert_eq!(started_ids(&calls).len(), 14);
    assert!(calls.iter().all(|call| match call {
        CacheCall::Start { size, .. } => *size == Size::new(400.0, 400.0),
        _ => true,
    }));
}

#[test]
fn test_user_fetch_result_replaces_default() {
    let library = VirtualLibrary::with_photos(10);
    let cache = Arc::new(VirtualImageCache::new());
    let mut item = ImagePickerAssetCacheItem::new(&library, cache.clone(), vertical_layout());
    assert!(!item.has_user_fetch_result());
    assert_eq!(item.fetch_result().count(), 10);

    let options = FetchOptions {
        limit: Some(3),
        ..FetchOptions::default()
    };
    item.set_fetch_result(library.fetch_assets(&options));

    assert!(item.has_user_fetch_result());
    assert_eq!(item.fetch_result().count(), 3);
    assert_eq!(cache.calls(), vec![CacheCall::StopAll]);
}

// ===== Update coordination =====

#[tokio::test]
async fn test_batch_applies_fixed_mutation_order() {
    let view = Arc::new(VirtualCollectionView::new());
    let coordinator = CollectionViewUpdatesCoordinator::new(view.clone());
    let before = image_picker::library::AssetFetchResult::new(vec![
        photo("a"),
        photo("b"),
        photo("c"),
    ]);
    let after = image_picker::library::AssetFetchResult::new(vec![
        photo("x"),
        photo("c"),
        photo("b"),
    ]);
    let changes =
        ChangeDetails::incremental(before, after, vec![0], vec![0], vec![1], vec![(2, 1)]);

    coordinator.perform_changes(changes, ASSETS_SECTION);
    coordinator.flush().await;

    let path = |item| IndexPath::new(item, ASSETS_SECTION);
    assert_eq!(
        view.calls(),
        vec![ViewCall::BatchUpdates(vec![
            GridMutation::DeleteItems(vec![path(0)]),
            GridMutation::InsertItems(vec![path(0)]),
            GridMutation::ReloadItems(vec![path(1)]),
            GridMutation::MoveItem {
                from: path(2),
                to: path(1)
            },
        ])]
    );
}

#[tokio::test]
async fn test_reload_waits_for_running_batch() {
    let view = Arc::new(VirtualCollectionView::deferred());
    let coordinator = CollectionViewUpdatesCoordinator::new(view.clone());
    let library = VirtualLibrary::with_photos(3);
    let before = library.fetch_assets(&FetchOptions::most_recent());
    library.insert(photo("new"));
    let after = library.fetch_assets(&FetchOptions::most_recent());

    coordinator.perform_changes(
        ChangeDetails::between(before.clone(), after.clone()),
        ASSETS_SECTION,
    );
    coordinator.perform_changes(ChangeDetails::full_reload(before, after), ASSETS_SECTION);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(view.pending_batches(), 1);
    assert_eq!(
        view.calls(),
        vec![ViewCall::BatchUpdates(vec![GridMutation::InsertItems(vec![
            IndexPath::new(0, ASSETS_SECTION)
        ])])]
    );

    view.complete_pending(true);
    coordinator.flush().await;
    assert_eq!(view.calls().len(), 2);
    assert_eq!(view.calls()[1], ViewCall::ReloadData);
}

#[tokio::test]
async fn test_data_source_updates_interleave_in_order() {
    let view = Arc::new(VirtualCollectionView::new());
    let coordinator = CollectionViewUpdatesCoordinator::new(view.clone());
    let library = Arc::new(VirtualLibrary::with_photos(2));
    let (cache, _) = cache_item(0);
    let item = Arc::new(Mutex::new(cache));

    let before = library.fetch_assets(&FetchOptions::most_recent());
    library.remove("photo-1");
    let after = library.fetch_assets(&FetchOptions::most_recent());
    let changes = ChangeDetails::between(before, after.clone());
    assert_eq!(changes.removed_indexes, vec![1]);

    let target = Arc::clone(&item);
    coordinator.perform_data_source_update(move || {
        target
            .lock()
            .unwrap()
            .apply_fetch_result_after_changes(after);
    });
    coordinator.perform_changes(changes, ASSETS_SECTION);
    coordinator.flush().await;

    assert_eq!(item.lock().unwrap().fetch_result().count(), 1);
    assert_eq!(
        view.calls(),
        vec![ViewCall::BatchUpdates(vec![GridMutation::DeleteItems(vec![
            IndexPath::new(1, ASSETS_SECTION)
        ])])]
    );
}
