// SPDX-License-Identifier: GPL-3.0-only

//! Asset grid: geometry, thumbnail preheating and serialized view updates

pub mod batch;
pub mod cache;
pub mod changes;
pub mod coordinator;
pub mod geometry;
pub mod layout;

pub use batch::{CollectionView, CollectionViewBatchAnimation, GridMutation};
pub use cache::ImagePickerAssetCacheItem;
pub use changes::ChangeDetails;
pub use coordinator::CollectionViewUpdatesCoordinator;
pub use geometry::{IndexPath, Point, Rect, ScrollDirection, Size};
pub use layout::AssetGridLayout;
