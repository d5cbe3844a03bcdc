// SPDX-License-Identifier: GPL-3.0-only

//! Photo library and thumbnail cache abstraction
//!
//! The host's media library is reached through [`PhotoLibrary`]: captured
//! photos and movies are written into it, and the asset grid reads an
//! [`AssetFetchResult`] from it. Thumbnails are pre-rendered by an
//! [`ImageCacheManager`].

use crate::capture::types::AuthorizationStatus;
use crate::errors::LibraryError;
use crate::grid::geometry::Size;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Image,
    Video,
    Audio,
    Unknown,
}

/// An item in the photo library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub local_identifier: String,
    pub media_type: MediaType,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub creation_date: Option<DateTime<Utc>>,
    /// True for photos stored with a paired companion movie
    pub is_live_photo: bool,
}

/// Sort order of a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// What to fetch from the library
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchOptions {
    /// Empty means every media type
    pub media_types: Vec<MediaType>,
    pub sort_order: SortOrder,
    pub limit: Option<usize>,
}

impl FetchOptions {
    /// The picker's default: every asset, most recent first
    pub fn most_recent() -> Self {
        Self::default()
    }

    pub fn includes(&self, media_type: MediaType) -> bool {
        self.media_types.is_empty() || self.media_types.contains(&media_type)
    }
}

/// Immutable, cheaply cloneable snapshot of a fetch
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssetFetchResult {
    assets: Arc<Vec<Asset>>,
}

impl AssetFetchResult {
    pub fn new(assets: Vec<Asset>) -> Self {
        Self {
            assets: Arc::new(assets),
        }
    }

    pub fn count(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Asset> {
        self.assets.get(index)
    }

    /// Assets at `indexes`, skipping indexes out of range
    pub fn objects_at(&self, indexes: &[usize]) -> Vec<Asset> {
        indexes
            .iter()
            .filter_map(|&i| self.assets.get(i).cloned())
            .collect()
    }

    pub fn index_of(&self, local_identifier: &str) -> Option<usize> {
        self.assets
            .iter()
            .position(|a| a.local_identifier == local_identifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.assets.iter()
    }
}

/// How a thumbnail fills its target size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentMode {
    #[default]
    AspectFill,
    AspectFit,
}

/// The host's media library
pub trait PhotoLibrary: Send + Sync {
    /// Ask for write access; may block while the user answers a prompt
    fn request_authorization(&self) -> AuthorizationStatus;

    /// Create one asset from photo bytes, pairing it with `paired_movie` when
    /// given. The movie file is moved into the library, not copied.
    fn create_photo_asset(
        &self,
        photo: &[u8],
        paired_movie: Option<&Path>,
    ) -> Result<Asset, LibraryError>;

    /// Create one asset from a movie file, which is moved into the library
    fn create_video_asset(&self, movie: &Path) -> Result<Asset, LibraryError>;

    fn fetch_assets(&self, options: &FetchOptions) -> AssetFetchResult;
}

/// Pre-renders thumbnails ahead of display
pub trait ImageCacheManager: Send + Sync {
    fn start_caching(&self, assets: &[Asset], target_size: Size, content_mode: ContentMode);
    fn stop_caching(&self, assets: &[Asset], target_size: Size, content_mode: ContentMode);
    fn stop_caching_all(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(id: &str) -> Asset {
        Asset {
            local_identifier: id.to_string(),
            media_type: MediaType::Image,
            pixel_width: 10,
            pixel_height: 10,
            creation_date: None,
            is_live_photo: false,
        }
    }

    #[test]
    fn test_objects_at_skips_out_of_range() {
        let result = AssetFetchResult::new(vec![asset("a"), asset("b")]);
        let picked = result.objects_at(&[1, 5, 0]);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].local_identifier, "b");
        assert_eq!(result.index_of("a"), Some(0));
    }

    #[test]
    fn test_fetch_options_includes_all_by_default() {
        let options = FetchOptions::most_recent();
        assert!(options.includes(MediaType::Video));
        let images = FetchOptions {
            media_types: vec![MediaType::Image],
            ..Default::default()
        };
        assert!(!images.includes(MediaType::Video));
    }
}
