// SPDX-License-Identifier: GPL-3.0-only

//! In-memory photo library and thumbnail cache
//!
//! [`VirtualLibrary`] takes ownership of resource files the same way a real
//! library does: the file is read and then removed from its temporary location.

use crate::capture::types::AuthorizationStatus;
use crate::errors::LibraryError;
use crate::grid::geometry::Size;
use crate::library::{
    Asset, AssetFetchResult, ContentMode, FetchOptions, ImageCacheManager, MediaType, PhotoLibrary,
    SortOrder,
};
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

const PHOTO_DIMENSIONS: (u32, u32) = (4032, 3024);
const VIDEO_DIMENSIONS: (u32, u32) = (1920, 1080);

struct LibraryState {
    status: AuthorizationStatus,
    /// Newest first
    assets: Vec<Asset>,
    fail_saves: bool,
    stored_bytes: usize,
}

pub struct VirtualLibrary {
    state: Mutex<LibraryState>,
}

impl Default for VirtualLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualLibrary {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LibraryState {
                status: AuthorizationStatus::Authorized,
                assets: Vec::new(),
                fail_saves: false,
                stored_bytes: 0,
            }),
        }
    }

    /// A library pre-filled with `count` photos, one minute apart
    pub fn with_photos(count: usize) -> Self {
        let library = Self::new();
        let now = Utc::now();
        {
            let mut state = library.state.lock().unwrap();
            state.assets = (0..count)
                .map(|i| Asset {
                    local_identifier: format!("photo-{}", i),
                    media_type: MediaType::Image,
                    pixel_width: PHOTO_DIMENSIONS.0,
                    pixel_height: PHOTO_DIMENSIONS.1,
                    creation_date: Some(now - Duration::minutes(i as i64)),
                    is_live_photo: false,
                })
                .collect();
        }
        library
    }

    pub fn set_authorization_status(&self, status: AuthorizationStatus) {
        self.state.lock().unwrap().status = status;
    }

    /// Make every save fail
    pub fn set_fail_saves(&self, fail: bool) {
        self.state.lock().unwrap().fail_saves = fail;
    }

    pub fn asset_count(&self) -> usize {
        self.state.lock().unwrap().assets.len()
    }

    pub fn assets(&self) -> Vec<Asset> {
        self.state.lock().unwrap().assets.clone()
    }

    /// Total size of every resource file taken over
    pub fn stored_bytes(&self) -> usize {
        self.state.lock().unwrap().stored_bytes
    }

    /// Add an asset as if another app had saved it
    pub fn insert(&self, asset: Asset) {
        self.state.lock().unwrap().assets.insert(0, asset);
    }

    pub fn remove(&self, local_identifier: &str) -> Option<Asset> {
        let mut state = self.state.lock().unwrap();
        let index = state
            .assets
            .iter()
            .position(|a| a.local_identifier == local_identifier)?;
        Some(state.assets.remove(index))
    }

    fn check_writable(&self) -> Result<(), LibraryError> {
        let state = self.state.lock().unwrap();
        if state.status != AuthorizationStatus::Authorized {
            return Err(LibraryError::NotAuthorized);
        }
        if state.fail_saves {
            return Err(LibraryError::SaveFailed("library is read only".into()));
        }
        Ok(())
    }

    /// Read a resource file and remove it from disk
    fn take_resource(path: &Path) -> Result<usize, LibraryError> {
        if !path.exists() {
            return Err(LibraryError::MissingResource(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        std::fs::remove_file(path)?;
        Ok(bytes.len())
    }

    fn store(
        &self,
        media_type: MediaType,
        dimensions: (u32, u32),
        is_live_photo: bool,
        bytes: usize,
    ) -> Asset {
        let asset = Asset {
            local_identifier: Uuid::new_v4().to_string(),
            media_type,
            pixel_width: dimensions.0,
            pixel_height: dimensions.1,
            creation_date: Some(Utc::now()),
            is_live_photo,
        };
        let mut state = self.state.lock().unwrap();
        state.assets.insert(0, asset.clone());
        state.stored_bytes += bytes;
        info!(asset = %asset.local_identifier, ?media_type, "Stored asset");
        asset
    }
}

impl PhotoLibrary for VirtualLibrary {
    fn request_authorization(&self) -> AuthorizationStatus {
        self.state.lock().unwrap().status
    }

    fn create_photo_asset(
        &self,
        photo: &[u8],
        live_photo_movie: Option<&Path>,
    ) -> Result<Asset, LibraryError> {
        self.check_writable()?;
        let movie_bytes = match live_photo_movie {
            Some(path) => Self::take_resource(path)?,
            None => 0,
        };
        Ok(self.store(
            MediaType::Image,
            PHOTO_DIMENSIONS,
            live_photo_movie.is_some(),
            photo.len() + movie_bytes,
        ))
    }

    fn create_video_asset(&self, movie: &Path) -> Result<Asset, LibraryError> {
        self.check_writable()?;
        let bytes = Self::take_resource(movie)?;
        Ok(self.store(MediaType::Video, VIDEO_DIMENSIONS, false, bytes))
    }

    fn fetch_assets(&self, options: &FetchOptions) -> AssetFetchResult {
        let state = self.state.lock().unwrap();
        let mut assets: Vec<Asset> = state
            .assets
            .iter()
            .filter(|a| options.includes(a.media_type))
            .cloned()
            .collect();
        if options.sort_order == SortOrder::OldestFirst {
            assets.reverse();
        }
        if let Some(limit) = options.limit {
            assets.truncate(limit);
        }
        debug!(count = assets.len(), "Fetched assets");
        AssetFetchResult::new(assets)
    }
}

/// A call made to [`VirtualImageCache`]
#[derive(Debug, Clone, PartialEq)]
pub enum CacheCall {
    Start { ids: Vec<String>, size: Size },
    Stop { ids: Vec<String>, size: Size },
    StopAll,
}

/// Records caching requests and tracks which assets are warm
#[derive(Default)]
pub struct VirtualImageCache {
    calls: Mutex<Vec<CacheCall>>,
    cached: Mutex<HashSet<String>>,
}

impl VirtualImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<CacheCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn is_cached(&self, local_identifier: &str) -> bool {
        self.cached.lock().unwrap().contains(local_identifier)
    }

    pub fn cached_count(&self) -> usize {
        self.cached.lock().unwrap().len()
    }
}

fn identifiers(assets: &[Asset]) -> Vec<String> {
    assets.iter().map(|a| a.local_identifier.clone()).collect()
}

impl ImageCacheManager for VirtualImageCache {
    fn start_caching(&self, assets: &[Asset], target_size: Size, _content_mode: ContentMode) {
        let ids = identifiers(assets);
        self.cached.lock().unwrap().extend(ids.iter().cloned());
        self.calls.lock().unwrap().push(CacheCall::Start {
            ids,
            size: target_size,
        });
    }

    fn stop_caching(&self, assets: &[Asset], target_size: Size, _content_mode: ContentMode) {
        let ids = identifiers(assets);
        {
            let mut cached = self.cached.lock().unwrap();
            for id in &ids {
                cached.remove(id);
            }
        }
        self.calls.lock().unwrap().push(CacheCall::Stop {
            ids,
            size: target_size,
        });
    }

    fn stop_caching_all(&self) {
        self.cached.lock().unwrap().clear();
        self.calls.lock().unwrap().push(CacheCall::StopAll);
    }
}
