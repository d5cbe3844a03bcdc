// SPDX-License-Identifier: GPL-3.0-only

//! Engine-wide constants

/// Capture pipeline constants
pub mod capture {
    /// Extension of temporary recording and live-photo companion files
    pub const MOVIE_FILE_EXTENSION: &str = "mov";

    /// Name of the dedicated session work queue thread
    pub const SESSION_QUEUE_NAME: &str = "image-picker-session";
}

/// Asset grid caching constants
pub mod preheat {
    /// Fraction of the visible extent added on each side of the scroll axis
    pub const EXPANSION_FACTOR: f64 = 0.75;

    /// Fraction of the visible extent the preheat midpoint must move before
    /// the cache is updated again
    pub const UPDATE_THRESHOLD_FACTOR: f64 = 1.0 / 3.0;
}

/// Grid layout constants
pub mod layout {
    /// Section holding the action cells
    pub const SECTION_INDEX_ACTIONS: usize = 0;

    /// Section holding the camera preview cell
    pub const SECTION_INDEX_CAMERA: usize = 1;

    /// Section holding the photo library assets
    pub const SECTION_INDEX_ASSETS: usize = 2;

    /// Default number of asset cells per line across the scroll axis
    pub const DEFAULT_ASSET_ITEMS_PER_LINE: usize = 2;

    /// Default spacing between cells in points
    pub const DEFAULT_INTERITEM_SPACING: f64 = 1.0;

    /// Default spacing between the action/camera sections and the assets
    pub const DEFAULT_ACTION_SECTION_SPACING: f64 = 1.0;
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }

    /// Directory name used under the platform config directory
    pub const CONFIG_DIR_NAME: &str = "image-picker";

    /// Config file name
    pub const CONFIG_FILE_NAME: &str = "config.json";
}
