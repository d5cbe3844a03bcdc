// SPDX-License-Identifier: GPL-3.0-only

//! Image Picker - capture session and asset grid engine
//!
//! This library provides the logic behind an embeddable photo and video
//! picker: a grid of action cells, a live camera cell and the photo library,
//! backed by a device capture pipeline.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`capture`]: Capture session state machine and per-request delegates
//! - [`grid`]: Thumbnail preheating and serialized grid updates
//! - [`library`]: Photo library and image cache abstraction
//! - [`backends`]: Host service implementations (virtual backend)
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```ignore
//! use image_picker::backends::virtual_camera::VirtualEnvironment;
//! use image_picker::{CaptureSession, Config, EventForwarder};
//! use std::sync::Arc;
//!
//! let env = VirtualEnvironment::new();
//! let session = CaptureSession::new(env.capture_environment(), &Config::default().capture)?;
//! let (forwarder, mut events) = EventForwarder::channel();
//! session.set_delegates(Arc::new(forwarder));
//! session.prepare();
//! session.resume();
//! ```

pub mod backends;
pub mod capture;
pub mod config;
pub mod constants;
pub mod errors;
pub mod grid;
pub mod library;

// Re-export commonly used types
pub use capture::{
    CaptureEnvironment, CaptureSession, EventForwarder, LivePhotoMode, PickerEvent, SessionPreset,
};
pub use config::Config;
pub use errors::{PickerError, PickerResult};
pub use grid::{CollectionViewUpdatesCoordinator, ImagePickerAssetCacheItem};
