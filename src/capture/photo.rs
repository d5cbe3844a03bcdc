// SPDX-License-Identifier: GPL-3.0-only

//! Per-request photo capture handling
//!
//! One [`PhotoCaptureDelegate`] follows a single photo request through the
//! pipeline: it collects the photo bytes and the optional live photo
//! companion movie, saves both to the library when asked to and removes the
//! temporary movie afterwards. The owner hears about the request through three
//! callbacks: the shutter moment, live photo recording start/stop and the
//! final completion, which always fires exactly once.

use super::pipeline::PhotoCaptureHandler;
use super::types::{AuthorizationStatus, PhotoSettings, ResolvedPhotoSettings};
use crate::errors::CaptureError;
use crate::library::PhotoLibrary;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Called when the shutter fires
pub type WillCaptureCallback = Box<dyn Fn(&PhotoSettings) + Send + Sync>;
/// Called with `true` when a live photo movie starts recording and `false` when it stops
pub type LivePhotoCallback = Box<dyn Fn(bool) + Send + Sync>;
/// Called once when the request is over
pub type PhotoCompletion = Box<dyn FnOnce(&PhotoCaptureDelegate) + Send>;

#[derive(Default)]
struct PhotoState {
    photo_data: Option<Vec<u8>>,
    live_photo_movie_path: Option<PathBuf>,
    error: Option<CaptureError>,
    /// A live photo movie is being recorded and not yet accounted for
    capturing_live_photo: bool,
}

pub struct PhotoCaptureDelegate {
    requested_settings: PhotoSettings,
    saves_to_library: bool,
    library: Arc<dyn PhotoLibrary>,
    will_capture: WillCaptureCallback,
    capturing_live_photo: LivePhotoCallback,
    completion: Mutex<Option<PhotoCompletion>>,
    state: Mutex<PhotoState>,
}

impl PhotoCaptureDelegate {
    pub fn new(
        requested_settings: PhotoSettings,
        saves_to_library: bool,
        library: Arc<dyn PhotoLibrary>,
        will_capture: WillCaptureCallback,
        capturing_live_photo: LivePhotoCallback,
        completion: PhotoCompletion,
    ) -> Self {
        Self {
            requested_settings,
            saves_to_library,
            library,
            will_capture,
            capturing_live_photo,
            completion: Mutex::new(Some(completion)),
            state: Mutex::new(PhotoState::default()),
        }
    }

    pub fn requested_settings(&self) -> &PhotoSettings {
        &self.requested_settings
    }

    pub fn photo_data(&self) -> Option<Vec<u8>> {
        self.state.lock().unwrap().photo_data.clone()
    }

    /// Where the companion movie was written; the file itself is gone once
    /// the request completed
    pub fn live_photo_companion_movie_path(&self) -> Option<PathBuf> {
        self.state.lock().unwrap().live_photo_movie_path.clone()
    }

    pub fn error(&self) -> Option<CaptureError> {
        self.state.lock().unwrap().error.clone()
    }

    fn end_live_photo(&self) {
        let was_capturing = std::mem::take(&mut self.state.lock().unwrap().capturing_live_photo);
        if was_capturing {
            (self.capturing_live_photo)(false);
        }
    }

    fn save_to_library(&self, photo: &[u8], movie: Option<&Path>) {
        match self.library.request_authorization() {
            AuthorizationStatus::Authorized => {}
            status => {
                warn!(?status, "Photo library access not granted, photo not saved");
                return;
            }
        }

        match self.library.create_photo_asset(photo, movie) {
            Ok(asset) => {
                info!(
                    asset = %asset.local_identifier,
                    live = movie.is_some(),
                    "Saved photo to library"
                )
            }
            Err(e) => error!(error = %e, "Failed to save photo to library"),
        }
    }

    fn cleanup(&self) {
        let recorded = self.state.lock().unwrap().live_photo_movie_path.clone();
        if let Some(path) = &recorded {
            super::remove_temporary_file(path);
        }
        if let Some(path) = &self.requested_settings.live_photo_movie_path
            && recorded.as_ref() != Some(path)
        {
            super::remove_temporary_file(path);
        }
    }

    fn complete(&self) {
        self.end_live_photo();
        let completion = self.completion.lock().unwrap().take();
        match completion {
            Some(completion) => completion(self),
            None => warn!(id = %self.requested_settings.unique_id, "Photo request completed twice"),
        }
    }
}

impl PhotoCaptureHandler for PhotoCaptureDelegate {
    fn will_begin_capture(&self, resolved: &ResolvedPhotoSettings) {
        if resolved.expects_live_photo_movie() {
            self.state.lock().unwrap().capturing_live_photo = true;
            (self.capturing_live_photo)(true);
        }
    }

    fn will_capture_photo(&self, _resolved: &ResolvedPhotoSettings) {
        (self.will_capture)(&self.requested_settings);
    }

    fn did_finish_processing_photo(&self, result: Result<Vec<u8>, CaptureError>) {
        let mut state = self.state.lock().unwrap();
        match result {
            Ok(data) => state.photo_data = Some(data),
            Err(e) => {
                error!(error = %e, "Error capturing photo");
                state.error = Some(e);
            }
        }
    }

    fn did_finish_recording_live_photo_movie(&self, _resolved: &ResolvedPhotoSettings) {
        self.end_live_photo();
    }

    fn did_finish_processing_live_photo_movie(
        &self,
        path: &Path,
        result: Result<(), CaptureError>,
    ) {
        match result {
            Ok(()) => self.state.lock().unwrap().live_photo_movie_path = Some(path.to_path_buf()),
            Err(e) => error!(
                error = %e,
                path = %path.display(),
                "Error processing live photo companion movie"
            ),
        }
    }

    fn did_finish_capture(&self, _resolved: &ResolvedPhotoSettings, error: Option<CaptureError>) {
        if let Some(e) = error {
            error!(error = %e, "Error capturing photo");
            self.state.lock().unwrap().error = Some(e);
            self.cleanup();
            self.complete();
            return;
        }

        let (photo, movie) = {
            let mut state = self.state.lock().unwrap();
            if state.error.is_none() && state.photo_data.is_none() {
                state.error = Some(CaptureError::NoPhotoData);
            }
            (state.photo_data.clone(), state.live_photo_movie_path.clone())
        };

        let Some(photo) = photo else {
            warn!("No photo data resource");
            self.cleanup();
            self.complete();
            return;
        };

        if self.saves_to_library {
            self.save_to_library(&photo, movie.as_deref());
        } else {
            debug!(id = %self.requested_settings.unique_id, "Not saving photo to library");
        }
        self.cleanup();
        self.complete();
    }
}

impl std::fmt::Debug for PhotoCaptureDelegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhotoCaptureDelegate")
            .field("id", &self.requested_settings.unique_id)
            .field("saves_to_library", &self.saves_to_library)
            .finish()
    }
}
