// SPDX-License-Identifier: GPL-3.0-only

//! Per-recording movie handling
//!
//! A [`VideoCaptureDelegate`] owns one recording from start to finish. It
//! holds a background execution lease for the whole recording so the file is
//! finalized even if the app leaves the foreground, saves the movie to the
//! library when asked to, and always deletes the temporary file and releases
//! the lease before reporting the [`RecordingOutcome`].

use super::lease::{BackgroundTaskLease, BackgroundTaskProvider};
use super::pipeline::RecordingHandler;
use super::types::AuthorizationStatus;
use crate::errors::CaptureError;
use crate::library::PhotoLibrary;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How a recording ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingOutcome {
    Finished(PathBuf),
    Cancelled,
    /// Stopped early by an error, but the file was finalized
    Interrupted { path: PathBuf, reason: CaptureError },
    Failed(CaptureError),
}

/// Called when the recorder started writing
pub type RecordingStartedCallback = Box<dyn Fn() + Send + Sync>;
/// Called once when the recording is over
pub type RecordingCompletion = Box<dyn FnOnce(&VideoCaptureDelegate, RecordingOutcome) + Send>;

#[derive(Debug, Default)]
struct VideoState {
    is_being_cancelled: bool,
    recording_was_interrupted: bool,
    error: Option<CaptureError>,
}

pub struct VideoCaptureDelegate {
    id: Uuid,
    saves_to_library: bool,
    library: Arc<dyn PhotoLibrary>,
    lease: Mutex<BackgroundTaskLease>,
    state: Mutex<VideoState>,
    did_start: RecordingStartedCallback,
    completion: Mutex<Option<RecordingCompletion>>,
}

impl VideoCaptureDelegate {
    pub fn new(
        saves_to_library: bool,
        library: Arc<dyn PhotoLibrary>,
        background_tasks: Arc<dyn BackgroundTaskProvider>,
        did_start: RecordingStartedCallback,
        completion: RecordingCompletion,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            saves_to_library,
            library,
            lease: Mutex::new(BackgroundTaskLease::acquire(background_tasks)),
            state: Mutex::new(VideoState::default()),
            did_start,
            completion: Mutex::new(Some(completion)),
        }
    }

    /// Identity of this recording
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Discard the file once the recorder stops
    pub fn cancel(&self) {
        debug!(id = %self.id, "Cancelling recording");
        self.state.lock().unwrap().is_being_cancelled = true;
    }

    pub fn is_being_cancelled(&self) -> bool {
        self.state.lock().unwrap().is_being_cancelled
    }

    pub fn recording_was_interrupted(&self) -> bool {
        self.state.lock().unwrap().recording_was_interrupted
    }

    pub fn error(&self) -> Option<CaptureError> {
        self.state.lock().unwrap().error.clone()
    }

    fn save_to_library(&self, path: &Path) {
        match self.library.request_authorization() {
            AuthorizationStatus::Authorized => {}
            status => {
                warn!(?status, "Photo library access not granted, video not saved");
                return;
            }
        }

        match self.library.create_video_asset(path) {
            Ok(asset) => info!(asset = %asset.local_identifier, "Saved video to library"),
            Err(e) => error!(error = %e, "Failed to save video to library"),
        }
    }

    fn cleanup(&self, path: &Path) {
        super::remove_temporary_file(path);
        self.lease.lock().unwrap().release();
    }

    fn finish(&self, path: &Path, outcome: RecordingOutcome) {
        self.cleanup(path);
        let completion = self.completion.lock().unwrap().take();
        match completion {
            Some(completion) => completion(self, outcome),
            None => warn!(id = %self.id, "Recording completed twice"),
        }
    }
}

impl RecordingHandler for VideoCaptureDelegate {
    fn did_start_recording(&self, path: &Path) {
        debug!(id = %self.id, path = %path.display(), "Recording started");
        (self.did_start)();
    }

    fn did_finish_recording(&self, path: &Path, error: Option<CaptureError>) {
        let cancelled = self.is_being_cancelled();

        if cancelled {
            if let Some(e) = &error {
                debug!(error = %e, "Cancelled recording finished with error");
            }
            self.finish(path, RecordingOutcome::Cancelled);
            return;
        }

        if let Some(e) = error {
            let usable = e.recording_successfully_finished();
            {
                let mut state = self.state.lock().unwrap();
                state.recording_was_interrupted = usable;
                state.error = Some(e.clone());
            }

            if usable {
                warn!(error = %e, "Recording interrupted, keeping finalized file");
                if self.saves_to_library {
                    self.save_to_library(path);
                }
                self.finish(
                    path,
                    RecordingOutcome::Interrupted {
                        path: path.to_path_buf(),
                        reason: e,
                    },
                );
            } else {
                error!(error = %e, "Recording failed");
                self.finish(path, RecordingOutcome::Failed(e));
            }
            return;
        }

        if self.saves_to_library {
            self.save_to_library(path);
        }
        self.finish(path, RecordingOutcome::Finished(path.to_path_buf()));
    }
}

impl std::fmt::Debug for VideoCaptureDelegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoCaptureDelegate")
            .field("id", &self.id)
            .field("saves_to_library", &self.saves_to_library)
            .field("state", &*self.state.lock().unwrap())
            .finish()
    }
}
