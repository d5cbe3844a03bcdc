// SPDX-License-Identifier: GPL-3.0-only

//! Callbacks from the capture session to the presentation layer
//!
//! Every method is required. Callbacks may arrive on the session queue, the
//! pipeline's callback threads or the caller's thread; implementations hop to
//! their UI thread themselves.
//!
//! [`EventForwarder`] implements all three traits by turning each callback
//! into a [`PickerEvent`] on a tokio channel, which is the easiest way to
//! consume the session from async code.

use super::types::{AuthorizationStatus, InterruptionReason, PhotoSettings};
use crate::errors::{CaptureError, RuntimeError};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::debug;

/// Session lifecycle
pub trait SessionDelegate: Send + Sync {
    /// The pipeline confirmed it is running
    fn did_resume(&self);
    /// The pipeline confirmed it stopped
    fn did_suspend(&self);
    /// A runtime error that is not recovered automatically
    fn did_fail(&self, error: &RuntimeError);
    fn did_fail_configuring_session(&self);
    fn authorization_status_failed(&self, status: AuthorizationStatus);
    fn authorization_status_granted(&self);
    fn was_interrupted(&self, reason: InterruptionReason);
    fn interruption_did_end(&self);
}

/// Photo capture progress
pub trait PhotoCapturingDelegate: Send + Sync {
    /// The shutter fired; time for the capture animation
    fn will_capture_photo_with(&self, settings: &PhotoSettings);
    fn did_capture_photo_data(&self, data: &[u8], settings: &PhotoSettings);
    /// A live photo; `movie` is where the companion movie was recorded. The
    /// temporary file has been moved into the library or discarded by now.
    fn did_capture_photo_data_with_companion_movie(
        &self,
        data: &[u8],
        movie: &Path,
        settings: &PhotoSettings,
    );
    fn did_fail_capturing_photo_with(&self, error: &CaptureError);
    fn did_change_number_of_processing_live_photos(&self, count: usize);
}

/// Movie recording progress
pub trait VideoRecordingDelegate: Send + Sync {
    fn did_become_ready_for_video_recording(&self);
    fn did_start_video_recording(&self);
    fn did_cancel_video_recording(&self);
    fn did_finish_video_recording(&self, path: &Path);
    /// The recording stopped early but the file was usable
    fn did_interrupt_video_recording(&self, path: &Path, reason: &CaptureError);
    fn did_fail_video_recording(&self, error: &CaptureError);
}

/// One delegate callback as a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerEvent {
    // Session
    DidResume,
    DidSuspend,
    DidFail(RuntimeError),
    DidFailConfiguringSession,
    AuthorizationStatusFailed(AuthorizationStatus),
    AuthorizationStatusGranted,
    WasInterrupted(InterruptionReason),
    InterruptionDidEnd,
    // Photo
    WillCapturePhoto(PhotoSettings),
    DidCapturePhotoData {
        data: Vec<u8>,
        settings: PhotoSettings,
    },
    DidCapturePhotoDataWithCompanionMovie {
        data: Vec<u8>,
        movie: PathBuf,
        settings: PhotoSettings,
    },
    DidFailCapturingPhoto(CaptureError),
    DidChangeNumberOfProcessingLivePhotos(usize),
    // Video
    DidBecomeReadyForVideoRecording,
    DidStartVideoRecording,
    DidCancelVideoRecording,
    DidFinishVideoRecording(PathBuf),
    DidInterruptVideoRecording {
        path: PathBuf,
        reason: CaptureError,
    },
    DidFailVideoRecording(CaptureError),
}

/// Forwards every delegate callback to a channel
#[derive(Debug, Clone)]
pub struct EventForwarder {
    sender: mpsc::UnboundedSender<PickerEvent>,
}

impl EventForwarder {
    pub fn new(sender: mpsc::UnboundedSender<PickerEvent>) -> Self {
        Self { sender }
    }

    /// Create a forwarder together with the receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PickerEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }

    fn send(&self, event: PickerEvent) {
        if self.sender.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

impl SessionDelegate for EventForwarder {
    fn did_resume(&self) {
        self.send(PickerEvent::DidResume);
    }

    fn did_suspend(&self) {
        self.send(PickerEvent::DidSuspend);
    }

    fn did_fail(&self, error: &RuntimeError) {
        self.send(PickerEvent::DidFail(error.clone()));
    }

    fn did_fail_configuring_session(&self) {
        self.send(PickerEvent::DidFailConfiguringSession);
    }

    fn authorization_status_failed(&self, status: AuthorizationStatus) {
        self.send(PickerEvent::AuthorizationStatusFailed(status));
    }

    fn authorization_status_granted(&self) {
        self.send(PickerEvent::AuthorizationStatusGranted);
    }

    fn was_interrupted(&self, reason: InterruptionReason) {
        self.send(PickerEvent::WasInterrupted(reason));
    }

    fn interruption_did_end(&self) {
        self.send(PickerEvent::InterruptionDidEnd);
    }
}

impl PhotoCapturingDelegate for EventForwarder {
    fn will_capture_photo_with(&self, settings: &PhotoSettings) {
        self.send(PickerEvent::WillCapturePhoto(settings.clone()));
    }

    fn did_capture_photo_data(&self, data: &[u8], settings: &PhotoSettings) {
        self.send(PickerEvent::DidCapturePhotoData {
            data: data.to_vec(),
            settings: settings.clone(),
        });
    }

    fn did_capture_photo_data_with_companion_movie(
        &self,
        data: &[u8],
        movie: &Path,
        settings: &PhotoSettings,
    ) {
        self.send(PickerEvent::DidCapturePhotoDataWithCompanionMovie {
            data: data.to_vec(),
            movie: movie.to_path_buf(),
            settings: settings.clone(),
        });
    }

    fn did_fail_capturing_photo_with(&self, error: &CaptureError) {
        self.send(PickerEvent::DidFailCapturingPhoto(error.clone()));
    }

    fn did_change_number_of_processing_live_photos(&self, count: usize) {
        self.send(PickerEvent::DidChangeNumberOfProcessingLivePhotos(count));
    }
}

impl VideoRecordingDelegate for EventForwarder {
    fn did_become_ready_for_video_recording(&self) {
        self.send(PickerEvent::DidBecomeReadyForVideoRecording);
    }

    fn did_start_video_recording(&self) {
        self.send(PickerEvent::DidStartVideoRecording);
    }

    fn did_cancel_video_recording(&self) {
        self.send(PickerEvent::DidCancelVideoRecording);
    }

    fn did_finish_video_recording(&self, path: &Path) {
        self.send(PickerEvent::DidFinishVideoRecording(path.to_path_buf()));
    }

    fn did_interrupt_video_recording(&self, path: &Path, reason: &CaptureError) {
        self.send(PickerEvent::DidInterruptVideoRecording {
            path: path.to_path_buf(),
            reason: reason.clone(),
        });
    }

    fn did_fail_video_recording(&self, error: &CaptureError) {
        self.send(PickerEvent::DidFailVideoRecording(error.clone()));
    }
}
