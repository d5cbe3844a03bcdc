// SPDX-License-Identifier: GPL-3.0-only

//! Camera capture: the session state machine and its collaborators
//!
//! [`CaptureSession`] drives a [`CapturePipeline`] from a dedicated
//! [`SessionQueue`](queue::SessionQueue) and reports back through the traits
//! in [`delegate`]. Each photo request and each recording is followed by its
//! own [`PhotoCaptureDelegate`] or [`VideoCaptureDelegate`].

pub mod delegate;
pub mod device;
pub mod lease;
pub mod photo;
pub mod pipeline;
pub mod queue;
pub mod sample_buffer;
pub mod session;
pub mod types;
pub mod video;

pub use delegate::{
    EventForwarder, PhotoCapturingDelegate, PickerEvent, SessionDelegate, VideoRecordingDelegate,
};
pub use device::{CaptureAuthorizer, DeviceDiscovery};
pub use lease::{BackgroundTaskLease, BackgroundTaskProvider};
pub use photo::PhotoCaptureDelegate;
pub use pipeline::{CapturePipeline, PipelineEvent};
pub use sample_buffer::VideoOutputSampleBufferDelegate;
pub use session::{CaptureEnvironment, CaptureSession};
pub use types::*;
pub use video::{RecordingOutcome, VideoCaptureDelegate};

use std::path::Path;
use tracing::{debug, warn};

/// Delete a temporary capture file; a file that is already gone is fine
pub(crate) fn remove_temporary_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed temporary file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove temporary file"),
    }
}
