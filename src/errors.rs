// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the picker engine
//!
//! Errors are grouped the same way they are handled:
//!
//! - [`ConfigurationError`]: a pipeline component could not be added while
//!   configuring the session. Each one is either a warning (logged, setup
//!   continues) or fatal (setup aborts).
//! - [`RuntimeError`]: the pipeline reported a fault while running. Only
//!   [`RuntimeError::MediaServicesWereReset`] is retried automatically.
//! - [`CaptureError`]: a single photo request or recording failed. Always
//!   routed to the request's own delegate.
//! - [`LibraryError`]: saving to the photo library failed. Logged, never
//!   blocks completion.

use std::path::PathBuf;

/// Result type alias using PickerError
pub type PickerResult<T> = Result<T, PickerError>;

/// Top-level error for operations outside the capture callbacks
#[derive(Debug, thiserror::Error)]
pub enum PickerError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),
    #[error("Photo library error: {0}")]
    Library(#[from] LibraryError),
    #[error("Failed to read config: {0}")]
    ConfigFile(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

impl From<String> for PickerError {
    fn from(msg: String) -> Self {
        PickerError::Other(msg)
    }
}

impl From<&str> for PickerError {
    fn from(msg: &str) -> Self {
        PickerError::Other(msg.to_string())
    }
}

/// How a configuration failure affects session setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Logged; configuration continues without the component
    Warning,
    /// Configuration aborts and the session is marked as failed
    Fatal,
}

/// A pipeline component that could not be set up
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("no video capture device is available")]
    NoVideoDevice,
    #[error("could not add video device input '{0}' to the session")]
    CannotAddVideoInput(String),
    #[error("could not add movie file output to the session")]
    CannotAddMovieOutput,
    #[error("no audio capture device is available")]
    NoAudioDevice,
    #[error("could not add audio device input '{0}' to the session")]
    CannotAddAudioInput(String),
    #[error("could not add photo output to the session")]
    CannotAddPhotoOutput,
    #[error("could not add video data output to the session")]
    CannotAddVideoDataOutput,
    #[error("live photo capture is not supported by the device")]
    LivePhotoUnsupported,
}

impl ConfigurationError {
    /// Classify the failure
    pub fn severity(&self) -> Severity {
        match self {
            ConfigurationError::NoVideoDevice
            | ConfigurationError::CannotAddVideoInput(_)
            | ConfigurationError::CannotAddMovieOutput
            | ConfigurationError::CannotAddPhotoOutput => Severity::Fatal,
            ConfigurationError::NoAudioDevice
            | ConfigurationError::CannotAddAudioInput(_)
            | ConfigurationError::CannotAddVideoDataOutput
            | ConfigurationError::LivePhotoUnsupported => Severity::Warning,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

/// Fault reported by a running pipeline
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// The media services daemon restarted; the pipeline can simply be started again
    #[error("media services were reset")]
    MediaServicesWereReset,
    #[error("capture device was disconnected")]
    DeviceDisconnected,
    #[error("capture pipeline failed: {0}")]
    Other(String),
}

impl RuntimeError {
    /// Whether restarting the pipeline is expected to recover from this error
    pub fn is_transient_reset(&self) -> bool {
        matches!(self, RuntimeError::MediaServicesWereReset)
    }
}

/// Failure of a single photo request or recording
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("photo capture failed: {0}")]
    PhotoFailed(String),
    #[error("photo capture finished without photo data")]
    NoPhotoData,
    /// Recording stopped with an error. When `successfully_finished` is set the
    /// movie file was still finalized and is usable.
    #[error("movie recording failed: {message}")]
    Recording {
        message: String,
        successfully_finished: bool,
    },
}

impl CaptureError {
    /// True when a recording error still left a playable file behind
    pub fn recording_successfully_finished(&self) -> bool {
        matches!(
            self,
            CaptureError::Recording {
                successfully_finished: true,
                ..
            }
        )
    }
}

/// Failure while writing to the photo library
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LibraryError {
    #[error("photo library access is not authorized")]
    NotAuthorized,
    #[error("resource file {0} does not exist")]
    MissingResource(PathBuf),
    #[error("failed to save asset: {0}")]
    SaveFailed(String),
}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::SaveFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_configuration_errors() {
        assert!(ConfigurationError::NoVideoDevice.is_fatal());
        assert!(ConfigurationError::CannotAddMovieOutput.is_fatal());
        assert!(ConfigurationError::CannotAddPhotoOutput.is_fatal());
        assert!(!ConfigurationError::CannotAddAudioInput("mic".into()).is_fatal());
        assert!(!ConfigurationError::CannotAddVideoDataOutput.is_fatal());
    }

    #[test]
    fn test_only_reset_is_transient() {
        assert!(RuntimeError::MediaServicesWereReset.is_transient_reset());
        assert!(!RuntimeError::DeviceDisconnected.is_transient_reset());
        assert!(!RuntimeError::Other("boom".into()).is_transient_reset());
    }

    #[test]
    fn test_recording_finished_flag() {
        let usable = CaptureError::Recording {
            message: "disk full".into(),
            successfully_finished: true,
        };
        assert!(usable.recording_successfully_finished());
        assert!(!CaptureError::NoPhotoData.recording_successfully_finished());
    }
}
