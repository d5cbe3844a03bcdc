// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for the capture session

use crate::constants::capture::MOVIE_FILE_EXTENSION;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Physical side of the device a camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DevicePosition {
    Front,
    Back,
    #[default]
    Unspecified,
}

impl DevicePosition {
    /// The side a camera flip should move to
    pub fn opposite(&self) -> DevicePosition {
        match self {
            DevicePosition::Front | DevicePosition::Unspecified => DevicePosition::Back,
            DevicePosition::Back => DevicePosition::Front,
        }
    }
}

impl std::fmt::Display for DevicePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DevicePosition::Front => write!(f, "front"),
            DevicePosition::Back => write!(f, "back"),
            DevicePosition::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// Kind of camera module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    /// Wide angle and telephoto modules exposed as one device
    DualCamera,
    WideAngle,
    Telephoto,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::DualCamera => write!(f, "dual camera"),
            DeviceType::WideAngle => write!(f, "wide angle"),
            DeviceType::Telephoto => write!(f, "telephoto"),
        }
    }
}

/// A video capture device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDevice {
    pub id: String,
    pub name: String,
    pub position: DevicePosition,
    pub device_type: DeviceType,
    pub has_flash: bool,
    /// Whether movie connections fed by this device support stabilization
    pub supports_stabilization: bool,
}

/// An audio capture device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    pub id: String,
    pub name: String,
}

/// Input attached to the capture pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureInput {
    Video(CaptureDevice),
    Audio(AudioDevice),
}

impl CaptureInput {
    pub fn id(&self) -> &str {
        match self {
            CaptureInput::Video(device) => &device.id,
            CaptureInput::Audio(device) => &device.id,
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, CaptureInput::Video(_))
    }
}

/// Output attached to the capture pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    /// Still photos (and live photo companion movies)
    Photo,
    /// Movie file recording
    MovieFile,
    /// Continuous frame sampling used for the blurred placeholder
    VideoData,
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputKind::Photo => write!(f, "photo output"),
            OutputKind::MovieFile => write!(f, "movie file output"),
            OutputKind::VideoData => write!(f, "video data output"),
        }
    }
}

/// What the session is configured to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionPreset {
    /// Still photos only
    #[default]
    Photos,
    /// Still photos with live photo companion movies
    LivePhotos,
    /// Still photos and movie recording
    Videos,
}

impl SessionPreset {
    pub const ALL: [SessionPreset; 3] = [
        SessionPreset::Photos,
        SessionPreset::LivePhotos,
        SessionPreset::Videos,
    ];

    /// Movie file output is only present for video recording
    pub fn uses_movie_output(&self) -> bool {
        matches!(self, SessionPreset::Videos)
    }

    /// Live photo movies and recordings carry sound
    pub fn uses_audio(&self) -> bool {
        matches!(self, SessionPreset::LivePhotos | SessionPreset::Videos)
    }

    /// Frame sampling and movie recording cannot share the pipeline
    pub fn uses_video_data_output(&self) -> bool {
        !self.uses_movie_output()
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SessionPreset::Photos => "Photo",
            SessionPreset::LivePhotos => "Photo + Live Photo",
            SessionPreset::Videos => "Photo + Video",
        }
    }
}

/// Access status for the camera or the photo library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    NotDetermined,
    Restricted,
    Denied,
    Authorized,
}

/// Outcome of session setup, evaluated on every resume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupResult {
    Success,
    NotAuthorized,
    ConfigurationFailed,
}

/// Lifecycle of a capture session
///
/// ```text
/// Uninitialized -> Configuring -> { Ready, NotAuthorized, ConfigurationFailed }
/// Ready -> Running <-> Suspended
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Configuring,
    Ready,
    NotAuthorized,
    ConfigurationFailed,
    Running,
    Suspended,
}

/// Orientation stamped on pipeline connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoOrientation {
    #[default]
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

/// Why the system took the camera away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptionReason {
    AudioDeviceInUseByAnotherClient,
    VideoDeviceInUseByAnotherClient,
    VideoDeviceNotAvailableInBackground,
    VideoDeviceNotAvailableWithMultipleForegroundApps,
    VideoDeviceNotAvailableDueToSystemPressure,
}

/// Whether a photo request should produce a live photo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LivePhotoMode {
    On,
    #[default]
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlashMode {
    #[default]
    Off,
    On,
    Auto,
}

/// Codec of the embedded thumbnail delivered with a photo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageCodec {
    Jpeg,
    Hevc,
}

/// Pick the thumbnail codec for a photo request: JPEG when offered,
/// otherwise whatever the output lists first
pub fn negotiate_thumbnail_codec(available: &[ImageCodec]) -> Option<ImageCodec> {
    if available.contains(&ImageCodec::Jpeg) {
        Some(ImageCodec::Jpeg)
    } else {
        available.first().copied()
    }
}

/// Unique identifier of a photo request
pub type RequestId = Uuid;

/// Settings of a single photo request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoSettings {
    pub unique_id: RequestId,
    pub flash_mode: FlashMode,
    pub high_resolution_enabled: bool,
    pub thumbnail_codec: Option<ImageCodec>,
    /// Destination of the live photo companion movie, if one is requested
    pub live_photo_movie_path: Option<PathBuf>,
}

impl PhotoSettings {
    pub fn new() -> Self {
        Self {
            unique_id: Uuid::new_v4(),
            flash_mode: FlashMode::Off,
            high_resolution_enabled: false,
            thumbnail_codec: None,
            live_photo_movie_path: None,
        }
    }
}

impl Default for PhotoSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings as resolved by the photo output once the capture begins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPhotoSettings {
    pub unique_id: RequestId,
    /// Width and height of the companion movie, zero when none will be recorded
    pub live_photo_movie_dimensions: (u32, u32),
}

impl ResolvedPhotoSettings {
    pub fn expects_live_photo_movie(&self) -> bool {
        self.live_photo_movie_dimensions.0 > 0 && self.live_photo_movie_dimensions.1 > 0
    }
}

/// A frame delivered by the video data output
#[derive(Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Packed RGBA pixels
    pub data: Arc<[u8]>,
    pub orientation: VideoOrientation,
    pub captured_at: Instant,
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .field("orientation", &self.orientation)
            .finish()
    }
}

/// A fresh, randomly named movie file path inside `dir`
pub fn temporary_movie_path(dir: &Path) -> PathBuf {
    dir.join(Uuid::new_v4().to_string())
        .with_extension(MOVIE_FILE_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_outputs_are_exclusive() {
        for preset in SessionPreset::ALL {
            assert_ne!(preset.uses_movie_output(), preset.uses_video_data_output());
        }
        assert!(!SessionPreset::Photos.uses_audio());
        assert!(SessionPreset::LivePhotos.uses_audio());
    }

    #[test]
    fn test_thumbnail_codec_prefers_jpeg() {
        assert_eq!(
            negotiate_thumbnail_codec(&[ImageCodec::Hevc, ImageCodec::Jpeg]),
            Some(ImageCodec::Jpeg)
        );
        assert_eq!(
            negotiate_thumbnail_codec(&[ImageCodec::Hevc]),
            Some(ImageCodec::Hevc)
        );
        assert_eq!(negotiate_thumbnail_codec(&[]), None);
    }

    #[test]
    fn test_temporary_movie_paths_are_unique() {
        let dir = Path::new("/tmp");
        let first = temporary_movie_path(dir);
        let second = temporary_movie_path(dir);
        assert_ne!(first, second);
        assert_eq!(first.extension().and_then(|e| e.to_str()), Some("mov"));
    }

    #[test]
    fn test_opposite_position() {
        assert_eq!(DevicePosition::Front.opposite(), DevicePosition::Back);
        assert_eq!(DevicePosition::Unspecified.opposite(), DevicePosition::Back);
        assert_eq!(DevicePosition::Back.opposite(), DevicePosition::Front);
    }
}
