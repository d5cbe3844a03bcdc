// SPDX-License-Identifier: GPL-3.0-only

//! Capture device selection and access
//!
//! Device enumeration and the OS permission prompt are provided by the host
//! through [`DeviceDiscovery`] and [`CaptureAuthorizer`]. The selection rules
//! for the initial camera and for camera flips live here.

use super::types::{AudioDevice, AuthorizationStatus, CaptureDevice, DevicePosition, DeviceType};
use tracing::debug;

/// Enumerates the capture devices present on the system
pub trait DeviceDiscovery: Send + Sync {
    /// All video capture devices, in the platform's discovery order
    fn video_devices(&self) -> Vec<CaptureDevice>;

    /// The default microphone, if any
    fn default_audio_device(&self) -> Option<AudioDevice>;
}

/// Camera access permission
pub trait CaptureAuthorizer: Send + Sync {
    /// Current authorization status for video capture
    fn authorization_status(&self) -> AuthorizationStatus;

    /// Show the permission prompt; `completion` receives whether access was
    /// granted and may run on any thread
    fn request_access(&self, completion: Box<dyn FnOnce(bool) + Send>);
}

/// Camera used when the session is first configured
///
/// Preference order: back dual camera, back wide angle, front wide angle.
pub fn default_video_device(discovery: &dyn DeviceDiscovery) -> Option<CaptureDevice> {
    const PREFERENCE: [(DevicePosition, DeviceType); 3] = [
        (DevicePosition::Back, DeviceType::DualCamera),
        (DevicePosition::Back, DeviceType::WideAngle),
        (DevicePosition::Front, DeviceType::WideAngle),
    ];

    let devices = discovery.video_devices();
    let device = PREFERENCE.iter().find_map(|(position, device_type)| {
        devices
            .iter()
            .find(|d| d.position == *position && d.device_type == *device_type)
            .cloned()
    });

    if let Some(ref device) = device {
        debug!(device = %device.name, position = %device.position, "Selected default video device");
    }
    device
}

/// Camera to switch to when flipping away from `current`
///
/// Looks on the opposite side for the preferred module type first (dual camera
/// on the back, wide angle on the front), then for any device on that side.
pub fn preferred_alternate(
    discovery: &dyn DeviceDiscovery,
    current: &CaptureDevice,
) -> Option<CaptureDevice> {
    let position = current.position.opposite();
    let preferred_type = match position {
        DevicePosition::Back => DeviceType::DualCamera,
        _ => DeviceType::WideAngle,
    };

    let devices = discovery.video_devices();
    devices
        .iter()
        .find(|d| d.position == position && d.device_type == preferred_type)
        .or_else(|| devices.iter().find(|d| d.position == position))
        .cloned()
}
