// SPDX-License-Identifier: GPL-3.0-only

//! Virtual capture backend
//!
//! Software implementations of every host service the engine needs. They
//! back the command line tool and the test suite, and double as a reference
//! for platform backends.
//!
//! # Components
//!
//! - [`VirtualPipeline`]: capture graph with transactional configuration
//! - [`VirtualDiscovery`]: a fixed set of cameras and a microphone
//! - [`VirtualAuthorizer`]: camera permission with an optional pending prompt
//! - [`VirtualLibrary`] / [`VirtualImageCache`]: photo library and thumbnails
//! - [`VirtualBackgroundTasks`]: background execution grants
//! - [`VirtualCollectionView`]: grid view that logs its mutations

mod collection_view;
mod library;
mod pipeline;

pub use collection_view::{ViewCall, VirtualCollectionView};
pub use library::{CacheCall, VirtualImageCache, VirtualLibrary};
pub use pipeline::{PipelineStats, VirtualPipeline};

use crate::capture::device::{CaptureAuthorizer, DeviceDiscovery};
use crate::capture::lease::{BackgroundTaskId, BackgroundTaskProvider};
use crate::capture::session::CaptureEnvironment;
use crate::capture::types::{
    AudioDevice, AuthorizationStatus, CaptureDevice, DevicePosition, DeviceType,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

// ===== Devices =====

/// Fixed device list
pub struct VirtualDiscovery {
    video: Mutex<Vec<CaptureDevice>>,
    audio: Mutex<Option<AudioDevice>>,
}

impl VirtualDiscovery {
    /// Back dual camera, back wide angle, front wide angle and a microphone
    pub fn standard() -> Self {
        Self::with_devices(
            vec![
                virtual_device(
                    "back-dual",
                    "Back Dual Camera",
                    DevicePosition::Back,
                    DeviceType::DualCamera,
                ),
                virtual_device(
                    "back-wide",
                    "Back Camera",
                    DevicePosition::Back,
                    DeviceType::WideAngle,
                ),
                virtual_device(
                    "front-wide",
                    "Front Camera",
                    DevicePosition::Front,
                    DeviceType::WideAngle,
                ),
            ],
            Some(AudioDevice {
                id: "mic".into(),
                name: "Built-in Microphone".into(),
            }),
        )
    }

    pub fn with_devices(video: Vec<CaptureDevice>, audio: Option<AudioDevice>) -> Self {
        Self {
            video: Mutex::new(video),
            audio: Mutex::new(audio),
        }
    }

    /// Unplug a camera
    pub fn remove_video_device(&self, id: &str) {
        self.video.lock().unwrap().retain(|d| d.id != id);
    }

    pub fn set_audio_device(&self, audio: Option<AudioDevice>) {
        *self.audio.lock().unwrap() = audio;
    }
}

/// A camera the virtual backend can expose
pub fn virtual_device(
    id: &str,
    name: &str,
    position: DevicePosition,
    device_type: DeviceType,
) -> CaptureDevice {
    CaptureDevice {
        id: id.to_string(),
        name: name.to_string(),
        position,
        device_type,
        has_flash: position == DevicePosition::Back,
        supports_stabilization: position == DevicePosition::Back,
    }
}

impl DeviceDiscovery for VirtualDiscovery {
    fn video_devices(&self) -> Vec<CaptureDevice> {
        self.video.lock().unwrap().clone()
    }

    fn default_audio_device(&self) -> Option<AudioDevice> {
        self.audio.lock().unwrap().clone()
    }
}

// ===== Authorization =====

type AccessCompletion = Box<dyn FnOnce(bool) + Send>;

/// Camera permission
///
/// With an automatic answer the prompt is resolved on a separate thread, like
/// a system dialog would be. Without one the prompt stays open until
/// [`answer`](Self::answer) is called.
pub struct VirtualAuthorizer {
    status: Mutex<AuthorizationStatus>,
    auto_answer: Mutex<Option<bool>>,
    pending: Mutex<Option<AccessCompletion>>,
    requests: AtomicUsize,
}

impl VirtualAuthorizer {
    pub fn new(status: AuthorizationStatus) -> Self {
        Self {
            status: Mutex::new(status),
            auto_answer: Mutex::new(None),
            pending: Mutex::new(None),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn authorized() -> Self {
        Self::new(AuthorizationStatus::Authorized)
    }

    /// Undetermined access that the prompt resolves to `granted`
    pub fn prompting(granted: bool) -> Self {
        let authorizer = Self::new(AuthorizationStatus::NotDetermined);
        *authorizer.auto_answer.lock().unwrap() = Some(granted);
        authorizer
    }

    /// Resolve an open prompt; returns false when none is open
    pub fn answer(&self, granted: bool) -> bool {
        let completion = self.pending.lock().unwrap().take();
        match completion {
            Some(completion) => {
                *self.status.lock().unwrap() = granted_status(granted);
                completion(granted);
                true
            }
            None => false,
        }
    }

    pub fn has_pending_request(&self) -> bool {
        self.pending.lock().unwrap().is_some()
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

fn granted_status(granted: bool) -> AuthorizationStatus {
    if granted {
        AuthorizationStatus::Authorized
    } else {
        AuthorizationStatus::Denied
    }
}

impl CaptureAuthorizer for VirtualAuthorizer {
    fn authorization_status(&self) -> AuthorizationStatus {
        *self.status.lock().unwrap()
    }

    fn request_access(&self, completion: AccessCompletion) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let answer = *self.auto_answer.lock().unwrap();
        match answer {
            Some(granted) => {
                *self.status.lock().unwrap() = granted_status(granted);
                debug!(granted, "Answering camera access prompt");
                std::thread::spawn(move || completion(granted));
            }
            None => *self.pending.lock().unwrap() = Some(completion),
        }
    }
}

// ===== Background execution =====

pub struct VirtualBackgroundTasks {
    multitasking: bool,
    next_id: AtomicU64,
    active: Mutex<HashSet<BackgroundTaskId>>,
}

impl Default for VirtualBackgroundTasks {
    fn default() -> Self {
        Self::new(true)
    }
}

impl VirtualBackgroundTasks {
    pub fn new(multitasking: bool) -> Self {
        Self {
            multitasking,
            next_id: AtomicU64::new(1),
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Grants handed out and not yet returned
    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }

    /// Grants handed out in total
    pub fn granted_count(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst) - 1
    }
}

impl BackgroundTaskProvider for VirtualBackgroundTasks {
    fn is_multitasking_supported(&self) -> bool {
        self.multitasking
    }

    fn begin_background_task(&self) -> Option<BackgroundTaskId> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.active.lock().unwrap().insert(id);
        Some(id)
    }

    fn end_background_task(&self, id: BackgroundTaskId) {
        self.active.lock().unwrap().remove(&id);
    }
}

// ===== Environment =====

/// Every virtual service, with concrete types kept for inspection
#[derive(Clone)]
pub struct VirtualEnvironment {
    pub pipeline: Arc<VirtualPipeline>,
    pub discovery: Arc<VirtualDiscovery>,
    pub authorizer: Arc<VirtualAuthorizer>,
    pub library: Arc<VirtualLibrary>,
    pub background_tasks: Arc<VirtualBackgroundTasks>,
}

impl Default for VirtualEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualEnvironment {
    /// Authorized access to the standard devices and an empty library
    pub fn new() -> Self {
        Self::with_authorizer(VirtualAuthorizer::authorized())
    }

    pub fn with_authorizer(authorizer: VirtualAuthorizer) -> Self {
        Self {
            pipeline: Arc::new(VirtualPipeline::new()),
            discovery: Arc::new(VirtualDiscovery::standard()),
            authorizer: Arc::new(authorizer),
            library: Arc::new(VirtualLibrary::new()),
            background_tasks: Arc::new(VirtualBackgroundTasks::default()),
        }
    }

    /// Type-erased handles for [`CaptureSession::new`](crate::capture::CaptureSession::new)
    pub fn capture_environment(&self) -> CaptureEnvironment {
        CaptureEnvironment {
            pipeline: self.pipeline.clone(),
            discovery: self.discovery.clone(),
            authorizer: self.authorizer.clone(),
            library: self.library.clone(),
            background_tasks: self.background_tasks.clone(),
        }
    }
}
