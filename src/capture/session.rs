// SPDX-License-Identifier: GPL-3.0-only

//! Capture session state machine
//!
//! ```text
//! Uninitialized -> Configuring -> { Ready, NotAuthorized, ConfigurationFailed }
//! Ready -> Running <-> Suspended
//! ```
//!
//! Every pipeline mutation happens on the session's own [`SessionQueue`]. The
//! public methods only record what they need from the caller's thread and
//! enqueue the rest, so none of them blocks on the hardware. Shared session
//! data sits behind one mutex that is never held while calling into the
//! pipeline or a delegate.
//!
//! The running state reported to the [`SessionDelegate`] comes exclusively
//! from the pipeline's own running-change events, deduplicated so the same
//! state is never reported twice in a row.

use super::delegate::{PhotoCapturingDelegate, SessionDelegate, VideoRecordingDelegate};
use super::device::{self, CaptureAuthorizer, DeviceDiscovery};
use super::lease::BackgroundTaskProvider;
use super::photo::{LivePhotoCallback, PhotoCaptureDelegate, PhotoCompletion, WillCaptureCallback};
use super::pipeline::{
    CapturePipeline, FocusPoint, ObserverToken, PipelineEvent, SampleBufferHandler,
};
use super::queue::SessionQueue;
use super::sample_buffer::VideoOutputSampleBufferDelegate;
use super::types::{
    AudioDevice, AuthorizationStatus, CaptureDevice, CaptureInput, FlashMode, LivePhotoMode,
    OutputKind, PhotoSettings, RequestId, SessionPreset, SessionState, SetupResult, VideoFrame,
    VideoOrientation, negotiate_thumbnail_codec, temporary_movie_path,
};
use super::video::{
    RecordingCompletion, RecordingOutcome, RecordingStartedCallback, VideoCaptureDelegate,
};
use crate::config::CaptureSettings;
use crate::constants::capture::SESSION_QUEUE_NAME;
use crate::errors::{ConfigurationError, PickerError, PickerResult, RuntimeError, Severity};
use crate::library::PhotoLibrary;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Host services the session runs against
#[derive(Clone)]
pub struct CaptureEnvironment {
    pub pipeline: Arc<dyn CapturePipeline>,
    pub discovery: Arc<dyn DeviceDiscovery>,
    pub authorizer: Arc<dyn CaptureAuthorizer>,
    pub library: Arc<dyn PhotoLibrary>,
    pub background_tasks: Arc<dyn BackgroundTaskProvider>,
}

struct SessionData {
    state: SessionState,
    setup_result: SetupResult,
    authorization_status: AuthorizationStatus,
    /// Whether the session asked the pipeline to run
    is_session_running: bool,
    /// Last running state reported to the delegate
    reported_running: bool,
    video_device: Option<CaptureDevice>,
    audio_device: Option<AudioDevice>,
    has_movie_output: bool,
    has_photo_output: bool,
    has_video_data_output: bool,
    observer_token: Option<ObserverToken>,
    /// Orientation of the preview connection, `None` while no preview is attached
    preview_orientation: Option<VideoOrientation>,
    in_progress_photo_captures: HashMap<RequestId, Arc<PhotoCaptureDelegate>>,
    processing_live_photos: usize,
    recording: Option<Arc<VideoCaptureDelegate>>,
}

impl SessionData {
    fn new() -> Self {
        Self {
            state: SessionState::Uninitialized,
            setup_result: SetupResult::Success,
            authorization_status: AuthorizationStatus::NotDetermined,
            is_session_running: false,
            reported_running: false,
            video_device: None,
            audio_device: None,
            has_movie_output: false,
            has_photo_output: false,
            has_video_data_output: false,
            observer_token: None,
            preview_orientation: None,
            in_progress_photo_captures: HashMap::new(),
            processing_live_photos: 0,
            recording: None,
        }
    }
}

#[derive(Default)]
struct Delegates {
    session: Option<Arc<dyn SessionDelegate>>,
    photo: Option<Arc<dyn PhotoCapturingDelegate>>,
    video: Option<Arc<dyn VideoRecordingDelegate>>,
}

/// Components added by a successful configuration pass
struct ConfiguredComponents {
    video_device: CaptureDevice,
    audio_device: Option<AudioDevice>,
    has_movie_output: bool,
    has_video_data_output: bool,
}

/// Log a warning-level configuration failure and carry on; fatal ones propagate
fn tolerate<T>(result: Result<T, ConfigurationError>) -> Result<Option<T>, ConfigurationError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.severity() == Severity::Warning => {
            warn!(error = %e, "Continuing session configuration without component");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

struct SessionInner {
    env: CaptureEnvironment,
    preset: SessionPreset,
    temp_dir: PathBuf,
    queue: SessionQueue,
    data: Mutex<SessionData>,
    delegates: Mutex<Delegates>,
    sample_buffer: Arc<VideoOutputSampleBufferDelegate>,
    weak_self: Weak<SessionInner>,
}

impl SessionInner {
    /// Run `job` on the session queue if the session still exists by then
    fn dispatch_with<F>(&self, job: F)
    where
        F: FnOnce(&SessionInner) + Send + 'static,
    {
        let weak = self.weak_self.clone();
        self.queue.dispatch(move || {
            if let Some(inner) = weak.upgrade() {
                job(&inner);
            }
        });
    }

    fn session_delegate(&self) -> Option<Arc<dyn SessionDelegate>> {
        self.delegates.lock().unwrap().session.clone()
    }

    fn photo_delegate(&self) -> Option<Arc<dyn PhotoCapturingDelegate>> {
        self.delegates.lock().unwrap().photo.clone()
    }

    fn video_delegate(&self) -> Option<Arc<dyn VideoRecordingDelegate>> {
        self.delegates.lock().unwrap().video.clone()
    }

    fn preview_orientation(&self) -> Option<VideoOrientation> {
        self.data.lock().unwrap().preview_orientation
    }

    // ===== Configuration =====

    fn configure_session(&self) {
        let setup_result = self.data.lock().unwrap().setup_result;
        if setup_result != SetupResult::Success {
            debug!(?setup_result, "Skipping session configuration");
            self.data.lock().unwrap().state = SessionState::NotAuthorized;
            return;
        }

        info!(preset = ?self.preset, "Configuring capture session");
        self.env.pipeline.begin_configuration();

        match self.add_components() {
            Ok(components) => {
                self.env.pipeline.commit_configuration();
                let has_movie_output = components.has_movie_output;
                {
                    let mut data = self.data.lock().unwrap();
                    data.video_device = Some(components.video_device);
                    data.audio_device = components.audio_device;
                    data.has_movie_output = components.has_movie_output;
                    data.has_photo_output = true;
                    data.has_video_data_output = components.has_video_data_output;
                    data.state = SessionState::Ready;
                }
                info!("Capture session configured");

                if has_movie_output && let Some(delegate) = self.video_delegate() {
                    delegate.did_become_ready_for_video_recording();
                }
            }
            Err(e) => {
                error!(error = %e, "Could not configure capture session");
                self.env.pipeline.rollback_configuration();
                let mut data = self.data.lock().unwrap();
                data.setup_result = SetupResult::ConfigurationFailed;
                data.state = SessionState::ConfigurationFailed;
            }
        }
    }

    fn add_components(&self) -> Result<ConfiguredComponents, ConfigurationError> {
        let pipeline = &self.env.pipeline;

        let video_device = device::default_video_device(self.env.discovery.as_ref())
            .ok_or(ConfigurationError::NoVideoDevice)?;
        if !pipeline.add_input(&CaptureInput::Video(video_device.clone())) {
            return Err(ConfigurationError::CannotAddVideoInput(video_device.name.clone()));
        }
        info!(device = %video_device.name, position = %video_device.position, "Added video input");

        let has_movie_output = self.preset.uses_movie_output();
        if has_movie_output {
            if !pipeline.add_output(OutputKind::MovieFile) {
                return Err(ConfigurationError::CannotAddMovieOutput);
            }
            if pipeline.is_stabilization_supported(OutputKind::MovieFile) {
                pipeline.enable_auto_stabilization(OutputKind::MovieFile);
            }
        }

        let audio_device = if self.preset.uses_audio() {
            tolerate(self.add_audio_input())?
        } else {
            None
        };

        if !pipeline.add_output(OutputKind::Photo) {
            return Err(ConfigurationError::CannotAddPhotoOutput);
        }
        pipeline.set_high_resolution_capture_enabled(true);
        let live_photos = self.preset == SessionPreset::LivePhotos;
        let live_supported = pipeline.is_live_photo_capture_supported();
        pipeline.set_live_photo_capture_enabled(live_photos && live_supported);
        if live_photos && !live_supported {
            tolerate::<()>(Err(ConfigurationError::LivePhotoUnsupported))?;
        }

        let has_video_data_output = if self.preset.uses_video_data_output() {
            tolerate(self.add_video_data_output())?.is_some()
        } else {
            false
        };

        Ok(ConfiguredComponents {
            video_device,
            audio_device,
            has_movie_output,
            has_video_data_output,
        })
    }

    fn add_audio_input(&self) -> Result<AudioDevice, ConfigurationError> {
        let audio = self
            .env
            .discovery
            .default_audio_device()
            .ok_or(ConfigurationError::NoAudioDevice)?;
        if !self.env.pipeline.add_input(&CaptureInput::Audio(audio.clone())) {
            return Err(ConfigurationError::CannotAddAudioInput(audio.name));
        }
        debug!(device = %audio.name, "Added audio input");
        Ok(audio)
    }

    fn add_video_data_output(&self) -> Result<(), ConfigurationError> {
        let pipeline = &self.env.pipeline;
        if !pipeline.add_output(OutputKind::VideoData) {
            return Err(ConfigurationError::CannotAddVideoDataOutput);
        }
        let orientation = self.preview_orientation().unwrap_or_default();
        pipeline.set_connection_orientation(OutputKind::VideoData, orientation);
        let handler: Arc<dyn SampleBufferHandler> = self.sample_buffer.clone();
        pipeline.set_sample_buffer_handler(Some(handler));
        Ok(())
    }

    // ===== Running state =====

    fn resume_on_queue(&self) {
        let (setup_result, is_running, status) = {
            let data = self.data.lock().unwrap();
            (data.setup_result, data.is_session_running, data.authorization_status)
        };

        match setup_result {
            SetupResult::Success => {
                if is_running {
                    warn!("Capture session is already running");
                    return;
                }
                self.add_observers();
                self.env.pipeline.start_running();
                let running = self.env.pipeline.is_running();
                self.data.lock().unwrap().is_session_running = running;
                if !running {
                    warn!("Capture pipeline did not start");
                }
            }
            SetupResult::NotAuthorized => {
                warn!(?status, "Camera access not authorized");
                if let Some(delegate) = self.session_delegate() {
                    delegate.authorization_status_failed(status);
                }
            }
            SetupResult::ConfigurationFailed => {
                warn!("Cannot resume, session configuration failed");
                if let Some(delegate) = self.session_delegate() {
                    delegate.did_fail_configuring_session();
                }
            }
        }
    }

    fn suspend_on_queue(&self) {
        let (setup_result, is_running) = {
            let data = self.data.lock().unwrap();
            (data.setup_result, data.is_session_running)
        };
        if setup_result != SetupResult::Success {
            return;
        }
        self.stop_active_recording();
        if !is_running {
            warn!("Capture session is not running");
            return;
        }

        self.env.pipeline.stop_running();
        let running = self.env.pipeline.is_running();
        {
            let mut data = self.data.lock().unwrap();
            data.is_session_running = running;
            // the next start must be reported even if the stop event never arrived
            if !running {
                data.reported_running = false;
            }
        }
        self.remove_observers();
    }

    /// Finalize an in-flight recording before the pipeline stops
    fn stop_active_recording(&self) {
        if self.data.lock().unwrap().recording.is_none() || !self.env.pipeline.is_recording() {
            return;
        }
        info!("Finishing video recording before the pipeline stops");
        self.env.pipeline.stop_recording();
    }

    fn add_observers(&self) {
        if self.data.lock().unwrap().observer_token.is_some() {
            return;
        }
        let weak = self.weak_self.clone();
        let token = self.env.pipeline.add_observer(Arc::new(move |event: PipelineEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_pipeline_event(event);
            }
        }));
        self.data.lock().unwrap().observer_token = Some(token);
    }

    fn remove_observers(&self) {
        let token = self.data.lock().unwrap().observer_token.take();
        if let Some(token) = token {
            self.env.pipeline.remove_observer(token);
        }
    }

    fn handle_pipeline_event(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::RunningChanged(running) => {
                {
                    let mut data = self.data.lock().unwrap();
                    if data.reported_running == running {
                        debug!(running, "Running state unchanged");
                        return;
                    }
                    data.reported_running = running;
                    data.state = if running {
                        SessionState::Running
                    } else {
                        SessionState::Suspended
                    };
                }
                info!(running, "Capture session running state changed");
                if let Some(delegate) = self.session_delegate() {
                    if running {
                        delegate.did_resume();
                    } else {
                        delegate.did_suspend();
                    }
                }
            }
            PipelineEvent::RuntimeError(error) => self.handle_runtime_error(error),
            PipelineEvent::Interrupted(reason) => {
                info!(?reason, "Capture session was interrupted");
                if let Some(delegate) = self.session_delegate() {
                    delegate.was_interrupted(reason);
                }
            }
            PipelineEvent::InterruptionEnded => {
                info!("Capture session interruption ended");
                if let Some(delegate) = self.session_delegate() {
                    delegate.interruption_did_end();
                }
            }
            PipelineEvent::SubjectAreaChanged { device_id } => {
                let device = self
                    .data
                    .lock()
                    .unwrap()
                    .video_device
                    .clone()
                    .filter(|d| d.id == device_id);
                if let Some(device) = device {
                    debug!(device = %device.name, "Subject area changed, refocusing");
                    let pipeline = Arc::clone(&self.env.pipeline);
                    self.queue
                        .dispatch(move || pipeline.focus_and_expose(&device, FocusPoint::CENTER));
                }
            }
        }
    }

    fn handle_runtime_error(&self, error: RuntimeError) {
        error!(error = %error, "Capture session runtime error");

        if !error.is_transient_reset() {
            if let Some(delegate) = self.session_delegate() {
                delegate.did_fail(&error);
            }
            return;
        }

        self.dispatch_with(move |inner| {
            if inner.data.lock().unwrap().is_session_running {
                info!("Restarting capture pipeline after media services reset");
                inner.env.pipeline.start_running();
                let running = inner.env.pipeline.is_running();
                inner.data.lock().unwrap().is_session_running = running;
            } else if let Some(delegate) = inner.session_delegate() {
                delegate.did_fail(&error);
            }
        });
    }

    // ===== Camera switching =====

    fn change_camera_on_queue(&self) {
        let (current, orientation, has_movie, has_photo, has_video_data) = {
            let data = self.data.lock().unwrap();
            (
                data.video_device.clone(),
                data.preview_orientation.unwrap_or_default(),
                data.has_movie_output,
                data.has_photo_output,
                data.has_video_data_output,
            )
        };
        let Some(current) = current else {
            warn!("No video input configured, cannot change camera");
            return;
        };
        let Some(target) = device::preferred_alternate(self.env.discovery.as_ref(), &current) else {
            warn!(device = %current.name, "No alternate camera available");
            return;
        };

        info!(from = %current.name, to = %target.name, "Switching camera");
        let pipeline = &self.env.pipeline;
        pipeline.begin_configuration();

        let current_input = CaptureInput::Video(current.clone());
        pipeline.remove_input(&current_input);
        if pipeline.add_input(&CaptureInput::Video(target.clone())) {
            self.data.lock().unwrap().video_device = Some(target);
        } else {
            warn!(device = %target.name, "Could not add alternate camera, keeping current one");
            if !pipeline.add_input(&current_input) {
                error!(device = %current.name, "Could not restore the previous camera");
            }
        }

        if has_movie && pipeline.is_stabilization_supported(OutputKind::MovieFile) {
            pipeline.enable_auto_stabilization(OutputKind::MovieFile);
        }
        if has_photo {
            let live = self.preset == SessionPreset::LivePhotos
                && pipeline.is_live_photo_capture_supported();
            pipeline.set_live_photo_capture_enabled(live);
        }
        if has_video_data {
            pipeline.set_connection_orientation(OutputKind::VideoData, orientation);
            pipeline.set_connection_mirrored(OutputKind::VideoData, false);
        }

        pipeline.commit_configuration();
    }

    // ===== Photos =====

    fn capture_photo_on_queue(
        &self,
        orientation: VideoOrientation,
        live_photo_mode: LivePhotoMode,
        save_to_library: bool,
    ) {
        let (device, has_photo_output) = {
            let data = self.data.lock().unwrap();
            (data.video_device.clone(), data.has_photo_output)
        };
        if !has_photo_output {
            warn!("Photo output not configured, cannot capture photo");
            return;
        }

        let pipeline = &self.env.pipeline;
        pipeline.set_connection_orientation(OutputKind::Photo, orientation);

        let mut settings = PhotoSettings::new();
        settings.flash_mode = if device.as_ref().is_some_and(|d| d.has_flash) {
            FlashMode::Auto
        } else {
            FlashMode::Off
        };
        settings.high_resolution_enabled = true;
        settings.thumbnail_codec =
            negotiate_thumbnail_codec(&pipeline.available_thumbnail_codecs());
        if live_photo_mode == LivePhotoMode::On {
            if pipeline.is_live_photo_capture_enabled() {
                settings.live_photo_movie_path = Some(temporary_movie_path(&self.temp_dir));
            } else {
                warn!(
                    preset = ?self.preset,
                    "Live photo capture not available, capturing a still photo"
                );
            }
        }

        let id = settings.unique_id;
        let delegate = Arc::new(self.make_photo_delegate(settings.clone(), save_to_library));
        self.data
            .lock()
            .unwrap()
            .in_progress_photo_captures
            .insert(id, Arc::clone(&delegate));

        debug!(%id, live = settings.live_photo_movie_path.is_some(), "Capturing photo");
        pipeline.capture_photo(settings, delegate);
    }

    fn make_photo_delegate(
        &self,
        settings: PhotoSettings,
        save_to_library: bool,
    ) -> PhotoCaptureDelegate {
        let weak = self.weak_self.clone();
        let will_capture: WillCaptureCallback = Box::new(move |settings: &PhotoSettings| {
            if let Some(inner) = weak.upgrade()
                && let Some(delegate) = inner.photo_delegate()
            {
                delegate.will_capture_photo_with(settings);
            }
        });

        let weak = self.weak_self.clone();
        let capturing_live_photo: LivePhotoCallback = Box::new(move |capturing| {
            if let Some(inner) = weak.upgrade() {
                inner.update_live_photo_count(capturing);
            }
        });

        let weak = self.weak_self.clone();
        let completion: PhotoCompletion = Box::new(move |delegate: &PhotoCaptureDelegate| {
            if let Some(inner) = weak.upgrade() {
                inner.finish_photo_capture(delegate);
            }
        });

        PhotoCaptureDelegate::new(
            settings,
            save_to_library,
            Arc::clone(&self.env.library),
            will_capture,
            capturing_live_photo,
            completion,
        )
    }

    fn update_live_photo_count(&self, capturing: bool) {
        self.dispatch_with(move |inner| {
            let count = {
                let mut data = inner.data.lock().unwrap();
                if capturing {
                    data.processing_live_photos += 1;
                } else if data.processing_live_photos == 0 {
                    error!("Live photo counter would drop below zero");
                    return;
                } else {
                    data.processing_live_photos -= 1;
                }
                data.processing_live_photos
            };
            debug!(count, "Live photos in progress");
            if let Some(delegate) = inner.photo_delegate() {
                delegate.did_change_number_of_processing_live_photos(count);
            }
        });
    }

    fn finish_photo_capture(&self, capture: &PhotoCaptureDelegate) {
        let id = capture.requested_settings().unique_id;
        self.dispatch_with(move |inner| {
            inner
                .data
                .lock()
                .unwrap()
                .in_progress_photo_captures
                .remove(&id);
        });

        let Some(delegate) = self.photo_delegate() else {
            return;
        };
        let settings = capture.requested_settings();
        if let Some(error) = capture.error() {
            delegate.did_fail_capturing_photo_with(&error);
        } else if let Some(data) = capture.photo_data() {
            match capture.live_photo_companion_movie_path() {
                Some(movie) => {
                    delegate.did_capture_photo_data_with_companion_movie(&data, &movie, settings)
                }
                None => delegate.did_capture_photo_data(&data, settings),
            }
        }
    }

    // ===== Video =====

    fn start_recording_on_queue(&self, orientation: VideoOrientation, save_to_library: bool) {
        {
            let data = self.data.lock().unwrap();
            if !data.has_movie_output {
                warn!(preset = ?self.preset, "Movie output not configured, cannot record video");
                return;
            }
            if data.recording.is_some() {
                warn!("Already recording video");
                return;
            }
        }
        let pipeline = &self.env.pipeline;
        if pipeline.is_recording() {
            warn!("Already recording video");
            return;
        }

        pipeline.set_connection_orientation(OutputKind::MovieFile, orientation);
        let path = temporary_movie_path(&self.temp_dir);
        let recording = Arc::new(self.make_video_delegate(save_to_library));
        self.data.lock().unwrap().recording = Some(Arc::clone(&recording));

        info!(path = %path.display(), "Starting video recording");
        pipeline.start_recording(path, recording);
    }

    fn stop_recording_on_queue(&self, cancel: bool) {
        let (has_movie_output, recording) = {
            let data = self.data.lock().unwrap();
            (data.has_movie_output, data.recording.clone())
        };
        if !has_movie_output {
            warn!(preset = ?self.preset, "Movie output not configured, nothing to stop");
            return;
        }
        if !self.env.pipeline.is_recording() {
            warn!("Not recording video");
            return;
        }
        if cancel && let Some(recording) = recording {
            recording.cancel();
        }
        info!(cancel, "Stopping video recording");
        self.env.pipeline.stop_recording();
    }

    fn make_video_delegate(&self, save_to_library: bool) -> VideoCaptureDelegate {
        let weak = self.weak_self.clone();
        let did_start: RecordingStartedCallback = Box::new(move || {
            if let Some(inner) = weak.upgrade()
                && let Some(delegate) = inner.video_delegate()
            {
                delegate.did_start_video_recording();
            }
        });

        let weak = self.weak_self.clone();
        let completion: RecordingCompletion =
            Box::new(move |recording: &VideoCaptureDelegate, outcome: RecordingOutcome| {
                if let Some(inner) = weak.upgrade() {
                    inner.finish_recording(recording.id(), outcome);
                }
            });

        VideoCaptureDelegate::new(
            save_to_library,
            Arc::clone(&self.env.library),
            Arc::clone(&self.env.background_tasks),
            did_start,
            completion,
        )
    }

    fn finish_recording(&self, id: Uuid, outcome: RecordingOutcome) {
        self.dispatch_with(move |inner| {
            let mut data = inner.data.lock().unwrap();
            if data.recording.as_ref().is_some_and(|r| r.id() == id) {
                data.recording = None;
            }
        });

        let Some(delegate) = self.video_delegate() else {
            return;
        };
        match outcome {
            RecordingOutcome::Finished(path) => delegate.did_finish_video_recording(&path),
            RecordingOutcome::Cancelled => delegate.did_cancel_video_recording(),
            RecordingOutcome::Interrupted { path, reason } => {
                delegate.did_interrupt_video_recording(&path, &reason)
            }
            RecordingOutcome::Failed(error) => delegate.did_fail_video_recording(&error),
        }
    }

    // ===== Teardown =====

    fn teardown_on_queue(&self) {
        let (is_running, has_video_data) = {
            let data = self.data.lock().unwrap();
            (data.is_session_running, data.has_video_data_output)
        };
        self.stop_active_recording();
        if is_running {
            self.env.pipeline.stop_running();
            self.data.lock().unwrap().is_session_running = false;
        }
        self.remove_observers();
        if has_video_data {
            self.env.pipeline.set_sample_buffer_handler(None);
        }
        debug!("Capture session torn down");
    }
}

/// The picker's camera session
///
/// Construct once per picker, call [`prepare`](Self::prepare) once, then
/// [`resume`](Self::resume) and [`suspend`](Self::suspend) as the picker
/// appears and disappears. Dropping the session stops the pipeline.
pub struct CaptureSession {
    inner: Arc<SessionInner>,
}

impl CaptureSession {
    pub fn new(env: CaptureEnvironment, settings: &CaptureSettings) -> PickerResult<Self> {
        let queue = SessionQueue::new(SESSION_QUEUE_NAME)
            .map_err(|e| PickerError::Other(format!("failed to start session queue: {}", e)))?;
        let preset = settings.preset;
        let temp_dir = settings.resolved_temp_dir();

        let inner = Arc::new_cyclic(|weak_self| SessionInner {
            env,
            preset,
            temp_dir,
            queue,
            data: Mutex::new(SessionData::new()),
            delegates: Mutex::new(Delegates::default()),
            sample_buffer: Arc::new(VideoOutputSampleBufferDelegate::new()),
            weak_self: weak_self.clone(),
        });

        debug!(?preset, "Capture session created");
        Ok(Self { inner })
    }

    // ===== Delegates =====

    pub fn set_session_delegate(&self, delegate: Arc<dyn SessionDelegate>) {
        self.inner.delegates.lock().unwrap().session = Some(delegate);
    }

    pub fn set_photo_capturing_delegate(&self, delegate: Arc<dyn PhotoCapturingDelegate>) {
        self.inner.delegates.lock().unwrap().photo = Some(delegate);
    }

    pub fn set_video_recording_delegate(&self, delegate: Arc<dyn VideoRecordingDelegate>) {
        self.inner.delegates.lock().unwrap().video = Some(delegate);
    }

    /// Route all three delegate interfaces to one implementation
    pub fn set_delegates<D>(&self, delegate: Arc<D>)
    where
        D: SessionDelegate + PhotoCapturingDelegate + VideoRecordingDelegate + 'static,
    {
        let session: Arc<dyn SessionDelegate> = delegate.clone();
        let photo: Arc<dyn PhotoCapturingDelegate> = delegate.clone();
        let video: Arc<dyn VideoRecordingDelegate> = delegate;
        let mut delegates = self.inner.delegates.lock().unwrap();
        delegates.session = Some(session);
        delegates.photo = Some(photo);
        delegates.video = Some(video);
    }

    // ===== Lifecycle =====

    /// Check camera access and configure the pipeline
    ///
    /// When access has not been decided yet the session queue is held until
    /// the prompt is answered. One configuration pass is enqueued in every
    /// case; it does nothing unless access was granted.
    pub fn prepare(&self) {
        let inner = &self.inner;
        {
            let mut data = inner.data.lock().unwrap();
            if data.state != SessionState::Uninitialized {
                warn!(state = ?data.state, "Capture session already prepared");
                return;
            }
            data.state = SessionState::Configuring;
        }

        let status = inner.env.authorizer.authorization_status();
        debug!(?status, "Camera authorization status");
        inner.data.lock().unwrap().authorization_status = status;

        match status {
            AuthorizationStatus::Authorized => {}
            AuthorizationStatus::NotDetermined => {
                inner.queue.suspend();
                let weak = Arc::downgrade(inner);
                inner.env.authorizer.request_access(Box::new(move |granted| {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    if granted {
                        info!("Camera access granted");
                        inner.data.lock().unwrap().authorization_status =
                            AuthorizationStatus::Authorized;
                        if let Some(delegate) = inner.session_delegate() {
                            delegate.authorization_status_granted();
                        }
                    } else {
                        warn!("Camera access denied");
                        let mut data = inner.data.lock().unwrap();
                        data.setup_result = SetupResult::NotAuthorized;
                        data.authorization_status = AuthorizationStatus::Denied;
                    }
                    inner.queue.resume();
                }));
            }
            AuthorizationStatus::Denied | AuthorizationStatus::Restricted => {
                self.inner.data.lock().unwrap().setup_result = SetupResult::NotAuthorized;
            }
        }

        inner.dispatch_with(|inner| inner.configure_session());
    }

    /// Start the pipeline, or report why it cannot start
    pub fn resume(&self) {
        self.inner.dispatch_with(|inner| inner.resume_on_queue());
    }

    /// Stop the pipeline
    pub fn suspend(&self) {
        self.inner.dispatch_with(|inner| inner.suspend_on_queue());
    }

    /// Attach the live preview; capture requires a preview connection
    pub fn attach_preview(&self, orientation: VideoOrientation) {
        self.inner.data.lock().unwrap().preview_orientation = Some(orientation);
    }

    pub fn detach_preview(&self) {
        self.inner.data.lock().unwrap().preview_orientation = None;
    }

    pub fn update_video_orientation(&self, orientation: VideoOrientation) {
        {
            let mut data = self.inner.data.lock().unwrap();
            if data.preview_orientation.is_some() {
                data.preview_orientation = Some(orientation);
            }
        }
        self.inner.dispatch_with(move |inner| {
            if inner.data.lock().unwrap().has_video_data_output {
                inner
                    .env
                    .pipeline
                    .set_connection_orientation(OutputKind::VideoData, orientation);
            }
        });
    }

    /// Flip to the camera on the other side; `completion` always runs
    pub fn change_camera<F>(&self, completion: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let weak = Arc::downgrade(&self.inner);
        self.inner.queue.dispatch(move || {
            if let Some(inner) = weak.upgrade() {
                inner.change_camera_on_queue();
            }
            completion();
        });
    }

    // ===== Capture =====

    pub fn capture_photo(&self, live_photo_mode: LivePhotoMode, save_to_library: bool) {
        let Some(orientation) = self.inner.preview_orientation() else {
            warn!("No preview connection, cannot capture photo");
            return;
        };
        self.inner.dispatch_with(move |inner| {
            inner.capture_photo_on_queue(orientation, live_photo_mode, save_to_library)
        });
    }

    pub fn start_video_recording(&self, save_to_library: bool) {
        let Some(orientation) = self.inner.preview_orientation() else {
            warn!("No preview connection, cannot record video");
            return;
        };
        self.inner.dispatch_with(move |inner| {
            inner.start_recording_on_queue(orientation, save_to_library)
        });
    }

    /// Stop the active recording; with `cancel` the file is discarded
    pub fn stop_video_recording(&self, cancel: bool) {
        if self.inner.preview_orientation().is_none() {
            warn!("No preview connection, no recording to stop");
            return;
        }
        self.inner
            .dispatch_with(move |inner| inner.stop_recording_on_queue(cancel));
    }

    // ===== State =====

    pub fn preset(&self) -> SessionPreset {
        self.inner.preset
    }

    pub fn state(&self) -> SessionState {
        self.inner.data.lock().unwrap().state
    }

    pub fn setup_result(&self) -> SetupResult {
        self.inner.data.lock().unwrap().setup_result
    }

    pub fn is_session_running(&self) -> bool {
        self.inner.data.lock().unwrap().is_session_running
    }

    pub fn current_video_device(&self) -> Option<CaptureDevice> {
        self.inner.data.lock().unwrap().video_device.clone()
    }

    pub fn processing_live_photos(&self) -> usize {
        self.inner.data.lock().unwrap().processing_live_photos
    }

    pub fn in_flight_photo_captures(&self) -> usize {
        self.inner.data.lock().unwrap().in_progress_photo_captures.len()
    }

    pub fn is_recording_video(&self) -> bool {
        self.inner.data.lock().unwrap().recording.is_some()
    }

    /// Last frame from the video data output, for the suspended-preview blur
    pub fn latest_video_frame(&self) -> Option<Arc<VideoFrame>> {
        self.inner.sample_buffer.latest_frame()
    }

    /// Block until every job enqueued so far has run
    pub fn flush(&self) {
        self.inner.queue.wait_until_idle();
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.inner.dispatch_with(|inner| inner.teardown_on_queue());
        self.inner.queue.shutdown();
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.inner.data.lock().unwrap();
        f.debug_struct("CaptureSession")
            .field("preset", &self.inner.preset)
            .field("state", &data.state)
            .field("setup_result", &data.setup_result)
            .field("running", &data.is_session_running)
            .finish()
    }
}
