// SPDX-License-Identifier: GPL-3.0-only

//! In-memory capture pipeline
//!
//! Behaves like a hardware capture graph closely enough to drive the session:
//! configuration transactions roll back to a snapshot, outputs obey the same
//! compatibility rules, recordings write real files and photo requests go
//! through the full callback sequence. Observers are notified synchronously on
//! the calling thread, never while the internal lock is held.
//!
//! Photo requests complete immediately by default. In manual mode they stop
//! after the shutter callbacks until [`VirtualPipeline::complete_pending_photos`]
//! is called, which lets several requests overlap.

use crate::capture::pipeline::{
    CapturePipeline, FocusPoint, ObserverToken, PhotoCaptureHandler, PipelineEvent,
    PipelineObserver, RecordingHandler, SampleBufferHandler,
};
use crate::capture::types::{
    CaptureDevice, CaptureInput, ImageCodec, InterruptionReason, OutputKind, PhotoSettings,
    ResolvedPhotoSettings, VideoFrame, VideoOrientation,
};
use crate::errors::{CaptureError, RuntimeError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Dimensions reported for live photo companion movies
const LIVE_PHOTO_MOVIE_DIMENSIONS: (u32, u32) = (1920, 1080);

/// Size of synthetic preview frames
const FRAME_WIDTH: u32 = 64;
const FRAME_HEIGHT: u32 = 48;

/// Everything a configuration transaction can change
#[derive(Clone, Default)]
struct Graph {
    inputs: Vec<CaptureInput>,
    outputs: HashSet<OutputKind>,
    orientations: HashMap<OutputKind, VideoOrientation>,
    mirrored: HashMap<OutputKind, bool>,
    auto_stabilization: HashSet<OutputKind>,
    high_resolution: bool,
    live_photo_enabled: bool,
    sample_handler: Option<Arc<dyn SampleBufferHandler>>,
}

impl Graph {
    fn video_device(&self) -> Option<&CaptureDevice> {
        self.inputs.iter().find_map(|input| match input {
            CaptureInput::Video(device) => Some(device),
            CaptureInput::Audio(_) => None,
        })
    }
}

struct PendingPhoto {
    settings: PhotoSettings,
    resolved: ResolvedPhotoSettings,
    handler: Arc<dyn PhotoCaptureHandler>,
}

struct ActiveRecording {
    path: PathBuf,
    handler: Arc<dyn RecordingHandler>,
}

struct PipelineState {
    graph: Graph,
    snapshot: Option<Graph>,
    configuration_depth: usize,
    running: bool,
    recording: Option<ActiveRecording>,
    pending_photos: VecDeque<PendingPhoto>,
    observers: Vec<(ObserverToken, PipelineObserver)>,
    next_token: ObserverToken,

    rejected_inputs: HashSet<String>,
    rejected_outputs: HashSet<OutputKind>,
    live_photo_supported: bool,
    stabilization_supported: bool,
    thumbnail_codecs: Vec<ImageCodec>,
    manual_photo_completion: bool,
    next_photo_error: Option<CaptureError>,
    next_recording_error: Option<CaptureError>,
    fail_start: bool,
    withhold_stop_event: bool,

    stats: PipelineStats,
    focus_requests: Vec<(String, FocusPoint)>,
}

/// Call counters for assertions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub begin_configuration: usize,
    pub commit_configuration: usize,
    pub rollback_configuration: usize,
    pub start_running: usize,
    pub stop_running: usize,
    pub photos_captured: usize,
    pub recordings_started: usize,
}

pub struct VirtualPipeline {
    state: Mutex<PipelineState>,
}

impl Default for VirtualPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualPipeline {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PipelineState {
                graph: Graph::default(),
                snapshot: None,
                configuration_depth: 0,
                running: false,
                recording: None,
                pending_photos: VecDeque::new(),
                observers: Vec::new(),
                next_token: 1,
                rejected_inputs: HashSet::new(),
                rejected_outputs: HashSet::new(),
                live_photo_supported: true,
                stabilization_supported: true,
                thumbnail_codecs: vec![ImageCodec::Hevc, ImageCodec::Jpeg],
                manual_photo_completion: false,
                next_photo_error: None,
                next_recording_error: None,
                fail_start: false,
                withhold_stop_event: false,
                stats: PipelineStats::default(),
                focus_requests: Vec::new(),
            }),
        }
    }

    // ===== Behaviour knobs =====

    /// Refuse to attach the device with `id`
    pub fn reject_input(&self, id: &str) {
        self.state.lock().unwrap().rejected_inputs.insert(id.to_string());
    }

    /// Refuse to attach outputs of `kind`
    pub fn reject_output(&self, kind: OutputKind) {
        self.state.lock().unwrap().rejected_outputs.insert(kind);
    }

    pub fn set_live_photo_supported(&self, supported: bool) {
        self.state.lock().unwrap().live_photo_supported = supported;
    }

    pub fn set_stabilization_supported(&self, supported: bool) {
        self.state.lock().unwrap().stabilization_supported = supported;
    }

    pub fn set_thumbnail_codecs(&self, codecs: Vec<ImageCodec>) {
        self.state.lock().unwrap().thumbnail_codecs = codecs;
    }

    /// Hold photo requests after the shutter callbacks
    pub fn set_manual_photo_completion(&self, manual: bool) {
        self.state.lock().unwrap().manual_photo_completion = manual;
    }

    /// Make the next photo request fail with `error`
    pub fn fail_next_photo(&self, error: CaptureError) {
        self.state.lock().unwrap().next_photo_error = Some(error);
    }

    /// Make the next recording finish with `error`
    pub fn fail_next_recording(&self, error: CaptureError) {
        self.state.lock().unwrap().next_recording_error = Some(error);
    }

    /// Make `start_running` report a runtime error instead of starting
    pub fn set_fail_start(&self, fail: bool) {
        self.state.lock().unwrap().fail_start = fail;
    }

    /// Stop without telling observers, like a pipeline whose stop event arrives late
    pub fn set_withhold_stop_event(&self, withhold: bool) {
        self.state.lock().unwrap().withhold_stop_event = withhold;
    }

    // ===== Driving =====

    /// Finish every photo request held back in manual mode, oldest first
    pub fn complete_pending_photos(&self) -> usize {
        let pending: Vec<PendingPhoto> = self
            .state
            .lock()
            .unwrap()
            .pending_photos
            .drain(..)
            .collect();
        let count = pending.len();
        for photo in pending {
            self.finish_photo(photo);
        }
        count
    }

    /// Deliver `event` to every observer
    pub fn emit(&self, event: PipelineEvent) {
        let observers: Vec<PipelineObserver> = self
            .state
            .lock()
            .unwrap()
            .observers
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        debug!(?event, observers = observers.len(), "Emitting pipeline event");
        for observer in observers {
            observer(event.clone());
        }
    }

    /// Fail while running; a media services reset also stops the pipeline
    pub fn raise_runtime_error(&self, error: RuntimeError) {
        let stopped = {
            let mut state = self.state.lock().unwrap();
            let was_running = state.running;
            if error.is_transient_reset() {
                state.running = false;
            }
            was_running && !state.running
        };
        if stopped {
            self.emit(PipelineEvent::RunningChanged(false));
        }
        self.emit(PipelineEvent::RuntimeError(error));
    }

    pub fn interrupt(&self, reason: InterruptionReason) {
        self.emit(PipelineEvent::Interrupted(reason));
    }

    pub fn end_interruption(&self) {
        self.emit(PipelineEvent::InterruptionEnded);
    }

    /// Report a subject area change on the attached camera
    pub fn change_subject_area(&self) {
        let device_id = self
            .state
            .lock()
            .unwrap()
            .graph
            .video_device()
            .map(|d| d.id.clone());
        if let Some(device_id) = device_id {
            self.emit(PipelineEvent::SubjectAreaChanged { device_id });
        }
    }

    /// Push one synthetic frame to the video data output
    pub fn push_frame(&self) {
        let (handler, orientation) = {
            let state = self.state.lock().unwrap();
            if !state.graph.outputs.contains(&OutputKind::VideoData) {
                return;
            }
            (
                state.graph.sample_handler.clone(),
                state
                    .graph
                    .orientations
                    .get(&OutputKind::VideoData)
                    .copied()
                    .unwrap_or_default(),
            )
        };
        if let Some(handler) = handler {
            handler.did_output_frame(synthetic_frame(orientation));
        }
    }

    // ===== Inspection =====

    pub fn stats(&self) -> PipelineStats {
        self.state.lock().unwrap().stats
    }

    pub fn video_input(&self) -> Option<CaptureDevice> {
        self.state.lock().unwrap().graph.video_device().cloned()
    }

    pub fn inputs(&self) -> Vec<CaptureInput> {
        self.state.lock().unwrap().graph.inputs.clone()
    }

    pub fn outputs(&self) -> HashSet<OutputKind> {
        self.state.lock().unwrap().graph.outputs.clone()
    }

    pub fn connection_orientation(&self, output: OutputKind) -> Option<VideoOrientation> {
        self.state.lock().unwrap().graph.orientations.get(&output).copied()
    }

    pub fn is_connection_mirrored(&self, output: OutputKind) -> Option<bool> {
        self.state.lock().unwrap().graph.mirrored.get(&output).copied()
    }

    pub fn is_auto_stabilization_enabled(&self, output: OutputKind) -> bool {
        self.state
            .lock()
            .unwrap()
            .graph
            .auto_stabilization
            .contains(&output)
    }

    pub fn is_high_resolution_capture_enabled(&self) -> bool {
        self.state.lock().unwrap().graph.high_resolution
    }

    pub fn has_sample_buffer_handler(&self) -> bool {
        self.state.lock().unwrap().graph.sample_handler.is_some()
    }

    pub fn observer_count(&self) -> usize {
        self.state.lock().unwrap().observers.len()
    }

    pub fn pending_photo_count(&self) -> usize {
        self.state.lock().unwrap().pending_photos.len()
    }

    pub fn focus_requests(&self) -> Vec<(String, FocusPoint)> {
        self.state.lock().unwrap().focus_requests.clone()
    }

    pub fn is_in_configuration(&self) -> bool {
        self.state.lock().unwrap().configuration_depth > 0
    }

    // ===== Internals =====

    fn finish_photo(&self, photo: PendingPhoto) {
        let PendingPhoto {
            settings,
            resolved,
            handler,
        } = photo;
        let error = self.state.lock().unwrap().next_photo_error.take();
        let movie = settings
            .live_photo_movie_path
            .as_deref()
            .filter(|_| resolved.expects_live_photo_movie());

        if let Some(error) = error {
            if let Some(path) = movie {
                // a half-written companion movie is left behind
                let _ = std::fs::write(path, b"partial");
            }
            handler.did_finish_processing_photo(Err(error.clone()));
            handler.did_finish_capture(&resolved, Some(error));
            return;
        }

        handler.did_finish_processing_photo(Ok(synthetic_jpeg(&settings)));
        if let Some(path) = movie {
            handler.did_finish_recording_live_photo_movie(&resolved);
            let written = write_movie(path, b"live photo movie");
            handler.did_finish_processing_live_photo_movie(path, written);
        }
        handler.did_finish_capture(&resolved, None);
    }

    fn finish_recording(recording: ActiveRecording, error: Option<CaptureError>) {
        // a finalized file has frames in it
        let finalized = error
            .as_ref()
            .is_none_or(|e| e.recording_successfully_finished());
        if finalized && let Err(e) = write_movie(&recording.path, b"recorded frames") {
            warn!(error = %e, "Could not finalize virtual recording");
        }
        info!(path = %recording.path.display(), "Virtual recording stopped");
        recording.handler.did_finish_recording(&recording.path, error);
    }
}

fn synthetic_frame(orientation: VideoOrientation) -> VideoFrame {
    let mut data = Vec::with_capacity((FRAME_WIDTH * FRAME_HEIGHT * 4) as usize);
    for y in 0..FRAME_HEIGHT {
        for x in 0..FRAME_WIDTH {
            data.extend_from_slice(&[(x * 4) as u8, (y * 5) as u8, 128, 255]);
        }
    }
    VideoFrame {
        width: FRAME_WIDTH,
        height: FRAME_HEIGHT,
        data: Arc::from(data),
        orientation,
        captured_at: Instant::now(),
    }
}

/// JPEG markers around the request id
fn synthetic_jpeg(settings: &PhotoSettings) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8];
    data.extend_from_slice(settings.unique_id.as_bytes());
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

fn write_movie(path: &Path, contents: &[u8]) -> Result<(), CaptureError> {
    std::fs::write(path, contents).map_err(|e| CaptureError::Recording {
        message: format!("cannot write {}: {}", path.display(), e),
        successfully_finished: false,
    })
}

impl CapturePipeline for VirtualPipeline {
    fn begin_configuration(&self) {
        let mut state = self.state.lock().unwrap();
        if state.configuration_depth == 0 {
            state.snapshot = Some(state.graph.clone());
        }
        state.configuration_depth += 1;
        state.stats.begin_configuration += 1;
    }

    fn commit_configuration(&self) {
        let mut state = self.state.lock().unwrap();
        if state.configuration_depth == 0 {
            warn!("Commit without begin configuration");
            return;
        }
        state.configuration_depth -= 1;
        if state.configuration_depth == 0 {
            state.snapshot = None;
        }
        state.stats.commit_configuration += 1;
    }

    fn rollback_configuration(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(snapshot) = state.snapshot.take() {
            state.graph = snapshot;
        }
        state.configuration_depth = 0;
        state.stats.rollback_configuration += 1;
    }

    fn add_input(&self, input: &CaptureInput) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.rejected_inputs.contains(input.id()) {
            return false;
        }
        if state.graph.inputs.iter().any(|i| i.id() == input.id()) {
            return false;
        }
        if input.is_video() && state.graph.video_device().is_some() {
            return false;
        }
        state.graph.inputs.push(input.clone());
        true
    }

    fn remove_input(&self, input: &CaptureInput) {
        self.state
            .lock()
            .unwrap()
            .graph
            .inputs
            .retain(|i| i.id() != input.id());
    }

    fn add_output(&self, output: OutputKind) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.rejected_outputs.contains(&output) || state.graph.outputs.contains(&output) {
            return false;
        }
        let conflicting = match output {
            OutputKind::MovieFile => Some(OutputKind::VideoData),
            OutputKind::VideoData => Some(OutputKind::MovieFile),
            OutputKind::Photo => None,
        };
        if conflicting.is_some_and(|other| state.graph.outputs.contains(&other)) {
            return false;
        }
        state.graph.outputs.insert(output);
        true
    }

    fn set_connection_orientation(&self, output: OutputKind, orientation: VideoOrientation) {
        let mut state = self.state.lock().unwrap();
        if state.graph.outputs.contains(&output) {
            state.graph.orientations.insert(output, orientation);
        }
    }

    fn set_connection_mirrored(&self, output: OutputKind, mirrored: bool) {
        let mut state = self.state.lock().unwrap();
        if state.graph.outputs.contains(&output) {
            state.graph.mirrored.insert(output, mirrored);
        }
    }

    fn is_stabilization_supported(&self, output: OutputKind) -> bool {
        let state = self.state.lock().unwrap();
        output == OutputKind::MovieFile
            && state.stabilization_supported
            && state.graph.outputs.contains(&output)
            && state
                .graph
                .video_device()
                .is_some_and(|d| d.supports_stabilization)
    }

    fn enable_auto_stabilization(&self, output: OutputKind) {
        self.state
            .lock()
            .unwrap()
            .graph
            .auto_stabilization
            .insert(output);
    }

    fn set_high_resolution_capture_enabled(&self, enabled: bool) {
        self.state.lock().unwrap().graph.high_resolution = enabled;
    }

    fn is_live_photo_capture_supported(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.live_photo_supported && state.graph.outputs.contains(&OutputKind::Photo)
    }

    fn set_live_photo_capture_enabled(&self, enabled: bool) {
        let mut state = self.state.lock().unwrap();
        let supported =
            state.live_photo_supported && state.graph.outputs.contains(&OutputKind::Photo);
        state.graph.live_photo_enabled = enabled && supported;
    }

    fn is_live_photo_capture_enabled(&self) -> bool {
        self.state.lock().unwrap().graph.live_photo_enabled
    }

    fn available_thumbnail_codecs(&self) -> Vec<ImageCodec> {
        self.state.lock().unwrap().thumbnail_codecs.clone()
    }

    fn capture_photo(&self, settings: PhotoSettings, handler: Arc<dyn PhotoCaptureHandler>) {
        let (resolved, manual) = {
            let mut state = self.state.lock().unwrap();
            state.stats.photos_captured += 1;
            let live = settings.live_photo_movie_path.is_some() && state.graph.live_photo_enabled;
            let resolved = ResolvedPhotoSettings {
                unique_id: settings.unique_id,
                live_photo_movie_dimensions: if live {
                    LIVE_PHOTO_MOVIE_DIMENSIONS
                } else {
                    (0, 0)
                },
            };
            (resolved, state.manual_photo_completion)
        };

        debug!(
            id = %settings.unique_id,
            live = resolved.expects_live_photo_movie(),
            "Virtual photo capture"
        );
        handler.will_begin_capture(&resolved);
        handler.will_capture_photo(&resolved);

        let photo = PendingPhoto {
            settings,
            resolved,
            handler,
        };
        if manual {
            self.state.lock().unwrap().pending_photos.push_back(photo);
        } else {
            self.finish_photo(photo);
        }
    }

    fn start_recording(&self, path: PathBuf, handler: Arc<dyn RecordingHandler>) {
        if self.state.lock().unwrap().recording.is_some() {
            handler.did_finish_recording(
                &path,
                Some(CaptureError::Recording {
                    message: "a recording is already in progress".into(),
                    successfully_finished: false,
                }),
            );
            return;
        }

        if let Err(e) = write_movie(&path, b"") {
            handler.did_finish_recording(&path, Some(e));
            return;
        }

        {
            let mut state = self.state.lock().unwrap();
            state.stats.recordings_started += 1;
            state.recording = Some(ActiveRecording {
                path: path.clone(),
                handler: Arc::clone(&handler),
            });
        }
        info!(path = %path.display(), "Virtual recording started");
        handler.did_start_recording(&path);
    }

    fn stop_recording(&self) {
        let (recording, error) = {
            let mut state = self.state.lock().unwrap();
            (state.recording.take(), state.next_recording_error.take())
        };
        let Some(recording) = recording else {
            debug!("Stop requested without an active recording");
            return;
        };
        Self::finish_recording(recording, error);
    }

    fn is_recording(&self) -> bool {
        self.state.lock().unwrap().recording.is_some()
    }

    fn set_sample_buffer_handler(&self, handler: Option<Arc<dyn SampleBufferHandler>>) {
        self.state.lock().unwrap().graph.sample_handler = handler;
    }

    fn focus_and_expose(&self, device: &CaptureDevice, point: FocusPoint) {
        self.state
            .lock()
            .unwrap()
            .focus_requests
            .push((device.id.clone(), point));
    }

    fn start_running(&self) {
        let outcome = {
            let mut state = self.state.lock().unwrap();
            if state.fail_start {
                Err(())
            } else if state.running {
                Ok(false)
            } else {
                state.running = true;
                state.stats.start_running += 1;
                Ok(true)
            }
        };

        match outcome {
            Err(()) => {
                warn!("Virtual pipeline failed to start");
                self.emit(PipelineEvent::RuntimeError(RuntimeError::Other(
                    "virtual pipeline refused to start".into(),
                )));
            }
            Ok(false) => {}
            Ok(true) => {
                info!("Virtual pipeline running");
                self.emit(PipelineEvent::RunningChanged(true));
                self.push_frame();
            }
        }
    }

    fn stop_running(&self) {
        let (recording, withhold_event) = {
            let mut state = self.state.lock().unwrap();
            if !state.running {
                return;
            }
            state.running = false;
            state.stats.stop_running += 1;
            (state.recording.take(), state.withhold_stop_event)
        };
        // an active recording ends with a playable file
        if let Some(recording) = recording {
            warn!(path = %recording.path.display(), "Recording stopped with the pipeline");
            Self::finish_recording(
                recording,
                Some(CaptureError::Recording {
                    message: "capture pipeline stopped".into(),
                    successfully_finished: true,
                }),
            );
        }
        info!("Virtual pipeline stopped");
        if !withhold_event {
            self.emit(PipelineEvent::RunningChanged(false));
        }
    }

    fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }

    fn add_observer(&self, observer: PipelineObserver) -> ObserverToken {
        let mut state = self.state.lock().unwrap();
        let token = state.next_token;
        state.next_token += 1;
        state.observers.push((token, observer));
        token
    }

    fn remove_observer(&self, token: ObserverToken) {
        self.state
            .lock()
            .unwrap()
            .observers
            .retain(|(t, _)| *t != token);
    }
}
