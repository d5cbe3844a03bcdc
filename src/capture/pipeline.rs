// SPDX-License-Identifier: GPL-3.0-only

//! Capture pipeline abstraction
//!
//! [`CapturePipeline`] is the hardware capture graph the session drives: one
//! video input, an optional audio input and up to three outputs, reconfigured
//! inside begin/commit transactions. Implementations are internally
//! synchronized, but the session only ever calls the mutating methods from its
//! own work queue.
//!
//! Results flow back through the handler traits ([`PhotoCaptureHandler`],
//! [`RecordingHandler`], [`SampleBufferHandler`]) and through
//! [`PipelineEvent`]s delivered to registered observers.

use super::types::{
    CaptureDevice, CaptureInput, ImageCodec, InterruptionReason, OutputKind, PhotoSettings,
    ResolvedPhotoSettings, VideoFrame, VideoOrientation,
};
use crate::errors::{CaptureError, RuntimeError};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Handle returned when registering a pipeline observer
pub type ObserverToken = u64;

/// Callback receiving pipeline events
pub type PipelineObserver = Arc<dyn Fn(PipelineEvent) + Send + Sync>;

/// State changes and faults reported by the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// The pipeline's own running flag changed
    RunningChanged(bool),
    /// The pipeline hit an error while running
    RuntimeError(RuntimeError),
    /// The system took the camera away
    Interrupted(InterruptionReason),
    InterruptionEnded,
    /// The scene in front of a device changed substantially
    SubjectAreaChanged { device_id: String },
}

/// Normalized point of interest for focus and exposure, (0, 0) is top left
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusPoint {
    pub x: f64,
    pub y: f64,
}

impl FocusPoint {
    pub const CENTER: FocusPoint = FocusPoint { x: 0.5, y: 0.5 };
}

/// Receives the progress of one photo request
pub trait PhotoCaptureHandler: Send + Sync {
    fn will_begin_capture(&self, resolved: &ResolvedPhotoSettings);
    fn will_capture_photo(&self, resolved: &ResolvedPhotoSettings);
    fn did_finish_processing_photo(&self, result: Result<Vec<u8>, CaptureError>);
    fn did_finish_recording_live_photo_movie(&self, resolved: &ResolvedPhotoSettings);
    fn did_finish_processing_live_photo_movie(&self, path: &Path, result: Result<(), CaptureError>);
    /// Always the last callback of a request
    fn did_finish_capture(&self, resolved: &ResolvedPhotoSettings, error: Option<CaptureError>);
}

/// Receives the progress of one movie recording
pub trait RecordingHandler: Send + Sync {
    fn did_start_recording(&self, path: &Path);
    /// Always the last callback of a recording
    fn did_finish_recording(&self, path: &Path, error: Option<CaptureError>);
}

/// Receives frames from the video data output
pub trait SampleBufferHandler: Send + Sync {
    fn did_output_frame(&self, frame: VideoFrame);
}

/// Complete capture pipeline trait
pub trait CapturePipeline: Send + Sync {
    // ===== Configuration transactions =====

    /// Start batching configuration changes
    fn begin_configuration(&self);

    /// Apply every change made since [`begin_configuration`](Self::begin_configuration)
    fn commit_configuration(&self);

    /// Discard every change made since [`begin_configuration`](Self::begin_configuration)
    fn rollback_configuration(&self);

    // ===== Inputs and outputs =====

    /// Attach an input; returns false if the pipeline cannot accept it
    fn add_input(&self, input: &CaptureInput) -> bool;

    fn remove_input(&self, input: &CaptureInput);

    /// Attach an output; returns false if the pipeline cannot accept it
    fn add_output(&self, output: OutputKind) -> bool;

    // ===== Connections =====

    fn set_connection_orientation(&self, output: OutputKind, orientation: VideoOrientation);

    fn set_connection_mirrored(&self, output: OutputKind, mirrored: bool);

    fn is_stabilization_supported(&self, output: OutputKind) -> bool;

    /// Let the pipeline pick the stabilization mode for the output's connection
    fn enable_auto_stabilization(&self, output: OutputKind);

    // ===== Photo output =====

    fn set_high_resolution_capture_enabled(&self, enabled: bool);

    fn is_live_photo_capture_supported(&self) -> bool;

    fn set_live_photo_capture_enabled(&self, enabled: bool);

    fn is_live_photo_capture_enabled(&self) -> bool;

    fn available_thumbnail_codecs(&self) -> Vec<ImageCodec>;

    /// Issue a photo request; progress is reported to `handler`
    fn capture_photo(&self, settings: PhotoSettings, handler: Arc<dyn PhotoCaptureHandler>);

    // ===== Movie file output =====

    fn start_recording(&self, path: PathBuf, handler: Arc<dyn RecordingHandler>);

    /// Ask the recorder to stop; completion is reported to the recording's handler
    fn stop_recording(&self);

    fn is_recording(&self) -> bool;

    // ===== Video data output =====

    fn set_sample_buffer_handler(&self, handler: Option<Arc<dyn SampleBufferHandler>>);

    // ===== Devices =====

    /// Continuous autofocus and auto exposure around `point`
    fn focus_and_expose(&self, device: &CaptureDevice, point: FocusPoint);

    // ===== Running state =====

    /// Start the pipeline; blocks until the hardware is running or failed
    fn start_running(&self);

    /// Stop the pipeline
    ///
    /// An active recording is finished first, reported to its handler with a
    /// recording error that still left a playable file. The running-change
    /// event may arrive after this returns.
    fn stop_running(&self);

    fn is_running(&self) -> bool;

    // ===== Observation =====

    /// Events may be delivered on any thread, including the caller's
    fn add_observer(&self, observer: PipelineObserver) -> ObserverToken;

    fn remove_observer(&self, token: ObserverToken);
}
