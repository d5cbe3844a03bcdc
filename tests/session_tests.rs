// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the capture session against the virtual backend

use image_picker::backends::virtual_camera::{VirtualAuthorizer, VirtualEnvironment};
use image_picker::capture::pipeline::FocusPoint;
use image_picker::capture::{
    AuthorizationStatus, CapturePipeline, InterruptionReason, SessionState, SetupResult,
    VideoOrientation,
};
use image_picker::config::CaptureSettings;
use image_picker::errors::{CaptureError, RuntimeError};
use image_picker::{CaptureSession, EventForwarder, LivePhotoMode, PickerEvent, SessionPreset};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

struct Harness {
    env: VirtualEnvironment,
    session: CaptureSession,
    events: UnboundedReceiver<PickerEvent>,
    temp_dir: TempDir,
}

impl Harness {
    fn new(preset: SessionPreset) -> Self {
        Self::with_env(preset, VirtualEnvironment::new())
    }

    fn with_env(preset: SessionPreset, env: VirtualEnvironment) -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let settings = CaptureSettings {
            preset,
            temp_dir: Some(temp_dir.path().to_path_buf()),
            ..CaptureSettings::default()
        };
        let session = CaptureSession::new(env.capture_environment(), &settings).unwrap();
        let (forwarder, events) = EventForwarder::channel();
        session.set_delegates(Arc::new(forwarder));
        Self {
            env,
            session,
            events,
            temp_dir,
        }
    }

    /// Prepare, attach the preview and start running
    fn started(preset: SessionPreset) -> Self {
        let mut harness = Self::new(preset);
        harness.session.prepare();
        harness.session.attach_preview(VideoOrientation::Portrait);
        harness.session.resume();
        harness.session.flush();
        assert_eq!(harness.drain().last(), Some(&PickerEvent::DidResume));
        harness
    }

    fn drain(&mut self) -> Vec<PickerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    fn temp_files(&self) -> usize {
        count_files(self.temp_dir.path())
    }
}

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

fn live_photo_counts(events: &[PickerEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|event| match event {
            PickerEvent::DidChangeNumberOfProcessingLivePhotos(count) => Some(*count),
            _ => None,
        })
        .collect()
}

// ===== Lifecycle =====

#[test]
fn test_prepare_configures_photo_session() {
    let h = Harness::started(SessionPreset::Photos);

    assert_eq!(h.session.state(), SessionState::Running);
    assert_eq!(h.session.setup_result(), SetupResult::Success);
    assert!(h.session.is_session_running());
    assert_eq!(h.session.current_video_device().unwrap().id, "back-dual");

    let stats = h.env.pipeline.stats();
    assert_eq!(stats.begin_configuration, 1);
    assert_eq!(stats.commit_configuration, 1);
    assert!(h.env.pipeline.is_high_resolution_capture_enabled());
    assert!(h.env.pipeline.has_sample_buffer_handler());
}

#[test]
fn test_running_notifications_are_deduplicated() {
    let mut h = Harness::started(SessionPreset::Photos);

    h.env
        .pipeline
        .emit(image_picker::capture::PipelineEvent::RunningChanged(true));
    h.session.resume();
    h.session.flush();
    assert!(h.drain().is_empty(), "already running, nothing to report");

    h.session.suspend();
    h.session.flush();
    h.session.suspend();
    h.session.flush();
    assert_eq!(h.drain(), vec![PickerEvent::DidSuspend]);
    assert_eq!(h.session.state(), SessionState::Suspended);
    assert_eq!(h.env.pipeline.observer_count(), 0);

    h.session.resume();
    h.session.flush();
    assert_eq!(h.drain(), vec![PickerEvent::DidResume]);
}

#[test]
fn test_resume_reported_after_silent_stop() {
    let mut h = Harness::started(SessionPreset::Photos);
    h.env.pipeline.set_withhold_stop_event(true);

    h.session.suspend();
    h.session.flush();
    assert!(h.drain().is_empty());
    assert!(!h.session.is_session_running());

    h.session.resume();
    h.session.flush();
    assert_eq!(h.drain(), vec![PickerEvent::DidResume]);
    assert_eq!(h.session.state(), SessionState::Running);
}

#[test]
fn test_prepare_only_runs_once() {
    let h = Harness::started(SessionPreset::Photos);
    h.session.prepare();
    h.session.flush();
    assert_eq!(h.env.pipeline.stats().begin_configuration, 1);
}

#[test]
fn test_not_determined_access_configures_once_granted() {
    let env = VirtualEnvironment::with_authorizer(VirtualAuthorizer::new(
        AuthorizationStatus::NotDetermined,
    ));
    let mut h = Harness::with_env(SessionPreset::Photos, env);

    h.session.prepare();
    assert!(h.env.authorizer.has_pending_request());
    assert_eq!(h.env.pipeline.stats().begin_configuration, 0);

    assert!(h.env.authorizer.answer(true));
    h.session.flush();

    assert_eq!(h.env.authorizer.request_count(), 1);
    assert_eq!(h.env.pipeline.stats().begin_configuration, 1);
    assert_eq!(h.session.setup_result(), SetupResult::Success);
    assert_eq!(h.drain(), vec![PickerEvent::AuthorizationStatusGranted]);
}

#[test]
fn test_prompt_answered_on_another_thread() {
    let env = VirtualEnvironment::with_authorizer(VirtualAuthorizer::prompting(true));
    let h = Harness::with_env(SessionPreset::Photos, env);

    h.session.prepare();
    h.session.flush();

    assert_eq!(h.env.pipeline.stats().begin_configuration, 1);
    assert_eq!(h.session.state(), SessionState::Ready);
}

#[test]
fn test_denied_access_skips_configuration() {
    let env = VirtualEnvironment::with_authorizer(VirtualAuthorizer::new(
        AuthorizationStatus::NotDetermined,
    ));
    let mut h = Harness::with_env(SessionPreset::Photos, env);

    h.session.prepare();
    h.env.authorizer.answer(false);
    h.session.resume();
    h.session.flush();

    assert_eq!(h.env.pipeline.stats().begin_configuration, 0);
    assert_eq!(h.session.setup_result(), SetupResult::NotAuthorized);
    assert_eq!(h.session.state(), SessionState::NotAuthorized);
    assert_eq!(
        h.drain(),
        vec![PickerEvent::AuthorizationStatusFailed(
            AuthorizationStatus::Denied
        )]
    );
    assert!(!h.env.pipeline.is_running());
}

#[test]
fn test_restricted_access_reported_on_resume() {
    let env = VirtualEnvironment::with_authorizer(VirtualAuthorizer::new(
        AuthorizationStatus::Restricted,
    ));
    let mut h = Harness::with_env(SessionPreset::Photos, env);

    h.session.prepare();
    h.session.resume();
    h.session.flush();

    assert_eq!(h.env.authorizer.request_count(), 0);
    assert_eq!(
        h.drain(),
        vec![PickerEvent::AuthorizationStatusFailed(
            AuthorizationStatus::Restricted
        )]
    );
}

#[test]
fn test_fatal_configuration_error_rolls_back() {
    let env = VirtualEnvironment::new();
    env.pipeline
        .reject_output(image_picker::capture::OutputKind::Photo);
    let mut h = Harness::with_env(SessionPreset::Photos, env);

    h.session.prepare();
    h.session.resume();
    h.session.flush();

    assert_eq!(h.session.setup_result(), SetupResult::ConfigurationFailed);
    assert_eq!(h.session.state(), SessionState::ConfigurationFailed);
    assert_eq!(h.env.pipeline.stats().rollback_configuration, 1);
    assert!(h.env.pipeline.inputs().is_empty());
    assert_eq!(h.drain(), vec![PickerEvent::DidFailConfiguringSession]);
}

#[test]
fn test_missing_microphone_is_tolerated() {
    let env = VirtualEnvironment::new();
    env.discovery.set_audio_device(None);
    let mut h = Harness::with_env(SessionPreset::Videos, env);

    h.session.prepare();
    h.session.flush();

    assert_eq!(h.session.setup_result(), SetupResult::Success);
    assert_eq!(h.drain(), vec![PickerEvent::DidBecomeReadyForVideoRecording]);
}

#[test]
fn test_drop_stops_pipeline() {
    let h = Harness::started(SessionPreset::Photos);
    let pipeline = Arc::clone(&h.env.pipeline);
    drop(h.session);

    assert!(!pipeline.is_running());
    assert_eq!(pipeline.observer_count(), 0);
    assert!(!pipeline.has_sample_buffer_handler());
}

// ===== Pipeline events =====

#[test]
fn test_media_services_reset_restarts_pipeline() {
    let mut h = Harness::started(SessionPreset::Photos);

    h.env
        .pipeline
        .raise_runtime_error(RuntimeError::MediaServicesWereReset);
    h.session.flush();

    assert_eq!(h.env.pipeline.stats().start_running, 2);
    assert!(h.env.pipeline.is_running());
    assert_eq!(
        h.drain(),
        vec![PickerEvent::DidSuspend, PickerEvent::DidResume]
    );
}

#[test]
fn test_other_runtime_errors_are_reported() {
    let mut h = Harness::started(SessionPreset::Photos);

    h.env
        .pipeline
        .raise_runtime_error(RuntimeError::DeviceDisconnected);
    h.session.flush();

    assert_eq!(h.env.pipeline.stats().start_running, 1);
    assert_eq!(
        h.drain(),
        vec![PickerEvent::DidFail(RuntimeError::DeviceDisconnected)]
    );
}

#[test]
fn test_interruptions_are_forwarded() {
    let mut h = Harness::started(SessionPreset::Photos);

    h.env
        .pipeline
        .interrupt(InterruptionReason::VideoDeviceInUseByAnotherClient);
    h.env.pipeline.end_interruption();

    assert_eq!(
        h.drain(),
        vec![
            PickerEvent::WasInterrupted(InterruptionReason::VideoDeviceInUseByAnotherClient),
            PickerEvent::InterruptionDidEnd,
        ]
    );
}

#[test]
fn test_subject_area_change_refocuses_center() {
    let h = Harness::started(SessionPreset::Photos);

    h.env.pipeline.change_subject_area();
    h.session.flush();

    assert_eq!(
        h.env.pipeline.focus_requests(),
        vec![("back-dual".to_string(), FocusPoint::CENTER)]
    );
}

#[test]
fn test_sampled_frames_are_kept() {
    let h = Harness::started(SessionPreset::Photos);
    assert!(h.session.latest_video_frame().is_some());

    h.session.update_video_orientation(VideoOrientation::LandscapeLeft);
    h.session.flush();
    h.env.pipeline.push_frame();

    let frame = h.session.latest_video_frame().unwrap();
    assert_eq!(frame.orientation, VideoOrientation::LandscapeLeft);
}

// ===== Camera switching =====

#[test]
fn test_change_camera_flips_sides() {
    let h = Harness::started(SessionPreset::Photos);

    h.session.change_camera(|| {});
    h.session.flush();
    assert_eq!(h.session.current_video_device().unwrap().id, "front-wide");
    assert_eq!(h.env.pipeline.video_input().unwrap().id, "front-wide");

    h.session.change_camera(|| {});
    h.session.flush();
    assert_eq!(h.session.current_video_device().unwrap().id, "back-dual");
}

#[test]
fn test_failed_camera_change_keeps_input() {
    let h = Harness::started(SessionPreset::Photos);
    h.env.pipeline.reject_input("front-wide");

    let (tx, rx) = std::sync::mpsc::channel();
    h.session.change_camera(move || tx.send(()).unwrap());
    rx.recv().unwrap();
    h.session.flush();

    assert_eq!(h.session.current_video_device().unwrap().id, "back-dual");
    assert_eq!(h.env.pipeline.video_input().unwrap().id, "back-dual");
    assert!(!h.env.pipeline.is_in_configuration());
}

#[test]
fn test_change_camera_completion_runs_without_alternate() {
    let env = VirtualEnvironment::new();
    env.discovery.remove_video_device("front-wide");
    let mut h = Harness::with_env(SessionPreset::Photos, env);
    h.session.prepare();

    let (tx, rx) = std::sync::mpsc::channel();
    h.session.change_camera(move || tx.send(()).unwrap());
    rx.recv().unwrap();

    assert_eq!(h.session.current_video_device().unwrap().id, "back-dual");
    assert!(h.drain().is_empty());
}

// ===== Photos =====

#[test]
fn test_photo_capture_reports_data() {
    let mut h = Harness::started(SessionPreset::Photos);

    h.session.capture_photo(LivePhotoMode::Off, false);
    h.session.flush();

    let events = h.drain();
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], PickerEvent::WillCapturePhoto(_)));
    match &events[1] {
        PickerEvent::DidCapturePhotoData { data, settings } => {
            assert!(!data.is_empty());
            assert!(settings.high_resolution_enabled);
            assert!(settings.live_photo_movie_path.is_none());
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(h.session.in_flight_photo_captures(), 0);
    assert_eq!(h.env.library.asset_count(), 0);
}

#[test]
fn test_photo_without_preview_is_ignored() {
    let mut h = Harness::started(SessionPreset::Photos);
    h.session.detach_preview();

    h.session.capture_photo(LivePhotoMode::Off, true);
    h.session.flush();

    assert!(h.drain().is_empty());
    assert_eq!(h.env.pipeline.stats().photos_captured, 0);
}

#[test]
fn test_concurrent_photo_requests_tracked_independently() {
    let mut h = Harness::started(SessionPreset::Photos);
    h.env.pipeline.set_manual_photo_completion(true);

    h.session.capture_photo(LivePhotoMode::Off, true);
    h.session.capture_photo(LivePhotoMode::Off, true);
    h.session.flush();
    assert_eq!(h.session.in_flight_photo_captures(), 2);

    assert_eq!(h.env.pipeline.complete_pending_photos(), 2);
    h.session.flush();

    assert_eq!(h.session.in_flight_photo_captures(), 0);
    assert_eq!(h.env.library.asset_count(), 2);

    let ids: Vec<_> = h
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            PickerEvent::DidCapturePhotoData { settings, .. } => Some(settings.unique_id),
            _ => None,
        })
        .collect();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
}

#[test]
fn test_live_photo_counter_round_trip() {
    let mut h = Harness::started(SessionPreset::LivePhotos);
    h.env.pipeline.set_manual_photo_completion(true);

    h.session.capture_photo(LivePhotoMode::On, false);
    h.session.capture_photo(LivePhotoMode::On, false);
    h.session.flush();
    assert_eq!(h.session.processing_live_photos(), 2);

    h.env.pipeline.complete_pending_photos();
    h.session.flush();

    assert_eq!(h.session.processing_live_photos(), 0);
    assert_eq!(live_photo_counts(&h.drain()), vec![1, 2, 1, 0]);
    assert_eq!(h.temp_files(), 0);
}

#[test]
fn test_failed_live_photo_balances_counter() {
    let mut h = Harness::started(SessionPreset::LivePhotos);
    h.env
        .pipeline
        .fail_next_photo(CaptureError::PhotoFailed("sensor".into()));

    h.session.capture_photo(LivePhotoMode::On, true);
    h.session.flush();

    let events = h.drain();
    assert!(events.contains(&PickerEvent::DidFailCapturingPhoto(
        CaptureError::PhotoFailed("sensor".into())
    )));
    assert_eq!(live_photo_counts(&events), vec![1, 0]);
    assert_eq!(h.session.in_flight_photo_captures(), 0);
    assert_eq!(h.env.library.asset_count(), 0);
    assert_eq!(h.temp_files(), 0, "partial companion movie is removed");
}

#[test]
fn test_saved_live_photo_leaves_no_temp_files() {
    let mut h = Harness::started(SessionPreset::LivePhotos);

    h.session.capture_photo(LivePhotoMode::On, true);
    h.session.flush();

    let events = h.drain();
    let movie = events
        .iter()
        .find_map(|event| match event {
            PickerEvent::DidCapturePhotoDataWithCompanionMovie { movie, .. } => Some(movie.clone()),
            _ => None,
        })
        .expect("live photo reported");
    assert!(movie.starts_with(h.temp_dir.path()));
    assert!(!movie.exists());

    let assets = h.env.library.assets();
    assert_eq!(assets.len(), 1);
    assert!(assets[0].is_live_photo);
    assert_eq!(h.temp_files(), 0);
}

#[test]
fn test_live_mode_falls_back_to_still_photo() {
    let mut h = Harness::started(SessionPreset::Photos);

    h.session.capture_photo(LivePhotoMode::On, false);
    h.session.flush();

    let events = h.drain();
    assert!(events
        .iter()
        .any(|event| matches!(event, PickerEvent::DidCapturePhotoData { .. })));
    assert!(live_photo_counts(&events).is_empty());
}

#[test]
fn test_denied_library_still_completes() {
    let mut h = Harness::started(SessionPreset::Photos);
    h.env
        .library
        .set_authorization_status(AuthorizationStatus::Denied);

    h.session.capture_photo(LivePhotoMode::Off, true);
    h.session.flush();

    assert!(h
        .drain()
        .iter()
        .any(|event| matches!(event, PickerEvent::DidCapturePhotoData { .. })));
    assert_eq!(h.env.library.asset_count(), 0);
}

// ===== Video =====

#[test]
fn test_video_recording_saved_without_temp_files() {
    let mut h = Harness::started(SessionPreset::Videos);

    h.session.start_video_recording(true);
    h.session.flush();
    assert!(h.session.is_recording_video());
    assert_eq!(h.env.background_tasks.active_count(), 1);

    h.session.stop_video_recording(false);
    h.session.flush();

    let events = h.drain();
    assert_eq!(events[0], PickerEvent::DidStartVideoRecording);
    assert!(matches!(
        events[1],
        PickerEvent::DidFinishVideoRecording(_)
    ));
    assert!(!h.session.is_recording_video());
    assert_eq!(h.env.library.asset_count(), 1);
    assert!(h.env.library.stored_bytes() > 0);
    assert_eq!(h.temp_files(), 0);
    assert_eq!(h.env.background_tasks.active_count(), 0);
    assert_eq!(h.env.background_tasks.granted_count(), 1);
}

#[test]
fn test_cancelled_recording_is_discarded() {
    let mut h = Harness::started(SessionPreset::Videos);

    h.session.start_video_recording(true);
    h.session.stop_video_recording(true);
    h.session.flush();

    assert_eq!(
        h.drain(),
        vec![
            PickerEvent::DidStartVideoRecording,
            PickerEvent::DidCancelVideoRecording
        ]
    );
    assert_eq!(h.env.library.asset_count(), 0);
    assert_eq!(h.temp_files(), 0);
    assert_eq!(h.env.background_tasks.active_count(), 0);
}

#[test]
fn test_interrupted_recording_is_kept() {
    let mut h = Harness::started(SessionPreset::Videos);
    let reason = CaptureError::Recording {
        message: "disk full".into(),
        successfully_finished: true,
    };
    h.env.pipeline.fail_next_recording(reason.clone());

    h.session.start_video_recording(true);
    h.session.stop_video_recording(false);
    h.session.flush();

    let events = h.drain();
    assert!(matches!(
        &events[1],
        PickerEvent::DidInterruptVideoRecording { reason: r, .. } if *r == reason
    ));
    assert_eq!(h.env.library.asset_count(), 1);
    assert_eq!(h.temp_files(), 0);
}

#[test]
fn test_failed_recording_is_discarded() {
    let mut h = Harness::started(SessionPreset::Videos);
    let error = CaptureError::Recording {
        message: "encoder".into(),
        successfully_finished: false,
    };
    h.env.pipeline.fail_next_recording(error.clone());

    h.session.start_video_recording(true);
    h.session.stop_video_recording(false);
    h.session.flush();

    assert_eq!(
        h.drain(),
        vec![
            PickerEvent::DidStartVideoRecording,
            PickerEvent::DidFailVideoRecording(error)
        ]
    );
    assert_eq!(h.env.library.asset_count(), 0);
    assert_eq!(h.temp_files(), 0);
}

#[test]
fn test_suspend_during_recording_finishes_it() {
    let mut h = Harness::started(SessionPreset::Videos);

    h.session.start_video_recording(true);
    h.session.flush();
    assert_eq!(h.env.background_tasks.active_count(), 1);

    h.session.suspend();
    h.session.flush();

    let events = h.drain();
    assert_eq!(events[0], PickerEvent::DidStartVideoRecording);
    assert!(matches!(
        events[1],
        PickerEvent::DidFinishVideoRecording(_)
    ));
    assert_eq!(events[2], PickerEvent::DidSuspend);
    assert!(!h.session.is_recording_video());
    assert!(!h.env.pipeline.is_recording());
    assert_eq!(h.env.library.asset_count(), 1);
    assert_eq!(h.temp_files(), 0);
    assert_eq!(h.env.background_tasks.active_count(), 0);
}

#[test]
fn test_drop_during_recording_releases_lease() {
    let Harness {
        env,
        session,
        mut events,
        temp_dir,
    } = Harness::started(SessionPreset::Videos);

    session.start_video_recording(false);
    session.flush();
    assert_eq!(env.background_tasks.active_count(), 1);
    assert_eq!(count_files(temp_dir.path()), 1);

    drop(session);

    assert!(!env.pipeline.is_running());
    assert!(!env.pipeline.is_recording());
    assert_eq!(env.background_tasks.active_count(), 0);
    assert_eq!(count_files(temp_dir.path()), 0);
    assert_eq!(env.library.asset_count(), 0);
    assert_eq!(events.try_recv().unwrap(), PickerEvent::DidStartVideoRecording);
    assert!(matches!(
        events.try_recv().unwrap(),
        PickerEvent::DidFinishVideoRecording(_)
    ));
}

#[test]
fn test_photo_preset_rejects_video() {
    let mut h = Harness::started(SessionPreset::Photos);

    h.session.start_video_recording(true);
    h.session.stop_video_recording(false);
    h.session.flush();

    assert!(h.drain().is_empty());
    assert!(!h.session.is_recording_video());
    assert_eq!(h.env.pipeline.stats().recordings_started, 0);
}

#[test]
fn test_second_recording_request_is_ignored() {
    let mut h = Harness::started(SessionPreset::Videos);

    h.session.start_video_recording(false);
    h.session.start_video_recording(false);
    h.session.flush();

    assert_eq!(h.env.pipeline.stats().recordings_started, 1);
    assert_eq!(h.drain(), vec![PickerEvent::DidStartVideoRecording]);

    h.session.stop_video_recording(true);
    h.session.flush();
}
