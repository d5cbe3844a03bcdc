// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for the capture engine
//!
//! This module provides command-line functionality for:
//! - Listing capture devices
//! - Taking photos and live photos
//! - Recording videos
//! - Flipping cameras
//! - Scrolling the asset grid
//! - Inspecting the configuration
//!
//! Capture commands run a real [`CaptureSession`] against the virtual backend
//! and print the delegate events it produces.

use image_picker::backends::virtual_camera::{VirtualEnvironment, VirtualImageCache, VirtualLibrary};
use image_picker::capture::device::default_video_device;
use image_picker::capture::{DeviceDiscovery, VideoOrientation};
use image_picker::config::{Appearance, CaptureSettings};
use image_picker::grid::{AssetGridLayout, ImagePickerAssetCacheItem, Rect, ScrollDirection, Size};
use image_picker::{
    CaptureSession, Config, EventForwarder, LivePhotoMode, PickerEvent, SessionPreset,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// How long to wait for any single delegate callback
const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Load the config from `path`, or from the default location
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    Ok(config)
}

/// List all available capture devices
pub fn list_devices() -> CliResult {
    let env = VirtualEnvironment::new();
    let devices = env.discovery.video_devices();
    let default = default_video_device(env.discovery.as_ref());

    if devices.is_empty() {
        println!("No cameras found.");
    } else {
        println!("Available cameras:");
        println!();
        for (index, device) in devices.iter().enumerate() {
            let marker = if default.as_ref().is_some_and(|d| d.id == device.id) {
                " (default)"
            } else {
                ""
            };
            println!("  [{}] {}{}", index, device.name, marker);
            println!(
                "      {} {}, flash: {}, stabilization: {}",
                device.position,
                device.device_type,
                yes_no(device.has_flash),
                yes_no(device.supports_stabilization)
            );
        }
        println!();
    }

    match env.discovery.default_audio_device() {
        Some(audio) => println!("Microphone: {}", audio.name),
        None => println!("No microphone found."),
    }
    Ok(())
}

/// Take a photo, optionally with a live photo companion movie
pub async fn take_photo(config: &Config, live: bool, save: bool) -> CliResult {
    let mut settings = config.capture.clone();
    if live {
        settings.preset = SessionPreset::LivePhotos;
    }
    let save = save
        && if live {
            config.capture.saves_captured_live_photos_to_library
        } else {
            config.capture.saves_captured_photos_to_library
        };

    let (env, session, mut events) = start_session(&settings).await?;
    let mode = if live {
        LivePhotoMode::On
    } else {
        LivePhotoMode::Off
    };
    println!("Capturing...");
    session.capture_photo(mode, save);

    wait_for(&mut events, |event| {
        matches!(
            event,
            PickerEvent::DidCapturePhotoData { .. }
                | PickerEvent::DidCapturePhotoDataWithCompanionMovie { .. }
                | PickerEvent::DidFailCapturingPhoto(_)
        )
    })
    .await?;

    drain(&mut events);
    println!("Library now holds {} asset(s)", env.library.asset_count());
    Ok(())
}

/// Record a video for `duration_ms`, then finish or cancel it
pub async fn record_video(
    settings: &CaptureSettings,
    duration_ms: u64,
    cancel: bool,
    save: bool,
) -> CliResult {
    let save = save && settings.saves_captured_videos_to_library;
    let (env, session, mut events) = start_session(settings).await?;

    session.start_video_recording(save);
    wait_for(&mut events, |event| {
        matches!(
            event,
            PickerEvent::DidStartVideoRecording | PickerEvent::DidFailVideoRecording(_)
        )
    })
    .await?;
    if !session.is_recording_video() {
        return Err("recording did not start".into());
    }

    println!("Recording for {} ms...", duration_ms);
    tokio::time::sleep(Duration::from_millis(duration_ms)).await;
    session.stop_video_recording(cancel);

    wait_for(&mut events, |event| {
        matches!(
            event,
            PickerEvent::DidFinishVideoRecording(_)
                | PickerEvent::DidCancelVideoRecording
                | PickerEvent::DidInterruptVideoRecording { .. }
                | PickerEvent::DidFailVideoRecording(_)
        )
    })
    .await?;

    drain(&mut events);
    println!("Library now holds {} asset(s)", env.library.asset_count());
    Ok(())
}

/// Switch to the camera on the other side
pub async fn flip_camera(config: &Config) -> CliResult {
    let (_env, session, mut events) = start_session(&config.capture).await?;
    if let Some(device) = session.current_video_device() {
        println!("Current camera: {}", device.name);
    }

    let (tx, rx) = oneshot::channel();
    session.change_camera(move || {
        let _ = tx.send(());
    });
    tokio::time::timeout(EVENT_TIMEOUT, rx).await??;

    drain(&mut events);
    match session.current_video_device() {
        Some(device) => println!("Switched to: {}", device.name),
        None => println!("No camera configured"),
    }
    Ok(())
}

/// Scroll the asset grid from start to end and report thumbnail preheating
pub fn scroll_grid(
    config: &Config,
    assets: usize,
    viewport: Size,
    scale: f64,
    rotate: bool,
) -> CliResult {
    let library = VirtualLibrary::with_photos(assets);
    let cache = Arc::new(VirtualImageCache::new());
    let direction = config.layout.scroll_direction;
    let layout = AssetGridLayout::new(&config.layout, cross_extent(direction, viewport));
    print_layout(&layout, assets);

    let mut item = ImagePickerAssetCacheItem::new(&library, cache.clone(), layout.clone());
    item.set_thumbnail_size(layout.thumbnail_size(scale));

    let mut viewport = viewport;
    let mut extent = layout.content_extent(assets);
    let mut offset = 0.0;
    let mut rotated = false;
    loop {
        let visible = match direction {
            ScrollDirection::Vertical => Rect::new(0.0, offset, viewport.width, viewport.height),
            ScrollDirection::Horizontal => Rect::new(offset, 0.0, viewport.width, viewport.height),
        };
        if item.update_cached_assets(visible) {
            println!("  offset {:>7.0}: {} thumbnail(s) cached", offset, cache.cached_count());
        }

        offset += (scroll_extent(direction, viewport) / 2.0).max(1.0);
        if rotate && !rotated && offset >= extent / 2.0 {
            rotated = true;
            viewport = Size::new(viewport.height, viewport.width);
            let layout = AssetGridLayout::new(&config.layout, cross_extent(direction, viewport));
            println!("Rotated to {}x{}", viewport.width, viewport.height);
            print_layout(&layout, assets);
            extent = layout.content_extent(assets);
            item.set_thumbnail_size(layout.thumbnail_size(scale));
            item.set_layout(layout);
        }
        if offset >= extent {
            break;
        }
    }

    item.reset_cached_assets();
    println!("Done, {} thumbnail(s) still cached", cache.cached_count());
    Ok(())
}

fn cross_extent(direction: ScrollDirection, viewport: Size) -> f64 {
    match direction {
        ScrollDirection::Vertical => viewport.width,
        ScrollDirection::Horizontal => viewport.height,
    }
}

fn scroll_extent(direction: ScrollDirection, viewport: Size) -> f64 {
    match direction {
        ScrollDirection::Vertical => viewport.height,
        ScrollDirection::Horizontal => viewport.width,
    }
}

fn print_layout(layout: &AssetGridLayout, assets: usize) {
    let cell = layout.item_size();
    println!(
        "Grid: {} asset(s), {} per line, {:.1}x{:.1} cells, {:.0} points long",
        assets,
        layout.items_per_line,
        cell.width,
        cell.height,
        layout.content_extent(assets)
    );
}

/// Print the effective configuration, or just its location
pub fn show_config(config: &Config, explicit: Option<&Path>, path_only: bool) -> CliResult {
    let location = explicit.map(Path::to_path_buf).or_else(Config::default_path);
    if path_only {
        match location {
            Some(path) => println!("{}", path.display()),
            None => println!("No config directory available"),
        }
        return Ok(());
    }

    if let Some(path) = location {
        let state = if path.exists() { "" } else { " (not created yet)" };
        println!("# {}{}", path.display(), state);
    }
    println!("{}", serde_json::to_string_pretty(config)?);

    let appearance = config.appearance.resolve(&Appearance::default());
    println!(
        "# appearance: background {}, selection {}, corner radius {}",
        String::from(appearance.background_color),
        String::from(appearance.selection_color),
        appearance.cell_corner_radius
    );
    Ok(())
}

/// Create, configure and start a session on the virtual backend
async fn start_session(
    settings: &CaptureSettings,
) -> Result<
    (
        VirtualEnvironment,
        CaptureSession,
        mpsc::UnboundedReceiver<PickerEvent>,
    ),
    Box<dyn std::error::Error>,
> {
    let env = VirtualEnvironment::new();
    let session = CaptureSession::new(env.capture_environment(), settings)?;
    let (forwarder, mut events) = EventForwarder::channel();
    session.set_delegates(Arc::new(forwarder));

    println!("Preset: {}", settings.preset.display_name());
    session.prepare();
    session.attach_preview(VideoOrientation::Portrait);
    session.resume();

    let event = wait_for(&mut events, |event| {
        matches!(
            event,
            PickerEvent::DidResume
                | PickerEvent::DidFailConfiguringSession
                | PickerEvent::AuthorizationStatusFailed(_)
                | PickerEvent::DidFail(_)
        )
    })
    .await?;
    if event != PickerEvent::DidResume {
        return Err("capture session did not start".into());
    }

    if let Some(device) = session.current_video_device() {
        println!("Using camera: {}", device.name);
    }
    Ok((env, session, events))
}

/// Print events until one matches `done`, and return it
async fn wait_for<F>(
    events: &mut mpsc::UnboundedReceiver<PickerEvent>,
    done: F,
) -> Result<PickerEvent, Box<dyn std::error::Error>>
where
    F: Fn(&PickerEvent) -> bool,
{
    loop {
        let event = match tokio::time::timeout(EVENT_TIMEOUT, events.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => return Err("capture session closed".into()),
            Err(_) => return Err("timed out waiting for the capture session".into()),
        };
        print_event(&event);
        if done(&event) {
            return Ok(event);
        }
    }
}

/// Print whatever has already arrived
fn drain(events: &mut mpsc::UnboundedReceiver<PickerEvent>) {
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }
}

fn print_event(event: &PickerEvent) {
    debug!(?event, "Delegate event");
    match event {
        PickerEvent::DidCapturePhotoData { data, settings } => {
            println!("  photo captured: {} bytes ({})", data.len(), settings.unique_id);
        }
        PickerEvent::DidCapturePhotoDataWithCompanionMovie {
            data,
            movie,
            settings,
        } => {
            println!(
                "  live photo captured: {} bytes, movie {} ({})",
                data.len(),
                movie.display(),
                settings.unique_id
            );
        }
        PickerEvent::WillCapturePhoto(settings) => {
            println!("  will capture photo ({})", settings.unique_id);
        }
        PickerEvent::DidFinishVideoRecording(path) => {
            println!("  video recorded: {}", path.display());
        }
        other => println!("  {:?}", other),
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
