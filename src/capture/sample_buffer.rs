// SPDX-License-Identifier: GPL-3.0-only

//! Keeps the most recent frame from the video data output
//!
//! The frame backs the blurred placeholder shown while the session is
//! suspended or reconfiguring. Readers get whatever frame was stored last and
//! may see a slightly stale one.

use super::pipeline::SampleBufferHandler;
use super::types::VideoFrame;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::trace;

/// Frame counter modulo for periodic logging
const FRAME_LOG_INTERVAL: u64 = 30;

#[derive(Default)]
pub struct VideoOutputSampleBufferDelegate {
    latest: Mutex<Option<Arc<VideoFrame>>>,
    frames_received: AtomicU64,
}

impl VideoOutputSampleBufferDelegate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the last delivered frame
    pub fn latest_frame(&self) -> Option<Arc<VideoFrame>> {
        self.latest.lock().unwrap().clone()
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }
}

impl SampleBufferHandler for VideoOutputSampleBufferDelegate {
    fn did_output_frame(&self, frame: VideoFrame) {
        let count = self.frames_received.fetch_add(1, Ordering::Relaxed) + 1;
        if count % FRAME_LOG_INTERVAL == 0 {
            trace!(count, width = frame.width, height = frame.height, "Video data frames received");
        }
        *self.latest.lock().unwrap() = Some(Arc::new(frame));
    }
}

impl std::fmt::Debug for VideoOutputSampleBufferDelegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoOutputSampleBufferDelegate")
            .field("frames_received", &self.frames_received())
            .finish()
    }
}
