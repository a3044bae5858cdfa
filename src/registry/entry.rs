//! Registry entry
//!
//! One entry per streaming camera. The entry exists exactly while the
//! registry considers the camera streaming.

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use tokio::sync::broadcast;

use super::frame::{dispatch, FrameListener};
use crate::capture::{CaptureWorker, CapturedFrame, FrameHandler};
use crate::stats::CameraStats;
use crate::transcode::TranscodeStats;

/// Copy-on-write listener list, read lock-free by the capture thread
pub(crate) type ListenerList = Arc<ArcSwap<Vec<FrameListener>>>;

/// Handler fanning frames out to listeners and broadcast subscribers
pub(crate) fn frame_handler(
    camera_id: &str,
    listeners: ListenerList,
    frames_tx: broadcast::Sender<Arc<CapturedFrame>>,
) -> FrameHandler {
    let camera_id = camera_id.to_string();

    Arc::new(move |frame: &Arc<CapturedFrame>| {
        dispatch(&camera_id, &listeners.load(), frame);
        // No subscribers is fine
        let _ = frames_tx.send(Arc::clone(frame));
    })
}

/// A streaming camera
pub struct RegistryEntry {
    pub(super) worker: Arc<CaptureWorker>,
    listeners: ListenerList,
    frames_tx: broadcast::Sender<Arc<CapturedFrame>>,
    /// Where the transcoded stream is published
    pub output_url: String,
    /// Why the transcoder failed to start, if it did
    pub transcode_error: Option<String>,
    /// When streaming started
    pub started_at: Instant,
}

impl RegistryEntry {
    pub(super) fn new(
        worker: Arc<CaptureWorker>,
        listeners: ListenerList,
        frames_tx: broadcast::Sender<Arc<CapturedFrame>>,
        output_url: String,
        transcode_error: Option<String>,
    ) -> Self {
        Self {
            worker,
            listeners,
            frames_tx,
            output_url,
            transcode_error,
            started_at: Instant::now(),
        }
    }

    /// Register a listener for subsequent frames
    pub fn add_listener(&self, listener: FrameListener) {
        self.listeners.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&listener));
            next
        });
    }

    /// Drop every listener
    pub fn clear_listeners(&self) {
        self.listeners.store(Arc::new(Vec::new()));
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.load().len()
    }

    /// Receive every subsequent frame
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<CapturedFrame>> {
        self.frames_tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.frames_tx.receiver_count()
    }

    /// Combined statistics
    pub fn stats(&self, transcode: Option<TranscodeStats>) -> CameraStats {
        CameraStats {
            capture: self.worker.stats(),
            transcode,
            output_url: self.output_url.clone(),
            transcode_error: self.transcode_error.clone(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            listeners: self.listener_count(),
            subscribers: self.subscriber_count(),
        }
    }
}
