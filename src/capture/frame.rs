//! Frame types and the latest-frame mailbox

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Encoding of a frame payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// Complete JPEG image
    Jpeg,
}

/// A decoded video frame
///
/// Cheap to clone, the payload is reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Payload bytes
    pub data: Bytes,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Payload encoding
    pub format: FrameFormat,
}

impl Frame {
    pub fn new(data: Bytes, width: u32, height: u32, format: FrameFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
        }
    }

    /// Resolution as `WIDTHxHEIGHT`
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// A frame paired with its capture time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub frame: Frame,
    pub captured_at: DateTime<Utc>,
}

impl CapturedFrame {
    pub fn new(frame: Frame, captured_at: DateTime<Utc>) -> Self {
        Self { frame, captured_at }
    }
}

/// Single-slot, last-write-wins frame mailbox
///
/// The capture thread is the only writer. Readers always observe either the
/// previous or the current frame, never a partial one, and never wait on the
/// writer. Published frames are immutable, so handing out the shared `Arc`
/// is as good as a copy.
#[derive(Debug, Default)]
pub struct FrameSlot {
    latest: ArcSwapOption<CapturedFrame>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored frame
    pub fn publish(&self, frame: Arc<CapturedFrame>) {
        self.latest.store(Some(frame));
    }

    /// Latest frame, if any has been captured
    pub fn snapshot(&self) -> Option<Arc<CapturedFrame>> {
        self.latest.load_full()
    }
}
