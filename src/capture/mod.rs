//! Capture worker
//!
//! One [`CaptureWorker`] owns the network video connection for one camera.
//! Reads happen on a dedicated thread; the most recent frame is published
//! into a single-slot mailbox ([`FrameSlot`]) that any number of readers can
//! snapshot without blocking the capture loop.
//!
//! ```text
//!   SourceConnector::open ──► VideoSource ──read()──► capture-<id> thread
//!                                                         │
//!                                  ┌──────────────────────┤
//!                                  ▼                      ▼
//!                          FrameSlot (latest)      FrameHandler (listeners)
//! ```

pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod source;
pub mod worker;

pub use config::CaptureConfig;
pub use error::{CaptureError, SourceError};
pub use ffmpeg::FfmpegConnector;
pub use frame::{CapturedFrame, Frame, FrameFormat, FrameSlot};
pub use source::{SourceConnector, SourceOptions, VideoSource};
pub use worker::{CaptureStats, CaptureWorker, FrameHandler};
