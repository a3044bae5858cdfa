//! Camera stream supervision
//!
//! Keeps live video connections to IP cameras alive and re-encodes them into a
//! browser-friendly codec through an external `ffmpeg` process.
//!
//! # Architecture
//!
//! ```text
//!                        StreamRegistry
//!              ┌──────────────────────────────────┐
//!              │ entries: HashMap<CameraId,       │
//!              │   RegistryEntry {                │
//!              │     worker: CaptureWorker,       │
//!              │     listeners, frames_tx,        │
//!              │   }                              │
//!              │ >                                │
//!              │ transcoder: TranscodeSupervisor  │
//!              └───────┬──────────────┬───────────┘
//!                      │              │
//!                      ▼              ▼
//!          [capture-<id> thread]   [ffmpeg process]
//!          read → FrameSlot        RTSP in → H.264 RTSP out
//!               → listeners        stderr → log monitor task
//! ```
//!
//! The registry is the only entry point the rest of an application needs.
//! Camera records, credentials and status persistence stay behind the
//! [`camera::CameraStore`] trait.

pub mod camera;
pub mod capture;
pub mod error;
pub mod registry;
pub mod stats;
pub mod transcode;

#[cfg(test)]
pub(crate) mod testing;

pub use camera::{CameraDescriptor, CameraStatus, CameraStore, Credentials, MemoryCameraStore};
pub use capture::{CaptureConfig, CaptureWorker, CapturedFrame, Frame};
pub use error::{Error, Result};
pub use registry::{RegistryConfig, StreamRegistry};
pub use stats::CameraStats;
pub use transcode::{TranscodeConfig, TranscodeSupervisor};
