//! Stream registry for camera supervision
//!
//! The registry owns the set of streaming cameras. Each camera gets a capture
//! worker and, when it starts cleanly, a transcoder. Frames are fanned out to
//! callback listeners and `tokio::sync::broadcast` subscribers.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<StreamRegistry>
//!                     ┌─────────────────────────┐
//!                     │ entries: HashMap<Id,    │
//!                     │   RegistryEntry {       │
//!                     │     worker,             │
//!                     │     listeners,          │
//!                     │     frames_tx,          │
//!                     │   }                     │
//!                     │ >                       │
//!                     └───────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!   [capture-<id>]           [Listener]             [Subscriber]
//!   worker.read()            listener(id, frame)    frames_rx.recv()
//!         │                       ▲                       ▲
//!         └──► frame_handler() ───┴───────────────────────┘
//! ```
//!
//! # Lifecycle
//!
//! Start opens capture first and only then launches the transcoder; stop
//! tears them down in the reverse order. Status transitions are written to
//! the [`CameraStore`](crate::camera::CameraStore) as they happen.
//!
//! # Zero-Copy Design
//!
//! Frames are shared as `Arc<CapturedFrame>` whose payload is `bytes::Bytes`,
//! so every listener and subscriber sees the same allocation.

pub mod config;
pub mod entry;
pub mod error;
pub mod frame;
pub mod store;

pub use config::{RegistryConfig, CAMERA_ID_PLACEHOLDER};
pub use entry::RegistryEntry;
pub use error::RegistryError;
pub use frame::{FrameListener, ListenerError, ListenerResult};
pub use store::StreamRegistry;
