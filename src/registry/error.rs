//! Registry error types

use crate::camera::StoreError;
use crate::capture::CaptureError;
use crate::transcode::TranscodeError;

/// Error type for registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No such camera in the store, or not streaming
    #[error("Camera not found: {0}")]
    CameraNotFound(String),

    /// The camera exists but is disabled
    #[error("Camera is disabled: {0}")]
    CameraDisabled(String),

    /// The capture worker failed to start
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// The transcoder could not be stopped
    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    /// The persistence collaborator failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A blocking capture task panicked or was cancelled
    #[error("Capture task failed for camera {camera_id}: {reason}")]
    TaskFailed { camera_id: String, reason: String },
}
