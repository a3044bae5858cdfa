//! Capture error types

/// Error raised by a video source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The source could not be opened
    #[error("Failed to open video source: {0}")]
    Open(String),

    /// The source was released while in use
    #[error("Video source closed")]
    Closed,

    /// The stream produced data that is not a frame
    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error type for capture worker operations
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Opening the source failed
    #[error("Failed to open stream for camera {camera_id}: {source}")]
    Open {
        camera_id: String,
        #[source]
        source: SourceError,
    },

    /// The source opened but the probe read returned nothing
    #[error("No frame received from camera {0}")]
    NoFirstFrame(String),

    /// The probe read failed
    #[error("Failed to read first frame from camera {camera_id}: {source}")]
    FirstRead {
        camera_id: String,
        #[source]
        source: SourceError,
    },

    /// The capture thread could not be spawned
    #[error("Failed to spawn capture thread for camera {camera_id}: {source}")]
    Spawn {
        camera_id: String,
        #[source]
        source: std::io::Error,
    },
}
