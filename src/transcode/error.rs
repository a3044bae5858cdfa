//! Transcode error types

/// Error type for transcode supervisor operations
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    /// The transcoder process could not be launched
    #[error("Failed to launch transcoder for camera {camera_id}: {source}")]
    Spawn {
        camera_id: String,
        #[source]
        source: std::io::Error,
    },

    /// The process exited within the startup grace period
    #[error("Transcoder for camera {camera_id} exited during startup (code {code:?}): {diagnostics}")]
    EarlyExit {
        camera_id: String,
        code: Option<i32>,
        /// Captured diagnostic output
        diagnostics: String,
    },

    /// Listing the available encoders failed
    #[error("Encoder probe failed: {0}")]
    Probe(String),

    /// The process survived every shutdown tier
    #[error("Transcoder for camera {0} did not exit after kill")]
    StopTimeout(String),

    /// An invalid bitrate string
    #[error("Invalid bitrate: {0}")]
    InvalidBitrate(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
