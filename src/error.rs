//! Crate-level error type
//!
//! Each module has its own error enum; this one wraps them for callers that
//! just want a single `Result`.

use crate::camera::StoreError;
use crate::capture::CaptureError;
use crate::registry::RegistryError;
use crate::transcode::TranscodeError;

/// Result alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Any error produced by this crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
