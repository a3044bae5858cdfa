//! Frame listeners
//!
//! Listeners run on the capture thread, so they must be quick. A listener
//! that fails or panics is logged and skipped; the others still see the
//! frame and the capture loop carries on.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::capture::CapturedFrame;

/// Error returned by a listener
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Result of one listener call
pub type ListenerResult = Result<(), ListenerError>;

/// Callback receiving every frame of a camera, with the camera id
pub type FrameListener = Arc<dyn Fn(&str, &CapturedFrame) -> ListenerResult + Send + Sync>;

/// Deliver `frame` to every listener
pub(crate) fn dispatch(camera_id: &str, listeners: &[FrameListener], frame: &CapturedFrame) {
    for (index, listener) in listeners.iter().enumerate() {
        match panic::catch_unwind(AssertUnwindSafe(|| listener(camera_id, frame))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(
                    camera_id = %camera_id,
                    listener = index,
                    error = %e,
                    "Frame listener failed"
                );
            }
            Err(_) => {
                tracing::error!(camera_id = %camera_id, listener = index, "Frame listener panicked");
            }
        }
    }
}
