//! Registry configuration

use crate::capture::CaptureConfig;
use crate::transcode::{Bitrate, TranscodeConfig};

/// Placeholder replaced by the camera id in the output URL template
pub const CAMERA_ID_PLACEHOLDER: &str = "{camera_id}";

/// Stream registry configuration options
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Settings for every capture worker
    pub capture: CaptureConfig,

    /// Settings for the default transcode supervisor
    pub transcode: TranscodeConfig,

    /// Capture frame rate for cameras without one
    pub default_capture_fps: u32,

    /// Transcode frame rate for cameras without one
    pub default_transcode_fps: u32,

    /// Transcoded video bitrate
    pub transcode_bitrate: Bitrate,

    /// Transcoded output size; source size when unset
    pub transcode_resolution: Option<String>,

    /// Where transcoded streams are published, see [`CAMERA_ID_PLACEHOLDER`]
    pub output_url_template: String,

    /// Frames buffered per subscriber before it starts lagging
    pub broadcast_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            transcode: TranscodeConfig::default(),
            default_capture_fps: 10,
            default_transcode_fps: 25,
            transcode_bitrate: Bitrate::default(),
            transcode_resolution: None,
            output_url_template: "rtsp://localhost:8554/{camera_id}_h264".into(),
            broadcast_capacity: 16,
        }
    }
}

impl RegistryConfig {
    /// Set the capture worker configuration
    pub fn capture(mut self, config: CaptureConfig) -> Self {
        self.capture = config;
        self
    }

    /// Set the transcode supervisor configuration
    pub fn transcode(mut self, config: TranscodeConfig) -> Self {
        self.transcode = config;
        self
    }

    /// Set the default capture frame rate
    pub fn default_capture_fps(mut self, fps: u32) -> Self {
        self.default_capture_fps = fps.max(1);
        self
    }

    /// Set the default transcode frame rate
    pub fn default_transcode_fps(mut self, fps: u32) -> Self {
        self.default_transcode_fps = fps.max(1);
        self
    }

    /// Set the transcoded bitrate
    pub fn transcode_bitrate(mut self, bitrate: Bitrate) -> Self {
        self.transcode_bitrate = bitrate;
        self
    }

    /// Set the transcoded output size
    pub fn transcode_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.transcode_resolution = Some(resolution.into());
        self
    }

    /// Set the output URL template
    pub fn output_url_template(mut self, template: impl Into<String>) -> Self {
        self.output_url_template = template.into();
        self
    }

    /// Set the per-subscriber frame buffer
    pub fn broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity.max(1);
        self
    }

    /// Output URL for a camera
    pub fn output_url(&self, camera_id: &str) -> String {
        self.output_url_template
            .replace(CAMERA_ID_PLACEHOLDER, camera_id)
    }
}
