//! H.264 encoder selection
//!
//! Hardware encoders are preferred in a fixed order; software x264 is the
//! universal fallback.

use std::fmt;

use serde::Serialize;

/// Supported H.264 encoders, in order of preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoder {
    /// NVIDIA NVENC
    Nvenc,
    /// Intel Quick Sync
    Qsv,
    /// Apple VideoToolbox
    VideoToolbox,
    /// Software x264
    X264,
}

impl Encoder {
    /// All encoders, most preferred first
    pub const PREFERENCE: [Encoder; 4] = [
        Encoder::Nvenc,
        Encoder::Qsv,
        Encoder::VideoToolbox,
        Encoder::X264,
    ];

    /// Encoder name as understood by ffmpeg
    pub fn name(self) -> &'static str {
        match self {
            Encoder::Nvenc => "h264_nvenc",
            Encoder::Qsv => "h264_qsv",
            Encoder::VideoToolbox => "h264_videotoolbox",
            Encoder::X264 => "libx264",
        }
    }

    pub fn is_hardware(self) -> bool {
        !matches!(self, Encoder::X264)
    }

    /// Pick the best encoder from an `ffmpeg -encoders` listing
    ///
    /// Falls back to x264 when nothing in the listing matches.
    pub fn select(listing: &str) -> Encoder {
        let advertised: Vec<&str> = listing
            .lines()
            .filter_map(|line| line.split_whitespace().nth(1))
            .collect();

        Self::PREFERENCE
            .into_iter()
            .find(|encoder| advertised.contains(&encoder.name()))
            .unwrap_or(Encoder::X264)
    }
}

impl fmt::Display for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
