//! Transcoder command line
//!
//! Builds a low-latency ffmpeg invocation: reliable (TCP) input transport,
//! constant bitrate, a keyframe every two seconds and AAC audio, with the
//! latency flags each encoder family actually accepts.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use super::encoder::Encoder;
use super::error::TranscodeError;

/// Target video bitrate in bits per second
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bitrate(u64);

impl Bitrate {
    pub const fn from_bps(bps: u64) -> Self {
        Self(bps)
    }

    pub fn bps(self) -> u64 {
        self.0
    }

    /// Rate-control buffer size, two seconds worth
    pub fn bufsize(self) -> Bitrate {
        Bitrate(self.0.saturating_mul(2))
    }
}

impl Default for Bitrate {
    fn default() -> Self {
        Bitrate(2_000_000)
    }
}

impl FromStr for Bitrate {
    type Err = TranscodeError;

    /// Parse `2M`, `500k` or a plain number of bits per second
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (digits, multiplier) = match s.char_indices().last() {
            Some((i, 'M' | 'm')) => (&s[..i], 1_000_000),
            Some((i, 'K' | 'k')) => (&s[..i], 1_000),
            _ => (s, 1),
        };

        match digits.parse::<u64>() {
            Ok(value) if value > 0 => Ok(Bitrate(value.saturating_mul(multiplier))),
            _ => Err(TranscodeError::InvalidBitrate(s.to_string())),
        }
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 1_000_000 && self.0 % 1_000_000 == 0 {
            write!(f, "{}M", self.0 / 1_000_000)
        } else if self.0 >= 1_000 && self.0 % 1_000 == 0 {
            write!(f, "{}k", self.0 / 1_000)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Serialize for Bitrate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Parameters of one transcode
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeRequest {
    pub camera_id: String,
    /// Camera stream, credentials included
    pub input_url: String,
    /// Where the H.264 stream is published
    pub output_url: String,
    /// Output frame rate
    pub fps: u32,
    pub bitrate: Bitrate,
    /// Output size as `WIDTHxHEIGHT`; source size when unset
    pub resolution: Option<String>,
}

impl TranscodeRequest {
    /// Request with 25 fps at 2 Mbit/s
    pub fn new(
        camera_id: impl Into<String>,
        input_url: impl Into<String>,
        output_url: impl Into<String>,
    ) -> Self {
        Self {
            camera_id: camera_id.into(),
            input_url: input_url.into(),
            output_url: output_url.into(),
            fps: 25,
            bitrate: Bitrate::default(),
            resolution: None,
        }
    }

    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = fps.max(1);
        self
    }

    pub fn bitrate(mut self, bitrate: Bitrate) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn resolution(mut self, resolution: Option<String>) -> Self {
        self.resolution = resolution;
        self
    }

    /// Frames between keyframes
    pub fn keyframe_interval(&self) -> u32 {
        self.fps.max(1).saturating_mul(2)
    }
}

/// Arguments for transcoding `request` with `encoder`
pub fn build_args(request: &TranscodeRequest, encoder: Encoder) -> Vec<String> {
    let fps = request.fps.max(1);
    let gop = request.keyframe_interval();
    let bitrate = request.bitrate.to_string();

    let mut args: Vec<String> = Vec::with_capacity(64);

    push(&mut args, &["-hide_banner", "-loglevel", "warning"]);
    if is_rtsp(&request.input_url) {
        push(&mut args, &["-rtsp_transport", "tcp"]);
    }
    push(&mut args, &["-i", request.input_url.as_str()]);

    push(&mut args, &["-c:v", encoder.name()]);
    match encoder {
        Encoder::X264 => push(&mut args, &["-preset", "ultrafast", "-tune", "zerolatency"]),
        Encoder::Nvenc => push(&mut args, &[
            "-preset",
            "fast",
            "-rc",
            "cbr",
            "-zerolatency",
            "1",
            "-delay",
            "0",
            "-forced-idr",
            "1",
        ]),
        Encoder::Qsv => push(&mut args, &["-preset", "veryfast", "-look_ahead", "0", "-async_depth", "1"]),
        Encoder::VideoToolbox => push(&mut args, &["-realtime", "1", "-allow_sw", "1"]),
    }

    push(&mut args, &[
        "-b:v",
        bitrate.as_str(),
        "-maxrate",
        bitrate.as_str(),
        "-bufsize",
        request.bitrate.bufsize().to_string().as_str(),
    ]);
    push(&mut args, &[
        "-r",
        fps.to_string().as_str(),
        "-g",
        gop.to_string().as_str(),
        "-sc_threshold",
        "0",
    ]);

    if let Some(resolution) = &request.resolution {
        push(&mut args, &["-s", resolution.as_str()]);
    }

    match encoder {
        Encoder::X264 => push(&mut args, &[
            "-profile:v",
            "baseline",
            "-level",
            "3.1",
            "-x264opts",
            format!("keyint={gop}:min-keyint={fps}:no-scenecut").as_str(),
        ]),
        Encoder::Nvenc => push(&mut args, &["-profile:v", "baseline", "-level", "3.1"]),
        Encoder::Qsv | Encoder::VideoToolbox => push(&mut args, &["-profile:v", "baseline"]),
    }

    // Repeat SPS/PPS on keyframes so clients can join mid-stream
    push(&mut args, &["-bsf:v", "dump_extra"]);
    push(&mut args, &["-c:a", "aac", "-b:a", "128k", "-ar", "48000"]);
    push(&mut args, &["-f", "rtsp", "-rtsp_transport", "tcp", request.output_url.as_str()]);

    args
}

fn push(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

fn is_rtsp(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("rtsp://") || lower.starts_with("rtsps://")
}
