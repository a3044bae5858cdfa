//! ffmpeg-backed video source
//!
//! Decodes the camera stream with an `ffmpeg` child process that writes one
//! JPEG per frame to its stdout. Frames are split on the JPEG start/end
//! markers and the resolution is read from the frame header.
//!
//! Killing the child is how a source is released: the pending read sees
//! end-of-stream and returns immediately.

use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;

use super::error::SourceError;
use super::frame::{Frame, FrameFormat};
use super::source::{SourceConnector, SourceOptions, VideoSource};
use crate::camera::redact_url;

/// Start of image
const SOI: u8 = 0xD8;
/// End of image
const EOI: u8 = 0xD9;
/// Start of scan
const SOS: u8 = 0xDA;

/// Upper bound on a single frame, anything larger is treated as corrupt
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Opens [`FfmpegSource`]s
#[derive(Debug, Clone)]
pub struct FfmpegConnector {
    program: String,
    quality: u8,
}

impl Default for FfmpegConnector {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegConnector {
    /// Use the given ffmpeg executable
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            quality: 5,
        }
    }

    /// JPEG quality scale (2 = best, 31 = worst)
    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(2, 31);
        self
    }

    /// Arguments for decoding `url` into a JPEG stream on stdout
    pub fn capture_args(&self, url: &str, options: &SourceOptions) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        if url.starts_with("rtsp://") || url.starts_with("rtsps://") {
            args.extend([
                "-rtsp_transport".to_string(),
                "tcp".to_string(),
                "-timeout".to_string(),
                options.io_timeout.as_micros().to_string(),
            ]);
        }

        if options.buffer_frames <= 1 {
            args.extend(
                ["-fflags", "nobuffer", "-flags", "low_delay"]
                    .iter()
                    .map(|s| s.to_string()),
            );
        }

        args.extend([
            "-i".to_string(),
            url.to_string(),
            "-an".to_string(),
            "-vf".to_string(),
            format!("fps={}", options.target_fps.max(1)),
            "-f".to_string(),
            "image2pipe".to_string(),
            "-c:v".to_string(),
            "mjpeg".to_string(),
            "-q:v".to_string(),
            self.quality.to_string(),
            "pipe:1".to_string(),
        ]);

        args
    }
}

impl SourceConnector for FfmpegConnector {
    fn open(&self, url: &str, options: &SourceOptions) -> Result<Arc<dyn VideoSource>, SourceError> {
        let mut child = Command::new(&self.program)
            .args(self.capture_args(url, options))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SourceError::Open(format!("{}: {}", self.program, e)))?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SourceError::Open("ffmpeg stdout not captured".into()));
        };

        tracing::debug!(
            url = %redact_url(url),
            pid = child.id(),
            "Decoder process started"
        );

        Ok(Arc::new(FfmpegSource {
            child: Mutex::new(Some(child)),
            reader: Mutex::new(MjpegReader::new(stdout)),
            released: AtomicBool::new(false),
        }))
    }
}

/// A stream decoded by an ffmpeg child process
pub struct FfmpegSource {
    child: Mutex<Option<Child>>,
    reader: Mutex<MjpegReader<ChildStdout>>,
    released: AtomicBool,
}

impl VideoSource for FfmpegSource {
    fn read(&self) -> Result<Option<Frame>, SourceError> {
        if self.released.load(Ordering::Acquire) {
            return Err(SourceError::Closed);
        }

        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(data) = reader.next_frame()? else {
            return Ok(None);
        };

        let (width, height) = jpeg_dimensions(&data)
            .ok_or_else(|| SourceError::Malformed("missing JPEG frame header".into()))?;

        Ok(Some(Frame::new(data, width, height, FrameFormat::Jpeg)))
    }

    fn release(&self) {
        self.released.store(true, Ordering::Release);

        let child = self
            .child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(mut child) = child {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Splits a byte stream into JPEG images
pub struct MjpegReader<R> {
    inner: BufReader<R>,
}

impl<R: Read> MjpegReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::with_capacity(64 * 1024, inner),
        }
    }

    /// Next complete image, or `None` at end of stream
    ///
    /// Bytes before a start-of-image marker are skipped. A stream that ends
    /// mid-image also yields `None`.
    pub fn next_frame(&mut self) -> io::Result<Option<Bytes>> {
        if !self.skip_to_marker(SOI)? {
            return Ok(None);
        }

        let mut frame = Vec::with_capacity(128 * 1024);
        frame.extend_from_slice(&[0xFF, SOI]);

        if !self.read_through_marker(EOI, &mut frame)? {
            return Ok(None);
        }

        Ok(Some(Bytes::from(frame)))
    }

    /// Consume input up to and including `0xFF marker`
    fn skip_to_marker(&mut self, marker: u8) -> io::Result<bool> {
        let mut prev_ff = false;
        loop {
            let (found, used) = {
                let buf = self.inner.fill_buf()?;
                if buf.is_empty() {
                    return Ok(false);
                }
                match find_marker(buf, marker, &mut prev_ff) {
                    Some(end) => (true, end),
                    None => (false, buf.len()),
                }
            };
            self.inner.consume(used);
            if found {
                return Ok(true);
            }
        }
    }

    /// Append input to `out` up to and including `0xFF marker`
    fn read_through_marker(&mut self, marker: u8, out: &mut Vec<u8>) -> io::Result<bool> {
        let mut prev_ff = false;
        loop {
            let (found, used) = {
                let buf = self.inner.fill_buf()?;
                if buf.is_empty() {
                    return Ok(false);
                }
                let end = find_marker(buf, marker, &mut prev_ff);
                let used = end.unwrap_or(buf.len());
                out.extend_from_slice(&buf[..used]);
                (end.is_some(), used)
            };
            self.inner.consume(used);

            if found {
                return Ok(true);
            }
            if out.len() > MAX_FRAME_BYTES {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "JPEG frame exceeds maximum size",
                ));
            }
        }
    }
}

/// Offset just past `0xFF marker` in `buf`, carrying a trailing `0xFF` across calls
fn find_marker(buf: &[u8], marker: u8, prev_ff: &mut bool) -> Option<usize> {
    for (i, &b) in buf.iter().enumerate() {
        if *prev_ff && b == marker {
            *prev_ff = false;
            return Some(i + 1);
        }
        *prev_ff = b == 0xFF;
    }
    None
}

/// Width and height from a JPEG's start-of-frame header
pub fn jpeg_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != SOI {
        return None;
    }

    let mut i = 2;
    while i + 4 <= data.len() {
        if data[i] != 0xFF {
            return None;
        }

        let marker = data[i + 1];
        match marker {
            // Fill byte
            0xFF => {
                i += 1;
                continue;
            }
            // Standalone markers carry no length
            0x01 | 0xD0..=0xD8 => {
                i += 2;
                continue;
            }
            SOS | EOI => return None,
            _ => {}
        }

        if is_start_of_frame(marker) {
            if i + 9 > data.len() {
                return None;
            }
            let height = u16::from_be_bytes([data[i + 5], data[i + 6]]);
            let width = u16::from_be_bytes([data[i + 7], data[i + 8]]);
            return Some((u32::from(width), u32::from(height)));
        }

        let len = usize::from(u16::from_be_bytes([data[i + 2], data[i + 3]]));
        i += 2 + len;
    }

    None
}

fn is_start_of_frame(marker: u8) -> bool {
    matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}
