//! Transcode supervision
//!
//! Re-encodes a camera's stream to H.264 through an external ffmpeg process
//! so browsers and RTSP players can consume it. Hardware encoders are
//! preferred, probed afresh on every start.
//!
//! # Example
//!
//! ```no_run
//! use camstream::transcode::{TranscodeRequest, TranscodeSupervisor};
//!
//! # async fn example() -> Result<(), camstream::transcode::TranscodeError> {
//! let supervisor = TranscodeSupervisor::new();
//! let request = TranscodeRequest::new(
//!     "cam1",
//!     "rtsp://10.0.0.5/stream",
//!     "rtsp://localhost:8554/cam1_h264",
//! );
//!
//! supervisor.start_transcoding(request).await?;
//! supervisor.stop_transcoding("cam1").await?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod encoder;
pub mod error;
pub mod process;
pub mod supervisor;

pub use command::{build_args, Bitrate, TranscodeRequest};
pub use config::TranscodeConfig;
pub use encoder::Encoder;
pub use error::TranscodeError;
pub use process::{
    DiagnosticStream, FfmpegLauncher, FfmpegProcess, Launcher, ProcessExit, TranscodeProcess,
};
pub use supervisor::{TranscodeStats, TranscodeStatus, TranscodeSupervisor, Transcoder};
