//! Transcoder process handles
//!
//! [`Launcher`] and [`TranscodeProcess`] separate the supervisor from the
//! operating system so the shutdown escalation can run against a fake
//! process. The ffmpeg implementations sit on `tokio::process`.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};

use super::error::TranscodeError;

/// Diagnostic output of a process (its stderr)
pub type DiagnosticStream = Box<dyn AsyncRead + Send + Unpin>;

/// How a process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code; `None` when killed by a signal
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A running transcoder process
#[async_trait]
pub trait TranscodeProcess: Send {
    fn pid(&self) -> Option<u32>;

    /// Take the diagnostic stream; `None` after the first call
    fn take_diagnostics(&mut self) -> Option<DiagnosticStream>;

    /// Ask the process to finish cleanly
    async fn request_quit(&mut self) -> io::Result<()>;

    /// Send the terminate signal
    fn terminate(&mut self) -> io::Result<()>;

    /// Kill the process; does not wait for it
    fn kill(&mut self) -> io::Result<()>;

    /// Exit status if the process has exited, without blocking
    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>>;
}

/// Launches transcoder processes
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Encoder listing of the transcoder (`ffmpeg -encoders` output)
    async fn available_encoders(&self) -> Result<String, TranscodeError>;

    async fn launch(
        &self,
        camera_id: &str,
        args: &[String],
    ) -> Result<Box<dyn TranscodeProcess>, TranscodeError>;
}

/// Launches the ffmpeg executable
#[derive(Debug, Clone)]
pub struct FfmpegLauncher {
    program: String,
    probe_timeout: Duration,
}

impl FfmpegLauncher {
    pub fn new(program: impl Into<String>, probe_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            probe_timeout,
        }
    }
}

impl Default for FfmpegLauncher {
    fn default() -> Self {
        Self::new("ffmpeg", Duration::from_secs(5))
    }
}

#[async_trait]
impl Launcher for FfmpegLauncher {
    async fn available_encoders(&self) -> Result<String, TranscodeError> {
        let probe = Command::new(&self.program)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.probe_timeout, probe)
            .await
            .map_err(|_| TranscodeError::Probe("timed out listing encoders".into()))?
            .map_err(|e| TranscodeError::Probe(e.to_string()))?;

        if !output.status.success() {
            return Err(TranscodeError::Probe(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn launch(
        &self,
        camera_id: &str,
        args: &[String],
    ) -> Result<Box<dyn TranscodeProcess>, TranscodeError> {
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TranscodeError::Spawn {
                camera_id: camera_id.to_string(),
                source,
            })?;

        let stdin = child.stdin.take();
        let stderr = child
            .stderr
            .take()
            .map(|stderr| Box::new(stderr) as DiagnosticStream);

        Ok(Box::new(FfmpegProcess {
            child,
            stdin,
            stderr,
        }))
    }
}

/// A spawned ffmpeg child
pub struct FfmpegProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<DiagnosticStream>,
}

#[async_trait]
impl TranscodeProcess for FfmpegProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn take_diagnostics(&mut self) -> Option<DiagnosticStream> {
        self.stderr.take()
    }

    async fn request_quit(&mut self) -> io::Result<()> {
        // ffmpeg finishes the output and exits on 'q'
        match self.stdin.as_mut() {
            Some(stdin) => {
                stdin.write_all(b"q").await?;
                stdin.flush().await
            }
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin closed")),
        }
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let pid = i32::try_from(pid).map_err(|_| io::Error::other("pid out of range"))?;
        kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(io::Error::from)
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        Ok(self
            .child
            .try_wait()?
            .map(|status| ProcessExit { code: status.code() }))
    }
}
