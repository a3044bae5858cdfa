//! Transcode supervisor
//!
//! Owns at most one transcoder process per camera. A process counts as
//! started once it survives the startup grace period; a background monitor
//! then drains its diagnostics and records how it ended. Stopping escalates
//! from a quit request to SIGTERM to kill, and the registration is removed
//! only once the process has actually exited.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use super::command::{build_args, Bitrate, TranscodeRequest};
use super::config::TranscodeConfig;
use super::encoder::Encoder;
use super::error::TranscodeError;
use super::process::{
    DiagnosticStream, FfmpegLauncher, Launcher, ProcessExit, TranscodeProcess,
};
use crate::camera::redact_url;

/// Diagnostic keywords surfaced as warnings
const FLAGGED_KEYWORDS: [&str; 5] = ["error", "fail", "warning", "cannot", "refused"];

/// Last known state of a transcoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscodeStatus {
    Running,
    Stopped,
    Crashed,
}

/// Transcoder statistics
#[derive(Debug, Clone, Serialize)]
pub struct TranscodeStats {
    pub camera_id: String,
    /// Source stream, password redacted
    pub input_url: String,
    pub output_url: String,
    pub encoder: Encoder,
    pub fps: u32,
    pub bitrate: Bitrate,
    pub resolution: Option<String>,
    pub started_at: DateTime<Utc>,
    pub pid: Option<u32>,
    pub status: TranscodeStatus,
    /// Exit code once the process has ended
    pub exit_code: Option<i32>,
}

/// Transcoding as seen by the stream registry
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn start_transcoding(&self, request: TranscodeRequest) -> Result<(), TranscodeError>;

    async fn stop_transcoding(&self, camera_id: &str) -> Result<(), TranscodeError>;

    async fn stats(&self, camera_id: &str) -> Option<TranscodeStats>;

    /// Whether a process is still registered for the camera
    async fn is_transcoding(&self, camera_id: &str) -> bool;

    /// Stop every registered process
    async fn stop_all(&self);
}

type SharedProcess = Arc<Mutex<Box<dyn TranscodeProcess>>>;

/// A registered process
struct Supervised {
    process: SharedProcess,
    /// Set once `stop_transcoding` owns the teardown
    stopping: Arc<AtomicBool>,
    /// Distinguishes successive processes of one camera
    generation: u64,
}

struct SupervisorInner {
    launcher: Arc<dyn Launcher>,
    config: TranscodeConfig,
    processes: Mutex<HashMap<String, Supervised>>,
    stats: RwLock<HashMap<String, TranscodeStats>>,
    next_generation: AtomicU64,
}

/// Supervises one transcoder process per camera
pub struct TranscodeSupervisor {
    inner: Arc<SupervisorInner>,
}

impl TranscodeSupervisor {
    /// Create a supervisor running ffmpeg with default configuration
    pub fn new() -> Self {
        Self::with_config(TranscodeConfig::default())
    }

    /// Create a supervisor running ffmpeg with custom configuration
    pub fn with_config(config: TranscodeConfig) -> Self {
        let launcher = FfmpegLauncher::new(config.program.clone(), config.probe_timeout);
        Self::with_launcher(Arc::new(launcher), config)
    }

    /// Create a supervisor using a custom process launcher
    pub fn with_launcher(launcher: Arc<dyn Launcher>, config: TranscodeConfig) -> Self {
        Self {
            inner: Arc::new(SupervisorInner {
                launcher,
                config,
                processes: Mutex::new(HashMap::new()),
                stats: RwLock::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &TranscodeConfig {
        &self.inner.config
    }

    /// Whether a process is registered for the camera
    pub async fn is_running(&self, camera_id: &str) -> bool {
        self.inner.processes.lock().await.contains_key(camera_id)
    }

    /// Start transcoding a camera
    ///
    /// A no-op if a process is already registered. Fails if the process
    /// cannot be launched or exits within the startup grace period; the
    /// camera is not registered in either case.
    pub async fn start_transcoding(&self, request: TranscodeRequest) -> Result<(), TranscodeError> {
        let camera_id = request.camera_id.clone();

        if self.is_running(&camera_id).await {
            tracing::info!(camera_id = %camera_id, "Transcoder already running");
            return Ok(());
        }

        let encoder = self.select_encoder().await;
        let args = build_args(&request, encoder);
        tracing::debug!(
            camera_id = %camera_id,
            command = %redacted_command(&self.inner.config.program, &args),
            "Launching transcoder"
        );

        let mut process = match self.inner.launcher.launch(&camera_id, &args).await {
            Ok(process) => process,
            Err(e) => {
                self.forget_stats(&camera_id).await;
                return Err(e);
            }
        };
        let diagnostics = process.take_diagnostics();

        tokio::time::sleep(self.inner.config.startup_grace).await;

        if let Some(exit) = process.try_wait()? {
            let diagnostics = match diagnostics {
                Some(stream) => read_remaining(stream, self.inner.config.kill_timeout).await,
                None => String::new(),
            };
            tracing::error!(
                camera_id = %camera_id,
                code = ?exit.code,
                diagnostics = %diagnostics,
                "Transcoder exited during startup"
            );
            self.forget_stats(&camera_id).await;
            return Err(TranscodeError::EarlyExit {
                camera_id,
                code: exit.code,
                diagnostics,
            });
        }

        let pid = process.pid();
        let process: SharedProcess = Arc::new(Mutex::new(process));
        let stopping = Arc::new(AtomicBool::new(false));
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);

        {
            let mut processes = self.inner.processes.lock().await;
            if processes.contains_key(&camera_id) {
                // A concurrent start won; ours is surplus
                drop(processes);
                tracing::warn!(camera_id = %camera_id, "Concurrent transcoder start, discarding duplicate");
                let mut surplus = process.lock().await;
                if let Err(e) = surplus.kill() {
                    tracing::warn!(camera_id = %camera_id, error = %e, "Failed to kill duplicate transcoder");
                }
                return Ok(());
            }
            processes.insert(
                camera_id.clone(),
                Supervised {
                    process: Arc::clone(&process),
                    stopping: Arc::clone(&stopping),
                    generation,
                },
            );
        }

        let stats = TranscodeStats {
            camera_id: camera_id.clone(),
            input_url: redact_url(&request.input_url),
            output_url: redact_url(&request.output_url),
            encoder,
            fps: request.fps,
            bitrate: request.bitrate,
            resolution: request.resolution.clone(),
            started_at: Utc::now(),
            pid,
            status: TranscodeStatus::Running,
            exit_code: None,
        };
        self.inner
            .stats
            .write()
            .await
            .insert(camera_id.clone(), stats);

        tokio::spawn(monitor(
            Arc::clone(&self.inner),
            camera_id.clone(),
            generation,
            process,
            stopping,
            diagnostics,
        ));

        tracing::info!(
            camera_id = %camera_id,
            encoder = %encoder,
            pid = ?pid,
            output = %redact_url(&request.output_url),
            "Transcoding started"
        );

        Ok(())
    }

    /// Stop transcoding a camera
    ///
    /// A no-op if no process is registered. The registration is removed
    /// only after the process has exited; if it survives the kill the
    /// error is returned and the registration kept.
    pub async fn stop_transcoding(&self, camera_id: &str) -> Result<(), TranscodeError> {
        let (process, stopping) = {
            let processes = self.inner.processes.lock().await;
            match processes.get(camera_id) {
                Some(supervised) => (
                    Arc::clone(&supervised.process),
                    Arc::clone(&supervised.stopping),
                ),
                None => return Ok(()),
            }
        };

        stopping.store(true, Ordering::Release);
        tracing::info!(camera_id = %camera_id, "Stopping transcoder");

        let exit = match self.shutdown(camera_id, &process).await {
            Ok(exit) => exit,
            Err(e) => {
                tracing::error!(camera_id = %camera_id, error = %e, "Failed to stop transcoder");
                return Err(e);
            }
        };

        {
            let mut processes = self.inner.processes.lock().await;
            let ours = processes
                .get(camera_id)
                .is_some_and(|s| Arc::ptr_eq(&s.process, &process));
            if ours {
                processes.remove(camera_id);
            }
        }

        if let Some(stats) = self.inner.stats.write().await.get_mut(camera_id) {
            stats.status = TranscodeStatus::Stopped;
            stats.exit_code = exit.code;
        }

        tracing::info!(camera_id = %camera_id, code = ?exit.code, "Transcoder stopped");
        Ok(())
    }

    /// Statistics for one camera
    ///
    /// Kept after the process ends so its final status stays visible.
    pub async fn stats(&self, camera_id: &str) -> Option<TranscodeStats> {
        self.inner.stats.read().await.get(camera_id).cloned()
    }

    /// Statistics for every camera seen
    pub async fn all_stats(&self) -> HashMap<String, TranscodeStats> {
        self.inner.stats.read().await.clone()
    }

    /// Stop every registered transcoder
    pub async fn stop_all(&self) {
        let camera_ids: Vec<String> = self.inner.processes.lock().await.keys().cloned().collect();

        for camera_id in camera_ids {
            if let Err(e) = self.stop_transcoding(&camera_id).await {
                tracing::error!(camera_id = %camera_id, error = %e, "Error stopping transcoder");
            }
        }
    }

    /// Drop the stats of an earlier run unless a process is registered
    async fn forget_stats(&self, camera_id: &str) {
        let processes = self.inner.processes.lock().await;
        if !processes.contains_key(camera_id) {
            self.inner.stats.write().await.remove(camera_id);
        }
    }

    async fn select_encoder(&self) -> Encoder {
        match self.inner.launcher.available_encoders().await {
            Ok(listing) => {
                let encoder = Encoder::select(&listing);
                tracing::info!(
                    encoder = %encoder,
                    hardware = encoder.is_hardware(),
                    "Selected video encoder"
                );
                encoder
            }
            Err(e) => {
                tracing::warn!(error = %e, "Encoder probe failed, using software encoder");
                Encoder::X264
            }
        }
    }

    /// Quit request, then terminate, then kill
    async fn shutdown(
        &self,
        camera_id: &str,
        process: &SharedProcess,
    ) -> Result<ProcessExit, TranscodeError> {
        let config = &self.inner.config;

        {
            let mut process = process.lock().await;
            if let Some(exit) = process.try_wait()? {
                return Ok(exit);
            }
            if let Err(e) = process.request_quit().await {
                tracing::debug!(camera_id = %camera_id, error = %e, "Quit request failed");
            }
        }
        if let Some(exit) = self.wait_exit(process, config.quit_grace).await? {
            return Ok(exit);
        }

        tracing::debug!(camera_id = %camera_id, "Transcoder ignored quit request, terminating");
        if let Err(e) = process.lock().await.terminate() {
            tracing::debug!(camera_id = %camera_id, error = %e, "Terminate signal failed");
        }
        if let Some(exit) = self.wait_exit(process, config.term_grace).await? {
            return Ok(exit);
        }

        tracing::warn!(camera_id = %camera_id, "Transcoder ignored terminate, killing");
        if let Err(e) = process.lock().await.kill() {
            tracing::warn!(camera_id = %camera_id, error = %e, "Kill failed");
        }
        match self.wait_exit(process, config.kill_timeout).await? {
            Some(exit) => Ok(exit),
            None => Err(TranscodeError::StopTimeout(camera_id.to_string())),
        }
    }

    /// Poll for exit for at most `within`
    async fn wait_exit(
        &self,
        process: &SharedProcess,
        within: Duration,
    ) -> Result<Option<ProcessExit>, TranscodeError> {
        let deadline = Instant::now() + within;

        loop {
            if let Some(exit) = process.lock().await.try_wait()? {
                return Ok(Some(exit));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep((deadline - now).min(self.inner.config.poll_interval)).await;
        }
    }
}

impl Default for TranscodeSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transcoder for TranscodeSupervisor {
    async fn start_transcoding(&self, request: TranscodeRequest) -> Result<(), TranscodeError> {
        TranscodeSupervisor::start_transcoding(self, request).await
    }

    async fn stop_transcoding(&self, camera_id: &str) -> Result<(), TranscodeError> {
        TranscodeSupervisor::stop_transcoding(self, camera_id).await
    }

    async fn stats(&self, camera_id: &str) -> Option<TranscodeStats> {
        TranscodeSupervisor::stats(self, camera_id).await
    }

    async fn is_transcoding(&self, camera_id: &str) -> bool {
        self.is_running(camera_id).await
    }

    async fn stop_all(&self) {
        TranscodeSupervisor::stop_all(self).await
    }
}

/// Drain diagnostics for the life of the process, then record its exit
async fn monitor(
    inner: Arc<SupervisorInner>,
    camera_id: String,
    generation: u64,
    process: SharedProcess,
    stopping: Arc<AtomicBool>,
    diagnostics: Option<DiagnosticStream>,
) {
    let mut tail = DiagnosticTail::new(inner.config.diagnostics_tail);

    if let Some(stream) = diagnostics {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::with_capacity(256);
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf);
                    for line in text.split('\r') {
                        note_line(&camera_id, line, &mut tail);
                    }
                }
                Err(e) => {
                    tracing::debug!(camera_id = %camera_id, error = %e, "Diagnostic stream failed");
                    break;
                }
            }
        }
    }

    let exit = loop {
        if stopping.load(Ordering::Acquire) {
            return;
        }
        let status = process.lock().await.try_wait();
        match status {
            Ok(Some(exit)) => break exit,
            Ok(None) => tokio::time::sleep(inner.config.poll_interval).await,
            Err(e) => {
                tracing::warn!(camera_id = %camera_id, error = %e, "Failed to poll transcoder");
                return;
            }
        }
    };

    {
        let mut processes = inner.processes.lock().await;
        let ours = processes
            .get(&camera_id)
            .is_some_and(|s| s.generation == generation && !s.stopping.load(Ordering::Acquire));
        if !ours {
            return;
        }
        processes.remove(&camera_id);
    }

    let status = if exit.success() {
        TranscodeStatus::Stopped
    } else {
        TranscodeStatus::Crashed
    };

    if let Some(stats) = inner.stats.write().await.get_mut(&camera_id) {
        stats.status = status;
        stats.exit_code = exit.code;
    }

    match status {
        TranscodeStatus::Crashed => tracing::error!(
            camera_id = %camera_id,
            code = ?exit.code,
            diagnostics = %tail.joined(),
            "Transcoder crashed"
        ),
        _ => tracing::info!(camera_id = %camera_id, "Transcoder exited"),
    }
}

/// Bounded tail of diagnostic lines
struct DiagnosticTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl DiagnosticTail {
    fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, line: &str) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    fn joined(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

fn note_line(camera_id: &str, line: &str, tail: &mut DiagnosticTail) {
    let line = line.trim();
    // Progress lines
    if line.is_empty() || line.starts_with("frame=") {
        return;
    }

    tail.push(line);
    if is_flagged(line) {
        tracing::warn!(camera_id = %camera_id, line = %line, "Transcoder reported a problem");
    } else {
        tracing::debug!(camera_id = %camera_id, line = %line, "Transcoder output");
    }
}

fn is_flagged(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    FLAGGED_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// Everything left in a stream, bounded by `timeout`
async fn read_remaining(mut stream: DiagnosticStream, timeout: Duration) -> String {
    let mut buf = Vec::new();
    // On timeout whatever was read so far is kept
    let _ = tokio::time::timeout(timeout, stream.read_to_end(&mut buf)).await;
    String::from_utf8_lossy(&buf).trim().to_string()
}

fn redacted_command(program: &str, args: &[String]) -> String {
    std::iter::once(program.to_string())
        .chain(args.iter().map(|arg| {
            if arg.contains("://") {
                redact_url(arg)
            } else {
                arg.clone()
            }
        }))
        .collect::<Vec<_>>()
        .join(" ")
}
