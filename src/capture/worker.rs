//! Capture worker and loop
//!
//! `start` opens the source and performs one probe read synchronously; only
//! if both succeed is the capture thread spawned. The thread paces itself to
//! the target frame interval, publishes every good frame into the slot and
//! reconnects in place once too many reads in a row have failed. It runs
//! until `stop` clears the running flag.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::config::CaptureConfig;
use super::error::{CaptureError, SourceError};
use super::frame::{CapturedFrame, Frame, FrameSlot};
use super::source::{SourceConnector, SourceOptions, VideoSource};
use crate::camera::redact_url;
use crate::stats::FpsMeter;

/// Callback invoked on the capture thread for every captured frame
///
/// Panics are caught and logged; they never stop the capture loop.
pub type FrameHandler = Arc<dyn Fn(&Arc<CapturedFrame>) + Send + Sync>;

/// Longest single sleep while waiting, so `stop` is noticed promptly
const PAUSE_SLICE: Duration = Duration::from_millis(100);

/// Capture statistics
#[derive(Debug, Clone, Serialize)]
pub struct CaptureStats {
    pub camera_id: String,
    /// Whether the capture loop is running
    pub running: bool,
    /// Successful reads since the last start
    pub frame_count: u64,
    /// Consecutive failed reads
    pub error_count: u32,
    /// Reconnects since the last start
    pub reconnect_count: u64,
    /// Achieved frame rate (approximate)
    pub fps: f64,
    /// Configured frame rate
    pub target_fps: u32,
    /// Capture time of the latest frame
    pub last_frame_time: Option<DateTime<Utc>>,
    /// Resolution of the latest frame, or of the probe read before the first
    pub resolution: Option<String>,
}

/// State shared between a worker and its capture thread
///
/// Created fresh on every start, so a thread that outlived its join deadline
/// can never touch the state of a later run.
struct CaptureShared {
    running: AtomicBool,
    slot: FrameSlot,
    frame_count: AtomicU64,
    error_count: AtomicU32,
    reconnect_count: AtomicU64,
    /// Achieved fps as `f64` bits
    fps_bits: AtomicU64,
    /// Resolution seen by the probe read
    probe_resolution: Option<String>,
    /// Current source; locked only to swap handles, never across a read
    source: Mutex<Option<Arc<dyn VideoSource>>>,
}

impl CaptureShared {
    fn new(initial_fps: f64, probe_resolution: Option<String>) -> Self {
        Self {
            running: AtomicBool::new(false),
            slot: FrameSlot::new(),
            frame_count: AtomicU64::new(0),
            error_count: AtomicU32::new(0),
            reconnect_count: AtomicU64::new(0),
            fps_bits: AtomicU64::new(initial_fps.to_bits()),
            probe_resolution,
            source: Mutex::new(None),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn current_source(&self) -> Option<Arc<dyn VideoSource>> {
        self.source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make `source` current, or release it if the worker is stopping
    fn install_source(&self, source: Arc<dyn VideoSource>) -> bool {
        let mut current = self.source.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.is_running() {
            drop(current);
            source.release();
            return false;
        }
        *current = Some(source);
        true
    }

    fn take_source(&self) -> Option<Arc<dyn VideoSource>> {
        self.source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn fps(&self) -> f64 {
        f64::from_bits(self.fps_bits.load(Ordering::Relaxed))
    }

    fn set_fps(&self, fps: f64) {
        self.fps_bits.store(fps.to_bits(), Ordering::Relaxed);
    }
}

struct LoopThread {
    handle: JoinHandle<()>,
    /// Signalled when the loop returns
    done: mpsc::Receiver<()>,
}

/// Owns the video connection of one camera
pub struct CaptureWorker {
    camera_id: String,
    url: String,
    options: SourceOptions,
    config: CaptureConfig,
    connector: Arc<dyn SourceConnector>,
    handler: Option<FrameHandler>,
    shared: ArcSwap<CaptureShared>,
    thread: Mutex<Option<LoopThread>>,
}

impl CaptureWorker {
    /// Create a stopped worker for `url`
    pub fn new(
        camera_id: impl Into<String>,
        url: impl Into<String>,
        target_fps: u32,
        connector: Arc<dyn SourceConnector>,
    ) -> Self {
        let options = SourceOptions::low_latency(target_fps);
        let initial_fps = f64::from(options.target_fps);

        Self {
            camera_id: camera_id.into(),
            url: url.into(),
            options,
            config: CaptureConfig::default(),
            connector,
            handler: None,
            shared: ArcSwap::from_pointee(CaptureShared::new(initial_fps, None)),
            thread: Mutex::new(None),
        }
    }

    /// Use custom configuration
    pub fn with_config(mut self, config: CaptureConfig) -> Self {
        self.config = config;
        self
    }

    /// Invoke `handler` for every captured frame
    pub fn with_handler(mut self, handler: FrameHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn target_fps(&self) -> u32 {
        self.options.target_fps
    }

    pub fn is_running(&self) -> bool {
        self.shared.load().is_running()
    }

    /// Open the source and start the capture thread
    ///
    /// Blocks for the open and one probe read. On failure everything acquired
    /// so far is released and no thread is started. Starting a running
    /// worker is a no-op.
    pub fn start(&self) -> Result<(), CaptureError> {
        let mut thread = self.thread.lock().unwrap_or_else(PoisonError::into_inner);

        if self.is_running() {
            tracing::warn!(camera_id = %self.camera_id, "Capture already running");
            return Ok(());
        }

        // A thread that missed its join deadline stays detached
        thread.take();

        tracing::info!(
            camera_id = %self.camera_id,
            url = %redact_url(&self.url),
            fps = self.options.target_fps,
            "Connecting to video source"
        );

        let source = self
            .connector
            .open(&self.url, &self.options)
            .map_err(|source| CaptureError::Open {
                camera_id: self.camera_id.clone(),
                source,
            })?;

        let first = match guarded_read(source.as_ref()) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                source.release();
                return Err(CaptureError::NoFirstFrame(self.camera_id.clone()));
            }
            Err(e) => {
                source.release();
                return Err(CaptureError::FirstRead {
                    camera_id: self.camera_id.clone(),
                    source: e,
                });
            }
        };

        tracing::info!(
            camera_id = %self.camera_id,
            resolution = %first.resolution(),
            "Video source connected"
        );

        let shared = Arc::new(CaptureShared::new(
            f64::from(self.options.target_fps),
            Some(first.resolution()),
        ));
        shared.running.store(true, Ordering::Release);
        shared.install_source(source);
        self.shared.store(Arc::clone(&shared));

        let capture_loop = CaptureLoop {
            camera_id: self.camera_id.clone(),
            shared: Arc::clone(&shared),
            connector: Arc::clone(&self.connector),
            url: self.url.clone(),
            options: self.options.clone(),
            config: self.config.clone(),
            handler: self.handler.clone(),
            fps: FpsMeter::new(self.config.fps_window, f64::from(self.options.target_fps)),
        };

        let (done_tx, done_rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name(format!("capture-{}", self.camera_id))
            .spawn(move || {
                capture_loop.run();
                let _ = done_tx.send(());
            });

        match spawned {
            Ok(handle) => {
                *thread = Some(LoopThread {
                    handle,
                    done: done_rx,
                });
                Ok(())
            }
            Err(e) => {
                shared.running.store(false, Ordering::Release);
                if let Some(source) = shared.take_source() {
                    source.release();
                }
                Err(CaptureError::Spawn {
                    camera_id: self.camera_id.clone(),
                    source: e,
                })
            }
        }
    }

    /// Stop the capture thread and release the source
    ///
    /// Waits at most the configured join timeout for the thread. The source
    /// is released either way; a thread still blocked in a read then sees a
    /// closed source and exits on its own.
    pub fn stop(&self) {
        let mut thread = self.thread.lock().unwrap_or_else(PoisonError::into_inner);
        let shared = self.shared.load_full();
        let was_running = shared.running.swap(false, Ordering::AcqRel);

        if let Some(LoopThread { handle, done }) = thread.take() {
            match done.recv_timeout(self.config.join_timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    if handle.join().is_err() {
                        tracing::error!(camera_id = %self.camera_id, "Capture thread panicked");
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(
                        camera_id = %self.camera_id,
                        timeout_ms = self.config.join_timeout.as_millis() as u64,
                        "Capture thread did not exit in time, detaching"
                    );
                }
            }
        }

        if let Some(source) = shared.take_source() {
            source.release();
        }

        if was_running {
            tracing::info!(camera_id = %self.camera_id, "Capture stopped");
        }
    }

    /// Latest frame and its capture time
    pub fn snapshot(&self) -> Option<Arc<CapturedFrame>> {
        self.shared.load().slot.snapshot()
    }

    /// Current statistics
    pub fn stats(&self) -> CaptureStats {
        let shared = self.shared.load();
        let latest = shared.slot.snapshot();

        CaptureStats {
            camera_id: self.camera_id.clone(),
            running: shared.is_running(),
            frame_count: shared.frame_count.load(Ordering::Relaxed),
            error_count: shared.error_count.load(Ordering::Relaxed),
            reconnect_count: shared.reconnect_count.load(Ordering::Relaxed),
            fps: shared.fps(),
            target_fps: self.options.target_fps,
            last_frame_time: latest.as_ref().map(|f| f.captured_at),
            resolution: latest
                .as_ref()
                .map(|f| f.frame.resolution())
                .or_else(|| shared.probe_resolution.clone()),
        }
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        // Signal without joining; the thread exits once its read returns
        let shared = self.shared.load_full();
        if shared.running.swap(false, Ordering::AcqRel) {
            if let Some(source) = shared.take_source() {
                source.release();
            }
        }
    }
}

/// Read that turns a panicking source into an error
fn guarded_read(source: &dyn VideoSource) -> Result<Option<Frame>, SourceError> {
    panic::catch_unwind(AssertUnwindSafe(|| source.read()))
        .unwrap_or_else(|_| Err(SourceError::Malformed("video source panicked".into())))
}

/// Outcome of one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tick {
    /// A frame was captured
    Frame,
    /// The source returned no frame
    Failed,
    /// The read raised an error
    Faulted,
}

/// Body of the capture thread
struct CaptureLoop {
    camera_id: String,
    shared: Arc<CaptureShared>,
    connector: Arc<dyn SourceConnector>,
    url: String,
    options: SourceOptions,
    config: CaptureConfig,
    handler: Option<FrameHandler>,
    fps: FpsMeter,
}

impl CaptureLoop {
    fn run(mut self) {
        tracing::info!(camera_id = %self.camera_id, "Capture loop started");

        let interval = self.options.frame_interval();
        let mut last_capture: Option<Instant> = None;
        self.fps
            .reset(Instant::now(), f64::from(self.options.target_fps));

        while self.shared.is_running() {
            if let Some(last) = last_capture {
                let elapsed = last.elapsed();
                if elapsed < interval {
                    thread::sleep(interval - elapsed);
                    continue;
                }
            }
            last_capture = Some(Instant::now());

            if self.tick() == Tick::Faulted {
                self.pause(self.config.error_backoff);
            }
        }

        tracing::info!(camera_id = %self.camera_id, "Capture loop stopped");
    }

    fn tick(&mut self) -> Tick {
        let outcome = match self.shared.current_source() {
            Some(source) => guarded_read(source.as_ref()),
            None => Ok(None),
        };

        match outcome {
            Ok(Some(frame)) => {
                self.on_frame(frame);
                Tick::Frame
            }
            Ok(None) => {
                let errors = self.shared.error_count.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(camera_id = %self.camera_id, errors, "Failed to read frame");
                self.check_stall(errors);
                Tick::Failed
            }
            Err(e) => {
                let errors = self.shared.error_count.fetch_add(1, Ordering::Relaxed) + 1;
                if self.shared.is_running() {
                    tracing::error!(
                        camera_id = %self.camera_id,
                        error = %e,
                        errors,
                        "Error in capture loop"
                    );
                }
                self.check_stall(errors);
                Tick::Faulted
            }
        }
    }

    fn on_frame(&mut self, frame: Frame) {
        self.shared.error_count.store(0, Ordering::Relaxed);
        self.shared.frame_count.fetch_add(1, Ordering::Relaxed);

        let captured = Arc::new(CapturedFrame::new(frame, Utc::now()));
        self.shared.slot.publish(Arc::clone(&captured));

        if let Some(fps) = self.fps.record(Instant::now()) {
            self.shared.set_fps(fps);
        }

        if let Some(handler) = &self.handler {
            if panic::catch_unwind(AssertUnwindSafe(|| handler(&captured))).is_err() {
                tracing::error!(camera_id = %self.camera_id, "Frame handler panicked");
            }
        }
    }

    fn check_stall(&mut self, errors: u32) {
        if errors > self.config.reconnect_threshold && self.shared.is_running() {
            tracing::error!(
                camera_id = %self.camera_id,
                errors,
                "Too many consecutive read failures, reconnecting"
            );
            self.reconnect();
        }
    }

    /// Replace the source in place
    ///
    /// The error count is reset whatever the outcome; a failed reopen is
    /// retried on the next threshold breach.
    fn reconnect(&mut self) {
        self.shared.reconnect_count.fetch_add(1, Ordering::Relaxed);

        if let Some(old) = self.shared.take_source() {
            old.release();
        }

        self.pause(self.config.reconnect_delay);

        if self.shared.is_running() {
            match self.connector.open(&self.url, &self.options) {
                Ok(source) => {
                    if self.shared.install_source(source) {
                        tracing::info!(camera_id = %self.camera_id, "Reconnected to video source");
                    }
                }
                Err(e) => {
                    tracing::error!(camera_id = %self.camera_id, error = %e, "Reconnection failed");
                }
            }
        }

        self.shared.error_count.store(0, Ordering::Relaxed);
    }

    /// Sleep for `duration`, returning early once stopped
    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while self.shared.is_running() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(PAUSE_SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{wait_for, EventLog, FakeConnector, OpenScript};

    fn fast_config() -> CaptureConfig {
        CaptureConfig::default()
            .reconnect_delay(Duration::ZERO)
            .error_backoff(Duration::from_millis(5))
            .join_timeout(Duration::from_secs(2))
    }

    fn worker(connector: &Arc<FakeConnector>, fps: u32) -> CaptureWorker {
        CaptureWorker::new("cam1", "rtsp://host/stream", fps, connector.clone())
            .with_config(fast_config())
    }

    /// A loop driven by hand, with one source already installed
    fn manual_loop(connector: &Arc<FakeConnector>, threshold: u32) -> CaptureLoop {
        let shared = Arc::new(CaptureShared::new(10.0, None));
        shared.running.store(true, Ordering::Release);
        let options = SourceOptions::low_latency(10);
        let source = connector.open("rtsp://host/stream", &options).unwrap();
        shared.install_source(source);

        CaptureLoop {
            camera_id: "cam1".into(),
            shared,
            connector: connector.clone(),
            url: "rtsp://host/stream".into(),
            options,
            config: fast_config().reconnect_threshold(threshold),
            handler: None,
            fps: FpsMeter::new(30, 10.0),
        }
    }

    #[test]
    fn test_start_fails_when_source_cannot_open() {
        let connector = FakeConnector::new(OpenScript::Fail);
        let worker = worker(&connector, 10);

        let result = worker.start();

        assert!(matches!(result, Err(CaptureError::Open { .. })));
        assert!(!worker.is_running());
        assert_eq!(connector.live_sources(), 0);
        assert!(worker.snapshot().is_none());
    }

    #[test]
    fn test_start_fails_without_first_frame() {
        let connector = FakeConnector::new(OpenScript::Empty);
        let worker = worker(&connector, 10);

        let result = worker.start();

        assert!(matches!(result, Err(CaptureError::NoFirstFrame(_))));
        assert!(!worker.is_running());
        assert_eq!(connector.opens(), 1);
        assert_eq!(connector.live_sources(), 0);
    }

    #[test]
    fn test_start_fails_when_probe_read_faults() {
        let connector = FakeConnector::new(OpenScript::Faults);
        let worker = worker(&connector, 10);

        assert!(matches!(worker.start(), Err(CaptureError::FirstRead { .. })));
        assert_eq!(connector.live_sources(), 0);
    }

    #[test]
    fn test_frames_become_available() {
        let connector = FakeConnector::new(OpenScript::Frames(None));
        let worker = worker(&connector, 100);

        worker.start().unwrap();
        assert!(worker.is_running());

        assert!(wait_for(Duration::from_secs(2), || worker.snapshot().is_some()));
        let stats = worker.stats();
        assert!(stats.running);
        assert!(stats.frame_count >= 1);
        assert_eq!(stats.resolution.as_deref(), Some("640x480"));
        assert!(stats.last_frame_time.is_some());
        assert_eq!(stats.target_fps, 100);

        worker.stop();
        assert!(!worker.is_running());
        assert_eq!(connector.live_sources(), 0);
    }

    #[test]
    fn test_frame_count_matches_successful_reads() {
        // The probe read consumes one of the six good frames
        let connector = FakeConnector::new(OpenScript::Frames(Some(6)));
        let worker = CaptureWorker::new("cam1", "rtsp://host/stream", 200, connector.clone())
            .with_config(fast_config().reconnect_threshold(10_000));

        worker.start().unwrap();

        assert!(wait_for(Duration::from_secs(2), || worker.stats().error_count >= 5));
        let stats = worker.stats();
        assert_eq!(stats.frame_count, 5);
        assert_eq!(stats.reconnect_count, 0);

        worker.stop();
    }

    #[test]
    fn test_frame_count_monotonic_while_running() {
        let connector = FakeConnector::new(OpenScript::Frames(None));
        let worker = worker(&connector, 200);
        worker.start().unwrap();

        let mut previous = 0;
        for _ in 0..20 {
            let count = worker.stats().frame_count;
            assert!(count >= previous);
            previous = count;
            std::thread::sleep(Duration::from_millis(5));
        }

        worker.stop();
    }

    #[test]
    fn test_start_is_idempotent() {
        let connector = FakeConnector::new(OpenScript::Frames(None));
        let worker = worker(&connector, 50);

        worker.start().unwrap();
        worker.start().unwrap();

        assert_eq!(connector.opens(), 1);
        worker.stop();
        assert_eq!(connector.live_sources(), 0);
    }

    #[test]
    fn test_restart_uses_fresh_state() {
        let connector = FakeConnector::new(OpenScript::Frames(None));
        let worker = worker(&connector, 100);

        worker.start().unwrap();
        assert!(wait_for(Duration::from_secs(2), || worker.stats().frame_count >= 20));
        worker.stop();

        worker.start().unwrap();
        assert!(worker.stats().frame_count < 20);
        assert!(worker.is_running());
        worker.stop();

        assert_eq!(connector.opens(), 2);
        assert_eq!(connector.live_sources(), 0);
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let connector = FakeConnector::new(OpenScript::Frames(None));
        let worker = worker(&connector, 10);

        worker.stop();
        worker.stop();

        assert_eq!(connector.opens(), 0);
    }

    #[test]
    fn test_handler_panics_do_not_stop_loop() {
        let connector = FakeConnector::new(OpenScript::Frames(None));
        let calls = Arc::new(AtomicU64::new(0));
        let handler_calls = Arc::clone(&calls);
        let worker = worker(&connector, 200).with_handler(Arc::new(move |_frame| {
            handler_calls.fetch_add(1, Ordering::Relaxed);
            panic!("listener bug");
        }));

        worker.start().unwrap();

        assert!(wait_for(Duration::from_secs(2), || calls.load(Ordering::Relaxed) >= 3));
        assert!(worker.is_running());
        worker.stop();
    }

    #[test]
    fn test_stop_releases_source_when_thread_is_stuck() {
        let connector = FakeConnector::new(OpenScript::Hang);
        let worker = CaptureWorker::new("cam1", "rtsp://host/stream", 100, connector.clone())
            .with_config(fast_config().join_timeout(Duration::from_millis(50)));

        worker.start().unwrap();
        // Let the loop block inside its second read
        std::thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        worker.stop();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(connector.live_sources(), 0);
        assert!(!worker.is_running());
    }

    #[test]
    fn test_threshold_breach_triggers_single_reconnect() {
        let connector = FakeConnector::with_scripts(
            OpenScript::Frames(None),
            vec![OpenScript::Empty, OpenScript::Frames(None)],
        );
        let mut capture_loop = manual_loop(&connector, 10);

        for _ in 0..10 {
            assert_eq!(capture_loop.tick(), Tick::Failed);
        }
        assert_eq!(capture_loop.shared.error_count.load(Ordering::Relaxed), 10);
        assert_eq!(capture_loop.shared.reconnect_count.load(Ordering::Relaxed), 0);

        // The eleventh consecutive failure crosses the threshold
        assert_eq!(capture_loop.tick(), Tick::Failed);
        assert_eq!(capture_loop.shared.reconnect_count.load(Ordering::Relaxed), 1);
        assert_eq!(capture_loop.shared.error_count.load(Ordering::Relaxed), 0);
        assert_eq!(connector.opens(), 2);
        assert_eq!(connector.live_sources(), 1);

        assert_eq!(capture_loop.tick(), Tick::Frame);
        assert_eq!(capture_loop.shared.frame_count.load(Ordering::Relaxed), 1);
        assert_eq!(capture_loop.shared.reconnect_count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_failed_reconnect_resets_errors_and_retries() {
        let connector = FakeConnector::with_scripts(OpenScript::Fail, vec![OpenScript::Empty]);
        let mut capture_loop = manual_loop(&connector, 10);

        for _ in 0..11 {
            capture_loop.tick();
        }
        assert_eq!(capture_loop.shared.reconnect_count.load(Ordering::Relaxed), 1);
        assert_eq!(capture_loop.shared.error_count.load(Ordering::Relaxed), 0);
        assert!(capture_loop.shared.current_source().is_none());
        assert_eq!(connector.live_sources(), 0);

        // No source: reads keep failing until the next breach retries
        for _ in 0..11 {
            assert_eq!(capture_loop.tick(), Tick::Failed);
        }
        assert_eq!(capture_loop.shared.reconnect_count.load(Ordering::Relaxed), 2);
        assert_eq!(connector.opens(), 3);
    }

    #[test]
    fn test_faulted_reads_count_towards_threshold() {
        let connector =
            FakeConnector::with_scripts(OpenScript::Frames(None), vec![OpenScript::Faults]);
        let mut capture_loop = manual_loop(&connector, 2);

        assert_eq!(capture_loop.tick(), Tick::Faulted);
        assert_eq!(capture_loop.tick(), Tick::Faulted);
        assert_eq!(capture_loop.shared.error_count.load(Ordering::Relaxed), 2);

        assert_eq!(capture_loop.tick(), Tick::Faulted);
        assert_eq!(capture_loop.shared.reconnect_count.load(Ordering::Relaxed), 1);
        assert_eq!(capture_loop.tick(), Tick::Frame);
    }

    #[test]
    fn test_frame_resets_error_count() {
        let connector = FakeConnector::with_scripts(OpenScript::Frames(None), vec![]);
        let mut capture_loop = manual_loop(&connector, 10);
        capture_loop.shared.error_count.store(7, Ordering::Relaxed);

        assert_eq!(capture_loop.tick(), Tick::Frame);
        assert_eq!(capture_loop.shared.error_count.load(Ordering::Relaxed), 0);
        assert!(capture_loop.shared.slot.snapshot().is_some());
    }

    #[test]
    fn test_release_order_is_recorded() {
        let events = EventLog::new();
        let connector = FakeConnector::new(OpenScript::Frames(None)).with_events(events.clone());
        let worker = worker(&connector, 50);

        worker.start().unwrap();
        worker.stop();

        assert_eq!(events.snapshot(), vec!["capture:release".to_string()]);
    }
}
