//! Test doubles shared by the unit tests
//!
//! Scripted video sources, a fake transcoder launcher with controllable
//! processes, and a recording transcoder. Fakes that take part in ordering
//! checks append to a shared [`EventLog`].

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::io::{self, Cursor};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use crate::capture::{Frame, FrameFormat, SourceConnector, SourceError, SourceOptions, VideoSource};
use crate::transcode::{
    Bitrate, DiagnosticStream, Encoder, Launcher, ProcessExit, TranscodeError, TranscodeProcess,
    TranscodeRequest, TranscodeStats, TranscodeStatus, Transcoder,
};

/// Ordered record of calls across fakes
#[derive(Debug, Clone, Default)]
pub(crate) struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, event: &str) {
        self.0.lock().unwrap().push(event.to_string());
    }

    pub(crate) fn snapshot(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub(crate) fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Async variant of [`wait_for`]
pub(crate) async fn wait_for_async<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub(crate) fn test_frame() -> Frame {
    Frame::new(Bytes::from_static(&[0u8; 12]), 640, 480, FrameFormat::Jpeg)
}

/// Behavior of one opened fake source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenScript {
    /// Opening fails
    Fail,
    /// Good reads (unlimited when `None`), then failed reads
    Frames(Option<usize>),
    /// Every read fails
    Empty,
    /// Every read raises an error
    Faults,
    /// One good read, then reads block until released
    Hang,
}

/// Connector handing out scripted sources
pub(crate) struct FakeConnector {
    default: OpenScript,
    scripts: Mutex<VecDeque<OpenScript>>,
    opens: AtomicUsize,
    live: Arc<AtomicUsize>,
    events: Mutex<EventLog>,
}

impl FakeConnector {
    pub(crate) fn new(default: OpenScript) -> Arc<Self> {
        Self::with_scripts(default, Vec::new())
    }

    /// Use `scripts` for the first opens, `default` afterwards
    pub(crate) fn with_scripts(default: OpenScript, scripts: Vec<OpenScript>) -> Arc<Self> {
        Arc::new(Self {
            default,
            scripts: Mutex::new(scripts.into()),
            opens: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
            events: Mutex::new(EventLog::new()),
        })
    }

    pub(crate) fn with_events(self: Arc<Self>, events: EventLog) -> Arc<Self> {
        *self.events.lock().unwrap() = events;
        self
    }

    /// Open attempts so far
    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Sources opened and not yet released
    pub(crate) fn live_sources(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl SourceConnector for FakeConnector {
    fn open(&self, _url: &str, _options: &SourceOptions) -> Result<Arc<dyn VideoSource>, SourceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default);

        if script == OpenScript::Fail {
            return Err(SourceError::Open("connection refused".into()));
        }

        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeSource {
            script,
            reads: AtomicUsize::new(0),
            released: AtomicBool::new(false),
            live: Arc::clone(&self.live),
            events: self.events.lock().unwrap().clone(),
        }))
    }
}

struct FakeSource {
    script: OpenScript,
    reads: AtomicUsize,
    released: AtomicBool,
    live: Arc<AtomicUsize>,
    events: EventLog,
}

impl VideoSource for FakeSource {
    fn read(&self) -> Result<Option<Frame>, SourceError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(SourceError::Closed);
        }
        let read = self.reads.fetch_add(1, Ordering::SeqCst);

        match self.script {
            OpenScript::Frames(None) => Ok(Some(test_frame())),
            OpenScript::Frames(Some(limit)) if read < limit => Ok(Some(test_frame())),
            OpenScript::Frames(Some(_)) | OpenScript::Empty => Ok(None),
            OpenScript::Faults => Err(SourceError::Malformed("corrupt packet".into())),
            OpenScript::Hang if read == 0 => Ok(Some(test_frame())),
            OpenScript::Hang => {
                while !self.released.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(2));
                }
                Err(SourceError::Closed)
            }
            OpenScript::Fail => Err(SourceError::Closed),
        }
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.live.fetch_sub(1, Ordering::SeqCst);
            self.events.push("capture:release");
        }
    }
}

/// Which shutdown tier makes a fake process exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExitOn {
    Quit,
    Terminate,
    Kill,
    Never,
}

/// Behavior of one launched fake process
#[derive(Debug, Clone)]
pub(crate) struct ProcessScript {
    output: String,
    exit_at_launch: Option<i32>,
    exits_on: ExitOn,
}

impl Default for ProcessScript {
    fn default() -> Self {
        Self {
            output: String::new(),
            exit_at_launch: None,
            exits_on: ExitOn::Quit,
        }
    }
}

impl ProcessScript {
    /// Diagnostic output written before the stream closes
    pub(crate) fn output(mut self, output: &str) -> Self {
        self.output = output.to_string();
        self
    }

    /// Exit with `code` right after launch
    pub(crate) fn exit_at_launch(mut self, code: i32) -> Self {
        self.exit_at_launch = Some(code);
        self
    }

    pub(crate) fn exits_on(mut self, tier: ExitOn) -> Self {
        self.exits_on = tier;
        self
    }
}

#[derive(Default)]
struct FakeProcessState {
    exit: Mutex<Option<ProcessExit>>,
    calls: Mutex<Vec<&'static str>>,
}

/// Test-side control of a launched fake process
#[derive(Clone)]
pub(crate) struct FakeProcessHandle(Arc<FakeProcessState>);

impl FakeProcessHandle {
    /// Shutdown calls received, in order
    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.0.calls.lock().unwrap().clone()
    }

    /// Make the process exit on its own
    pub(crate) fn exit(&self, code: Option<i32>) {
        *self.0.exit.lock().unwrap() = Some(ProcessExit { code });
    }
}

struct FakeProcess {
    pid: u32,
    state: Arc<FakeProcessState>,
    exits_on: ExitOn,
    output: Option<Cursor<Vec<u8>>>,
}

impl FakeProcess {
    fn record(&self, call: &'static str, exits: bool, code: Option<i32>) {
        self.state.calls.lock().unwrap().push(call);
        if exits {
            let mut exit = self.state.exit.lock().unwrap();
            if exit.is_none() {
                *exit = Some(ProcessExit { code });
            }
        }
    }
}

#[async_trait]
impl TranscodeProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn take_diagnostics(&mut self) -> Option<DiagnosticStream> {
        self.output
            .take()
            .map(|cursor| Box::new(cursor) as DiagnosticStream)
    }

    async fn request_quit(&mut self) -> io::Result<()> {
        self.record("quit", self.exits_on == ExitOn::Quit, Some(0));
        Ok(())
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.record("terminate", self.exits_on == ExitOn::Terminate, None);
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.record("kill", self.exits_on == ExitOn::Kill, None);
        Ok(())
    }

    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        Ok(*self.state.exit.lock().unwrap())
    }
}

/// Launcher producing scripted fake processes
pub(crate) struct FakeLauncher {
    script: ProcessScript,
    scripts: Mutex<VecDeque<ProcessScript>>,
    encoders: Mutex<String>,
    launched: Mutex<Vec<(Vec<String>, FakeProcessHandle)>>,
}

impl FakeLauncher {
    pub(crate) fn new(script: ProcessScript) -> Arc<Self> {
        Self::with_scripts(script, Vec::new())
    }

    /// Use `scripts` for the first launches, `default` afterwards
    pub(crate) fn with_scripts(default: ProcessScript, scripts: Vec<ProcessScript>) -> Arc<Self> {
        Arc::new(Self {
            script: default,
            scripts: Mutex::new(scripts.into()),
            encoders: Mutex::new(String::new()),
            launched: Mutex::new(Vec::new()),
        })
    }

    /// Encoder listing returned by the probe
    pub(crate) fn with_encoders(self: Arc<Self>, listing: &str) -> Arc<Self> {
        *self.encoders.lock().unwrap() = listing.to_string();
        self
    }

    pub(crate) fn launch_count(&self) -> usize {
        self.launched.lock().unwrap().len()
    }

    pub(crate) fn launched_args(&self, index: usize) -> Option<Vec<String>> {
        self.launched
            .lock()
            .unwrap()
            .get(index)
            .map(|(args, _)| args.clone())
    }

    pub(crate) fn handle(&self, index: usize) -> Option<FakeProcessHandle> {
        self.launched
            .lock()
            .unwrap()
            .get(index)
            .map(|(_, handle)| handle.clone())
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn available_encoders(&self) -> Result<String, TranscodeError> {
        Ok(self.encoders.lock().unwrap().clone())
    }

    async fn launch(
        &self,
        _camera_id: &str,
        args: &[String],
    ) -> Result<Box<dyn TranscodeProcess>, TranscodeError> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.script.clone());
        let state = Arc::new(FakeProcessState::default());
        if let Some(code) = script.exit_at_launch {
            *state.exit.lock().unwrap() = Some(ProcessExit { code: Some(code) });
        }

        let mut launched = self.launched.lock().unwrap();
        let pid = 4000 + launched.len() as u32;
        launched.push((args.to_vec(), FakeProcessHandle(Arc::clone(&state))));

        Ok(Box::new(FakeProcess {
            pid,
            state,
            exits_on: script.exits_on,
            output: Some(Cursor::new(script.output.into_bytes())),
        }))
    }
}

/// Transcoder that records calls instead of launching processes
pub(crate) struct FakeTranscoder {
    events: Mutex<EventLog>,
    fail_start: AtomicBool,
    running: Mutex<HashSet<String>>,
    requests: Mutex<Vec<TranscodeRequest>>,
}

impl FakeTranscoder {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(EventLog::new()),
            fail_start: AtomicBool::new(false),
            running: Mutex::new(HashSet::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn with_events(self: Arc<Self>, events: EventLog) -> Arc<Self> {
        *self.events.lock().unwrap() = events;
        self
    }

    /// Make every start fail as if the process died during startup
    pub(crate) fn failing(self: Arc<Self>) -> Arc<Self> {
        self.fail_start.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn is_running(&self, camera_id: &str) -> bool {
        self.running.lock().unwrap().contains(camera_id)
    }

    pub(crate) fn requests(&self) -> Vec<TranscodeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn start_transcoding(&self, request: TranscodeRequest) -> Result<(), TranscodeError> {
        self.events.lock().unwrap().push("transcode:start");
        self.requests.lock().unwrap().push(request.clone());

        if self.fail_start.load(Ordering::SeqCst) {
            return Err(TranscodeError::EarlyExit {
                camera_id: request.camera_id,
                code: Some(1),
                diagnostics: "Connection refused".into(),
            });
        }

        self.running.lock().unwrap().insert(request.camera_id);
        Ok(())
    }

    async fn stop_transcoding(&self, camera_id: &str) -> Result<(), TranscodeError> {
        self.events.lock().unwrap().push("transcode:stop");
        self.running.lock().unwrap().remove(camera_id);
        Ok(())
    }

    async fn is_transcoding(&self, camera_id: &str) -> bool {
        self.is_running(camera_id)
    }

    async fn stop_all(&self) {
        self.events.lock().unwrap().push("transcode:stop_all");
        self.running.lock().unwrap().clear();
    }

    async fn stats(&self, camera_id: &str) -> Option<TranscodeStats> {
        if !self.is_running(camera_id) {
            return None;
        }
        let request = self
            .requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.camera_id == camera_id)
            .cloned()?;

        Some(TranscodeStats {
            camera_id: camera_id.to_string(),
            input_url: request.input_url,
            output_url: request.output_url,
            encoder: Encoder::X264,
            fps: request.fps,
            bitrate: Bitrate::default(),
            resolution: None,
            started_at: Utc::now(),
            pid: Some(1),
            status: TranscodeStatus::Running,
            exit_code: None,
        })
    }
}
