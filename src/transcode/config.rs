//! Transcode supervisor configuration

use std::time::Duration;

/// Transcode supervisor configuration options
#[derive(Debug, Clone)]
pub struct TranscodeConfig {
    /// Transcoder executable
    pub program: String,

    /// Timeout for listing the available encoders
    pub probe_timeout: Duration,

    /// How long a fresh process must survive to count as started
    pub startup_grace: Duration,

    /// Wait after the quit request before terminating
    pub quit_grace: Duration,

    /// Wait after the terminate signal before killing
    pub term_grace: Duration,

    /// Upper bound on waiting for a killed process to exit
    pub kill_timeout: Duration,

    /// Interval between exit checks
    pub poll_interval: Duration,

    /// Diagnostic lines kept for crash reports
    pub diagnostics_tail: usize,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".into(),
            probe_timeout: Duration::from_secs(5),
            startup_grace: Duration::from_secs(1),
            quit_grace: Duration::from_millis(500),
            term_grace: Duration::from_millis(500),
            kill_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
            diagnostics_tail: 20,
        }
    }
}

impl TranscodeConfig {
    /// Set the transcoder executable
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the encoder probe timeout
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the startup grace period
    pub fn startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    /// Set the grace periods between shutdown tiers
    pub fn shutdown_graces(mut self, quit: Duration, term: Duration) -> Self {
        self.quit_grace = quit;
        self.term_grace = term;
        self
    }

    /// Set the kill timeout
    pub fn kill_timeout(mut self, timeout: Duration) -> Self {
        self.kill_timeout = timeout;
        self
    }

    /// Set the exit poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Set how many diagnostic lines to keep
    pub fn diagnostics_tail(mut self, lines: usize) -> Self {
        self.diagnostics_tail = lines;
        self
    }
}
