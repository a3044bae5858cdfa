//! Camera descriptors and the persistence collaborator
//!
//! The supervision core never owns camera records. It reads a
//! [`CameraDescriptor`] and its [`Credentials`] when a camera starts and writes
//! status transitions back through [`CameraStore`].

pub mod store;

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

pub use store::{CameraStore, MemoryCameraStore, StoreError};

/// Camera record as provided by the persistence layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDescriptor {
    /// Stable camera identifier
    pub id: String,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// Stream URL without credentials (e.g. `rtsp://10.0.0.5:554/stream1`)
    pub url: String,
    /// Disabled cameras are never started
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Target capture frame rate
    #[serde(default)]
    pub fps: Option<u32>,
}

fn default_enabled() -> bool {
    true
}

impl CameraDescriptor {
    /// Create an enabled camera with no frame rate preference
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            url: url.into(),
            enabled: true,
            fps: None,
        }
    }

    /// Set the display name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the target frame rate
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Enable or disable the camera
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Resolve the URL used to open the stream
    ///
    /// RTSP cameras take their credentials in the URL userinfo. They are
    /// injected only when both are non-empty and the URL has none yet; any
    /// other URL is returned unchanged.
    pub fn source_url(&self, credentials: &Credentials) -> String {
        let (Some(username), Some(password)) = (
            credentials.username.as_deref().filter(|u| !u.is_empty()),
            credentials.password.as_deref().filter(|p| !p.is_empty()),
        ) else {
            return self.url.clone();
        };

        let Ok(mut url) = Url::parse(&self.url) else {
            return self.url.clone();
        };

        if !matches!(url.scheme(), "rtsp" | "rtsps") || !url.username().is_empty() {
            return self.url.clone();
        }

        if url.set_username(username).is_err() || url.set_password(Some(password)).is_err() {
            return self.url.clone();
        }

        url.to_string()
    }
}

/// Decrypted credential pair for a camera
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// No credentials
    pub fn none() -> Self {
        Self::default()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Streaming status mirrored into the persistence layer
///
/// `Inactive → Connecting → Active`, `Connecting → Error` when the source
/// cannot be opened, and `Active → Inactive` on stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Inactive,
    Connecting,
    Active,
    Error,
}

impl fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CameraStatus::Inactive => "inactive",
            CameraStatus::Connecting => "connecting",
            CameraStatus::Active => "active",
            CameraStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// A status write sent to the persistence layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusUpdate {
    pub status: CameraStatus,
    pub fps: Option<f64>,
    pub resolution: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: CameraStatus) -> Self {
        Self {
            status,
            fps: None,
            resolution: None,
        }
    }

    pub fn fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    pub fn resolution(mut self, resolution: Option<String>) -> Self {
        self.resolution = resolution;
        self
    }
}

/// Mask the password of a URL for logs and stats
///
/// Unparseable input is replaced entirely since it may still contain secrets.
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => "<redacted>".to_string(),
    }
}
