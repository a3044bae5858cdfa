//! Stream registry implementation
//!
//! The one component the rest of the application talks to. Pairs a capture
//! worker with a transcoder per camera, keeps start and stop idempotent, and
//! mirrors every transition into the camera store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use arc_swap::ArcSwap;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard, RwLock};

use super::config::RegistryConfig;
use super::entry::{frame_handler, RegistryEntry};
use super::error::RegistryError;
use super::frame::FrameListener;
use crate::camera::{CameraStatus, CameraStore, StatusUpdate};
use crate::capture::{CaptureWorker, CapturedFrame, FfmpegConnector, SourceConnector};
use crate::stats::CameraStats;
use crate::transcode::{TranscodeRequest, TranscodeSupervisor, Transcoder};

type CameraLocks = StdMutex<HashMap<String, Arc<Mutex<()>>>>;

/// Holds the start/stop lock of one camera
///
/// The lock is dropped from the map once nobody holds or waits for it.
struct CameraGuard<'a> {
    locks: &'a CameraLocks,
    camera_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for CameraGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(self.guard.take());

        let idle = locks
            .get(&self.camera_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.camera_id);
        }
    }
}

/// Central registry of streaming cameras
///
/// Operations on different cameras run concurrently. Operations on the same
/// camera are serialized by a per-camera lock, so a start racing a stop
/// always sees the other's completed result.
pub struct StreamRegistry {
    /// Persistence collaborator
    store: Arc<dyn CameraStore>,

    /// Opens camera video sources
    connector: Arc<dyn SourceConnector>,

    /// Transcoder for every camera
    transcoder: Arc<dyn Transcoder>,

    /// Map of camera id to its entry
    entries: RwLock<HashMap<String, Arc<RegistryEntry>>>,

    /// Per-camera start/stop locks, present only while in use
    camera_locks: CameraLocks,

    /// Configuration
    config: RegistryConfig,
}

impl StreamRegistry {
    /// Create a registry with ffmpeg capture and transcoding and default configuration
    pub fn new(store: Arc<dyn CameraStore>) -> Self {
        Self::with_config(store, RegistryConfig::default())
    }

    /// Create a registry with ffmpeg capture and transcoding and custom configuration
    pub fn with_config(store: Arc<dyn CameraStore>, config: RegistryConfig) -> Self {
        let transcoder = Arc::new(TranscodeSupervisor::with_config(config.transcode.clone()));
        Self::with_parts(store, Arc::new(FfmpegConnector::default()), transcoder, config)
    }

    /// Create a registry from explicit collaborators
    pub fn with_parts(
        store: Arc<dyn CameraStore>,
        connector: Arc<dyn SourceConnector>,
        transcoder: Arc<dyn Transcoder>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            store,
            connector,
            transcoder,
            entries: RwLock::new(HashMap::new()),
            camera_locks: StdMutex::new(HashMap::new()),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Start streaming a camera
    ///
    /// Succeeds immediately if the camera is already streaming. Otherwise the
    /// capture worker must start; a transcoder that fails to start is logged
    /// and streaming continues without transcoded output.
    pub async fn start_camera(&self, camera_id: &str) -> Result<(), RegistryError> {
        self.start(camera_id, None).await
    }

    /// Start streaming a camera and register `listener` for its frames
    ///
    /// If the camera is already streaming the listener is added to it.
    pub async fn start_camera_with_listener(
        &self,
        camera_id: &str,
        listener: FrameListener,
    ) -> Result<(), RegistryError> {
        self.start(camera_id, Some(listener)).await
    }

    async fn start(
        &self,
        camera_id: &str,
        listener: Option<FrameListener>,
    ) -> Result<(), RegistryError> {
        let _serialized = self.lock_camera(camera_id).await;

        if let Some(entry) = self.entries.read().await.get(camera_id) {
            if let Some(listener) = listener {
                entry.add_listener(listener);
            }
            tracing::warn!(camera_id = %camera_id, "Camera already streaming");
            return Ok(());
        }

        let camera = match self.store.get_camera(camera_id).await? {
            Some(camera) => camera,
            None => {
                tracing::error!(camera_id = %camera_id, "Camera not found");
                return Err(RegistryError::CameraNotFound(camera_id.to_string()));
            }
        };

        if !camera.enabled {
            tracing::warn!(camera_id = %camera_id, "Camera is disabled");
            return Err(RegistryError::CameraDisabled(camera_id.to_string()));
        }

        let credentials = self.store.credentials(&camera).await?;
        let source_url = camera.source_url(&credentials);

        tracing::info!(camera_id = %camera_id, name = %camera.name, "Starting camera");
        self.set_status(camera_id, StatusUpdate::new(CameraStatus::Connecting))
            .await;

        let listeners = Arc::new(ArcSwap::from_pointee(listener.into_iter().collect::<Vec<_>>()));
        let (frames_tx, _) = broadcast::channel(self.config.broadcast_capacity.max(1));
        let handler = frame_handler(camera_id, Arc::clone(&listeners), frames_tx.clone());

        let target_fps = camera.fps.unwrap_or(self.config.default_capture_fps);
        let worker = Arc::new(
            CaptureWorker::new(
                camera_id,
                source_url.clone(),
                target_fps,
                Arc::clone(&self.connector),
            )
            .with_config(self.config.capture.clone())
            .with_handler(handler),
        );

        let started = {
            let worker = Arc::clone(&worker);
            tokio::task::spawn_blocking(move || worker.start()).await
        };

        let failure = match started {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(RegistryError::Capture(e)),
            Err(e) => Some(RegistryError::TaskFailed {
                camera_id: camera_id.to_string(),
                reason: e.to_string(),
            }),
        };
        if let Some(error) = failure {
            tracing::error!(camera_id = %camera_id, error = %error, "Failed to start camera");
            self.set_status(camera_id, StatusUpdate::new(CameraStatus::Error))
                .await;
            return Err(error);
        }

        let output_url = self.config.output_url(camera_id);
        let request = TranscodeRequest::new(camera_id, source_url, output_url.clone())
            .fps(camera.fps.unwrap_or(self.config.default_transcode_fps))
            .bitrate(self.config.transcode_bitrate)
            .resolution(self.config.transcode_resolution.clone());

        let transcode_error = self.start_transcoder(camera_id, request).await;

        let capture = worker.stats();
        let entry = RegistryEntry::new(worker, listeners, frames_tx, output_url, transcode_error);
        self.entries
            .write()
            .await
            .insert(camera_id.to_string(), Arc::new(entry));

        self.set_status(
            camera_id,
            StatusUpdate::new(CameraStatus::Active)
                .fps(capture.fps)
                .resolution(capture.resolution),
        )
        .await;

        tracing::info!(camera_id = %camera_id, fps = target_fps, "Camera streaming");
        Ok(())
    }

    /// Stop streaming a camera
    ///
    /// Succeeds immediately if the camera is not streaming. The transcoder is
    /// always stopped before the capture worker. If the transcoder refuses
    /// to exit, the camera is still torn down and the error returned.
    pub async fn stop_camera(&self, camera_id: &str) -> Result<(), RegistryError> {
        let _serialized = self.lock_camera(camera_id).await;

        let Some(entry) = self.entries.read().await.get(camera_id).cloned() else {
            tracing::debug!(camera_id = %camera_id, "Camera not streaming");
            return Ok(());
        };

        tracing::info!(camera_id = %camera_id, "Stopping camera");

        let transcode_result = self.transcoder.stop_transcoding(camera_id).await;

        let worker = Arc::clone(&entry.worker);
        if let Err(e) = tokio::task::spawn_blocking(move || worker.stop()).await {
            tracing::error!(camera_id = %camera_id, error = %e, "Capture stop task failed");
        }

        entry.clear_listeners();
        self.entries.write().await.remove(camera_id);
        self.set_status(camera_id, StatusUpdate::new(CameraStatus::Inactive))
            .await;

        match transcode_result {
            Ok(()) => {
                tracing::info!(camera_id = %camera_id, "Camera stopped");
                Ok(())
            }
            Err(e) => {
                tracing::error!(camera_id = %camera_id, error = %e, "Camera stopped, transcoder still running");
                Err(e.into())
            }
        }
    }

    /// Stop every streaming camera
    ///
    /// Failures are logged and do not abort the sweep. Transcoders left
    /// behind by an earlier failed stop are swept as well.
    pub async fn stop_all(&self) {
        let camera_ids = self.camera_ids().await;
        tracing::info!(cameras = camera_ids.len(), "Stopping all cameras");

        for camera_id in camera_ids {
            if let Err(e) = self.stop_camera(&camera_id).await {
                tracing::error!(camera_id = %camera_id, error = %e, "Error stopping camera");
            }
        }

        self.transcoder.stop_all().await;
    }

    /// Start every enabled camera known to the store
    ///
    /// Returns how many started. Individual failures are logged.
    pub async fn autostart_enabled(&self) -> Result<usize, RegistryError> {
        let cameras = self.store.list_cameras().await?;
        let mut started = 0;

        for camera in cameras.iter().filter(|c| c.enabled) {
            match self.start_camera(&camera.id).await {
                Ok(()) => started += 1,
                Err(e) => {
                    tracing::error!(camera_id = %camera.id, error = %e, "Autostart failed");
                }
            }
        }

        tracing::info!(started, total = cameras.len(), "Camera autostart complete");
        Ok(started)
    }

    /// Latest frame of a streaming camera
    pub async fn frame(&self, camera_id: &str) -> Option<Arc<CapturedFrame>> {
        self.entries
            .read()
            .await
            .get(camera_id)
            .and_then(|entry| entry.worker.snapshot())
    }

    /// Statistics of a streaming camera
    pub async fn stats(&self, camera_id: &str) -> Option<CameraStats> {
        let entry = self.entries.read().await.get(camera_id).cloned()?;
        let transcode = self.transcoder.stats(camera_id).await;
        Some(entry.stats(transcode))
    }

    /// Statistics of every streaming camera
    pub async fn all_stats(&self) -> HashMap<String, CameraStats> {
        let entries: Vec<(String, Arc<RegistryEntry>)> = self
            .entries
            .read()
            .await
            .iter()
            .map(|(id, entry)| (id.clone(), Arc::clone(entry)))
            .collect();

        let mut stats = HashMap::with_capacity(entries.len());
        for (camera_id, entry) in entries {
            let transcode = self.transcoder.stats(&camera_id).await;
            stats.insert(camera_id, entry.stats(transcode));
        }
        stats
    }

    /// Register a listener on a streaming camera
    pub async fn add_listener(
        &self,
        camera_id: &str,
        listener: FrameListener,
    ) -> Result<(), RegistryError> {
        match self.entries.read().await.get(camera_id) {
            Some(entry) => {
                entry.add_listener(listener);
                Ok(())
            }
            None => Err(RegistryError::CameraNotFound(camera_id.to_string())),
        }
    }

    /// Receive the frames of a streaming camera
    ///
    /// A slow receiver skips frames rather than holding up capture.
    pub async fn subscribe(
        &self,
        camera_id: &str,
    ) -> Option<broadcast::Receiver<Arc<CapturedFrame>>> {
        self.entries
            .read()
            .await
            .get(camera_id)
            .map(|entry| entry.subscribe())
    }

    /// Whether a camera is streaming
    pub async fn is_streaming(&self, camera_id: &str) -> bool {
        self.entries.read().await.contains_key(camera_id)
    }

    /// Ids of every streaming camera
    pub async fn camera_ids(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    async fn lock_camera(&self, camera_id: &str) -> CameraGuard<'_> {
        let lock = {
            let mut locks = self.camera_locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(camera_id.to_string()).or_default())
        };

        CameraGuard {
            locks: &self.camera_locks,
            camera_id: camera_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Start the transcoder, returning why it did not start
    ///
    /// A process still registered from an earlier failed stop is stopped
    /// first rather than adopted.
    async fn start_transcoder(&self, camera_id: &str, request: TranscodeRequest) -> Option<String> {
        if self.transcoder.is_transcoding(camera_id).await {
            tracing::warn!(camera_id = %camera_id, "Stopping leftover transcoder");
            if let Err(e) = self.transcoder.stop_transcoding(camera_id).await {
                tracing::error!(
                    camera_id = %camera_id,
                    error = %e,
                    "Leftover transcoder still running, streaming without transcoded output"
                );
                return Some(e.to_string());
            }
        }

        match self.transcoder.start_transcoding(request).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(
                    camera_id = %camera_id,
                    error = %e,
                    "Transcoder failed to start, streaming without transcoded output"
                );
                Some(e.to_string())
            }
        }
    }

    async fn set_status(&self, camera_id: &str, update: StatusUpdate) {
        let status = update.status;
        if let Err(e) = self.store.update_status(camera_id, update).await {
            tracing::warn!(
                camera_id = %camera_id,
                status = %status,
                error = %e,
                "Failed to persist camera status"
            );
        }
    }
}
