//! Scan Session
//!
//! A [`ScanSession`] runs one barcode scan at a time: it opens the camera,
//! streams frames into the decoder, watches the screen for a cancelling tap
//! and reports exactly one terminal outcome to the caller's
//! [`NotificationSink`].
//!
//! ## Threads
//!
//! - **Caller**: `start_read` acquires the camera synchronously and returns once
//!   frames are flowing. `stop_read` tears the session down and blocks until the
//!   worker has exited.
//! - **Worker** (`barcode-scan-worker`): pumps screen events every poll
//!   interval. A tap ends the scan as cancelled.
//! - **Camera**: delivers frames on a thread of its own choosing. The first
//!   decoded barcode ends the scan.
//!
//! Whichever of stop, decode and tap takes the session guard first moves it
//! out of `Streaming`; the others see that and do nothing.
//!
//! The sink is never called with the guard held, so it may call back into the
//! session, e.g. `stop_read` on `codeFound`.
//!
//! # Example
//!
//! ```no_run
//! use barcode_session::hardware::mock::{
//!     MockCamera, MockCompositor, MockEventQueue, RecordingSink, ScriptedDecoder,
//! };
//! use barcode_session::session::ScanSession;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let sink = Arc::new(RecordingSink::new());
//! let session = ScanSession::builder(
//!     Arc::new(MockCamera::new()),
//!     Arc::new(ScriptedDecoder::new()),
//!     Arc::new(MockCompositor::new()),
//!     Arc::new(MockEventQueue::new()),
//!     sink.clone(),
//! )
//! .build()?;
//!
//! session.start_read("cb-1", r#"{"handle":"42","group":"app-group"}"#)?;
//! session.stop_read("cb-1")?;
//! # Ok(())
//! # }
//! ```

mod args;
mod frames;
mod notification;
mod outcome;
mod shared;
mod state;
mod worker;

pub use args::{ArgumentError, SessionConfig};
pub use notification::{
    ChannelSink, CodeFoundBody, ErrorFoundBody, Notification, NotificationBody, NotificationSink,
    ScanEvent, StatusBody,
};
pub use outcome::BarcodeOutcome;
pub use state::Phase;

use self::shared::SessionCore;
use crate::config::{PropertyPolicy, ScannerSettings};
use crate::error::{ScanError, ScanResult, Stage};
use crate::hardware::camera::{CameraSource, ViewfinderSettings};
use crate::hardware::decoder::{DecodeHints, FrameDecoder};
use crate::hardware::surface::Compositor;
use crate::input::EventQueue;
use state::StopReason;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

/// Builder for [`ScanSession`].
///
/// The five capabilities are required; settings and decode hints default.
pub struct ScanSessionBuilder {
    camera: Arc<dyn CameraSource>,
    decoder: Arc<dyn FrameDecoder>,
    compositor: Arc<dyn Compositor>,
    events: Arc<dyn EventQueue>,
    sink: Arc<dyn NotificationSink>,
    settings: ScannerSettings,
    hints: DecodeHints,
}

impl ScanSessionBuilder {
    /// Start a builder from the session's capabilities.
    pub fn new(
        camera: Arc<dyn CameraSource>,
        decoder: Arc<dyn FrameDecoder>,
        compositor: Arc<dyn Compositor>,
        events: Arc<dyn EventQueue>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            camera,
            decoder,
            compositor,
            events,
            sink,
            settings: ScannerSettings::default(),
            hints: DecodeHints::default(),
        }
    }

    /// Use scanner settings from configuration.
    pub fn with_settings(mut self, settings: ScannerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Restrict the formats the decoder reports.
    pub fn with_hints(mut self, hints: DecodeHints) -> Self {
        self.hints = hints;
        self
    }

    /// Build the session.
    ///
    /// Fails if the poll interval is outside 1-1000 ms or the viewfinder
    /// window id is empty.
    pub fn build(self) -> ScanResult<ScanSession> {
        if !(1..=1000).contains(&self.settings.poll_interval_ms) {
            return Err(ScanError::Configuration(format!(
                "Invalid poll_interval_ms {}. Must be 1-1000",
                self.settings.poll_interval_ms
            )));
        }
        if self.settings.viewfinder_window_id.trim().is_empty() {
            return Err(ScanError::Configuration(
                "viewfinder_window_id must not be empty".to_string(),
            ));
        }
        Ok(ScanSession {
            core: Arc::new(SessionCore::new(
                self.camera,
                self.decoder,
                self.compositor,
                self.events,
                self.sink,
                self.settings,
                self.hints,
            )),
            worker: Mutex::new(None),
        })
    }
}

enum StopAction {
    Join,
    Teardown,
}

/// Single-shot barcode scan session.
///
/// Dropping an active session stops it first.
pub struct ScanSession {
    core: Arc<SessionCore>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ScanSession {
    /// See [`ScanSessionBuilder::new`].
    pub fn builder(
        camera: Arc<dyn CameraSource>,
        decoder: Arc<dyn FrameDecoder>,
        compositor: Arc<dyn Compositor>,
        events: Arc<dyn EventQueue>,
        sink: Arc<dyn NotificationSink>,
    ) -> ScanSessionBuilder {
        ScanSessionBuilder::new(camera, decoder, compositor, events, sink)
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.core.lock().phase
    }

    /// Whether a scan is in progress (any phase but `Idle`).
    pub fn is_active(&self) -> bool {
        self.phase() != Phase::Idle
    }

    /// Whether the running scan has been cancelled by a tap.
    pub fn cancel_requested(&self) -> bool {
        self.core.lock().cancel_requested
    }

    /// Correlation token of the current or last scan.
    pub fn callback_id(&self) -> String {
        self.core.lock().callback_id.clone()
    }

    /// Begin a scan.
    ///
    /// `args` is the JSON argument object described in
    /// [`SessionConfig::parse`]. Returns once the camera is streaming and
    /// `started` has been handed to the sink, or queued behind a notification
    /// another thread is still delivering. On failure exactly one `errorFound`
    /// is sent, whatever was acquired has been released and the session is
    /// `Idle` again.
    pub fn start_read(&self, callback_id: &str, args: &str) -> ScanResult<()> {
        let halt = {
            let mut state = self.core.lock();
            if !state.claim(callback_id) {
                drop(state);
                let err = ScanError::SessionActive;
                self.core.report(callback_id, &err);
                return Err(err);
            }
            Arc::clone(&state.halt)
        };
        // A worker that finished on its own may still be unjoined.
        self.join_worker();
        tracing::info!(callback_id, "Starting scan session");

        let config = match self.prepare(args) {
            Ok(config) => config,
            Err(err) => {
                self.core.lock().finish();
                self.core.report(callback_id, &err);
                return Err(err);
            }
        };
        self.core.lock().surface_group = config.surface_group.clone();

        let core = Arc::clone(&self.core);
        let spawned = thread::Builder::new()
            .name(worker::WORKER_THREAD_NAME.to_string())
            .spawn(move || worker::run(core, halt));
        match spawned {
            Ok(handle) => *self.worker_slot() = Some(handle),
            Err(e) => {
                let err = ScanError::Thread(e.to_string());
                self.core.lock().finish();
                self.core.report(callback_id, &err);
                return Err(err);
            }
        }

        if let Err(err) = self.acquire(&config) {
            self.core.lock().fail();
            self.core.report(callback_id, &err);
            self.join_worker();
            self.core.teardown();
            return Err(err);
        }

        {
            let mut state = self.core.lock();
            state.phase = Phase::Streaming;
            self.core.post(Notification::started(callback_id));
        }
        tracing::info!(callback_id, "Scan session streaming");
        self.core.flush();
        Ok(())
    }

    /// End the scan.
    ///
    /// From `Streaming` this halts the worker, waits for it, releases the
    /// camera and sends `ended`. From `Idle` it does nothing. If the session is
    /// already tearing itself down it only waits for that to finish. Stopping
    /// while the camera is still being opened is rejected.
    pub fn stop_read(&self, callback_id: &str) -> ScanResult<()> {
        let action = {
            let mut state = self.core.lock();
            if state.callback_id != callback_id {
                tracing::debug!(
                    callback_id,
                    session = %state.callback_id,
                    "Stop requested with a different callback id"
                );
            }
            match state.phase {
                Phase::Idle | Phase::Stopping | Phase::Errored => StopAction::Join,
                Phase::Streaming => {
                    state.begin_stop(StopReason::Explicit);
                    StopAction::Teardown
                }
                Phase::Opening => {
                    drop(state);
                    let err = ScanError::InvalidState {
                        operation: "stop",
                        phase: Phase::Opening,
                    };
                    self.core.report(callback_id, &err);
                    return Err(err);
                }
            }
        };

        self.join_worker();
        if let StopAction::Teardown = action {
            self.core.teardown();
        }
        Ok(())
    }

    fn prepare(&self, args: &str) -> ScanResult<SessionConfig> {
        let config = SessionConfig::parse(args)?;
        self.core
            .compositor
            .attach(config.target_surface)
            .map_err(|source| ScanError::Surface {
                stage: Stage::WindowContext,
                source,
            })?;
        Ok(config)
    }

    fn acquire(&self, config: &SessionConfig) -> ScanResult<()> {
        let camera = &self.core.camera;
        let settings = &self.core.settings;

        let handle = camera
            .open(settings.camera_unit)
            .map_err(|e| ScanError::camera(Stage::OpenCamera, e))?;
        self.core.lock().camera = Some(handle);
        tracing::debug!(%handle, unit = ?settings.camera_unit, "Camera open");

        let rotation = match camera.viewfinder_rotation(handle) {
            Ok(rotation) => rotation,
            Err(e) if settings.property_policy == PropertyPolicy::BestEffort => {
                tracing::warn!(error = %e, "Viewfinder rotation unavailable, assuming 0");
                0
            }
            Err(e) => return Err(ScanError::camera(Stage::ViewfinderRotation, e)),
        };
        self.core.lock().viewfinder_rotation = rotation;

        let viewfinder = ViewfinderSettings {
            rotation_hint: config.rotation_hint,
            window_group: config.surface_group.clone(),
            window_id: settings.viewfinder_window_id.clone(),
        };
        camera
            .configure(handle, &viewfinder)
            .map_err(|e| ScanError::camera(Stage::ViewfinderProperties, e))?;

        camera
            .start_streaming(handle, frames::frame_callback(Arc::clone(&self.core)))
            .map_err(|e| ScanError::camera(Stage::ViewfinderStart, e))?;
        self.core.lock().streaming_started = true;

        camera
            .set_focus_mode(handle, settings.focus_mode)
            .map_err(|e| ScanError::camera(Stage::FocusMode, e))?;
        Ok(())
    }

    fn worker_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Worker handle mutex poisoned - recovering");
                poisoned.into_inner()
            }
        }
    }

    fn join_worker(&self) {
        let mut slot = self.worker_slot();
        let Some(handle) = slot.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            // Re-entered from a notification the worker is delivering; it
            // exits once that returns.
            *slot = Some(handle);
            return;
        }
        drop(slot);
        if handle.join().is_err() {
            tracing::error!("Scan worker panicked");
        }
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        if self.is_active() {
            let callback_id = self.callback_id();
            if let Err(e) = self.stop_read(&callback_id) {
                tracing::warn!(error = %e, "Failed to stop scan session on drop");
            }
        }
        self.join_worker();
    }
}
