//! Shared session core.
//!
//! One `SessionCore` lives behind an `Arc` for the lifetime of a
//! [`ScanSession`](super::ScanSession). The caller's thread, the worker thread
//! and the camera's frame-delivery thread all hold a clone; the
//! `Mutex<SessionState>` inside is the single guard they synchronise on.
//!
//! Notifications are posted to the outbox while the guard is held, so their
//! order follows the phase transitions, and flushed to the sink after it is
//! released.

use super::notification::{Notification, NotificationSink, Outbox};
use super::outcome::BarcodeOutcome;
use super::state::{SessionState, StopReason};
use crate::config::ScannerSettings;
use crate::error::{ScanError, Stage};
use crate::hardware::camera::CameraSource;
use crate::hardware::decoder::{DecodeHints, FrameDecoder};
use crate::hardware::surface::Compositor;
use crate::input::EventQueue;
use std::sync::{Arc, Mutex, MutexGuard};

pub(crate) struct SessionCore {
    state: Mutex<SessionState>,
    pub camera: Arc<dyn CameraSource>,
    pub decoder: Arc<dyn FrameDecoder>,
    pub compositor: Arc<dyn Compositor>,
    pub events: Arc<dyn EventQueue>,
    pub sink: Arc<dyn NotificationSink>,
    pub settings: ScannerSettings,
    pub hints: DecodeHints,
    outbox: Outbox,
}

impl SessionCore {
    pub fn new(
        camera: Arc<dyn CameraSource>,
        decoder: Arc<dyn FrameDecoder>,
        compositor: Arc<dyn Compositor>,
        events: Arc<dyn EventQueue>,
        sink: Arc<dyn NotificationSink>,
        settings: ScannerSettings,
        hints: DecodeHints,
    ) -> Self {
        Self {
            state: Mutex::new(SessionState::default()),
            camera,
            decoder,
            compositor,
            events,
            sink,
            settings,
            hints,
            outbox: Outbox::default(),
        }
    }

    /// Acquire the session guard, recovering from poisoning.
    pub fn lock(&self) -> MutexGuard<'_, SessionState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Session state mutex poisoned - recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Log `error` and send one `errorFound` for it.
    ///
    /// Must be called without the guard held.
    pub fn report(&self, callback_id: &str, error: &ScanError) {
        tracing::error!(
            callback_id,
            stage = error.stage().as_str(),
            error = %error,
            "Scan step failed"
        );
        self.deliver(callback_id, &BarcodeOutcome::from(error));
        self.flush();
    }

    /// Queue a notification for the sink.
    pub fn post(&self, notification: Notification) {
        self.outbox.post(notification);
    }

    /// Queue the notification for an outcome, if it has one.
    pub fn deliver(&self, callback_id: &str, outcome: &BarcodeOutcome) {
        if let Some(notification) = Notification::from_outcome(callback_id, outcome) {
            self.post(notification);
        }
    }

    /// Hand queued notifications to the sink. Must be called without the
    /// guard held.
    pub fn flush(&self) {
        self.outbox.flush(self.sink.as_ref());
    }

    /// Release the camera and return to `Idle`.
    ///
    /// The handle is taken under the guard, so the camera is stopped and
    /// closed at most once however many paths reach here. Stop and close
    /// failures are reported and teardown carries on. The closing
    /// notification depends on what ended the session:
    ///
    /// - cancellation: `codeFound` with `cancelled: true`
    /// - explicit stop or decode: `ended`, unless teardown reported a failure
    /// - acquisition failure: nothing further
    pub fn teardown(&self) {
        let (handle, streaming, callback_id, reason) = {
            let mut state = self.lock();
            (
                state.camera.take(),
                std::mem::take(&mut state.streaming_started),
                state.callback_id.clone(),
                state.stop_reason,
            )
        };

        let mut clean = true;
        if let Some(handle) = handle {
            if streaming {
                if let Err(e) = self.camera.stop_streaming(handle) {
                    clean = false;
                    self.report(&callback_id, &ScanError::camera(Stage::ViewfinderStop, e));
                }
            }
            if let Err(e) = self.camera.close(handle) {
                clean = false;
                self.report(&callback_id, &ScanError::camera(Stage::CloseCamera, e));
            } else {
                tracing::debug!(%handle, "Camera closed");
            }
        }

        {
            let mut state = self.lock();
            match reason {
                Some(StopReason::Cancelled) => {
                    self.deliver(&callback_id, &BarcodeOutcome::Cancelled);
                }
                Some(StopReason::Explicit) | Some(StopReason::Decoded) if clean => {
                    self.post(Notification::ended(&callback_id));
                }
                _ => {}
            }
            state.finish();
        }
        tracing::info!(callback_id = %callback_id, ?reason, "Scan session ended");
        self.flush();
    }
}
