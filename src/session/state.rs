//! Session phase and the state kept under the session guard.

use crate::hardware::camera::CameraHandle;
use crate::input::HaltSignal;
use std::fmt;
use std::sync::Arc;

/// Lifecycle phase of a [`ScanSession`](super::ScanSession).
///
/// ```text
/// Idle -> Opening -> Streaming -> Stopping -> Idle
///            |           |
///            +-> Errored +-> Errored -> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    /// No camera, no worker
    #[default]
    Idle,
    /// Acquiring the camera
    Opening,
    /// Frames flowing into the decoder
    Streaming,
    /// Teardown in progress
    Stopping,
    /// A step failed, teardown in progress
    Errored,
}

impl Phase {
    /// Phase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "Idle",
            Phase::Opening => "Opening",
            Phase::Streaming => "Streaming",
            Phase::Stopping => "Stopping",
            Phase::Errored => "Errored",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What moved the session out of `Streaming` (or `Opening`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopReason {
    /// `stop_read` from the caller
    Explicit,
    /// A barcode was delivered
    Decoded,
    /// The user tapped the preview
    Cancelled,
    /// Acquisition failed
    Failed,
}

impl StopReason {
    /// Teardown for this reason runs on the worker thread.
    pub(crate) fn worker_tears_down(self) -> bool {
        matches!(self, StopReason::Decoded | StopReason::Cancelled)
    }
}

/// Everything guarded by the session mutex.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub phase: Phase,
    pub callback_id: String,
    pub surface_group: String,
    pub camera: Option<CameraHandle>,
    pub streaming_started: bool,
    pub cancel_requested: bool,
    pub delivered: bool,
    pub stop_reason: Option<StopReason>,
    pub viewfinder_rotation: u32,
    pub halt: Arc<HaltSignal>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            callback_id: String::new(),
            surface_group: String::new(),
            camera: None,
            streaming_started: false,
            cancel_requested: false,
            delivered: false,
            stop_reason: None,
            viewfinder_rotation: 0,
            halt: Arc::new(HaltSignal::new()),
        }
    }
}

impl SessionState {
    /// Claim the session for a new run. Only valid from `Idle`.
    pub fn claim(&mut self, callback_id: &str) -> bool {
        if self.phase != Phase::Idle {
            return false;
        }
        *self = Self {
            phase: Phase::Opening,
            callback_id: callback_id.to_string(),
            ..Self::default()
        };
        true
    }

    /// `Streaming -> Stopping` for `reason`. Returns false if some other
    /// trigger already left `Streaming`.
    pub fn begin_stop(&mut self, reason: StopReason) -> bool {
        if self.phase != Phase::Streaming {
            return false;
        }
        self.phase = Phase::Stopping;
        self.stop_reason = Some(reason);
        if reason == StopReason::Cancelled {
            self.cancel_requested = true;
        }
        self.halt.raise();
        true
    }

    /// Enter `Errored` from `Opening` or `Streaming`.
    pub fn fail(&mut self) {
        self.phase = Phase::Errored;
        self.stop_reason = Some(StopReason::Failed);
        self.halt.raise();
    }

    /// Back to `Idle` after teardown.
    pub fn finish(&mut self) {
        self.phase = Phase::Idle;
        self.cancel_requested = false;
        self.streaming_started = false;
        self.stop_reason = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_only_from_idle() {
        let mut state = SessionState::default();
        assert!(state.claim("cb-1"));
        assert_eq!(state.phase, Phase::Opening);
        assert_eq!(state.callback_id, "cb-1");
        assert!(!state.claim("cb-2"));
        assert_eq!(state.callback_id, "cb-1");
    }

    #[test]
    fn claim_installs_fresh_halt_signal() {
        let mut state = SessionState::default();
        state.halt.raise();
        assert!(state.claim("cb-1"));
        assert!(!state.halt.is_raised());
    }

    #[test]
    fn only_first_stop_trigger_wins() {
        let mut state = SessionState::default();
        state.claim("cb-1");
        assert!(!state.begin_stop(StopReason::Explicit));

        state.phase = Phase::Streaming;
        assert!(state.begin_stop(StopReason::Decoded));
        assert!(!state.begin_stop(StopReason::Cancelled));
        assert_eq!(state.stop_reason, Some(StopReason::Decoded));
        assert!(!state.cancel_requested);
        assert!(state.halt.is_raised());
    }

    #[test]
    fn cancellation_sets_flag_until_finish() {
        let mut state = SessionState::default();
        state.claim("cb-1");
        state.phase = Phase::Streaming;
        assert!(state.begin_stop(StopReason::Cancelled));
        assert!(state.cancel_requested);

        state.finish();
        assert_eq!(state.phase, Phase::Idle);
        assert!(!state.cancel_requested);
    }

    #[test]
    fn worker_owns_decode_and_cancel_teardown() {
        assert!(StopReason::Decoded.worker_tears_down());
        assert!(StopReason::Cancelled.worker_tears_down());
        assert!(!StopReason::Explicit.worker_tears_down());
        assert!(!StopReason::Failed.worker_tears_down());
    }
}
