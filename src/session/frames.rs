//! Frame delivery bridge.
//!
//! The camera calls back on its own thread with a borrowed frame. The
//! callback owns an `Arc` of the session core; there is no global.

use super::outcome::BarcodeOutcome;
use super::shared::SessionCore;
use super::state::{Phase, StopReason};
use crate::hardware::camera::{FrameCallback, FrameSample};
use crate::hardware::decoder::{frame_verdict, FrameVerdict};
use std::sync::Arc;

/// Build the callback handed to `CameraSource::start_streaming`.
pub(crate) fn frame_callback(core: Arc<SessionCore>) -> FrameCallback {
    Box::new(move |frame| core.on_frame(frame))
}

impl SessionCore {
    /// Decode one frame.
    ///
    /// Decoding runs outside the guard. A result is only delivered if the
    /// session is still `Streaming` and nothing has been delivered yet once
    /// the guard is re-acquired; otherwise it is dropped. The sink is called
    /// after the guard is released.
    pub(crate) fn on_frame(&self, frame: &FrameSample<'_>) {
        {
            let state = self.lock();
            if state.phase != Phase::Streaming || state.delivered {
                return;
            }
        }

        let barcode = match frame_verdict(self.decoder.decode(frame, &self.hints)) {
            FrameVerdict::Found(barcode) => barcode,
            FrameVerdict::Nothing => return,
        };

        {
            let mut state = self.lock();
            if state.delivered || !state.begin_stop(StopReason::Decoded) {
                tracing::trace!(
                    phase = %state.phase,
                    "Discarding decode after session left Streaming"
                );
                return;
            }
            state.delivered = true;
            tracing::info!(
                callback_id = %state.callback_id,
                format = %barcode.format,
                "Barcode decoded"
            );
            self.deliver(&state.callback_id, &BarcodeOutcome::from(barcode));
        }
        self.flush();
    }
}
