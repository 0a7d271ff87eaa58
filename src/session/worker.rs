//! Session worker thread.
//!
//! One worker per session. It owns the preview backdrop, subscribes to screen
//! events and pumps them until halted or until the user taps the preview.
//! When the session was ended by a decode or a tap, the worker also runs
//! teardown, so the frame callback never has to block on it.

use super::shared::SessionCore;
use super::state::{Phase, StopReason};
use crate::error::ScanError;
use crate::hardware::surface::{PreviewGeometry, WindowId, BACKDROP_COLOR};
use crate::input::{EventClass, Flow, HaltSignal, InputEvent, InputEventPump, PumpExit};
use std::sync::Arc;

/// Thread name, visible in logs.
pub(crate) const WORKER_THREAD_NAME: &str = "barcode-scan-worker";

/// Worker entry point.
pub(crate) fn run(core: Arc<SessionCore>, halt: Arc<HaltSignal>) {
    let (callback_id, group) = {
        let state = core.lock();
        (state.callback_id.clone(), state.surface_group.clone())
    };
    let span = tracing::debug_span!("scan_worker", callback_id = %callback_id);
    let _enter = span.enter();

    let backdrop = create_backdrop(&core, &group);

    let exit = match core.events.request_events() {
        Ok(()) => {
            let pump = InputEventPump::new(Arc::clone(&core.events), core.settings.poll_interval());
            let mut viewfinder = None;
            let exit = pump.run_until_halt(&halt, |event| {
                handle_event(&core, event, &mut viewfinder)
            });
            if let Err(e) = core.events.stop_events() {
                tracing::warn!(error = %e, "Failed to stop screen events");
            }
            exit
        }
        Err(e) => {
            core.report(&callback_id, &ScanError::from(e));
            while !halt.wait_timeout(core.settings.poll_interval()) {}
            PumpExit::Halted
        }
    };
    tracing::debug!(?exit, "Event pump finished");

    if let Some(window) = backdrop {
        core.compositor.destroy(window);
    }

    let reason = core.lock().stop_reason;
    if reason.is_some_and(StopReason::worker_tears_down) {
        core.teardown();
    }
}

fn create_backdrop(core: &SessionCore, group: &str) -> Option<WindowId> {
    let window = match core.compositor.create_backdrop(group, BACKDROP_COLOR) {
        Ok(window) => window,
        Err(e) => {
            tracing::warn!(error = %e, "Backdrop window unavailable");
            return None;
        }
    };
    match core.compositor.display_info(window) {
        Some(display) => {
            let geometry = PreviewGeometry::backdrop(&display);
            if let Err(e) = core.compositor.apply_geometry(window, &geometry) {
                tracing::warn!(error = %e, "Failed to size backdrop window");
            }
        }
        None => tracing::debug!("Backdrop has no display, leaving default size"),
    }
    Some(window)
}

fn handle_event(
    core: &SessionCore,
    event: &InputEvent,
    viewfinder: &mut Option<WindowId>,
) -> Flow {
    match event.classify() {
        EventClass::Cancellation => {
            let mut state = core.lock();
            if state.begin_stop(StopReason::Cancelled) {
                tracing::info!(callback_id = %state.callback_id, "Scan cancelled by touch");
                Flow::Stop
            } else {
                tracing::trace!(phase = %state.phase, "Touch ignored");
                Flow::Continue
            }
        }
        EventClass::SurfaceLifecycle => {
            match event {
                InputEvent::SurfaceCreated(window) => {
                    tracing::debug!(?window, "Viewfinder window created");
                    *viewfinder = Some(*window);
                }
                InputEvent::SurfacePosted(window) => {
                    if viewfinder.map_or(true, |vf| vf == *window) {
                        show_viewfinder(core, *window);
                    }
                }
                InputEvent::SurfaceClosed => {
                    tracing::debug!("Viewfinder window closed");
                    *viewfinder = None;
                }
                _ => {}
            }
            Flow::Continue
        }
        EventClass::Ignored => Flow::Continue,
    }
}

/// Raise the viewfinder above the backdrop once it posts its first frame.
fn show_viewfinder(core: &SessionCore, window: WindowId) {
    let rotation = {
        let state = core.lock();
        if state.phase != Phase::Streaming && state.phase != Phase::Opening {
            return;
        }
        state.viewfinder_rotation
    };
    let Some(display) = core.compositor.display_info(window) else {
        tracing::debug!(?window, "Viewfinder has no display");
        return;
    };
    let geometry = PreviewGeometry::viewfinder(&display, rotation);
    match core.compositor.apply_geometry(window, &geometry) {
        Ok(()) => tracing::debug!(?window, rotation = geometry.rotation, "Viewfinder visible"),
        Err(e) => tracing::warn!(error = %e, "Failed to show viewfinder"),
    }
}
