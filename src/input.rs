//! Input Event Pump
//!
//! Polls the device event queue on the session worker thread. Events fall into
//! two classes the session cares about:
//!
//! - **Cancellation**: any touch activity on the preview aborts the scan.
//! - **Surface lifecycle**: window create/post/close/property events, used to
//!   finish laying out the preview.
//!
//! The queue is drained without blocking, then the pump waits on a
//! [`HaltSignal`] for at most one polling interval. Raising the signal wakes
//! the pump immediately, so a halt is observed well within one interval and
//! an idle pump does not spin.

use crate::hardware::surface::WindowId;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

/// Default polling interval (10 Hz).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Touch phases reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPhase {
    /// Finger down
    Down,
    /// Finger moved
    Move,
    /// Finger lifted
    Release,
}

/// Device input event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// Touch activity
    Touch(TouchPhase),
    /// A window was created in our group
    SurfaceCreated(WindowId),
    /// A window posted its first frame
    SurfacePosted(WindowId),
    /// A window was closed
    SurfaceClosed,
    /// The compositor went idle
    SurfaceIdle,
    /// Non-touch input (keyboard, gamepad...)
    Input,
    /// A window or display property changed
    PropertyChanged {
        /// Kind of object whose property changed
        object_type: i32,
        /// Property identifier
        property: i32,
    },
    /// Event type this crate does not interpret
    Unknown(i32),
}

/// How the session treats an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    /// Abort the scan
    Cancellation,
    /// Preview window bookkeeping
    SurfaceLifecycle,
    /// Nothing to do
    Ignored,
}

impl InputEvent {
    /// Classify the event.
    pub fn classify(&self) -> EventClass {
        match self {
            InputEvent::Touch(_) => EventClass::Cancellation,
            InputEvent::SurfaceCreated(_)
            | InputEvent::SurfacePosted(_)
            | InputEvent::SurfaceClosed
            | InputEvent::PropertyChanged { .. } => EventClass::SurfaceLifecycle,
            InputEvent::SurfaceIdle | InputEvent::Input | InputEvent::Unknown(_) => {
                EventClass::Ignored
            }
        }
    }
}

/// Event queue failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event queue error: {0}")]
pub struct EventQueueError(pub String);

/// Capability: device event queue.
pub trait EventQueue: Send + Sync {
    /// Start delivering screen events to this queue.
    fn request_events(&self) -> Result<(), EventQueueError>;

    /// Next pending event, without blocking.
    fn poll_event(&self) -> Result<Option<InputEvent>, EventQueueError>;

    /// Stop delivering screen events.
    fn stop_events(&self) -> Result<(), EventQueueError>;
}

/// One-shot halt flag with a timed wait.
#[derive(Debug, Default)]
pub struct HaltSignal {
    halted: Mutex<bool>,
    wake: Condvar,
}

impl HaltSignal {
    /// New, lowered signal.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        match self.halted.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Halt signal mutex poisoned - recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Raise the signal and wake every waiter.
    pub fn raise(&self) {
        *self.lock() = true;
        self.wake.notify_all();
    }

    /// Whether the signal has been raised.
    pub fn is_raised(&self) -> bool {
        *self.lock()
    }

    /// Wait up to `timeout` for the signal. Returns `true` if it was raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        match self.wake.wait_timeout_while(guard, timeout, |halted| !*halted) {
            Ok((guard, _)) => *guard,
            Err(poisoned) => *poisoned.into_inner().0,
        }
    }
}

/// Handler decision after seeing an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep pumping
    Continue,
    /// Leave the loop now
    Stop,
}

/// Why [`InputEventPump::run_until_halt`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The halt signal was raised
    Halted,
    /// The handler asked to stop
    Stopped,
}

/// Polls an [`EventQueue`] at a fixed cadence.
pub struct InputEventPump {
    queue: Arc<dyn EventQueue>,
    poll_interval: Duration,
}

impl InputEventPump {
    /// Create a pump over `queue`.
    pub fn new(queue: Arc<dyn EventQueue>, poll_interval: Duration) -> Self {
        Self {
            queue,
            poll_interval,
        }
    }

    /// Polling interval
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Drain every pending event into `handler`.
    ///
    /// Returns `Flow::Stop` as soon as the handler does; remaining events stay
    /// queued.
    pub fn drain<F>(&self, handler: &mut F) -> Flow
    where
        F: FnMut(&InputEvent) -> Flow,
    {
        loop {
            match self.queue.poll_event() {
                Ok(Some(event)) => {
                    tracing::trace!(?event, "Input event");
                    if handler(&event) == Flow::Stop {
                        return Flow::Stop;
                    }
                }
                Ok(None) => return Flow::Continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Event poll failed");
                    return Flow::Continue;
                }
            }
        }
    }

    /// Pump until `halt` is raised or `handler` returns `Flow::Stop`.
    pub fn run_until_halt<F>(&self, halt: &HaltSignal, mut handler: F) -> PumpExit
    where
        F: FnMut(&InputEvent) -> Flow,
    {
        loop {
            if halt.is_raised() {
                return PumpExit::Halted;
            }
            if self.drain(&mut handler) == Flow::Stop {
                return PumpExit::Stopped;
            }
            if halt.wait_timeout(self.poll_interval) {
                return PumpExit::Halted;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::MockEventQueue;
    use std::time::Instant;

    #[test]
    fn test_classification() {
        assert_eq!(
            InputEvent::Touch(TouchPhase::Down).classify(),
            EventClass::Cancellation
        );
        assert_eq!(
            InputEvent::Touch(TouchPhase::Release).classify(),
            EventClass::Cancellation
        );
        assert_eq!(
            InputEvent::SurfacePosted(WindowId(3)).classify(),
            EventClass::SurfaceLifecycle
        );
        assert_eq!(
            InputEvent::PropertyChanged {
                object_type: 1,
                property: 2
            }
            .classify(),
            EventClass::SurfaceLifecycle
        );
        assert_eq!(InputEvent::SurfaceIdle.classify(), EventClass::Ignored);
        assert_eq!(InputEvent::Unknown(99).classify(), EventClass::Ignored);
    }

    #[test]
    fn test_drain_handles_empty_queue() {
        let queue = Arc::new(MockEventQueue::new());
        let pump = InputEventPump::new(queue, DEFAULT_POLL_INTERVAL);
        let mut seen = 0;
        let flow = pump.drain(&mut |_| {
            seen += 1;
            Flow::Continue
        });
        assert_eq!(flow, Flow::Continue);
        assert_eq!(seen, 0);
    }

    #[test]
    fn test_drain_stops_on_handler_request() {
        let queue = Arc::new(MockEventQueue::new());
        queue.push(InputEvent::SurfaceIdle);
        queue.push(InputEvent::Touch(TouchPhase::Down));
        queue.push(InputEvent::SurfaceClosed);
        let pump = InputEventPump::new(queue.clone(), DEFAULT_POLL_INTERVAL);

        let flow = pump.drain(&mut |event| match event.classify() {
            EventClass::Cancellation => Flow::Stop,
            _ => Flow::Continue,
        });
        assert_eq!(flow, Flow::Stop);
        assert_eq!(queue.pending(), 1);
    }

    #[test]
    fn test_halt_wakes_pump_before_interval() {
        let queue = Arc::new(MockEventQueue::new());
        let pump = InputEventPump::new(queue, Duration::from_secs(5));
        let halt = Arc::new(HaltSignal::new());

        let raiser = {
            let halt = Arc::clone(&halt);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                halt.raise();
            })
        };

        let start = Instant::now();
        let exit = pump.run_until_halt(&halt, |_| Flow::Continue);
        raiser.join().unwrap();

        assert_eq!(exit, PumpExit::Halted);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_pump_stops_on_touch_without_waiting() {
        let queue = Arc::new(MockEventQueue::new());
        queue.push(InputEvent::Touch(TouchPhase::Move));
        let pump = InputEventPump::new(queue, Duration::from_secs(5));
        let halt = HaltSignal::new();

        let start = Instant::now();
        let exit = pump.run_until_halt(&halt, |event| {
            if event.classify() == EventClass::Cancellation {
                Flow::Stop
            } else {
                Flow::Continue
            }
        });
        assert_eq!(exit, PumpExit::Stopped);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_queue_errors_do_not_stop_pump() {
        let queue = Arc::new(MockEventQueue::new());
        queue.fail_next_poll("queue unavailable");
        queue.push(InputEvent::Touch(TouchPhase::Down));
        let pump = InputEventPump::new(queue, Duration::from_millis(10));
        let halt = HaltSignal::new();

        let exit = pump.run_until_halt(&halt, |_| Flow::Stop);
        assert_eq!(exit, PumpExit::Stopped);
    }
}
