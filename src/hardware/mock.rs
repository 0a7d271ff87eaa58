//! Mock Hardware Implementations
//!
//! Simulated capabilities for tests and the `simulate` command, no device
//! required. Every mock counts the calls it receives and can be told to fail
//! a specific call, so tests can assert exactly what the session did.
//!
//! # Available Mocks
//!
//! - `MockCamera` - camera with per-call failure injection and manual frame push
//! - `ScriptedDecoder` - decoder returning scripted results, optionally gated
//! - `MockEventQueue` - screen event queue fed by the test
//! - `MockCompositor` - window manager recording every geometry write
//! - `RecordingSink` - notification sink with blocking waits

use crate::hardware::camera::{
    CameraError, CameraErrorCode, CameraHandle, CameraSource, CameraUnit, FocusMode,
    FrameSample, ViewfinderSettings,
};
use crate::hardware::decoder::{DecodeError, DecodeHints, DecodedBarcode, FrameDecoder};
use crate::hardware::surface::{
    Compositor, DisplayInfo, PreviewGeometry, SurfaceError, SurfaceHandle, WindowId,
};
use crate::input::{EventQueue, EventQueueError, InputEvent};
use crate::session::{Notification, NotificationSink, ScanEvent};
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// =============================================================================
// MockCamera - Simulated Camera
// =============================================================================

/// Camera operations, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraCall {
    /// `open`
    Open,
    /// `viewfinder_rotation`
    ViewfinderRotation,
    /// `configure`
    Configure,
    /// `start_streaming`
    StartStreaming,
    /// `set_focus_mode`
    SetFocusMode,
    /// `stop_streaming`
    StopStreaming,
    /// `close`
    Close,
}

type SharedCallback = Arc<dyn Fn(&FrameSample<'_>) + Send + Sync>;

#[derive(Default)]
struct CameraState {
    open: Option<CameraHandle>,
    callback: Option<SharedCallback>,
    calls: HashMap<CameraCall, u64>,
    failures: HashMap<CameraCall, CameraErrorCode>,
    last_unit: Option<CameraUnit>,
    last_focus: Option<FocusMode>,
    last_settings: Option<ViewfinderSettings>,
}

/// Mock camera.
///
/// Frames are pushed by the test with [`push_frame`](Self::push_frame) from
/// any thread; the registered callback runs on the pushing thread, outside
/// the camera's lock, the way a driver's delivery thread would.
///
/// `close` of a handle that is not open fails with `BadHandle`, so a double
/// close shows up as an error.
pub struct MockCamera {
    state: Mutex<CameraState>,
    next_handle: AtomicU64,
    rotation: u32,
    frames_delivered: AtomicU64,
}

impl MockCamera {
    /// Camera with a 0 degree viewfinder.
    pub fn new() -> Self {
        Self::with_rotation(0)
    }

    /// Camera reporting `rotation` as its native viewfinder rotation.
    pub fn with_rotation(rotation: u32) -> Self {
        Self {
            state: Mutex::new(CameraState::default()),
            next_handle: AtomicU64::new(1),
            rotation,
            frames_delivered: AtomicU64::new(0),
        }
    }

    /// Make every subsequent `call` fail with `code`.
    pub fn fail_on(&self, call: CameraCall, code: CameraErrorCode) {
        lock(&self.state).failures.insert(call, code);
    }

    /// Stop failing `call`.
    pub fn clear_failure(&self, call: CameraCall) {
        lock(&self.state).failures.remove(&call);
    }

    /// Number of times `call` was made, failed calls included.
    pub fn calls(&self, call: CameraCall) -> u64 {
        lock(&self.state).calls.get(&call).copied().unwrap_or(0)
    }

    /// `open` calls
    pub fn open_calls(&self) -> u64 {
        self.calls(CameraCall::Open)
    }

    /// `close` calls
    pub fn close_calls(&self) -> u64 {
        self.calls(CameraCall::Close)
    }

    /// Whether a handle is currently open.
    pub fn is_open(&self) -> bool {
        lock(&self.state).open.is_some()
    }

    /// Whether a frame callback is registered.
    pub fn is_streaming(&self) -> bool {
        lock(&self.state).callback.is_some()
    }

    /// Unit passed to the last `open`.
    pub fn last_unit(&self) -> Option<CameraUnit> {
        lock(&self.state).last_unit
    }

    /// Mode passed to the last `set_focus_mode`.
    pub fn last_focus_mode(&self) -> Option<FocusMode> {
        lock(&self.state).last_focus
    }

    /// Settings passed to the last `configure`.
    pub fn last_settings(&self) -> Option<ViewfinderSettings> {
        lock(&self.state).last_settings.clone()
    }

    /// Frames handed to the callback so far.
    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered.load(Ordering::SeqCst)
    }

    /// Deliver `frame` to the registered callback. Returns false if the
    /// camera is not streaming.
    pub fn push_frame(&self, frame: &FrameSample<'_>) -> bool {
        let callback = lock(&self.state).callback.clone();
        match callback {
            Some(callback) => {
                callback(frame);
                self.frames_delivered.fetch_add(1, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Deliver a 64x48 frame of random luminance.
    pub fn push_noise_frame(&self) -> bool {
        const WIDTH: u32 = 64;
        const HEIGHT: u32 = 48;
        let mut luma = vec![0u8; (WIDTH * HEIGHT) as usize];
        rand::thread_rng().fill(luma.as_mut_slice());
        match FrameSample::new(&luma, WIDTH as usize, WIDTH, HEIGHT) {
            Some(frame) => self.push_frame(&frame),
            None => false,
        }
    }

    fn enter(&self, state: &mut CameraState, call: CameraCall) -> Result<(), CameraError> {
        *state.calls.entry(call).or_insert(0) += 1;
        match state.failures.get(&call) {
            Some(code) => Err(CameraError::new(*code)),
            None => Ok(()),
        }
    }

    fn check_handle(state: &CameraState, handle: CameraHandle) -> Result<(), CameraError> {
        if state.open == Some(handle) {
            Ok(())
        } else {
            Err(CameraError::new(CameraErrorCode::BadHandle))
        }
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraSource for MockCamera {
    fn open(&self, unit: CameraUnit) -> Result<CameraHandle, CameraError> {
        let mut state = lock(&self.state);
        self.enter(&mut state, CameraCall::Open)?;
        if state.open.is_some() {
            return Err(CameraError::new(CameraErrorCode::Already));
        }
        let handle = CameraHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        state.open = Some(handle);
        state.last_unit = Some(unit);
        Ok(handle)
    }

    fn viewfinder_rotation(&self, handle: CameraHandle) -> Result<u32, CameraError> {
        let mut state = lock(&self.state);
        self.enter(&mut state, CameraCall::ViewfinderRotation)?;
        Self::check_handle(&state, handle)?;
        Ok(self.rotation)
    }

    fn configure(
        &self,
        handle: CameraHandle,
        settings: &ViewfinderSettings,
    ) -> Result<(), CameraError> {
        let mut state = lock(&self.state);
        self.enter(&mut state, CameraCall::Configure)?;
        Self::check_handle(&state, handle)?;
        state.last_settings = Some(settings.clone());
        Ok(())
    }

    fn start_streaming(
        &self,
        handle: CameraHandle,
        on_frame: crate::hardware::camera::FrameCallback,
    ) -> Result<(), CameraError> {
        let mut state = lock(&self.state);
        self.enter(&mut state, CameraCall::StartStreaming)?;
        Self::check_handle(&state, handle)?;
        if state.callback.is_some() {
            return Err(CameraError::new(CameraErrorCode::Already));
        }
        state.callback = Some(Arc::from(on_frame));
        Ok(())
    }

    fn set_focus_mode(&self, handle: CameraHandle, mode: FocusMode) -> Result<(), CameraError> {
        let mut state = lock(&self.state);
        self.enter(&mut state, CameraCall::SetFocusMode)?;
        Self::check_handle(&state, handle)?;
        state.last_focus = Some(mode);
        Ok(())
    }

    fn stop_streaming(&self, handle: CameraHandle) -> Result<(), CameraError> {
        let mut state = lock(&self.state);
        // The callback is released even when the stop is reported as failed.
        let callback = state.callback.take();
        self.enter(&mut state, CameraCall::StopStreaming)?;
        Self::check_handle(&state, handle)?;
        drop(state);
        drop(callback);
        Ok(())
    }

    fn close(&self, handle: CameraHandle) -> Result<(), CameraError> {
        let mut state = lock(&self.state);
        self.enter(&mut state, CameraCall::Close)?;
        Self::check_handle(&state, handle)?;
        state.open = None;
        state.callback = None;
        Ok(())
    }
}

// =============================================================================
// ScriptedDecoder - Simulated Decoder
// =============================================================================

/// Rendezvous that holds a decode in flight until the test releases it.
#[derive(Debug, Default)]
pub struct DecodeGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

#[derive(Debug, Default)]
struct GateState {
    entered: bool,
    released: bool,
}

impl DecodeGate {
    /// New closed gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until a decode is blocked in the gate.
    pub fn wait_entered(&self, timeout: Duration) -> bool {
        let guard = lock(&self.state);
        match self
            .changed
            .wait_timeout_while(guard, timeout, |state| !state.entered)
        {
            Ok((state, _)) => state.entered,
            Err(poisoned) => poisoned.into_inner().0.entered,
        }
    }

    /// Let blocked and future decodes through.
    pub fn release(&self) {
        lock(&self.state).released = true;
        self.changed.notify_all();
    }

    fn pass(&self) {
        let mut guard = lock(&self.state);
        guard.entered = true;
        self.changed.notify_all();
        while !guard.released {
            guard = match self.changed.wait(guard) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }
}

type DecodeResult = Result<Option<DecodedBarcode>, DecodeError>;

/// Decoder returning scripted results.
///
/// Queued results are returned first, in order. After that the decoder
/// returns its fallback (no barcode, unless [`decode_on_call`](Self::decode_on_call)
/// says otherwise).
pub struct ScriptedDecoder {
    script: Mutex<VecDeque<DecodeResult>>,
    decode_on: Mutex<Option<(u64, DecodedBarcode)>>,
    gate: Option<Arc<DecodeGate>>,
    calls: AtomicU64,
}

impl ScriptedDecoder {
    /// Decoder that never finds anything.
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            decode_on: Mutex::new(None),
            gate: None,
            calls: AtomicU64::new(0),
        }
    }

    /// Every decode waits at `gate` before returning.
    pub fn with_gate(mut self, gate: Arc<DecodeGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Return `barcode` from the `n`th decode call (1-based).
    pub fn decode_on_call(self, n: u64, barcode: DecodedBarcode) -> Self {
        *lock(&self.decode_on) = Some((n, barcode));
        self
    }

    /// Queue a result.
    pub fn push_result(&self, result: DecodeResult) {
        lock(&self.script).push_back(result);
    }

    /// Decode calls so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder for ScriptedDecoder {
    fn decode(&self, _frame: &FrameSample<'_>, _hints: &DecodeHints) -> DecodeResult {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(gate) = &self.gate {
            gate.pass();
        }
        if let Some(result) = lock(&self.script).pop_front() {
            return result;
        }
        match &*lock(&self.decode_on) {
            Some((n, barcode)) if *n == call => Ok(Some(barcode.clone())),
            _ => Ok(None),
        }
    }
}

// =============================================================================
// MockEventQueue - Simulated Screen Events
// =============================================================================

#[derive(Default)]
struct QueueState {
    events: VecDeque<InputEvent>,
    poll_failure: Option<String>,
    request_failure: Option<String>,
    requested: bool,
    request_calls: u64,
    stop_calls: u64,
}

/// Event queue fed by the test.
#[derive(Default)]
pub struct MockEventQueue {
    state: Mutex<QueueState>,
}

impl MockEventQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event.
    pub fn push(&self, event: InputEvent) {
        lock(&self.state).events.push_back(event);
    }

    /// Events not yet polled.
    pub fn pending(&self) -> usize {
        lock(&self.state).events.len()
    }

    /// Make the next `poll_event` fail.
    pub fn fail_next_poll(&self, message: &str) {
        lock(&self.state).poll_failure = Some(message.to_string());
    }

    /// Make every `request_events` fail.
    pub fn fail_request(&self, message: &str) {
        lock(&self.state).request_failure = Some(message.to_string());
    }

    /// Whether events are currently requested.
    pub fn is_requested(&self) -> bool {
        lock(&self.state).requested
    }

    /// `request_events` calls
    pub fn request_calls(&self) -> u64 {
        lock(&self.state).request_calls
    }

    /// `stop_events` calls
    pub fn stop_calls(&self) -> u64 {
        lock(&self.state).stop_calls
    }
}

impl EventQueue for MockEventQueue {
    fn request_events(&self) -> Result<(), EventQueueError> {
        let mut state = lock(&self.state);
        state.request_calls += 1;
        if let Some(message) = &state.request_failure {
            return Err(EventQueueError(message.clone()));
        }
        state.requested = true;
        Ok(())
    }

    fn poll_event(&self) -> Result<Option<InputEvent>, EventQueueError> {
        let mut state = lock(&self.state);
        if let Some(message) = state.poll_failure.take() {
            return Err(EventQueueError(message));
        }
        Ok(state.events.pop_front())
    }

    fn stop_events(&self) -> Result<(), EventQueueError> {
        let mut state = lock(&self.state);
        state.stop_calls += 1;
        state.requested = false;
        Ok(())
    }
}

// =============================================================================
// MockCompositor - Simulated Window Manager
// =============================================================================

struct CompositorState {
    display: DisplayInfo,
    attach_failure: Option<String>,
    backdrop_failure: Option<String>,
    attached: Vec<SurfaceHandle>,
    backdrops: Vec<(WindowId, String, u32)>,
    destroyed: Vec<WindowId>,
    applied: Vec<(WindowId, PreviewGeometry)>,
}

/// Window manager recording what the session asked of it.
pub struct MockCompositor {
    state: Mutex<CompositorState>,
    next_window: AtomicU64,
}

impl MockCompositor {
    /// Portrait 768x1280 display.
    pub fn new() -> Self {
        Self::with_display(DisplayInfo {
            width: 768,
            height: 1280,
            rotation: 0,
        })
    }

    /// Compositor reporting `display` for every window.
    pub fn with_display(display: DisplayInfo) -> Self {
        Self {
            state: Mutex::new(CompositorState {
                display,
                attach_failure: None,
                backdrop_failure: None,
                attached: Vec::new(),
                backdrops: Vec::new(),
                destroyed: Vec::new(),
                applied: Vec::new(),
            }),
            next_window: AtomicU64::new(100),
        }
    }

    /// Make `attach` fail.
    pub fn fail_attach(&self, message: &str) {
        lock(&self.state).attach_failure = Some(message.to_string());
    }

    /// Make `create_backdrop` fail.
    pub fn fail_backdrop(&self, message: &str) {
        lock(&self.state).backdrop_failure = Some(message.to_string());
    }

    /// Surfaces attached so far.
    pub fn attached(&self) -> Vec<SurfaceHandle> {
        lock(&self.state).attached.clone()
    }

    /// Backdrops created: window, group and colour.
    pub fn backdrops(&self) -> Vec<(WindowId, String, u32)> {
        lock(&self.state).backdrops.clone()
    }

    /// Windows destroyed so far.
    pub fn destroyed(&self) -> Vec<WindowId> {
        lock(&self.state).destroyed.clone()
    }

    /// Every geometry write, in order.
    pub fn applied(&self) -> Vec<(WindowId, PreviewGeometry)> {
        lock(&self.state).applied.clone()
    }
}

impl Default for MockCompositor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compositor for MockCompositor {
    fn attach(&self, target: SurfaceHandle) -> Result<(), SurfaceError> {
        let mut state = lock(&self.state);
        if let Some(message) = &state.attach_failure {
            return Err(SurfaceError(message.clone()));
        }
        state.attached.push(target);
        Ok(())
    }

    fn create_backdrop(&self, group: &str, color: u32) -> Result<WindowId, SurfaceError> {
        let mut state = lock(&self.state);
        if let Some(message) = &state.backdrop_failure {
            return Err(SurfaceError(message.clone()));
        }
        let window = WindowId(self.next_window.fetch_add(1, Ordering::SeqCst));
        state.backdrops.push((window, group.to_string(), color));
        Ok(window)
    }

    fn display_info(&self, _window: WindowId) -> Option<DisplayInfo> {
        Some(lock(&self.state).display)
    }

    fn apply_geometry(
        &self,
        window: WindowId,
        geometry: &PreviewGeometry,
    ) -> Result<(), SurfaceError> {
        lock(&self.state).applied.push((window, *geometry));
        Ok(())
    }

    fn destroy(&self, window: WindowId) {
        lock(&self.state).destroyed.push(window);
    }
}

// =============================================================================
// RecordingSink - Notification Capture
// =============================================================================

/// Sink that records every notification and lets tests wait for them.
#[derive(Default)]
pub struct RecordingSink {
    received: Mutex<Vec<Notification>>,
    arrived: Condvar,
}

impl RecordingSink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received so far.
    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.received).clone()
    }

    /// Event kinds received so far, in order.
    pub fn events(&self) -> Vec<ScanEvent> {
        lock(&self.received).iter().map(|n| n.event).collect()
    }

    /// Number of notifications of kind `event`.
    pub fn count(&self, event: ScanEvent) -> usize {
        lock(&self.received)
            .iter()
            .filter(|n| n.event == event)
            .count()
    }

    /// Forget everything received.
    pub fn clear(&self) {
        lock(&self.received).clear();
    }

    /// Block until `predicate` holds for the received list, or `timeout`.
    pub fn wait_for<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&[Notification]) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut guard = lock(&self.received);
        loop {
            if predicate(&guard) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = match self.arrived.wait_timeout(guard, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Block until a notification of kind `event` has arrived.
    pub fn wait_for_event(&self, event: ScanEvent, timeout: Duration) -> bool {
        self.wait_for(timeout, |received| received.iter().any(|n| n.event == event))
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: Notification) {
        lock(&self.received).push(notification);
        self.arrived.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::decoder::BarcodeFormat;

    #[test]
    fn test_camera_rejects_double_close() {
        let camera = MockCamera::new();
        let handle = camera.open(CameraUnit::Rear).unwrap();
        assert!(camera.close(handle).is_ok());
        assert_eq!(
            camera.close(handle).unwrap_err().code,
            CameraErrorCode::BadHandle
        );
        assert_eq!(camera.close_calls(), 2);
    }

    #[test]
    fn test_camera_failure_injection() {
        let camera = MockCamera::new();
        camera.fail_on(CameraCall::Open, CameraErrorCode::NoDevice);
        assert_eq!(
            camera.open(CameraUnit::Rear).unwrap_err().code,
            CameraErrorCode::NoDevice
        );
        assert!(!camera.is_open());

        camera.clear_failure(CameraCall::Open);
        assert!(camera.open(CameraUnit::Front).is_ok());
        assert_eq!(camera.last_unit(), Some(CameraUnit::Front));
        assert_eq!(camera.open_calls(), 2);
    }

    #[test]
    fn test_camera_delivers_frames_while_streaming() {
        let camera = MockCamera::new();
        let seen = Arc::new(AtomicU64::new(0));
        assert!(!camera.push_noise_frame());

        let handle = camera.open(CameraUnit::Rear).unwrap();
        let counter = Arc::clone(&seen);
        camera
            .start_streaming(
                handle,
                Box::new(move |frame| {
                    assert_eq!(frame.width(), 64);
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        assert!(camera.push_noise_frame());
        assert!(camera.push_noise_frame());
        camera.stop_streaming(handle).unwrap();
        assert!(!camera.push_noise_frame());

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(camera.frames_delivered(), 2);
    }

    #[test]
    fn test_scripted_decoder_decodes_on_call() {
        let decoder = ScriptedDecoder::new()
            .decode_on_call(3, DecodedBarcode::new("abc", BarcodeFormat::Code128));
        decoder.push_result(Err(DecodeError("blurred".into())));
        let luma = [0u8; 4];
        let frame = FrameSample::new(&luma, 2, 2, 2).unwrap();
        let hints = DecodeHints::default();

        assert!(decoder.decode(&frame, &hints).is_err());
        assert_eq!(decoder.decode(&frame, &hints), Ok(None));
        assert_eq!(
            decoder.decode(&frame, &hints),
            Ok(Some(DecodedBarcode::new("abc", BarcodeFormat::Code128)))
        );
        assert_eq!(decoder.decode(&frame, &hints), Ok(None));
        assert_eq!(decoder.calls(), 4);
    }

    #[test]
    fn test_recording_sink_wait_times_out() {
        let sink = RecordingSink::new();
        assert!(!sink.wait_for_event(ScanEvent::Ended, Duration::from_millis(20)));
        sink.notify(Notification::ended("cb"));
        assert!(sink.wait_for_event(ScanEvent::Ended, Duration::from_millis(20)));
        assert_eq!(sink.count(ScanEvent::Ended), 1);
    }
}
