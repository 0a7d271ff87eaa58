//! Integration tests for terminal outcome delivery
//!
//! A scan ends exactly once, whichever of decode, tap and `stop_read` gets
//! there first. These tests drive each trigger, and the races between them,
//! through mock hardware.

mod common;

use barcode_session::hardware::decoder::{BarcodeFormat, DecodeError, DecodedBarcode};
use barcode_session::hardware::mock::{
    DecodeGate, MockCamera, MockCompositor, MockEventQueue, RecordingSink, ScriptedDecoder,
};
use barcode_session::input::{InputEvent, TouchPhase};
use barcode_session::session::{Notification, NotificationSink, Phase, ScanEvent, ScanSession};
use common::{fast_settings, wait_until, Rig, ARGS, WAIT};
use std::sync::{mpsc, Arc, Mutex, OnceLock, Weak};
use std::thread;
use tracing_test::traced_test;

fn ean() -> DecodedBarcode {
    DecodedBarcode::new("4006381333931", BarcodeFormat::Ean13)
}

// =============================================================================
// Decode
// =============================================================================

#[test]
fn test_first_decoded_frame_is_reported_once() {
    let rig = Rig::with_decoder(ScriptedDecoder::new().decode_on_call(3, ean()));
    rig.session.start_read("cb-1", ARGS).unwrap();

    for _ in 0..10 {
        rig.camera.push_noise_frame();
    }
    assert!(rig.sink.wait_for_event(ScanEvent::Ended, WAIT));
    assert!(wait_until(WAIT, || rig.session.phase() == Phase::Idle));

    assert_eq!(
        rig.sink.events(),
        vec![ScanEvent::Started, ScanEvent::CodeFound, ScanEvent::Ended]
    );
    let notifications = rig.sink.notifications();
    let code = notifications[1].code().unwrap();
    assert_eq!(code.text, "4006381333931");
    assert_eq!(code.format, "EAN_13");
    assert!(!code.cancelled);

    // Frames after the decode never reach the decoder
    assert_eq!(rig.decoder.calls(), 3);
    assert_eq!(rig.camera.close_calls(), 1);
}

#[test]
fn test_later_decodes_are_discarded() {
    let rig = Rig::new();
    rig.decoder
        .push_result(Ok(Some(DecodedBarcode::new("first", BarcodeFormat::QrCode))));
    rig.decoder
        .push_result(Ok(Some(DecodedBarcode::new("second", BarcodeFormat::QrCode))));
    rig.session.start_read("cb-1", ARGS).unwrap();

    rig.camera.push_noise_frame();
    rig.camera.push_noise_frame();
    assert!(rig.sink.wait_for_event(ScanEvent::Ended, WAIT));

    let codes: Vec<_> = rig
        .sink
        .notifications()
        .into_iter()
        .filter_map(|n| n.code().cloned())
        .collect();
    assert_eq!(codes.len(), 1);
    assert_eq!(codes[0].text, "first");
}

#[test]
fn test_concurrent_frames_deliver_single_code() {
    let rig = Rig::new();
    for i in 0..200 {
        rig.decoder.push_result(Ok(Some(DecodedBarcode::new(
            format!("code-{}", i),
            BarcodeFormat::Code128,
        ))));
    }
    rig.session.start_read("cb-1", ARGS).unwrap();

    let pushers: Vec<_> = (0..4)
        .map(|_| {
            let camera = Arc::clone(&rig.camera);
            thread::spawn(move || {
                for _ in 0..50 {
                    camera.push_noise_frame();
                }
            })
        })
        .collect();
    for pusher in pushers {
        pusher.join().unwrap();
    }

    assert!(rig.sink.wait_for_event(ScanEvent::Ended, WAIT));
    assert!(wait_until(WAIT, || rig.session.phase() == Phase::Idle));
    assert_eq!(rig.sink.count(ScanEvent::CodeFound), 1);
    assert_eq!(rig.sink.count(ScanEvent::Ended), 1);
    assert_eq!(rig.camera.close_calls(), 1);
}

#[test]
fn test_format_outside_hints_is_still_reported() {
    let rig = Rig::new();
    rig.decoder
        .push_result(Ok(Some(DecodedBarcode::new("x", BarcodeFormat::Maxicode))));
    rig.session.start_read("cb-1", ARGS).unwrap();

    rig.camera.push_noise_frame();
    assert!(rig.sink.wait_for_event(ScanEvent::Ended, WAIT));

    let notifications = rig.sink.notifications();
    let code = notifications[1].code().unwrap();
    assert_eq!(code.text, "x");
    assert_eq!(code.format, "MAXICODE");
    assert_eq!(rig.sink.count(ScanEvent::CodeFound), 1);
}

#[test]
#[traced_test]
fn test_decode_noise_is_silent() {
    let rig = Rig::new();
    for i in 0..10_000 {
        if i % 2 == 0 {
            rig.decoder
                .push_result(Err(DecodeError("checksum mismatch".into())));
        } else {
            rig.decoder.push_result(Ok(None));
        }
    }
    rig.session.start_read("cb-1", ARGS).unwrap();

    for _ in 0..10_000 {
        rig.camera.push_noise_frame();
    }

    assert_eq!(rig.decoder.calls(), 10_000);
    assert_eq!(rig.sink.events(), vec![ScanEvent::Started]);
    assert_eq!(rig.session.phase(), Phase::Streaming);
    assert!(!logs_contain("ERROR"));
    assert!(!logs_contain("WARN"));

    rig.session.stop_read("cb-1").unwrap();
    assert_eq!(rig.sink.events(), vec![ScanEvent::Started, ScanEvent::Ended]);
}

// =============================================================================
// Cancellation
// =============================================================================

#[test]
fn test_touch_cancels_with_empty_code() {
    let rig = Rig::new();
    rig.session.start_read("cb-1", ARGS).unwrap();

    rig.events.push(InputEvent::Touch(TouchPhase::Down));
    assert!(rig.sink.wait_for_event(ScanEvent::CodeFound, WAIT));
    assert!(wait_until(WAIT, || rig.session.phase() == Phase::Idle));

    assert_eq!(
        rig.sink.events(),
        vec![ScanEvent::Started, ScanEvent::CodeFound]
    );
    let notifications = rig.sink.notifications();
    let code = notifications[1].code().unwrap();
    assert!(code.cancelled);
    assert!(code.text.is_empty());
    assert!(code.format.is_empty());

    assert!(!rig.session.cancel_requested());
    assert_eq!(rig.camera.close_calls(), 1);

    // Already torn down; stop only reaps the worker
    rig.session.stop_read("cb-1").unwrap();
    assert_eq!(rig.sink.notifications().len(), 2);
}

#[test]
fn test_touch_during_decode_discards_result() {
    let gate = Arc::new(DecodeGate::new());
    let rig = Rig::with_decoder(
        ScriptedDecoder::new()
            .with_gate(Arc::clone(&gate))
            .decode_on_call(1, ean()),
    );
    rig.session.start_read("cb-1", ARGS).unwrap();

    let camera = Arc::clone(&rig.camera);
    let pusher = thread::spawn(move || camera.push_noise_frame());
    assert!(gate.wait_entered(WAIT));

    rig.events.push(InputEvent::Touch(TouchPhase::Down));
    assert!(rig.sink.wait_for_event(ScanEvent::CodeFound, WAIT));
    assert!(wait_until(WAIT, || rig.session.phase() == Phase::Idle));

    gate.release();
    pusher.join().unwrap();

    let codes: Vec<_> = rig
        .sink
        .notifications()
        .into_iter()
        .filter_map(|n| n.code().cloned())
        .collect();
    assert_eq!(codes.len(), 1);
    assert!(codes[0].cancelled);
    assert_eq!(rig.decoder.calls(), 1);
    assert_eq!(rig.camera.close_calls(), 1);
}

#[test]
fn test_touch_after_decode_is_ignored() {
    let rig = Rig::with_decoder(ScriptedDecoder::new().decode_on_call(1, ean()));
    rig.session.start_read("cb-1", ARGS).unwrap();

    rig.camera.push_noise_frame();
    rig.events.push(InputEvent::Touch(TouchPhase::Release));
    assert!(rig.sink.wait_for_event(ScanEvent::Ended, WAIT));
    assert!(wait_until(WAIT, || rig.session.phase() == Phase::Idle));

    let codes: Vec<_> = rig
        .sink
        .notifications()
        .into_iter()
        .filter_map(|n| n.code().cloned())
        .collect();
    assert_eq!(codes.len(), 1);
    assert!(!codes[0].cancelled);
    assert_eq!(codes[0].text, "4006381333931");
}

// =============================================================================
// Explicit Stop Races
// =============================================================================

#[test]
fn test_stop_racing_decode_ends_once() {
    for round in 0..20 {
        let rig = Rig::with_decoder(ScriptedDecoder::new().decode_on_call(1, ean()));
        let id = format!("cb-{}", round);
        rig.session.start_read(&id, ARGS).unwrap();

        let camera = Arc::clone(&rig.camera);
        let pusher = thread::spawn(move || camera.push_noise_frame());
        rig.session.stop_read(&id).unwrap();
        pusher.join().unwrap();

        assert!(wait_until(WAIT, || rig.session.phase() == Phase::Idle));
        rig.session.stop_read(&id).unwrap();

        assert_eq!(rig.sink.count(ScanEvent::Ended), 1, "round {}", round);
        assert!(rig.sink.count(ScanEvent::CodeFound) <= 1, "round {}", round);
        assert_eq!(rig.camera.close_calls(), 1, "round {}", round);
        assert_eq!(rig.sink.count(ScanEvent::ErrorFound), 0, "round {}", round);
    }
}

#[test]
fn test_stop_after_decode_waits_for_teardown() {
    let rig = Rig::with_decoder(ScriptedDecoder::new().decode_on_call(1, ean()));
    rig.session.start_read("cb-1", ARGS).unwrap();

    rig.camera.push_noise_frame();
    rig.session.stop_read("cb-1").unwrap();

    assert_eq!(rig.session.phase(), Phase::Idle);
    assert_eq!(
        rig.sink.events(),
        vec![ScanEvent::Started, ScanEvent::CodeFound, ScanEvent::Ended]
    );
    assert!(!rig.camera.is_open());
}

// =============================================================================
// Sinks That Call Back Into The Session
// =============================================================================

/// Answers `codeFound` with `stop_read` like the host bridge, and notes the
/// phase it sees on `started`.
#[derive(Default)]
struct HostBridgeSink {
    session: OnceLock<Weak<ScanSession>>,
    phase_on_start: Mutex<Option<Phase>>,
    recorded: RecordingSink,
}

impl NotificationSink for HostBridgeSink {
    fn notify(&self, notification: Notification) {
        let session = self.session.get().and_then(Weak::upgrade);
        let event = notification.event;
        let callback_id = notification.callback_id.clone();
        self.recorded.notify(notification);

        let Some(session) = session else {
            return;
        };
        match event {
            ScanEvent::Started => {
                *self.phase_on_start.lock().unwrap() = Some(session.phase());
            }
            ScanEvent::CodeFound => session.stop_read(&callback_id).unwrap(),
            _ => {}
        }
    }
}

struct BridgeRig {
    session: Arc<ScanSession>,
    camera: Arc<MockCamera>,
    events: Arc<MockEventQueue>,
    sink: Arc<HostBridgeSink>,
}

impl BridgeRig {
    fn new(decoder: ScriptedDecoder) -> Self {
        let camera = Arc::new(MockCamera::new());
        let events = Arc::new(MockEventQueue::new());
        let sink = Arc::new(HostBridgeSink::default());
        let session = ScanSession::builder(
            camera.clone(),
            Arc::new(decoder),
            Arc::new(MockCompositor::new()),
            events.clone(),
            sink.clone(),
        )
        .with_settings(fast_settings())
        .build()
        .unwrap();
        let session = Arc::new(session);
        assert!(sink.session.set(Arc::downgrade(&session)).is_ok());
        Self {
            session,
            camera,
            events,
            sink,
        }
    }

    /// `start_read` on another thread; false if it did not return in time.
    fn start_within(&self, timeout: std::time::Duration) -> bool {
        let session = Arc::clone(&self.session);
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(session.start_read("cb-1", ARGS).is_ok());
        });
        rx.recv_timeout(timeout) == Ok(true)
    }
}

#[test]
fn test_sink_may_query_session_on_started() {
    let rig = BridgeRig::new(ScriptedDecoder::new());
    assert!(rig.start_within(WAIT));

    assert_eq!(*rig.sink.phase_on_start.lock().unwrap(), Some(Phase::Streaming));
    rig.session.stop_read("cb-1").unwrap();
    assert_eq!(rig.sink.recorded.events(), vec![ScanEvent::Started, ScanEvent::Ended]);
}

#[test]
fn test_sink_stopping_on_code_does_not_block_frames() {
    let rig = BridgeRig::new(ScriptedDecoder::new().decode_on_call(1, ean()));
    assert!(rig.start_within(WAIT));

    let camera = Arc::clone(&rig.camera);
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        camera.push_noise_frame();
        let _ = tx.send(());
    });
    assert!(rx.recv_timeout(WAIT).is_ok(), "frame callback never returned");

    assert!(rig.sink.recorded.wait_for_event(ScanEvent::Ended, WAIT));
    assert_eq!(rig.session.phase(), Phase::Idle);
    assert_eq!(
        rig.sink.recorded.events(),
        vec![ScanEvent::Started, ScanEvent::CodeFound, ScanEvent::Ended]
    );
    assert_eq!(rig.camera.close_calls(), 1);
}

#[test]
fn test_sink_stopping_on_cancel_does_not_block_worker() {
    let rig = BridgeRig::new(ScriptedDecoder::new());
    assert!(rig.start_within(WAIT));

    rig.events.push(InputEvent::Touch(TouchPhase::Down));
    assert!(rig.sink.recorded.wait_for_event(ScanEvent::CodeFound, WAIT));
    assert!(wait_until(WAIT, || rig.session.phase() == Phase::Idle));

    // Reaps the worker the sink could not join from its own thread
    rig.session.stop_read("cb-1").unwrap();
    assert_eq!(rig.sink.recorded.events(), vec![ScanEvent::Started, ScanEvent::CodeFound]);
    assert!(rig.sink.recorded.notifications()[1].code().unwrap().cancelled);
    assert_eq!(rig.camera.close_calls(), 1);

    // The session is reusable afterwards
    assert!(rig.start_within(WAIT));
    rig.session.stop_read("cb-1").unwrap();
}
