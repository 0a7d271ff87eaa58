//! Shared rig for session integration tests.

#![allow(dead_code)]

use barcode_session::config::ScannerSettings;
use barcode_session::hardware::mock::{
    MockCamera, MockCompositor, MockEventQueue, RecordingSink, ScriptedDecoder,
};
use barcode_session::session::ScanSession;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Arguments naming a valid target window.
pub const ARGS: &str = r#"{"handle":"42","group":"app-group"}"#;

/// Upper bound for anything the tests wait on.
pub const WAIT: Duration = Duration::from_secs(2);

/// A session wired to mock hardware.
pub struct Rig {
    pub session: ScanSession,
    pub camera: Arc<MockCamera>,
    pub decoder: Arc<ScriptedDecoder>,
    pub compositor: Arc<MockCompositor>,
    pub events: Arc<MockEventQueue>,
    pub sink: Arc<RecordingSink>,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_decoder(ScriptedDecoder::new())
    }

    pub fn with_decoder(decoder: ScriptedDecoder) -> Self {
        Self::build(MockCamera::new(), decoder, fast_settings())
    }

    pub fn build(camera: MockCamera, decoder: ScriptedDecoder, settings: ScannerSettings) -> Self {
        let camera = Arc::new(camera);
        let decoder = Arc::new(decoder);
        let compositor = Arc::new(MockCompositor::new());
        let events = Arc::new(MockEventQueue::new());
        let sink = Arc::new(RecordingSink::new());
        let session = ScanSession::builder(
            camera.clone(),
            decoder.clone(),
            compositor.clone(),
            events.clone(),
            sink.clone(),
        )
        .with_settings(settings)
        .build()
        .unwrap();
        Self {
            session,
            camera,
            decoder,
            compositor,
            events,
            sink,
        }
    }
}

/// Default settings with a 10 ms poll interval.
pub fn fast_settings() -> ScannerSettings {
    ScannerSettings {
        poll_interval_ms: 10,
        ..ScannerSettings::default()
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
