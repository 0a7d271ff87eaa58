//! Notifications sent to the caller.
//!
//! Every session step reports through a [`NotificationSink`] owned by the
//! caller. Each notification carries the caller's correlation token so the
//! host can route it back to the request that started the session.
//!
//! The sink is always called with no session lock held, one notification at
//! a time, in the order the session raised them. It may call back into the
//! session; the original host bridge answers `codeFound` with `stop_read`.

use super::outcome::BarcodeOutcome;
use crate::error::ErrorValue;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Sender;
use std::sync::{Mutex, MutexGuard};

/// Notification kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanEvent {
    /// Camera streaming, scan in progress
    Started,
    /// A step failed
    ErrorFound,
    /// Barcode decoded, or scan cancelled by the user
    CodeFound,
    /// Session torn down
    Ended,
}

impl ScanEvent {
    /// Short event name
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanEvent::Started => "started",
            ScanEvent::ErrorFound => "errorFound",
            ScanEvent::CodeFound => "codeFound",
            ScanEvent::Ended => "ended",
        }
    }

    /// Event name used on the host bridge.
    pub fn wire_name(&self) -> &'static str {
        match self {
            ScanEvent::Started => "community.barcodescanner.started.native",
            ScanEvent::ErrorFound => "community.barcodescanner.errorfound.native",
            ScanEvent::CodeFound => "community.barcodescanner.codefound.native",
            ScanEvent::Ended => "community.barcodescanner.ended.native",
        }
    }
}

impl fmt::Display for ScanEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `codeFound` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeFoundBody {
    /// Decoded text, empty when cancelled
    pub text: String,
    /// Format name, empty when cancelled
    pub format: String,
    /// True when the user cancelled
    pub cancelled: bool,
}

/// `errorFound` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorFoundBody {
    /// Step that failed
    pub state: String,
    /// Native code or symbolic name
    pub error: ErrorValue,
    /// Human-readable description
    pub description: String,
}

/// `started` / `ended` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusBody {
    /// Whether the step succeeded
    pub successful: bool,
}

/// Notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum NotificationBody {
    /// `codeFound`
    Code(CodeFoundBody),
    /// `errorFound`
    Error(ErrorFoundBody),
    /// `started` / `ended`
    Status(StatusBody),
}

/// One event delivered to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Event kind
    #[serde(serialize_with = "serialize_event")]
    pub event: ScanEvent,
    /// Caller's correlation token
    #[serde(rename = "callbackId")]
    pub callback_id: String,
    /// Payload
    pub body: NotificationBody,
}

fn serialize_event<S: serde::Serializer>(event: &ScanEvent, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(event.as_str())
}

impl Notification {
    /// `started{successful:true}`
    pub fn started(callback_id: &str) -> Self {
        Self::status(ScanEvent::Started, callback_id, true)
    }

    /// `ended{successful:true}`
    pub fn ended(callback_id: &str) -> Self {
        Self::status(ScanEvent::Ended, callback_id, true)
    }

    fn status(event: ScanEvent, callback_id: &str, successful: bool) -> Self {
        Self {
            event,
            callback_id: callback_id.to_string(),
            body: NotificationBody::Status(StatusBody { successful }),
        }
    }

    /// Notification for a terminal outcome. `NotFound` produces none.
    pub fn from_outcome(callback_id: &str, outcome: &BarcodeOutcome) -> Option<Self> {
        let (event, body) = match outcome {
            BarcodeOutcome::Decoded { text, format } => (
                ScanEvent::CodeFound,
                NotificationBody::Code(CodeFoundBody {
                    text: text.clone(),
                    format: format.as_str().to_string(),
                    cancelled: false,
                }),
            ),
            BarcodeOutcome::Cancelled => (
                ScanEvent::CodeFound,
                NotificationBody::Code(CodeFoundBody {
                    text: String::new(),
                    format: String::new(),
                    cancelled: true,
                }),
            ),
            BarcodeOutcome::Failed {
                stage,
                error_code,
                description,
            } => (
                ScanEvent::ErrorFound,
                NotificationBody::Error(ErrorFoundBody {
                    state: stage.as_str().to_string(),
                    error: error_code.clone(),
                    description: description.clone(),
                }),
            ),
            BarcodeOutcome::NotFound => return None,
        };
        Some(Self {
            event,
            callback_id: callback_id.to_string(),
            body,
        })
    }

    /// Payload as JSON.
    pub fn body_json(&self) -> Value {
        serde_json::to_value(&self.body).unwrap_or_else(|_| json!({}))
    }

    /// `{ "event", "callbackId", "body" }` as JSON.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({}))
    }

    /// Single-line framing used by the host bridge:
    /// `<callbackId> <wire event name> <json body>`.
    pub fn to_wire_line(&self) -> String {
        format!(
            "{} {} {}",
            self.callback_id,
            self.event.wire_name(),
            self.body_json()
        )
    }

    /// Decoded or cancelled payload, if this is `codeFound`.
    pub fn code(&self) -> Option<&CodeFoundBody> {
        match &self.body {
            NotificationBody::Code(body) => Some(body),
            _ => None,
        }
    }

    /// Error payload, if this is `errorFound`.
    pub fn error_body(&self) -> Option<&ErrorFoundBody> {
        match &self.body {
            NotificationBody::Error(body) => Some(body),
            _ => None,
        }
    }
}

/// One-way channel to the caller.
pub trait NotificationSink: Send + Sync {
    /// Deliver a notification.
    ///
    /// Runs on whichever session thread raised it (caller, worker or the
    /// camera's frame thread) with no session lock held. Calling back into
    /// the session from here is allowed.
    fn notify(&self, notification: Notification);
}

/// Sink forwarding into a std channel.
pub struct ChannelSink {
    tx: Sender<Notification>,
}

impl ChannelSink {
    /// Wrap a sender.
    pub fn new(tx: Sender<Notification>) -> Self {
        Self { tx }
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::debug!("Notification receiver dropped");
        }
    }
}

/// Notifications waiting for the sink.
///
/// Posting only queues. Whichever thread then finds the queue idle drains
/// it, so notifications reach the sink one at a time and in posting order.
/// Anything posted while the sink runs, including from inside the sink,
/// goes out after the current call returns.
#[derive(Default)]
pub(crate) struct Outbox {
    queue: Mutex<OutboxQueue>,
}

#[derive(Default)]
struct OutboxQueue {
    pending: VecDeque<Notification>,
    draining: bool,
}

impl Outbox {
    fn lock(&self) -> MutexGuard<'_, OutboxQueue> {
        match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Outbox mutex poisoned - recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Queue `notification` behind everything already posted.
    pub fn post(&self, notification: Notification) {
        self.lock().pending.push_back(notification);
    }

    /// Hand queued notifications to `sink`, unless another call is already
    /// draining. Never call this with the session guard held.
    pub fn flush(&self, sink: &dyn NotificationSink) {
        let mut queue = self.lock();
        if queue.draining {
            return;
        }
        queue.draining = true;
        loop {
            let Some(notification) = queue.pending.pop_front() else {
                queue.draining = false;
                return;
            };
            drop(queue);
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| sink.notify(notification)));
            queue = self.lock();
            if let Err(payload) = delivered {
                // Let the next flush pick up what is left.
                queue.draining = false;
                drop(queue);
                panic::resume_unwind(payload);
            }
        }
    }
}
