//! Custom error types for the scanner.
//!
//! `ScanError` is the single error type returned by session operations. Every
//! variant knows which step of the session it belongs to, so the same value can
//! be returned to the caller and rendered into an `errorFound` notification.
//!
//! ## Error Hierarchy
//!
//! - **`Argument`**: the caller's session arguments could not be interpreted.
//!   Raised before any resource is touched.
//! - **`Camera`**: an open/configure/start/focus/stop/close call failed. The
//!   `stage` says which one, so callers can tell where acquisition broke.
//! - **`Surface`**: the caller's window could not be resolved.
//! - **`Thread`**: the worker thread could not be spawned. The session never
//!   leaves `Idle`.
//! - **`Events`**: the worker could not subscribe to screen events. Scanning
//!   continues, but taps can no longer cancel.
//! - **`SessionActive`** / **`InvalidState`**: an operation arrived in a phase
//!   that does not accept it.
//! - **`Config`** / **`Configuration`**: configuration loading and validation.
//!
//! Per-frame decode failures are deliberately absent: they are
//! [`DecodeError`](crate::hardware::decoder::DecodeError)s and never leave the
//! frame callback.

use crate::hardware::camera::{CameraError, CameraErrorCode};
use crate::hardware::surface::SurfaceError;
use crate::input::EventQueueError;
use crate::session::ArgumentError;
use crate::session::Phase;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Convenience alias for results using the scanner error type.
pub type ScanResult<T> = std::result::Result<T, ScanError>;

/// Step of the session a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Decoding the caller's arguments
    Parsing,
    /// Accepting a start request
    StartRead,
    /// Accepting a stop request
    StopRead,
    /// Resolving the caller's window
    WindowContext,
    /// Spawning the worker thread
    StartEvents,
    /// Opening the camera
    OpenCamera,
    /// Querying viewfinder rotation
    ViewfinderRotation,
    /// Configuring the viewfinder
    ViewfinderProperties,
    /// Starting the viewfinder
    ViewfinderStart,
    /// Selecting focus mode
    FocusMode,
    /// Stopping the viewfinder
    ViewfinderStop,
    /// Closing the camera
    CloseCamera,
}

impl Stage {
    /// Name reported in the `state` field of `errorFound`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Parsing => "Parsing",
            Stage::StartRead => "Start Read",
            Stage::StopRead => "Stop Read",
            Stage::WindowContext => "Get App Window Context",
            Stage::StartEvents => "Start Events",
            Stage::OpenCamera => "Open Camera",
            Stage::ViewfinderRotation => "Get VF Rotation",
            Stage::ViewfinderProperties => "Set VF Props",
            Stage::ViewfinderStart => "ViewFinder Start",
            Stage::FocusMode => "Set Focus Mode",
            Stage::ViewfinderStop => "ViewFinder Stop",
            Stage::CloseCamera => "Close Camera",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of the `error` field in an `errorFound` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ErrorValue {
    /// Native driver code
    Code(i32),
    /// Symbolic error name
    Text(String),
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid session arguments: {0}")]
    Argument(#[from] ArgumentError),

    #[error("{stage} failed: {source}")]
    Camera {
        stage: Stage,
        #[source]
        source: CameraError,
    },

    #[error("{stage} failed: {source}")]
    Surface {
        stage: Stage,
        #[source]
        source: SurfaceError,
    },

    #[error("Worker thread failed to start: {0}")]
    Thread(String),

    #[error("Screen events unavailable: {0}")]
    Events(#[from] EventQueueError),

    #[error("A scan session is already active")]
    SessionActive,

    #[error("Cannot {operation} while the session is {phase}")]
    InvalidState {
        operation: &'static str,
        phase: Phase,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl ScanError {
    /// Camera failure at `stage`.
    pub fn camera(stage: Stage, source: CameraError) -> Self {
        ScanError::Camera { stage, source }
    }

    /// Session step this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            ScanError::Argument(_) => Stage::Parsing,
            ScanError::Camera { stage, .. } | ScanError::Surface { stage, .. } => *stage,
            ScanError::Thread(_) | ScanError::Events(_) => Stage::StartEvents,
            ScanError::SessionActive => Stage::StartRead,
            ScanError::InvalidState { operation, .. } => {
                if *operation == "stop" {
                    Stage::StopRead
                } else {
                    Stage::StartRead
                }
            }
            ScanError::Config(_) | ScanError::Configuration(_) => Stage::StartRead,
        }
    }

    /// Value for the `error` field of `errorFound`.
    pub fn error_value(&self) -> ErrorValue {
        match self {
            ScanError::Camera { source, .. } => ErrorValue::Code(source.code.native_code()),
            ScanError::Argument(e) => ErrorValue::Text(e.kind().to_string()),
            ScanError::Surface { .. } => ErrorValue::Code(-1),
            ScanError::Thread(_) => ErrorValue::Text("ThreadError".into()),
            ScanError::Events(_) => ErrorValue::Text("EventQueueError".into()),
            ScanError::SessionActive => ErrorValue::Text("SessionActive".into()),
            ScanError::InvalidState { .. } => ErrorValue::Text("InvalidStateError".into()),
            ScanError::Config(_) | ScanError::Configuration(_) => {
                ErrorValue::Text("ConfigError".into())
            }
        }
    }

    /// Human-readable description for `errorFound`.
    pub fn description(&self) -> String {
        match self {
            ScanError::Camera { source, .. } => source.code.description().to_string(),
            ScanError::Argument(e) => e.to_string(),
            ScanError::Surface { source, .. } => source.0.clone(),
            other => other.to_string(),
        }
    }

    /// Camera error code, if this is a camera failure.
    pub fn camera_code(&self) -> Option<CameraErrorCode> {
        match self {
            ScanError::Camera { source, .. } => Some(source.code),
            _ => None,
        }
    }
}

impl From<figment::Error> for ScanError {
    fn from(value: figment::Error) -> Self {
        ScanError::Config(Box::new(value))
    }
}
