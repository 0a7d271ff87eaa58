//! Session argument parsing.
//!
//! The host passes `start_read` a JSON object naming the window the preview
//! belongs to:
//!
//! ```json
//! { "handle": "140737353940512", "group": "webview-group-1", "rotation": 0 }
//! ```
//!
//! `handle` is the native window handle as a decimal string (numbers are
//! accepted too), `group` is the window group the viewfinder must join and
//! `rotation` is an optional hint in degrees.

use crate::hardware::surface::SurfaceHandle;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Why the arguments were rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    /// Not a JSON object
    #[error("cannot parse session arguments: {0}")]
    Malformed(String),
    /// A required field is absent or empty
    #[error("missing session argument '{0}'")]
    MissingField(&'static str),
    /// `handle` is not a non-negative decimal integer
    #[error("window handle '{0}' is not numeric")]
    InvalidHandle(String),
    /// `rotation` is not a multiple of 90 below 360
    #[error("rotation hint {0} must be one of 0, 90, 180, 270")]
    InvalidRotation(u32),
}

impl ArgumentError {
    /// Short symbolic name, used as the `error` value of `errorFound`.
    pub fn kind(&self) -> &'static str {
        match self {
            ArgumentError::Malformed(_) => "Cannot parse JSON object",
            ArgumentError::MissingField(_) => "Missing argument",
            ArgumentError::InvalidHandle(_) => "Invalid window handle",
            ArgumentError::InvalidRotation(_) => "Invalid rotation",
        }
    }
}

/// Immutable per-session configuration supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Caller's native window
    pub target_surface: SurfaceHandle,
    /// Window group the viewfinder joins
    pub surface_group: String,
    /// Rotation hint in degrees
    pub rotation_hint: u32,
}

#[derive(Deserialize)]
struct RawArgs {
    handle: Option<Value>,
    group: Option<String>,
    rotation: Option<u32>,
}

impl SessionConfig {
    /// Parse the JSON argument string given to `start_read`.
    pub fn parse(args: &str) -> Result<Self, ArgumentError> {
        let raw: RawArgs =
            serde_json::from_str(args).map_err(|e| ArgumentError::Malformed(e.to_string()))?;

        let handle_text = match raw.handle {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Null) | None => return Err(ArgumentError::MissingField("handle")),
            Some(other) => return Err(ArgumentError::InvalidHandle(other.to_string())),
        };
        if handle_text.trim().is_empty() {
            return Err(ArgumentError::MissingField("handle"));
        }
        let target_surface = handle_text
            .parse::<SurfaceHandle>()
            .map_err(|_| ArgumentError::InvalidHandle(handle_text.clone()))?;

        let surface_group = raw
            .group
            .filter(|g| !g.trim().is_empty())
            .ok_or(ArgumentError::MissingField("group"))?;

        let rotation_hint = raw.rotation.unwrap_or(0);
        if rotation_hint % 90 != 0 || rotation_hint >= 360 {
            return Err(ArgumentError::InvalidRotation(rotation_hint));
        }

        Ok(Self {
            target_surface,
            surface_group,
            rotation_hint,
        })
    }
}
