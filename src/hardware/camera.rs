//! Camera Capability
//!
//! Thin contract over the platform camera driver. The scan session only needs
//! a handful of operations, in this order:
//!
//! 1. `open` - acquire the exclusive hardware handle
//! 2. `viewfinder_rotation` / `configure` - point the viewfinder at our window group
//! 3. `start_streaming` - register the frame callback
//! 4. `set_focus_mode` - only valid once the viewfinder is running
//! 5. `stop_streaming` / `close` - release everything
//!
//! # Thread Safety
//!
//! Implementations must be `Send + Sync`. The frame callback passed to
//! `start_streaming` may be invoked from any thread, concurrently with every
//! other camera call, and blocks the driver's delivery path while it runs.
//! Callers must not invoke `open` twice without an intervening `close`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Opaque handle to an opened camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CameraHandle(pub u64);

impl fmt::Display for CameraHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "camera#{}", self.0)
    }
}

/// Which physical camera to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraUnit {
    /// Rear-facing camera (default for barcode work)
    #[default]
    Rear,
    /// Front-facing camera
    Front,
}

/// Focus modes relevant to barcode scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusMode {
    /// Continuous autofocus tuned for close subjects
    #[default]
    ContinuousMacro,
    /// Continuous autofocus
    Continuous,
    /// Fixed focus (no focus command effect)
    Fixed,
}

/// Viewfinder placement passed to [`CameraSource::configure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewfinderSettings {
    /// Rotation requested by the caller, in degrees
    pub rotation_hint: u32,
    /// Window group the viewfinder window must join
    pub window_group: String,
    /// Identifier given to the embedded viewfinder window
    pub window_id: String,
}

/// Error codes reported by the camera driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraErrorCode {
    /// Camera temporarily unavailable
    Again,
    /// Invalid parameter
    Invalid,
    /// No such camera
    NoDevice,
    /// File table overflow
    FileTableOverflow,
    /// Invalid camera handle
    BadHandle,
    /// Missing permissions
    AccessDenied,
    /// Invalid file descriptor
    BadFileDescriptor,
    /// File or directory does not exist
    NotFound,
    /// Allocation failure
    NoMemory,
    /// Operation not supported
    NotSupported,
    /// Communication problem or timeout
    TimedOut,
    /// Operation already in progress or already completed
    Already,
    /// Camera library not initialised
    Uninitialized,
    /// Callback registration failed
    CallbackRegistration,
    /// Microphone already in use
    MicrophoneInUse,
    /// Code outside the known set
    Other(i32),
}

impl CameraErrorCode {
    /// Map a raw driver code onto the known set.
    pub fn from_native(code: i32) -> Self {
        match code {
            11 => Self::Again,
            22 => Self::Invalid,
            19 => Self::NoDevice,
            24 => Self::FileTableOverflow,
            9 => Self::BadHandle,
            13 => Self::AccessDenied,
            1000 => Self::BadFileDescriptor,
            2 => Self::NotFound,
            12 => Self::NoMemory,
            103 => Self::NotSupported,
            260 => Self::TimedOut,
            237 => Self::Already,
            1001 => Self::Uninitialized,
            1002 => Self::CallbackRegistration,
            1003 => Self::MicrophoneInUse,
            other => Self::Other(other),
        }
    }

    /// Raw driver code, as reported in `errorFound` payloads.
    pub fn native_code(&self) -> i32 {
        match self {
            Self::Again => 11,
            Self::Invalid => 22,
            Self::NoDevice => 19,
            Self::FileTableOverflow => 24,
            Self::BadHandle => 9,
            Self::AccessDenied => 13,
            Self::BadFileDescriptor => 1000,
            Self::NotFound => 2,
            Self::NoMemory => 12,
            Self::NotSupported => 103,
            Self::TimedOut => 260,
            Self::Already => 237,
            Self::Uninitialized => 1001,
            Self::CallbackRegistration => 1002,
            Self::MicrophoneInUse => 1003,
            Self::Other(code) => *code,
        }
    }

    /// Human-readable description of the code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Again => "The specified camera was not available. Try again.",
            Self::Invalid => "The camera call failed because of an invalid parameter.",
            Self::NoDevice => "No such camera was found.",
            Self::FileTableOverflow => "The camera call failed because of a file table overflow.",
            Self::BadHandle => "An invalid camera handle was used.",
            Self::AccessDenied => "The permissions required to access the camera are not available.",
            Self::BadFileDescriptor => "An invalid file descriptor was used.",
            Self::NotFound => "A file or directory that does not exist was accessed.",
            Self::NoMemory => "Memory allocation failed.",
            Self::NotSupported => "The requested operation is not supported.",
            Self::TimedOut => {
                "The camera call failed due to a communication problem or time-out with the camera."
            }
            Self::Already => {
                "An operation on the camera is already in progress, or was already completed."
            }
            Self::Uninitialized => "The camera library is not initialized.",
            Self::CallbackRegistration => "Registration of a camera callback failed.",
            Self::MicrophoneInUse => "The camera failed to open because the microphone is already in use.",
            Self::Other(_) => "Unknown camera error.",
        }
    }
}

impl fmt::Display for CameraErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.native_code())
    }
}

/// Failure reported by a camera operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("camera error: {code}")]
pub struct CameraError {
    /// Driver error code
    pub code: CameraErrorCode,
}

impl CameraError {
    /// Wrap a driver error code.
    pub fn new(code: CameraErrorCode) -> Self {
        Self { code }
    }
}

impl From<CameraErrorCode> for CameraError {
    fn from(code: CameraErrorCode) -> Self {
        Self::new(code)
    }
}

/// Borrowed view over one frame's luminance plane.
///
/// Only valid for the duration of the frame callback; the lifetime keeps
/// decoders from retaining it.
#[derive(Debug, Clone, Copy)]
pub struct FrameSample<'a> {
    luma: &'a [u8],
    stride: usize,
    width: u32,
    height: u32,
}

impl<'a> FrameSample<'a> {
    /// Build a sample, checking that the plane covers `stride * height` bytes
    /// and that each row fits inside the stride.
    pub fn new(luma: &'a [u8], stride: usize, width: u32, height: u32) -> Option<Self> {
        if (width as usize) > stride {
            return None;
        }
        let required = stride.checked_mul(height as usize)?;
        if luma.len() < required {
            return None;
        }
        Some(Self {
            luma,
            stride,
            width,
            height,
        })
    }

    /// Frame width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes between the start of consecutive rows
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Raw luminance plane, including stride padding
    pub fn luma(&self) -> &'a [u8] {
        self.luma
    }

    /// Visible pixels of row `y`.
    pub fn row(&self, y: u32) -> Option<&'a [u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride;
        self.luma.get(start..start + self.width as usize)
    }

    /// Luminance at `(x, y)`.
    pub fn luminance(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width {
            return None;
        }
        self.row(y).and_then(|row| row.get(x as usize).copied())
    }
}

/// Callback registered with [`CameraSource::start_streaming`].
pub type FrameCallback = Box<dyn Fn(&FrameSample<'_>) + Send + Sync + 'static>;

/// Capability: camera acquisition for barcode scanning.
pub trait CameraSource: Send + Sync {
    /// Acquire the camera. Must not be called again before `close`.
    fn open(&self, unit: CameraUnit) -> Result<CameraHandle, CameraError>;

    /// Native rotation of the viewfinder, in degrees.
    fn viewfinder_rotation(&self, handle: CameraHandle) -> Result<u32, CameraError>;

    /// Attach the viewfinder to the caller's window group.
    fn configure(&self, handle: CameraHandle, settings: &ViewfinderSettings)
        -> Result<(), CameraError>;

    /// Start the viewfinder; `on_frame` fires for every frame until `stop_streaming`.
    fn start_streaming(&self, handle: CameraHandle, on_frame: FrameCallback)
        -> Result<(), CameraError>;

    /// Select a focus mode. Only valid while streaming.
    fn set_focus_mode(&self, handle: CameraHandle, mode: FocusMode) -> Result<(), CameraError>;

    /// Stop the viewfinder. No frame callbacks start after this returns.
    fn stop_streaming(&self, handle: CameraHandle) -> Result<(), CameraError>;

    /// Release the camera.
    fn close(&self, handle: CameraHandle) -> Result<(), CameraError>;
}
