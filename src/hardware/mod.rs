//! Hardware Capabilities
//!
//! The session talks to devices only through the traits in this module:
//!
//! - [`CameraSource`](camera::CameraSource): open, stream and close a camera
//! - [`FrameDecoder`](decoder::FrameDecoder): find a barcode in one frame
//! - [`Compositor`](surface::Compositor): place the preview windows
//!
//! Traits are `Send + Sync` and take `&self`, so one instance can be shared by
//! the caller, the worker and the camera's delivery thread. Simulated
//! implementations live in [`mock`].

pub mod camera;
pub mod decoder;
pub mod mock;
pub mod surface;

pub use camera::{
    CameraError, CameraErrorCode, CameraHandle, CameraSource, CameraUnit, FocusMode,
    FrameCallback, FrameSample, ViewfinderSettings,
};
pub use decoder::{
    frame_verdict, BarcodeFormat, DecodeError, DecodeHints, DecodedBarcode, FrameDecoder,
    FrameVerdict,
};
pub use surface::{
    Compositor, DisplayInfo, PreviewGeometry, SurfaceError, SurfaceHandle, WindowId,
};
