//! # Barcode Session
//!
//! Single-shot barcode scanning over a live camera feed. A [`ScanSession`]
//! opens the camera, decodes frames as they arrive, lets the user cancel by
//! tapping the preview and reports exactly one outcome per scan to the
//! caller's [`NotificationSink`].
//!
//! ## Crate Structure
//!
//! - **`config`**: `ScannerConfig`, loaded with figment from TOML and
//!   `BARCODE_SESSION_` environment variables.
//! - **`error`**: the `ScanError` taxonomy and the `Stage` names reported in
//!   `errorFound`.
//! - **`hardware`**: capability traits for the camera, the decoder and the
//!   compositor, plus mock implementations.
//! - **`input`**: the screen event pump run by the session worker.
//! - **`session`**: the session state machine, its worker thread and the
//!   notifications it emits.
//! - **`tracing_setup`**: tracing-subscriber initialisation.

pub mod config;
pub mod error;
pub mod hardware;
pub mod input;
pub mod session;
pub mod tracing_setup;

pub use config::ScannerConfig;
pub use error::{ScanError, ScanResult, Stage};
pub use session::{
    BarcodeOutcome, Notification, NotificationSink, Phase, ScanEvent, ScanSession,
    ScanSessionBuilder,
};
