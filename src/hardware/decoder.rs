//! Frame Decoder Capability
//!
//! The barcode recognition algorithm lives outside this crate. A decoder is a
//! pure, synchronous function from a luminance frame to an optional barcode.
//! It may be slow (tens of milliseconds) and is called on the camera's own
//! delivery thread.
//!
//! # Decode noise
//!
//! Most frames contain no barcode, and a frame that almost decodes is not
//! actionable. [`frame_verdict`] folds both `Ok(None)` and `Err(_)` into
//! [`FrameVerdict::Nothing`]; the session never sees a per-frame error.

use crate::hardware::camera::FrameSample;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Symbologies a decoder may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BarcodeFormat {
    /// Aztec 2D
    Aztec,
    /// Codabar 1D
    Codabar,
    /// Code 39 1D
    #[serde(rename = "CODE_39")]
    Code39,
    /// Code 93 1D
    #[serde(rename = "CODE_93")]
    Code93,
    /// Code 128 1D
    #[serde(rename = "CODE_128")]
    Code128,
    /// Data Matrix 2D
    DataMatrix,
    /// EAN-8 1D
    #[serde(rename = "EAN_8")]
    Ean8,
    /// EAN-13 1D
    #[serde(rename = "EAN_13")]
    Ean13,
    /// ITF (Interleaved Two of Five)
    Itf,
    /// MaxiCode 2D
    Maxicode,
    /// PDF417
    #[serde(rename = "PDF_417")]
    Pdf417,
    /// QR Code 2D
    QrCode,
    /// RSS 14
    #[serde(rename = "RSS_14")]
    Rss14,
    /// RSS Expanded
    RssExpanded,
    /// UPC-A 1D
    UpcA,
    /// UPC-E 1D
    UpcE,
    /// UPC/EAN extension
    UpcEanExtension,
}

impl BarcodeFormat {
    /// Name used in `codeFound` payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aztec => "AZTEC",
            Self::Codabar => "CODABAR",
            Self::Code39 => "CODE_39",
            Self::Code93 => "CODE_93",
            Self::Code128 => "CODE_128",
            Self::DataMatrix => "DATA_MATRIX",
            Self::Ean8 => "EAN_8",
            Self::Ean13 => "EAN_13",
            Self::Itf => "ITF",
            Self::Maxicode => "MAXICODE",
            Self::Pdf417 => "PDF_417",
            Self::QrCode => "QR_CODE",
            Self::Rss14 => "RSS_14",
            Self::RssExpanded => "RSS_EXPANDED",
            Self::UpcA => "UPC_A",
            Self::UpcE => "UPC_E",
            Self::UpcEanExtension => "UPC_EAN_EXTENSION",
        }
    }
}

impl fmt::Display for BarcodeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which formats the decoder should try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeHints {
    /// Formats to attempt, in priority order
    pub formats: Vec<BarcodeFormat>,
}

impl Default for DecodeHints {
    /// The set scanned for in a single-shot session.
    fn default() -> Self {
        Self {
            formats: vec![
                BarcodeFormat::QrCode,
                BarcodeFormat::Ean8,
                BarcodeFormat::Ean13,
                BarcodeFormat::UpcA,
                BarcodeFormat::UpcE,
                BarcodeFormat::DataMatrix,
                BarcodeFormat::Code128,
                BarcodeFormat::Code39,
                BarcodeFormat::Itf,
                BarcodeFormat::Aztec,
            ],
        }
    }
}

impl DecodeHints {
    /// Whether `format` is among the requested formats.
    pub fn allows(&self, format: BarcodeFormat) -> bool {
        self.formats.contains(&format)
    }
}

/// A successfully decoded barcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBarcode {
    /// Decoded payload
    pub text: String,
    /// Symbology
    pub format: BarcodeFormat,
}

impl DecodedBarcode {
    /// Convenience constructor
    pub fn new(text: impl Into<String>, format: BarcodeFormat) -> Self {
        Self {
            text: text.into(),
            format,
        }
    }
}

/// Per-frame decode failure (checksum mismatch, partial symbol, ...).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("frame decode failed: {0}")]
pub struct DecodeError(pub String);

/// Capability: barcode recognition on a single frame.
pub trait FrameDecoder: Send + Sync {
    /// Decode one frame. `Ok(None)` means no barcode was found.
    fn decode(
        &self,
        frame: &FrameSample<'_>,
        hints: &DecodeHints,
    ) -> Result<Option<DecodedBarcode>, DecodeError>;
}

/// What a frame means for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameVerdict {
    /// A barcode was decoded
    Found(DecodedBarcode),
    /// No barcode, or decode noise
    Nothing,
}

/// Apply the decode-noise policy to a decoder result.
///
/// Errors are treated exactly like "no barcode". Hints only steer the decoder;
/// whatever it reports as decoded is taken as is.
pub fn frame_verdict(result: Result<Option<DecodedBarcode>, DecodeError>) -> FrameVerdict {
    match result {
        Ok(Some(barcode)) => FrameVerdict::Found(barcode),
        Ok(None) => FrameVerdict::Nothing,
        Err(e) => {
            tracing::trace!(error = %e, "Frame decode noise");
            FrameVerdict::Nothing
        }
    }
}
