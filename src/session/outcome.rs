//! Terminal result of a scan.

use crate::error::{ErrorValue, ScanError, Stage};
use crate::hardware::decoder::{BarcodeFormat, DecodedBarcode};

/// How a session ended, from the caller's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarcodeOutcome {
    /// A barcode was decoded
    Decoded {
        /// Decoded payload
        text: String,
        /// Symbology
        format: BarcodeFormat,
    },
    /// Frame held no barcode. Never reported on its own.
    NotFound,
    /// The user tapped the preview
    Cancelled,
    /// A step failed
    Failed {
        /// Step that failed
        stage: Stage,
        /// Native code or symbolic name
        error_code: ErrorValue,
        /// Human-readable description
        description: String,
    },
}

impl BarcodeOutcome {
    /// Whether this outcome ends the session.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BarcodeOutcome::NotFound)
    }
}

impl From<DecodedBarcode> for BarcodeOutcome {
    fn from(barcode: DecodedBarcode) -> Self {
        BarcodeOutcome::Decoded {
            text: barcode.text,
            format: barcode.format,
        }
    }
}

impl From<&ScanError> for BarcodeOutcome {
    fn from(error: &ScanError) -> Self {
        BarcodeOutcome::Failed {
            stage: error.stage(),
            error_code: error.error_value(),
            description: error.description(),
        }
    }
}
