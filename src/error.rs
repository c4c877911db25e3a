//! Error types for the workout-extract library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`WorkoutError`] — **Fatal**: the batch cannot proceed at all (missing
//!   or undecodable input, pdfium unavailable, no model configured, output
//!   directory not writable). Returned as `Err(WorkoutError)` from the
//!   top-level `extract*` functions.
//!
//! * [`ExtractionError`] — **Non-fatal**: the model call or its reply failed
//!   for one image. Stored inside [`crate::output::ImageResult`]; that image
//!   still produces a header-only table and the batch moves on.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the workout-extract library.
#[derive(Debug, Error)]
pub enum WorkoutError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// No input files were supplied.
    #[error("No input files given.\nPass at least one PDF or image.")]
    NoInputs,

    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The batch was declared as PDFs but this file is not one.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The file type could not be determined from its content or extension.
    #[error("Unsupported input '{path}': {reason}")]
    UnsupportedInput { path: PathBuf, reason: String },

    /// The image decoder rejected the file.
    #[error("Failed to decode image '{path}': {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page} of '{path}': {detail}")]
    RasterisationFailed {
        path: PathBuf,
        page: usize,
        detail: String,
    },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium for your platform, or set PDFIUM_LIB_PATH=/path/to/dir \
containing the library.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Model errors ──────────────────────────────────────────────────────
    /// No vision model could be resolved (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write an output table.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The CSV encoder failed.
    #[error("Failed to write CSV '{path}': {source}")]
    CsvWriteFailed {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// The spreadsheet encoder failed.
    #[error("Failed to write spreadsheet '{path}': {source}")]
    SpreadsheetWriteFailed {
        path: PathBuf,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single image.
///
/// The image it belongs to is written as a header-only table.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ExtractionError {
    /// The normalised page image could not be read back from the work dir.
    #[error("Image {image}: could not read {path}: {detail}")]
    ImageReadFailed {
        image: usize,
        path: PathBuf,
        detail: String,
    },

    /// The model call itself failed (network, auth, provider error).
    #[error("Image {image}: model call failed after {retries} retries: {detail}")]
    ModelCallFailed {
        image: usize,
        retries: u32,
        detail: String,
    },

    /// The model call exceeded `api_timeout_secs`.
    #[error("Image {image}: model call timed out after {secs}s")]
    Timeout { image: usize, secs: u64 },

    /// The reply contained no parseable JSON object.
    #[error("Image {image}: parsing error: {detail}")]
    UnparseableReply { image: usize, detail: String },
}

impl ExtractionError {
    /// 1-based index of the image the error belongs to.
    pub fn image(&self) -> usize {
        match self {
            Self::ImageReadFailed { image, .. }
            | Self::ModelCallFailed { image, .. }
            | Self::Timeout { image, .. }
            | Self::UnparseableReply { image, .. } => *image,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_a_pdf_display() {
        let e = WorkoutError::NotAPdf {
            path: PathBuf::from("log.png"),
            magic: *b"\x89PNG",
        };
        let msg = e.to_string();
        assert!(msg.contains("log.png"), "got: {msg}");
    }

    #[test]
    fn provider_not_configured_display() {
        let e = WorkoutError::ProviderNotConfigured {
            provider: "gemini".into(),
            hint: "Set GEMINI_API_KEY".into(),
        };
        assert!(e.to_string().contains("gemini"));
        assert!(e.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn timeout_display() {
        let e = ExtractionError::Timeout { image: 3, secs: 30 };
        assert!(e.to_string().contains("30s"));
        assert!(e.to_string().contains("Image 3"));
        assert_eq!(e.image(), 3);
    }

    #[test]
    fn unparseable_reply_display() {
        let e = ExtractionError::UnparseableReply {
            image: 1,
            detail: "no JSON object in reply".into(),
        };
        assert!(e.to_string().contains("parsing error"));
        assert_eq!(e.image(), 1);
    }

    #[test]
    fn image_read_failed_is_not_a_model_error() {
        let e = ExtractionError::ImageReadFailed {
            image: 2,
            path: PathBuf::from("/tmp/work/001/log.png"),
            detail: "No such file or directory".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("could not read /tmp/work/001/log.png"), "got: {msg}");
        assert!(!msg.contains("model call"));
        assert_eq!(e.image(), 2);
    }
}
