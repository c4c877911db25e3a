//! Progress-callback trait for per-image extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the batch runs. This is also the user-facing surface for
//! per-image failures: `on_image_error` fires whenever a model call or its
//! reply fails and the image falls back to an empty result.
//!
//! # Example
//!
//! ```rust
//! use workout_extract::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ExtractionProgressCallback for Printer {
//!     fn on_image_error(&self, index: usize, total: usize, error: &str) {
//!         eprintln!("image {index}/{total}: {error}");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Printer) as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the pipeline as it works through a batch.
///
/// Images are processed one at a time, in upload order. All methods default
/// to no-ops so implementations only override what they need.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once all inputs have been normalised into images.
    fn on_batch_start(&self, total_images: usize) {
        let _ = total_images;
    }

    /// Called just before the model request for an image is sent.
    fn on_image_start(&self, index: usize, total_images: usize, source: &Path) {
        let _ = (index, total_images, source);
    }

    /// Called when an image's table has been written.
    ///
    /// `rows` is the number of data rows (sets) in the table.
    fn on_image_complete(&self, index: usize, total_images: usize, output: &Path, rows: usize) {
        let _ = (index, total_images, output, rows);
    }

    /// Called when extraction failed for an image. A header-only table is
    /// still written for it and `on_image_complete` follows.
    fn on_image_error(&self, index: usize, total_images: usize, error: &str) {
        let _ = (index, total_images, error);
    }

    /// Called once after every image has been attempted.
    fn on_batch_complete(&self, total_images: usize, success_count: usize) {
        let _ = (total_images, success_count);
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
