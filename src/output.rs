//! Result types returned by the extraction entry points.

use crate::error::ExtractionError;
use crate::record::WorkoutRecord;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything one batch produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    /// One entry per normalised image, in upload order.
    pub images: Vec<ImageResult>,
    pub stats: BatchStats,
}

impl BatchOutput {
    /// Paths of every table written, in index order.
    pub fn output_paths(&self) -> Vec<&PathBuf> {
        self.images.iter().map(|i| &i.output_path).collect()
    }

    /// Per-image errors, in index order.
    pub fn errors(&self) -> impl Iterator<Item = &ExtractionError> {
        self.images.iter().filter_map(|i| i.error.as_ref())
    }
}

/// The outcome for a single image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResult {
    /// 1-based position in the batch; also the output file's index.
    pub index: usize,
    /// Normalised image the model was shown.
    pub source: PathBuf,
    /// Table written for this image.
    pub output_path: PathBuf,
    /// What was read from the reply (empty on error).
    pub record: WorkoutRecord,
    /// Data rows written (excluding the header).
    pub rows: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    /// Set when the reply was replaced by the empty result.
    pub error: Option<ExtractionError>,
}

/// Aggregate counters for a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    pub input_files: usize,
    pub total_images: usize,
    pub extracted_images: usize,
    pub failed_images: usize,
    pub total_rows: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
    pub normalize_duration_ms: u64,
    pub extraction_duration_ms: u64,
}
