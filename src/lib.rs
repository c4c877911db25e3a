//! # workout-extract
//!
//! Turn scanned PDFs and photos of handwritten workout logs into CSV or XLSX
//! tables using a Vision Language Model.
//!
//! Each page is rasterised to a PNG, shown to the model together with a fixed
//! extraction prompt, and the JSON object in the reply is flattened into one
//! row per set:
//!
//! | Date | Muscle Group | Exercise | Set | Weight | Reps |
//! |------|--------------|----------|-----|--------|------|
//! | 01/02/2024 | Legs | Squat | 1 | 100kg | 8 |
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / JPG / PNG
//!  │
//!  ├─ 1. Input   resolve local file or download from URL; PDF or image?
//!  ├─ 2. Render  rasterise PDF pages / re-encode images (spawn_blocking)
//!  ├─ 3. Encode  PNG → base64 ImageData
//!  ├─ 4. VLM     one call per image, sequential (gemini-2.0-flash by default)
//!  ├─ 5. Parse   strict JSON, else first `{` … last `}`
//!  └─ 6. Write   workout_<n>.csv / workout_<n>.xlsx, one per image
//! ```
//!
//! A failed model call or unreadable reply degrades that image to an empty
//! result (a header-only table) and is reported through the progress
//! callback; the rest of the batch is unaffected.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use workout_extract::{extract_batch, ExtractionConfig, OutputFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let config = ExtractionConfig::builder()
//!         .output_format(OutputFormat::Xlsx)
//!         .build()?;
//!     let output = extract_batch(&["week1.pdf", "monday.jpg"], &config).await?;
//!     for image in &output.images {
//!         println!("{} rows → {}", image.rows, image.output_path.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `workout-extract` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ExtractionConfig, ExtractionConfigBuilder, InputKind, OutputFormat, OutputLayout,
};
pub use error::{ExtractionError, WorkoutError};
pub use extract::{extract_batch, extract_batch_sync, extract_file, extract_image, resolve_model};
pub use output::{BatchOutput, BatchStats, ImageResult};
pub use pipeline::llm::{LlmVisionModel, ModelError, ModelReply, VisionModel, VisionRequest};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use record::{Cell, Exercise, OutputRow, SetEntry, WorkoutRecord};
