//! Batch extraction entry points.
//!
//! A batch is processed strictly in order: normalise every input into
//! images, then for each image call the model, parse its reply and write one
//! table. A failed model call or unparseable reply only costs that image its
//! rows; it still gets a header-only table and the batch carries on.

use crate::config::ExtractionConfig;
use crate::error::{ExtractionError, WorkoutError};
use crate::output::{BatchOutput, BatchStats, ImageResult};
use crate::pipeline::llm::{self, LlmVisionModel, VisionModel};
use crate::pipeline::{encode, parse, render, write};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::record::{self, WorkoutRecord};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Model used when Gemini is picked without an explicit model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Extract every input (local path or HTTP/HTTPS URL) into one table per image.
///
/// # Returns
/// `Ok(BatchOutput)` once every image has a table, even if some images
/// failed extraction (check `output.stats.failed_images`).
///
/// # Errors
/// Returns `Err(WorkoutError)` only for fatal errors:
/// - no model configured
/// - missing, unsupported or undecodable input
/// - an output file that cannot be written
pub async fn extract_batch<S: AsRef<str>>(
    inputs: &[S],
    config: &ExtractionConfig,
) -> Result<BatchOutput, WorkoutError> {
    let total_start = Instant::now();
    let inputs: Vec<String> = inputs.iter().map(|s| s.as_ref().to_string()).collect();
    info!("Starting extraction of {} input(s)", inputs.len());

    // ── Step 1: Resolve the model before touching any input ──────────────
    let model = resolve_model(config)?;

    // ── Step 2: Normalise inputs to images ───────────────────────────────
    let normalize_start = Instant::now();
    let batch = render::normalize_inputs(&inputs, config).await?;
    let normalize_duration_ms = normalize_start.elapsed().as_millis() as u64;
    let total_images = batch.images.len();
    info!(
        "Normalised {} input(s) into {} image(s) in {}ms",
        batch.input_files, total_images, normalize_duration_ms
    );
    debug!("Page images staged in {}", batch.work_dir().display());

    let progress: ProgressCallback = config
        .progress_callback
        .clone()
        .unwrap_or_else(|| Arc::new(NoopProgressCallback));
    progress.on_batch_start(total_images);

    // ── Step 3: One model call and one table per image ───────────────────
    let extraction_start = Instant::now();
    let mut images = Vec::with_capacity(total_images);

    for (i, image_path) in batch.images.iter().enumerate() {
        let index = i + 1;
        let image_start = Instant::now();
        progress.on_image_start(index, total_images, image_path);

        let extraction = extract_image(model.as_ref(), index, image_path, config).await;

        if let Some(ref e) = extraction.error {
            warn!("{}", e);
            progress.on_image_error(e.image(), total_images, &e.to_string());
        }

        let output_path = config.output_path(index);
        let rows = write::write_table(
            &extraction.record,
            &output_path,
            config.output_format,
            &record::today(),
        )?;
        info!("Image {}: {} rows → {}", index, rows, output_path.display());

        progress.on_image_complete(index, total_images, &output_path, rows);

        images.push(ImageResult {
            index,
            source: image_path.clone(),
            output_path,
            record: extraction.record,
            rows,
            input_tokens: extraction.input_tokens,
            output_tokens: extraction.output_tokens,
            duration_ms: image_start.elapsed().as_millis() as u64,
            error: extraction.error,
        });
    }
    let extraction_duration_ms = extraction_start.elapsed().as_millis() as u64;

    // ── Step 4: Stats ────────────────────────────────────────────────────
    let failed = images.iter().filter(|i| i.error.is_some()).count();
    let stats = BatchStats {
        input_files: batch.input_files,
        total_images,
        extracted_images: total_images - failed,
        failed_images: failed,
        total_rows: images.iter().map(|i| i.rows).sum(),
        total_input_tokens: images.iter().map(|i| i.input_tokens as u64).sum(),
        total_output_tokens: images.iter().map(|i| i.output_tokens as u64).sum(),
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        normalize_duration_ms,
        extraction_duration_ms,
    };

    info!(
        "Extraction complete: {}/{} images, {} rows, {}ms total",
        stats.extracted_images, total_images, stats.total_rows, stats.total_duration_ms
    );

    progress.on_batch_complete(total_images, stats.extracted_images);

    Ok(BatchOutput { images, stats })
}

/// Extract a single input file. Equivalent to a one-element batch.
pub async fn extract_file(
    input: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<BatchOutput, WorkoutError> {
    extract_batch(&[input.as_ref()], config).await
}

/// Synchronous wrapper around [`extract_batch`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_batch_sync<S: AsRef<str>>(
    inputs: &[S],
    config: &ExtractionConfig,
) -> Result<BatchOutput, WorkoutError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| WorkoutError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_batch(inputs, config))
}

/// What one image yielded, before it is written.
#[derive(Debug, Clone, Default)]
pub struct ImageExtraction {
    pub record: WorkoutRecord,
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// Set when `record` is the empty fallback.
    pub error: Option<ExtractionError>,
}

/// Run the model on one normalised image and read its reply.
///
/// Never fails: any error becomes `error` alongside an empty record.
pub async fn extract_image(
    model: &dyn VisionModel,
    index: usize,
    image_path: &Path,
    config: &ExtractionConfig,
) -> ImageExtraction {
    let image = match encode::encode_file(image_path).await {
        Ok(image) => image,
        Err(e) => {
            return ImageExtraction {
                error: Some(ExtractionError::ImageReadFailed {
                    image: index,
                    path: image_path.to_path_buf(),
                    detail: e.to_string(),
                }),
                ..Default::default()
            };
        }
    };

    let request = llm::build_request(image, config);
    let reply = match llm::request_extraction(model, index, &request, config).await {
        Ok(reply) => reply,
        Err(e) => {
            return ImageExtraction {
                error: Some(e),
                ..Default::default()
            };
        }
    };

    match parse::parse_reply(&reply.text, config.strict_json) {
        Ok(value) => {
            let record = WorkoutRecord::from_json(&value);
            debug!(
                "Image {}: {} exercise(s), {} set(s)",
                index,
                record.workouts.len(),
                record.set_count()
            );
            ImageExtraction {
                record,
                input_tokens: reply.input_tokens,
                output_tokens: reply.output_tokens,
                error: None,
            }
        }
        Err(e) => ImageExtraction {
            record: WorkoutRecord::empty(),
            input_tokens: reply.input_tokens,
            output_tokens: reply.output_tokens,
            error: Some(ExtractionError::UnparseableReply {
                image: index,
                detail: e.to_string(),
            }),
        },
    }
}

// ── Model resolution ─────────────────────────────────────────────────────

fn default_model_for(provider: &str) -> &'static str {
    match provider {
        "gemini" => DEFAULT_GEMINI_MODEL,
        "anthropic" => "claude-sonnet-4-20250514",
        _ => "gpt-4.1-nano",
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn VisionModel>, WorkoutError> {
    let provider: Arc<dyn LLMProvider> = ProviderFactory::create_llm_provider(provider_name, model)
        .map_err(|e| WorkoutError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        })?;
    info!("Using provider '{}' with model '{}'", provider_name, model);
    Ok(Arc::new(LlmVisionModel::new(provider)))
}

/// Resolve the vision model, from most-specific to least-specific.
///
/// 1. **Pre-built model** (`config.vision_model`) — used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model` or that
///    provider's default model. The provider reads its own API key variable.
/// 3. **Environment pair** `WORKOUT_LLM_PROVIDER` + `WORKOUT_MODEL`.
/// 4. **Gemini** when `GEMINI_API_KEY` is set.
/// 5. **Auto-detection** via `ProviderFactory::from_env`.
///
/// Keys are only ever read from the environment, never from source.
pub fn resolve_model(config: &ExtractionConfig) -> Result<Arc<dyn VisionModel>, WorkoutError> {
    if let Some(ref model) = config.vision_model {
        return Ok(Arc::clone(model));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(default_model_for(name));
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("WORKOUT_LLM_PROVIDER"),
        std::env::var("WORKOUT_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if std::env::var("GEMINI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
        return create_vision_provider("gemini", model);
    }

    let (provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| WorkoutError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY (or OPENAI_API_KEY, ANTHROPIC_API_KEY), or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(Arc::new(LlmVisionModel::new(provider)))
}
