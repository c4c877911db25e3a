//! Configuration types for workout-log extraction.
//!
//! All batch behaviour is controlled through [`ExtractionConfig`], built via
//! its [`ExtractionConfigBuilder`]. Every knob lives in one struct so a run
//! can be logged and two runs can be diffed field by field.

use crate::error::WorkoutError;
use crate::pipeline::llm::VisionModel;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Configuration for one extraction batch.
///
/// # Example
/// ```rust
/// use workout_extract::{ExtractionConfig, OutputFormat};
///
/// let config = ExtractionConfig::builder()
///     .output_format(OutputFormat::Xlsx)
///     .output_dir("exports")
///     .model("gemini-2.0-flash")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// How every file in the batch is interpreted. Default: [`InputKind::Auto`].
    pub input_kind: InputKind,

    /// Table format written per image. Default: [`OutputFormat::Csv`].
    pub output_format: OutputFormat,

    /// Directory the tables (or the session directory) are created in. Default: `.`.
    pub output_dir: PathBuf,

    /// Naming scheme for output files. Default: a fresh [`OutputLayout::Session`].
    pub layout: OutputLayout,

    /// LLM model identifier, e.g. "gemini-2.0-flash", "gpt-4.1-mini".
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic").
    pub provider_name: Option<String>,

    /// Pre-constructed vision backend. Takes precedence over `provider_name`.
    pub vision_model: Option<Arc<dyn VisionModel>>,

    /// Replacement for the built-in extraction prompt.
    pub prompt: Option<String>,

    /// Ask for a bare JSON object and parse the whole reply before falling
    /// back to the first/last brace scan. Default: true.
    pub strict_json: bool,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per image. Default: 4096.
    pub max_tokens: usize,

    /// Retries on a failed model call. Default: 0.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: None (wait indefinitely).
    pub api_timeout_secs: Option<u64>,

    /// Longest edge of a rasterised PDF page in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives per-image events, including per-image errors.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            input_kind: InputKind::default(),
            output_format: OutputFormat::default(),
            output_dir: PathBuf::from("."),
            layout: OutputLayout::new_session(),
            model: None,
            provider_name: None,
            vision_model: None,
            prompt: None,
            strict_json: true,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 0,
            retry_backoff_ms: 500,
            api_timeout_secs: None,
            max_rendered_pixels: 2000,
            password: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("input_kind", &self.input_kind)
            .field("output_format", &self.output_format)
            .field("output_dir", &self.output_dir)
            .field("layout", &self.layout)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field(
                "vision_model",
                &self.vision_model.as_ref().map(|_| "<dyn VisionModel>"),
            )
            .field("prompt", &self.prompt.as_ref().map(|p| p.len()))
            .field("strict_json", &self.strict_json)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Path of the table written for the 1-based image `index`.
    pub fn output_path(&self, index: usize) -> PathBuf {
        self.layout
            .directory(&self.output_dir)
            .join(format!("workout_{index}.{}", self.output_format.extension()))
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn input_kind(mut self, kind: InputKind) -> Self {
        self.config.input_kind = kind;
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn layout(mut self, layout: OutputLayout) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn vision_model(mut self, model: Arc<dyn VisionModel>) -> Self {
        self.config.vision_model = Some(model);
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn strict_json(mut self, v: bool) -> Self {
        self.config.strict_json = v;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, WorkoutError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(WorkoutError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == Some(0) {
            return Err(WorkoutError::InvalidConfig(
                "api_timeout_secs must be ≥ 1 when set".into(),
            ));
        }
        if let Some(ref prompt) = c.prompt {
            if prompt.trim().is_empty() {
                return Err(WorkoutError::InvalidConfig(
                    "prompt override is empty".into(),
                ));
            }
        }
        if let OutputLayout::Session(ref id) = c.layout {
            if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
                return Err(WorkoutError::InvalidConfig(format!(
                    "session id '{id}' is not a plain directory name"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How input files are interpreted. One selector covers the whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InputKind {
    /// Sniff each file's magic bytes, falling back to its extension. (default)
    #[default]
    Auto,
    /// Every file is a PDF; each page becomes one image.
    Pdf,
    /// Every file is a JPG/PNG image, passed through as a single image.
    Image,
}

/// Table format written for each image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Comma-separated text, UTF-8. (default)
    #[default]
    Csv,
    /// Office Open XML workbook with one worksheet.
    Xlsx,
}

impl OutputFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Xlsx => "xlsx",
        }
    }
}

/// Where output files land relative to `output_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputLayout {
    /// `<output_dir>/workout_<n>.<ext>`. Concurrent runs overwrite each other.
    Flat,
    /// `<output_dir>/<id>/workout_<n>.<ext>`, one directory per run.
    Session(String),
}

impl OutputLayout {
    /// A session layout with a fresh id: local timestamp plus a random suffix.
    pub fn new_session() -> Self {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        OutputLayout::Session(format!("{stamp}-{}", &suffix[..8]))
    }

    /// Directory output files are written into.
    pub fn directory(&self, output_dir: &Path) -> PathBuf {
        match self {
            OutputLayout::Flat => output_dir.to_path_buf(),
            OutputLayout::Session(id) => output_dir.join(id),
        }
    }
}
