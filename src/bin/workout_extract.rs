//! CLI binary for workout-extract.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, shows per-image progress and prints a summary.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use workout_extract::{
    extract_batch, BatchOutput, ExtractionConfig, ExtractionProgressCallback, InputKind, OutputFormat,
    OutputLayout, ProgressCallback,
};

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per image.
/// Per-image extraction errors are printed here in red.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    /// Error text per image, printed on that image's completion line.
    pending_errors: Mutex<HashMap<usize, String>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rasterising inputs…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            pending_errors: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_images: usize) {
        self.activate_bar(total_images);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting {total_images} image(s)…"))
        ));
    }

    fn on_image_start(&self, index: usize, _total: usize, source: &Path) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.bar.set_message(format!("processing {name}"));
    }

    fn on_image_error(&self, index: usize, _total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut m) = self.pending_errors.lock() {
            m.insert(index, error.to_string());
        }
    }

    fn on_image_complete(&self, index: usize, total: usize, output: &Path, rows: usize) {
        let secs = self.elapsed_secs(index);
        let error = self
            .pending_errors
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index));

        match error {
            None => self.bar.println(format!(
                "  {} Image {:>3}/{:<3}  {:<10}  {}  {}",
                green("✓"),
                index,
                total,
                dim(&format!("{rows:>4} rows")),
                output.display(),
                dim(&format!("{secs:.1}s")),
            )),
            Some(msg) => {
                let msg = if msg.chars().count() > 80 {
                    format!("{}\u{2026}", msg.chars().take(79).collect::<String>())
                } else {
                    msg
                };
                self.bar.println(format!(
                    "  {} Image {:>3}/{:<3}  {}  {}",
                    red("✗"),
                    index,
                    total,
                    red(&msg),
                    dim(&format!("header only → {}", output.display())),
                ));
            }
        }
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_images: usize, success_count: usize) {
        let failed = total_images.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} image(s) extracted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} image(s) extracted  ({} failed)",
                if failed == total_images {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_images,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One scanned log, CSV per page into a fresh run directory
  workout-extract week1.pdf

  # Photos straight to spreadsheets
  workout-extract --file-type image --format xlsx mon.jpg tue.jpg

  # Legacy flat names (workout_1.csv, workout_2.csv, …) in ./out
  workout-extract --flat -o out scan.pdf

  # Custom prompt and a bounded model call
  workout-extract --prompt-file prompt.txt --api-timeout 60 --max-retries 2 log.png

  # Machine-readable summary
  workout-extract --json scan.pdf > result.json

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default provider)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  WORKOUT_LLM_PROVIDER    Provider override (pair with WORKOUT_MODEL)
  WORKOUT_MODEL           Model override
  PDFIUM_LIB_PATH         Directory containing libpdfium
  RUST_LOG                Log filter, e.g. workout_extract=debug
"#;

/// Extract handwritten workout logs into CSV or XLSX using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "workout-extract",
    version,
    about = "Extract handwritten workout logs from PDFs and photos into CSV or XLSX",
    long_about = "Rasterise scanned PDFs or photos of handwritten workout logs, read each \
page with a Vision Language Model, and write one table per page with the columns \
Date, Muscle Group, Exercise, Set, Weight, Reps.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local files or HTTP/HTTPS URLs, processed in the order given.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// How to read every input: auto, pdf or image.
    #[arg(long, env = "WORKOUT_FILE_TYPE", value_enum, default_value = "auto")]
    file_type: FileTypeArg,

    /// Output table format.
    #[arg(short, long, env = "WORKOUT_FORMAT", value_enum, default_value = "csv")]
    format: FormatArg,

    /// Directory to write tables into.
    #[arg(short, long, env = "WORKOUT_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Run directory name under the output directory. Default: timestamp + random suffix.
    #[arg(long, env = "WORKOUT_SESSION", conflicts_with = "flat")]
    session: Option<String>,

    /// Write workout_<n> files directly into the output directory.
    #[arg(long, env = "WORKOUT_FLAT")]
    flat: bool,

    /// LLM model ID (e.g. gemini-2.0-flash, gpt-4.1-mini).
    #[arg(long, env = "WORKOUT_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, …
    #[arg(long, env = "WORKOUT_PROVIDER")]
    provider: Option<String>,

    /// Path to a text file replacing the built-in extraction prompt.
    #[arg(long, env = "WORKOUT_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Skip the JSON-only instruction and parse with the brace scan alone.
    #[arg(long, env = "WORKOUT_NO_STRICT_JSON")]
    no_strict_json: bool,

    /// Max model output tokens per image.
    #[arg(long, env = "WORKOUT_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Model temperature (0.0–2.0).
    #[arg(long, env = "WORKOUT_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per image on a failed model call.
    #[arg(long, env = "WORKOUT_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Base delay before the first retry, doubled on each further retry.
    #[arg(long, env = "WORKOUT_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Per-call model timeout in seconds. Default: none.
    #[arg(long, env = "WORKOUT_API_TIMEOUT")]
    api_timeout: Option<u64>,

    /// Longest edge of a rendered PDF page, in pixels.
    #[arg(long, env = "WORKOUT_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "WORKOUT_PDF_PASSWORD")]
    password: Option<String>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "WORKOUT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print the full batch result as JSON on stdout.
    #[arg(long, env = "WORKOUT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "WORKOUT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "WORKOUT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "WORKOUT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FileTypeArg {
    Auto,
    Pdf,
    Image,
}

impl From<FileTypeArg> for InputKind {
    fn from(v: FileTypeArg) -> Self {
        match v {
            FileTypeArg::Auto => InputKind::Auto,
            FileTypeArg::Pdf => InputKind::Pdf,
            FileTypeArg::Image => InputKind::Image,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Csv,
    Xlsx,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Csv => OutputFormat::Csv,
            FormatArg::Xlsx => OutputFormat::Xlsx,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // While the progress bar is up it is the user-facing surface; library
    // logs drop to errors only unless --verbose asks for more.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── Run extraction ───────────────────────────────────────────────────
    let output = extract_batch(&cli.inputs, &config)
        .await
        .context("Extraction failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        for image in &output.images {
            println!("{}", image.output_path.display());
        }
    }

    // Per-image failures are errors: --quiet does not hide them. With the
    // progress bar up they were already printed by the callback.
    if !show_progress {
        for line in failure_lines(&output) {
            eprintln!("{line}");
        }
    }

    if !cli.quiet {
        let stats = &output.stats;
        eprintln!(
            "{}  {}/{} images  {} rows  {}ms  →  {}",
            if stats.failed_images == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            stats.extracted_images,
            stats.total_images,
            stats.total_rows,
            stats.total_duration_ms,
            bold(&config.layout.directory(&config.output_dir).display().to_string()),
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&stats.total_input_tokens.to_string()),
            dim(&stats.total_output_tokens.to_string()),
        );
    }

    Ok(())
}

/// One line per image that fell back to a header-only table.
fn failure_lines(output: &BatchOutput) -> Vec<String> {
    output
        .errors()
        .map(|e| {
            let target = output
                .images
                .iter()
                .find(|i| i.index == e.image())
                .map(|i| format!("  (header only → {})", i.output_path.display()))
                .unwrap_or_default();
            format!("{} {}{}", red("✗"), e, dim(&target))
        })
        .collect()
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let layout = if cli.flat {
        OutputLayout::Flat
    } else if let Some(ref id) = cli.session {
        OutputLayout::Session(id.clone())
    } else {
        OutputLayout::new_session()
    };

    let mut builder = ExtractionConfig::builder()
        .input_kind(cli.file_type.into())
        .output_format(cli.format.into())
        .output_dir(cli.output_dir.clone())
        .layout(layout)
        .strict_json(!cli.no_strict_json)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .max_rendered_pixels(cli.max_pixels)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref path) = cli.prompt_file {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.prompt(prompt);
    }
    if let Some(secs) = cli.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[tokio::test]
    async fn flat_flag_selects_flat_layout() {
        let cli = Cli::parse_from(["workout-extract", "--flat", "--format", "xlsx", "a.pdf"]);
        let config = build_config(&cli, None).await.unwrap();
        assert_eq!(config.layout, OutputLayout::Flat);
        assert_eq!(config.output_format, OutputFormat::Xlsx);
        assert_eq!(config.api_timeout_secs, None);
    }

    #[tokio::test]
    async fn session_and_timeout_are_forwarded() {
        let cli = Cli::parse_from([
            "workout-extract",
            "--session",
            "monday",
            "--api-timeout",
            "45",
            "--file-type",
            "image",
            "a.jpg",
            "b.jpg",
        ]);
        let config = build_config(&cli, None).await.unwrap();
        assert_eq!(config.layout, OutputLayout::Session("monday".into()));
        assert_eq!(config.api_timeout_secs, Some(45));
        assert_eq!(config.input_kind, InputKind::Image);
        assert_eq!(cli.inputs, ["a.jpg", "b.jpg"]);
    }

    #[test]
    fn failures_are_listed_with_their_table() {
        use workout_extract::{BatchStats, ExtractionError, ImageResult, WorkoutRecord};

        let image = |index: usize, error: Option<ExtractionError>| ImageResult {
            index,
            source: PathBuf::from(format!("page_{index}.png")),
            output_path: PathBuf::from(format!("out/workout_{index}.csv")),
            record: WorkoutRecord::empty(),
            rows: 0,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
            error,
        };
        let output = BatchOutput {
            images: vec![
                image(1, None),
                image(
                    2,
                    Some(ExtractionError::ModelCallFailed {
                        image: 2,
                        retries: 0,
                        detail: "503 service unavailable".into(),
                    }),
                ),
            ],
            stats: BatchStats::default(),
        };

        let lines = failure_lines(&output);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("503 service unavailable"));
        assert!(lines[0].contains("out/workout_2.csv"));
    }
}
