//! CLI binary for homework-ocr.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use homework_ocr::{
    extract, extract_stream, extract_to_file, EngineKind, ExtractionConfig,
    ExtractionProgressCallback, ExtractionRequest, Language, ProgressCallback, TuningConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner showing the engine currently running
/// plus one log line per engine result.
struct CliProgressCallback {
    bar: ProgressBar,
    images_done: AtomicUsize,
    total_images: usize,
}

impl CliProgressCallback {
    fn new(total_images: usize) -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix(format!("0/{total_images}"));
        bar.set_message("Validating…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            images_done: AtomicUsize::new(0),
            total_images,
        })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, image_path: &Path) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&image_path.display().to_string())
        ));
    }

    fn on_engine_start(&self, engine: &str, position: usize, total: usize) {
        self.bar
            .set_message(format!("engine {position}/{total}: {engine}"));
    }

    fn on_engine_complete(&self, engine: &str, chars: usize, accepted: bool) {
        let verdict = if accepted {
            green("accepted")
        } else {
            dim("below threshold")
        };
        self.bar.println(format!(
            "  {} {:<13} {}  {}",
            if accepted { green("✓") } else { cyan("·") },
            engine,
            dim(&format!("{chars:>5} chars")),
            verdict,
        ));
    }

    fn on_engine_error(&self, engine: &str, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {:<13} {}", red("✗"), engine, red(&msg)));
    }

    fn on_extraction_complete(&self, winner: &str, chars: usize) {
        let done = self.images_done.fetch_add(1, Ordering::SeqCst) + 1;
        self.bar.set_prefix(format!("{done}/{}", self.total_images));
        let line = if chars == 0 {
            format!("  {} no text found", red("✘"))
        } else {
            format!("  {} {} chars via {}", green("✔"), bold(&chars.to_string()), winner)
        };
        self.bar.println(line);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Transcribe one page (stdout)
  hwocr worksheet.jpg

  # Tamil page, text to a file
  hwocr --language ta page.png -o page.txt

  # A whole class set, one .txt per image
  hwocr scans/*.jpg -o transcripts/ -c 4

  # Only the local engines, printed text first
  hwocr --engines printed-text,handwriting notes.jpg

  # Structured output
  hwocr --json page.jpg > page.json

ENGINES (default order):
  math          vision LLM via edgequake-llm; LaTeX for formulae
  handwriting   local Ollama vision model (default llama3.2-vision)
  printed-text  tesseract, four page-segmentation modes

  The first engine whose cleaned text reaches --min-accept-length characters
  wins; otherwise the longest text wins. An engine that is missing, fails or
  times out is skipped.

TUNING FILE (--tuning):
  {
    "min_accept_length": 10,
    "engine_priority_order": ["math", "handwriting", "printed-text"],
    "language_code_map": { "printed-text": { "ta": "tam+eng" } }
  }

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (math engine)
  ANTHROPIC_API_KEY       Anthropic API key (math engine)
  GEMINI_API_KEY          Google Gemini API key (math engine)
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Log filter, e.g. homework_ocr=debug
"#;

/// Transcribe homework photos and label their subject.
#[derive(Parser, Debug)]
#[command(
    name = "hwocr",
    version,
    about = "Transcribe homework photos with a fallback chain of OCR engines",
    long_about = "Transcribe photographed or scanned homework pages (English, Tamil, Hindi) \
by chaining a math-aware vision LLM, a local handwriting model and multi-mode tesseract, \
then label each page as math, science or language.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image files (jpg, jpeg, png, bmp, tiff).
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Page language: en, ta or hi.
    #[arg(short, long, env = "HWOCR_LANGUAGE", default_value = "en")]
    language: Language,

    /// Write text to this file (one image) or directory (several images).
    #[arg(short, long, env = "HWOCR_OUTPUT")]
    output: Option<PathBuf>,

    /// Engine order, comma separated: math,handwriting,printed-text.
    #[arg(long, env = "HWOCR_ENGINES", value_delimiter = ',')]
    engines: Option<Vec<EngineKind>>,

    /// Characters an engine must return to stop the chain.
    #[arg(long, env = "HWOCR_MIN_ACCEPT_LENGTH")]
    min_accept_length: Option<usize>,

    /// JSON tuning file (threshold, engine order, language codes).
    #[arg(long, env = "HWOCR_TUNING")]
    tuning: Option<PathBuf>,

    /// Per-engine timeout in seconds.
    #[arg(long, env = "HWOCR_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Number of images processed at once.
    #[arg(short, long, env = "HWOCR_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Vision model for the math engine (default gpt-4.1-nano).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider for the math engine: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Path to a text file containing a custom math-engine system prompt.
    #[arg(long, env = "HWOCR_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Retries per image on math-engine failure.
    #[arg(long, env = "HWOCR_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Ollama base URL for the handwriting engine.
    #[arg(long, env = "HWOCR_OLLAMA_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Ollama vision model for the handwriting engine.
    #[arg(long, env = "HWOCR_HANDWRITING_MODEL", default_value = "llama3.2-vision")]
    handwriting_model: String,

    /// Tesseract executable.
    #[arg(long, env = "HWOCR_TESSERACT", default_value = "tesseract")]
    tesseract: PathBuf,

    /// Directory containing tesseract *.traineddata files.
    #[arg(long, env = "HWOCR_TESSDATA_DIR")]
    tessdata_dir: Option<PathBuf>,

    /// Output structured JSON instead of plain text.
    #[arg(long, env = "HWOCR_JSON")]
    json: bool,

    /// Disable progress output.
    #[arg(long, env = "HWOCR_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "HWOCR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "HWOCR_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress display is active;
    // it already shows every engine result.
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

    let progress = show_progress.then(|| CliProgressCallback::new(cli.images.len()));
    let config = build_config(
        &cli,
        progress
            .clone()
            .map(|cb| cb as Arc<dyn ExtractionProgressCallback>),
    )
    .await?;

    let result = if cli.images.len() == 1 {
        run_single(&cli, &cli.images[0], &config).await
    } else {
        run_many(&cli, &config).await
    };

    if let Some(cb) = progress {
        cb.finish();
    }
    result
}

async fn run_single(cli: &Cli, image: &Path, config: &ExtractionConfig) -> Result<()> {
    let outcome = match cli.output {
        Some(ref out) => extract_to_file(image, cli.language, out, config).await,
        None => extract(image, cli.language, config).await,
    }
    .with_context(|| format!("Extraction failed for {}", image.display()))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&outcome).context("Failed to serialise output")?;
        println!("{json}");
    } else if cli.output.is_none() {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(outcome.text.as_bytes())
            .context("Failed to write to stdout")?;
        if !outcome.text.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet {
        eprintln!(
            "{}  {} chars  subject {}  via {}  {}ms",
            if outcome.is_empty() { red("✘") } else { green("✔") },
            outcome.text.chars().count(),
            bold(outcome.subject.as_str()),
            outcome.winning_engine,
            outcome.stats.total_duration_ms,
        );
        if let Some(ref out) = cli.output {
            eprintln!("   →  {}", bold(&out.display().to_string()));
        }
    }
    Ok(())
}

async fn run_many(cli: &Cli, config: &ExtractionConfig) -> Result<()> {
    if let Some(ref dir) = cli.output {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    }

    let requests: Vec<ExtractionRequest> = cli
        .images
        .iter()
        .map(|p| ExtractionRequest::new(p, cli.language))
        .collect();

    let mut stream = extract_stream(requests, config);
    let mut json_items = Vec::new();
    let mut failed = 0usize;

    while let Some((path, result)) = stream.next().await {
        match result {
            Ok(outcome) => {
                if let Some(ref dir) = cli.output {
                    let stem = path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "page".to_string());
                    let target = dir.join(format!("{stem}.txt"));
                    tokio::fs::write(&target, &outcome.text)
                        .await
                        .with_context(|| format!("Failed to write {}", target.display()))?;
                }
                if cli.json {
                    json_items.push(serde_json::json!({ "path": path, "outcome": outcome }));
                } else if cli.output.is_none() {
                    println!(
                        "== {} [{} via {}] ==\n{}\n",
                        path.display(),
                        outcome.subject,
                        outcome.winning_engine,
                        outcome.text
                    );
                }
            }
            Err(e) => {
                failed += 1;
                if cli.json {
                    json_items.push(serde_json::json!({ "path": path, "error": e.to_string() }));
                }
                eprintln!("{} {}: {}", red("✗"), path.display(), e);
            }
        }
    }

    if cli.json {
        let json =
            serde_json::to_string_pretty(&json_items).context("Failed to serialise output")?;
        println!("{json}");
    }

    let total = cli.images.len();
    if !cli.quiet {
        eprintln!(
            "{} {}/{} images extracted",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&(total - failed).to_string()),
            total
        );
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {total} image(s) could not be read");
    }
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
///
/// A tuning file is applied first so explicit flags override it.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let mut builder = ExtractionConfig::builder();

    if let Some(ref path) = cli.tuning {
        let tuning = TuningConfig::from_file(path)
            .with_context(|| format!("Failed to load tuning file {}", path.display()))?;
        builder = builder.tuning(tuning);
    }
    if let Some(ref engines) = cli.engines {
        builder = builder.engine_priority(engines.clone());
    }
    if let Some(n) = cli.min_accept_length {
        builder = builder.min_accept_length(n);
    }

    builder = builder
        .engine_timeout(Duration::from_secs(cli.timeout))
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .ollama_url(cli.ollama_url.clone())
        .handwriting_model(cli.handwriting_model.clone())
        .tesseract_path(cli.tesseract.clone());

    if let Some(ref model) = cli.model {
        builder = builder.math_model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.math_provider_name(provider.clone());
    }
    if let Some(prompt) = system_prompt {
        builder = builder.math_system_prompt(prompt);
    }
    if let Some(ref dir) = cli.tessdata_dir {
        builder = builder.tessdata_dir(dir.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
