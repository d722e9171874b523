//! CLI binary for edgequake-pdf2mcq.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `GenerationConfig` and prints the resulting quiz as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2mcq::{
    extract_only, write_json_file, DirPromptStore, DocumentReference, GenerationConfig, HttpPromptStore,
    MaxQuestions, Pipeline, PipelineProgressCallback, ProgressCallback, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner naming the current stage, with one
/// log line per finished stage and per degraded page.
struct CliProgressCallback {
    bar: ProgressBar,
    stage_started: std::sync::Mutex<Option<Instant>>,
    page_errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("pdf2mcq");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            stage_started: std::sync::Mutex::new(None),
            page_errors: AtomicUsize::new(0),
        })
    }

    /// Clear the spinner after a failed run so the error prints cleanly.
    fn abandon(&self) {
        self.bar.finish_and_clear();
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        if let Ok(mut started) = self.stage_started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_stage_complete(&self, stage: Stage) {
        let elapsed_ms = self
            .stage_started
            .lock()
            .ok()
            .and_then(|mut s| s.take())
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        self.bar.println(format!(
            "  {} {:<22} {}",
            green("✓"),
            stage.label(),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        self.page_errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
        ));
    }

    fn on_pipeline_complete(&self, item_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.page_errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!("{} {} questions generated", green("✔"), bold(&item_count.to_string()));
        } else {
            eprintln!(
                "{} {} questions generated  ({} pages without text)",
                green("✔"),
                bold(&item_count.to_string()),
                red(&failed.to_string()),
            );
        }
    }
}

/// Read both here and by the library's provider auto-detection.
const PROVIDER_ENV: &str = "EDGEQUAKE_LLM_PROVIDER";

const AFTER_HELP: &str = r#"EXAMPLES:
  # Five questions from a local file (JSON on stdout)
  pdf2mcq -n 5 lecture.pdf

  # From S3, written to a file
  pdf2mcq s3://lectures/cardiology/heart.pdf -o heart-quiz.json

  # From an S3-compatible service (MinIO, LocalStack)
  pdf2mcq --s3-endpoint http://localhost:9000 s3://docs/report.pdf

  # PDF bytes on stdin
  curl -s https://example.com/paper.pdf | pdf2mcq -

  # Templates from a directory, custom variable names
  pdf2mcq --prompt-dir ./prompts --prompt biology --aliases passage,source notes.pdf

  # Check what text the model would see (no API key needed)
  pdf2mcq --extract-only scanned.pdf

OUTPUT FORMAT:
  {"items": [{"question": "...", "options": ["a", "b", "c", "d"],
              "correct_index": 0, "explanation": "..."}]}
  1 to 10 items; each with exactly 4 options and correct_index in 0..=3.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_REGION, AWS_PROFILE
                          Credentials for s3:// references
  A .env file in the working directory is loaded when present.
"#;

/// Generate multiple-choice quizzes from PDF documents using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2mcq",
    version,
    about = "Generate validated multiple-choice quizzes from PDF documents",
    long_about = "Extract the text of a PDF (local file, s3://bucket/key object, or stdin) and ask \
a language model for a quiz that is validated against a strict schema: 1 to 10 questions, \
4 options each, one correct answer. Supports OpenAI, Anthropic, Google Gemini, Azure OpenAI, \
and any OpenAI-compatible endpoint (Ollama, vLLM, LiteLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF path, scheme://bucket/key URI, or `-` for stdin.
    input: String,

    /// Maximum number of questions to ask for (1–10).
    #[arg(short = 'n', long, env = "PDF2MCQ_MAX_QUESTIONS",
          value_parser = clap::value_parser!(u32).range(1..=10))]
    max_questions: Option<u32>,

    /// Write JSON to this file instead of stdout.
    #[arg(short, long, env = "PDF2MCQ_OUTPUT")]
    output: Option<PathBuf>,

    /// Name of the prompt template.
    #[arg(long, env = "PDF2MCQ_PROMPT", default_value = "mcq-generator")]
    prompt: String,

    /// Load templates from <DIR>/<NAME>.txt or <DIR>/<NAME>.md.
    #[arg(long, env = "PDF2MCQ_PROMPT_DIR", conflicts_with = "prompt_url")]
    prompt_dir: Option<PathBuf>,

    /// Load templates from <URL>/<NAME> over HTTP(S).
    #[arg(long, env = "PDF2MCQ_PROMPT_URL")]
    prompt_url: Option<String>,

    /// Bearer token for --prompt-url.
    #[arg(long, env = "PDF2MCQ_PROMPT_API_KEY", requires = "prompt_url", hide_env_values = true)]
    prompt_api_key: Option<String>,

    /// Timeout for --prompt-url requests, in seconds.
    #[arg(long, env = "PDF2MCQ_PROMPT_TIMEOUT", default_value_t = 30)]
    prompt_timeout: u64,

    /// Comma-separated variable names the document text is bound under.
    #[arg(long, env = "PDF2MCQ_ALIASES", value_delimiter = ',',
          default_value = "document,context,text,content")]
    aliases: Vec<String>,

    /// Warn instead of failing when the template uses none of the aliases.
    #[arg(long, env = "PDF2MCQ_LENIENT_ALIASES")]
    lenient_aliases: bool,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = PROVIDER_ENV,
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Path to a text file with custom structured-output instructions ({schema} is substituted).
    #[arg(long, env = "PDF2MCQ_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2MCQ_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Max LLM output tokens.
    #[arg(long, env = "PDF2MCQ_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Replies to request before giving up on schema-valid JSON.
    #[arg(long, env = "PDF2MCQ_STRUCTURED_ATTEMPTS", default_value_t = 2,
          value_parser = clap::value_parser!(u32).range(1..))]
    structured_attempts: u32,

    /// Custom S3 endpoint URL (path-style addressing).
    #[arg(long, env = "PDF2MCQ_S3_ENDPOINT")]
    s3_endpoint: Option<String>,

    /// Print the extracted text only; no LLM call.
    #[arg(long)]
    extract_only: bool,

    /// Print single-line JSON on stdout instead of pretty JSON.
    #[arg(long, env = "PDF2MCQ_COMPACT")]
    compact: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "PDF2MCQ_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2MCQ_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2MCQ_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the spinner is active;
    // the spinner provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.extract_only;
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

    let reference = read_reference(&cli.input).await?;

    let progress = if show_progress {
        Some(CliProgressCallback::new())
    } else {
        None
    };
    let config = build_config(
        &cli,
        progress.clone().map(|cb| cb as Arc<dyn PipelineProgressCallback>),
    )
    .await?;

    // ── Extract-only mode ────────────────────────────────────────────────
    if cli.extract_only {
        let report = extract_only(reference, &config)
            .await
            .context("Text extraction failed")?;

        println!("{}", report.text);
        if !cli.quiet {
            eprintln!(
                "{} chars from {} pages{}",
                report.text.as_str().len(),
                report.page_count,
                if report.text.is_sentinel() { " (no extractable text)" } else { "" }
            );
            for e in &report.page_errors {
                eprintln!("  {} {}", red("✗"), e);
            }
        }
        return Ok(());
    }

    // ── Run generation ───────────────────────────────────────────────────
    let outcome = run(&cli, reference, &config).await;
    if outcome.is_err() {
        if let Some(ref cb) = progress {
            cb.abandon();
        }
    }
    outcome
}

async fn run(cli: &Cli, reference: DocumentReference, config: &GenerationConfig) -> Result<()> {
    let start = Instant::now();
    let pipeline = Pipeline::new(config).context("Failed to set up the generation pipeline")?;
    let max_questions = match cli.max_questions {
        Some(n) => MaxQuestions::new(n)?,
        None => pipeline.default_max_questions(),
    };

    let quiz = pipeline
        .run(reference, max_questions)
        .await
        .context("Quiz generation failed")?;

    if let Some(ref output_path) = cli.output {
        write_json_file(output_path, &quiz)
            .await
            .context("Failed to write output")?;
        if !cli.quiet {
            eprintln!(
                "{}  {} questions  {}ms  →  {}",
                green("✔"),
                quiz.len(),
                start.elapsed().as_millis(),
                bold(&output_path.display().to_string()),
            );
        }
    } else {
        let json = if cli.compact {
            serde_json::to_string(&quiz).context("Failed to serialise output")?
        } else {
            quiz.to_json_pretty()
        };
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{json}").context("Failed to write to stdout")?;
    }

    Ok(())
}

/// `-` reads PDF bytes from stdin; anything else goes through `DocumentReference::parse`.
async fn read_reference(input: &str) -> Result<DocumentReference> {
    if input == "-" {
        let mut bytes = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut bytes)
            .await
            .context("Failed to read PDF from stdin")?;
        return Ok(DocumentReference::bytes(bytes));
    }
    Ok(DocumentReference::parse(input)?)
}

/// Map CLI args to `GenerationConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<GenerationConfig> {
    let mut builder = GenerationConfig::builder()
        .prompt_name(&cli.prompt)
        .document_aliases(cli.aliases.iter().map(|a| a.trim().to_string()))
        .strict_aliases(!cli.lenient_aliases)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .structured_attempts(cli.structured_attempts);

    if let Some(ref path) = cli.system_prompt {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(text);
    }
    if let Some(ref dir) = cli.prompt_dir {
        builder = builder.prompt_store(Arc::new(DirPromptStore::new(dir)));
    }
    if let Some(ref url) = cli.prompt_url {
        let store = HttpPromptStore::new(url.as_str(), cli.prompt_api_key.clone(), cli.prompt_timeout)?;
        builder = builder.prompt_store(Arc::new(store));
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref endpoint) = cli.s3_endpoint {
        builder = builder.s3_endpoint(endpoint);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn env_of(arg: &str) -> Option<String> {
        Cli::command()
            .get_arguments()
            .find(|a| a.get_id() == arg)
            .and_then(|a| a.get_env())
            .map(|e| e.to_string_lossy().into_owned())
    }

    #[test]
    fn provider_flag_reads_the_documented_variable() {
        assert_eq!(env_of("provider").as_deref(), Some(PROVIDER_ENV));
        assert!(AFTER_HELP.contains(PROVIDER_ENV));
        assert_eq!(env_of("model").as_deref(), Some("EDGEQUAKE_MODEL"));
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
