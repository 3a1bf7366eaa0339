//! CLI binary for datasheet-extract.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig` and renders batch progress.

use anyhow::{Context, Result};
use clap::Parser;
use datasheet_extract::{
    run_directory, CommandConverter, DocumentStatus, ExtractionConfig, Outcome, ProgressHook,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
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
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process every pending PDF in ./documents
  dsx

  # Explicit directories and a file cap
  dsx --input-dir datasheets --output-dir out --limit 25

  # Specific models for extraction and screening
  dsx --model llama-3.3-70b-versatile --provider groq --anchor-model gpt-4o

  # Custom converter command (PDF path is appended as the last argument)
  dsx --converter marker_single --converter-arg --output_format --converter-arg markdown

  # Skip documents over 20 pages
  dsx --max-pages 20

OUTPUTS (under --output-dir):
  extracted_items.csv             one row per raw extracted item
  extracted_validated_items.csv   one row per canonical (deduplicated) record
  skipped_components.csv          screened-out documents with the reason
  failed_extractions.csv          documents that yielded zero items
  failed_pdfs.csv                 conversion/transport failures (retried next run)
  markdown/                       conversion cache, one .md per PDF
  metadata/                       per-document extraction snapshots
  processed/ skipped/ failed/     terminal directories; presence of a file
                                  here marks the document done (idempotency)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY      OpenAI API key
  ANTHROPIC_API_KEY   Anthropic API key
  GROQ_API_KEY        Groq API key
  GEMINI_API_KEY      Google Gemini API key
  DSX_LLM_PROVIDER    Override provider (openai, anthropic, groq, gemini, ollama)
  DSX_MODEL           Override model ID

SETUP:
  1. Set API key:   export GROQ_API_KEY=gsk-...
  2. Run:           dsx --input-dir documents
"#;

/// Extract structured component records from datasheet PDFs using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "dsx",
    version,
    about = "Extract structured component records from datasheet PDFs using LLMs",
    long_about = "Batch-process a directory of electronic-component datasheet PDFs: convert each \
to Markdown, screen out off-domain documents, and extract part numbers, top markings, package \
cases and descriptions into append-only CSVs. Safe to interrupt and re-run; finished documents \
are never reprocessed.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory scanned for *.pdf inputs.
    #[arg(short, long, env = "DSX_INPUT_DIR", default_value = "documents")]
    input_dir: PathBuf,

    /// Root for all outputs (CSVs, markdown cache, terminal directories).
    #[arg(short, long, env = "DSX_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Extraction model ID (e.g. gpt-4.1-mini, llama-3.3-70b-versatile).
    #[arg(long, env = "DSX_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, groq, gemini, ollama.
    #[arg(
        long,
        env = "DSX_LLM_PROVIDER",
        long_help = "LLM provider for extraction. Auto-detected from API key env vars if not set."
    )]
    provider: Option<String>,

    /// Screening/classification model ID.
    #[arg(long, env = "DSX_ANCHOR_MODEL", default_value = "gpt-4o")]
    anchor_model: String,

    /// Provider for the screening model (defaults to --provider).
    #[arg(long, env = "DSX_ANCHOR_PROVIDER")]
    anchor_provider: Option<String>,

    /// Conversion command; the PDF path is appended as the last argument and
    /// markdown is read from its stdout.
    #[arg(long, env = "DSX_CONVERTER", default_value = "pdf2md")]
    converter: String,

    /// Extra argument passed to the conversion command (repeatable).
    #[arg(long = "converter-arg")]
    converter_args: Vec<String>,

    /// Word budget per chunk.
    #[arg(long, env = "DSX_CHUNK_WORDS", default_value_t = 1000)]
    chunk_words: usize,

    /// Candidate chunks kept after relevance scoring on the first attempt.
    #[arg(long, env = "DSX_MAX_CHUNKS", default_value_t = 8)]
    max_chunks: usize,

    /// Minimum relevance score for a chunk to survive first-attempt filtering.
    #[arg(long, env = "DSX_MIN_SCORE", default_value_t = 2)]
    min_score: i64,

    /// Retry tiers: 1 = table-focused only, 2 = add the full-document retry.
    #[arg(long, env = "DSX_MAX_ATTEMPTS", default_value_t = 2,
          value_parser = clap::value_parser!(u8).range(1..=2))]
    max_attempts: u8,

    /// Skip documents whose reported page count exceeds this.
    #[arg(long, env = "DSX_MAX_PAGES")]
    max_pages: Option<usize>,

    /// Sampling temperature (0.0 keeps retry tiers reproducible).
    #[arg(long, env = "DSX_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max tokens the model may generate per call.
    #[arg(long, env = "DSX_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Documents processed concurrently.
    #[arg(short, long, env = "DSX_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Process at most this many pending documents.
    #[arg(short, long, env = "DSX_LIMIT")]
    limit: Option<usize>,

    /// Disable the progress bar.
    #[arg(long, env = "DSX_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DSX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DSX_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar and INFO-level logs fight over the terminal, so the
    // bar wins unless the user asked for verbosity.
    let show_progress = !cli.quiet && !cli.no_progress;
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

    let config = build_config(&cli).context("Invalid configuration")?;
    let converter = Arc::new(CommandConverter::new(
        cli.converter.clone(),
        cli.converter_args.clone(),
    ));

    // ── Progress bar ─────────────────────────────────────────────────────
    let bar = if show_progress {
        let pending = count_pdfs(&config.input_dir);
        let bar = ProgressBar::new(pending as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} documents  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Some(bar)
    } else {
        None
    };

    let hook: Option<ProgressHook> = bar.clone().map(|bar| {
        Arc::new(move |pdf: &std::path::Path, status: DocumentStatus<'_>| {
            let name = pdf
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match status {
                DocumentStatus::Finished(report) => {
                    let (mark, detail) = match &report.outcome {
                        Outcome::Processed { items, records } => (
                            green("✓"),
                            dim(&format!(
                                "{items} items → {records} records  {:.1}s",
                                report.duration_ms as f64 / 1000.0
                            )),
                        ),
                        Outcome::Skipped(reason) => (yellow("−"), dim(&reason.to_string())),
                        Outcome::Failed(reason) => (red("✗"), dim(&reason.to_string())),
                    };
                    bar.println(format!("  {mark} {name:<40} {detail}"));
                }
                DocumentStatus::AlreadyDone => {
                    bar.println(format!("  {} {name:<40} {}", dim("·"), dim("already done")));
                }
                DocumentStatus::Errored(e) => {
                    bar.println(format!("  {} {name:<40} {}", red("✗"), red(&e.to_string())));
                }
            }
            bar.inc(1);
        }) as ProgressHook
    });

    // ── Run the batch ────────────────────────────────────────────────────
    let summary = run_directory(&config, converter, hook)
        .await
        .context("Batch run failed")?;

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    if !cli.quiet {
        let mark = if summary.errors == 0 && summary.failed == 0 {
            green("✔")
        } else {
            yellow("⚠")
        };
        eprintln!(
            "{mark} {} documents: {} processed, {} skipped, {} failed, {} errored, {} already done",
            bold(&summary.total.to_string()),
            green(&summary.processed.to_string()),
            summary.skipped,
            summary.failed,
            if summary.errors > 0 {
                red(&summary.errors.to_string())
            } else {
                summary.errors.to_string()
            },
            dim(&summary.already_done.to_string()),
        );
        if summary.errors > 0 {
            eprintln!(
                "   errored documents were left in {} and will be retried next run",
                config.input_dir.display()
            );
        }
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .input_dir(&cli.input_dir)
        .output_root(&cli.output_dir)
        .anchor_model(&cli.anchor_model)
        .chunk_words(cli.chunk_words)
        .max_candidate_chunks(cli.max_chunks)
        .min_chunk_score(cli.min_score)
        .max_attempts(cli.max_attempts)
        .max_pages(cli.max_pages)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .concurrency(cli.concurrency)
        .file_limit(cli.limit);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref provider) = cli.anchor_provider {
        builder = builder.anchor_provider_name(provider);
    }

    Ok(builder.build()?)
}

/// Best-effort pending-document count for the progress bar length.
fn count_pdfs(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| {
                    e.path()
                        .extension()
                        .and_then(|x| x.to_str())
                        .is_some_and(|x| x.eq_ignore_ascii_case("pdf"))
                })
                .count()
        })
        .unwrap_or(0)
}
