//! # datasheet-extract
//!
//! Extract structured component records from electronic-component datasheet
//! PDFs using large language models.
//!
//! ## Why this crate?
//!
//! Datasheets bury the orderable facts — part numbers, top markings, package
//! cases — inside ordering tables, marking tables, and free-form prose whose
//! layout differs per manufacturer. No fixed parser survives that variety.
//! Instead this crate converts each PDF to Markdown, narrows the text to the
//! regions most likely to carry ordering data, and iterates a model over them
//! with a retry tier and a repair pass, until a deduplicated set of canonical
//! records comes out the other end.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Convert   PDF → Markdown (pluggable collaborator, cached on disk)
//!  ├─ 2. Screen    anchor model reads the opening excerpt: identity + skip flags
//!  ├─ 3. Select    table regions → word-budgeted chunks → relevance-scored top-k
//!  ├─ 4. Extract   model iterates chunks, carrying the full item list forward
//!  │               (malformed JSON gets one dedicated repair pass)
//!  ├─ 5. Route     zero items after attempt 1? re-chunk the whole document once
//!  └─ 6. Validate  merge partials per part number → canonical records → CSV
//! ```
//!
//! Control flow is an explicit state machine ([`machine`]); the driver loop
//! ([`run`]) performs effects and feeds events back through the pure
//! transition function. Every document lands in exactly one terminal
//! directory (`processed/`, `skipped/`, `failed/`), which doubles as the
//! idempotency marker for reruns.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use datasheet_extract::{run_directory, CommandConverter, ExtractionConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / GROQ_API_KEY / …
//!     let config = ExtractionConfig::builder()
//!         .input_dir("documents")
//!         .build()?;
//!     let converter = Arc::new(CommandConverter::new("pdf2md", ["--stdout"]));
//!     let summary = run_directory(&config, converter, None).await?;
//!     println!(
//!         "processed {} / skipped {} / failed {}",
//!         summary.processed, summary.skipped, summary.failed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `dsx` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! datasheet-extract = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod converter;
pub mod error;
pub mod llm;
pub mod machine;
pub mod model;
pub mod pipeline;
pub mod prompts;
pub mod run;
pub mod sink;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use converter::{CommandConverter, ConvertedDocument, MarkdownConverter};
pub use error::ExtractError;
pub use llm::{ChatModel, EdgequakeChat};
pub use model::{
    Anchor, CanonicalRecord, Chunk, Confidence, DocumentReport, ExtractionItem, FailReason,
    Outcome, RunSummary, SkipReason,
};
pub use run::{process_document, run_directory, DocumentStatus, PipelineHandles, ProgressHook};
