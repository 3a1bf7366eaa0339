//! Configuration for the extraction pipeline.
//!
//! Everything the original process kept as module-level constants (directory
//! layout, CSV paths, model identifiers, chunk budget, retry tiers) lives in
//! one [`ExtractionConfig`] passed into the pipeline, built via
//! [`ExtractionConfigBuilder`]. One struct makes it trivial to share a run's
//! settings across worker tasks and to diff two runs when their outputs
//! differ.

use crate::error::ExtractError;
use crate::llm::ChatModel;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for one batch invocation of the pipeline.
///
/// Built via [`ExtractionConfig::builder()`] or [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use datasheet_extract::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .input_dir("documents")
///     .chunk_words(800)
///     .concurrency(8)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    // ── Directory layout ─────────────────────────────────────────────────
    /// Directory scanned for `*.pdf` inputs. Default: `documents`.
    pub input_dir: PathBuf,
    /// Cache of converted markdown, one `<stem>.md` per PDF. A cached file
    /// skips the conversion collaborator entirely on reruns. Default: `markdown`.
    pub markdown_dir: PathBuf,
    /// Terminal directory for successfully extracted documents. Presence of a
    /// same-named file here doubles as the "do not reprocess" marker.
    pub processed_dir: PathBuf,
    /// Terminal directory for screened-out documents.
    pub skipped_dir: PathBuf,
    /// Terminal directory for documents that yielded zero items.
    pub failed_dir: PathBuf,
    /// Per-document metadata snapshots (`<title>_metadata.json`).
    pub metadata_dir: PathBuf,

    // ── Output files ─────────────────────────────────────────────────────
    /// Raw extracted items, one row per item. Default: `extracted_items.csv`.
    pub items_csv: PathBuf,
    /// Canonical (deduplicated) records. Default: `extracted_validated_items.csv`.
    pub validated_csv: PathBuf,
    /// One row per screened-out document. Default: `skipped_components.csv`.
    pub skipped_csv: PathBuf,
    /// One row per extraction-exhausted document. Default: `failed_extractions.csv`.
    pub failed_csv: PathBuf,
    /// Conversion/transport failures (document left in place). Default: `failed_pdfs.csv`.
    pub failure_log: PathBuf,

    // ── Models ───────────────────────────────────────────────────────────
    /// Main (per-chunk extraction) model identifier. If `None`, the provider
    /// default is used.
    pub model: Option<String>,
    /// Main provider name (e.g. "openai", "groq"). If `None` along with
    /// `chat_model`, the provider is auto-detected from the environment.
    pub provider_name: Option<String>,
    /// Pre-constructed main model. Takes precedence over `provider_name`.
    pub chat_model: Option<Arc<dyn ChatModel>>,
    /// Anchor (screening/classification) model identifier. Default: `gpt-4o`.
    pub anchor_model: Option<String>,
    /// Anchor provider name. Falls back to the main provider chain when unset.
    pub anchor_provider_name: Option<String>,
    /// Pre-constructed anchor model. Takes precedence over `anchor_provider_name`.
    pub anchor_chat_model: Option<Arc<dyn ChatModel>>,

    // ── Pipeline knobs ───────────────────────────────────────────────────
    /// Word budget per chunk. A single section exceeding the budget is
    /// emitted whole as one oversized chunk. Default: 1000.
    pub chunk_words: usize,
    /// Lines of converted markdown fed to the anchor prompt. Default: 100.
    pub anchor_excerpt_lines: usize,
    /// Maximum candidate chunks kept after scoring on attempt 1. Default: 8.
    pub max_candidate_chunks: usize,
    /// Minimum relevance score for a chunk to survive attempt-1 filtering.
    /// Scores are integers: 2 per keyword/component hit, 1 per title-prefix
    /// occurrence. Default: 2.
    pub min_chunk_score: i64,
    /// Attempt tiers: 1 = table-focused only, 2 = add the full-document
    /// retry. Default: 2.
    pub max_attempts: u8,
    /// Documents whose reported page count exceeds this are skipped before
    /// any model call. `None` disables the ceiling. Default: `None`.
    ///
    /// Only engages when the converter reports a page count. A markdown-cache
    /// hit reports none, so a rerun served from the cache bypasses this check
    /// (the document was already under the ceiling when first converted, or
    /// the cache was seeded externally).
    pub max_pages: Option<usize>,

    // ── Model call parameters ────────────────────────────────────────────
    /// Sampling temperature. 0.0 keeps extraction deterministic so the two
    /// attempt tiers are reproducible. Default: 0.0.
    pub temperature: f32,
    /// Maximum tokens the model may generate per call. Default: 4096.
    pub max_tokens: usize,

    // ── Execution ────────────────────────────────────────────────────────
    /// Documents processed concurrently. Each document is itself strictly
    /// sequential. Default: 4.
    pub concurrency: usize,
    /// Upper bound on driver-loop steps per document. In practice the retry
    /// tier cap bounds the loop; this is the hard stop. Default: 512.
    pub max_steps: usize,
    /// At most this many pending documents per invocation. `None` = all.
    pub file_limit: Option<usize>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("documents"),
            markdown_dir: PathBuf::from("markdown"),
            processed_dir: PathBuf::from("processed"),
            skipped_dir: PathBuf::from("skipped"),
            failed_dir: PathBuf::from("failed"),
            metadata_dir: PathBuf::from("metadata"),
            items_csv: PathBuf::from("extracted_items.csv"),
            validated_csv: PathBuf::from("extracted_validated_items.csv"),
            skipped_csv: PathBuf::from("skipped_components.csv"),
            failed_csv: PathBuf::from("failed_extractions.csv"),
            failure_log: PathBuf::from("failed_pdfs.csv"),
            model: None,
            provider_name: None,
            chat_model: None,
            anchor_model: Some("gpt-4o".into()),
            anchor_provider_name: None,
            anchor_chat_model: None,
            chunk_words: 1000,
            anchor_excerpt_lines: 100,
            max_candidate_chunks: 8,
            min_chunk_score: 2,
            max_attempts: 2,
            max_pages: None,
            temperature: 0.0,
            max_tokens: 4096,
            concurrency: 4,
            max_steps: 512,
            file_limit: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("input_dir", &self.input_dir)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("chat_model", &self.chat_model.as_ref().map(|_| "<dyn ChatModel>"))
            .field("anchor_model", &self.anchor_model)
            .field("anchor_provider_name", &self.anchor_provider_name)
            .field(
                "anchor_chat_model",
                &self.anchor_chat_model.as_ref().map(|_| "<dyn ChatModel>"),
            )
            .field("chunk_words", &self.chunk_words)
            .field("anchor_excerpt_lines", &self.anchor_excerpt_lines)
            .field("max_candidate_chunks", &self.max_candidate_chunks)
            .field("min_chunk_score", &self.min_chunk_score)
            .field("max_attempts", &self.max_attempts)
            .field("max_pages", &self.max_pages)
            .field("temperature", &self.temperature)
            .field("concurrency", &self.concurrency)
            .field("file_limit", &self.file_limit)
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

    /// The three terminal directories, in the order they are consulted for
    /// the "already processed" precondition.
    pub fn terminal_dirs(&self) -> [&PathBuf; 3] {
        [&self.processed_dir, &self.skipped_dir, &self.failed_dir]
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    /// Place every derived directory and CSV under `root`, keeping the
    /// default names. Convenient for the CLI's `--output-dir`.
    pub fn output_root(mut self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        self.config.markdown_dir = root.join("markdown");
        self.config.processed_dir = root.join("processed");
        self.config.skipped_dir = root.join("skipped");
        self.config.failed_dir = root.join("failed");
        self.config.metadata_dir = root.join("metadata");
        self.config.items_csv = root.join("extracted_items.csv");
        self.config.validated_csv = root.join("extracted_validated_items.csv");
        self.config.skipped_csv = root.join("skipped_components.csv");
        self.config.failed_csv = root.join("failed_extractions.csv");
        self.config.failure_log = root.join("failed_pdfs.csv");
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

    pub fn chat_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.config.chat_model = Some(model);
        self
    }

    pub fn anchor_model(mut self, model: impl Into<String>) -> Self {
        self.config.anchor_model = Some(model.into());
        self
    }

    pub fn anchor_provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.anchor_provider_name = Some(name.into());
        self
    }

    pub fn anchor_chat_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.config.anchor_chat_model = Some(model);
        self
    }

    pub fn chunk_words(mut self, n: usize) -> Self {
        self.config.chunk_words = n.max(50);
        self
    }

    pub fn anchor_excerpt_lines(mut self, n: usize) -> Self {
        self.config.anchor_excerpt_lines = n.max(1);
        self
    }

    pub fn max_candidate_chunks(mut self, n: usize) -> Self {
        self.config.max_candidate_chunks = n.max(1);
        self
    }

    pub fn min_chunk_score(mut self, score: i64) -> Self {
        self.config.min_chunk_score = score;
        self
    }

    pub fn max_attempts(mut self, n: u8) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn max_pages(mut self, ceiling: Option<usize>) -> Self {
        self.config.max_pages = ceiling;
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

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_steps(mut self, n: usize) -> Self {
        self.config.max_steps = n;
        self
    }

    pub fn file_limit(mut self, limit: Option<usize>) -> Self {
        self.config.file_limit = limit;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.chunk_words < 50 {
            return Err(ExtractError::InvalidConfig(format!(
                "chunk_words must be ≥ 50, got {}",
                c.chunk_words
            )));
        }
        if !(1..=2).contains(&c.max_attempts) {
            return Err(ExtractError::InvalidConfig(format!(
                "max_attempts must be 1 or 2, got {}",
                c.max_attempts
            )));
        }
        if c.concurrency == 0 {
            return Err(ExtractError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        if c.max_steps == 0 {
            return Err(ExtractError::InvalidConfig("max_steps must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_clamps_and_validates() {
        let cfg = ExtractionConfig::builder()
            .chunk_words(10) // clamped up to 50
            .concurrency(0) // clamped up to 1
            .build()
            .unwrap();
        assert_eq!(cfg.chunk_words, 50);
        assert_eq!(cfg.concurrency, 1);
    }

    #[test]
    fn rejects_three_attempt_tiers() {
        let mut cfg = ExtractionConfig::default();
        cfg.max_attempts = 3;
        let err = ExtractionConfigBuilder { config: cfg }.build().unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn output_root_rebases_paths() {
        let cfg = ExtractionConfig::builder()
            .output_root("out")
            .build()
            .unwrap();
        assert_eq!(cfg.processed_dir, PathBuf::from("out/processed"));
        assert_eq!(cfg.items_csv, PathBuf::from("out/extracted_items.csv"));
    }
}
