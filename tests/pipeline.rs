//! End-to-end pipeline tests driven with a scripted model and a fixture
//! converter. No network, no real PDFs: each test lays out an input
//! directory in a tempdir, scripts the model responses, runs the batch, and
//! asserts on the CSVs and terminal directories left behind.

use async_trait::async_trait;
use datasheet_extract::{
    run_directory, ChatModel, ConvertedDocument, ExtractError, ExtractionConfig,
    ExtractionConfigBuilder, MarkdownConverter,
};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Test doubles ─────────────────────────────────────────────────────────────

/// Scripted model: pops one canned response per call, `"[]"` once the script
/// runs out. Counts calls so tests can assert a stage was (not) reached.
struct MockChat {
    responses: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl MockChat {
    fn scripted<const N: usize>(responses: [&str; N]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for MockChat {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "[]".to_string()))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// Converter returning fixed markdown, counting invocations.
struct FixtureConverter {
    markdown: String,
    page_count: Option<usize>,
    calls: AtomicUsize,
}

impl FixtureConverter {
    fn new(markdown: &str) -> Arc<Self> {
        Arc::new(Self {
            markdown: markdown.to_string(),
            page_count: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn with_pages(markdown: &str, pages: usize) -> Arc<Self> {
        Arc::new(Self {
            markdown: markdown.to_string(),
            page_count: Some(pages),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MarkdownConverter for FixtureConverter {
    fn convert(&self, _pdf: &Path) -> Result<ConvertedDocument, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ConvertedDocument {
            markdown: self.markdown.clone(),
            page_count: self.page_count,
        })
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

const ANCHOR_OK: &str = r#"[{"component": ["MMBT3906"],
    "description": "40 V PNP switching transistor",
    "package_case": "SOT-23",
    "is_chip_component": false,
    "is_through_hole": false,
    "explanation": ""}]"#;

const ANCHOR_CHIP: &str = r#"[{"component": ["RC0402FR-0710KL"],
    "description": "thick film chip resistor",
    "package_case": "0402",
    "is_chip_component": true,
    "is_through_hole": false,
    "explanation": "Component is described as a chip resistor"}]"#;

const DATASHEET_MD: &str = "\
# MMBT3906

40 V, 200 mA PNP switching transistor in a SOT-23 package.

## Ordering information

| Part numbers | Top marking | Package |
|--------------|-------------|---------|
| MMBT3906     | 2A          | SOT-23  |
| MMBT3906W    | 2AW         | SOT-323 |
";

fn workspace() -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("documents");
    let out = tmp.path().join("out");
    fs::create_dir_all(&input).unwrap();
    (tmp, input, out)
}

fn add_pdf(input: &Path, name: &str) -> PathBuf {
    let path = input.join(name);
    fs::write(&path, b"%PDF-1.4 fake").unwrap();
    path
}

fn base_config(
    input: &Path,
    out: &Path,
    main: Arc<MockChat>,
    anchor: Arc<MockChat>,
) -> ExtractionConfigBuilder {
    ExtractionConfig::builder()
        .input_dir(input)
        .output_root(out)
        .chat_model(main)
        .anchor_chat_model(anchor)
        .concurrency(1)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn table_document_is_extracted_merged_and_archived() {
    let (_tmp, input, out) = workspace();
    add_pdf(&input, "mmbt3906.pdf");

    let anchor = MockChat::scripted([ANCHOR_OK]);
    // Two partial rows for the same part plus a distinct variant: the merge
    // must union markings per mpn and keep the variant separate.
    let main = MockChat::scripted([r#"[
        {"mpn": "MMBT3906", "top_marking": "2A", "package_case": "SOT-23",
         "description": "PNP switching transistor", "confidence": "high"},
        {"mpn": "MMBT3906", "top_marking": "2A-", "package_case": "SOT-23",
         "description": "", "confidence": "high"},
        {"mpn": "MMBT3906W", "top_marking": "2AW", "package_case": "SOT-323",
         "description": "", "confidence": "medium"}
    ]"#]);
    let config = base_config(&input, &out, main.clone(), anchor.clone())
        .build()
        .unwrap();
    let converter = FixtureConverter::new(DATASHEET_MD);

    let summary = run_directory(&config, converter.clone(), None).await.unwrap();

    assert_eq!(summary.total, 1);
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(anchor.calls(), 1);
    assert_eq!(converter.calls(), 1);

    // Document moved to the processed terminal directory.
    assert!(out.join("processed/mmbt3906.pdf").exists());
    assert!(!input.join("mmbt3906.pdf").exists());

    // Raw items carry the source stamp.
    let items = fs::read_to_string(out.join("extracted_items.csv")).unwrap();
    assert!(items.contains("MMBT3906,2A,SOT-23"), "got: {items}");
    assert!(items.contains("mmbt3906.pdf"));

    // Validated output: one row per unique mpn, markings unioned.
    let validated = fs::read_to_string(out.join("extracted_validated_items.csv")).unwrap();
    let data_rows: Vec<&str> = validated.lines().skip(1).collect();
    assert_eq!(data_rows.len(), 2, "got: {validated}");
    assert!(validated.contains("\"2A, 2A-\""), "got: {validated}");
    assert!(validated.contains("MMBT3906W"));

    // Markdown cache and metadata snapshot written.
    assert!(out.join("markdown/mmbt3906.md").exists());
    assert!(out.join("metadata/mmbt3906_metadata.json").exists());
}

#[tokio::test]
async fn chip_component_skips_without_any_extraction_call() {
    let (_tmp, input, out) = workspace();
    add_pdf(&input, "rc0402.pdf");

    let anchor = MockChat::scripted([ANCHOR_CHIP]);
    let main = MockChat::scripted([]);
    let config = base_config(&input, &out, main.clone(), anchor)
        .build()
        .unwrap();

    let summary = run_directory(&config, FixtureConverter::new(DATASHEET_MD), None)
        .await
        .unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(main.calls(), 0, "extraction model must never be reached");
    assert!(out.join("skipped/rc0402.pdf").exists());

    let skipped = fs::read_to_string(out.join("skipped_components.csv")).unwrap();
    assert!(skipped.contains("classified as chip component"), "got: {skipped}");
    assert!(skipped.contains("RC0402FR-0710KL"));
    // No item CSVs for a skipped document.
    assert!(!out.join("extracted_items.csv").exists());
}

#[tokio::test]
async fn items_survive_an_empty_and_a_malformed_chunk() {
    let (_tmp, input, out) = workspace();
    add_pdf(&input, "range.pdf");

    // Three sections over the 50-word chunk budget yield exactly three
    // chunks; min score 0 keeps them all as candidates.
    let mut md = String::new();
    for i in 1..=3 {
        md.push_str(&format!("## Ordering information part {i}\n\n"));
        md.push_str(&"resistor-free filler words for the chunker ".repeat(8));
        md.push('\n');
    }

    let anchor = MockChat::scripted([ANCHOR_OK]);
    // Chunk 1 finds A. Chunk 2 is malformed twice (direct + repair) and must
    // not erase A. Chunk 3 returns the carried-forward list plus B.
    let main = MockChat::scripted([
        r#"[{"mpn": "BZX84C2V4W", "top_marking": "W1", "package_case": "SOT-23",
             "description": "", "confidence": "high"}]"#,
        "Sure! Here are the items you asked for: [",
        "I could not repair that, sorry.",
        r#"[{"mpn": "BZX84C2V4W", "top_marking": "W1", "package_case": "SOT-23",
             "description": "", "confidence": "high"},
            {"mpn": "BZX84C39W", "top_marking": "W9", "package_case": "SOT-23",
             "description": "", "confidence": "high"}]"#,
    ]);
    let config = base_config(&input, &out, main.clone(), anchor)
        .chunk_words(50)
        .min_chunk_score(0)
        .build()
        .unwrap();

    let summary = run_directory(&config, FixtureConverter::new(&md), None)
        .await
        .unwrap();

    assert_eq!(summary.processed, 1);
    // 3 extraction calls plus exactly one repair call.
    assert_eq!(main.calls(), 4);

    let validated = fs::read_to_string(out.join("extracted_validated_items.csv")).unwrap();
    assert!(validated.contains("BZX84C2V4W"), "got: {validated}");
    assert!(validated.contains("BZX84C39W"), "got: {validated}");
}

#[tokio::test]
async fn empty_extraction_broadens_once_then_fails() {
    let (_tmp, input, out) = workspace();
    add_pdf(&input, "stubborn.pdf");

    let anchor = MockChat::scripted([ANCHOR_OK]);
    // The script is empty, so every extraction call answers "[]": attempt 1
    // over the table chunks, then the full-document retry, then failure.
    let main = MockChat::scripted([]);
    let config = base_config(&input, &out, main.clone(), anchor)
        .build()
        .unwrap();

    let summary = run_directory(&config, FixtureConverter::new(DATASHEET_MD), None)
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.processed, 0);
    assert!(main.calls() >= 2, "both attempt tiers must run, got {}", main.calls());
    assert!(out.join("failed/stubborn.pdf").exists());

    let failed = fs::read_to_string(out.join("failed_extractions.csv")).unwrap();
    assert!(
        failed.contains("no items extracted after full-document retry"),
        "got: {failed}"
    );
    assert!(!out.join("extracted_items.csv").exists());
}

#[tokio::test]
async fn whitespace_only_document_fails_without_a_retry_pass() {
    let (_tmp, input, out) = workspace();
    add_pdf(&input, "blank.pdf");

    // Cleaning reduces this to nothing: attempt 1 has zero chunks, and the
    // broadened re-chunk is also empty, so the router must go straight to
    // failure instead of running an empty second pass.
    let anchor = MockChat::scripted([ANCHOR_OK]);
    let main = MockChat::scripted([]);
    let config = base_config(&input, &out, main.clone(), anchor)
        .build()
        .unwrap();

    let summary = run_directory(&config, FixtureConverter::new("   \n\n  \n"), None)
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(main.calls(), 0, "no chunks means no extraction calls at all");
    assert!(out.join("failed/blank.pdf").exists());

    let failed = fs::read_to_string(out.join("failed_extractions.csv")).unwrap();
    assert!(
        failed.contains("no extractable text after re-chunking"),
        "got: {failed}"
    );
}

#[tokio::test]
async fn page_ceiling_does_not_engage_on_a_cache_hit() {
    let (_tmp, input, out) = workspace();
    add_pdf(&input, "cached.pdf");
    // Seeded markdown cache: conversion is skipped, so no page count is
    // reported and the ceiling cannot apply.
    fs::create_dir_all(out.join("markdown")).unwrap();
    fs::write(out.join("markdown/cached.md"), DATASHEET_MD).unwrap();

    let anchor = MockChat::scripted([ANCHOR_OK]);
    let main = MockChat::scripted([r#"[{"mpn": "MMBT3906", "top_marking": "2A",
        "package_case": "SOT-23", "description": "", "confidence": "high"}]"#]);
    let config = base_config(&input, &out, main, anchor)
        .max_pages(Some(20))
        .build()
        .unwrap();
    let converter = FixtureConverter::with_pages(DATASHEET_MD, 120);

    let summary = run_directory(&config, converter.clone(), None).await.unwrap();

    assert_eq!(converter.calls(), 0, "cache hit must not re-convert");
    assert_eq!(summary.processed, 1, "no page count, no ceiling");
    assert_eq!(summary.skipped, 0);
    assert!(out.join("processed/cached.pdf").exists());
}

#[tokio::test]
async fn finished_documents_are_never_reprocessed() {
    let (_tmp, input, out) = workspace();
    add_pdf(&input, "done.pdf");
    fs::create_dir_all(out.join("processed")).unwrap();
    fs::write(out.join("processed/done.pdf"), b"archived").unwrap();

    let anchor = MockChat::scripted([]);
    let main = MockChat::scripted([]);
    let config = base_config(&input, &out, main.clone(), anchor.clone())
        .build()
        .unwrap();
    let converter = FixtureConverter::new(DATASHEET_MD);

    let summary = run_directory(&config, converter.clone(), None).await.unwrap();

    assert_eq!(summary.already_done, 1);
    assert_eq!(summary.processed, 0);
    assert_eq!(converter.calls(), 0, "no conversion for a finished document");
    assert_eq!(anchor.calls(), 0);
    // The stray input copy is left alone for the operator to resolve.
    assert!(input.join("done.pdf").exists());
}

#[tokio::test]
async fn oversized_document_skips_before_any_model_call() {
    let (_tmp, input, out) = workspace();
    add_pdf(&input, "catalog.pdf");

    let anchor = MockChat::scripted([]);
    let main = MockChat::scripted([]);
    let config = base_config(&input, &out, main.clone(), anchor.clone())
        .max_pages(Some(20))
        .build()
        .unwrap();

    let summary = run_directory(
        &config,
        FixtureConverter::with_pages(DATASHEET_MD, 120),
        None,
    )
    .await
    .unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(anchor.calls(), 0, "screening must not run for oversized docs");
    assert_eq!(main.calls(), 0);

    let skipped = fs::read_to_string(out.join("skipped_components.csv")).unwrap();
    assert!(
        skipped.contains("page count 120 exceeds ceiling 20"),
        "got: {skipped}"
    );
    assert!(out.join("skipped/catalog.pdf").exists());
}

#[tokio::test]
async fn conversion_failure_leaves_document_in_place() {
    struct BrokenConverter;
    impl MarkdownConverter for BrokenConverter {
        fn convert(&self, pdf: &Path) -> Result<ConvertedDocument, ExtractError> {
            Err(ExtractError::ConversionFailed {
                path: pdf.to_path_buf(),
                detail: "converter exploded".into(),
            })
        }
    }

    let (_tmp, input, out) = workspace();
    add_pdf(&input, "broken.pdf");

    let anchor = MockChat::scripted([]);
    let main = MockChat::scripted([]);
    let config = base_config(&input, &out, main, anchor).build().unwrap();

    let summary = run_directory(&config, Arc::new(BrokenConverter), None)
        .await
        .unwrap();

    assert_eq!(summary.errors, 1);
    assert_eq!(summary.processed + summary.skipped + summary.failed, 0);
    // Retried from scratch on the next run: still in the input directory,
    // logged to the failure log.
    assert!(input.join("broken.pdf").exists());
    let log = fs::read_to_string(out.join("failed_pdfs.csv")).unwrap();
    assert!(log.contains("broken.pdf"));
    assert!(log.contains("converter exploded"));
}
