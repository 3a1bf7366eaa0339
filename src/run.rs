//! Per-document driver loop and directory batch runner.
//!
//! [`process_document`] owns one document end to end: it performs the effects
//! for the current [`State`], produces the matching [`Event`], and feeds both
//! through the pure [`transition`] function until a terminal state is
//! reached. All mutable per-document state lives in one typed [`JobState`]
//! record; nothing is shared between documents except the [`OutputSink`].
//!
//! [`run_directory`] fans out across documents with
//! `buffer_unordered(concurrency)`. Each document is strictly sequential
//! internally — every step reads state the previous step wrote.

use crate::config::ExtractionConfig;
use crate::converter::MarkdownConverter;
use crate::error::ExtractError;
use crate::llm::{resolve_anchor_model, resolve_main_model, ChatModel};
use crate::machine::{decide, transition, Decision, Event, State, Terminal};
use crate::model::{
    Anchor, Chunk, DocumentReport, ExtractionItem, FailReason, Outcome, RunSummary, SkipReason,
};
use crate::pipeline::{anchor, chunk, extract, score, tables, validate};
use crate::sink::{move_document, OutputSink};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// The pipeline's external collaborators, shared across document workers.
pub struct PipelineHandles {
    pub converter: Arc<dyn MarkdownConverter>,
    pub main_model: Arc<dyn ChatModel>,
    pub anchor_model: Arc<dyn ChatModel>,
    pub sink: Arc<OutputSink>,
}

/// Per-document completion status passed to the progress hook.
pub enum DocumentStatus<'a> {
    Finished(&'a DocumentReport),
    AlreadyDone,
    Errored(&'a ExtractError),
}

/// Callback invoked once per document as the batch progresses.
pub type ProgressHook = Arc<dyn Fn(&Path, DocumentStatus<'_>) + Send + Sync>;

/// All mutable state for one document, threaded through the driver loop.
///
/// Constructed incrementally but never read before written: the state
/// machine guarantees each field is populated by an earlier state than any
/// state reading it.
struct JobState {
    title: String,
    cleaned: String,
    anchor: Anchor,
    /// The active chunk sequence: attempt-1 candidates, then (after a
    /// Broaden) the full-document re-chunk.
    active: Vec<Chunk>,
    current_idx: usize,
    items: Vec<ExtractionItem>,
    /// Highest attempt tier entered; 0 until extraction starts.
    attempts: u8,
    skip_reason: Option<SkipReason>,
    fail_reason: Option<FailReason>,
}

/// Process one document through the full pipeline.
///
/// Returns `Ok(None)` when the document is already present in a terminal
/// directory (the idempotency precondition): no collaborator is invoked and
/// no output row is written.
///
/// # Errors
/// Fatal errors only (conversion, transport, terminal I/O). The source file
/// is left in place so a later run retries it from scratch.
pub async fn process_document(
    pdf: &Path,
    config: &ExtractionConfig,
    handles: &PipelineHandles,
) -> Result<Option<DocumentReport>, ExtractError> {
    let start = Instant::now();
    let name = pdf
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ExtractError::Internal(format!("bad file name: {}", pdf.display())))?
        .to_string();

    // Idempotency precondition: a same-named file in any terminal directory
    // means this document is done.
    for dir in config.terminal_dirs() {
        if dir.join(&name).exists() {
            info!(document = %name, dir = %dir.display(), "already processed, skipping");
            return Ok(None);
        }
    }

    info!(document = %name, "processing");
    let (markdown, page_count) = load_markdown(pdf, config, &handles.converter).await?;

    // Oversized-document ceiling, checked before any model call.
    if let (Some(ceiling), Some(pages)) = (config.max_pages, page_count) {
        if pages > ceiling {
            let reason = SkipReason::PageCeiling { pages, ceiling };
            handles
                .sink
                .append_skipped(&name, &Anchor::default(), &reason)?;
            move_document(pdf, &config.skipped_dir)?;
            return Ok(Some(DocumentReport {
                source: pdf.to_path_buf(),
                outcome: Outcome::Skipped(reason),
                attempts: 0,
                chunks: 0,
                duration_ms: start.elapsed().as_millis() as u64,
            }));
        }
    }

    let mut job = JobState {
        title: pdf
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&name)
            .to_string(),
        cleaned: chunk::clean_markdown(&markdown),
        anchor: Anchor::default(),
        active: Vec::new(),
        current_idx: 0,
        items: Vec::new(),
        attempts: 0,
        skip_reason: None,
        fail_reason: None,
    };

    // ── Driver loop ──────────────────────────────────────────────────────
    let mut state = State::Screening;
    let mut steps = 0usize;
    let terminal = loop {
        if let State::Finishing(t) = state {
            break t;
        }
        steps += 1;
        if steps > config.max_steps {
            warn!(document = %name, steps, "step ceiling exceeded, abandoning to failure");
            job.fail_reason = Some(FailReason::StepCeiling);
            break Terminal::Failed;
        }

        state = match state {
            State::Screening => {
                job.anchor = anchor::resolve_anchor(
                    handles.anchor_model.as_ref(),
                    &markdown,
                    config.anchor_excerpt_lines,
                )
                .await?;
                job.skip_reason = job.anchor.skip_reason();
                transition(
                    state,
                    Event::Screened {
                        skip: job.skip_reason.is_some(),
                    },
                )
            }

            State::Selecting => {
                let blocks = tables::extract_tables(&job.cleaned);
                let primary = if blocks.is_empty() {
                    job.cleaned.clone()
                } else {
                    tables::tables_to_text(&blocks)
                };
                let base = chunk::chunk_markdown(&primary, config.chunk_words);
                job.active = score::select_candidates(
                    &base,
                    &job.anchor.component,
                    &job.title,
                    config.min_chunk_score,
                    config.max_candidate_chunks,
                );
                info!(
                    document = %name,
                    tables = blocks.len(),
                    chunks = base.len(),
                    candidates = job.active.len(),
                    "attempt 1 input ready"
                );
                transition(state, Event::Selected)
            }

            State::Extracting(attempt) => {
                job.attempts = job.attempts.max(attempt.number());
                if job.current_idx < job.active.len() {
                    let current = &job.active[job.current_idx];
                    let parsed = extract::extract_chunk(
                        handles.main_model.as_ref(),
                        current,
                        &job.items,
                        &job.anchor.component,
                    )
                    .await?;
                    if parsed.is_empty() {
                        debug!(chunk = current.origin, "no new items; keeping previous");
                    } else {
                        job.items = parsed;
                    }
                    job.current_idx += 1;
                }
                transition(
                    state,
                    Event::ChunkDone {
                        more: job.current_idx < job.active.len(),
                    },
                )
            }

            State::Routing(attempt) => {
                let mut decision = decide(attempt, !job.items.is_empty(), config.max_attempts);
                if decision == Decision::Broaden {
                    job.active = chunk::chunk_markdown(&job.cleaned, config.chunk_words);
                    job.current_idx = 0;
                    job.items.clear();
                    if job.active.is_empty() {
                        // Nothing left to broaden into: straight to failure.
                        decision = Decision::Fail;
                        job.fail_reason = Some(FailReason::NoChunks);
                    } else {
                        info!(
                            document = %name,
                            chunks = job.active.len(),
                            "attempt 1 empty; retrying with full document"
                        );
                    }
                }
                if decision == Decision::Fail && job.fail_reason.is_none() {
                    job.fail_reason = Some(FailReason::Exhausted);
                }
                transition(state, Event::Routed(decision))
            }

            State::Validating => transition(state, Event::Validated),

            State::Finishing(t) => break t,
        };
    };

    // ── Terminal handlers ────────────────────────────────────────────────
    let outcome = match terminal {
        Terminal::Skipped => {
            let reason = job.skip_reason.clone().unwrap_or(SkipReason::ChipComponent);
            handles.sink.append_skipped(&name, &job.anchor, &reason)?;
            move_document(pdf, &config.skipped_dir)?;
            info!(document = %name, %reason, "skipped");
            Outcome::Skipped(reason)
        }
        Terminal::Failed => {
            let reason = job.fail_reason.unwrap_or(FailReason::Exhausted);
            handles.sink.append_failed(&name, reason)?;
            move_document(pdf, &config.failed_dir)?;
            warn!(document = %name, %reason, "failed");
            Outcome::Failed(reason)
        }
        Terminal::Processed => {
            // Stamp every raw item with its source and the anchor's
            // description as fallback, then merge. Canonical records inherit
            // both through the merge.
            for item in &mut job.items {
                item.source = name.clone();
                if item.description.trim().is_empty() {
                    item.description = job.anchor.description.clone();
                }
            }
            let records = validate::merge_items(&job.items);
            handles.sink.append_items(&job.items)?;
            handles.sink.append_validated(&records)?;
            handles.sink.write_metadata(
                &job.title,
                handles.main_model.model_name(),
                &job.anchor,
                &job.active,
                job.current_idx,
            )?;
            move_document(pdf, &config.processed_dir)?;
            info!(
                document = %name,
                items = job.items.len(),
                records = records.len(),
                "processed"
            );
            Outcome::Processed {
                items: job.items.len(),
                records: records.len(),
            }
        }
    };

    Ok(Some(DocumentReport {
        source: pdf.to_path_buf(),
        outcome,
        attempts: job.attempts,
        chunks: job.active.len(),
        duration_ms: start.elapsed().as_millis() as u64,
    }))
}

/// Convert the PDF, or reuse the cached markdown from a previous run.
async fn load_markdown(
    pdf: &Path,
    config: &ExtractionConfig,
    converter: &Arc<dyn MarkdownConverter>,
) -> Result<(String, Option<usize>), ExtractError> {
    let stem = pdf
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ExtractError::Internal(format!("bad file name: {}", pdf.display())))?;
    let md_path = config.markdown_dir.join(format!("{stem}.md"));

    if md_path.exists() {
        debug!(path = %md_path.display(), "markdown cache hit");
        let markdown = std::fs::read_to_string(&md_path)
            .map_err(|e| ExtractError::Internal(format!("read cache {}: {e}", md_path.display())))?;
        return Ok((markdown, None));
    }

    let converter = Arc::clone(converter);
    let pdf_buf = pdf.to_path_buf();
    let converted = tokio::task::spawn_blocking(move || converter.convert(&pdf_buf))
        .await
        .map_err(|e| ExtractError::Internal(format!("conversion task panicked: {e}")))??;

    std::fs::create_dir_all(&config.markdown_dir).map_err(|e| ExtractError::OutputWriteFailed {
        path: config.markdown_dir.clone(),
        source: e,
    })?;
    std::fs::write(&md_path, &converted.markdown).map_err(|e| ExtractError::OutputWriteFailed {
        path: md_path.clone(),
        source: e,
    })?;
    debug!(path = %md_path.display(), "markdown cached");

    Ok((converted.markdown, converted.page_count))
}

/// Process every pending PDF in the input directory.
///
/// Documents already present in a terminal directory are skipped. Fatal
/// per-document errors are logged to the failure log and counted; the batch
/// always runs to completion.
pub async fn run_directory(
    config: &ExtractionConfig,
    converter: Arc<dyn MarkdownConverter>,
    progress: Option<ProgressHook>,
) -> Result<RunSummary, ExtractError> {
    if !config.input_dir.is_dir() {
        return Err(ExtractError::InputDirMissing {
            path: config.input_dir.clone(),
        });
    }

    let mut pdfs = list_pdfs(&config.input_dir)?;
    if let Some(limit) = config.file_limit {
        pdfs.truncate(limit);
    }
    info!(count = pdfs.len(), dir = %config.input_dir.display(), "found PDFs");

    let handles = PipelineHandles {
        converter,
        main_model: resolve_main_model(config)?,
        anchor_model: resolve_anchor_model(config)?,
        sink: Arc::new(OutputSink::new(config)),
    };

    let results: Vec<(PathBuf, Result<Option<DocumentReport>, ExtractError>)> =
        stream::iter(pdfs.into_iter().map(|pdf| {
            let handles = &handles;
            let progress = progress.clone();
            async move {
                let result = process_document(&pdf, config, handles).await;
                if let Some(ref hook) = progress {
                    match &result {
                        Ok(Some(report)) => hook(&pdf, DocumentStatus::Finished(report)),
                        Ok(None) => hook(&pdf, DocumentStatus::AlreadyDone),
                        Err(e) => hook(&pdf, DocumentStatus::Errored(e)),
                    }
                }
                (pdf, result)
            }
        }))
        .buffer_unordered(config.concurrency)
        .collect()
        .await;

    let mut summary = RunSummary::default();
    for (pdf, result) in results {
        summary.total += 1;
        match result {
            Ok(Some(report)) => match report.outcome {
                Outcome::Processed { .. } => summary.processed += 1,
                Outcome::Skipped(_) => summary.skipped += 1,
                Outcome::Failed(_) => summary.failed += 1,
            },
            Ok(None) => summary.already_done += 1,
            Err(e) => {
                summary.errors += 1;
                let name = pdf
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("<unknown>");
                error!(document = name, error = %e, "document left in place for retry");
                if let Err(log_err) = handles.sink.log_failure(name, &e) {
                    warn!(error = %log_err, "could not write failure log");
                }
            }
        }
    }

    info!(
        total = summary.total,
        processed = summary.processed,
        skipped = summary.skipped,
        failed = summary.failed,
        errors = summary.errors,
        already_done = summary.already_done,
        "batch complete"
    );
    Ok(summary)
}

/// Sorted list of `*.pdf` files in `dir`.
fn list_pdfs(dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ExtractError::Internal(format!(
        "read input dir {}: {e}",
        dir.display()
    )))?;
    let mut pdfs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    pdfs.sort();
    Ok(pdfs)
}
