//! Terminal persistence: append-only CSV outputs, the per-document metadata
//! snapshot, and the terminal move of the source document.
//!
//! All five tabular outputs are append-only and get their header exactly once,
//! when the file is first created. Appends from concurrent document workers
//! are serialised behind one mutex; rows are small and the files share a
//! disk, so finer-grained locking buys nothing.
//!
//! Moves fail loudly when the destination already holds a same-named file.
//! The terminal directories double as the idempotency marker, so silently
//! overwriting one would erase the evidence of a prior run.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::model::{Anchor, CanonicalRecord, Chunk, ExtractionItem, FailReason, SkipReason};
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Shared handle to every output file of one batch run.
pub struct OutputSink {
    items_csv: PathBuf,
    validated_csv: PathBuf,
    skipped_csv: PathBuf,
    failed_csv: PathBuf,
    failure_log: PathBuf,
    metadata_dir: PathBuf,
    csv_lock: Mutex<()>,
}

impl OutputSink {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            items_csv: config.items_csv.clone(),
            validated_csv: config.validated_csv.clone(),
            skipped_csv: config.skipped_csv.clone(),
            failed_csv: config.failed_csv.clone(),
            failure_log: config.failure_log.clone(),
            metadata_dir: config.metadata_dir.clone(),
            csv_lock: Mutex::new(()),
        }
    }

    /// Append raw extracted items, one row each.
    pub fn append_items(&self, items: &[ExtractionItem]) -> Result<(), ExtractError> {
        let rows: Vec<Vec<String>> = items
            .iter()
            .map(|i| {
                vec![
                    i.mpn.clone(),
                    i.top_marking.clone(),
                    i.package_case.clone(),
                    i.description.clone(),
                    i.confidence.map(|c| c.to_string()).unwrap_or_default(),
                    i.source.clone(),
                ]
            })
            .collect();
        self.append_rows(
            &self.items_csv,
            &["mpn", "top_marking", "package_case", "description", "confidence", "source"],
            &rows,
        )?;
        info!(items = items.len(), path = %self.items_csv.display(), "saved items");
        Ok(())
    }

    /// Append canonical records, one row each.
    pub fn append_validated(&self, records: &[CanonicalRecord]) -> Result<(), ExtractError> {
        let rows: Vec<Vec<String>> = records
            .iter()
            .map(|r| {
                vec![
                    r.mpn.clone(),
                    r.top_marking.clone(),
                    r.package_case.clone(),
                    r.description.clone(),
                    r.confidence.map(|c| c.to_string()).unwrap_or_default(),
                    r.validation_comment.clone(),
                    r.source.clone(),
                ]
            })
            .collect();
        self.append_rows(
            &self.validated_csv,
            &[
                "mpn",
                "top_marking",
                "package_case",
                "description",
                "confidence",
                "validation_comment",
                "source",
            ],
            &rows,
        )?;
        info!(records = records.len(), path = %self.validated_csv.display(), "saved validated records");
        Ok(())
    }

    /// Record a screened-out document.
    pub fn append_skipped(
        &self,
        source: &str,
        anchor: &Anchor,
        reason: &SkipReason,
    ) -> Result<(), ExtractError> {
        self.append_rows(
            &self.skipped_csv,
            &["source", "component", "description", "explanation", "reason"],
            &[vec![
                source.to_string(),
                anchor.component.join(" - "),
                anchor.description.clone(),
                anchor.explanation.clone(),
                reason.to_string(),
            ]],
        )
    }

    /// Record an extraction-exhausted document.
    pub fn append_failed(&self, source: &str, reason: FailReason) -> Result<(), ExtractError> {
        self.append_rows(
            &self.failed_csv,
            &["source", "timestamp", "reason"],
            &[vec![
                source.to_string(),
                Local::now().to_rfc3339(),
                reason.to_string(),
            ]],
        )
    }

    /// Record a fatal error (conversion or transport). The document stays in
    /// the input directory and is retried from scratch on a later run.
    pub fn log_failure(&self, pdf_name: &str, error: &ExtractError) -> Result<(), ExtractError> {
        self.append_rows(
            &self.failure_log,
            &["timestamp", "pdf_name", "error"],
            &[vec![
                Local::now().to_rfc3339(),
                pdf_name.to_string(),
                error.to_string(),
            ]],
        )
    }

    /// Write the per-document metadata snapshot.
    pub fn write_metadata(
        &self,
        title: &str,
        model_name: &str,
        anchor: &Anchor,
        chunks: &[Chunk],
        current_idx: usize,
    ) -> Result<(), ExtractError> {
        fs::create_dir_all(&self.metadata_dir).map_err(|e| ExtractError::OutputWriteFailed {
            path: self.metadata_dir.clone(),
            source: e,
        })?;
        let path = self.metadata_dir.join(format!("{}_metadata.json", title.trim()));
        let snapshot = serde_json::json!({
            "title": title,
            "model_name": model_name,
            "component": anchor.component,
            "description": anchor.description,
            "package_case": anchor.package_case,
            "chunks": chunks,
            "current_idx": current_idx,
        });
        let body = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| ExtractError::Internal(format!("metadata serialise: {e}")))?;
        fs::write(&path, body).map_err(|e| ExtractError::OutputWriteFailed { path: path.clone(), source: e })?;
        debug!(path = %path.display(), "saved metadata snapshot");
        Ok(())
    }

    fn append_rows(
        &self,
        path: &Path,
        header: &[&str],
        rows: &[Vec<String>],
    ) -> Result<(), ExtractError> {
        let _guard = self
            .csv_lock
            .lock()
            .map_err(|_| ExtractError::Internal("output lock poisoned".into()))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| ExtractError::OutputWriteFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let write_header = !path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ExtractError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        let mut writer = csv::Writer::from_writer(file);
        if write_header {
            writer
                .write_record(header)
                .map_err(|e| csv_io_err(path, e))?;
        }
        for row in rows {
            writer.write_record(row).map_err(|e| csv_io_err(path, e))?;
        }
        writer.flush().map_err(|e| ExtractError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }
}

fn csv_io_err(path: &Path, e: csv::Error) -> ExtractError {
    ExtractError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: std::io::Error::other(e),
    }
}

/// Move a document into its terminal directory.
///
/// Fails with [`ExtractError::DestinationExists`] rather than overwriting.
pub fn move_document(src: &Path, dest_dir: &Path) -> Result<(), ExtractError> {
    fs::create_dir_all(dest_dir).map_err(|e| ExtractError::OutputWriteFailed {
        path: dest_dir.to_path_buf(),
        source: e,
    })?;
    let name = src
        .file_name()
        .ok_or_else(|| ExtractError::Internal(format!("no file name: {}", src.display())))?;
    let dest = dest_dir.join(name);
    if dest.exists() {
        return Err(ExtractError::DestinationExists { path: dest });
    }
    fs::rename(src, &dest).map_err(|e| ExtractError::OutputWriteFailed {
        path: dest.clone(),
        source: e,
    })?;
    info!(from = %src.display(), to = %dest.display(), "moved document");
    Ok(())
}
