//! Document-conversion collaborator: PDF in, markdown out.
//!
//! Conversion is consumed as a black box behind [`MarkdownConverter`]. The
//! trait is deliberately blocking — real converters (docling, marker,
//! pdftotext wrappers) are CPU-bound subprocesses or native libraries — and
//! the pipeline runs it inside `spawn_blocking` so the async workers are
//! never starved.
//!
//! The shipped implementation, [`CommandConverter`], shells out to any
//! program that prints markdown on stdout. Table and picture image assets
//! such a tool saves alongside are its own business; the pipeline only reads
//! the text.

use crate::error::ExtractError;
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Result of converting one PDF.
#[derive(Debug, Clone)]
pub struct ConvertedDocument {
    pub markdown: String,
    /// Page count when the converter reports one; used for the oversized
    /// document ceiling. `None` disables that check for this document.
    pub page_count: Option<usize>,
}

/// PDF-to-markdown conversion capability.
///
/// Implementations must be shareable across document workers. Errors are
/// fatal for the document: the caller logs them to the failure log and leaves
/// the source file in place for a later run.
pub trait MarkdownConverter: Send + Sync {
    fn convert(&self, pdf: &Path) -> Result<ConvertedDocument, ExtractError>;
}

/// Converter that runs an external command and captures its stdout.
///
/// The PDF path is appended as the final argument:
/// `<program> <args…> <pdf>`.
pub struct CommandConverter {
    program: String,
    args: Vec<String>,
}

impl CommandConverter {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl MarkdownConverter for CommandConverter {
    fn convert(&self, pdf: &Path) -> Result<ConvertedDocument, ExtractError> {
        debug!(program = %self.program, pdf = %pdf.display(), "converting");
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(pdf)
            .output()
            .map_err(|e| ExtractError::ConversionFailed {
                path: pdf.to_path_buf(),
                detail: format!("failed to launch '{}': {e}", self.program),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::ConversionFailed {
                path: pdf.to_path_buf(),
                detail: format!(
                    "'{}' exited with {}: {}",
                    self.program,
                    output.status,
                    stderr.trim().chars().take(500).collect::<String>()
                ),
            });
        }

        let markdown = String::from_utf8_lossy(&output.stdout).into_owned();
        if markdown.trim().is_empty() {
            return Err(ExtractError::ConversionFailed {
                path: pdf.to_path_buf(),
                detail: format!("'{}' produced no markdown output", self.program),
            });
        }

        Ok(ConvertedDocument {
            markdown,
            page_count: None,
        })
    }
}
