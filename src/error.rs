//! Error types for the datasheet-extract library.
//!
//! Only *fatal per-document* failures become an [`ExtractError`]: the
//! document-conversion collaborator throwing, an LLM transport failure, or a
//! filesystem problem in a terminal handler. These abort the current document
//! (leaving the source file in place so a later run retries it) but never the
//! batch.
//!
//! Degradable failures deliberately do **not** appear here:
//!
//! * a malformed anchor response degrades to an empty [`crate::model::Anchor`]
//!   and the document proceeds (fail-open — a misclassification must not
//!   silently discard a real extraction target);
//! * a malformed chunk response triggers the repair prompt, and a second
//!   failure leaves the running item list unchanged for that chunk;
//! * zero extracted items after both attempt tiers is a recorded
//!   [`crate::model::Outcome::Failed`], not an `Err`.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the datasheet-extract library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The configured input directory does not exist.
    #[error("Input directory not found: '{path}'\nCheck the path exists and is readable.")]
    InputDirMissing { path: PathBuf },

    /// The document-conversion collaborator failed for this file.
    #[error("Document conversion failed for '{path}': {detail}")]
    ConversionFailed { path: PathBuf, detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned a transport or protocol error. No automatic
    /// retry is applied beyond the repair sub-step; the document is left
    /// unmoved and eligible for reprocessing on a later run.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// A terminal move would overwrite an existing file. Failing loudly here
    /// beats silently clobbering a prior run's evidence.
    #[error("Refusing to move document: destination already exists: '{path}'")]
    DestinationExists { path: PathBuf },

    /// Could not create or append one of the output files.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}
