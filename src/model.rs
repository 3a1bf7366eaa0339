//! Core data types flowing through the extraction pipeline.
//!
//! The shapes here mirror the JSON contracts the language model is prompted
//! with (see [`crate::prompts`]): [`ExtractionItem`] is exactly one element of
//! the extraction-response array, [`Anchor`] is the parsed first element of
//! the anchor-response array. Keeping the serde derives on the same structs
//! that the rest of the pipeline manipulates means there is a single source
//! of truth for field names — a renamed field breaks the prompt contract
//! loudly at the parse site instead of silently downstream.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;

// ── Chunks ───────────────────────────────────────────────────────────────

/// A bounded-size contiguous text segment used as one unit of model input.
///
/// Immutable once produced. `origin` is the position in the original chunk
/// sequence, kept so that candidate selection can rank by score and then
/// restore document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub origin: usize,
    pub text: String,
}

impl Chunk {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

// ── Anchor ───────────────────────────────────────────────────────────────

/// Per-document summary derived once from the opening excerpt.
///
/// `component` holds one part number, or a start/end pair when the document
/// covers a range (e.g. `BZX84C2V4W - BZX84C39W`). The two classification
/// flags screen out documents outside the target SMD discrete-component
/// domain before any per-chunk extraction happens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Anchor {
    pub component: Vec<String>,
    pub description: String,
    pub package_case: String,
    pub is_chip_component: bool,
    pub is_through_hole: bool,
    pub explanation: String,
}

impl Anchor {
    /// Screening decision: `Some` when either classification flag is set.
    pub fn skip_reason(&self) -> Option<SkipReason> {
        if self.is_chip_component {
            Some(SkipReason::ChipComponent)
        } else if self.is_through_hole {
            Some(SkipReason::ThroughHole)
        } else {
            None
        }
    }
}

// ── Extraction items ─────────────────────────────────────────────────────

/// Confidence level the model assigns to one extracted item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "high"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::Low => write!(f, "low"),
        }
    }
}

/// One structured record as returned by the extraction prompt.
///
/// `mpn` is the unique-key candidate and is never empty in a persisted item;
/// elements that arrive with an empty `mpn` are dropped at the parse site.
/// All other string fields tolerate explicit JSON `null` (models emit it for
/// "not found" despite being told to leave fields blank).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionItem {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub mpn: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub top_marking: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub package_case: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default)]
    pub confidence: Option<Confidence>,
    /// Source document filename, stamped by the success handler. Never part
    /// of the prompt round-trip.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
}

/// Accept `null` wherever the prompt contract says "leave this blank".
fn null_as_empty<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(de)?.unwrap_or_default())
}

// ── Canonical records ────────────────────────────────────────────────────

/// The deduplicated, merged representation of all partial extractions
/// sharing one `mpn`. Exactly one per unique `mpn` in a document's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub mpn: String,
    /// Sorted, comma-joined union of all non-empty markings in the group.
    pub top_marking: String,
    /// Sorted, comma-joined union of all non-empty package cases in the group.
    pub package_case: String,
    pub description: String,
    pub confidence: Option<Confidence>,
    pub validation_comment: String,
    pub source: String,
}

// ── Outcomes ─────────────────────────────────────────────────────────────

/// Why a document was screened out before extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    ChipComponent,
    ThroughHole,
    PageCeiling { pages: usize, ceiling: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ChipComponent => write!(f, "classified as chip component"),
            SkipReason::ThroughHole => write!(f, "classified as through-hole"),
            SkipReason::PageCeiling { pages, ceiling } => {
                write!(f, "page count {pages} exceeds ceiling {ceiling}")
            }
        }
    }
}

/// Why extraction was declared failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    /// The broadened full-document re-chunk produced no chunks at all.
    NoChunks,
    /// Both attempt tiers completed and yielded zero items.
    Exhausted,
    /// The driver's step ceiling was hit before reaching a terminal state.
    StepCeiling,
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailReason::NoChunks => write!(f, "no extractable text after re-chunking"),
            FailReason::Exhausted => {
                write!(f, "no items extracted after full-document retry")
            }
            FailReason::StepCeiling => write!(f, "pipeline step ceiling exceeded"),
        }
    }
}

/// Terminal state of one document. Determines which output file receives a
/// row and which directory the source file is moved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Processed { items: usize, records: usize },
    Skipped(SkipReason),
    Failed(FailReason),
}

impl Outcome {
    pub fn is_processed(&self) -> bool {
        matches!(self, Outcome::Processed { .. })
    }
}

// ── Reports ──────────────────────────────────────────────────────────────

/// Summary of one document run, returned to the caller.
#[derive(Debug, Clone)]
pub struct DocumentReport {
    pub source: PathBuf,
    pub outcome: Outcome,
    /// Attempt tiers entered (1 = table-focused only, 2 = full-document retry).
    pub attempts: u8,
    /// Chunks in the final active sequence.
    pub chunks: usize,
    pub duration_ms: u64,
}

/// Aggregate counts for one batch invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunSummary {
    pub total: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Documents that hit a fatal error (conversion or transport) and were
    /// left in place for a later run.
    pub errors: usize,
    pub already_done: usize,
}
