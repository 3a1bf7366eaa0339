//! Per-chunk extraction call and the parse-and-repair sub-machine.
//!
//! Each iteration sends the anchor identity, the full accumulated item list,
//! and one chunk; the model returns the *complete* updated list. The
//! orchestrator then replaces its list wholesale with any non-empty parse
//! result — it never merges incrementally itself.
//!
//! ## Parse-and-repair
//!
//! ```text
//! response ──parse──▶ ok ──────────────────────▶ items
//!     │ fail
//!     └─▶ repair prompt ──parse──▶ ok ─────────▶ items
//!                           │ fail
//!                           └─▶ empty list (items left unchanged)
//! ```
//!
//! The repair call is a second, dedicated prompt containing the malformed
//! text and the target schema. A second parse failure is logged and swallowed
//! so one bad chunk can never corrupt or erase the running item list.

use crate::error::ExtractError;
use crate::llm::ChatModel;
use crate::model::{Chunk, ExtractionItem};
use crate::prompts::{extraction_prompt, repair_prompt, EXTRACTION_SYSTEM, REPAIR_SYSTEM};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Outer code fence, with or without a language tag. Models wrap JSON in
/// fences despite being told not to.
static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\n(.*)\n?```\s*$").unwrap());

/// Strip one outer fenced-code wrapper, if present.
pub fn strip_code_fence(input: &str) -> &str {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) => caps.get(1).map_or(input, |m| m.as_str()),
        None => input.trim(),
    }
}

/// Parse an extraction response into items.
///
/// Returns `None` when the text is not a JSON array of the expected shape.
/// Elements with an empty `mpn` are dropped: `mpn` is the unique-key
/// candidate and must never reach persistence empty.
pub fn parse_items(raw: &str) -> Option<Vec<ExtractionItem>> {
    let body = strip_code_fence(raw.trim());
    match serde_json::from_str::<Vec<ExtractionItem>>(body) {
        Ok(items) => Some(
            items
                .into_iter()
                .filter(|i| !i.mpn.trim().is_empty())
                .collect(),
        ),
        Err(_) => None,
    }
}

/// Run one extraction iteration for `chunk`.
///
/// Returns the model's updated item list, or an empty list when both the
/// direct parse and the repair pass fail — the caller keeps its current list
/// in that case. Transport errors propagate as fatal.
pub async fn extract_chunk(
    model: &dyn ChatModel,
    chunk: &Chunk,
    prev_items: &[ExtractionItem],
    component: &[String],
) -> Result<Vec<ExtractionItem>, ExtractError> {
    let prompt = extraction_prompt(&chunk.text, prev_items, component);
    let raw = model.complete(EXTRACTION_SYSTEM, &prompt).await?;

    if let Some(items) = parse_items(&raw) {
        debug!(chunk = chunk.origin, items = items.len(), "parsed response");
        return Ok(items);
    }

    warn!(chunk = chunk.origin, "malformed response; attempting repair");
    let repaired = model.complete(REPAIR_SYSTEM, &repair_prompt(&raw)).await?;

    match parse_items(&repaired) {
        Some(items) => {
            debug!(chunk = chunk.origin, items = items.len(), "repair succeeded");
            Ok(items)
        }
        None => {
            warn!(chunk = chunk.origin, "repair failed; keeping previous items");
            Ok(Vec::new())
        }
    }
}
