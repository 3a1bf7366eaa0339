//! Prompt templates for the anchor, extraction, and repair model calls.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — the JSON shapes embedded in these prompts
//!    are a wire contract shared with the parse sites in
//!    [`crate::pipeline::anchor`] and [`crate::pipeline::extract`]; changing a
//!    field name means editing exactly one place and watching the parse tests
//!    fail.
//!
//! 2. **Testability** — unit tests can inspect prompts directly without a
//!    live model call.
//!
//! The extraction prompt deliberately externalises the merge logic to the
//! model: each call receives the full accumulated item list and must return
//! the complete updated list, preserving previous items verbatim unless
//! corrected or extended. The orchestrator replaces its list wholesale with
//! any non-empty response (see `crate::pipeline::extract`).

use crate::model::ExtractionItem;

/// System role for the anchor and extraction calls.
pub const EXTRACTION_SYSTEM: &str = "You are an information extraction assistant.";

/// System role for the JSON repair call.
pub const REPAIR_SYSTEM: &str = "You are a JSON repair assistant.";

/// Build the combined extraction + classification prompt for the document's
/// opening excerpt.
pub fn anchor_prompt(excerpt: &str) -> String {
    format!(
        r#"You are given the beginning of a Markdown-formatted technical document for an electronic component.

From the given text, perform two tasks:

1.  **Extraction**: Extract the following information:
    - The **main component name(s)** (e.g., MMBT3906). If a range is shown (e.g., `BZX84C2V4W - BZX84C39W`), extract the **start and end MPNs**.
    - A **short technical description** of the component (e.g., "40 V, 200 mA PNP switching transistor"). If not found, leave this blank.
    - The **package case** or type, if available (e.g., SOT-23, DO-214AB, QFN). If not found, leave this blank.

2.  **Classification**: Set the following boolean flags based on the component type.
    - `is_chip_component`: Set to **true** ONLY if the component is explicitly described as a **resistor, capacitor (MLCC), inductor, or ferrite bead**. If the type is anything else or is not clearly mentioned, you MUST set this to **false**.
    - `is_through_hole`: Set to **true** ONLY if the component is explicitly described as a through-hole (leaded, axial, or radial) part. Otherwise set this to **false**.

3.  **Justification**: If you set `is_chip_component` or `is_through_hole` to `true`, you MUST add an `explanation` field briefly stating the reason (e.g., "Component is described as a chip resistor").

Respond **strictly** in the correct JSON format, including the boolean classification:

[
  {{
    "component": ["StartMPN", "EndMPN"],
    "description": "Short description of the component",
    "package_case": "Package type if available(e.g., SOT-23, DO-214AB)",
    "is_chip_component": boolean,
    "is_through_hole": boolean,
    "explanation": "Brief reason if is_chip_component or is_through_hole is true."
  }}
]

Markdown excerpt:
{excerpt}
"#
    )
}

/// Build the per-chunk extraction prompt.
///
/// `prev_items` is the current accumulated list for the document (serialised
/// into the prompt so the model can carry it forward) and `component` is the
/// anchor's component identity.
pub fn extraction_prompt(chunk: &str, prev_items: &[ExtractionItem], component: &[String]) -> String {
    let prev = if prev_items.is_empty() {
        "[]".to_string()
    } else {
        serde_json::to_string_pretty(prev_items).unwrap_or_else(|_| "[]".to_string())
    };
    let comp = if component.is_empty() {
        "[]".to_string()
    } else {
        serde_json::to_string_pretty(component).unwrap_or_else(|_| "[]".to_string())
    };
    format!(
        r#"You are given:
1. The main component(s) this document covers: {comp}
2. A list of previously extracted items from earlier sections of a technical document.
3. A Markdown-formatted chunk of the document.

Your task is to return a **single, updated list of extracted items** that:
- **CRUCIAL RULE: You MUST treat small variations in a part number (`mpn`) or `top_marking` as completely separate and unique items.** For example, if you find "TPS6285010MQDRLRQ1" and "TPS6285010MQDRLRQ1.A", they are two different items and you must include both. Extract every distinct part number you can find may it be active or obsolete.
- **Capture the FULL Part Number:** The `mpn` value **MUST** be the complete, orderable part number exactly as it appears in the text. This includes all suffixes, prefixes, spaces, and special characters (`+`, `-`, `/`, etc.).
- Do not hallucinate or infer values — only include items clearly present in the document.
- **Avoids duplicates**. Keep the more complete version if duplicates exist.
- A single component's information may be split across multiple tables (chunks). For example, the `mpn` might be in one table, while its `top_marking` is in another.
- **Small variations in `mpn` or `top_marking`** (e.g., suffixes, added characters, etc., SN74LVC1G17DBVR is different from SN74LVC1G17DBVR.Z) **must be treated as unique items**.
- For each item, include an optional `confidence` field with one of: `"high"`, `"medium"`, or `"low"`.
- Use:
    - `"high"` when all fields are clearly present and unambiguous.
    - `"medium"` when some fields are inferred from context but not explicitly labeled.
    - `"low"` when any part of the item may be uncertain or unclear.

For each item, return:

- mpn: Manufacturer Part Number (Manufacturer Part Number, Type Number, or similar terms). This field is mandatory and must not be null.
- top_marking: Short alphanumeric code on the component (Device Marking, Top Marking Code, Marking Code, or similar identifiers). If not found, leave this blank.
- package_case: Standardized mechanical format (e.g., DO-214AB, SOD-123). If not found, leave this blank.
- description: Functional description (e.g., "Transient Voltage Suppression Diode"). If not found, leave this blank.

Respond **only** with a JSON array of items. Do **not** include any explanation, thought process, or markdown formatting.

[
{{
    "mpn": "...",
    "top_marking": "...",
    "package_case": "...",
    "description": "...",
    "confidence": "..."
}},
...
]

Previously extracted items:
{prev}

Document Chunk:
{chunk}

STRICT INSTRUCTION: Return **only** a valid JSON list (i.e., starting with `[` and ending with `]`) and **nothing else**."#
    )
}

/// Build the repair prompt for a malformed extraction response.
pub fn repair_prompt(raw: &str) -> String {
    format!(
        r#"The following JSON array is invalid, incomplete, or malformed.

Your task is to:
- Fix any syntax issues (e.g., unclosed braces, trailing commas, incorrect quotes).
- Ensure it follows **exactly** this format:

[
{{
    "mpn": "...",
    "top_marking": "...",
    "package_case": "...",
    "description": "...",
    "confidence": "..."
}},
...
]

Only return the repaired JSON array. Do not include any other text or explanation.

Fix this JSON:

{raw}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Confidence;

    #[test]
    fn anchor_prompt_embeds_excerpt_and_schema() {
        let p = anchor_prompt("# BZX84C2V4W - BZX84C39W");
        assert!(p.contains("# BZX84C2V4W - BZX84C39W"));
        assert!(p.contains(r#""is_chip_component": boolean"#));
        assert!(p.contains(r#""is_through_hole": boolean"#));
    }

    #[test]
    fn extraction_prompt_serialises_prior_items() {
        let items = vec![ExtractionItem {
            mpn: "MMBT3906".into(),
            top_marking: "2A".into(),
            package_case: "SOT-23".into(),
            description: String::new(),
            confidence: Some(Confidence::High),
            source: String::new(),
        }];
        let p = extraction_prompt("| mpn |", &items, &["MMBT3906".into()]);
        assert!(p.contains(r#""mpn": "MMBT3906""#));
        assert!(p.contains(r#""confidence": "high""#));
        // The source stamp must never leak into the prompt round-trip.
        assert!(!p.contains(r#""source""#));
    }

    #[test]
    fn empty_prior_items_render_as_empty_array() {
        let p = extraction_prompt("text", &[], &[]);
        assert!(p.contains("Previously extracted items:\n[]"));
    }
}
