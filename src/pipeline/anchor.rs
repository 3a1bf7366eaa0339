//! Anchor resolution: derive the document's component identity and screening
//! classification from its opening excerpt.
//!
//! One model call per document, parsed fail-open: a malformed response
//! degrades to an empty identity with **no** classification flags set, so the
//! document proceeds through extraction rather than being screened out by a
//! parse accident. Screening errors in the skip direction are unrecoverable
//! (the document never reaches the extraction loop); errors in the proceed
//! direction cost one wasted extraction pass at most.

use crate::error::ExtractError;
use crate::llm::ChatModel;
use crate::model::Anchor;
use crate::pipeline::extract::strip_code_fence;
use crate::prompts::{anchor_prompt, EXTRACTION_SYSTEM};
use serde::Deserialize;
use tracing::{debug, warn};

/// Raw shape of one element of the anchor response array.
#[derive(Debug, Deserialize)]
struct AnchorResponse {
    #[serde(default)]
    component: ComponentField,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    package_case: Option<String>,
    #[serde(default)]
    is_chip_component: bool,
    #[serde(default)]
    is_through_hole: bool,
    #[serde(default)]
    explanation: Option<String>,
}

/// The prompt asks for a list of one or two MPNs but models answering for a
/// single part frequently return a bare string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ComponentField {
    One(String),
    Many(Vec<String>),
}

impl Default for ComponentField {
    fn default() -> Self {
        ComponentField::Many(Vec::new())
    }
}

impl ComponentField {
    fn into_vec(self) -> Vec<String> {
        match self {
            ComponentField::One(s) if s.is_empty() => Vec::new(),
            ComponentField::One(s) => vec![s],
            ComponentField::Many(v) => v.into_iter().filter(|s| !s.is_empty()).collect(),
        }
    }
}

/// Resolve the anchor for a document from its converted markdown.
///
/// Transport failures propagate as fatal; parse failures degrade to
/// [`Anchor::default`].
pub async fn resolve_anchor(
    model: &dyn ChatModel,
    markdown: &str,
    excerpt_lines: usize,
) -> Result<Anchor, ExtractError> {
    let excerpt = markdown
        .lines()
        .take(excerpt_lines)
        .collect::<Vec<_>>()
        .join("\n");
    let raw = model
        .complete(EXTRACTION_SYSTEM, &anchor_prompt(excerpt.trim()))
        .await?;
    Ok(parse_anchor(&raw))
}

/// Parse the anchor response array, taking the first element. Fail-open.
pub fn parse_anchor(raw: &str) -> Anchor {
    let body = strip_code_fence(raw.trim());
    match serde_json::from_str::<Vec<AnchorResponse>>(body) {
        Ok(mut entries) if !entries.is_empty() => {
            let entry = entries.remove(0);
            let anchor = Anchor {
                component: entry.component.into_vec(),
                description: entry.description.unwrap_or_default(),
                package_case: entry.package_case.unwrap_or_default(),
                is_chip_component: entry.is_chip_component,
                is_through_hole: entry.is_through_hole,
                explanation: entry.explanation.unwrap_or_default(),
            };
            debug!(component = ?anchor.component, chip = anchor.is_chip_component, "anchor resolved");
            anchor
        }
        Ok(_) => {
            warn!("anchor response was an empty array; proceeding unscreened");
            Anchor::default()
        }
        Err(e) => {
            warn!(error = %e, "anchor parse failed; proceeding unscreened");
            Anchor::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_response() {
        let raw = r#"[{"component": ["BZX84C2V4W", "BZX84C39W"],
                       "description": "Zener diode range",
                       "package_case": "SOT-23",
                       "is_chip_component": false,
                       "is_through_hole": false,
                       "explanation": ""}]"#;
        let anchor = parse_anchor(raw);
        assert_eq!(anchor.component, vec!["BZX84C2V4W", "BZX84C39W"]);
        assert_eq!(anchor.description, "Zener diode range");
        assert_eq!(anchor.skip_reason(), None);
    }

    #[test]
    fn bare_string_component_accepted() {
        let raw = r#"[{"component": "MMBT3906", "description": "PNP transistor"}]"#;
        let anchor = parse_anchor(raw);
        assert_eq!(anchor.component, vec!["MMBT3906"]);
    }

    #[test]
    fn fenced_response_accepted() {
        let raw = "```json\n[{\"component\": [\"X1\"], \"description\": \"d\"}]\n```";
        assert_eq!(parse_anchor(raw).component, vec!["X1"]);
    }

    #[test]
    fn chip_flag_produces_skip() {
        let raw = r#"[{"component": ["RC0402"], "description": "chip resistor",
                       "is_chip_component": true,
                       "explanation": "Component is described as a chip resistor"}]"#;
        let anchor = parse_anchor(raw);
        assert!(anchor.skip_reason().is_some());
        assert_eq!(anchor.explanation, "Component is described as a chip resistor");
    }

    #[test]
    fn malformed_response_fails_open() {
        // No identity, no description, and crucially no flags set: the
        // document must proceed, never be screened out by a parse accident.
        for raw in ["not json at all", "{\"component\": \"X\"}", "[]", ""] {
            let anchor = parse_anchor(raw);
            assert!(anchor.component.is_empty(), "input: {raw}");
            assert_eq!(anchor.skip_reason(), None, "input: {raw}");
        }
    }
}
