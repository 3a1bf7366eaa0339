//! Chunk relevance scoring and attempt-1 candidate selection.
//!
//! Scoring is a pure, deterministic function of the chunk text: a count of
//! domain keyword matches, anchor component hits, and document-title-prefix
//! occurrences. It ranks chunks for prompt economy only — it can never drop
//! ground truth permanently, because a zero-item attempt 1 escalates to a
//! full-document retry (see `crate::machine::decide`).
//!
//! Keyword and component hits weigh 2, title-prefix occurrences weigh 1.
//! Title hits are worth half a keyword hit: a part-number-like stem in the
//! filename appears all over a datasheet and would otherwise drown out the
//! sections that actually enumerate orderable parts.

use crate::model::Chunk;
use once_cell::sync::Lazy;
use regex::Regex;

/// Domain terms that flag a part-number-bearing section.
static RE_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(part( numbers?)?|type numbers?|ordering|markings?|package options?|product series|packages?)\b",
    )
    .unwrap()
});

/// Weight of one keyword or component hit.
const HIT_WEIGHT: i64 = 2;

/// Score one chunk against the anchor component identity and document title.
pub fn score_chunk(chunk: &str, components: &[String], title: &str) -> i64 {
    let chunk_lower = chunk.to_lowercase();
    let mut score = 0i64;

    score += HIT_WEIGHT * RE_KEYWORDS.find_iter(chunk).count() as i64;

    score += HIT_WEIGHT
        * components
            .iter()
            .filter(|m| !m.is_empty() && chunk_lower.contains(&m.to_lowercase()))
            .count() as i64;

    // First five characters of the title, not bytes: filenames are not
    // guaranteed ASCII.
    let prefix: String = title.chars().take(5).collect();
    if prefix.chars().count() == 5 {
        score += chunk_lower.matches(&prefix.to_lowercase()).count() as i64;
    }

    score
}

/// Select the attempt-1 candidate chunks: score everything, keep chunks at or
/// above the score floor, cap at `max_chunks`, then restore document order by
/// origin index so the model reads the document front to back.
pub fn select_candidates(
    chunks: &[Chunk],
    components: &[String],
    title: &str,
    min_score: i64,
    max_chunks: usize,
) -> Vec<Chunk> {
    let mut scored: Vec<(&Chunk, i64)> = chunks
        .iter()
        .map(|c| (c, score_chunk(&c.text, components, title)))
        .filter(|(_, s)| *s >= min_score)
        .collect();

    // Rank best-first; sort is stable so equal scores keep document order.
    scored.sort_by_key(|(_, s)| std::cmp::Reverse(*s));
    scored.truncate(max_chunks);
    scored.sort_by_key(|(c, _)| c.origin);

    scored.into_iter().map(|(c, _)| c.clone()).collect()
}
