//! Markdown cleaning and section-aware chunking.
//!
//! Chunking splits on `## ` section boundaries first and accumulates
//! consecutive sections into a buffer until adding the next one would exceed
//! the word budget. A single section larger than the budget is emitted whole
//! as one oversized chunk rather than split mid-table — a known limitation,
//! accepted because cutting a table in half loses the column/row context the
//! model needs.
//!
//! Guarantee: every non-blank input character appears in exactly one output
//! chunk, in document order (verified by the completeness test below).

use crate::model::Chunk;
use once_cell::sync::Lazy;
use regex::Regex;

/// Table-of-contents leader lines ("Section 1 .......... 5").
static RE_TOC_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^.*\.{5,}.*\n?").unwrap());

/// Runs of two or more blank-ish separators.
static RE_MULTI_NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").unwrap());

/// Clean raw converted markdown before chunking.
///
/// Removes table-of-contents leader lines and normalises consecutive
/// newlines down to a standard double newline.
pub fn clean_markdown(document_text: &str) -> String {
    let cleaned = RE_TOC_LINE.replace_all(document_text, "");
    let cleaned = RE_MULTI_NEWLINE.replace_all(&cleaned, "\n\n");
    cleaned.trim().to_string()
}

/// Split cleaned markdown into chunks of at most `max_words` words,
/// preferring `## ` section boundaries.
pub fn chunk_markdown(md: &str, max_words: usize) -> Vec<Chunk> {
    let sections = split_sections(md);

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut buf = String::new();
    let mut buf_words = 0usize;

    for sec in sections {
        let sec = sec.trim();
        if sec.is_empty() {
            continue;
        }
        let sec_words = sec.split_whitespace().count();

        if buf_words + sec_words < max_words {
            buf.push_str(sec);
            buf.push('\n');
            buf_words += sec_words;
        } else {
            if !buf.trim().is_empty() {
                chunks.push(Chunk {
                    origin: chunks.len(),
                    text: buf.trim().to_string(),
                });
            }
            buf = format!("{sec}\n");
            buf_words = sec_words;
        }
    }

    if !buf.trim().is_empty() {
        chunks.push(Chunk {
            origin: chunks.len(),
            text: buf.trim().to_string(),
        });
    }

    chunks
}

/// Split markdown into sections, each starting at a `## ` heading line.
/// Text before the first heading forms its own leading section.
fn split_sections(md: &str) -> Vec<String> {
    let mut sections: Vec<String> = Vec::new();
    let mut current = String::new();

    for line in md.lines() {
        if is_section_heading(line) && !current.is_empty() {
            sections.push(std::mem::take(&mut current));
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.is_empty() {
        sections.push(current);
    }
    sections
}

fn is_section_heading(line: &str) -> bool {
    line.starts_with("## ") || line == "##"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<&str> {
        s.split_whitespace().collect()
    }

    #[test]
    fn clean_drops_toc_leaders_and_collapses_blanks() {
        let raw = "Intro\n\n\n\nSection 1 .......... 5\n## Features\ntext";
        let cleaned = clean_markdown(raw);
        assert!(!cleaned.contains(".........."));
        assert!(!cleaned.contains("\n\n\n"));
        assert!(cleaned.contains("## Features"));
    }

    #[test]
    fn chunk_completeness() {
        // Concatenating chunks (ignoring whitespace) reproduces all
        // non-blank content exactly once, in order.
        let md = "intro text here\n## A\nalpha beta gamma\n## B\ndelta epsilon\n## C\nzeta";
        let chunks = chunk_markdown(md, 5);
        let rejoined: Vec<&str> = chunks
            .iter()
            .flat_map(|c| c.text.split_whitespace())
            .collect();
        assert_eq!(rejoined, words(md));
        // Origin indices are dense and ordered.
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.origin, i);
        }
    }

    #[test]
    fn sections_accumulate_under_budget() {
        let md = "## A\none two\n## B\nthree four\n## C\nfive six";
        let chunks = chunk_markdown(md, 100);
        assert_eq!(chunks.len(), 1, "everything fits in one chunk");
        assert!(chunks[0].text.contains("## A"));
        assert!(chunks[0].text.contains("## C"));
    }

    #[test]
    fn oversized_section_emitted_whole() {
        let big_section = format!("## Big\n{}", "word ".repeat(50));
        let md = format!("## Small\na b\n{big_section}\n## Tail\nc d");
        let chunks = chunk_markdown(&md, 10);
        // The oversized section is one chunk, not split further.
        let big_chunk = chunks
            .iter()
            .find(|c| c.text.starts_with("## Big"))
            .expect("oversized section present");
        assert_eq!(big_chunk.word_count(), 52); // "##" + "Big" + 50 words
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_markdown("", 100).is_empty());
        assert!(chunk_markdown("   \n  \n", 100).is_empty());
    }
}
