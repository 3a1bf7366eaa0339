//! Markdown table isolation.
//!
//! Most datasheets expose their part-number matrix in tables, so attempt 1 of
//! the extraction loop works from table regions only. A table is a header row
//! of pipe-delimited cells, immediately followed by a separator row (dashes,
//! colons, pipes), immediately followed by one or more data rows. Each table
//! keeps the nearest preceding `##` heading that appears after the previous
//! table, because the heading ("Ordering information", "Marking") is often
//! the only hint telling the model which column is the part number.
//!
//! Blocks still containing a table-of-contents leader (five or more dots)
//! are dropped; the text cleaner removes those lines but a leader embedded in
//! a table row survives it.

use once_cell::sync::Lazy;
use regex::Regex;

/// Header row, separator row, one or more data rows.
static RE_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*\|.*\|[ \t]*\n[ \t]*\|[-|: ]+\|.*\n(?:^[ \t]*\|.*\|[ \t]*\n?)+",
    )
    .unwrap()
});

/// One extracted table region and its optional heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBlock {
    pub heading: Option<String>,
    pub table: String,
}

/// Extract all markdown tables with their nearest preceding heading,
/// preserving document order.
pub fn extract_tables(markdown: &str) -> Vec<TableBlock> {
    let mut blocks = Vec::new();
    let mut prev_end = 0usize;

    for m in RE_TABLE.find_iter(markdown) {
        let table = m.as_str().trim();
        let preceding = &markdown[prev_end..m.start()];
        prev_end = m.end();

        // Dedup guard against the text cleaner: a TOC leader inside the
        // matched block means this is a mis-detected contents listing.
        if table.contains(".....") {
            continue;
        }

        let heading = preceding
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with("##"))
            .next_back()
            .map(str::to_string);

        blocks.push(TableBlock {
            heading,
            table: table.to_string(),
        });
    }

    blocks
}

/// Concatenate table blocks into the attempt-1 chunking input.
///
/// Headings are re-attached above their tables and entries are separated by
/// a horizontal rule so the chunker's section splitting still sees the `##`
/// boundaries.
pub fn tables_to_text(blocks: &[TableBlock]) -> String {
    blocks
        .iter()
        .map(|b| match &b.heading {
            Some(h) => format!("{h}\n{}", b.table),
            None => b.table.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}
