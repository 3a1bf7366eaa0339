//! Rule-based validation: merge partial extractions into canonical records.
//!
//! Grouping is by *exact*, case-sensitive `mpn` match. Suffix variants are
//! meaningful distinct parts (the extraction prompt instructs the model to
//! treat them as unique items), so no normalisation happens here.
//!
//! The merge is deterministic and local — no model call. Markings and package
//! cases are unioned across the group (sorted, comma-joined); description and
//! confidence take the first non-empty value in group order.

use crate::model::{CanonicalRecord, ExtractionItem};
use std::collections::BTreeSet;
use tracing::debug;

/// Merge all items sharing one `mpn` into one [`CanonicalRecord`] each,
/// preserving first-seen order of part numbers.
pub fn merge_items(items: &[ExtractionItem]) -> Vec<CanonicalRecord> {
    let mut order: Vec<&str> = Vec::new();
    for item in items {
        if !order.contains(&item.mpn.as_str()) {
            order.push(&item.mpn);
        }
    }

    let records: Vec<CanonicalRecord> = order
        .into_iter()
        .map(|mpn| {
            let group: Vec<&ExtractionItem> =
                items.iter().filter(|i| i.mpn == mpn).collect();
            merge_group(mpn, &group)
        })
        .collect();

    debug!(items = items.len(), records = records.len(), "validated");
    records
}

fn merge_group(mpn: &str, group: &[&ExtractionItem]) -> CanonicalRecord {
    let markings: BTreeSet<&str> = group
        .iter()
        .map(|i| i.top_marking.trim())
        .filter(|s| !s.is_empty())
        .collect();
    let packages: BTreeSet<&str> = group
        .iter()
        .map(|i| i.package_case.trim())
        .filter(|s| !s.is_empty())
        .collect();

    CanonicalRecord {
        mpn: mpn.to_string(),
        top_marking: join_sorted(&markings),
        package_case: join_sorted(&packages),
        description: group
            .iter()
            .map(|i| i.description.trim())
            .find(|s| !s.is_empty())
            .unwrap_or_default()
            .to_string(),
        confidence: group.iter().find_map(|i| i.confidence),
        validation_comment: String::new(),
        source: group
            .iter()
            .map(|i| i.source.as_str())
            .find(|s| !s.is_empty())
            .unwrap_or_default()
            .to_string(),
    }
}

fn join_sorted(values: &BTreeSet<&str>) -> String {
    values.iter().copied().collect::<Vec<_>>().join(", ")
}
