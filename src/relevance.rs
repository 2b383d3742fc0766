// src/relevance.rs
//! Relevance gate: keyword substring match over title and body.

use crate::ingest::types::RawItem;
use crate::sources::Source;

/// True if the item's title or body contains, case-insensitively, at least one of the
/// source's keywords. Sources without keywords accept everything.
///
/// Plain substring matching (not tokenized) so short keyword lists keep high recall,
/// including for CJK text that has no word boundaries.
pub fn matches(item: &RawItem, source: &Source) -> bool {
    if source.keywords.is_empty() {
        return true;
    }
    let title = item.title.to_lowercase();
    let body = item.body.to_lowercase();
    source
        .keywords
        .iter()
        .map(|k| k.to_lowercase())
        .filter(|k| !k.is_empty())
        .any(|k| title.contains(&k) || body.contains(&k))
}

/// Keywords of `source` that hit this item, for diagnostics.
pub fn matched_keywords<'a>(item: &RawItem, source: &'a Source) -> Vec<&'a str> {
    let title = item.title.to_lowercase();
    let body = item.body.to_lowercase();
    source
        .keywords
        .iter()
        .filter(|k| {
            let k = k.to_lowercase();
            !k.is_empty() && (title.contains(&k) || body.contains(&k))
        })
        .map(String::as_str)
        .collect()
}
