//! Building blocks for merging handoffs
//!
//! [`LocalStore::merge_handoffs`](crate::LocalStore::merge_handoffs) drives
//! the algorithm; the functions here only shape text.

use crate::types::Handoff;

/// Separator placed between merged conversations
pub const SOURCE_SEPARATOR: &str = "\n\n---\n\n";

const ELLIPSIS: &str = "...";

/// Marker line that opens each source's section of a merged conversation
pub fn source_marker(handoff: &Handoff) -> String {
    format!("## [Merged from: {}] {}", handoff.key, handoff.title)
}

/// Concatenate source conversations in the given order
pub fn combine_conversations(sources: &[&Handoff]) -> String {
    sources
        .iter()
        .map(|handoff| {
            format!(
                "{}\n\n{}",
                source_marker(handoff),
                handoff.conversation.trim_end()
            )
        })
        .collect::<Vec<_>>()
        .join(SOURCE_SEPARATOR)
}

/// One-line digest per source, truncated to `max_bytes`
pub fn digest_summary(sources: &[&Handoff], max_bytes: usize) -> String {
    let mut summary = format!("Merged from {} handoffs:", sources.len());
    for handoff in sources {
        let first_line = handoff.summary.lines().next().unwrap_or("").trim();
        summary.push_str(&format!("\n- [{}] {}", handoff.key, first_line));
    }
    truncate_with_ellipsis(&summary, max_bytes)
}

/// Title used when the merge request does not name one
pub fn default_title(sources: &[&Handoff], max_chars: usize) -> String {
    let titles: Vec<&str> = sources.iter().map(|h| h.title.as_str()).collect();
    let title = format!("Merged: {}", titles.join(" + "));
    if title.chars().count() <= max_chars {
        return title;
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut truncated: String = title.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

/// Cut `text` to at most `max_bytes`, ending in an ellipsis when shortened
pub fn truncate_with_ellipsis(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes.saturating_sub(ELLIPSIS.len());
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &text[..end], ELLIPSIS)
}

/// A single value when every source agrees, otherwise the distinct values
/// joined with ", " in first-seen order
pub fn unify_values<'a, I>(values: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut distinct: Vec<&str> = Vec::new();
    for value in values {
        if !distinct.contains(&value) {
            distinct.push(value);
        }
    }
    distinct.join(", ")
}
