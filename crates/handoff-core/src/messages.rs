//! Message-bounded views of a conversation
//!
//! Conversations are Markdown where each message starts with a `## User`
//! or `## Assistant` heading. Anything before the first heading is treated
//! as preamble and is dropped together with the omitted messages.

use std::ops::RangeInclusive;

/// Accepted values for `max_messages`
pub const MAX_MESSAGES_RANGE: RangeInclusive<usize> = 1..=10_000;

const MESSAGE_HEADINGS: [&str; 2] = ["## User", "## Assistant"];

fn is_message_heading(line: &str) -> bool {
    MESSAGE_HEADINGS
        .iter()
        .any(|heading| line.starts_with(heading))
}

/// Byte offsets of every message heading in `conversation`
fn message_offsets(conversation: &str) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut offset = 0;
    for line in conversation.split_inclusive('\n') {
        if is_message_heading(line) {
            offsets.push(offset);
        }
        offset += line.len();
    }
    offsets
}

/// Keep only the last `max_messages` messages of `conversation`
///
/// Returns the conversation unchanged when it has no more messages than
/// requested. Otherwise the result starts with a note saying how many
/// messages were left out.
pub fn truncate_messages(conversation: &str, max_messages: usize) -> String {
    let offsets = message_offsets(conversation);
    if offsets.len() <= max_messages {
        return conversation.to_string();
    }

    let omitted = offsets.len() - max_messages;
    let keep_from = offsets[omitted];
    format!(
        "*[{} earlier message(s) omitted, showing last {} of {}]*\n\n{}",
        omitted,
        max_messages,
        offsets.len(),
        &conversation[keep_from..]
    )
}
