//! Turns a batch's text into webhook-sized payloads.

use std::sync::LazyLock;

use chanmirror_core::Message;
use chrono::{DateTime, Utc};
use regex::Regex;
use unicode_properties::{GeneralCategoryGroup, UnicodeGeneralCategory};

use crate::delivery::PayloadBody;

/// `<:name:id>` or `<a:name:id>` (animated).
static CUSTOM_EMOJI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<a?:[^:\s]+:\d+>$").expect("custom emoji pattern is valid"));

/// Quoted relative timestamp, rendered by the client as "5 minutes ago" etc.
pub fn relative_footer(at: DateTime<Utc>) -> String {
    format!("> <t:{}:R>", at.timestamp())
}

/// True when `text` is a lone custom emoji, or nothing but symbols, marks
/// and format characters (emoji sequences, ZWJ families, flags).
pub fn is_pictograph_only(text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() {
        return false;
    }
    if CUSTOM_EMOJI.is_match(text) {
        return true;
    }
    text.chars().all(|c| {
        !matches!(
            c.general_category_group(),
            GeneralCategoryGroup::Letter
                | GeneralCategoryGroup::Number
                | GeneralCategoryGroup::Punctuation
                | GeneralCategoryGroup::Separator
        )
    })
}

/// Split `text` into pieces of at most `limit` characters.
///
/// Cuts fall on the last newline before the limit (the newline starts the
/// next piece), else exactly at the limit. Concatenating the pieces gives
/// back `text`.
pub fn split_text(text: &str, limit: usize) -> Vec<&str> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    loop {
        let window_end = match rest.char_indices().nth(limit) {
            Some((i, _)) => i,
            None => {
                chunks.push(rest);
                return chunks;
            }
        };
        let cut = match rest[..window_end].rfind('\n') {
            Some(i) if i > 0 => i,
            _ => window_end,
        };
        let (head, tail) = rest.split_at(cut);
        chunks.push(head);
        rest = tail;
    }
}

/// Non-blank message texts of a batch, one per line. `None` if all are blank.
pub fn batch_text(messages: &[Message]) -> Option<String> {
    let parts: Vec<&str> = messages
        .iter()
        .map(|m| m.content.as_str())
        .filter(|c| !c.trim().is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join("\n"))
}

/// The text payloads for one batch, in send order.
///
/// The footer references the batch's last message. A pictograph-only batch
/// is sent verbatim and the footer follows as a separate payload, so the
/// client still renders the emoji large.
pub fn text_bodies(messages: &[Message], limit: usize) -> Vec<PayloadBody> {
    let (Some(text), Some(last)) = (batch_text(messages), messages.last()) else {
        return Vec::new();
    };
    let footer = relative_footer(last.created_at);

    if is_pictograph_only(&text) {
        return vec![PayloadBody::text(text), PayloadBody::text(footer)];
    }

    let chunks = split_text(&text, limit);
    let last_idx = chunks.len() - 1;
    let mut bodies = Vec::with_capacity(chunks.len() + 1);
    for (i, chunk) in chunks.into_iter().enumerate() {
        if i < last_idx {
            bodies.push(PayloadBody::text(chunk));
            continue;
        }
        // +1 for the newline joining content and footer.
        if chunk.chars().count() + 1 + footer.chars().count() <= limit {
            bodies.push(PayloadBody::Text {
                content: chunk.to_string(),
                footer: Some(footer.clone()),
            });
        } else {
            bodies.push(PayloadBody::text(chunk));
            bodies.push(PayloadBody::text(footer.clone()));
        }
    }
    bodies
}
