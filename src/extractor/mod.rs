//! Chat entry normalization.
//!
//! [`extract`] maps one raw structural node to a [`ChatMessage`], or rejects
//! it when the node carries no readable content. Classification and field
//! lookup follow a fixed vocabulary of entry tags and prioritized locator
//! candidates per field; monetary entries keep amount and body together.

mod selectors;

#[cfg(test)]
mod tests;

pub use selectors::{MESSAGE_TAGS, WILDCARD_PREFIX, find_entries, is_entry_tag};

use crate::dom::Node;
use crate::types::{ChatMessage, MessageKind};

/// Content captured from an entry, with the plain-text part and image
/// presence tracked separately from the rendered markup.
struct Captured {
    markup: String,
    text: String,
    has_image: bool,
}

impl Captured {
    fn from_node(node: &Node) -> Self {
        Self {
            markup: node.to_markup(),
            text: node.text_content(),
            has_image: node.contains_image(),
        }
    }

    fn from_text(text: String) -> Self {
        Self {
            markup: text.clone(),
            text,
            has_image: false,
        }
    }

    /// Empty text with no embedded image means nothing worth delivering.
    fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && !self.has_image
    }
}

/// Extracts a normalized [`ChatMessage`] from one chat entry node.
///
/// Returns `None` when the resulting content is empty text with no embedded
/// image; an emoji- or sticker-only entry is valid. Malformed shapes are
/// discarded the same way and never fail the surrounding batch.
pub fn extract(node: &Node) -> Option<ChatMessage> {
    let kind = selectors::classify(node.tag());

    let author = node
        .find_first(&selectors::AUTHOR)
        .map(|found| found.text_content().trim().to_string())
        .unwrap_or_default();

    let author_photo = node
        .find_first(&selectors::AUTHOR_PHOTO)
        .and_then(|found| found.attr("src"))
        .map(str::to_string);

    let timestamp = node
        .find_first(&selectors::TIMESTAMP)
        .map(|found| found.text_content().trim().to_string())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(local_time_display);

    let captured = capture_content(node, kind);
    if captured.is_empty() {
        return None;
    }
    let content = captured.markup.trim().to_string();

    let id = resolve_id(node, &author, &content);

    Some(ChatMessage {
        id,
        author,
        author_photo,
        content,
        timestamp,
        kind,
        raw_type: node.tag().to_string(),
    })
}

fn capture_content(node: &Node, kind: MessageKind) -> Captured {
    let primary = match kind {
        MessageKind::Text => node
            .find_first(&selectors::TEXT_CONTENT)
            .map(Captured::from_node),
        MessageKind::Paid => Some(paid_content(node)),
        MessageKind::PaidSticker => sticker_content(node),
        MessageKind::Membership => membership_content(node),
        MessageKind::Other => None,
    };

    match primary {
        Some(captured) if !captured.is_empty() => captured,
        _ => fallback_content(node),
    }
}

/// Monetary entries keep the whole inner structure minus author and
/// timestamp, so the rendered amount and message stay together. When a
/// separate amount element exists and its text is not already embedded in
/// the captured content, it is prefixed.
fn paid_content(node: &Node) -> Captured {
    let stripped = node.clone_without(&selectors::CONTENT_EXCLUDED);
    let mut captured = Captured::from_node(&stripped);

    if let Some(amount) = node.find_first(&selectors::PAID_AMOUNT) {
        let amount_text = amount.text_content().trim().to_string();
        if !amount_text.is_empty() && !captured.text.contains(&amount_text) {
            captured.markup = format!("{} {}", amount_text, captured.markup);
            captured.text = format!("{} {}", amount_text, captured.text);
        }
    }

    captured
}

fn sticker_content(node: &Node) -> Option<Captured> {
    let amount = node
        .find_first(&selectors::STICKER_AMOUNT)
        .map(|found| found.text_content().trim().to_string())
        .filter(|text| !text.is_empty());
    let sticker = node.find_first(&selectors::STICKER_IMAGE);

    if amount.is_none() && sticker.is_none() {
        return None;
    }

    let mut segments = Vec::new();
    let mut has_image = false;
    if let Some(amount) = &amount {
        segments.push(amount.clone());
    }
    if let Some(sticker) = sticker {
        segments.push(sticker.to_markup());
        has_image = sticker.contains_image();
    }

    Some(Captured {
        markup: segments.join(" ").trim().to_string(),
        text: amount.unwrap_or_default(),
        has_image,
    })
}

fn membership_content(node: &Node) -> Option<Captured> {
    let parts: Vec<&Node> = [
        node.find_first(&selectors::MEMBERSHIP_HEADER),
        node.find_first(&selectors::MEMBERSHIP_SUBTEXT),
        node.find_first(&selectors::TEXT_CONTENT),
    ]
    .into_iter()
    .flatten()
    .collect();

    if parts.is_empty() {
        return None;
    }

    let markup: Vec<String> = parts
        .iter()
        .map(|part| part.to_markup())
        .filter(|text| !text.trim().is_empty())
        .collect();
    let text: Vec<String> = parts
        .iter()
        .map(|part| part.text_content())
        .filter(|text| !text.trim().is_empty())
        .collect();

    Some(Captured {
        markup: markup.join(" "),
        text: text.join(" "),
        has_image: parts.iter().any(|part| part.contains_image()),
    })
}

/// Fallback chain for shapes the subtype paths could not read: a generic
/// content element, then a structural copy of the whole entry minus
/// author/photo/timestamp, then a bare text walk.
fn fallback_content(node: &Node) -> Captured {
    if let Some(generic) = node.find_first(&selectors::GENERIC_CONTENT) {
        let captured = Captured::from_node(generic);
        if !captured.is_empty() {
            return captured;
        }
    }

    let stripped = node.clone_without(&selectors::CONTENT_EXCLUDED);
    let captured = Captured::from_node(&stripped);
    if !captured.is_empty() {
        return captured;
    }

    Captured::from_text(node.text_walk_excluding_clock())
}

/// Identity resolution order: native `id` attribute, explicit
/// `data-message-id`, then a synthesized id. Synthesized ids embed the
/// current time and a random suffix, so re-extracting the same entry can
/// yield a different id; downstream consumers tolerate the resulting
/// duplicate rather than this layer guessing at stability.
fn resolve_id(node: &Node, author: &str, content: &str) -> String {
    if let Some(id) = node.attr("id").filter(|value| !value.is_empty()) {
        return id.to_string();
    }
    if let Some(id) = node
        .attr("data-message-id")
        .filter(|value| !value.is_empty())
    {
        return id.to_string();
    }

    let prefix: String = content.chars().take(20).collect();
    format!(
        "{}_{}_{}_{}",
        author,
        prefix,
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u32>()
    )
}

fn local_time_display() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
