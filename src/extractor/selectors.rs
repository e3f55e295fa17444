//! Vocabulary of recognized chat-entry tags and the prioritized field
//! locators used against them.

use crate::dom::{Locator, Node};
use crate::types::MessageKind;

pub const TEXT_MESSAGE: &str = "live-chat-text-message";
pub const PAID_MESSAGE: &str = "live-chat-paid-message";
pub const PAID_STICKER: &str = "live-chat-paid-sticker";
pub const MEMBERSHIP_ITEM: &str = "live-chat-membership-item";
pub const LEGACY_PAID_MESSAGE: &str = "live-chat-legacy-paid-message";

/// Entry tags recognized as chat messages.
pub const MESSAGE_TAGS: [&str; 5] = [
    TEXT_MESSAGE,
    PAID_MESSAGE,
    PAID_STICKER,
    MEMBERSHIP_ITEM,
    LEGACY_PAID_MESSAGE,
];

/// Family prefix used as a broad fallback when a wrapper insertion holds
/// no known subtype.
pub const WILDCARD_PREFIX: &str = "live-chat-";

pub const AUTHOR: [Locator; 1] = [Locator::Id("author-name")];

pub const AUTHOR_PHOTO: [Locator; 2] = [
    Locator::IdThenTag("author-photo", "img"),
    Locator::Id("img"),
];

pub const TIMESTAMP: [Locator; 1] = [Locator::Id("timestamp")];

/// Content candidates for text messages, in priority order.
pub const TEXT_CONTENT: [Locator; 2] = [Locator::Id("message"), Locator::Id("content-text")];

/// Generic content element, first fallback for unrecognized shapes.
pub const GENERIC_CONTENT: [Locator; 1] = [Locator::Id("content")];

pub const PAID_AMOUNT: [Locator; 1] = [Locator::Id("purchase-amount")];
pub const STICKER_AMOUNT: [Locator; 1] = [Locator::Id("purchase-amount-chip")];
pub const STICKER_IMAGE: [Locator; 1] = [Locator::IdThenTag("sticker", "img")];

pub const MEMBERSHIP_HEADER: [Locator; 1] = [Locator::Id("header-primary-text")];
pub const MEMBERSHIP_SUBTEXT: [Locator; 1] = [Locator::Id("header-subtext")];

/// Substructures excluded from captured content: the rendered author line,
/// avatar and timestamp are never part of the message body.
pub const CONTENT_EXCLUDED: [Locator; 3] = [
    Locator::Id("author-name"),
    Locator::Id("author-photo"),
    Locator::Id("timestamp"),
];

pub fn classify(tag: &str) -> MessageKind {
    match tag {
        TEXT_MESSAGE => MessageKind::Text,
        PAID_MESSAGE | LEGACY_PAID_MESSAGE => MessageKind::Paid,
        PAID_STICKER => MessageKind::PaidSticker,
        MEMBERSHIP_ITEM => MessageKind::Membership,
        _ => MessageKind::Other,
    }
}

pub fn is_entry_tag(tag: &str) -> bool {
    MESSAGE_TAGS.contains(&tag)
}

/// Chat entries within an inserted subtree. Known subtype tags win; when a
/// wrapper holds none, anything in the live-chat family is taken as a
/// fallback so unrecognized renderer variants still surface.
pub fn find_entries(node: &Node) -> Vec<&Node> {
    let known = node.find_all_by_tags(&MESSAGE_TAGS);
    if !known.is_empty() {
        return known;
    }
    node.find_all_by_tag_prefix(WILDCARD_PREFIX)
}
