use super::*;
use crate::dom::Node;
use crate::types::MessageKind;

fn author_span(name: &str) -> Node {
    Node::element("span").with_id("author-name").with_text(name)
}

fn timestamp_span(display: &str) -> Node {
    Node::element("span").with_id("timestamp").with_text(display)
}

fn text_entry(id: &str, author: &str, body: &str) -> Node {
    Node::element(selectors::TEXT_MESSAGE)
        .with_id(id)
        .with_child(author_span(author))
        .with_child(timestamp_span("3:45"))
        .with_child(Node::element("span").with_id("message").with_text(body))
}

#[test]
fn extracts_plain_text_message() {
    let message = extract(&text_entry("abc123", "Alice", "hello chat")).unwrap();

    assert_eq!(message.id, "abc123");
    assert_eq!(message.author, "Alice");
    assert_eq!(message.content, "hello chat");
    assert_eq!(message.timestamp, "3:45");
    assert_eq!(message.kind, MessageKind::Text);
    assert_eq!(message.raw_type, selectors::TEXT_MESSAGE);
}

#[test]
fn native_id_is_idempotent() {
    let entry = text_entry("stable-id", "Alice", "hello");

    let first = extract(&entry).unwrap();
    let second = extract(&entry).unwrap();
    assert_eq!(first.id, second.id);
}

#[test]
fn data_attribute_id_wins_over_synthesis() {
    let entry = Node::element(selectors::TEXT_MESSAGE)
        .with_attr("data-message-id", "dm-77")
        .with_child(author_span("Bob"))
        .with_child(Node::element("span").with_id("message").with_text("yo"));

    assert_eq!(extract(&entry).unwrap().id, "dm-77");
}

#[test]
fn synthesized_id_embeds_author_and_content_prefix() {
    let entry = Node::element(selectors::TEXT_MESSAGE)
        .with_child(author_span("Carol"))
        .with_child(Node::element("span").with_id("message").with_text("a long enough body"));

    let message = extract(&entry).unwrap();
    assert!(message.id.starts_with("Carol_a long enough body_"));
}

#[test]
fn empty_content_without_image_is_rejected() {
    let entry = Node::element(selectors::TEXT_MESSAGE)
        .with_child(author_span("Dave"))
        .with_child(timestamp_span("0:10"))
        .with_child(Node::element("span").with_id("message").with_text("   "));

    assert!(extract(&entry).is_none());
}

#[test]
fn emoji_only_message_is_accepted() {
    let entry = Node::element(selectors::TEXT_MESSAGE)
        .with_id("emoji-1")
        .with_child(author_span("Eve"))
        .with_child(
            Node::element("span").with_id("message").with_child(
                Node::element("img")
                    .with_attr("src", "https://e.example/wave.png")
                    .with_attr("alt", "wave"),
            ),
        );

    let message = extract(&entry).unwrap();
    assert!(message.content.contains("<img src=\"https://e.example/wave.png\""));
}

#[test]
fn paid_message_keeps_amount_and_body_together() {
    let entry = Node::element(selectors::PAID_MESSAGE)
        .with_id("paid-1")
        .with_child(author_span("Frank"))
        .with_child(timestamp_span("1:02"))
        .with_child(
            Node::element("span")
                .with_id("purchase-amount")
                .with_text("$5.00"),
        )
        .with_child(
            Node::element("span")
                .with_id("message")
                .with_text("great stream"),
        );

    let message = extract(&entry).unwrap();
    assert_eq!(message.kind, MessageKind::Paid);
    assert!(message.content.contains("$5.00"));
    assert!(message.content.contains("great stream"));
    assert!(!message.content.contains("Frank"));
    assert!(!message.content.contains("1:02"));
}

#[test]
fn paid_amount_is_not_duplicated_when_embedded() {
    let entry = Node::element(selectors::PAID_MESSAGE)
        .with_id("paid-2")
        .with_child(
            Node::element("span")
                .with_id("purchase-amount")
                .with_text("$2.00"),
        )
        .with_child(Node::element("span").with_id("message").with_text("thanks"));

    let content = extract(&entry).unwrap().content;
    assert_eq!(content.matches("$2.00").count(), 1);
}

#[test]
fn legacy_paid_message_classifies_as_paid() {
    let entry = Node::element(selectors::LEGACY_PAID_MESSAGE)
        .with_id("legacy-1")
        .with_child(author_span("Grace"))
        .with_child(Node::element("span").with_id("message").with_text("hi"));

    assert_eq!(extract(&entry).unwrap().kind, MessageKind::Paid);
}

#[test]
fn paid_sticker_combines_amount_and_sticker_image() {
    let entry = Node::element(selectors::PAID_STICKER)
        .with_id("sticker-1")
        .with_child(author_span("Heidi"))
        .with_child(
            Node::element("span")
                .with_id("purchase-amount-chip")
                .with_text("$1.00"),
        )
        .with_child(
            Node::element("span").with_id("sticker").with_child(
                Node::element("img").with_attr("src", "https://e.example/cat.png"),
            ),
        );

    let message = extract(&entry).unwrap();
    assert_eq!(message.kind, MessageKind::PaidSticker);
    assert!(message.content.contains("$1.00"));
    assert!(message.content.contains("https://e.example/cat.png"));
}

#[test]
fn membership_joins_header_and_message() {
    let entry = Node::element(selectors::MEMBERSHIP_ITEM)
        .with_id("member-1")
        .with_child(author_span("Ivan"))
        .with_child(
            Node::element("span")
                .with_id("header-primary-text")
                .with_text("New member"),
        )
        .with_child(
            Node::element("span")
                .with_id("header-subtext")
                .with_text("Welcome!"),
        )
        .with_child(Node::element("span").with_id("message").with_text("glad to be here"));

    let message = extract(&entry).unwrap();
    assert_eq!(message.kind, MessageKind::Membership);
    assert!(message.content.contains("New member"));
    assert!(message.content.contains("Welcome!"));
    assert!(message.content.contains("glad to be here"));
}

#[test]
fn unknown_tag_falls_back_to_generic_content() {
    let entry = Node::element("live-chat-banner")
        .with_id("banner-1")
        .with_child(Node::element("span").with_id("content").with_text("pinned note"));

    let message = extract(&entry).unwrap();
    assert_eq!(message.kind, MessageKind::Other);
    assert_eq!(message.content, "pinned note");
}

#[test]
fn fallback_strips_author_and_timestamp_from_whole_copy() {
    let entry = Node::element("live-chat-viewer-engagement")
        .with_id("engage-1")
        .with_child(author_span("Judy"))
        .with_child(timestamp_span("2:10"))
        .with_child(Node::element("div").with_text("welcome to the stream"));

    let message = extract(&entry).unwrap();
    assert_eq!(message.content, "welcome to the stream");
}

#[test]
fn last_resort_text_walk_skips_clock_strings() {
    // No content element and nothing outside the excluded substructures,
    // so extraction falls through to the raw text walk.
    let entry = Node::element("live-chat-unknown")
        .with_id("walk-1")
        .with_child(author_span("Mallory"))
        .with_child(timestamp_span("12:34"));

    let message = extract(&entry).unwrap();
    assert_eq!(message.content, "Mallory");
}

#[test]
fn author_photo_resolves_from_photo_then_img() {
    let entry = Node::element(selectors::TEXT_MESSAGE)
        .with_id("photo-1")
        .with_child(
            Node::element("span").with_id("author-photo").with_child(
                Node::element("img").with_attr("src", "https://a.example/alice.png"),
            ),
        )
        .with_child(author_span("Alice"))
        .with_child(Node::element("span").with_id("message").with_text("hey"));

    let message = extract(&entry).unwrap();
    assert_eq!(
        message.author_photo.as_deref(),
        Some("https://a.example/alice.png")
    );
}

#[test]
fn missing_timestamp_gets_a_local_display_time() {
    let entry = Node::element(selectors::TEXT_MESSAGE)
        .with_id("no-ts")
        .with_child(author_span("Niaj"))
        .with_child(Node::element("span").with_id("message").with_text("hi"));

    let message = extract(&entry).unwrap();
    assert!(!message.timestamp.is_empty());
}

#[test]
fn find_entries_prefers_known_tags_over_wildcard() {
    let wrapper = Node::element("chat-item-wrapper")
        .with_child(text_entry("w-1", "Alice", "one"))
        .with_child(Node::element("live-chat-banner").with_text("pinned"));

    let entries = find_entries(&wrapper);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].tag(), selectors::TEXT_MESSAGE);
}

#[test]
fn find_entries_uses_wildcard_when_no_known_tags() {
    let wrapper = Node::element("chat-item-wrapper")
        .with_child(Node::element("live-chat-banner").with_text("pinned"));

    let entries = find_entries(&wrapper);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].tag(), "live-chat-banner");
}
