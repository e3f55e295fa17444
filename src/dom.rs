//! Structural node representation of the host page.
//!
//! The scraper does not depend on any real browser DOM. Chat entries are
//! plain trees of [`Node`] values, and the live chat list is a [`LiveList`]
//! that emits insertion batches to subscribers. Integrations feed whatever
//! node representation their environment uses into this shape.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::{Arc, Mutex, RwLock};

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::broadcast;

/// Bare `mm:ss` clock strings, excluded by the text walk.
static CLOCK_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}:\d{2}$").expect("valid clock regex"));

const INSERTION_BUFFER: usize = 100;

/// Tag name used for text nodes.
pub const TEXT_TAG: &str = "#text";

/// One structural node: an element with a tag, attributes and children, or
/// a text node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    tag: String,
    attrs: HashMap<String, String>,
    text: Option<String>,
    children: Vec<Node>,
}

/// Candidate locator for a sub-element, matched in document order against
/// all descendants of the node being searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator {
    /// Element whose `id` attribute equals the value
    Id(&'static str),
    /// Element by tag name
    Tag(&'static str),
    /// Descendant with the given tag, under the element with the given id
    IdThenTag(&'static str, &'static str),
}

impl Node {
    pub fn element(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: HashMap::new(),
            text: None,
            children: Vec::new(),
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self {
            tag: TEXT_TAG.to_string(),
            attrs: HashMap::new(),
            text: Some(content.into()),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn with_id(self, id: impl Into<String>) -> Self {
        self.with_attr("id", id)
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// Appends a text child.
    pub fn with_text(self, content: impl Into<String>) -> Self {
        self.with_child(Node::text(content))
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn is_text(&self) -> bool {
        self.tag == TEXT_TAG
    }

    fn matches(&self, locator: &Locator) -> bool {
        match locator {
            Locator::Id(id) => self.attr("id") == Some(id),
            Locator::Tag(tag) => self.tag == *tag,
            Locator::IdThenTag(id, _) => self.attr("id") == Some(id),
        }
    }

    /// Depth-first search of descendants for the locator. The node itself
    /// is not a candidate, mirroring sub-element lookup on a chat entry.
    pub fn find(&self, locator: &Locator) -> Option<&Node> {
        for child in &self.children {
            if child.matches(locator) {
                match locator {
                    Locator::IdThenTag(_, tag) => {
                        if let Some(inner) = child.find(&Locator::Tag(tag)) {
                            return Some(inner);
                        }
                    }
                    _ => return Some(child),
                }
            }
            if let Some(found) = child.find(locator) {
                return Some(found);
            }
        }
        None
    }

    /// First candidate locator that resolves to a node wins.
    pub fn find_first(&self, candidates: &[Locator]) -> Option<&Node> {
        candidates.iter().find_map(|locator| self.find(locator))
    }

    /// All nodes in this subtree (self included) whose tag is one of `tags`,
    /// in document order. Matched subtrees are not descended into.
    pub fn find_all_by_tags<'a>(&'a self, tags: &[&str]) -> Vec<&'a Node> {
        let mut found = Vec::new();
        self.collect_by(&mut found, &|node| tags.contains(&node.tag()));
        found
    }

    /// All nodes in this subtree (self included) whose tag starts with
    /// `prefix`, in document order. Matched subtrees are not descended into.
    pub fn find_all_by_tag_prefix<'a>(&'a self, prefix: &str) -> Vec<&'a Node> {
        let mut found = Vec::new();
        self.collect_by(&mut found, &|node| node.tag().starts_with(prefix));
        found
    }

    fn collect_by<'a>(&'a self, found: &mut Vec<&'a Node>, matches: &dyn Fn(&Node) -> bool) {
        if matches(self) {
            found.push(self);
            return;
        }
        for child in &self.children {
            child.collect_by(found, matches);
        }
    }

    /// Structural copy of this node minus any descendant matching one of
    /// the excluded locators.
    pub fn clone_without(&self, excluded: &[Locator]) -> Node {
        Node {
            tag: self.tag.clone(),
            attrs: self.attrs.clone(),
            text: self.text.clone(),
            children: self
                .children
                .iter()
                .filter(|child| !excluded.iter().any(|locator| child.matches(locator)))
                .map(|child| child.clone_without(excluded))
                .collect(),
        }
    }

    /// Renders text content plus inline `<img>` markup, in document order.
    pub fn to_markup(&self) -> String {
        let mut segments = Vec::new();
        self.collect_markup(&mut segments);
        segments.join(" ")
    }

    fn collect_markup(&self, segments: &mut Vec<String>) {
        if let Some(text) = &self.text {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                segments.push(trimmed.to_string());
            }
        }
        if self.tag == "img" {
            if let Some(src) = self.attr("src") {
                let alt = self.attr("alt").unwrap_or_default();
                segments.push(format!("<img src=\"{}\" alt=\"{}\">", src, alt));
            }
        }
        for child in &self.children {
            child.collect_markup(segments);
        }
    }

    /// True when this subtree embeds at least one image with a source.
    pub fn contains_image(&self) -> bool {
        if self.tag == "img" && self.attr("src").is_some() {
            return true;
        }
        self.children.iter().any(Node::contains_image)
    }

    /// Concatenated text content of this subtree.
    pub fn text_content(&self) -> String {
        let mut segments = Vec::new();
        self.collect_text(&mut segments, false);
        segments.join(" ")
    }

    /// Concatenates all text nodes except bare `mm:ss` clock strings.
    /// Last-resort content extraction for unrecognized entry shapes.
    pub fn text_walk_excluding_clock(&self) -> String {
        let mut segments = Vec::new();
        self.collect_text(&mut segments, true);
        segments.join(" ")
    }

    fn collect_text(&self, segments: &mut Vec<String>, skip_clock: bool) {
        if let Some(text) = &self.text {
            let trimmed = text.trim();
            if !trimmed.is_empty() && !(skip_clock && CLOCK_TEXT.is_match(trimmed)) {
                segments.push(trimmed.to_string());
            }
        }
        for child in &self.children {
            child.collect_text(segments, skip_clock);
        }
    }
}

/// The live-updating chat item list. Appends are visible to [`snapshot`]
/// immediately and emitted to subscribers as index ranges, so a deferred
/// reader observes the item's current state rather than the state at
/// insertion time.
///
/// [`snapshot`]: LiveList::snapshot
#[derive(Debug)]
pub struct LiveList {
    items: Mutex<Vec<Node>>,
    insertions: broadcast::Sender<Range<usize>>,
}

impl LiveList {
    pub fn new() -> Self {
        let (insertions, _) = broadcast::channel(INSERTION_BUFFER);
        Self {
            items: Mutex::new(Vec::new()),
            insertions,
        }
    }

    /// Appends one node, returning its index.
    pub fn append(&self, node: Node) -> usize {
        self.append_batch(vec![node]).start
    }

    /// Appends a batch of nodes, emitting a single insertion event.
    pub fn append_batch(&self, nodes: Vec<Node>) -> Range<usize> {
        let range = {
            let mut items = self.items.lock().expect("live list lock poisoned");
            let start = items.len();
            items.extend(nodes);
            start..items.len()
        };
        if !range.is_empty() {
            let _ = self.insertions.send(range.clone());
        }
        range
    }

    /// Replaces the node at `index` in place, without an insertion event.
    /// Hosts use this when an entry's inner content finishes populating
    /// after the initial insert.
    pub fn replace(&self, index: usize, node: Node) {
        let mut items = self.items.lock().expect("live list lock poisoned");
        if index < items.len() {
            items[index] = node;
        }
    }

    pub fn item(&self, index: usize) -> Option<Node> {
        self.items
            .lock()
            .expect("live list lock poisoned")
            .get(index)
            .cloned()
    }

    pub fn snapshot(&self) -> Vec<Node> {
        self.items.lock().expect("live list lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("live list lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Range<usize>> {
        self.insertions.subscribe()
    }
}

impl Default for LiveList {
    fn default() -> Self {
        Self::new()
    }
}

/// The host page: its visible body text, scanned for stream-unavailable
/// phrases, and a chat container slot that may be installed after creation
/// when the chat list renders late.
#[derive(Debug, Default)]
pub struct LivePage {
    body_text: RwLock<String>,
    container: RwLock<Option<Arc<LiveList>>>,
}

impl LivePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(container: Arc<LiveList>) -> Self {
        let page = Self::new();
        page.install_container(container);
        page
    }

    pub fn set_body_text(&self, text: impl Into<String>) {
        *self.body_text.write().expect("page text lock poisoned") = text.into();
    }

    pub fn body_text(&self) -> String {
        self.body_text
            .read()
            .expect("page text lock poisoned")
            .clone()
    }

    pub fn install_container(&self, container: Arc<LiveList>) {
        *self.container.write().expect("page container lock poisoned") = Some(container);
    }

    pub fn container(&self) -> Option<Arc<LiveList>> {
        self.container
            .read()
            .expect("page container lock poisoned")
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_with_author() -> Node {
        Node::element("live-chat-text-message")
            .with_id("entry-1")
            .with_child(Node::element("span").with_id("author-name").with_text("Alice"))
            .with_child(Node::element("span").with_id("timestamp").with_text("3:45"))
            .with_child(Node::element("span").with_id("message").with_text("hello chat"))
    }

    #[test]
    fn find_resolves_first_candidate() {
        let entry = entry_with_author();

        let author = entry.find_first(&[Locator::Id("author-name")]).unwrap();
        assert_eq!(author.text_content(), "Alice");

        let missing = entry.find_first(&[Locator::Id("no-such-id")]);
        assert!(missing.is_none());
    }

    #[test]
    fn find_id_then_tag_reaches_descendant() {
        let entry = Node::element("live-chat-text-message").with_child(
            Node::element("span")
                .with_id("author-photo")
                .with_child(Node::element("img").with_attr("src", "https://a.example/p.png")),
        );

        let img = entry
            .find(&Locator::IdThenTag("author-photo", "img"))
            .unwrap();
        assert_eq!(img.attr("src"), Some("https://a.example/p.png"));
    }

    #[test]
    fn clone_without_drops_excluded_substructures() {
        let entry = entry_with_author();
        let stripped = entry.clone_without(&[Locator::Id("author-name"), Locator::Id("timestamp")]);

        assert_eq!(stripped.to_markup(), "hello chat");
        assert!(stripped.find(&Locator::Id("author-name")).is_none());
    }

    #[test]
    fn markup_renders_inline_images() {
        let message = Node::element("span")
            .with_id("message")
            .with_text("nice")
            .with_child(
                Node::element("img")
                    .with_attr("src", "https://e.example/smile.png")
                    .with_attr("alt", "smile"),
            );

        let markup = message.to_markup();
        assert!(markup.starts_with("nice"));
        assert!(markup.contains("<img src=\"https://e.example/smile.png\" alt=\"smile\">"));
        assert!(message.contains_image());
    }

    #[test]
    fn text_walk_skips_clock_strings() {
        let entry = entry_with_author();

        let walked = entry.text_walk_excluding_clock();
        assert!(walked.contains("Alice"));
        assert!(walked.contains("hello chat"));
        assert!(!walked.contains("3:45"));

        // A chat line that merely embeds a clock string is not a timestamp.
        let line = Node::text("see you at 10:30 tomorrow");
        assert_eq!(
            line.text_walk_excluding_clock(),
            "see you at 10:30 tomorrow"
        );
    }

    #[test]
    fn find_all_by_tags_stops_at_matches() {
        let wrapper = Node::element("wrapper")
            .with_child(entry_with_author())
            .with_child(Node::element("other").with_child(entry_with_author()));

        let entries = wrapper.find_all_by_tags(&["live-chat-text-message"]);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn find_all_by_tag_prefix_matches_family() {
        let wrapper = Node::element("wrapper")
            .with_child(Node::element("live-chat-banner").with_text("pinned"))
            .with_child(Node::element("unrelated"));

        let family = wrapper.find_all_by_tag_prefix("live-chat-");
        assert_eq!(family.len(), 1);
        assert_eq!(family[0].tag(), "live-chat-banner");
    }

    #[tokio::test]
    async fn live_list_emits_insertion_ranges() {
        let list = LiveList::new();
        let mut insertions = list.subscribe();

        list.append(entry_with_author());
        list.append_batch(vec![entry_with_author(), entry_with_author()]);

        assert_eq!(insertions.recv().await.unwrap(), 0..1);
        assert_eq!(insertions.recv().await.unwrap(), 1..3);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn live_list_replace_updates_item_in_place() {
        let list = LiveList::new();
        let index = list.append(Node::element("live-chat-text-message"));

        list.replace(index, entry_with_author());

        let item = list.item(index).unwrap();
        assert!(item.find(&Locator::Id("message")).is_some());
    }

    #[test]
    fn page_container_can_be_installed_late() {
        let page = LivePage::new();
        assert!(page.container().is_none());

        page.install_container(Arc::new(LiveList::new()));
        assert!(page.container().is_some());
    }
}
