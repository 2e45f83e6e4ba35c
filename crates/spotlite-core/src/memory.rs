#![forbid(unsafe_code)]

//! Deterministic in-memory hosts.
//!
//! [`MemoryDocument`] models just enough of a page for the controller: a
//! head and body that may or may not exist yet, style elements keyed by id,
//! and flat elements with classes, an inline background-image and an inline
//! filter. [`MemoryColorScheme`] holds a fixed preference the caller flips.
//! Both count live observers/subscriptions so single-instance invariants can
//! be asserted.

use std::collections::BTreeSet;

use crate::document::{ColorSchemeSource, Document, SubscriptionId, WatchId};
use crate::error::DomError;

/// Element handle in a [`MemoryDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Default)]
struct MemoryElement {
    classes: BTreeSet<String>,
    background_image: Option<String>,
    filter: Option<String>,
}

/// In-memory page.
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    head: bool,
    body: bool,
    styles: Vec<(String, String)>,
    elements: Vec<MemoryElement>,
    next_watch: u64,
    live_watchers: BTreeSet<WatchId>,
    fail_style_writes: bool,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    /// A fully loaded page with head and body.
    #[must_use]
    pub fn new() -> Self {
        Self {
            head: true,
            body: true,
            styles: Vec::new(),
            elements: Vec::new(),
            next_watch: 1,
            live_watchers: BTreeSet::new(),
            fail_style_writes: false,
        }
    }

    /// A page whose head and body have not been parsed yet.
    #[must_use]
    pub fn loading() -> Self {
        Self {
            head: false,
            body: false,
            ..Self::new()
        }
    }

    /// Toggle whether `document.head` exists.
    pub fn set_head_ready(&mut self, ready: bool) {
        self.head = ready;
    }

    /// Toggle whether `document.body` exists.
    pub fn set_body_ready(&mut self, ready: bool) {
        self.body = ready;
    }

    /// Make every subsequent style write fail with a host error.
    pub fn set_fail_style_writes(&mut self, fail: bool) {
        self.fail_style_writes = fail;
    }

    /// Insert a plain element.
    pub fn insert_element(&mut self) -> NodeId {
        self.elements.push(MemoryElement::default());
        NodeId(self.elements.len() - 1)
    }

    /// Insert an element with an inline background-image.
    pub fn insert_background_element(&mut self, url: &str) -> NodeId {
        let id = self.insert_element();
        self.set_background_image(id, Some(url));
        id
    }

    /// Set or clear an element's inline background-image.
    pub fn set_background_image(&mut self, id: NodeId, url: Option<&str>) {
        if let Some(el) = self.elements.get_mut(id.0) {
            el.background_image = url.map(|u| format!("url(\"{u}\")"));
        }
    }

    /// Set an element's inline filter as the page itself would.
    pub fn set_page_filter(&mut self, id: NodeId, filter: &str) {
        if let Some(el) = self.elements.get_mut(id.0) {
            el.filter = Some(filter.to_owned());
        }
    }

    /// Add a class as the page itself would.
    pub fn add_page_class(&mut self, id: NodeId, class: &str) {
        if let Some(el) = self.elements.get_mut(id.0) {
            el.classes.insert(class.to_owned());
        }
    }

    /// Inline filter of an element, `None` when the property is absent.
    #[must_use]
    pub fn filter_of(&self, id: NodeId) -> Option<&str> {
        self.elements.get(id.0).and_then(|el| el.filter.as_deref())
    }

    /// Class list of an element.
    #[must_use]
    pub fn classes_of(&self, id: NodeId) -> Vec<&str> {
        self.elements
            .get(id.0)
            .map(|el| el.classes.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Content of the style element `id`.
    #[must_use]
    pub fn style_css(&self, id: &str) -> Option<&str> {
        self.styles
            .iter()
            .find(|(style_id, _)| style_id == id)
            .map(|(_, css)| css.as_str())
    }

    /// Ids of all style elements in document order.
    #[must_use]
    pub fn style_ids(&self) -> Vec<&str> {
        self.styles.iter().map(|(id, _)| id.as_str()).collect()
    }

    /// Number of elements carrying `marker`.
    #[must_use]
    pub fn marker_count(&self, marker: &str) -> usize {
        self.elements
            .iter()
            .filter(|el| el.classes.contains(marker))
            .count()
    }

    /// Number of observers that have not been disconnected.
    #[must_use]
    pub fn live_watchers(&self) -> usize {
        self.live_watchers.len()
    }

    fn element(&self, id: &NodeId) -> Option<&MemoryElement> {
        self.elements.get(id.0)
    }

    fn element_mut(&mut self, id: &NodeId) -> Option<&mut MemoryElement> {
        self.elements.get_mut(id.0)
    }
}

impl Document for MemoryDocument {
    type Element = NodeId;

    fn has_head(&self) -> bool {
        self.head
    }

    fn has_body(&self) -> bool {
        self.body
    }

    fn style_element_exists(&self, id: &str) -> bool {
        self.styles.iter().any(|(style_id, _)| style_id == id)
    }

    fn upsert_style_element(&mut self, id: &str, css: &str) -> Result<(), DomError> {
        if !self.head {
            return Err(DomError::HeadUnavailable);
        }
        if self.fail_style_writes {
            return Err(DomError::Host(format!("style write to #{id} refused")));
        }
        match self.styles.iter_mut().find(|(style_id, _)| style_id == id) {
            Some((_, existing)) => css.clone_into(existing),
            None => self.styles.push((id.to_owned(), css.to_owned())),
        }
        Ok(())
    }

    fn remove_style_element(&mut self, id: &str) -> bool {
        let before = self.styles.len();
        self.styles.retain(|(style_id, _)| style_id != id);
        self.styles.len() != before
    }

    fn background_image_elements(&self, excluding_marker: &str) -> Vec<NodeId> {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, el)| el.background_image.is_some() && !el.classes.contains(excluding_marker))
            .map(|(idx, _)| NodeId(idx))
            .collect()
    }

    fn marked_elements(&self, marker: &str) -> Vec<NodeId> {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, el)| el.classes.contains(marker))
            .map(|(idx, _)| NodeId(idx))
            .collect()
    }

    fn has_background_image(&self, element: &NodeId) -> bool {
        self.element(element)
            .is_some_and(|el| el.background_image.is_some())
    }

    fn has_marker(&self, element: &NodeId, marker: &str) -> bool {
        self.element(element)
            .is_some_and(|el| el.classes.contains(marker))
    }

    fn add_marker(&mut self, element: &NodeId, marker: &str) {
        if let Some(el) = self.element_mut(element) {
            el.classes.insert(marker.to_owned());
        }
    }

    fn remove_marker(&mut self, element: &NodeId, marker: &str) {
        if let Some(el) = self.element_mut(element) {
            el.classes.remove(marker);
        }
    }

    fn inline_filter(&self, element: &NodeId) -> String {
        self.element(element)
            .and_then(|el| el.filter.clone())
            .unwrap_or_default()
    }

    fn set_inline_filter(&mut self, element: &NodeId, value: &str) {
        if let Some(el) = self.element_mut(element) {
            el.filter = Some(value.to_owned());
        }
    }

    fn remove_inline_filter(&mut self, element: &NodeId) {
        if let Some(el) = self.element_mut(element) {
            el.filter = None;
        }
    }

    fn observe_body(&mut self) -> Result<WatchId, DomError> {
        if !self.body {
            return Err(DomError::BodyUnavailable);
        }
        let id = WatchId(self.next_watch);
        self.next_watch += 1;
        self.live_watchers.insert(id);
        Ok(id)
    }

    fn disconnect(&mut self, id: WatchId) {
        self.live_watchers.remove(&id);
    }
}

/// Color-scheme source with a caller-controlled preference.
#[derive(Debug, Clone, Default)]
pub struct MemoryColorScheme {
    prefers_dark: bool,
    next_id: u64,
    live: BTreeSet<SubscriptionId>,
    fail_subscribe: bool,
}

impl MemoryColorScheme {
    /// Source reporting the given preference.
    #[must_use]
    pub fn new(prefers_dark: bool) -> Self {
        Self {
            prefers_dark,
            next_id: 1,
            live: BTreeSet::new(),
            fail_subscribe: false,
        }
    }

    /// Change the reported preference. The caller forwards the change to
    /// the controller, as a real media-query listener would.
    pub fn set_prefers_dark(&mut self, prefers_dark: bool) {
        self.prefers_dark = prefers_dark;
    }

    /// Make every subsequent subscribe fail, as on hosts without media
    /// query support.
    pub fn set_fail_subscribe(&mut self, fail: bool) {
        self.fail_subscribe = fail;
    }

    /// Number of subscriptions that have not been removed.
    #[must_use]
    pub fn live_subscriptions(&self) -> usize {
        self.live.len()
    }
}

impl ColorSchemeSource for MemoryColorScheme {
    fn prefers_dark(&self) -> bool {
        self.prefers_dark
    }

    fn subscribe(&mut self) -> Result<SubscriptionId, DomError> {
        if self.fail_subscribe {
            return Err(DomError::Host("color scheme query unsupported".into()));
        }
        let id = SubscriptionId(self.next_id.max(1));
        self.next_id = id.0 + 1;
        self.live.insert(id);
        Ok(id)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.live.remove(&id);
    }
}
