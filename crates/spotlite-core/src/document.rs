#![forbid(unsafe_code)]

//! Host abstractions the controller drives.
//!
//! The controller never touches a real DOM. It talks to a [`Document`] for
//! style injection, element correction and mutation observation, and to a
//! [`ColorSchemeSource`] for the system color-scheme preference. The browser
//! backend lives in `spotlite-web`; [`crate::memory`] provides deterministic
//! in-memory hosts.
//!
//! Observation and subscription are explicit: the host hands out a handle on
//! `observe_body`/`subscribe`, and the controller gives it back on
//! `disconnect`/`unsubscribe`. Notifications themselves are pushed into the
//! controller by the host (`Controller::on_mutations`,
//! `Controller::on_system_scheme_changed`).

use crate::error::DomError;

/// Handle for one live mutation observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(pub u64);

/// Handle for one live color-scheme subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Attribute whose changes can make an element need correction.
pub const STYLE_ATTRIBUTE: &str = "style";

/// One mutation observed under `body`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRecord<E> {
    /// Nodes were inserted or removed; only insertions are carried.
    ChildList {
        /// Inserted element nodes.
        added: Vec<E>,
    },
    /// An attribute changed on `target`.
    Attributes {
        /// Element whose attribute changed.
        target: E,
        /// Name of the changed attribute.
        attribute: String,
    },
    /// Text content changed.
    CharacterData,
}

/// DOM operations needed to apply and tear down a theme.
pub trait Document {
    /// Handle to a page element.
    type Element: Clone;

    /// Whether `document.head` exists.
    fn has_head(&self) -> bool;

    /// Whether `document.body` exists.
    fn has_body(&self) -> bool;

    /// Whether a style element with this id is in the document.
    fn style_element_exists(&self, id: &str) -> bool;

    /// Create the style element `id` in the head, or reuse it, and replace
    /// its content with `css`. Never creates a second element with the id.
    fn upsert_style_element(&mut self, id: &str, css: &str) -> Result<(), DomError>;

    /// Remove the style element `id`. Returns whether one was removed.
    fn remove_style_element(&mut self, id: &str) -> bool;

    /// Elements declaring an inline background-image that lack `marker`.
    fn background_image_elements(&self, excluding_marker: &str) -> Vec<Self::Element>;

    /// Elements carrying `marker`.
    fn marked_elements(&self, marker: &str) -> Vec<Self::Element>;

    /// Whether the element's inline style declares a background-image.
    fn has_background_image(&self, element: &Self::Element) -> bool;

    /// Whether the element carries `marker`.
    fn has_marker(&self, element: &Self::Element, marker: &str) -> bool;

    /// Add `marker` to the element's class list.
    fn add_marker(&mut self, element: &Self::Element, marker: &str);

    /// Remove `marker` from the element's class list.
    fn remove_marker(&mut self, element: &Self::Element, marker: &str);

    /// The element's inline `filter` value, empty when unset.
    fn inline_filter(&self, element: &Self::Element) -> String;

    /// Overwrite the element's inline `filter`.
    fn set_inline_filter(&mut self, element: &Self::Element, value: &str);

    /// Remove the inline `filter` property entirely.
    fn remove_inline_filter(&mut self, element: &Self::Element);

    /// Start observing the body subtree for insertions and `style` changes.
    fn observe_body(&mut self) -> Result<WatchId, DomError>;

    /// Stop the observer behind `id`.
    fn disconnect(&mut self, id: WatchId);
}

/// Source of the system `prefers-color-scheme` preference.
pub trait ColorSchemeSource {
    /// Whether the system currently prefers a dark color scheme.
    fn prefers_dark(&self) -> bool;

    /// Start delivering change notifications.
    fn subscribe(&mut self) -> Result<SubscriptionId, DomError>;

    /// Stop the subscription behind `id`.
    fn unsubscribe(&mut self, id: SubscriptionId);
}
