#![forbid(unsafe_code)]

//! Background-image mutation watcher.
//!
//! Holds the single observer handle and decides whether a mutation batch is
//! worth a correction pass. Only two things count: inserted nodes, and a
//! `style` change on an element that now has a background-image and has not
//! been corrected yet. Everything else (text edits, class churn, our own
//! marker writes) is ignored.

use crate::document::{Document, MutationRecord, STYLE_ATTRIBUTE, WatchId};
use crate::error::DomError;

/// Owner of the at-most-one live body observer.
#[derive(Debug, Default)]
pub struct BackgroundWatcher {
    handle: Option<WatchId>,
}

impl BackgroundWatcher {
    /// Create a watcher that is not observing.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Whether an observer is live.
    #[must_use]
    pub const fn is_observing(&self) -> bool {
        self.handle.is_some()
    }

    /// Start observing unless already observing.
    ///
    /// Returns `Ok(true)` when a new observer was created, `Ok(false)` when
    /// the existing one was reused.
    pub fn ensure<D: Document>(&mut self, document: &mut D) -> Result<bool, DomError> {
        if self.handle.is_some() {
            return Ok(false);
        }
        if !document.has_body() {
            return Err(DomError::BodyUnavailable);
        }
        let id = document.observe_body()?;
        tracing::debug!(watch_id = id.0, "background watcher started");
        self.handle = Some(id);
        Ok(true)
    }

    /// Disconnect the observer. Returns whether one was live.
    pub fn stop<D: Document>(&mut self, document: &mut D) -> bool {
        match self.handle.take() {
            Some(id) => {
                document.disconnect(id);
                tracing::debug!(watch_id = id.0, "background watcher stopped");
                true
            }
            None => false,
        }
    }
}

/// Whether a batch contains at least one mutation that may need correction.
pub fn is_relevant_batch<D: Document>(
    document: &D,
    marker: &str,
    records: &[MutationRecord<D::Element>],
) -> bool {
    records.iter().any(|record| match record {
        MutationRecord::ChildList { added } => !added.is_empty(),
        MutationRecord::Attributes { target, attribute } => {
            attribute == STYLE_ATTRIBUTE
                && document.has_background_image(target)
                && !document.has_marker(target, marker)
        }
        MutationRecord::CharacterData => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDocument;

    const MARKER: &str = "m";

    #[test]
    fn ensure_reuses_live_observer() {
        let mut doc = MemoryDocument::new();
        let mut watcher = BackgroundWatcher::new();
        assert_eq!(watcher.ensure(&mut doc), Ok(true));
        assert_eq!(watcher.ensure(&mut doc), Ok(false));
        assert_eq!(doc.live_watchers(), 1);
        assert!(watcher.stop(&mut doc));
        assert!(!watcher.stop(&mut doc));
        assert_eq!(doc.live_watchers(), 0);
    }

    #[test]
    fn ensure_without_body_fails_cleanly() {
        let mut doc = MemoryDocument::loading();
        let mut watcher = BackgroundWatcher::new();
        assert_eq!(watcher.ensure(&mut doc), Err(DomError::BodyUnavailable));
        assert!(!watcher.is_observing());
    }

    #[test]
    fn insertions_are_relevant() {
        let mut doc = MemoryDocument::new();
        let el = doc.insert_element();
        let batch = [MutationRecord::ChildList { added: vec![el] }];
        assert!(is_relevant_batch(&doc, MARKER, &batch));
        let empty = [MutationRecord::ChildList { added: vec![] }];
        assert!(!is_relevant_batch(&doc, MARKER, &empty));
    }

    #[test]
    fn style_change_needs_unmarked_background() {
        let mut doc = MemoryDocument::new();
        let plain = doc.insert_element();
        let bg = doc.insert_background_element("a.png");
        let marked = doc.insert_background_element("b.png");
        doc.add_marker(&marked, MARKER);

        let style = |target| MutationRecord::Attributes {
            target,
            attribute: STYLE_ATTRIBUTE.to_owned(),
        };
        assert!(!is_relevant_batch(&doc, MARKER, &[style(plain)]));
        assert!(!is_relevant_batch(&doc, MARKER, &[style(marked)]));
        assert!(is_relevant_batch(&doc, MARKER, &[style(bg)]));
    }

    #[test]
    fn unrelated_mutations_are_ignored() {
        let mut doc = MemoryDocument::new();
        let bg = doc.insert_background_element("a.png");
        let batch = [
            MutationRecord::CharacterData,
            MutationRecord::Attributes {
                target: bg,
                attribute: "class".to_owned(),
            },
        ];
        assert!(!is_relevant_batch(&doc, MARKER, &batch));
    }
}
