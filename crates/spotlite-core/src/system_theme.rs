#![forbid(unsafe_code)]

//! System color-scheme synchronisation.

use spotlite_theme::{DARK, LIGHT};

use crate::document::{ColorSchemeSource, SubscriptionId};
use crate::error::DomError;

/// Theme mirrored for a system preference.
#[must_use]
pub const fn theme_for_system(prefers_dark: bool) -> &'static str {
    if prefers_dark { DARK } else { LIGHT }
}

/// Owner of the at-most-one live color-scheme subscription.
#[derive(Debug, Default)]
pub struct SystemThemeSync {
    handle: Option<SubscriptionId>,
}

impl SystemThemeSync {
    /// Create an unsubscribed sync.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Whether a subscription is live.
    #[must_use]
    pub const fn is_subscribed(&self) -> bool {
        self.handle.is_some()
    }

    /// Subscribe, first removing any live subscription so callbacks are
    /// never delivered twice.
    pub fn install<C: ColorSchemeSource>(&mut self, source: &mut C) -> Result<(), DomError> {
        self.remove(source);
        let id = source.subscribe()?;
        tracing::debug!(subscription = id.0, "system theme listener installed");
        self.handle = Some(id);
        Ok(())
    }

    /// Remove the live subscription. Returns whether one was live.
    pub fn remove<C: ColorSchemeSource>(&mut self, source: &mut C) -> bool {
        let Some(id) = self.handle.take() else {
            return false;
        };
        source.unsubscribe(id);
        tracing::debug!(subscription = id.0, "system theme listener removed");
        true
    }
}
