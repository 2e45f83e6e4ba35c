#![forbid(unsafe_code)]

//! Settings-side fan-out.
//!
//! A settings change is written to the store and then pushed to every open
//! player tab. Tabs come and go (closed, still loading, no content script),
//! so each delivery stands alone: one failure is recorded and the rest are
//! still attempted.

use std::fmt::Display;

use serde_json::{Map, Value};

use crate::prefs::{LEGACY_ENABLED_KEY, SELECTED_THEME_KEY, USE_SYSTEM_THEME_KEY};
use crate::protocol::InboundMessage;

/// Tab URL pattern for the player.
pub const HOST_URL_PATTERN: &str = "https://open.spotify.com/*";

/// One failed delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure<T> {
    /// Consumer that did not accept the message.
    pub target: T,
    /// Error text reported by the transport.
    pub reason: String,
}

/// Aggregate outcome of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastReport<T> {
    /// Deliveries that succeeded.
    pub delivered: usize,
    /// Deliveries that failed, in attempt order.
    pub failures: Vec<DeliveryFailure<T>>,
}

impl<T> Default for BroadcastReport<T> {
    fn default() -> Self {
        Self {
            delivered: 0,
            failures: Vec::new(),
        }
    }
}

impl<T> BroadcastReport<T> {
    /// Number of consumers attempted.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.delivered + self.failures.len()
    }

    /// Whether every delivery succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Send to every target, never stopping at a failure.
pub fn broadcast<T, I, F, E>(targets: I, mut send: F) -> BroadcastReport<T>
where
    T: Display,
    I: IntoIterator<Item = T>,
    F: FnMut(&T) -> Result<(), E>,
    E: Display,
{
    let mut report = BroadcastReport::default();
    for target in targets {
        match send(&target) {
            Ok(()) => report.delivered += 1,
            Err(err) => {
                tracing::warn!(%target, %err, "message delivery failed");
                report.failures.push(DeliveryFailure {
                    target,
                    reason: err.to_string(),
                });
            }
        }
    }
    tracing::debug!(
        delivered = report.delivered,
        failed = report.failures.len(),
        "broadcast finished"
    );
    report
}

/// A change made in the settings UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsUpdate {
    /// A theme was picked.
    Theme(String),
    /// System theme mode was switched.
    SystemTheme(bool),
    /// The legacy on/off switch was flipped.
    LegacyToggle(bool),
}

impl SettingsUpdate {
    /// Store entries to write.
    #[must_use]
    pub fn store_entries(&self) -> Value {
        let mut entries = Map::new();
        match self {
            Self::Theme(theme) => {
                entries.insert(SELECTED_THEME_KEY.to_owned(), Value::from(theme.as_str()));
            }
            Self::SystemTheme(enabled) => {
                entries.insert(USE_SYSTEM_THEME_KEY.to_owned(), Value::Bool(*enabled));
            }
            Self::LegacyToggle(enabled) => {
                entries.insert(LEGACY_ENABLED_KEY.to_owned(), Value::Bool(*enabled));
            }
        }
        Value::Object(entries)
    }

    /// Command sent to each open tab.
    #[must_use]
    pub fn message(&self) -> InboundMessage {
        match self {
            Self::Theme(theme) => InboundMessage::ChangeTheme {
                theme: theme.clone(),
            },
            Self::SystemTheme(enabled) => InboundMessage::UpdateSystemThemePreference {
                use_system_theme: *enabled,
            },
            Self::LegacyToggle(enabled) => InboundMessage::ToggleLightMode { enabled: *enabled },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn failures_do_not_stop_delivery() {
        let mut seen = Vec::new();
        let report = broadcast([1u32, 2, 3, 4], |tab| {
            seen.push(*tab);
            if tab % 2 == 0 {
                Err(format!("no receiver in tab {tab}"))
            } else {
                Ok(())
            }
        });
        assert_eq!(seen, vec![1, 2, 3, 4]);
        assert_eq!(report.delivered, 2);
        assert_eq!(
            report.failures,
            vec![
                DeliveryFailure { target: 2, reason: "no receiver in tab 2".into() },
                DeliveryFailure { target: 4, reason: "no receiver in tab 4".into() },
            ]
        );
        assert_eq!(report.attempted(), 4);
        assert!(!report.is_complete());
    }

    #[test]
    fn empty_broadcast_is_complete() {
        let report = broadcast(Vec::<u32>::new(), |_| Ok::<(), String>(()));
        assert_eq!(report.attempted(), 0);
        assert!(report.is_complete());
    }

    #[test]
    fn theme_update_writes_and_sends() {
        let update = SettingsUpdate::Theme("sepia".into());
        assert_eq!(update.store_entries(), json!({"selectedTheme": "sepia"}));
        assert_eq!(
            serde_json::to_value(update.message()).unwrap(),
            json!({"action": "changeTheme", "theme": "sepia"})
        );
    }

    #[test]
    fn system_update_writes_and_sends() {
        let update = SettingsUpdate::SystemTheme(true);
        assert_eq!(update.store_entries(), json!({"useSystemTheme": true}));
        assert_eq!(
            serde_json::to_value(update.message()).unwrap(),
            json!({"action": "updateSystemThemePreference", "useSystemTheme": true})
        );
    }

    #[test]
    fn legacy_update_writes_and_sends() {
        let update = SettingsUpdate::LegacyToggle(false);
        assert_eq!(update.store_entries(), json!({"lightModeEnabled": false}));
        assert_eq!(
            update.message(),
            InboundMessage::ToggleLightMode { enabled: false }
        );
    }
}
