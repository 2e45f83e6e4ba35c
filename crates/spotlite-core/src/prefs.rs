#![forbid(unsafe_code)]

//! Preferences read from the extension's key-value store.
//!
//! | Key | Type | Default |
//! |-----|------|---------|
//! | `selectedTheme` | string | `light` |
//! | `useSystemTheme` | bool | `false` |
//! | `lightModeEnabled` | bool (legacy) | `true` |
//!
//! The legacy boolean only matters when `selectedTheme` was never written:
//! `false` means the user had turned the overlay off, i.e. `dark`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use spotlite_theme::{DARK, LIGHT};

use crate::error::StoreError;

/// Key holding the manually selected theme.
pub const SELECTED_THEME_KEY: &str = "selectedTheme";
/// Key holding the system-theme mode flag.
pub const USE_SYSTEM_THEME_KEY: &str = "useSystemTheme";
/// Legacy two-state key.
pub const LEGACY_ENABLED_KEY: &str = "lightModeEnabled";

/// Keys read at startup.
pub const STORE_KEYS: [&str; 3] = [SELECTED_THEME_KEY, USE_SYSTEM_THEME_KEY, LEGACY_ENABLED_KEY];

/// Resolved user preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    /// Manually chosen theme.
    pub selected_theme: String,
    /// Whether to mirror the system color scheme instead.
    pub use_system_theme: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            selected_theme: LIGHT.to_owned(),
            use_system_theme: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPreferences {
    selected_theme: Option<String>,
    use_system_theme: Option<bool>,
    light_mode_enabled: Option<bool>,
}

impl Preferences {
    /// Resolve preferences from the object the store returned.
    pub fn from_value(value: Value) -> Result<Self, StoreError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let raw: RawPreferences =
            serde_json::from_value(value).map_err(|err| StoreError::Malformed(err.to_string()))?;
        Ok(raw.into())
    }

    /// Resolve preferences from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let value: Value =
            serde_json::from_str(json).map_err(|err| StoreError::Malformed(err.to_string()))?;
        Self::from_value(value)
    }
}

impl From<RawPreferences> for Preferences {
    fn from(raw: RawPreferences) -> Self {
        let selected_theme = match (raw.selected_theme, raw.light_mode_enabled) {
            (Some(theme), _) => theme,
            (None, Some(false)) => DARK.to_owned(),
            (None, _) => LIGHT.to_owned(),
        };
        Self {
            selected_theme,
            use_system_theme: raw.use_system_theme.unwrap_or(false),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Change<T> {
    #[serde(rename = "newValue")]
    new_value: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChanges {
    selected_theme: Option<Change<String>>,
    use_system_theme: Option<Change<bool>>,
    light_mode_enabled: Option<Change<bool>>,
}

/// New values from one store change notification.
///
/// A field is `None` when its key did not change or was removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreChanges {
    /// New `selectedTheme`.
    pub selected_theme: Option<String>,
    /// New `useSystemTheme`.
    pub use_system_theme: Option<bool>,
    /// New legacy `lightModeEnabled`.
    pub light_mode_enabled: Option<bool>,
}

impl StoreChanges {
    /// Decode the `{ key: { newValue, oldValue } }` change shape.
    pub fn from_value(value: Value) -> Result<Self, StoreError> {
        let raw: RawChanges =
            serde_json::from_value(value).map_err(|err| StoreError::Malformed(err.to_string()))?;
        Ok(Self {
            selected_theme: raw.selected_theme.and_then(|c| c.new_value),
            use_system_theme: raw.use_system_theme.and_then(|c| c.new_value),
            light_mode_enabled: raw.light_mode_enabled.and_then(|c| c.new_value),
        })
    }

    /// Decode a JSON change notification.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let value: Value =
            serde_json::from_str(json).map_err(|err| StoreError::Malformed(err.to_string()))?;
        Self::from_value(value)
    }

    /// Whether no tracked key changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selected_theme.is_none()
            && self.use_system_theme.is_none()
            && self.light_mode_enabled.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_store_defaults_to_light() {
        assert_eq!(Preferences::from_value(json!({})).unwrap(), Preferences::default());
        assert_eq!(Preferences::from_value(Value::Null).unwrap(), Preferences::default());
    }

    #[test]
    fn selected_theme_wins_over_legacy_flag() {
        let prefs = Preferences::from_value(json!({
            "selectedTheme": "sepia",
            "lightModeEnabled": false,
            "useSystemTheme": true,
        }))
        .unwrap();
        assert_eq!(prefs.selected_theme, "sepia");
        assert!(prefs.use_system_theme);
    }

    #[test]
    fn legacy_disabled_maps_to_dark() {
        let prefs = Preferences::from_value(json!({ "lightModeEnabled": false })).unwrap();
        assert_eq!(prefs.selected_theme, "dark");
    }

    #[test]
    fn wrong_types_are_malformed() {
        let err = Preferences::from_value(json!({ "useSystemTheme": "yes" })).unwrap_err();
        assert!(matches!(err, StoreError::Malformed(_)));
    }

    #[test]
    fn unrelated_keys_are_ignored() {
        let prefs = Preferences::from_json(r#"{"volume": 3, "selectedTheme": "vintage"}"#).unwrap();
        assert_eq!(prefs.selected_theme, "vintage");
    }

    #[test]
    fn change_notification_extracts_new_values() {
        let changes = StoreChanges::from_value(json!({
            "selectedTheme": { "oldValue": "light", "newValue": "sepia" },
            "useSystemTheme": { "oldValue": false },
        }))
        .unwrap();
        assert_eq!(changes.selected_theme.as_deref(), Some("sepia"));
        assert_eq!(changes.use_system_theme, None);
        assert!(!changes.is_empty());
    }

    #[test]
    fn unrelated_change_is_empty() {
        let changes = StoreChanges::from_json(r#"{"other": {"newValue": 1}}"#).unwrap();
        assert!(changes.is_empty());
    }
}
