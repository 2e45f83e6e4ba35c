#![forbid(unsafe_code)]

//! Toolbar icon selection.

use serde_json::{Map, Value};
use spotlite_theme::ThemeRegistry;

/// Pixel sizes the toolbar icon ships in.
pub const ICON_SIZES: [u32; 3] = [16, 48, 128];

/// Icon paths for every size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconSet {
    enabled: bool,
}

impl IconSet {
    /// Active or greyed-out icons.
    #[must_use]
    pub const fn for_enabled(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Icons for a theme: greyed out for the identity theme and for names
    /// the registry does not know.
    #[must_use]
    pub fn for_theme(registry: &ThemeRegistry, name: &str) -> Self {
        let enabled = registry.get(name).is_some_and(|theme| !theme.is_identity());
        Self::for_enabled(enabled)
    }

    /// Whether these are the active icons.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Path of the icon at `size` pixels.
    #[must_use]
    pub fn path(&self, size: u32) -> String {
        if self.enabled {
            format!("icons/icon{size}.png")
        } else {
            format!("icons/icon{size}-disabled.png")
        }
    }

    /// `(size, path)` for every shipped size.
    pub fn paths(&self) -> impl Iterator<Item = (u32, String)> + '_ {
        ICON_SIZES.iter().map(move |&size| (size, self.path(size)))
    }

    /// The `{ "16": path, ... }` object the toolbar API takes.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self
            .paths()
            .map(|(size, path)| (size.to_string(), Value::String(path)))
            .collect();
        Value::Object(map)
    }
}
