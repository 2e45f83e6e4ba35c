#![forbid(unsafe_code)]

//! Named theme definitions and the registry that resolves them.
//!
//! A theme is a page-wide CSS filter chain plus a background color. The
//! `dark` theme is the identity: it matches the host application's native
//! appearance, so applying it means removing the overlay rather than adding
//! one.
//!
//! # Example
//!
//! ```
//! use spotlite_theme::ThemeRegistry;
//!
//! let registry = ThemeRegistry::builtin();
//! let light = registry.get("light").expect("light is built in");
//! assert_eq!(light.body_filter(), "invert(1) hue-rotate(180deg)");
//! assert!(registry.get("dark").is_some_and(|t| t.is_identity()));
//! assert!(registry.get("neon").is_none());
//! ```

use ahash::AHashMap;

/// Name of the built-in identity theme.
pub const DARK: &str = "dark";
/// Name of the default theme used when no preference is stored.
pub const LIGHT: &str = "light";
/// Built-in sepia theme.
pub const SEPIA: &str = "sepia";
/// Built-in high-contrast theme.
pub const HIGH_CONTRAST: &str = "highContrast";
/// Built-in vintage theme.
pub const VINTAGE: &str = "vintage";

/// Filter value meaning "no filter".
pub const NO_FILTER: &str = "none";
/// Background value of the identity theme.
pub const TRANSPARENT: &str = "transparent";

/// Immutable description of one theme.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ThemeDefinition {
    name: String,
    body_filter: String,
    media_filter: String,
    background_color: String,
}

impl ThemeDefinition {
    /// Create a theme definition.
    pub fn new(
        name: impl Into<String>,
        body_filter: impl Into<String>,
        media_filter: impl Into<String>,
        background_color: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            body_filter: body_filter.into(),
            media_filter: media_filter.into(),
            background_color: background_color.into(),
        }
    }

    /// Theme name as referenced by preferences and messages.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Filter chain applied to `body`.
    #[must_use]
    pub fn body_filter(&self) -> &str {
        &self.body_filter
    }

    /// Filter chain applied to media and background-image elements.
    #[must_use]
    pub fn media_filter(&self) -> &str {
        &self.media_filter
    }

    /// Background color forced onto `body`.
    #[must_use]
    pub fn background_color(&self) -> &str {
        &self.background_color
    }

    /// Whether this theme leaves the page untouched.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        is_no_filter(&self.body_filter)
            && is_no_filter(&self.media_filter)
            && self.background_color.trim() == TRANSPARENT
    }
}

fn is_no_filter(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value == NO_FILTER
}

/// Registry mapping theme names to definitions.
///
/// Iteration order is registration order. Re-registering a name replaces the
/// definition in place.
#[derive(Debug, Clone, Default)]
pub struct ThemeRegistry {
    themes: Vec<ThemeDefinition>,
    index: AHashMap<String, usize>,
}

impl ThemeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the five built-in themes.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(ThemeDefinition::new(
            LIGHT,
            "invert(1) hue-rotate(180deg)",
            "invert(1) hue-rotate(180deg)",
            "#fff",
        ));
        registry.register(ThemeDefinition::new(DARK, NO_FILTER, NO_FILTER, TRANSPARENT));
        registry.register(ThemeDefinition::new(
            SEPIA,
            "invert(0.9) hue-rotate(180deg) sepia(0.4)",
            "invert(1) hue-rotate(180deg)",
            "#f4ecd8",
        ));
        registry.register(ThemeDefinition::new(
            HIGH_CONTRAST,
            "invert(1) hue-rotate(180deg) contrast(1.4)",
            "invert(1) hue-rotate(180deg) contrast(0.8)",
            "#fff",
        ));
        registry.register(ThemeDefinition::new(
            VINTAGE,
            "invert(0.85) hue-rotate(180deg) sepia(0.3) saturate(0.8)",
            "invert(1) hue-rotate(180deg) sepia(0.2)",
            "#efe6d2",
        ));
        registry
    }

    /// Add a theme, replacing any existing theme with the same name.
    pub fn register(&mut self, theme: ThemeDefinition) {
        if let Some(&slot) = self.index.get(theme.name()) {
            tracing::debug!(theme = theme.name(), "replacing registered theme");
            self.themes[slot] = theme;
            return;
        }
        self.index.insert(theme.name().to_owned(), self.themes.len());
        self.themes.push(theme);
    }

    /// Resolve a theme by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ThemeDefinition> {
        self.index.get(name).map(|&slot| &self.themes[slot])
    }

    /// Whether a theme with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.themes.iter().map(ThemeDefinition::name)
    }

    /// Registered definitions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ThemeDefinition> + '_ {
        self.themes.iter()
    }

    /// Number of registered themes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.themes.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.themes.is_empty()
    }

    /// Distinct non-identity media filters, longest first.
    ///
    /// These are the only fragments a correction pass can ever add to an
    /// element's inline filter.
    #[must_use]
    pub fn media_fragments(&self) -> Vec<&str> {
        let mut fragments: Vec<&str> = self
            .themes
            .iter()
            .map(ThemeDefinition::media_filter)
            .filter(|f| !is_no_filter(f))
            .collect();
        fragments.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        fragments.dedup();
        fragments
    }
}
