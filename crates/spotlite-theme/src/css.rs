#![forbid(unsafe_code)]

//! Stylesheet text injected into the host page.

use core::time::Duration;
use std::fmt::Write as _;

use crate::registry::{NO_FILTER, ThemeDefinition, TRANSPARENT};

/// Selector for elements that carry imagery through an inline background.
pub const BACKGROUND_IMAGE_SELECTOR: &str = r#"[style*="background-image"]"#;

/// Rules for the active theme.
///
/// ```
/// use spotlite_theme::{ThemeRegistry, css::theme_stylesheet};
///
/// let registry = ThemeRegistry::builtin();
/// let css = theme_stylesheet(registry.get("light").unwrap());
/// assert!(css.contains("filter: invert(1) hue-rotate(180deg);"));
/// assert!(css.contains("background-color: #fff !important;"));
/// ```
#[must_use]
pub fn theme_stylesheet(theme: &ThemeDefinition) -> String {
    render_rules(theme.body_filter(), theme.media_filter(), theme.background_color())
}

/// Rules that return the page to its native look while transitions run.
#[must_use]
pub fn neutral_stylesheet() -> String {
    render_rules(NO_FILTER, NO_FILTER, TRANSPARENT)
}

/// Transition declarations that animate filter and background changes.
#[must_use]
pub fn transition_stylesheet(duration: Duration) -> String {
    let ms = duration.as_millis();
    let mut css = String::new();
    let _ = writeln!(css, "body, img, video, {BACKGROUND_IMAGE_SELECTOR} {{");
    let _ = writeln!(
        css,
        "  transition: filter {ms}ms ease, background-color {ms}ms ease;"
    );
    css.push_str("}\n");
    css
}

fn render_rules(body_filter: &str, media_filter: &str, background: &str) -> String {
    let mut css = String::new();
    css.push_str("body {\n");
    let _ = writeln!(css, "  filter: {body_filter};");
    let _ = writeln!(css, "  background-color: {background} !important;");
    css.push_str("}\n");
    css.push_str("img, video {\n");
    let _ = writeln!(css, "  filter: {media_filter};");
    css.push_str("}\n");
    css
}
