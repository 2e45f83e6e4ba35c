#![forbid(unsafe_code)]

//! Theme vocabulary for spotlite.
//!
//! # Role in spotlite
//! `spotlite-theme` is the shared vocabulary for what a theme *is*: a named
//! body filter, a media filter, and a background color. The controller in
//! `spotlite-core` resolves names through [`ThemeRegistry`] and renders
//! stylesheets through [`css`]; it never hardcodes filter values itself.
//!
//! # This crate provides
//! - [`ThemeDefinition`] and [`ThemeRegistry`] with the built-in themes.
//! - [`css`] for the injected theme and transition rules.
//! - [`filter`] for composing and stripping inline filter fragments.

/// Stylesheet rendering.
pub mod css;
/// Inline filter-chain composition.
pub mod filter;
/// Theme definitions and lookup.
pub mod registry;

pub use registry::{
    DARK, HIGH_CONTRAST, LIGHT, NO_FILTER, SEPIA, TRANSPARENT, ThemeDefinition, ThemeRegistry,
    VINTAGE,
};
