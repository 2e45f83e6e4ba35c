#![forbid(unsafe_code)]

//! CSS `filter` chain composition.
//!
//! Corrections are layered onto whatever inline filter an element already
//! carries, and later removed by matching the exact fragment that was added.
//! Filters set by the page itself survive both operations.

use std::borrow::Cow;

use regex_lite::Regex;

use crate::registry::NO_FILTER;

/// Append `fragment` to an existing filter chain.
///
/// An empty or `none` chain yields the fragment alone.
///
/// ```
/// use spotlite_theme::filter::compose_filter;
///
/// assert_eq!(compose_filter("", "invert(1)"), "invert(1)");
/// assert_eq!(compose_filter("blur(2px)", "invert(1)"), "blur(2px) invert(1)");
/// ```
#[must_use]
pub fn compose_filter(existing: &str, fragment: &str) -> String {
    let existing = existing.trim();
    let fragment = fragment.trim();
    if existing.is_empty() || existing == NO_FILTER {
        return fragment.to_owned();
    }
    if fragment.is_empty() {
        return existing.to_owned();
    }
    format!("{existing} {fragment}")
}

/// Remove every occurrence of `fragment` from a filter chain.
///
/// Whitespace between the fragment's functions is matched loosely, so
/// `invert(1)hue-rotate(180deg)` is recognised as `invert(1) hue-rotate(180deg)`.
/// Leftover whitespace is collapsed; the result is empty when nothing else
/// remains.
#[must_use]
pub fn strip_fragment(existing: &str, fragment: &str) -> String {
    let pattern = fragment_pattern(fragment);
    let stripped: Cow<'_, str> = match Regex::new(&pattern) {
        Ok(re) => re.replace_all(existing, " "),
        Err(err) => {
            tracing::warn!(%err, fragment, "fragment pattern rejected, using literal match");
            Cow::Owned(existing.replace(fragment.trim(), " "))
        }
    };
    collapse_whitespace(&stripped)
}

/// Remove several fragments, longest first.
///
/// Ordering matters when one fragment contains another: the longer one must
/// go whole so the shorter one does not leave a dangling tail behind.
#[must_use]
pub fn strip_fragments<'a, I>(existing: &str, fragments: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut ordered: Vec<&str> = fragments.into_iter().filter(|f| !f.trim().is_empty()).collect();
    ordered.sort_by_key(|f| std::cmp::Reverse(f.len()));
    ordered
        .into_iter()
        .fold(collapse_whitespace(existing), |acc, fragment| strip_fragment(&acc, fragment))
}

fn fragment_pattern(fragment: &str) -> String {
    fragment
        .split_whitespace()
        .map(regex_lite::escape)
        .collect::<Vec<_>>()
        .join(r"\s*")
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
