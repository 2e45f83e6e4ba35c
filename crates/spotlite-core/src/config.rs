#![forbid(unsafe_code)]

//! Controller timing and naming configuration.

use core::time::Duration;

use serde::Deserialize;

/// Default quiescence window before a correction pass runs.
pub const DEFAULT_DEBOUNCE_MS: u64 = 150;
/// Maximum allowed debounce window.
pub const MAX_DEBOUNCE_MS: u64 = 1_000;

/// Default CSS transition duration for theme switches.
pub const DEFAULT_TRANSITION_MS: u64 = 250;
/// Maximum allowed transition duration.
pub const MAX_TRANSITION_MS: u64 = 2_000;

/// Default delay between neutralising styles and deleting them.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 250;

/// Id of the injected theme style element.
pub const DEFAULT_STYLE_ID: &str = "spotify-light-mode-styles";
/// Id of the injected transition style element.
pub const DEFAULT_TRANSITION_STYLE_ID: &str = "spotify-light-mode-transitions";
/// Class marking elements whose inline filter was corrected.
pub const DEFAULT_MARKER_CLASS: &str = "spotify-lm-corrected";

/// Configuration for [`Controller`](crate::Controller).
///
/// # Timing Defaults
///
/// | Setting | Default | Range | Description |
/// |---------|---------|-------|-------------|
/// | `debounce` | 150ms | 0-1000ms | Quiescence window before correcting new elements |
/// | `transition` | 250ms | 0-2000ms | CSS transition on filter/background-color |
/// | `settle_delay` | 250ms | >= `transition` | Wait before deleting neutralised styles |
///
/// Hosts may pass overrides as JSON (all fields optional, durations in ms):
///
/// ```
/// use spotlite_core::ControllerConfig;
///
/// let config = ControllerConfig::from_json(r#"{"debounceMs": 5000, "transitionMs": 400}"#).unwrap();
/// assert_eq!(config.debounce.as_millis(), 1000);
/// assert_eq!(config.settle_delay.as_millis(), 400);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Quiescence window coalescing mutation bursts.
    pub debounce: Duration,
    /// Transition duration declared in the transition stylesheet.
    pub transition: Duration,
    /// Delay before neutralised style elements are deleted.
    pub settle_delay: Duration,
    /// Id of the theme style element.
    pub style_id: String,
    /// Id of the transition style element.
    pub transition_style_id: String,
    /// Marker class for corrected elements.
    pub marker_class: String,
    /// Maximum level the host log sink should emit (`trace` .. `error`).
    pub log_level: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            transition: Duration::from_millis(DEFAULT_TRANSITION_MS),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            style_id: DEFAULT_STYLE_ID.to_owned(),
            transition_style_id: DEFAULT_TRANSITION_STYLE_ID.to_owned(),
            marker_class: DEFAULT_MARKER_CLASS.to_owned(),
            log_level: "info".to_owned(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ConfigOverrides {
    debounce_ms: Option<u64>,
    transition_ms: Option<u64>,
    settle_delay_ms: Option<u64>,
    style_id: Option<String>,
    transition_style_id: Option<String>,
    marker_class: Option<String>,
    log_level: Option<String>,
}

impl ControllerConfig {
    /// Set the debounce window.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the transition duration.
    #[must_use]
    pub fn with_transition(mut self, transition: Duration) -> Self {
        self.transition = transition;
        self
    }

    /// Set the settle delay.
    #[must_use]
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// Set the host log level.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Parse JSON overrides on top of the defaults, then validate.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let overrides: ConfigOverrides = serde_json::from_str(json)?;
        let mut config = Self::default();
        if let Some(ms) = overrides.debounce_ms {
            config.debounce = Duration::from_millis(ms);
        }
        if let Some(ms) = overrides.transition_ms {
            config.transition = Duration::from_millis(ms);
        }
        if let Some(ms) = overrides.settle_delay_ms {
            config.settle_delay = Duration::from_millis(ms);
        }
        if let Some(id) = overrides.style_id {
            config.style_id = id;
        }
        if let Some(id) = overrides.transition_style_id {
            config.transition_style_id = id;
        }
        if let Some(class) = overrides.marker_class {
            config.marker_class = class;
        }
        if let Some(level) = overrides.log_level {
            config.log_level = level;
        }
        Ok(config.validated())
    }

    /// Clamp values to safe ranges.
    ///
    /// - `debounce` clamped to 0-1000ms
    /// - `transition` clamped to 0-2000ms
    /// - `settle_delay` raised to at least `transition`, so an element is
    ///   never deleted mid-transition
    /// - empty ids/classes fall back to the defaults
    #[must_use]
    pub fn validated(mut self) -> Self {
        let debounce_ms = (self.debounce.as_millis() as u64).min(MAX_DEBOUNCE_MS);
        self.debounce = Duration::from_millis(debounce_ms);

        let transition_ms = (self.transition.as_millis() as u64).min(MAX_TRANSITION_MS);
        self.transition = Duration::from_millis(transition_ms);

        self.settle_delay = self.settle_delay.max(self.transition);

        if self.style_id.trim().is_empty() {
            self.style_id = DEFAULT_STYLE_ID.to_owned();
        }
        if self.transition_style_id.trim().is_empty() {
            self.transition_style_id = DEFAULT_TRANSITION_STYLE_ID.to_owned();
        }
        if self.marker_class.trim().is_empty() {
            self.marker_class = DEFAULT_MARKER_CLASS.to_owned();
        }
        self
    }

    /// Check if values are within valid ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.debounce.as_millis() as u64 <= MAX_DEBOUNCE_MS
            && self.transition.as_millis() as u64 <= MAX_TRANSITION_MS
            && self.settle_delay >= self.transition
            && !self.style_id.trim().is_empty()
            && !self.transition_style_id.trim().is_empty()
            && !self.marker_class.trim().is_empty()
    }
}
