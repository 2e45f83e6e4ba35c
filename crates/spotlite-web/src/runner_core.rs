#![forbid(unsafe_code)]

//! Platform-independent content-script core.
//!
//! Wraps a [`Controller`] with the JSON boundary the browser shim speaks:
//! store reads and change notifications arrive as JSON text, command
//! messages arrive as JSON and leave as JSON replies. No JS/WASM types here,
//! so the whole boundary runs under native tests against the in-memory host.

use core::time::Duration;

use serde_json::{Value, json};
use spotlite_core::{
    ApplyError, ColorSchemeSource, Controller, ControllerConfig, Document, FollowUp,
    InboundMessage, Preferences, Reply, StoreChanges, StoreError, ThemeRegistry,
};

/// Store area the extension keeps its preferences in.
pub const SYNC_AREA: &str = "sync";

/// Result of one inbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageOutcome {
    /// Serialized reply for the sender.
    pub reply_json: String,
    /// Whether the host must re-read the store and call
    /// [`ScriptCore::restore`].
    pub reload_manual_theme: bool,
}

/// Parse a configured log level, falling back to `info`.
#[must_use]
pub fn parse_level(level: &str) -> tracing::Level {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

/// Load host-supplied config overrides, keeping defaults on bad input.
#[must_use]
pub fn load_config(json: Option<&str>) -> ControllerConfig {
    let Some(json) = json.filter(|text| !text.trim().is_empty()) else {
        return ControllerConfig::default();
    };
    match ControllerConfig::from_json(json) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(%err, "config overrides rejected, using defaults");
            ControllerConfig::default()
        }
    }
}

fn read_result(stored: Result<String, String>) -> Result<Preferences, StoreError> {
    stored
        .map_err(StoreError::Read)
        .and_then(|json| Preferences::from_json(&json))
}

/// JSON-facing wrapper around one page's controller.
#[derive(Debug)]
pub struct ScriptCore<D: Document, C: ColorSchemeSource> {
    controller: Controller<D, C>,
}

impl<D: Document, C: ColorSchemeSource> ScriptCore<D, C> {
    /// Core over the given host with the built-in themes.
    pub fn new(document: D, color_scheme: C, config: ControllerConfig) -> Self {
        Self {
            controller: Controller::with_parts(
                document,
                color_scheme,
                ThemeRegistry::builtin(),
                config,
            ),
        }
    }

    /// The wrapped controller.
    #[must_use]
    pub fn controller(&self) -> &Controller<D, C> {
        &self.controller
    }

    /// The wrapped controller, mutably.
    pub fn controller_mut(&mut self) -> &mut Controller<D, C> {
        &mut self.controller
    }

    /// Apply preferences from the initial store read (`Err` carries the
    /// read failure text).
    pub fn startup(&mut self, stored: Result<String, String>) {
        self.controller.startup(read_result(stored));
    }

    /// Finish leaving system mode with a fresh store read.
    pub fn restore(&mut self, stored: Result<String, String>) {
        self.controller.restore_manual_theme(read_result(stored));
    }

    /// Handle a store change notification. Returns whether the host must
    /// re-read the store.
    pub fn store_changed_json(&mut self, changes_json: &str, area: &str) -> bool {
        if area != SYNC_AREA {
            return false;
        }
        let changes = match StoreChanges::from_json(changes_json) {
            Ok(changes) => changes,
            Err(err) => {
                tracing::warn!(%err, "store change notification ignored");
                return false;
            }
        };
        if changes.is_empty() {
            return false;
        }
        matches!(
            self.controller.on_store_changed(&changes),
            Some(FollowUp::ReloadManualTheme)
        )
    }

    /// Apply a theme directly at host time `now`.
    pub fn apply_theme(&mut self, now: Duration, name: &str) -> Result<(), ApplyError> {
        self.tick(now);
        self.controller.apply_theme(name)
    }

    /// Handle one command message arriving at host time `now`. `None` means
    /// no reply is sent.
    pub fn handle_message_json(
        &mut self,
        now: Duration,
        message_json: &str,
    ) -> Option<MessageOutcome> {
        self.tick(now);
        let value: Value = match serde_json::from_str(message_json) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(%err, "non-JSON message ignored");
                return None;
            }
        };
        let (reply, follow_up) = match InboundMessage::parse(&value) {
            Ok(Some(message)) => {
                let dispatch = self.controller.handle_message(message)?;
                (dispatch.reply, dispatch.follow_up)
            }
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(%err, "malformed command");
                (Reply::failure(&err), None)
            }
        };
        let reply_json = match serde_json::to_string(&reply) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(%err, "reply not serializable");
                return None;
            }
        };
        Some(MessageOutcome {
            reply_json,
            reload_manual_theme: follow_up == Some(FollowUp::ReloadManualTheme),
        })
    }

    /// Move host time to `now` (since script start) and run due timers.
    pub fn tick(&mut self, now: Duration) {
        self.controller.advance_to(now);
    }

    /// Run next-frame work.
    pub fn animation_frame(&mut self) {
        self.controller.on_animation_frame();
    }

    /// Milliseconds until the next timer, rounded up.
    #[must_use]
    pub fn next_wakeup_ms(&self) -> Option<u32> {
        self.controller.next_wakeup().map(|wait| {
            let ms = wait.as_nanos().div_ceil(1_000_000);
            u32::try_from(ms).unwrap_or(u32::MAX)
        })
    }

    /// Whether a frame callback is needed.
    #[must_use]
    pub fn needs_frame(&self) -> bool {
        self.controller.needs_frame()
    }

    /// Release everything the controller holds.
    pub fn disable(&mut self) {
        self.controller.disable();
    }

    /// Controller state for diagnostics.
    #[must_use]
    pub fn snapshot_json(&self) -> String {
        let stats = self.controller.stats();
        json!({
            "currentTheme": self.controller.current_theme(),
            "useSystemTheme": self.controller.use_system_theme(),
            "observing": self.controller.is_observing(),
            "stats": {
                "correctionPasses": stats.correction_passes,
                "elementsCorrected": stats.elements_corrected,
                "mutationBatches": stats.mutation_batches,
                "relevantBatches": stats.relevant_batches,
                "styleRemovals": stats.style_removals,
            },
        })
        .to_string()
    }
}
