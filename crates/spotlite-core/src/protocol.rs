#![forbid(unsafe_code)]

//! Command messages from the settings UI and their replies.
//!
//! Every payload carries an `action` discriminator:
//!
//! ```json
//! { "action": "changeTheme", "theme": "sepia" }
//! { "action": "updateSystemThemePreference", "useSystemTheme": true }
//! { "action": "toggleLightMode", "enabled": false }
//! ```
//!
//! Each recognised command gets `{ "success": bool, "error"?: string }`.
//! Unknown actions get no reply at all.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Inbound command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum InboundMessage {
    /// Legacy two-theme switch: `true` is `light`, `false` is `dark`.
    ToggleLightMode {
        /// Whether the overlay should be on.
        enabled: bool,
    },
    /// Apply a named theme.
    ChangeTheme {
        /// Registry name.
        theme: String,
    },
    /// Enter or leave system theme mode.
    #[serde(rename_all = "camelCase")]
    UpdateSystemThemePreference {
        /// Whether to mirror the system color scheme.
        use_system_theme: bool,
    },
    /// Any other action.
    #[serde(other)]
    Unrecognized,
}

const KNOWN_ACTIONS: [&str; 3] = ["toggleLightMode", "changeTheme", "updateSystemThemePreference"];

impl InboundMessage {
    /// Decode a message payload.
    ///
    /// Returns `Ok(None)` for payloads that are not commands for us (no
    /// `action`, or an unknown one) and `Err` for a known action with a bad
    /// body, which still deserves a failure reply.
    pub fn parse(value: &Value) -> Result<Option<Self>, ProtocolError> {
        let Some(action) = value.get("action").and_then(Value::as_str) else {
            return Ok(None);
        };
        if !KNOWN_ACTIONS.contains(&action) {
            return Ok(None);
        }
        match Self::deserialize(value) {
            Ok(message) => Ok(Some(message)),
            Err(err) => Err(ProtocolError {
                action: action.to_owned(),
                reason: err.to_string(),
            }),
        }
    }
}

/// Acknowledgement sent back to the settings UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Whether the command took effect.
    pub success: bool,
    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    /// Successful reply.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// Failed reply carrying the error's display text.
    pub fn failure(error: impl Display) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }

    /// Reply for an operation result.
    pub fn from_result<T, E: Display>(result: &Result<T, E>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(err) => Self::failure(err),
        }
    }
}

/// Work the host must do after a command, beyond sending the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// Re-read preferences and pass them to
    /// [`Controller::restore_manual_theme`](crate::Controller::restore_manual_theme).
    ReloadManualTheme,
}

/// Outcome of one recognised command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Reply for the sender.
    pub reply: Reply,
    /// Host work still owed.
    pub follow_up: Option<FollowUp>,
}

impl Dispatch {
    /// Dispatch with only a reply.
    #[must_use]
    pub const fn reply(reply: Reply) -> Self {
        Self {
            reply,
            follow_up: None,
        }
    }
}
