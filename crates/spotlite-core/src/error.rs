#![forbid(unsafe_code)]

//! Error types for the theme controller.
//!
//! Every variant is recoverable. Callers log them and, when a command
//! originated the operation, echo the `Display` text back in the reply.

/// The host document could not satisfy a DOM operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    /// `document.head` does not exist yet.
    #[error("document head is not available yet")]
    HeadUnavailable,
    /// `document.body` does not exist yet.
    #[error("document body is not available yet")]
    BodyUnavailable,
    /// The host rejected the operation.
    #[error("host rejected DOM operation: {0}")]
    Host(String),
}

/// The preference store could not produce usable preferences.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The read itself failed (extension context gone, quota, ...).
    #[error("preference store read failed: {0}")]
    Read(String),
    /// The stored payload had an unexpected shape.
    #[error("malformed preference payload: {0}")]
    Malformed(String),
}

/// Applying a theme failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    /// The name does not resolve in the registry. No state was changed.
    #[error("unknown theme `{0}`")]
    UnknownTheme(String),
    /// The theme was recorded but the DOM write was skipped.
    #[error(transparent)]
    Dom(#[from] DomError),
}

/// An inbound payload named a known action but could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed `{action}` message: {reason}")]
pub struct ProtocolError {
    /// The `action` discriminator that was recognised.
    pub action: String,
    /// Decoder diagnostic.
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_error_displays_dom_cause_transparently() {
        let err = ApplyError::from(DomError::HeadUnavailable);
        assert_eq!(err.to_string(), "document head is not available yet");
    }

    #[test]
    fn unknown_theme_names_the_theme() {
        let err = ApplyError::UnknownTheme("neon".into());
        assert_eq!(err.to_string(), "unknown theme `neon`");
    }
}
