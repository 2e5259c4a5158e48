//! The unit of the streaming wire protocol.
//!
//! A job transmits zero or more `partial` frames followed by exactly one
//! terminal frame (`complete` or `error`). Frames are JSON-encoded, one
//! frame per transport message (one SSE `data:` line each).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One unit of the streaming wire protocol.
///
/// Tagged on the wire as `{"type": "partial" | "complete" | "error", ...}`.
///
/// # Examples
///
/// ```
/// use genstream::types::Frame;
/// use serde_json::json;
///
/// let frame = Frame::Partial {
///     module_key: "summary".to_string(),
///     payload: json!({"text": "Hel"}),
/// };
/// assert!(!frame.is_terminal());
///
/// let wire = serde_json::to_value(&frame).unwrap();
/// assert_eq!(wire["type"], "partial");
/// assert_eq!(wire["moduleKey"], "summary");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// An in-progress partial payload. Any number may precede the terminal
    /// frame, subject to throttling.
    Partial {
        /// The module key the payload belongs to.
        #[serde(rename = "moduleKey")]
        module_key: String,
        /// The extracted partial payload.
        payload: Value,
    },
    /// Successful terminal frame carrying the final payload.
    Complete {
        /// The module key the payload belongs to.
        #[serde(rename = "moduleKey")]
        module_key: String,
        /// The final payload.
        payload: Value,
    },
    /// Failed terminal frame. The message is safe to surface to clients.
    Error {
        /// The module key the job was generating for.
        #[serde(rename = "moduleKey")]
        module_key: String,
        /// Client-safe error description.
        error: String,
    },
}

impl Frame {
    /// Returns `true` for `Complete` and `Error` frames.
    ///
    /// Exactly one terminal frame ends every job; terminal frames are
    /// never throttled or deduplicated.
    ///
    /// # Examples
    ///
    /// ```
    /// use genstream::types::Frame;
    /// use serde_json::json;
    ///
    /// assert!(Frame::Complete {
    ///     module_key: "m".to_string(),
    ///     payload: json!("done"),
    /// }
    /// .is_terminal());
    /// assert!(Frame::Error {
    ///     module_key: "m".to_string(),
    ///     error: "boom".to_string(),
    /// }
    /// .is_terminal());
    /// ```
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    /// The module key this frame belongs to.
    pub fn module_key(&self) -> &str {
        match self {
            Self::Partial { module_key, .. }
            | Self::Complete { module_key, .. }
            | Self::Error { module_key, .. } => module_key,
        }
    }

}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Partial { module_key, .. } => write!(f, "partial[{module_key}]"),
            Self::Complete { module_key, .. } => write!(f, "complete[{module_key}]"),
            Self::Error { module_key, error } => write!(f, "error[{module_key}]: {error}"),
        }
    }
}
