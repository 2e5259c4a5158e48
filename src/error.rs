//! Error types for generation streaming operations.
//!
//! [`StreamError`] is the crate-level error taxonomy. Display messages are
//! safe to surface to clients; internal causes (backend errors, upstream
//! stack traces) are logged at the point of failure and never transmitted
//! in a [`Frame::Error`](crate::types::Frame::Error).

use thiserror::Error;

use crate::registry::backend::StorageError;

/// Errors that can occur while starting, driving, or resuming a
/// generation job.
///
/// # Examples
///
/// ```
/// use genstream::error::StreamError;
///
/// let err = StreamError::DuplicateJob {
///     owner_id: "owner-1".to_string(),
///     module_key: "summary".to_string(),
///     stream_id: "stream-abc".to_string(),
///     resumable_channel_id: Some("chan-abc".to_string()),
/// };
/// assert!(err.to_string().contains("stream-abc"));
/// ```
#[derive(Debug, Error)]
pub enum StreamError {
    /// An active job already exists for this key. Not fatal: the caller
    /// should reuse the returned `stream_id` and resume the existing
    /// stream instead of starting a duplicate.
    #[error("generation already in progress for {owner_id}:{module_key} (stream {stream_id})")]
    DuplicateJob {
        /// Owner of the existing job.
        owner_id: String,
        /// Module key of the existing job.
        module_key: String,
        /// Stream identifier of the existing job, for reuse by the caller.
        stream_id: String,
        /// Resumable channel identifier of the existing job, if bound.
        resumable_channel_id: Option<String>,
    },

    /// The black-box model/tool sequence failed. The message is safe to
    /// transmit; the underlying cause is logged only.
    #[error("upstream generation failed: {message}")]
    Upstream {
        /// Client-safe description of the failure.
        message: String,
    },

    /// The registry or final-content save failed.
    #[error("persistence failed: {message}")]
    Persistence {
        /// Client-safe description of the failure.
        message: String,
    },

    /// No resumable channel matched the given identifier. A normal
    /// outcome (the job finished and was fully delivered, or the channel
    /// expired); the caller reconciles against the job record instead of
    /// reporting a failure.
    #[error("no resumable channel: {channel_id}")]
    ChannelExpired {
        /// The channel identifier that had nothing to resume.
        channel_id: String,
    },

    /// A newer generation took over this job's key. The superseded task
    /// should stop writing; its frames and buffer updates are moot.
    #[error("job superseded by a newer generation for the same key")]
    Superseded,

    /// Low-level storage failure from the registry backend.
    #[error("registry backend error: {0}")]
    Store(#[from] StorageError),
}

impl StreamError {
    /// Returns the client-safe message for the terminal `Error` frame.
    ///
    /// Identical to the Display text today; kept separate so wire text
    /// and log text can diverge without touching call sites.
    pub fn frame_message(&self) -> String {
        self.to_string()
    }

    /// Returns `true` for errors that signal "nothing to do" rather than
    /// a failed operation (`DuplicateJob`, `ChannelExpired`, `Superseded`).
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            Self::DuplicateJob { .. } | Self::ChannelExpired { .. } | Self::Superseded
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_job_display_carries_key_and_stream() {
        let err = StreamError::DuplicateJob {
            owner_id: "owner-1".to_string(),
            module_key: "topic_42".to_string(),
            stream_id: "stream-xyz".to_string(),
            resumable_channel_id: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("owner-1:topic_42"));
        assert!(msg.contains("stream-xyz"));
    }

    #[test]
    fn benign_errors_classified() {
        assert!(StreamError::Superseded.is_benign());
        assert!(StreamError::ChannelExpired {
            channel_id: "c".to_string()
        }
        .is_benign());
        assert!(!StreamError::Upstream {
            message: "timeout".to_string()
        }
        .is_benign());
        assert!(!StreamError::Persistence {
            message: "save failed".to_string()
        }
        .is_benign());
    }

    #[test]
    fn store_error_converts() {
        let err: StreamError = StorageError::Backend {
            message: "connection refused".to_string(),
            source: None,
        }
        .into();
        assert!(err.to_string().contains("connection refused"));
    }
}
