//! Job key and persisted record model.
//!
//! A generation job is identified by [`JobKey`] `(owner_id, module_key)`.
//! The invariant the whole crate is built around: at most one *active*
//! [`JobRecord`] exists per key at any time, enforced by the registry's
//! atomic `try_start`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Composite identifier scoping uniqueness of an active generation.
///
/// `module_key` disambiguates generation targets belonging to the same
/// owner, e.g. a named content module or `"topic_<id>"` for a sub-resource.
///
/// # Examples
///
/// ```
/// use genstream::types::JobKey;
///
/// let key = JobKey::new("owner-1", "topic_42");
/// assert_eq!(key.storage_key(), "owner-1:topic_42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey {
    /// Identifier of the owning user or session.
    pub owner_id: String,
    /// Generation target within the owner's scope.
    pub module_key: String,
}

impl JobKey {
    /// Creates a key from owner and module identifiers.
    pub fn new(owner_id: impl Into<String>, module_key: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            module_key: module_key.into(),
        }
    }

    /// The composite storage key, `{owner_id}:{module_key}`.
    ///
    /// The colon separator is safe because owner ids come from session
    /// tokens (no colons) and module keys are slug-shaped.
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.owner_id, self.module_key)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner_id, self.module_key)
    }
}

/// Lifecycle status of a job record.
///
/// `Active -> Completed | Error` are the transitions the orchestrator
/// drives. `Lost` is the audit state an abandoned active record is moved
/// to when a newer job supersedes its key; no transitions leave a
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// The job's orchestrator task is (presumed) running.
    Active,
    /// The job finished and emitted a `Complete` frame (terminal).
    Completed,
    /// The job failed and emitted an `Error` frame (terminal).
    Error,
    /// The job was abandoned and superseded by a newer one (terminal).
    Lost,
}

impl JobStatus {
    /// Returns `true` if no further transitions are allowed.
    ///
    /// # Examples
    ///
    /// ```
    /// use genstream::types::JobStatus;
    ///
    /// assert!(!JobStatus::Active.is_terminal());
    /// assert!(JobStatus::Completed.is_terminal());
    /// assert!(JobStatus::Error.is_terminal());
    /// assert!(JobStatus::Lost.is_terminal());
    /// ```
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Lost)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
            Self::Lost => write!(f, "lost"),
        }
    }
}

/// Persisted job state, the registry's unit of storage.
///
/// Created when a generation request passes the at-most-one-active check,
/// mutated by the orchestrator as frames are produced, and superseded when
/// a fresh job is accepted for the same key. `buffered_content` is a
/// last-write-wins resume aid, not the source of truth; the channel's
/// transcript log is authoritative for replay.
///
/// # Examples
///
/// ```
/// use genstream::types::{JobKey, JobRecord};
///
/// let record = JobRecord::new(JobKey::new("owner-1", "summary"));
/// assert!(record.is_active());
/// assert!(!record.stream_id.is_empty());
/// assert!(record.buffered_content.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Opaque identifier minted at job start, returned to the client.
    pub stream_id: String,
    /// Identifier bound to the resumable transport channel.
    pub resumable_channel_id: Option<String>,
    /// Identifier of the owning user or session.
    pub owner_id: String,
    /// Generation target within the owner's scope.
    pub module_key: String,
    /// Lifecycle status.
    pub status: JobStatus,
    /// When the job was accepted; used for staleness checks.
    pub created_at: DateTime<Utc>,
    /// Last-known serialized partial payload, for resume requests that
    /// arrive before live attachment completes. Best-effort.
    pub buffered_content: Option<Value>,
}

impl JobRecord {
    /// Creates an `active` record for `key`, minting a fresh `stream_id`.
    ///
    /// The buffer starts empty: a new job never inherits content from a
    /// prior generation on the same key.
    pub fn new(key: JobKey) -> Self {
        Self {
            stream_id: Uuid::new_v4().to_string(),
            resumable_channel_id: None,
            owner_id: key.owner_id,
            module_key: key.module_key,
            status: JobStatus::Active,
            created_at: Utc::now(),
            buffered_content: None,
        }
    }

    /// The key this record is stored under.
    pub fn key(&self) -> JobKey {
        JobKey::new(self.owner_id.clone(), self.module_key.clone())
    }

    /// Returns `true` while the record's status is `Active`.
    pub fn is_active(&self) -> bool {
        self.status == JobStatus::Active
    }

    /// Returns `true` if the record is older than `max_age`.
    ///
    /// A stale `active` record no longer blocks `try_start`; the job that
    /// created it is presumed dead.
    pub fn is_stale(&self, max_age: std::time::Duration) -> bool {
        let max_age = Duration::from_std(max_age).unwrap_or(Duration::MAX);
        Utc::now() - self.created_at > max_age
    }
}

/// Resolves a key conflict in favor of the new record.
///
/// The new record always wins. If `old` was still active, superseding it
/// is itself the signal that the previous job was abandoned: the old
/// record is marked [`JobStatus::Lost`] and emitted as an audit log line
/// before being replaced, never silently dropped.
///
/// # Examples
///
/// ```
/// use genstream::types::{supersede, JobKey, JobRecord};
///
/// let old = JobRecord::new(JobKey::new("o", "m"));
/// let new = JobRecord::new(JobKey::new("o", "m"));
/// let new_stream = new.stream_id.clone();
///
/// let winner = supersede(old, new);
/// assert_eq!(winner.stream_id, new_stream);
/// assert!(winner.buffered_content.is_none());
/// ```
pub fn supersede(old: JobRecord, new: JobRecord) -> JobRecord {
    if old.is_active() {
        let mut lost = old;
        lost.status = JobStatus::Lost;
        tracing::warn!(
            owner_id = %lost.owner_id,
            module_key = %lost.module_key,
            stream_id = %lost.stream_id,
            created_at = %lost.created_at,
            "superseding active job; previous job marked lost"
        );
    }
    new
}
