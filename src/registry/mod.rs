//! Durable registry of job records, the source of truth for
//! "is there an active job for this key".
//!
//! # Architecture
//!
//! Three layers:
//!
//! 1. **[`StreamRegistry`]** -- object-safe trait for use as
//!    `Arc<dyn StreamRegistry>` by the orchestrator and HTTP handlers.
//!
//! 2. **[`GenericRegistry<B>`](generic::GenericRegistry)** -- all domain
//!    logic: the atomic `try_start` compare-and-set, best-effort buffer
//!    updates, idempotent status transitions, stream-id ownership checks,
//!    staleness policy, serialization.
//!
//! 3. **[`StorageBackend`]** -- dumb versioned KV trait that backends
//!    implement. [`InMemoryBackend`](memory::InMemoryBackend) ships with
//!    the crate; a shared store (Redis or similar) slots in behind the
//!    same trait for horizontally scaled deployments.
//!
//! # Failure semantics
//!
//! `try_start` fails closed: if the backend cannot confirm uniqueness, no
//! job starts. Buffer updates are best-effort and last-write-wins.

pub mod backend;
pub mod generic;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

pub use backend::{StorageBackend, StorageError, VersionedRecord};

use crate::constants::{DEFAULT_RETENTION, DEFAULT_STALE_AFTER};
use crate::error::StreamError;
use crate::types::{JobKey, JobRecord, JobStatus};

/// Outcome of an atomic [`StreamRegistry::try_start`].
#[derive(Debug, Clone)]
pub enum StartOutcome {
    /// No active job existed; the new record was persisted and owns the
    /// key now.
    Started(JobRecord),
    /// A fresh active job already owns the key. The caller should treat
    /// this as "already in progress" and reuse the existing stream rather
    /// than starting a duplicate.
    AlreadyActive(JobRecord),
}

/// Staleness and retention policy for the registry.
///
/// # Examples
///
/// ```
/// use genstream::registry::RegistryConfig;
/// use std::time::Duration;
///
/// let config = RegistryConfig::default().with_stale_after(Duration::from_secs(120));
/// assert_eq!(config.stale_after, Duration::from_secs(120));
/// ```
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Age past which an `active` record no longer blocks `try_start`.
    pub stale_after: Duration,
    /// How long terminal records survive before `cleanup_stale` removes
    /// them.
    pub retention: Duration,
}

impl RegistryConfig {
    /// Sets the active-record staleness threshold.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Sets the terminal-record retention window.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            stale_after: DEFAULT_STALE_AFTER,
            retention: DEFAULT_RETENTION,
        }
    }
}

/// Durable CRUD over [`JobRecord`] keyed by [`JobKey`], plus the atomic
/// operations the at-most-one-active-job invariant rests on.
///
/// The orchestrator is the only writer of buffer and status updates; both
/// take the writer's `stream_id` so that a task superseded by a newer
/// generation observes [`StreamError::Superseded`] and stops writing.
#[async_trait]
pub trait StreamRegistry: Send + Sync {
    /// Atomically claims `record.key()` for `record`.
    ///
    /// Succeeds if no record exists, or the existing record is terminal,
    /// or the existing record is active but stale. A superseded record is
    /// marked lost and logged, never silently dropped.
    ///
    /// # Errors
    ///
    /// Fails closed with [`StreamError::Persistence`] if the backend
    /// cannot confirm uniqueness.
    async fn try_start(&self, record: JobRecord) -> Result<StartOutcome, StreamError>;

    /// Best-effort last-write-wins update of `buffered_content`.
    ///
    /// A no-op once the record is terminal.
    ///
    /// # Errors
    ///
    /// [`StreamError::Superseded`] if the record is gone or owned by a
    /// different `stream_id`.
    async fn update_buffer(
        &self,
        key: &JobKey,
        stream_id: &str,
        payload: Value,
    ) -> Result<(), StreamError>;

    /// Transitions `active -> completed | error`.
    ///
    /// Transitioning from a terminal state is a no-op: the first terminal
    /// write wins and the call succeeds idempotently.
    ///
    /// # Errors
    ///
    /// [`StreamError::Superseded`] if the record is gone or owned by a
    /// different `stream_id`.
    async fn set_status(
        &self,
        key: &JobKey,
        stream_id: &str,
        status: JobStatus,
    ) -> Result<(), StreamError>;

    /// Looks up the record for a key.
    async fn get(&self, key: &JobKey) -> Result<Option<JobRecord>, StreamError>;

    /// Looks up a record by its minted `stream_id` (resume path).
    async fn find_by_stream_id(&self, stream_id: &str)
        -> Result<Option<JobRecord>, StreamError>;

    /// Explicitly removes the record for a key. Returns `true` if one
    /// existed.
    async fn clear(&self, key: &JobKey) -> Result<bool, StreamError>;

    /// Housekeeping: removes terminal records older than the retention
    /// window. Returns the count removed. Not part of correctness.
    async fn cleanup_stale(&self) -> Result<usize, StreamError>;

    /// The registry's staleness and retention policy.
    fn config(&self) -> &RegistryConfig;
}
