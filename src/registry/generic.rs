//! Domain registry over any [`StorageBackend`].
//!
//! All registry intelligence lives here: the `try_start` compare-and-set,
//! stream-id ownership checks, the first-terminal-write-wins rule, and
//! the stale sweep. Backends stay dumb.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StreamError;
use crate::registry::backend::{make_key, parse_key, StorageBackend, StorageError};
use crate::registry::{RegistryConfig, StartOutcome, StreamRegistry};
use crate::types::{supersede, JobKey, JobRecord, JobStatus};

/// How many CAS rounds a mutation attempts before giving up. Contention
/// on a single job key is rare; two rounds already covers a racing
/// supersede.
const MAX_CAS_ATTEMPTS: usize = 4;

/// Registry implementation generic over the storage backend.
///
/// # Examples
///
/// ```
/// use genstream::registry::generic::GenericRegistry;
/// use genstream::registry::memory::InMemoryBackend;
/// use genstream::registry::RegistryConfig;
///
/// let registry = GenericRegistry::new(InMemoryBackend::new())
///     .with_config(RegistryConfig::default());
/// ```
#[derive(Debug, Default)]
pub struct GenericRegistry<B> {
    backend: B,
    config: RegistryConfig,
}

impl<B: StorageBackend> GenericRegistry<B> {
    /// Creates a registry over `backend` with default policy.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            config: RegistryConfig::default(),
        }
    }

    /// Sets the staleness and retention policy.
    pub fn with_config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns a reference to the underlying backend.
    #[cfg(test)]
    pub(crate) fn backend(&self) -> &B {
        &self.backend
    }

    fn encode(record: &JobRecord) -> Result<Vec<u8>, StreamError> {
        serde_json::to_vec(record).map_err(|e| StreamError::Persistence {
            message: format!("failed to encode job record: {e}"),
        })
    }

    fn decode(data: &[u8]) -> Result<JobRecord, StreamError> {
        serde_json::from_slice(data).map_err(|e| StreamError::Persistence {
            message: format!("failed to decode job record: {e}"),
        })
    }

    fn fail_closed(err: StorageError) -> StreamError {
        StreamError::Persistence {
            message: format!("registry unavailable: {err}"),
        }
    }
}

#[async_trait]
impl<B: StorageBackend> StreamRegistry for GenericRegistry<B> {
    async fn try_start(&self, record: JobRecord) -> Result<StartOutcome, StreamError> {
        let key = make_key(&record.owner_id, &record.module_key);
        let data = Self::encode(&record)?;

        for _ in 0..MAX_CAS_ATTEMPTS {
            match self.backend.get(&key).await {
                Err(StorageError::NotFound { .. }) => {
                    match self.backend.put_if_absent(&key, &data).await {
                        Ok(_) => return Ok(StartOutcome::Started(record)),
                        // Lost the race to a concurrent start; re-read and
                        // decide against the record that won.
                        Err(StorageError::AlreadyExists { .. }) => continue,
                        Err(e) => return Err(Self::fail_closed(e)),
                    }
                }
                Ok(existing) => {
                    let current = Self::decode(&existing.data)?;
                    if current.is_active() && !current.is_stale(self.config.stale_after) {
                        return Ok(StartOutcome::AlreadyActive(current));
                    }
                    // Terminal or abandoned record: the new job wins.
                    let winner = supersede(current, record.clone());
                    match self
                        .backend
                        .put_if_version(&key, &data, existing.version)
                        .await
                    {
                        Ok(_) => return Ok(StartOutcome::Started(winner)),
                        Err(
                            StorageError::VersionConflict { .. } | StorageError::NotFound { .. },
                        ) => continue,
                        Err(e) => return Err(Self::fail_closed(e)),
                    }
                }
                Err(e) => return Err(Self::fail_closed(e)),
            }
        }

        // Could not confirm uniqueness under contention: refuse to start.
        Err(StreamError::Persistence {
            message: format!("try_start contention exhausted for key {key}"),
        })
    }

    async fn update_buffer(
        &self,
        key: &JobKey,
        stream_id: &str,
        payload: Value,
    ) -> Result<(), StreamError> {
        let storage_key = key.storage_key();

        for _ in 0..MAX_CAS_ATTEMPTS {
            let existing = match self.backend.get(&storage_key).await {
                Ok(rec) => rec,
                Err(StorageError::NotFound { .. }) => return Err(StreamError::Superseded),
                Err(e) => return Err(Self::fail_closed(e)),
            };
            let mut record = Self::decode(&existing.data)?;
            if record.stream_id != stream_id {
                return Err(StreamError::Superseded);
            }
            if !record.is_active() {
                // Terminal already; buffered content no longer matters.
                return Ok(());
            }
            record.buffered_content = Some(payload.clone());
            let data = Self::encode(&record)?;
            match self
                .backend
                .put_if_version(&storage_key, &data, existing.version)
                .await
            {
                Ok(_) => return Ok(()),
                Err(StorageError::VersionConflict { .. } | StorageError::NotFound { .. }) => {
                    continue
                }
                Err(e) => return Err(Self::fail_closed(e)),
            }
        }

        // Best-effort: losing a buffer write is acceptable, resume falls
        // back to the channel transcript.
        tracing::warn!(key = %key, "buffer update lost under contention");
        Ok(())
    }

    async fn set_status(
        &self,
        key: &JobKey,
        stream_id: &str,
        status: JobStatus,
    ) -> Result<(), StreamError> {
        if !status.is_terminal() {
            tracing::warn!(key = %key, %status, "ignoring non-terminal set_status");
            return Ok(());
        }
        let storage_key = key.storage_key();

        for _ in 0..MAX_CAS_ATTEMPTS {
            let existing = match self.backend.get(&storage_key).await {
                Ok(rec) => rec,
                Err(StorageError::NotFound { .. }) => return Err(StreamError::Superseded),
                Err(e) => return Err(Self::fail_closed(e)),
            };
            let mut record = Self::decode(&existing.data)?;
            if record.stream_id != stream_id {
                return Err(StreamError::Superseded);
            }
            if record.status.is_terminal() {
                // First terminal write wins; later transitions are no-ops.
                tracing::debug!(key = %key, current = %record.status, requested = %status,
                    "status already terminal");
                return Ok(());
            }
            record.status = status;
            let data = Self::encode(&record)?;
            match self
                .backend
                .put_if_version(&storage_key, &data, existing.version)
                .await
            {
                Ok(_) => return Ok(()),
                Err(StorageError::VersionConflict { .. } | StorageError::NotFound { .. }) => {
                    continue
                }
                Err(e) => return Err(Self::fail_closed(e)),
            }
        }

        Err(StreamError::Persistence {
            message: format!("set_status contention exhausted for key {storage_key}"),
        })
    }

    async fn get(&self, key: &JobKey) -> Result<Option<JobRecord>, StreamError> {
        match self.backend.get(&key.storage_key()).await {
            Ok(rec) => Ok(Some(Self::decode(&rec.data)?)),
            Err(StorageError::NotFound { .. }) => Ok(None),
            Err(e) => Err(Self::fail_closed(e)),
        }
    }

    async fn find_by_stream_id(
        &self,
        stream_id: &str,
    ) -> Result<Option<JobRecord>, StreamError> {
        let all = self.backend.list_all().await.map_err(Self::fail_closed)?;
        for (_, versioned) in all {
            let record = Self::decode(&versioned.data)?;
            if record.stream_id == stream_id {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    async fn clear(&self, key: &JobKey) -> Result<bool, StreamError> {
        self.backend
            .delete(&key.storage_key())
            .await
            .map_err(Self::fail_closed)
    }

    async fn cleanup_stale(&self) -> Result<usize, StreamError> {
        let all = self.backend.list_all().await.map_err(Self::fail_closed)?;
        let mut removed = 0;
        for (key, versioned) in all {
            let record = Self::decode(&versioned.data)?;
            if record.status.is_terminal() && record.is_stale(self.config.retention) {
                if self
                    .backend
                    .delete(&key)
                    .await
                    .map_err(Self::fail_closed)?
                {
                    if let Some((owner_id, module_key)) = parse_key(&key) {
                        tracing::debug!(%owner_id, %module_key, "removed stale terminal record");
                    }
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    fn config(&self) -> &RegistryConfig {
        &self.config
    }
}
