//! In-memory storage backend and registry.
//!
//! [`InMemoryBackend`] is a thread-safe [`StorageBackend`] over
//! `DashMap<String, (Vec<u8>, u64)>`; a dumb KV store with no domain
//! logic. [`InMemoryRegistry`] is a thin wrapper around
//! [`GenericRegistry<InMemoryBackend>`](crate::registry::generic::GenericRegistry)
//! that keeps a zero-argument `new()` and a `Default` impl.
//!
//! Suitable for single-process deployments and tests. Horizontal scaling
//! needs a process-external backend behind the same trait, since the
//! backend is what arbitrates the at-most-one-active-job invariant.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::error::StreamError;
use crate::registry::backend::{StorageBackend, StorageError, VersionedRecord};
use crate::registry::generic::GenericRegistry;
use crate::registry::{RegistryConfig, StartOutcome, StreamRegistry};
use crate::types::{JobKey, JobRecord, JobStatus};

/// Thread-safe in-memory storage backend using [`DashMap`].
///
/// Stores serialized records as `(Vec<u8>, u64)` tuples where the `u64`
/// is a monotonic version starting at 1.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: DashMap<String, (Vec<u8>, u64)>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Number of records stored.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the backend contains no records.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<VersionedRecord, StorageError> {
        let entry = self.data.get(key).ok_or_else(|| StorageError::NotFound {
            key: key.to_string(),
        })?;
        let (data, version) = entry.value();
        Ok(VersionedRecord {
            data: data.clone(),
            version: *version,
        })
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<u64, StorageError> {
        let new_version = self.data.get(key).map_or(1, |entry| entry.value().1 + 1);
        self.data
            .insert(key.to_string(), (data.to_vec(), new_version));
        Ok(new_version)
    }

    async fn put_if_absent(&self, key: &str, data: &[u8]) -> Result<u64, StorageError> {
        match self.data.entry(key.to_string()) {
            dashmap::Entry::Occupied(_) => Err(StorageError::AlreadyExists {
                key: key.to_string(),
            }),
            dashmap::Entry::Vacant(slot) => {
                slot.insert((data.to_vec(), 1));
                Ok(1)
            }
        }
    }

    async fn put_if_version(
        &self,
        key: &str,
        data: &[u8],
        expected_version: u64,
    ) -> Result<u64, StorageError> {
        let mut entry = self
            .data
            .get_mut(key)
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })?;
        let current_version = entry.value().1;
        if current_version != expected_version {
            return Err(StorageError::VersionConflict {
                key: key.to_string(),
                expected: expected_version,
                actual: current_version,
            });
        }
        let new_version = current_version + 1;
        *entry.value_mut() = (data.to_vec(), new_version);
        Ok(new_version)
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.data.remove(key).is_some())
    }

    async fn list_all(&self) -> Result<Vec<(String, VersionedRecord)>, StorageError> {
        Ok(self
            .data
            .iter()
            .map(|entry| {
                let (data, version) = entry.value();
                (
                    entry.key().clone(),
                    VersionedRecord {
                        data: data.clone(),
                        version: *version,
                    },
                )
            })
            .collect())
    }
}

/// In-memory registry delegating to [`GenericRegistry<InMemoryBackend>`].
///
/// # Examples
///
/// ```
/// use genstream::registry::memory::InMemoryRegistry;
/// use genstream::registry::RegistryConfig;
/// use std::time::Duration;
///
/// let registry = InMemoryRegistry::new()
///     .with_config(RegistryConfig::default().with_retention(Duration::from_secs(30)));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    inner: GenericRegistry<InMemoryBackend>,
}

impl InMemoryRegistry {
    /// Creates an empty registry with default policy.
    pub fn new() -> Self {
        Self {
            inner: GenericRegistry::new(InMemoryBackend::new()),
        }
    }

    /// Sets the staleness and retention policy.
    pub fn with_config(mut self, config: RegistryConfig) -> Self {
        self.inner = self.inner.with_config(config);
        self
    }

    /// Backend access for tests that need to inspect raw records.
    #[cfg(test)]
    pub(crate) fn backend(&self) -> &InMemoryBackend {
        self.inner.backend()
    }
}

#[async_trait]
impl StreamRegistry for InMemoryRegistry {
    async fn try_start(&self, record: JobRecord) -> Result<StartOutcome, StreamError> {
        self.inner.try_start(record).await
    }

    async fn update_buffer(
        &self,
        key: &JobKey,
        stream_id: &str,
        payload: Value,
    ) -> Result<(), StreamError> {
        self.inner.update_buffer(key, stream_id, payload).await
    }

    async fn set_status(
        &self,
        key: &JobKey,
        stream_id: &str,
        status: JobStatus,
    ) -> Result<(), StreamError> {
        self.inner.set_status(key, stream_id, status).await
    }

    async fn get(&self, key: &JobKey) -> Result<Option<JobRecord>, StreamError> {
        self.inner.get(key).await
    }

    async fn find_by_stream_id(
        &self,
        stream_id: &str,
    ) -> Result<Option<JobRecord>, StreamError> {
        self.inner.find_by_stream_id(stream_id).await
    }

    async fn clear(&self, key: &JobKey) -> Result<bool, StreamError> {
        self.inner.clear(key).await
    }

    async fn cleanup_stale(&self) -> Result<usize, StreamError> {
        self.inner.cleanup_stale().await
    }

    fn config(&self) -> &RegistryConfig {
        self.inner.config()
    }
}
