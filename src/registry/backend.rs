//! Low-level key-value storage backend trait and supporting types.
//!
//! The [`StorageBackend`] trait is the contract every storage engine
//! implements. Backends are dumb KV stores: uniqueness enforcement, status
//! transitions, staleness policy, and serialization all live above, in
//! [`GenericRegistry`](crate::registry::generic::GenericRegistry).
//!
//! # Key structure
//!
//! Keys are composite strings `{owner_id}:{module_key}` built by
//! [`make_key`]. One record per key; there is no per-owner listing, only
//! the full scan used for stream-id lookup and the stale sweep.
//!
//! # Versioning
//!
//! Every stored record carries a monotonic `u64` version starting at 1,
//! incremented on each successful write. [`put_if_version`]
//! (StorageBackend::put_if_version) and [`put_if_absent`]
//! (StorageBackend::put_if_absent) are the compare-and-set primitives the
//! registry's atomic `try_start` is built from.

use std::fmt;

use async_trait::async_trait;

/// A stored record paired with its monotonic version number.
#[derive(Debug, Clone)]
pub struct VersionedRecord {
    /// Serialized job record bytes (JSON).
    pub data: Vec<u8>,
    /// Monotonic version, starting at 1.
    pub version: u64,
}

/// Errors from raw storage operations.
///
/// The registry maps these to [`StreamError`](crate::error::StreamError)
/// before surfacing to callers; in particular any `Backend` failure during
/// `try_start` fails closed.
#[derive(Debug)]
pub enum StorageError {
    /// The requested key was not found.
    NotFound {
        /// The key that was not found.
        key: String,
    },

    /// A `put_if_absent` call found the key already present.
    AlreadyExists {
        /// The key that already existed.
        key: String,
    },

    /// A `put_if_version` call failed because the stored version does not
    /// match the expected version.
    VersionConflict {
        /// The key where the conflict occurred.
        key: String,
        /// The version the caller expected.
        expected: u64,
        /// The actual version found in storage.
        actual: u64,
    },

    /// An I/O or backend-specific error (network failure, timeout).
    Backend {
        /// Human-readable description.
        message: String,
        /// The underlying error, if available.
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { key } => write!(f, "key not found: {key}"),
            Self::AlreadyExists { key } => write!(f, "key already exists: {key}"),
            Self::VersionConflict {
                key,
                expected,
                actual,
            } => write!(
                f,
                "version conflict on key {key}: expected {expected}, found {actual}"
            ),
            Self::Backend { message, .. } => write!(f, "backend error: {message}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Backend {
                source: Some(src), ..
            } => Some(src.as_ref()),
            _ => None,
        }
    }
}

/// Key-value storage backend for job record persistence.
///
/// Implementations must be `Send + Sync`; the registry is shared across
/// request handlers and, in production deployments, across process
/// instances (the backend is the only coordination point for the
/// at-most-one-active-job invariant).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Retrieves a record by key.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if no record exists.
    /// - [`StorageError::Backend`] on I/O failures.
    async fn get(&self, key: &str) -> Result<VersionedRecord, StorageError>;

    /// Stores a record unconditionally (create or overwrite). Returns the
    /// assigned version.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Backend`] on I/O failures.
    async fn put(&self, key: &str, data: &[u8]) -> Result<u64, StorageError>;

    /// Creates a record only if the key does not exist. Returns version 1
    /// on success.
    ///
    /// # Errors
    ///
    /// - [`StorageError::AlreadyExists`] if the key is present.
    /// - [`StorageError::Backend`] on I/O failures.
    async fn put_if_absent(&self, key: &str, data: &[u8]) -> Result<u64, StorageError>;

    /// Stores a record only if the current version matches
    /// `expected_version`. Returns the new version on success.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if no record exists.
    /// - [`StorageError::VersionConflict`] on version mismatch.
    /// - [`StorageError::Backend`] on I/O failures.
    async fn put_if_version(
        &self,
        key: &str,
        data: &[u8],
        expected_version: u64,
    ) -> Result<u64, StorageError>;

    /// Deletes a record by key. Returns `true` if the key existed
    /// (idempotent delete).
    ///
    /// # Errors
    ///
    /// - [`StorageError::Backend`] on I/O failures.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Lists every stored record as `(key, record)` tuples.
    ///
    /// Used for stream-id lookup and the stale sweep. Registries are
    /// small (one record per in-flight or recently-finished job), so a
    /// full scan is acceptable; production backends would add a
    /// secondary index on `stream_id`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Backend`] on I/O failures.
    async fn list_all(&self) -> Result<Vec<(String, VersionedRecord)>, StorageError>;
}

/// Constructs a storage key from owner and module identifiers.
///
/// # Examples
///
/// ```
/// use genstream::registry::backend::make_key;
///
/// assert_eq!(make_key("owner-1", "topic_9"), "owner-1:topic_9");
/// ```
pub fn make_key(owner_id: &str, module_key: &str) -> String {
    format!("{owner_id}:{module_key}")
}

/// Parses a storage key into `(owner_id, module_key)`.
///
/// Splits on the first colon; returns `None` if the key has no colon.
///
/// # Examples
///
/// ```
/// use genstream::registry::backend::parse_key;
///
/// assert_eq!(parse_key("owner-1:topic_9"), Some(("owner-1", "topic_9")));
/// assert_eq!(parse_key("no-colon"), None);
/// ```
pub fn parse_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(':')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_display_not_found() {
        let err = StorageError::NotFound {
            key: "owner:module".to_string(),
        };
        assert_eq!(err.to_string(), "key not found: owner:module");
    }

    #[test]
    fn storage_error_display_already_exists() {
        let err = StorageError::AlreadyExists {
            key: "owner:module".to_string(),
        };
        assert_eq!(err.to_string(), "key already exists: owner:module");
    }

    #[test]
    fn storage_error_display_version_conflict() {
        let err = StorageError::VersionConflict {
            key: "k".to_string(),
            expected: 2,
            actual: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("expected 2"));
        assert!(msg.contains("found 5"));
    }

    #[test]
    fn storage_error_source_only_for_backend() {
        let inner = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let err = StorageError::Backend {
            message: "db failed".to_string(),
            source: Some(Box::new(inner)),
        };
        assert!(std::error::Error::source(&err).is_some());

        let err = StorageError::NotFound {
            key: "k".to_string(),
        };
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn make_key_then_parse_round_trips() {
        let key = make_key("owner-1", "topic_abc");
        assert_eq!(parse_key(&key), Some(("owner-1", "topic_abc")));
    }

    #[test]
    fn parse_key_splits_on_first_colon() {
        assert_eq!(parse_key("owner:topic:extra"), Some(("owner", "topic:extra")));
        assert_eq!(parse_key(""), None);
    }
}
