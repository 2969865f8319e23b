//! Cache backend abstraction
//!
//! This module defines the `CacheBackend` trait that every key-value backend implements,
//! and the optional `EvictableStore` capability used for size-bounded cleanup.

use crate::CacheBackendKind;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Cache backend errors
///
/// Only constructors and the eviction capability return these; the key-value
/// operations log failures and degrade to absent/false.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for backend construction and eviction
pub type BackendResult<T> = Result<T, BackendError>;

/// Backend-level statistics.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStats {
    pub backend: CacheBackendKind,
    pub size_bytes: u64,
    pub count: u64,
    /// Backend-specific details (root directory, server memory, ...)
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A committed entry as seen by the eviction pass.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub key: String,
    /// Bytes on disk for the entry, including its expiry sidecar
    pub size: u64,
    pub modified: SystemTime,
    pub expires_at: Option<SystemTime>,
}

impl StoredEntry {
    pub fn is_expired(&self, now: SystemTime) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Key-value cache backend
///
/// Values are opaque bytes. `expire` is relative to the time of the call; an entry
/// read after its expiry behaves as absent.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Option<Bytes>;

    async fn set(&self, key: &str, value: Bytes, expire: Option<Duration>) -> bool;

    /// True when the key is absent after the call.
    async fn delete(&self, key: &str) -> bool;

    async fn exists(&self, key: &str) -> bool;

    /// Live keys matching a glob pattern (`*` and `?`).
    async fn keys(&self, pattern: &str) -> Vec<String>;

    /// Values for the keys that are present; missing keys are omitted.
    async fn get_many(&self, keys: &[String]) -> HashMap<String, Bytes>;

    async fn set_many(
        &self,
        entries: HashMap<String, Bytes>,
        expire: Option<Duration>,
    ) -> HashMap<String, bool>;

    async fn delete_many(&self, keys: &[String]) -> HashMap<String, bool>;

    /// Remove every entry owned by this backend.
    async fn clear(&self) -> bool;

    async fn get_stats(&self) -> BackendStats;

    fn backend_type(&self) -> CacheBackendKind;

    /// Size-bounded eviction support, when the backend manages its own storage.
    fn evictable(&self) -> Option<&dyn EvictableStore> {
        None
    }
}

/// Capability of backends whose entries can be enumerated and evicted one by one.
#[async_trait]
pub trait EvictableStore: Send + Sync {
    /// Fully committed entries; in-flight writes are never listed.
    async fn committed_entries(&self) -> BackendResult<Vec<StoredEntry>>;

    /// Remove an entry and return the bytes freed.
    async fn remove_entry(&self, key: &str) -> BackendResult<u64>;
}
