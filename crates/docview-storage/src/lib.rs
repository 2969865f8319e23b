//! Docview Storage Library
//!
//! Key-value cache backends and the cache manager built on top of them.
//!
//! # Backends
//!
//! - `FileCacheBackend`: sharded directory tree with expiry sidecars; supports
//!   size-bounded eviction.
//! - `RedisCacheBackend`: remote store, keys namespaced by a prefix (feature
//!   `backend-redis`).
//!
//! `create_backend` selects one from configuration and falls back to the filesystem
//! when the remote store cannot be reached.

pub mod factory;
pub mod file;
pub mod keys;
pub mod manager;
#[cfg(feature = "backend-redis")]
pub mod remote;
pub mod traits;

// Re-export commonly used types
pub use docview_core::CacheBackendKind;
pub use factory::create_backend;
pub use file::FileCacheBackend;
pub use manager::{CacheManager, CacheStatistics, CleanupReport};
#[cfg(feature = "backend-redis")]
pub use remote::RedisCacheBackend;
pub use traits::{
    BackendError, BackendResult, BackendStats, CacheBackend, EvictableStore, StoredEntry,
};
