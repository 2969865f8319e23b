use crate::{BackendResult, CacheBackend, CacheBackendKind, FileCacheBackend};
use docview_core::Config;
use std::sync::Arc;

/// Create the cache backend selected by configuration.
///
/// A remote backend that cannot be initialized is replaced by the filesystem
/// backend rooted at the cache directory; only a failure of that fallback is an error.
pub async fn create_backend(config: &Config) -> BackendResult<Arc<dyn CacheBackend>> {
    match config.cache.backend {
        CacheBackendKind::File => file_backend(config).await,

        #[cfg(feature = "backend-redis")]
        CacheBackendKind::Redis => {
            match crate::RedisCacheBackend::connect(
                &config.cache.redis_url,
                config.cache.redis_key_prefix.clone(),
                config.cache.redis_timeout,
            )
            .await
            {
                Ok(backend) => Ok(Arc::new(backend)),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        fallback = %config.directories.cache.display(),
                        "Redis cache backend unavailable, falling back to filesystem"
                    );
                    file_backend(config).await
                }
            }
        }

        #[cfg(not(feature = "backend-redis"))]
        CacheBackendKind::Redis => {
            tracing::warn!(
                "Redis cache backend not available (backend-redis feature not enabled), using filesystem"
            );
            file_backend(config).await
        }
    }
}

async fn file_backend(config: &Config) -> BackendResult<Arc<dyn CacheBackend>> {
    let backend = FileCacheBackend::new(&config.directories.cache).await?;
    tracing::info!(root = %backend.root().display(), "Using filesystem cache backend");
    Ok(Arc::new(backend))
}
