use crate::traits::{BackendError, BackendResult, BackendStats, CacheBackend};
use crate::CacheBackendKind;
use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use redis::RedisResult;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::time::Duration;

/// Redis cache backend
///
/// Every key is stored under `key_prefix`, and every round trip is bounded by
/// `timeout`. Failures are logged and reported as absent/false.
#[derive(Clone)]
pub struct RedisCacheBackend {
    manager: ConnectionManager,
    key_prefix: String,
    timeout: Duration,
}

impl RedisCacheBackend {
    /// Connect and verify the server answers `PING` within `timeout`.
    pub async fn connect(
        url: &str,
        key_prefix: impl Into<String>,
        timeout: Duration,
    ) -> BackendResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| BackendError::Config(format!("Invalid Redis URL: {}", e)))?;

        let mut manager = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| BackendError::Timeout(timeout))?
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        let pong: String = tokio::time::timeout(timeout, redis::cmd("PING").query_async(&mut manager))
            .await
            .map_err(|_| BackendError::Timeout(timeout))?
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        tracing::info!(response = %pong, "Connected to Redis cache backend");

        Ok(RedisCacheBackend {
            manager,
            key_prefix: key_prefix.into(),
            timeout,
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    fn strip_prefix<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.key_prefix.as_str())
    }

    /// Run one bounded round trip; errors and timeouts become `None`.
    async fn run<T, F>(&self, op: &'static str, fut: F) -> Option<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                tracing::warn!(operation = op, error = %e, "Redis operation failed");
                None
            }
            Err(_) => {
                tracing::warn!(
                    operation = op,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Redis operation timed out"
                );
                None
            }
        }
    }

    async fn prefixed_keys(&self, pattern: &str) -> Option<Vec<String>> {
        let full = self.full_key(pattern);
        let mut con = self.manager.clone();
        self.run("keys", async move {
            let keys: Vec<String> = redis::cmd("KEYS").arg(&full).query_async(&mut con).await?;
            Ok(keys)
        })
        .await
    }
}

fn expire_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get(&self, key: &str) -> Option<Bytes> {
        let full = self.full_key(key);
        let mut con = self.manager.clone();
        self.run("get", async move {
            let value: Option<Vec<u8>> = redis::cmd("GET").arg(&full).query_async(&mut con).await?;
            Ok(value)
        })
        .await
        .flatten()
        .map(Bytes::from)
    }

    async fn set(&self, key: &str, value: Bytes, expire: Option<Duration>) -> bool {
        let full = self.full_key(key);
        let mut con = self.manager.clone();
        self.run("set", async move {
            let mut cmd = match expire {
                Some(ttl) => {
                    let mut c = redis::cmd("PSETEX");
                    c.arg(&full).arg(expire_millis(ttl));
                    c
                }
                None => {
                    let mut c = redis::cmd("SET");
                    c.arg(&full);
                    c
                }
            };
            cmd.arg(value.as_ref());
            let _: () = cmd.query_async(&mut con).await?;
            Ok(())
        })
        .await
        .is_some()
    }

    async fn delete(&self, key: &str) -> bool {
        let full = self.full_key(key);
        let mut con = self.manager.clone();
        self.run("delete", async move {
            let _: i64 = redis::cmd("DEL").arg(&full).query_async(&mut con).await?;
            Ok(())
        })
        .await
        .is_some()
    }

    async fn exists(&self, key: &str) -> bool {
        let full = self.full_key(key);
        let mut con = self.manager.clone();
        self.run("exists", async move {
            let count: i64 = redis::cmd("EXISTS").arg(&full).query_async(&mut con).await?;
            Ok(count > 0)
        })
        .await
        .unwrap_or(false)
    }

    async fn keys(&self, pattern: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .prefixed_keys(pattern)
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|k| self.strip_prefix(k).map(str::to_string))
            .collect();
        keys.sort();
        keys
    }

    async fn get_many(&self, keys: &[String]) -> HashMap<String, Bytes> {
        if keys.is_empty() {
            return HashMap::new();
        }

        let full: Vec<String> = keys.iter().map(|k| self.full_key(k)).collect();
        let mut con = self.manager.clone();
        let values = self
            .run("get_many", async move {
                let values: Vec<Option<Vec<u8>>> =
                    redis::cmd("MGET").arg(&full).query_async(&mut con).await?;
                Ok(values)
            })
            .await
            .unwrap_or_default();

        keys.iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|v| (key.clone(), Bytes::from(v))))
            .collect()
    }

    async fn set_many(
        &self,
        entries: HashMap<String, Bytes>,
        expire: Option<Duration>,
    ) -> HashMap<String, bool> {
        if entries.is_empty() {
            return HashMap::new();
        }

        let mut pipe = redis::pipe();
        for (key, value) in &entries {
            let full = self.full_key(key);
            match expire {
                Some(ttl) => pipe
                    .cmd("PSETEX")
                    .arg(&full)
                    .arg(expire_millis(ttl))
                    .arg(value.as_ref())
                    .ignore(),
                None => pipe.cmd("SET").arg(&full).arg(value.as_ref()).ignore(),
            };
        }

        let mut con = self.manager.clone();
        let ok = self
            .run("set_many", async move {
                let _: () = pipe.query_async(&mut con).await?;
                Ok(())
            })
            .await
            .is_some();

        entries.into_keys().map(|key| (key, ok)).collect()
    }

    async fn delete_many(&self, keys: &[String]) -> HashMap<String, bool> {
        if keys.is_empty() {
            return HashMap::new();
        }

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("DEL").arg(self.full_key(key));
        }

        let mut con = self.manager.clone();
        let ok = self
            .run("delete_many", async move {
                let _: Vec<i64> = pipe.query_async(&mut con).await?;
                Ok(())
            })
            .await
            .is_some();

        keys.iter().map(|key| (key.clone(), ok)).collect()
    }

    async fn clear(&self) -> bool {
        let Some(keys) = self.prefixed_keys("*").await else {
            return false;
        };
        if keys.is_empty() {
            return true;
        }

        let mut con = self.manager.clone();
        let count = keys.len();
        let ok = self
            .run("clear", async move {
                let _: i64 = redis::cmd("DEL").arg(&keys).query_async(&mut con).await?;
                Ok(())
            })
            .await
            .is_some();

        tracing::info!(prefix = %self.key_prefix, keys = count, success = ok, "Cache cleared");
        ok
    }

    async fn get_stats(&self) -> BackendStats {
        let count = self
            .prefixed_keys("*")
            .await
            .map(|k| k.len() as u64)
            .unwrap_or(0);

        let mut con = self.manager.clone();
        let info = self
            .run("info", async move {
                let info: String = redis::cmd("INFO").arg("memory").query_async(&mut con).await?;
                Ok(info)
            })
            .await
            .unwrap_or_default();

        let used_memory = parse_info_field(&info, "used_memory").unwrap_or(0);

        let mut extra = BTreeMap::new();
        extra.insert(
            "key_prefix".to_string(),
            serde_json::Value::String(self.key_prefix.clone()),
        );
        if let Some(human) = info
            .lines()
            .find_map(|line| line.strip_prefix("used_memory_human:"))
        {
            extra.insert(
                "used_memory_human".to_string(),
                serde_json::Value::String(human.trim().to_string()),
            );
        }

        BackendStats {
            backend: CacheBackendKind::Redis,
            size_bytes: used_memory,
            count,
            extra,
        }
    }

    fn backend_type(&self) -> CacheBackendKind {
        CacheBackendKind::Redis
    }
}

/// Numeric `field:value` line from an `INFO` reply.
fn parse_info_field(info: &str, field: &str) -> Option<u64> {
    info.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name == field {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}
