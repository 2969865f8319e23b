use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Cache backend types
///
/// Selected once from configuration when the cache manager starts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    /// Sharded directory tree on the local filesystem
    #[default]
    File,
    /// Redis (or any RESP-compatible) key-value store
    Redis,
}

impl FromStr for CacheBackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" | "filesystem" | "local" => Ok(CacheBackendKind::File),
            "redis" => Ok(CacheBackendKind::Redis),
            _ => Err(anyhow::anyhow!("Invalid cache backend: {}", s)),
        }
    }
}

impl Display for CacheBackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            CacheBackendKind::File => write!(f, "file"),
            CacheBackendKind::Redis => write!(f, "redis"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert_eq!(
            "Filesystem".parse::<CacheBackendKind>().unwrap(),
            CacheBackendKind::File
        );
        assert_eq!(
            " redis ".parse::<CacheBackendKind>().unwrap(),
            CacheBackendKind::Redis
        );
        assert!("memcached".parse::<CacheBackendKind>().is_err());
    }
}
