//! Configuration module
//!
//! Typed configuration for the cache, identity mapping, converter, downloader and
//! background tasks. Values come from the environment (a `.env` file is honoured) and
//! are validated once at startup.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::storage_types::CacheBackendKind;

// Defaults
const CACHE_DIR: &str = "./cache";
const DOWNLOAD_DIR: &str = "./download";
const CONVERT_DIR: &str = "./convert";
const UPLOAD_DIR: &str = "./upload";
const STORAGE_DIR: &str = "./storage";
const CACHE_MAX_SIZE_MB: u64 = 1024;
const CACHE_RETENTION_DAYS: u32 = 7;
const REDIS_URL: &str = "redis://127.0.0.1:6379";
const REDIS_TIMEOUT_SECS: u64 = 5;
const REDIS_KEY_PREFIX: &str = "docview:";
const CONVERSION_TIMEOUT_SECS: u64 = 60;
const CONVERSION_RETRY_TIMES: u32 = 3;
const LIBREOFFICE_PATH: &str = "libreoffice";
const SUPPORTED_FORMATS: &str = ".doc,.docx,.xls,.xlsx,.ppt,.pptx,.pdf";
const DOWNLOAD_TIMEOUT_SECS: u64 = 60;
const TASK_MAX_CONCURRENT: usize = 4;
const TASK_RETENTION_HOURS: u64 = 24;
const CLEANUP_INTERVAL_SECS: u64 = 3600;

/// Working directories. All of them are created on startup if missing.
#[derive(Clone, Debug)]
pub struct DirectoriesConfig {
    /// Root of the filesystem cache backend
    pub cache: PathBuf,
    /// Where downloaded URL content lands before processing
    pub download: PathBuf,
    /// Scratch space for converter job directories
    pub convert: PathBuf,
    /// Where uploaded bytes are written before processing
    pub upload: PathBuf,
    /// Canonical artifact storage owned by the identity mapping
    pub storage: PathBuf,
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,
    /// Budget for the filesystem backend; eviction brings the cache back under it.
    pub max_size_bytes: u64,
    /// Identity records not accessed for this many days are removed by cleanup.
    pub retention_days: u32,
    pub redis_url: String,
    /// Bound for every remote-store call, including the initial connection.
    pub redis_timeout: Duration,
    pub redis_key_prefix: String,
}

#[derive(Clone, Debug)]
pub struct ConversionConfig {
    /// Hard timeout for one converter subprocess
    pub timeout: Duration,
    /// Number of subprocess attempts before giving up
    pub retry_times: u32,
    pub libreoffice_path: String,
    /// Lower-case extensions including the leading dot
    pub supported_formats: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct DownloadConfig {
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct TaskConfig {
    pub max_concurrent: usize,
    /// Finished tasks older than this are dropped from the task store.
    pub retention: Duration,
    pub cleanup_interval: Duration,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(anyhow::anyhow!("Invalid log format: {}", s)),
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub directories: DirectoriesConfig,
    pub cache: CacheConfig,
    pub conversion: ConversionConfig,
    pub download: DownloadConfig,
    pub tasks: TaskConfig,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            directories: DirectoriesConfig {
                cache: PathBuf::from(CACHE_DIR),
                download: PathBuf::from(DOWNLOAD_DIR),
                convert: PathBuf::from(CONVERT_DIR),
                upload: PathBuf::from(UPLOAD_DIR),
                storage: PathBuf::from(STORAGE_DIR),
            },
            cache: CacheConfig {
                backend: CacheBackendKind::File,
                max_size_bytes: CACHE_MAX_SIZE_MB * 1024 * 1024,
                retention_days: CACHE_RETENTION_DAYS,
                redis_url: REDIS_URL.to_string(),
                redis_timeout: Duration::from_secs(REDIS_TIMEOUT_SECS),
                redis_key_prefix: REDIS_KEY_PREFIX.to_string(),
            },
            conversion: ConversionConfig {
                timeout: Duration::from_secs(CONVERSION_TIMEOUT_SECS),
                retry_times: CONVERSION_RETRY_TIMES,
                libreoffice_path: LIBREOFFICE_PATH.to_string(),
                supported_formats: parse_formats(SUPPORTED_FORMATS),
            },
            download: DownloadConfig {
                timeout: Duration::from_secs(DOWNLOAD_TIMEOUT_SECS),
            },
            tasks: TaskConfig {
                max_concurrent: TASK_MAX_CONCURRENT,
                retention: Duration::from_secs(TASK_RETENTION_HOURS * 3600),
                cleanup_interval: Duration::from_secs(CLEANUP_INTERVAL_SECS),
            },
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Load configuration from the process environment (and `.env` if present).
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup. Unset variables keep
    /// their defaults; malformed values are rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let dir = |name: &str, default: PathBuf| -> PathBuf {
            lookup(name)
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default)
        };

        let directories = DirectoriesConfig {
            cache: dir("DOCVIEW_CACHE_DIR", defaults.directories.cache),
            download: dir("DOCVIEW_DOWNLOAD_DIR", defaults.directories.download),
            convert: dir("DOCVIEW_CONVERT_DIR", defaults.directories.convert),
            upload: dir("DOCVIEW_UPLOAD_DIR", defaults.directories.upload),
            storage: dir("DOCVIEW_STORAGE_DIR", defaults.directories.storage),
        };

        let backend = match lookup("CACHE_BACKEND") {
            Some(value) => value.parse()?,
            None => defaults.cache.backend,
        };

        let cache = CacheConfig {
            backend,
            max_size_bytes: parse_or(&lookup, "CACHE_MAX_SIZE_MB", CACHE_MAX_SIZE_MB)?
                * 1024
                * 1024,
            retention_days: parse_or(&lookup, "CACHE_RETENTION_DAYS", CACHE_RETENTION_DAYS)?,
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.cache.redis_url),
            redis_timeout: Duration::from_secs(parse_or(
                &lookup,
                "REDIS_TIMEOUT_SECS",
                REDIS_TIMEOUT_SECS,
            )?),
            redis_key_prefix: lookup("REDIS_KEY_PREFIX").unwrap_or(defaults.cache.redis_key_prefix),
        };

        let conversion = ConversionConfig {
            timeout: Duration::from_secs(parse_or(
                &lookup,
                "CONVERSION_TIMEOUT_SECS",
                CONVERSION_TIMEOUT_SECS,
            )?),
            retry_times: parse_or(&lookup, "CONVERSION_RETRY_TIMES", CONVERSION_RETRY_TIMES)?,
            libreoffice_path: lookup("LIBREOFFICE_PATH")
                .unwrap_or(defaults.conversion.libreoffice_path),
            supported_formats: lookup("SUPPORTED_FORMATS")
                .map(|s| parse_formats(&s))
                .unwrap_or(defaults.conversion.supported_formats),
        };

        let download = DownloadConfig {
            timeout: Duration::from_secs(parse_or(
                &lookup,
                "DOWNLOAD_TIMEOUT_SECS",
                DOWNLOAD_TIMEOUT_SECS,
            )?),
        };

        let tasks = TaskConfig {
            max_concurrent: parse_or(&lookup, "TASK_MAX_CONCURRENT", TASK_MAX_CONCURRENT)?,
            retention: Duration::from_secs(
                parse_or(&lookup, "TASK_RETENTION_HOURS", TASK_RETENTION_HOURS)? * 3600,
            ),
            cleanup_interval: Duration::from_secs(parse_or(
                &lookup,
                "CLEANUP_INTERVAL_SECS",
                CLEANUP_INTERVAL_SECS,
            )?),
        };

        let log_format = match lookup("LOG_FORMAT") {
            Some(value) => value.parse()?,
            None => LogFormat::Text,
        };

        let config = Config {
            directories,
            cache,
            conversion,
            download,
            tasks,
            log_format,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.cache.max_size_bytes == 0 {
            return Err(anyhow::anyhow!("CACHE_MAX_SIZE_MB must be greater than 0"));
        }

        if self.cache.retention_days == 0 {
            return Err(anyhow::anyhow!("CACHE_RETENTION_DAYS must be greater than 0"));
        }

        if self.cache.backend == CacheBackendKind::Redis
            && !(self.cache.redis_url.starts_with("redis://")
                || self.cache.redis_url.starts_with("rediss://")
                || self.cache.redis_url.starts_with("unix://"))
        {
            return Err(anyhow::anyhow!(
                "REDIS_URL must be a redis://, rediss:// or unix:// URL"
            ));
        }

        if self.cache.redis_timeout.is_zero() {
            return Err(anyhow::anyhow!("REDIS_TIMEOUT_SECS must be greater than 0"));
        }

        if self.conversion.timeout.is_zero() {
            return Err(anyhow::anyhow!("CONVERSION_TIMEOUT_SECS must be greater than 0"));
        }

        if self.conversion.retry_times == 0 {
            return Err(anyhow::anyhow!("CONVERSION_RETRY_TIMES must be at least 1"));
        }

        if self.conversion.libreoffice_path.trim().is_empty() {
            return Err(anyhow::anyhow!("LIBREOFFICE_PATH must not be empty"));
        }

        if self.conversion.supported_formats.is_empty() {
            return Err(anyhow::anyhow!("SUPPORTED_FORMATS must list at least one extension"));
        }

        if self.download.timeout.is_zero() {
            return Err(anyhow::anyhow!("DOWNLOAD_TIMEOUT_SECS must be greater than 0"));
        }

        if self.tasks.max_concurrent == 0 {
            return Err(anyhow::anyhow!("TASK_MAX_CONCURRENT must be at least 1"));
        }

        Ok(())
    }

    /// Create every working directory.
    pub async fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in [
            &self.directories.cache,
            &self.directories.download,
            &self.directories.convert,
            &self.directories.upload,
            &self.directories.storage,
        ] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    /// Whether `extension` (with or without the leading dot) is on the allow-list.
    pub fn is_supported_extension(&self, extension: &str) -> bool {
        let normalized = normalize_extension(extension);
        self.conversion
            .supported_formats
            .iter()
            .any(|f| *f == normalized)
    }
}

fn parse_or<T, F>(lookup: &F, name: &str, default: T) -> Result<T, anyhow::Error>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number, got '{}'", name, raw)),
        _ => Ok(default),
    }
}

/// Lower-cases and prefixes a dot: `"DOCX"` and `".docx"` both become `".docx"`.
pub fn normalize_extension(extension: &str) -> String {
    let trimmed = extension.trim().to_lowercase();
    if trimmed.is_empty() || trimmed.starts_with('.') {
        trimmed
    } else {
        format!(".{}", trimmed)
    }
}

fn parse_formats(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(normalize_extension)
        .filter(|s| !s.is_empty())
        .collect()
}
