//! Docview Core Library
//!
//! This crate provides the domain models, error types, configuration and file helpers
//! shared by every docview component.

pub mod config;
pub mod constants;
pub mod error;
pub mod file_utils;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{
    CacheConfig, Config, ConversionConfig, DirectoriesConfig, DownloadConfig, LogFormat,
    TaskConfig,
};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{
    ConvertedInfo, DownloadInfo, FileRecord, FileType, OriginalFileInfo, TaskRecord, TaskStatus,
};
pub use storage_types::CacheBackendKind;
