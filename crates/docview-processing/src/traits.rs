//! Collaborator traits for conversion and download

use crate::error::{ConversionError, FetchError};
use async_trait::async_trait;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};

/// Output format requested from a converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    Pdf,
    Xlsx,
}

impl TargetFormat {
    /// Extension with the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            TargetFormat::Pdf => ".pdf",
            TargetFormat::Xlsx => ".xlsx",
        }
    }
}

impl Display for TargetFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TargetFormat::Pdf => write!(f, "pdf"),
            TargetFormat::Xlsx => write!(f, "xlsx"),
        }
    }
}

/// Converts a document into `target`, returning the path of the produced file.
///
/// The output lives in a location owned by the converter; callers move it into
/// permanent storage.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(&self, input: &Path, target: TargetFormat) -> Result<PathBuf, ConversionError>;
}

/// Fetches a remote document to a local temporary path.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<PathBuf, FetchError>;
}
