use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Broad document category derived from the file extension.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Pdf,
    Word,
    Excel,
    Powerpoint,
    Image,
    Text,
    #[default]
    Other,
}

impl FileType {
    /// Maps a lower-case extension (with leading dot) to its category.
    pub fn from_extension(extension: &str) -> Self {
        match extension {
            ".pdf" => FileType::Pdf,
            ".doc" | ".docx" => FileType::Word,
            ".xls" | ".xlsx" => FileType::Excel,
            ".ppt" | ".pptx" => FileType::Powerpoint,
            ".jpg" | ".jpeg" | ".png" | ".gif" | ".bmp" => FileType::Image,
            ".txt" | ".csv" | ".json" | ".xml" | ".html" | ".htm" => FileType::Text,
            _ => FileType::Other,
        }
    }
}

impl Display for FileType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            FileType::Pdf => write!(f, "pdf"),
            FileType::Word => write!(f, "word"),
            FileType::Excel => write!(f, "excel"),
            FileType::Powerpoint => write!(f, "powerpoint"),
            FileType::Image => write!(f, "image"),
            FileType::Text => write!(f, "text"),
            FileType::Other => write!(f, "other"),
        }
    }
}

impl FromStr for FileType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(FileType::Pdf),
            "word" => Ok(FileType::Word),
            "excel" => Ok(FileType::Excel),
            "powerpoint" => Ok(FileType::Powerpoint),
            "image" => Ok(FileType::Image),
            "text" => Ok(FileType::Text),
            "other" => Ok(FileType::Other),
            _ => Err(anyhow::anyhow!("Invalid file type: {}", s)),
        }
    }
}

/// Where a URL-sourced file came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadInfo {
    pub url: String,
    /// MD5 of the URL string, the key of the URL index
    pub url_hash: String,
    pub download_time: DateTime<Utc>,
}

/// Snapshot of the file as submitted, before any conversion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OriginalFileInfo {
    pub path: PathBuf,
    pub filename: String,
    pub extension: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub md5: String,
}

/// Details of the artifact produced by conversion (or passthrough).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConvertedInfo {
    pub path: PathBuf,
    pub filename: String,
    pub extension: String,
    pub size: u64,
    pub conversion_method: String,
    pub conversion_time: DateTime<Utc>,
    pub conversion_duration_ms: u64,
    pub md5: String,
    pub mime_type: String,
}

/// Persisted identity of one piece of content.
///
/// `file_id` and `content_hash` never change once assigned. `path` points at the
/// stored artifact; `original_name` is what users called the file and is kept
/// independently of the storage location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    pub file_id: String,
    pub content_hash: String,
    pub path: PathBuf,
    pub original_name: Option<String>,
    pub file_type: FileType,
    pub extension: String,
    pub size: u64,
    pub mime_type: String,
    pub source_url: Option<String>,
    pub download_info: Option<DownloadInfo>,
    pub original_file_info: Option<OriginalFileInfo>,
    pub converted_info: Option<ConvertedInfo>,
    pub creation_time: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

impl FileRecord {
    /// Filename offered for download: the original stem with the stored
    /// artifact's extension (`budget.xls` stored as xlsx becomes `budget.xlsx`).
    pub fn download_name(&self) -> String {
        let fallback = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let name = match self.original_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => return fallback,
        };

        let stem = Path::new(name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());

        format!("{}{}", stem, self.extension)
    }

    /// Whether the stored artifact is still on disk.
    pub async fn is_live(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(original_name: Option<&str>, path: &str, extension: &str) -> FileRecord {
        let now = Utc::now();
        FileRecord {
            file_id: "abcdEFGH".to_string(),
            content_hash: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
            path: PathBuf::from(path),
            original_name: original_name.map(str::to_string),
            file_type: FileType::from_extension(extension),
            extension: extension.to_string(),
            size: 0,
            mime_type: "application/octet-stream".to_string(),
            source_url: None,
            download_info: None,
            original_file_info: None,
            converted_info: None,
            creation_time: now,
            last_accessed: now,
        }
    }

    #[test]
    fn download_name_uses_converted_extension() {
        let r = record(Some("budget.xls"), "/s/ab/abc.xlsx", ".xlsx");
        assert_eq!(r.download_name(), "budget.xlsx");

        let r = record(Some("report.docx"), "/s/ab/abc.pdf", ".pdf");
        assert_eq!(r.download_name(), "report.pdf");
    }

    #[test]
    fn download_name_falls_back_to_stored_name() {
        let r = record(None, "/s/ab/abc.pdf", ".pdf");
        assert_eq!(r.download_name(), "abc.pdf");
    }

    #[test]
    fn file_type_mapping() {
        assert_eq!(FileType::from_extension(".pptx"), FileType::Powerpoint);
        assert_eq!(FileType::from_extension(".csv"), FileType::Text);
        assert_eq!(FileType::from_extension(".zip"), FileType::Other);
        assert_eq!("excel".parse::<FileType>().unwrap(), FileType::Excel);
        assert_eq!(FileType::Word.to_string(), "word");
    }

    #[test]
    fn record_serializes_snake_case_type() {
        let r = record(Some("a.pdf"), "/s/ab/abc.pdf", ".pdf");
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["file_type"], "pdf");
        let back: FileRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
    }
}
