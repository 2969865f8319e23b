//! File helpers: content hashing, file metadata, identifiers and URL formatting.

use std::io;
use std::path::Path;

use base64::Engine;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;

use crate::constants::{DOWNLOAD_ROUTE, FILE_ID_RANDOM_BYTES, HASH_CHUNK_SIZE, PREVIEW_ROUTE};
use crate::models::FileType;

/// Metadata read from a file on disk.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub filename: String,
    pub size: u64,
    pub extension: String,
    pub mime_type: String,
    pub file_type: FileType,
    pub modified: Option<DateTime<Utc>>,
}

/// MD5 of a file's bytes, read in fixed-size chunks.
pub async fn md5_file(path: &Path) -> io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

pub fn md5_bytes(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// MD5 of a string's UTF-8 bytes; used for URL identities.
pub fn md5_str(text: &str) -> String {
    md5_bytes(text.as_bytes())
}

/// Lower-case extension with its leading dot, or an empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension {
        ".pdf" => "application/pdf",
        ".doc" => "application/msword",
        ".docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ".xls" => "application/vnd.ms-excel",
        ".xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ".ppt" => "application/vnd.ms-powerpoint",
        ".pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".bmp" => "image/bmp",
        ".txt" => "text/plain",
        ".csv" => "text/csv",
        ".json" => "application/json",
        ".xml" => "application/xml",
        ".html" | ".htm" => "text/html",
        _ => "application/octet-stream",
    }
}

/// Reverse of [`mime_for_extension`] for the office formats; used when a download
/// has no usable extension but the server sent a content type.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or(mime).trim();
    match essence {
        "application/pdf" => Some(".pdf"),
        "application/msword" => Some(".doc"),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
            Some(".docx")
        }
        "application/vnd.ms-excel" => Some(".xls"),
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => Some(".xlsx"),
        "application/vnd.ms-powerpoint" => Some(".ppt"),
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
            Some(".pptx")
        }
        _ => None,
    }
}

pub async fn file_info(path: &Path) -> io::Result<FileInfo> {
    let meta = tokio::fs::metadata(path).await?;
    let extension = extension_of(path);

    Ok(FileInfo {
        filename: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        size: meta.len(),
        mime_type: mime_for_extension(&extension).to_string(),
        file_type: FileType::from_extension(&extension),
        extension,
        modified: meta.modified().ok().map(DateTime::<Utc>::from),
    })
}

/// Fresh random file id candidate: 8 URL-safe characters.
///
/// Uniqueness is the caller's concern; the identity mapping checks candidates
/// against live records and retired ids.
pub fn generate_file_id() -> String {
    let bytes: [u8; FILE_ID_RANDOM_BYTES] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// 32 hex chars.
pub fn generate_task_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn preview_url(file_id: &str) -> String {
    format!("{}?file_id={}", PREVIEW_ROUTE, file_id)
}

pub fn download_url(file_id: &str) -> String {
    format!("{}?file_id={}", DOWNLOAD_ROUTE, file_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FILE_ID_LENGTH;
    use std::collections::HashSet;
    use tempfile::tempdir;

    #[tokio::test]
    async fn md5_of_file_matches_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        let data = vec![7u8; HASH_CHUNK_SIZE * 2 + 13];
        tokio::fs::write(&path, &data).await.unwrap();

        assert_eq!(md5_file(&path).await.unwrap(), md5_bytes(&data));
    }

    #[test]
    fn md5_of_known_string() {
        assert_eq!(md5_str(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_str("abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[tokio::test]
    async fn file_info_reads_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Report.DOCX");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let info = file_info(&path).await.unwrap();
        assert_eq!(info.filename, "Report.DOCX");
        assert_eq!(info.extension, ".docx");
        assert_eq!(info.size, 5);
        assert_eq!(info.file_type, FileType::Word);
        assert!(info.mime_type.contains("wordprocessingml"));
        assert!(info.modified.is_some());
    }

    #[test]
    fn generated_ids_are_url_safe() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let id = generate_file_id();
            assert_eq!(id.len(), FILE_ID_LENGTH);
            assert!(id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
            seen.insert(id);
        }
        assert!(seen.len() > 990);
    }

    #[test]
    fn task_ids_are_hex() {
        let id = generate_task_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn url_helpers() {
        assert_eq!(preview_url("abc"), "/preview?file_id=abc");
        assert_eq!(download_url("abc"), "/api/download?file_id=abc");
        assert_eq!(
            extension_for_mime("application/vnd.ms-excel; charset=binary"),
            Some(".xls")
        );
    }
}
