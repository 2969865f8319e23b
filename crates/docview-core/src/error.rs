//! Error types module
//!
//! `AppError` is the error surfaced to callers of the processing layer. Lower layers
//! (cache backends, identity mapping, converter, downloader) keep their own error enums
//! and convert into `AppError` at the boundary.

use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like unsupported formats
    Debug,
    /// Warning level - for recoverable issues like remote timeouts
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata describing how an error should be presented to a client.
pub trait ErrorMetadata {
    /// HTTP status code an outer surface would return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "CONVERSION_FAILED")
    fn error_code(&self) -> &'static str;

    /// Whether retrying the same request may succeed
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be kept out of client responses
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Conversion timed out: {0}")]
    ConversionTimeout(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the file ID exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::Conversion(_) => (
            500,
            "CONVERSION_FAILED",
            false,
            Some("Check that the document opens correctly and try again"),
            true,
            LogLevel::Error,
        ),
        AppError::ConversionTimeout(_) => (
            504,
            "CONVERSION_TIMEOUT",
            true,
            Some("Retry later or split the document"),
            true,
            LogLevel::Warn,
        ),
        AppError::Fetch(_) => (
            502,
            "FETCH_FAILED",
            true,
            Some("Check that the URL is reachable and try again"),
            false,
            LogLevel::Warn,
        ),
        AppError::Backend(_) => (
            503,
            "CACHE_UNAVAILABLE",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::UnsupportedFormat(_) => (
            415,
            "UNSUPPORTED_FORMAT",
            false,
            Some("Upload a Word, Excel, PowerPoint or PDF document"),
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidInput(_) => (
            400,
            "INVALID_INPUT",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::Conversion(_) => "Document conversion failed".to_string(),
            AppError::ConversionTimeout(_) => "Document conversion timed out".to_string(),
            AppError::Fetch(ref msg) => format!("Failed to download file: {}", msg),
            AppError::Backend(_) => "Cache storage is unavailable".to_string(),
            AppError::UnsupportedFormat(ref ext) => format!("Unsupported file format: {}", ext),
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_metadata_not_found() {
        let err = AppError::NotFound("File not found".to_string());
        assert_eq!(err.http_status_code(), 404);
        assert_eq!(err.error_code(), "NOT_FOUND");
        assert!(!err.is_recoverable());
        assert_eq!(err.client_message(), "File not found");
        assert!(!err.is_sensitive());
        assert_eq!(err.log_level(), LogLevel::Debug);
    }

    #[test]
    fn test_conversion_details_stay_internal() {
        let err = AppError::Conversion("soffice exited with status 81: /tmp/x".to_string());
        assert_eq!(err.error_code(), "CONVERSION_FAILED");
        assert!(err.is_sensitive());
        assert!(!err.client_message().contains("/tmp/x"));
        assert!(err.to_string().contains("/tmp/x"));
    }

    #[test]
    fn test_timeout_is_recoverable() {
        let err = AppError::ConversionTimeout("60s".to_string());
        assert_eq!(err.http_status_code(), 504);
        assert!(err.is_recoverable());
        assert_eq!(err.log_level(), LogLevel::Warn);
    }

    #[test]
    fn test_unsupported_format_message() {
        let err = AppError::UnsupportedFormat(".exe".to_string());
        assert_eq!(err.http_status_code(), 415);
        assert_eq!(err.client_message(), "Unsupported file format: .exe");
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: AppError = anyhow::anyhow!("boom").into();
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
        assert_eq!(err.client_message(), "Internal server error");
    }
}
