use docview_core::AppError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Conversion timed out after {timeout:?} ({attempts} attempts)")]
    Timeout { timeout: Duration, attempts: u32 },

    #[error("Converter failed: {0}")]
    Failed(String),

    #[error("Failed to start converter: {0}")]
    Spawn(String),

    #[error("Converter reported success but produced no output at {0}")]
    MissingOutput(String),

    #[error("Input file not found: {0}")]
    InputMissing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Download timed out: {0}")]
    Timeout(String),

    #[error("Server responded with status {0}")]
    Status(u16),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else {
            FetchError::Request(err.to_string())
        }
    }
}

impl From<ConversionError> for AppError {
    fn from(err: ConversionError) -> Self {
        match err {
            ConversionError::Timeout { .. } => AppError::ConversionTimeout(err.to_string()),
            ConversionError::InputMissing(path) => {
                AppError::NotFound(format!("File not found: {}", path))
            }
            _ => AppError::Conversion(err.to_string()),
        }
    }
}

impl From<FetchError> for AppError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::InvalidUrl(msg) => AppError::InvalidInput(format!("Invalid URL: {}", msg)),
            FetchError::Status(code) => AppError::Fetch(format!("server responded with status {}", code)),
            FetchError::Timeout(_) => AppError::Fetch("request timed out".to_string()),
            FetchError::Request(_) => AppError::Fetch("request failed".to_string()),
            FetchError::Io(e) => AppError::Internal(format!("IO error while downloading: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docview_core::ErrorMetadata;

    #[test]
    fn timeout_maps_to_recoverable_app_error() {
        let err: AppError = ConversionError::Timeout {
            timeout: Duration::from_secs(60),
            attempts: 3,
        }
        .into();
        assert_eq!(err.error_code(), "CONVERSION_TIMEOUT");
        assert!(err.is_recoverable());
    }

    #[test]
    fn fetch_status_is_client_visible() {
        let err: AppError = FetchError::Status(404).into();
        assert_eq!(err.error_code(), "FETCH_FAILED");
        assert!(err.client_message().contains("404"));
    }

    #[test]
    fn invalid_url_is_invalid_input() {
        let err: AppError = FetchError::InvalidUrl("ftp://x".to_string()).into();
        assert_eq!(err.error_code(), "INVALID_INPUT");
    }
}
