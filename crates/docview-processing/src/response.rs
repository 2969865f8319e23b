use docview_core::file_utils::{download_url, preview_url};
use docview_core::{AppError, ConvertedInfo, ErrorMetadata, FileRecord, FileType, LogLevel, OriginalFileInfo};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Failed,
}

/// Structured outcome of a processing request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub status: ResponseStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Name offered for download
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<FileType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_file_info: Option<OriginalFileInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted_file_info: Option<ConvertedInfo>,
    pub cached: bool,
}

impl ProcessResponse {
    fn empty(status: ResponseStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error: None,
            file_id: None,
            task_id: None,
            filename: None,
            original_name: None,
            file_type: None,
            preview_url: None,
            download_url: None,
            original_file_info: None,
            converted_file_info: None,
            cached: false,
        }
    }

    pub fn from_record(record: &FileRecord, message: impl Into<String>, cached: bool) -> Self {
        Self {
            file_id: Some(record.file_id.clone()),
            filename: Some(record.download_name()),
            original_name: record.original_name.clone(),
            file_type: Some(record.file_type),
            preview_url: Some(preview_url(&record.file_id)),
            download_url: Some(download_url(&record.file_id)),
            original_file_info: record.original_file_info.clone(),
            converted_file_info: record.converted_info.clone(),
            cached,
            ..Self::empty(ResponseStatus::Success, message)
        }
    }

    /// Accepted background task; poll the task store with `task_id`.
    pub fn submitted(task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            ..Self::empty(ResponseStatus::Success, "Task submitted")
        }
    }

    /// Failure response carrying only client-safe details. The full error is logged
    /// at the level its metadata asks for.
    pub fn failed(err: &AppError) -> Self {
        match err.log_level() {
            LogLevel::Debug => tracing::debug!(error = %err, code = err.error_code(), "Request failed"),
            LogLevel::Warn => tracing::warn!(error = %err, code = err.error_code(), "Request failed"),
            LogLevel::Error => tracing::error!(error = %err, code = err.error_code(), "Request failed"),
        }

        Self {
            error: Some(err.error_code().to_string()),
            ..Self::empty(ResponseStatus::Failed, err.client_message())
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_response_hides_internal_details() {
        let err = AppError::Conversion("soffice crashed reading /srv/private/x.docx".to_string());
        let response = ProcessResponse::failed(&err);

        assert!(!response.is_success());
        assert_eq!(response.message, "Document conversion failed");
        assert_eq!(response.error.as_deref(), Some("CONVERSION_FAILED"));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "failed");
        assert!(json.get("file_id").is_none());
        assert!(!json.to_string().contains("/srv/private"));
    }

    #[test]
    fn submitted_carries_task_id() {
        let response = ProcessResponse::submitted("abc123");
        assert!(response.is_success());
        assert_eq!(response.task_id.as_deref(), Some("abc123"));
    }
}
