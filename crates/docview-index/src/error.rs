use docview_core::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("No unused file id found after {attempts} attempts")]
    IdSpaceExhausted { attempts: usize },

    #[error("Failed to persist {what} for file {file_id}")]
    Persist { what: &'static str, file_id: String },

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type IndexResult<T> = Result<T, IndexError>;

impl From<IndexError> for AppError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::NotFound(msg) => AppError::NotFound(msg),
            IndexError::Persist { .. } => AppError::Backend(err.to_string()),
            IndexError::IdSpaceExhausted { .. } | IndexError::Io(_) => {
                AppError::Internal(err.to_string())
            }
        }
    }
}
