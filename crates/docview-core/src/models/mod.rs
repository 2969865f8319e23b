pub mod file_record;
pub mod task;

pub use file_record::{ConvertedInfo, DownloadInfo, FileRecord, FileType, OriginalFileInfo};
pub use task::{TaskRecord, TaskStatus};
