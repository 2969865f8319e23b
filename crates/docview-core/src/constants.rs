//! Shared constants

/// Length of generated file ids.
pub const FILE_ID_LENGTH: usize = 8;

/// Random bytes behind a file id (6 bytes encode to exactly 8 URL-safe base64 chars).
pub const FILE_ID_RANDOM_BYTES: usize = 6;

/// Filename used when a URL carries no usable path segment.
pub const DEFAULT_DOWNLOAD_FILENAME: &str = "downloaded_file";

/// Chunk size used when streaming files through the hasher.
pub const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Route templates the HTTP layer exposes for a file id.
pub const PREVIEW_ROUTE: &str = "/preview";
pub const DOWNLOAD_ROUTE: &str = "/api/download";
