//! Test doubles for the converter and downloader.

pub mod mock_converter;
pub mod mock_downloader;

pub use mock_converter::{MockConverter, MockOutcome};
pub use mock_downloader::MockDownloader;
