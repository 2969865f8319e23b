//! Docview Processing Library
//!
//! Turns local files, uploads and URLs into stored, identified artifacts:
//! - `Converter`: external office-to-PDF/XLSX conversion (LibreOffice)
//! - `Downloader`: HTTP fetch of remote documents
//! - `FileProcessor`: hash, dedup, route, convert and register

pub mod converter;
pub mod downloader;
pub mod error;
pub mod processor;
pub mod response;
pub mod routing;
pub mod traits;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use converter::LibreOfficeConverter;
pub use downloader::HttpDownloader;
pub use error::{ConversionError, FetchError};
pub use processor::FileProcessor;
pub use response::{ProcessResponse, ResponseStatus};
pub use routing::ConversionRoute;
pub use traits::{Converter, Downloader, TargetFormat};
