//! Docview Index Library
//!
//! File identity mapping: stable short ids for stored content, deduplicated by
//! content hash, with auxiliary URL lookups and retention cleanup.

pub mod error;
pub mod mapping;

pub use error::{IndexError, IndexResult};
pub use mapping::{FileFilter, FileIdentityMapping, FilePage, NewFile, MAX_ID_ATTEMPTS};
