//! Background work for docview: pollable conversion tasks and the periodic
//! cleanup of the cache, file records and finished tasks.

pub mod cleanup;
pub mod runner;
pub mod tasks;

pub use cleanup::{CleanupService, CleanupSummary};
pub use runner::{ConversionJob, ConversionTaskRunner};
pub use tasks::TaskStore;
