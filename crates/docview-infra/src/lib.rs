//! Docview Infrastructure Library
//!
//! Shared infrastructure for docview binaries. Currently only tracing setup.

pub mod telemetry;

pub use telemetry::{init_telemetry, shutdown_telemetry};
