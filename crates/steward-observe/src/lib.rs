//! Observability for Steward: structured logging and optional span export.

pub mod tracing_setup;

pub use tracing_setup::{init_tracing, shutdown_tracing};
