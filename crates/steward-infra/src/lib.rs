//! Infrastructure layer for Steward.
//!
//! Contains implementations of the repository and collaborator traits defined
//! in `steward-core`: SQLite storage (workflows, execution audit, delay queue,
//! message outbox, reference directory), the HTTP webhook transport, and the
//! TOML configuration loader.

pub mod config;
pub mod http;
pub mod sqlite;
