//! Shared domain types for Steward.
//!
//! This crate contains the types used across the automation engine:
//! workflow definitions, trigger contexts, execution audit records,
//! engine events, configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod execution;
pub mod trigger;
pub mod workflow;
