//! Engine logic and repository trait definitions for Steward.
//!
//! This crate defines the "ports" (repository and collaborator traits) that
//! the infrastructure layer implements, plus the automation engine itself:
//! condition evaluation, the action handler registry, execution recording,
//! the delay scheduler, the workflow runner and the dispatcher. It depends
//! only on `steward-types` -- never on `steward-infra` or any database/IO crate.

pub mod collaborator;
pub mod event;
pub mod repository;
pub mod workflow;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
