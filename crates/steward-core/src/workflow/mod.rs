//! Automation engine: definitions, condition gating, handlers, and execution.
//!
//! - `definition` -- YAML parsing, validation, lifecycle transitions
//! - `condition` -- JEXL condition evaluator (fail-closed)
//! - `context` -- accumulated execution context shared by conditions and templates
//! - `template` -- `{{ path }}` rendering and the template library
//! - `handler` -- `ActionHandler` trait and registry
//! - `handlers` -- built-in handlers, one per action type
//! - `recorder` -- durable execution audit writes
//! - `delay` -- durable delay scheduler and its worker wait loop
//! - `runner` -- executes one workflow's ordered actions
//! - `dispatcher` -- fans a trigger out to matching workflows

pub mod condition;
pub mod context;
pub mod definition;
pub mod delay;
pub mod dispatcher;
pub mod handler;
pub mod handlers;
pub mod recorder;
pub mod runner;
pub mod template;
