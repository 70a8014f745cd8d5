//! Outbound HTTP adapters.

pub mod webhook;
