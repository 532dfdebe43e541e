//! Shared E2E test helpers.

pub mod config;
pub mod daemon;
pub mod producer;
