//! End-to-end tests for dnspipe-daemon.
//!
//! A real orchestrator is started with loopback collectors and sinks whose
//! output is captured through in-memory pipes; producers are simulated over
//! TCP.
//!
//! # Test Structure
//!
//! - `helpers/` -- config builder, running daemon handle, producer frames
//! - `scenarios/` -- test files organized by scenario
//!
//! # Running
//!
//! ```bash
//! cargo test -p dnspipe-daemon --test e2e
//! ```

mod helpers;
mod scenarios;
