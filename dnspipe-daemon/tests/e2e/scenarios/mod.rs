//! E2E scenarios.

mod pipeline_flow;
mod shutdown;
