//! Aggregated health reporting.
//!
//! Each registered plugin (collectors and sinks) reports its own
//! [`HealthStatus`]; the daemon status is the worst of them.
//!
//! # Aggregation Rule
//!
//! - All Healthy -> Healthy
//! - Any Degraded, none Unhealthy -> Degraded(reason)
//! - Any Unhealthy -> Unhealthy(reason)
//!
//! Plugins that have been stopped are reported but do not affect the result.

use serde::Serialize;

use dnspipe_core::pipeline::HealthStatus;
use dnspipe_core::plugin::{PluginState, PluginStatus};

/// Aggregated health report for the daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Worst status among live plugins.
    pub status: HealthStatus,
    /// Seconds since the orchestrator was built.
    pub uptime_secs: u64,
    /// Per-plugin reports in registration order.
    pub modules: Vec<ModuleHealth>,
}

/// Health of a single collector or sink.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleHealth {
    /// Plugin name from the config (e.g. "pdns", "console").
    pub name: String,
    /// Lifecycle state.
    pub state: PluginState,
    /// Reported health.
    pub status: HealthStatus,
}

impl From<PluginStatus> for ModuleHealth {
    fn from(status: PluginStatus) -> Self {
        Self {
            name: status.name,
            state: status.state,
            status: status.health,
        }
    }
}

impl ModuleHealth {
    /// Whether this module counts toward the aggregate.
    pub fn is_live(&self) -> bool {
        self.state != PluginState::Stopped
    }
}

/// Reduce per-module statuses to one: Unhealthy > Degraded > Healthy.
pub fn aggregate_status(modules: &[ModuleHealth]) -> HealthStatus {
    let mut worst = HealthStatus::Healthy;
    let mut reasons = Vec::new();

    for module in modules.iter().filter(|m| m.is_live()) {
        match &module.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                if !worst.is_unhealthy() {
                    reasons.push(format!("{}: {}", module.name, reason));
                    worst = HealthStatus::Degraded(String::new());
                }
            }
            HealthStatus::Unhealthy(reason) => {
                if !worst.is_unhealthy() {
                    // degraded reasons are dropped once anything is unhealthy
                    reasons.clear();
                }
                reasons.push(format!("{}: {}", module.name, reason));
                worst = HealthStatus::Unhealthy(String::new());
            }
        }
    }

    match worst {
        HealthStatus::Healthy => HealthStatus::Healthy,
        HealthStatus::Degraded(_) => HealthStatus::Degraded(reasons.join("; ")),
        HealthStatus::Unhealthy(_) => HealthStatus::Unhealthy(reasons.join("; ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str, status: HealthStatus) -> ModuleHealth {
        ModuleHealth {
            name: name.to_owned(),
            state: PluginState::Running,
            status,
        }
    }

    #[test]
    fn empty_is_healthy() {
        assert!(aggregate_status(&[]).is_healthy());
    }

    #[test]
    fn stopped_modules_are_ignored() {
        let mut stopped = module("pdns", HealthStatus::Unhealthy("collector stopped".into()));
        stopped.state = PluginState::Stopped;
        assert!(aggregate_status(&[stopped, module("console", HealthStatus::Healthy)]).is_healthy());
    }

    #[test]
    fn unhealthy_hides_degraded_reasons() {
        let status = aggregate_status(&[
            module("a", HealthStatus::Degraded("slow".into())),
            module("b", HealthStatus::Unhealthy("down".into())),
        ]);
        assert_eq!(status, HealthStatus::Unhealthy("b: down".to_owned()));
    }
}
