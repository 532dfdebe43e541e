//! Prometheus scrape endpoint.
//!
//! The HTTP listener built into `metrics-exporter-prometheus` serves every
//! collector, transform and sink metric registered in `dnspipe_core::metrics`.

use std::net::SocketAddr;

use anyhow::Result;
use dnspipe_core::config::MetricsConfig;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Resolve the scrape listener address from `[metrics]`.
///
/// Only the `/metrics` path is served by the built-in listener.
pub fn metrics_addr(config: &MetricsConfig) -> Result<SocketAddr> {
    if config.endpoint != "/metrics" {
        return Err(anyhow::anyhow!(
            "unsupported metrics endpoint '{}': only '/metrics' is served",
            config.endpoint
        ));
    }

    format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {}", e))
}

/// Install the global recorder and start the scrape listener.
///
/// Call once per process, before collectors start emitting.
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    let addr = metrics_addr(config)?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    dnspipe_core::metrics::describe_all();

    tracing::info!(listen_addr = %addr, "prometheus metrics endpoint active");
    Ok(())
}
