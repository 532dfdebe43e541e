//! Module orchestration -- assembly, fan-out wiring, and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `dnspipe-daemon`.
//! It validates configuration, creates one bounded input channel per sink,
//! builds the enabled collectors around the shared [`SinkRegistry`], and
//! drives startup and shutdown.
//!
//! # Startup Order (consumers before producers)
//!
//! 1. Sinks (`[[sinks]]`, in file order)
//! 2. Collectors (`[[collectors]]` with `enabled = true`, in file order)
//!
//! # Shutdown Order (reverse of startup)
//!
//! 1. Collectors stop accepting and close every producer connection
//! 2. Sinks close their channels and drain buffered records

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::broadcast;

use dnspipe_collector::DnsCollector;
use dnspipe_core::config::DnspipeConfig;
use dnspipe_core::plugin::PluginRegistry;
use dnspipe_core::sink::SinkRegistry;
use dnspipe_transform::TransformConfig;

use crate::health::{DaemonHealth, ModuleHealth, aggregate_status};
use crate::metrics_server;
use crate::sink::{self, BoxWriter};

/// Interval between aggregated health checks in the main loop.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Interval between uptime gauge updates.
const UPTIME_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Validated configuration.
    config: DnspipeConfig,
    /// Sinks first, then collectors.
    plugins: PluginRegistry,
    /// Signals background tasks on shutdown.
    shutdown_tx: broadcast::Sender<()>,
    /// For uptime reporting.
    start_time: Instant,
}

impl Orchestrator {
    /// Load `dnspipe.toml`, apply environment overrides, and build.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = DnspipeConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration. Sinks write to stdout.
    pub async fn build_from_config(config: DnspipeConfig) -> Result<Self> {
        Self::build_with_outputs(config, HashMap::new()).await
    }

    /// Build with per-sink output streams.
    ///
    /// `outputs` maps a sink name to the writer that replaces stdout for
    /// that sink. Sinks without an entry write to stdout.
    pub async fn build_with_outputs(
        config: DnspipeConfig,
        mut outputs: HashMap<String, BoxWriter>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        // Install metrics recorder before any collector emits
        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let transforms = Arc::new(
            TransformConfig::from_core(&config.transforms)
                .map_err(|e| anyhow::anyhow!("invalid transform config: {}", e))?,
        );
        tracing::debug!(
            suspicious = transforms.suspicious.enabled,
            qname_lowercase = transforms.normalize.qname_lowercase,
            "transform chain configured"
        );

        let mut plugins = PluginRegistry::new();
        let mut sinks = SinkRegistry::new();

        for sink_config in &config.sinks {
            let writer = outputs.remove(&sink_config.name);
            let sink = sink::build_sink(sink_config, &mut sinks, writer)
                .map_err(|e| anyhow::anyhow!("failed to build sink '{}': {}", sink_config.name, e))?;
            tracing::info!(
                sink = %sink_config.name,
                kind = %sink_config.kind,
                format = %sink_config.format,
                "sink configured"
            );
            plugins.register(Box::new(sink))?;
        }

        if sinks.is_empty() {
            tracing::warn!("no sinks configured, records will be discarded");
        }

        for collector_config in config.collectors.iter().filter(|c| c.enabled) {
            let collector =
                DnsCollector::from_core(collector_config, Arc::clone(&transforms), sinks.clone())
                    .map_err(|e| {
                        anyhow::anyhow!(
                            "failed to build collector '{}': {}",
                            collector_config.name,
                            e
                        )
                    })?;
            tracing::info!(
                collector = %collector_config.name,
                mode = %collector_config.mode,
                tls = collector_config.tls_support,
                "collector configured"
            );
            plugins.register(Box::new(collector))?;
        }

        if !config.collectors.iter().any(|c| c.enabled) {
            tracing::warn!("no collectors enabled");
        }

        for name in outputs.keys() {
            tracing::warn!(sink = %name, "output given for unknown sink");
        }

        let (shutdown_tx, _) = broadcast::channel(4);

        tracing::info!(total_plugins = plugins.len(), "orchestrator initialized");

        if config.metrics.enabled {
            record_daemon_metrics(plugins.len());
        }

        Ok(Self {
            config,
            plugins,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Start all plugins and block until SIGTERM or SIGINT.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(wait_for_shutdown_signal()).await
    }

    /// Start all plugins and block until `shutdown` resolves.
    ///
    /// `shutdown` yields the name of the trigger for logging.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = Result<&'static str>>,
    {
        let pid_file = self.pid_file().map(Path::to_path_buf);
        if let Some(path) = &pid_file {
            write_pid_file(path)?;
        }

        tracing::info!("initializing all plugins");
        if let Err(e) = self.plugins.init_all().await {
            tracing::error!(error = %e, "plugin initialization failed");
            // listeners bound before the failure are released by stop
            if let Err(stop_err) = self.plugins.stop_all().await {
                tracing::error!(
                    init_error = %e,
                    cleanup_error = %stop_err,
                    "cleanup failed after initialization failure"
                );
            }
            if let Some(path) = &pid_file {
                remove_pid_file(path);
            }
            return Err(e.into());
        }

        tracing::info!("starting all plugins");
        if let Err(e) = self.plugins.start_all().await {
            tracing::warn!("startup failed, rolling back already-started plugins");
            if let Err(stop_err) = self.plugins.stop_all().await {
                tracing::error!(
                    startup_error = %e,
                    rollback_error = %stop_err,
                    "rollback also failed during startup failure cleanup"
                );
            }
            if let Some(path) = &pid_file {
                remove_pid_file(path);
            }
            return Err(e.into());
        }

        let uptime_task = if self.config.metrics.enabled {
            Some(spawn_uptime_updater(
                self.start_time,
                self.shutdown_tx.subscribe(),
            ))
        } else {
            None
        };

        tracing::info!("entering main event loop");
        let signal = self.wait_with_health_checks(shutdown).await;
        match &signal {
            Ok(name) => tracing::info!(signal = name, "shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "shutdown trigger failed, stopping"),
        }

        let _ = self.shutdown_tx.send(());
        if let Some(task) = uptime_task {
            let _ = task.await;
        }

        let stopped = self.shutdown().await;

        if let Some(path) = &pid_file {
            remove_pid_file(path);
        }

        signal?;
        stopped
    }

    /// Wait for `shutdown`, logging the aggregated health whenever it is not healthy.
    async fn wait_with_health_checks<F>(&self, shutdown: F) -> Result<&'static str>
    where
        F: Future<Output = Result<&'static str>>,
    {
        let mut interval = tokio::time::interval(HEALTH_CHECK_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // first tick completes immediately
        interval.tick().await;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                result = &mut shutdown => return result,
                _ = interval.tick() => {
                    let health = self.health().await;
                    if health.status.is_healthy() {
                        tracing::debug!(uptime_secs = health.uptime_secs, "daemon healthy");
                    } else {
                        tracing::warn!(status = %health.status, "daemon health degraded");
                    }
                }
            }
        }
    }

    /// Stop all plugins in reverse registration order.
    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping all plugins");
        self.plugins.stop_all().await.map_err(|e| e.into())
    }

    /// Current aggregated health.
    pub async fn health(&self) -> DaemonHealth {
        let modules: Vec<ModuleHealth> = self
            .plugins
            .snapshot()
            .await
            .into_iter()
            .map(ModuleHealth::from)
            .collect();

        DaemonHealth {
            status: aggregate_status(&modules),
            uptime_secs: self.start_time.elapsed().as_secs(),
            modules,
        }
    }

    /// Names of registered plugins in start order.
    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.names()
    }

    /// The loaded configuration.
    pub fn config(&self) -> &DnspipeConfig {
        &self.config
    }

    fn pid_file(&self) -> Option<&Path> {
        let path = self.config.general.pid_file.as_str();
        (!path.is_empty()).then(|| Path::new(path))
    }
}

/// Wait for SIGTERM or SIGINT and return the signal name.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Write the current process PID to `path`.
///
/// The file is created atomically with `create_new`; an existing file means
/// another instance is running (or a stale file was left behind). The parent
/// directory is created with mode 0o700 and the file with 0o600.
pub fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            fs::DirBuilder::new()
                .mode(0o700)
                .recursive(true)
                .create(parent)?;
        }
        #[cfg(not(unix))]
        fs::create_dir_all(parent)?;
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    if !file.metadata()?.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    writeln!(file, "{}", pid)?;

    tracing::info!(pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file. Failures are logged, never returned.
pub fn remove_pid_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::info!(path = %path.display(), "PID file removed"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file"),
    }
}

/// Record build info and plugin count once at startup.
fn record_daemon_metrics(plugin_count: usize) {
    use dnspipe_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    #[allow(clippy::cast_precision_loss)]
    metrics::gauge!(m::DAEMON_PLUGINS_REGISTERED).set(plugin_count as f64);

    tracing::debug!(
        plugin_count,
        version = env!("CARGO_PKG_VERSION"),
        "daemon metrics recorded"
    );
}

/// Keep the uptime gauge fresh for scrapes until shutdown.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    use dnspipe_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_UPDATE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dnspipe_core::config::{CollectorInstanceConfig, SinkInstanceConfig};

    fn local_collector(name: &str) -> CollectorInstanceConfig {
        CollectorInstanceConfig {
            name: name.to_owned(),
            listen_ip: "127.0.0.1".to_owned(),
            listen_port: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn sinks_are_registered_before_collectors() {
        let config = DnspipeConfig {
            collectors: vec![local_collector("pdns")],
            sinks: vec![SinkInstanceConfig::default()],
            ..Default::default()
        };
        let orchestrator = Orchestrator::build_from_config(config).await.unwrap();
        assert_eq!(orchestrator.plugin_names(), vec!["console", "pdns"]);
    }

    #[tokio::test]
    async fn disabled_collectors_are_skipped() {
        let mut disabled = local_collector("off");
        disabled.enabled = false;
        let config = DnspipeConfig {
            collectors: vec![local_collector("on"), disabled],
            ..Default::default()
        };
        let orchestrator = Orchestrator::build_from_config(config).await.unwrap();
        assert_eq!(orchestrator.plugin_names(), vec!["on"]);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let mut config = DnspipeConfig::default();
        config.general.log_level = "loud".to_owned();
        assert!(Orchestrator::build_from_config(config).await.is_err());
    }

    #[tokio::test]
    async fn run_until_stops_on_trigger() {
        let config = DnspipeConfig {
            collectors: vec![local_collector("pdns")],
            sinks: vec![SinkInstanceConfig::default()],
            ..Default::default()
        };
        let mut orchestrator = Orchestrator::build_from_config(config).await.unwrap();
        orchestrator.run_until(async { Ok("test") }).await.unwrap();

        let health = orchestrator.health().await;
        assert!(health.modules.iter().all(|m| !m.is_live()));
    }

    #[test]
    fn pid_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("dnspipe.pid");

        write_pid_file(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());

        assert!(write_pid_file(&path).is_err());

        remove_pid_file(&path);
        assert!(!path.exists());
    }
}
