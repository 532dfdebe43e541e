use anyhow::Result;
use clap::Parser;

use dnspipe_core::config::DnspipeConfig;
use dnspipe_daemon::cli::DaemonCli;
use dnspipe_daemon::logging;
use dnspipe_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // file -> env -> CLI, validated once all layers are applied
    let mut config = DnspipeConfig::from_file(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cli.config.display(), e))?;
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    if cli.validate {
        println!(
            "configuration OK: {} collector(s), {} sink(s)",
            config.collectors.iter().filter(|c| c.enabled).count(),
            config.sinks.len()
        );
        return Ok(());
    }

    logging::init_tracing(&config.general)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "dnspipe-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    if let Err(e) = orchestrator.run().await {
        tracing::error!(error = %e, "daemon terminated with error");
        return Err(e);
    }

    tracing::info!("dnspipe-daemon shut down");
    Ok(())
}
