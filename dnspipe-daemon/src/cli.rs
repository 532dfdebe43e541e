//! CLI argument definitions for dnspipe-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// dnspipe DNS telemetry collector.
///
/// Accepts length-prefixed DNS telemetry streams from DNS servers,
/// tags suspicious traffic and fans records out to the configured sinks.
#[derive(Parser, Debug)]
#[command(name = "dnspipe-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to dnspipe.toml configuration file.
    #[arg(short, long, default_value = "/etc/dnspipe/dnspipe.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,
}

impl DaemonCli {
    /// Apply CLI overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut dnspipe_core::DnspipeConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(pid_file) = &self.pid_file {
            config.general.pid_file = pid_file.clone();
        }
    }
}
