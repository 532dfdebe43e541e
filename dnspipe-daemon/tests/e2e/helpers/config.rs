//! Test configuration builder.

use std::net::TcpListener;

use dnspipe_core::config::{CollectorInstanceConfig, DnspipeConfig, SinkInstanceConfig};

/// Builds a `DnspipeConfig` with no collectors, no sinks and no PID file.
#[allow(dead_code)]
pub struct TestConfigBuilder {
    config: DnspipeConfig,
}

#[allow(dead_code)]
impl TestConfigBuilder {
    pub fn new() -> Self {
        let mut config = DnspipeConfig::default();
        config.general.pid_file = String::new();
        config.metrics.enabled = false;
        Self { config }
    }

    /// Add a loopback collector on `port`.
    pub fn collector(mut self, name: &str, mode: &str, port: u16) -> Self {
        self.config.collectors.push(CollectorInstanceConfig {
            name: name.to_owned(),
            mode: mode.to_owned(),
            listen_ip: "127.0.0.1".to_owned(),
            listen_port: port,
            read_timeout_secs: 2,
            ..Default::default()
        });
        self
    }

    /// Add a sink with the given format.
    pub fn sink(mut self, name: &str, format: &str) -> Self {
        self.config.sinks.push(SinkInstanceConfig {
            name: name.to_owned(),
            format: format.to_owned(),
            ..Default::default()
        });
        self
    }

    pub fn suspicious(mut self, enabled: bool) -> Self {
        self.config.transforms.suspicious.enabled = enabled;
        self
    }

    pub fn qname_lowercase(mut self, enabled: bool) -> Self {
        self.config.transforms.normalize.qname_lowercase = enabled;
        self
    }

    pub fn build(self) -> DnspipeConfig {
        self.config
    }
}

/// Reserve a loopback port that is free right now.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}
