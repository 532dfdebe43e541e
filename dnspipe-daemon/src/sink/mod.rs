//! Output sinks.
//!
//! Every sink owns one bounded input channel registered in the shared
//! [`SinkRegistry`]. Collectors hold cloned senders; the sink drains its
//! receiver at its own pace.

pub mod stdout;

use anyhow::Result;

use dnspipe_core::config::SinkInstanceConfig;
use dnspipe_core::sink::SinkRegistry;

pub use stdout::{BoxWriter, SinkFormat, StdoutSink};

/// Create the sink described by `config` and register its input channel.
///
/// `writer` replaces the process stdout when given.
pub fn build_sink(
    config: &SinkInstanceConfig,
    registry: &mut SinkRegistry,
    writer: Option<BoxWriter>,
) -> Result<StdoutSink> {
    match config.kind.as_str() {
        "stdout" => {
            let format: SinkFormat = config.format.parse()?;
            let rx = registry.channel(&config.name, config.channel_capacity)?;
            Ok(match writer {
                Some(writer) => StdoutSink::with_writer(&config.name, format, rx, writer),
                None => StdoutSink::new(&config.name, format, rx),
            })
        }
        other => Err(anyhow::anyhow!("unknown sink kind '{}'", other)),
    }
}
