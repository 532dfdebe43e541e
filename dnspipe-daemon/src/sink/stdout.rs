//! Line-oriented sink writing one record per line to stdout.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use dnspipe_core::error::{DnspipeError, PipelineError};
use dnspipe_core::pipeline::HealthStatus;
use dnspipe_core::plugin::{Plugin, PluginInfo, PluginState};
use dnspipe_core::record::Record;

/// Output stream owned by a sink.
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Record rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFormat {
    /// `Record::to_text_line`
    Text,
    /// `Record::to_json`
    Json,
}

impl FromStr for SinkFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(anyhow::anyhow!(
                "unknown sink format '{}', expected 'text' or 'json'",
                other
            )),
        }
    }
}

impl fmt::Display for SinkFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl SinkFormat {
    fn render(&self, record: &Record) -> Result<String, serde_json::Error> {
        match self {
            Self::Text => Ok(record.to_text_line()),
            Self::Json => record.to_json(),
        }
    }
}

/// Stdout sink plugin.
///
/// On stop the input channel is closed and records already buffered in it
/// are still written.
pub struct StdoutSink {
    info: PluginInfo,
    state: PluginState,
    format: SinkFormat,
    rx: Option<mpsc::Receiver<Record>>,
    writer: Mutex<Option<BoxWriter>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<u64>>,
}

impl StdoutSink {
    /// Create a sink writing to the process stdout.
    pub fn new(name: &str, format: SinkFormat, rx: mpsc::Receiver<Record>) -> Self {
        Self::with_writer(name, format, rx, Box::new(tokio::io::stdout()))
    }

    /// Create a sink writing to an arbitrary async writer.
    pub fn with_writer(
        name: &str,
        format: SinkFormat,
        rx: mpsc::Receiver<Record>,
        writer: BoxWriter,
    ) -> Self {
        Self {
            info: PluginInfo::sink(name, format!("stdout sink ({format})")),
            state: PluginState::Created,
            format,
            rx: Some(rx),
            writer: Mutex::new(Some(writer)),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    pub fn format(&self) -> SinkFormat {
        self.format
    }
}

impl Plugin for StdoutSink {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn state(&self) -> PluginState {
        self.state
    }

    async fn init(&mut self) -> Result<(), DnspipeError> {
        if self.rx.is_none() {
            return Err(PipelineError::InitFailed(format!(
                "sink '{}' has no input channel",
                self.info.name
            ))
            .into());
        }
        self.state = PluginState::Initialized;
        Ok(())
    }

    async fn start(&mut self) -> Result<(), DnspipeError> {
        if self.state == PluginState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        let rx = self.rx.take();
        let writer = self
            .writer
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let (Some(rx), Some(writer)) = (rx, writer) else {
            return Err(PipelineError::InitFailed(format!(
                "sink '{}' cannot be restarted",
                self.info.name
            ))
            .into());
        };

        self.task = Some(tokio::spawn(write_records(
            self.info.name.clone(),
            self.format,
            rx,
            writer,
            self.cancel.clone(),
        )));
        self.state = PluginState::Running;
        tracing::info!(sink = %self.info.name, format = %self.format, "sink started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), DnspipeError> {
        let Some(task) = self.task.take() else {
            self.state = PluginState::Stopped;
            return Ok(());
        };

        self.cancel.cancel();
        let written = task
            .await
            .map_err(|e| PipelineError::ChannelSend(format!("sink task failed: {e}")))?;

        self.state = PluginState::Stopped;
        tracing::info!(sink = %self.info.name, written, "sink stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match (&self.state, &self.task) {
            (PluginState::Running, Some(task)) if task.is_finished() => {
                HealthStatus::Unhealthy("writer stopped".to_owned())
            }
            (PluginState::Running, _) => HealthStatus::Healthy,
            (state, _) => HealthStatus::Unhealthy(format!("sink {state}")),
        }
    }
}

/// Drain `rx` into `writer` until the channel closes or the sink is cancelled.
async fn write_records(
    name: String,
    format: SinkFormat,
    mut rx: mpsc::Receiver<Record>,
    mut writer: BoxWriter,
    cancel: CancellationToken,
) -> u64 {
    let mut written = 0u64;
    let mut closing = false;

    loop {
        let record = tokio::select! {
            biased;
            record = rx.recv() => match record {
                Some(record) => record,
                None => break,
            },
            _ = cancel.cancelled(), if !closing => {
                // buffered records are still delivered by recv()
                rx.close();
                closing = true;
                continue;
            }
        };

        let line = match format.render(&record) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(sink = %name, error = %e, "record serialization failed");
                continue;
            }
        };

        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = result {
            tracing::error!(sink = %name, error = %e, "sink write failed, closing sink");
            break;
        }
        written += 1;
    }

    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};

    fn record(qname: &str) -> Record {
        let mut record = Record::new("pdns");
        record.qname = qname.to_owned();
        record.qtype = "A".to_owned();
        record.operation = "CLIENT_RESPONSE".to_owned();
        record.rcode = "NOERROR".to_owned();
        record
    }

    #[test]
    fn format_parsing() {
        assert_eq!("text".parse::<SinkFormat>().unwrap(), SinkFormat::Text);
        assert_eq!("json".parse::<SinkFormat>().unwrap(), SinkFormat::Json);
        assert!("yaml".parse::<SinkFormat>().is_err());
    }

    #[tokio::test]
    async fn writes_text_lines() {
        let (tx, rx) = mpsc::channel(8);
        let (client, server) = tokio::io::duplex(4096);
        let mut sink = StdoutSink::with_writer("console", SinkFormat::Text, rx, Box::new(client));

        sink.init().await.unwrap();
        sink.start().await.unwrap();
        assert!(sink.health_check().await.is_healthy());

        tx.send(record("www.example.com")).await.unwrap();

        let mut lines = BufReader::new(server).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        assert!(line.contains("CLIENT_RESPONSE NOERROR"));
        assert!(line.contains("www.example.com A"));

        sink.stop().await.unwrap();
        assert_eq!(Plugin::state(&sink), PluginState::Stopped);
    }

    #[tokio::test]
    async fn writes_json_lines() {
        let (tx, rx) = mpsc::channel(8);
        let (client, server) = tokio::io::duplex(4096);
        let mut sink = StdoutSink::with_writer("json", SinkFormat::Json, rx, Box::new(client));
        sink.init().await.unwrap();
        sink.start().await.unwrap();

        tx.send(record("json.example.com")).await.unwrap();

        let mut lines = BufReader::new(server).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["qname"], "json.example.com");

        sink.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_drains_buffered_records() {
        let (tx, rx) = mpsc::channel(8);
        let (client, server) = tokio::io::duplex(64 * 1024);
        let mut sink = StdoutSink::with_writer("console", SinkFormat::Text, rx, Box::new(client));

        for i in 0..5 {
            tx.send(record(&format!("q{i}.example.com"))).await.unwrap();
        }
        sink.init().await.unwrap();
        sink.start().await.unwrap();
        sink.stop().await.unwrap();

        let mut lines = BufReader::new(server).lines();
        for i in 0..5 {
            let line = lines.next_line().await.unwrap().unwrap();
            assert!(line.contains(&format!("q{i}.example.com")));
        }
        // 종료 후 전송은 실패
        assert!(tx.send(record("late.example.com")).await.is_err());
    }

    #[tokio::test]
    async fn stop_without_start_is_ok() {
        let (_tx, rx) = mpsc::channel(1);
        let mut sink = StdoutSink::new("console", SinkFormat::Text, rx);
        sink.stop().await.unwrap();
        sink.stop().await.unwrap();
        assert!(sink.health_check().await.is_unhealthy());
    }

    #[tokio::test]
    async fn restart_is_rejected() {
        let (_tx, rx) = mpsc::channel(1);
        let (client, _server) = tokio::io::duplex(64);
        let mut sink = StdoutSink::with_writer("console", SinkFormat::Text, rx, Box::new(client));
        sink.start().await.unwrap();
        sink.stop().await.unwrap();
        assert!(sink.start().await.is_err());
    }
}
