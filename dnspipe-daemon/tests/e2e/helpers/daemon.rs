//! A daemon running in a background task with captured sink output.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, Lines};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use dnspipe_core::config::DnspipeConfig;
use dnspipe_daemon::orchestrator::Orchestrator;
use dnspipe_daemon::sink::BoxWriter;

/// Timeout for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

/// Handle to a running orchestrator.
pub struct RunningDaemon {
    task: JoinHandle<Result<()>>,
    trigger: oneshot::Sender<()>,
    outputs: HashMap<String, Lines<BufReader<DuplexStream>>>,
}

impl RunningDaemon {
    /// Build and start the orchestrator, capturing every configured sink.
    pub async fn start(config: DnspipeConfig) -> Self {
        let mut writers: HashMap<String, BoxWriter> = HashMap::new();
        let mut outputs = HashMap::new();
        for sink in &config.sinks {
            let (writer, reader) = tokio::io::duplex(64 * 1024);
            writers.insert(sink.name.clone(), Box::new(writer));
            outputs.insert(sink.name.clone(), BufReader::new(reader).lines());
        }

        let mut orchestrator = Orchestrator::build_with_outputs(config, writers)
            .await
            .expect("orchestrator should build");

        let (trigger, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            orchestrator
                .run_until(async move {
                    let _ = rx.await;
                    Ok("test")
                })
                .await
        });

        Self {
            task,
            trigger,
            outputs,
        }
    }

    /// Next line written by `sink`.
    pub async fn next_line(&mut self, sink: &str) -> String {
        let lines = self.outputs.get_mut(sink).expect("sink is captured");
        match tokio::time::timeout(WAIT, lines.next_line()).await {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => panic!("sink '{sink}' closed its output"),
            Ok(Err(e)) => panic!("reading sink '{sink}' failed: {e}"),
            Err(_) => panic!("timed out waiting for a line from sink '{sink}'"),
        }
    }

    /// Trigger shutdown and wait for `run_until` to return.
    ///
    /// Returns the remaining output readers so tests can check what was
    /// flushed during shutdown.
    pub async fn shutdown(self) -> (Result<()>, HashMap<String, Lines<BufReader<DuplexStream>>>) {
        let _ = self.trigger.send(());
        let result = tokio::time::timeout(WAIT, self.task)
            .await
            .expect("daemon should stop in time")
            .expect("daemon task should not panic");
        (result, self.outputs)
    }
}
