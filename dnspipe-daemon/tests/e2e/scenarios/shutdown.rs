//! Graceful shutdown: producers are disconnected, sinks flush and close.

use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;

use crate::helpers::config::{TestConfigBuilder, free_port};
use crate::helpers::daemon::{RunningDaemon, WAIT};
use crate::helpers::producer::{connect, pdns_query, send};

#[tokio::test]
async fn test_e2e_shutdown_closes_producer_connections() {
    // Given: Three idle producers connected to a running daemon
    let port = free_port();
    let config = TestConfigBuilder::new()
        .collector("pdns", "powerdns", port)
        .sink("console", "text")
        .build();
    let mut daemon = RunningDaemon::start(config).await;

    let mut producers = Vec::new();
    for i in 0..3 {
        let mut producer = connect(port).await;
        send(&mut producer, &[pdns_query(&format!("p{i}.example.com."), 1)]).await;
        // the line proves the connection is being served
        daemon.next_line("console").await;
        producers.push(producer);
    }

    // When: Shutting down
    let started = Instant::now();
    let (result, _) = daemon.shutdown().await;

    // Then: Shutdown succeeds quickly and every producer sees the close
    result.unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));
    for mut producer in producers {
        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(WAIT, producer.read(&mut buf))
            .await
            .expect("close should be observed");
        // RST (reset_conn) surfaces as an error, FIN as 0 bytes
        assert!(matches!(read, Ok(0) | Err(_)));
    }
}

#[tokio::test]
async fn test_e2e_sink_output_ends_after_shutdown() {
    let port = free_port();
    let config = TestConfigBuilder::new()
        .collector("pdns", "powerdns", port)
        .sink("console", "text")
        .build();
    let mut daemon = RunningDaemon::start(config).await;

    let mut producer = connect(port).await;
    send(&mut producer, &[pdns_query("last.example.com.", 1)]).await;
    assert!(daemon.next_line("console").await.contains("last.example.com"));

    let (result, mut outputs) = daemon.shutdown().await;
    result.unwrap();

    // the writer is dropped once the sink has drained
    let lines = outputs.get_mut("console").unwrap();
    let next = tokio::time::timeout(WAIT, lines.next_line()).await.unwrap().unwrap();
    assert!(next.is_none());
}

#[tokio::test]
async fn test_e2e_new_connections_refused_after_shutdown() {
    let port = free_port();
    let config = TestConfigBuilder::new()
        .collector("pdns", "powerdns", port)
        .build();
    let daemon = RunningDaemon::start(config).await;
    drop(connect(port).await);

    let (result, _) = daemon.shutdown().await;
    result.unwrap();

    assert!(tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_err());
}
