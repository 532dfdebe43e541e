//! Producer frames flow through collector, transform chain and sinks.

use hickory_proto::rr::RecordType;

use crate::helpers::config::{TestConfigBuilder, free_port};
use crate::helpers::daemon::RunningDaemon;
use crate::helpers::producer::{connect, pdns_query, send, wire_query};

#[tokio::test]
async fn test_e2e_powerdns_query_reaches_text_sink() {
    // Given: A PowerDNS collector feeding a text sink
    let port = free_port();
    let config = TestConfigBuilder::new()
        .collector("pdns", "powerdns", port)
        .sink("console", "text")
        .build();
    let mut daemon = RunningDaemon::start(config).await;

    // When: A producer sends one query
    let mut producer = connect(port).await;
    send(&mut producer, &[pdns_query("www.example.com.", 1)]).await;

    // Then: One text line describes it
    let line = daemon.next_line("console").await;
    assert!(line.contains("recursor-1 CLIENT_QUERY -"), "got: {line}");
    assert!(line.contains("192.0.2.10 40000 INET UDP"), "got: {line}");
    assert!(line.contains("www.example.com A"), "got: {line}");

    let (result, _) = daemon.shutdown().await;
    result.unwrap();
}

#[tokio::test]
async fn test_e2e_suspicious_block_in_json_sink() {
    // Given: Suspicious detection and lowercasing enabled
    let port = free_port();
    let config = TestConfigBuilder::new()
        .collector("pdns", "powerdns", port)
        .sink("json", "json")
        .suspicious(true)
        .qname_lowercase(true)
        .build();
    let mut daemon = RunningDaemon::start(config).await;

    // When: A query with an uncommon type and unallowed characters arrives
    let mut producer = connect(port).await;
    send(&mut producer, &[pdns_query("AAAA==.Tunnel.Example.COM.", 65280)]).await;

    // Then: The JSON record carries the normalized name and the flags
    let line = daemon.next_line("json").await;
    let json: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(json["collector"], "pdns");
    assert_eq!(json["qname"], "aaaa==.tunnel.example.com");
    assert_eq!(json["qtype"], "TYPE65280");
    assert_eq!(json["suspicious"]["score"], 2.0);
    assert_eq!(json["suspicious"]["uncommon-qtypes"], true);
    assert_eq!(json["suspicious"]["unallowed-chars"], true);
    assert_eq!(json["suspicious"]["slow-domain"], false);

    let (result, _) = daemon.shutdown().await;
    result.unwrap();
}

#[tokio::test]
async fn test_e2e_fan_out_keeps_order_in_every_sink() {
    // Given: Two sinks with different formats
    let port = free_port();
    let config = TestConfigBuilder::new()
        .collector("pdns", "powerdns", port)
        .sink("console", "text")
        .sink("json", "json")
        .build();
    let mut daemon = RunningDaemon::start(config).await;

    // When: Five queries arrive on one connection
    let frames: Vec<Vec<u8>> = (0..5)
        .map(|i| pdns_query(&format!("q{i}.example.com."), 1))
        .collect();
    let mut producer = connect(port).await;
    send(&mut producer, &frames).await;

    // Then: Both sinks see all five in arrival order
    for i in 0..5 {
        let text = daemon.next_line("console").await;
        assert!(text.contains(&format!("q{i}.example.com ")), "got: {text}");

        let json: serde_json::Value =
            serde_json::from_str(&daemon.next_line("json").await).unwrap();
        assert_eq!(json["qname"], format!("q{i}.example.com"));
    }

    let (result, _) = daemon.shutdown().await;
    result.unwrap();
}

#[tokio::test]
async fn test_e2e_wire_collector_and_powerdns_collector_share_sink() {
    // Given: One collector per mode feeding one sink
    let pdns_port = free_port();
    let wire_port = free_port();
    let config = TestConfigBuilder::new()
        .collector("pdns", "powerdns", pdns_port)
        .collector("wire", "dns", wire_port)
        .sink("json", "json")
        .build();
    let mut daemon = RunningDaemon::start(config).await;

    // When: Each producer sends one query, one after the other
    let mut pdns = connect(pdns_port).await;
    send(&mut pdns, &[pdns_query("pdns.example.com.", 28)]).await;
    let first: serde_json::Value = serde_json::from_str(&daemon.next_line("json").await).unwrap();

    let mut wire = connect(wire_port).await;
    send(&mut wire, &[wire_query("wire.example.com.", RecordType::MX)]).await;
    let second: serde_json::Value =
        serde_json::from_str(&daemon.next_line("json").await).unwrap();

    // Then: Records are tagged with their collector
    assert_eq!(first["collector"], "pdns");
    assert_eq!(first["qtype"], "AAAA");
    assert_eq!(second["collector"], "wire");
    assert_eq!(second["qname"], "wire.example.com");
    assert_eq!(second["qtype"], "MX");
    assert_eq!(second["protocol"], "TCP");

    let (result, _) = daemon.shutdown().await;
    result.unwrap();
}

#[tokio::test]
async fn test_e2e_malformed_payload_is_still_emitted() {
    let port = free_port();
    let config = TestConfigBuilder::new()
        .collector("pdns", "powerdns", port)
        .sink("json", "json")
        .suspicious(true)
        .build();
    let mut daemon = RunningDaemon::start(config).await;

    // 0xff is not a valid protobuf field key
    let mut producer = connect(port).await;
    send(&mut producer, &[vec![0x00, 0x03, 0xff, 0xff, 0xff]]).await;

    let json: serde_json::Value = serde_json::from_str(&daemon.next_line("json").await).unwrap();
    assert_eq!(json["malformed"], true);
    assert_eq!(json["length"], 3);
    assert_eq!(json["suspicious"]["malformed-pkt"], true);

    let (result, _) = daemon.shutdown().await;
    result.unwrap();
}
