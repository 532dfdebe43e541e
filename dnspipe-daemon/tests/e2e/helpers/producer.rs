//! Simulated telemetry producers.

use std::time::Duration;

use hickory_proto::op::{Message, MessageType, Query};
use hickory_proto::rr::{Name, RecordType};
use hickory_proto::serialize::binary::BinEncodable;
use prost::Message as _;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use dnspipe_collector::decoder::powerdns::{
    DnsQuestion, MessageType as PbMessageType, PbDnsMessage, SocketFamily, SocketProtocol,
};
use dnspipe_collector::{LengthPrefix, encode_frame};

use super::daemon::WAIT;

/// Connect to a collector, retrying until its listener is bound.
pub async fn connect(port: u16) -> TcpStream {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        match TcpStream::connect(("127.0.0.1", port)).await {
            Ok(stream) => return stream,
            Err(e) if tokio::time::Instant::now() >= deadline => {
                panic!("collector on port {port} never came up: {e}")
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
}

/// A PowerDNS client query as a length-prefixed frame.
pub fn pdns_query(qname: &str, qtype: u32) -> Vec<u8> {
    let msg = PbDnsMessage {
        r#type: Some(PbMessageType::DnsQueryType as i32),
        server_identity: Some(b"recursor-1".to_vec()),
        socket_family: Some(SocketFamily::Inet as i32),
        socket_protocol: Some(SocketProtocol::Udp as i32),
        from: Some(vec![192, 0, 2, 10]),
        from_port: Some(40_000),
        time_sec: Some(1_700_000_000),
        time_usec: Some(0),
        question: Some(DnsQuestion {
            q_name: Some(qname.to_owned()),
            q_type: Some(qtype),
            q_class: Some(1),
        }),
        ..Default::default()
    };
    encode_frame(LengthPrefix::U16, &msg.encode_to_vec())
        .expect("frame fits")
        .to_vec()
}

/// A wire-format DNS query as a length-prefixed frame.
pub fn wire_query(qname: &str, qtype: RecordType) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(7)
        .set_message_type(MessageType::Query)
        .add_query(Query::query(Name::from_ascii(qname).expect("valid name"), qtype));
    let payload = msg.to_vec().expect("encodable");
    encode_frame(LengthPrefix::U16, &payload)
        .expect("frame fits")
        .to_vec()
}

/// Write frames and flush.
pub async fn send(stream: &mut TcpStream, frames: &[Vec<u8>]) {
    for frame in frames {
        stream.write_all(frame).await.expect("write frame");
    }
    stream.flush().await.expect("flush");
}
