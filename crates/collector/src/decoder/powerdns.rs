//! PowerDNS protobuf 디코더
//!
//! PowerDNS Recursor/dnsdist의 `PBDNSMessage`를 디코딩합니다.
//! 이 파이프라인이 사용하는 필드만 정의하며, 나머지 필드는 prost가 건너뜁니다.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, Utc};
use prost::Message;

use dnspipe_core::record::Record;

use super::{DecodeContext, PayloadDecoder, qtype_name, rcode_name, trim_fqdn};

/// `PBDNSMessage.Type`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MessageType {
    DnsQueryType = 1,
    DnsResponseType = 2,
    DnsOutgoingQueryType = 3,
    DnsIncomingResponseType = 4,
}

impl MessageType {
    /// 레코드 `operation` 값
    pub fn operation(&self) -> &'static str {
        match self {
            Self::DnsQueryType => "CLIENT_QUERY",
            Self::DnsResponseType => "CLIENT_RESPONSE",
            Self::DnsOutgoingQueryType => "RESOLVER_QUERY",
            Self::DnsIncomingResponseType => "RESOLVER_RESPONSE",
        }
    }

    /// 응답 메시지 여부
    pub fn is_response(&self) -> bool {
        matches!(self, Self::DnsResponseType | Self::DnsIncomingResponseType)
    }
}

/// `PBDNSMessage.SocketFamily`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum SocketFamily {
    Inet = 1,
    Inet6 = 2,
}

/// `PBDNSMessage.SocketProtocol`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum SocketProtocol {
    Udp = 1,
    Tcp = 2,
    Dot = 3,
    Doh = 4,
    DnsCryptUdp = 5,
    DnsCryptTcp = 6,
    Doq = 7,
}

impl SocketProtocol {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Udp => "UDP",
            Self::Tcp => "TCP",
            Self::Dot => "DOT",
            Self::Doh => "DOH",
            Self::DnsCryptUdp => "DNSCryptUDP",
            Self::DnsCryptTcp => "DNSCryptTCP",
            Self::Doq => "DOQ",
        }
    }
}

/// `PBDNSMessage.DNSQuestion`
#[derive(Clone, PartialEq, prost::Message)]
pub struct DnsQuestion {
    #[prost(string, optional, tag = "1")]
    pub q_name: Option<String>,
    #[prost(uint32, optional, tag = "2")]
    pub q_type: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub q_class: Option<u32>,
}

/// `PBDNSMessage.DNSResponse`
#[derive(Clone, PartialEq, prost::Message)]
pub struct DnsResponse {
    #[prost(uint32, optional, tag = "1")]
    pub rcode: Option<u32>,
    #[prost(uint32, optional, tag = "5")]
    pub query_time_sec: Option<u32>,
    #[prost(uint32, optional, tag = "6")]
    pub query_time_usec: Option<u32>,
}

/// `PBDNSMessage`
#[derive(Clone, PartialEq, prost::Message)]
pub struct PbDnsMessage {
    #[prost(enumeration = "MessageType", optional, tag = "1")]
    pub r#type: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub message_id: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub server_identity: Option<Vec<u8>>,
    #[prost(enumeration = "SocketFamily", optional, tag = "4")]
    pub socket_family: Option<i32>,
    #[prost(enumeration = "SocketProtocol", optional, tag = "5")]
    pub socket_protocol: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub from: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "7")]
    pub to: Option<Vec<u8>>,
    #[prost(uint64, optional, tag = "8")]
    pub in_bytes: Option<u64>,
    #[prost(uint32, optional, tag = "9")]
    pub time_sec: Option<u32>,
    #[prost(uint32, optional, tag = "10")]
    pub time_usec: Option<u32>,
    #[prost(uint32, optional, tag = "11")]
    pub id: Option<u32>,
    #[prost(message, optional, tag = "12")]
    pub question: Option<DnsQuestion>,
    #[prost(message, optional, tag = "13")]
    pub response: Option<DnsResponse>,
    #[prost(uint32, optional, tag = "20")]
    pub from_port: Option<u32>,
    #[prost(uint32, optional, tag = "21")]
    pub to_port: Option<u32>,
}

/// PowerDNS protobuf 디코더
#[derive(Debug, Default, Clone, Copy)]
pub struct PowerDnsDecoder;

impl PayloadDecoder for PowerDnsDecoder {
    fn name(&self) -> &'static str {
        "powerdns"
    }

    fn decode(&self, payload: &[u8], ctx: &DecodeContext) -> Record {
        let msg = match PbDnsMessage::decode(payload) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::trace!(peer = %ctx.peer, error = %e, "protobuf decode failed");
                return ctx.malformed(payload.len());
            }
        };

        let mut record = ctx.record();
        let msg_type = msg.r#type.and_then(|t| MessageType::try_from(t).ok());

        if let Some(identity) = msg.server_identity.as_deref().filter(|b| !b.is_empty()) {
            record.identity = String::from_utf8_lossy(identity).into_owned();
        }
        if let Some(t) = msg_type {
            record.operation = t.operation().to_owned();
        }
        if let Some(family) = msg.socket_family.and_then(|f| SocketFamily::try_from(f).ok()) {
            record.family = match family {
                SocketFamily::Inet => "INET",
                SocketFamily::Inet6 => "INET6",
            }
            .to_owned();
        }
        if let Some(p) = msg.socket_protocol.and_then(|p| SocketProtocol::try_from(p).ok()) {
            record.protocol = p.as_str().to_owned();
        }

        record.query_ip = msg.from.as_deref().and_then(ip_from_bytes);
        record.response_ip = msg.to.as_deref().and_then(ip_from_bytes);
        record.query_port = msg.from_port.and_then(|p| u16::try_from(p).ok());
        record.response_port = msg.to_port.and_then(|p| u16::try_from(p).ok());

        record.length = msg
            .in_bytes
            .and_then(|b| usize::try_from(b).ok())
            .unwrap_or(payload.len());

        if let Some(q) = &msg.question {
            if let Some(name) = &q.q_name {
                record.qname = trim_fqdn(name);
            }
            if let Some(qtype) = q.q_type.and_then(|t| u16::try_from(t).ok()) {
                record.qtype = qtype_name(qtype);
            }
        }

        let time = msg.time_sec.map(|sec| (sec, msg.time_usec.unwrap_or(0)));
        if let Some(ts) = time.and_then(|(sec, usec)| to_datetime(sec, usec)) {
            record.timestamp = ts;
        }

        if msg_type.is_some_and(|t| t.is_response()) {
            if let Some(resp) = &msg.response {
                if let Some(rcode) = resp.rcode.and_then(|r| u16::try_from(r).ok()) {
                    record.rcode = rcode_name(rcode);
                }
                if let (Some((sec, usec)), Some(qsec)) = (time, resp.query_time_sec) {
                    let latency =
                        as_secs(sec, usec) - as_secs(qsec, resp.query_time_usec.unwrap_or(0));
                    if latency > 0.0 {
                        record.latency = latency;
                    }
                }
            }
        }

        record
    }
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

fn to_datetime(sec: u32, usec: u32) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(i64::from(sec), usec.saturating_mul(1000))
}

fn as_secs(sec: u32, usec: u32) -> f64 {
    f64::from(sec) + f64::from(usec) / 1_000_000.0
}
