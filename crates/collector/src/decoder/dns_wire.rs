//! DNS wire 형식 디코더
//!
//! RFC 1035 TCP 프레이밍(2바이트 길이 접두어) 위의 원시 DNS 메시지를 파싱합니다.
//! 첫 번째 질의가 qname/qtype을, 헤더가 operation/rcode를 결정합니다.

use hickory_proto::op::{Message, MessageType};

use dnspipe_core::record::Record;

use super::{DecodeContext, PayloadDecoder, qtype_name, rcode_name, trim_fqdn};

/// DNS wire 형식 디코더
#[derive(Debug, Default, Clone, Copy)]
pub struct DnsWireDecoder;

impl PayloadDecoder for DnsWireDecoder {
    fn name(&self) -> &'static str {
        "dns"
    }

    fn decode(&self, payload: &[u8], ctx: &DecodeContext) -> Record {
        let msg = match Message::from_vec(payload) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::trace!(peer = %ctx.peer, error = %e, "dns message parse failed");
                return ctx.malformed(payload.len());
            }
        };

        let mut record = ctx.record();
        record.length = payload.len();
        record.protocol = "TCP".to_owned();
        record.family = if ctx.peer.is_ipv4() { "INET" } else { "INET6" }.to_owned();

        match msg.message_type() {
            MessageType::Query => {
                record.operation = "CLIENT_QUERY".to_owned();
                record.query_ip = Some(ctx.peer.ip());
                record.query_port = Some(ctx.peer.port());
            }
            MessageType::Response => {
                record.operation = "CLIENT_RESPONSE".to_owned();
                record.rcode = rcode_name(u16::from(msg.response_code()));
                record.response_ip = Some(ctx.peer.ip());
                record.response_port = Some(ctx.peer.port());
            }
        }

        if let Some(query) = msg.queries().first() {
            record.qname = trim_fqdn(&query.name().to_utf8());
            record.qtype = qtype_name(u16::from(query.query_type()));
        }

        record
    }
}
