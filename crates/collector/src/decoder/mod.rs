//! 페이로드 디코더
//!
//! 프레임 하나의 페이로드를 [`Record`] 하나로 변환합니다.
//! 디코딩 실패는 스트림을 중단시키지 않습니다. 디코더는 `malformed = true`인
//! 레코드를 반환하고 프레이머는 다음 프레임을 계속 읽습니다.

pub mod dns_wire;
pub mod powerdns;

use std::net::SocketAddr;

use hickory_proto::rr::RecordType;

use dnspipe_core::record::Record;

use crate::config::CollectorMode;

pub use dns_wire::DnsWireDecoder;
pub use powerdns::PowerDnsDecoder;

/// 디코딩 시 레코드에 채워 넣을 연결 정보
#[derive(Debug, Clone)]
pub struct DecodeContext {
    /// 수집기 이름
    pub collector: String,
    /// 프로듀서 주소
    pub peer: SocketAddr,
}

impl DecodeContext {
    pub fn new(collector: impl Into<String>, peer: SocketAddr) -> Self {
        Self {
            collector: collector.into(),
            peer,
        }
    }

    /// 수집기/피어 필드가 채워진 빈 레코드
    pub fn record(&self) -> Record {
        let mut record = Record::new(self.collector.clone());
        record.peer = self.peer.to_string();
        record
    }

    /// 디코딩에 실패한 페이로드용 레코드
    pub fn malformed(&self, length: usize) -> Record {
        let mut record = Record::malformed(self.collector.clone(), length);
        record.peer = self.peer.to_string();
        record
    }
}

/// 페이로드 디코더 trait
pub trait PayloadDecoder: Send + Sync {
    /// 디코더 이름
    fn name(&self) -> &'static str;

    /// 페이로드를 레코드로 변환합니다. 실패하지 않습니다.
    fn decode(&self, payload: &[u8], ctx: &DecodeContext) -> Record;
}

/// 수집기 모드에 맞는 디코더를 생성합니다.
pub fn for_mode(mode: CollectorMode) -> Box<dyn PayloadDecoder> {
    match mode {
        CollectorMode::PowerDns => Box::new(PowerDnsDecoder),
        CollectorMode::DnsWire => Box::new(DnsWireDecoder),
    }
}

/// 응답 코드 이름 (RFC 1035, RFC 2136)
pub fn rcode_name(code: u16) -> String {
    let name = match code {
        0 => "NOERROR",
        1 => "FORMERR",
        2 => "SERVFAIL",
        3 => "NXDOMAIN",
        4 => "NOTIMP",
        5 => "REFUSED",
        6 => "YXDOMAIN",
        7 => "YXRRSET",
        8 => "NXRRSET",
        9 => "NOTAUTH",
        10 => "NOTZONE",
        other => return format!("RCODE{other}"),
    };
    name.to_owned()
}

/// 레코드 타입 니모닉. 알 수 없는 타입은 `TYPE{n}` (RFC 3597)
pub fn qtype_name(code: u16) -> String {
    match RecordType::from(code) {
        RecordType::Unknown(n) => format!("TYPE{n}"),
        known => known.to_string(),
    }
}

/// 도메인 이름 문자열에서 끝의 점을 제거합니다.
pub(crate) fn trim_fqdn(name: &str) -> String {
    name.strip_suffix('.').unwrap_or(name).to_owned()
}
