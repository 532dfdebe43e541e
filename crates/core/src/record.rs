//! DNS 트랜잭션 레코드 — 파이프라인을 흐르는 기본 데이터 단위
//!
//! [`Record`]는 수집기의 디코더가 생성하고, 변환 체인이 제자리에서 보강한 뒤,
//! 싱크마다 한 벌씩 복제되어 전달됩니다.
//!
//! 변환기 결과는 `transforms` 맵에 변환기 이름을 키로 저장됩니다.
//! JSON 직렬화 시 각 결과 블록은 최상위 키(예: `"suspicious"`)로 펼쳐집니다.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// 의심 트래픽 탐지 결과 블록의 변환기 이름
pub const TRANSFORM_SUSPICIOUS: &str = "suspicious";

/// 값이 없는 필드의 텍스트 표기
const UNKNOWN: &str = "-";

/// 관측된 DNS 트랜잭션 한 건
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    /// 레코드 생성 시각 (디코더 기준)
    pub timestamp: DateTime<Utc>,
    /// 레코드를 생성한 수집기 이름
    pub collector: String,
    /// 프로듀서(DNS 서버) 연결 주소
    pub peer: String,
    /// DNS 서버 식별자
    pub identity: String,
    /// 메시지 종류 (CLIENT_QUERY, CLIENT_RESPONSE, ...)
    pub operation: String,
    /// 응답 코드 (NOERROR, NXDOMAIN, ...)
    pub rcode: String,
    /// 질의 클라이언트 주소
    pub query_ip: Option<IpAddr>,
    /// 질의 클라이언트 포트
    pub query_port: Option<u16>,
    /// 응답 서버 주소
    pub response_ip: Option<IpAddr>,
    /// 응답 서버 포트
    pub response_port: Option<u16>,
    /// 주소 체계 (INET, INET6)
    pub family: String,
    /// 전송 프로토콜 (UDP, TCP, ...)
    pub protocol: String,
    /// DNS 패킷 길이 (바이트)
    pub length: usize,
    /// 질의 도메인 (끝의 점 제외)
    pub qname: String,
    /// 질의 레코드 타입 (A, AAAA, ...)
    pub qtype: String,
    /// 디코더가 DNS 메시지 파싱에 실패했는지 여부
    pub malformed: bool,
    /// 질의-응답 지연 (초)
    pub latency: f64,
    /// 변환기 이름 -> 변환기 결과 블록
    #[serde(flatten)]
    pub transforms: BTreeMap<String, TransformResult>,
}

impl Record {
    /// 빈 레코드를 생성합니다.
    pub fn new(collector: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            collector: collector.into(),
            peer: UNKNOWN.to_owned(),
            identity: UNKNOWN.to_owned(),
            operation: UNKNOWN.to_owned(),
            rcode: UNKNOWN.to_owned(),
            query_ip: None,
            query_port: None,
            response_ip: None,
            response_port: None,
            family: UNKNOWN.to_owned(),
            protocol: UNKNOWN.to_owned(),
            length: 0,
            qname: String::new(),
            qtype: String::new(),
            malformed: false,
            latency: 0.0,
            transforms: BTreeMap::new(),
        }
    }

    /// 디코딩에 실패한 페이로드에 대한 레코드를 생성합니다.
    ///
    /// 트래픽 가시성을 유지하기 위해 레코드는 버려지지 않고
    /// `malformed` 플래그와 함께 하위로 전달됩니다.
    pub fn malformed(collector: impl Into<String>, length: usize) -> Self {
        let mut record = Self::new(collector);
        record.length = length;
        record.malformed = true;
        record
    }

    /// 변환기 결과 블록을 설정합니다. 같은 이름의 기존 블록은 교체됩니다.
    pub fn set_transform(&mut self, name: impl Into<String>, result: TransformResult) {
        self.transforms.insert(name.into(), result);
    }

    /// 의심 트래픽 탐지 결과를 반환합니다.
    pub fn suspicious(&self) -> Option<&SuspiciousBlock> {
        match self.transforms.get(TRANSFORM_SUSPICIOUS) {
            Some(TransformResult::Suspicious(block)) => Some(block),
            _ => None,
        }
    }

    /// 의심 트래픽 탐지 결과를 가변 참조로 반환합니다.
    pub fn suspicious_mut(&mut self) -> Option<&mut SuspiciousBlock> {
        match self.transforms.get_mut(TRANSFORM_SUSPICIOUS) {
            Some(TransformResult::Suspicious(block)) => Some(block),
            _ => None,
        }
    }

    /// 도메인의 레이블 수를 반환합니다. 빈 도메인은 0입니다.
    pub fn label_count(&self) -> usize {
        let name = self.qname.trim_end_matches('.');
        if name.is_empty() {
            0
        } else {
            name.split('.').count()
        }
    }

    /// 레코드를 JSON 한 줄로 직렬화합니다.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// 사람이 읽기 쉬운 한 줄 텍스트 형식으로 변환합니다.
    ///
    /// `timestamp identity operation rcode query_ip query_port family protocol length qname qtype latency`
    pub fn to_text_line(&self) -> String {
        format!(
            "{} {} {} {} {} {} {} {} {}b {} {} {:.6}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.identity,
            self.operation,
            self.rcode,
            opt_str(self.query_ip),
            opt_str(self.query_port),
            self.family,
            self.protocol,
            self.length,
            or_unknown(&self.qname),
            or_unknown(&self.qtype),
            self.latency,
        )
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text_line())
    }
}

fn opt_str<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| UNKNOWN.to_owned(), |v| v.to_string())
}

fn or_unknown(value: &str) -> &str {
    if value.is_empty() { UNKNOWN } else { value }
}

/// 변환기별 결과 블록
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TransformResult {
    /// 의심 트래픽 탐지 결과
    Suspicious(SuspiciousBlock),
}

/// 의심 트래픽 휴리스틱 플래그
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuspiciousFlag {
    /// 디코더가 표시한 손상 패킷
    MalformedPacket,
    /// 패킷 길이 임계값 초과
    LargePacket,
    /// 도메인 길이 임계값 초과
    LongDomain,
    /// 응답 지연 기반 (예약됨)
    SlowDomain,
    /// 허용되지 않은 문자 포함
    UnallowedChars,
    /// 일반적이지 않은 레코드 타입
    UncommonQtype,
    /// 레이블 수 임계값 초과
    ExcessiveLabels,
}

impl SuspiciousFlag {
    /// 모든 플래그 목록
    pub const ALL: [SuspiciousFlag; 7] = [
        Self::MalformedPacket,
        Self::LargePacket,
        Self::LongDomain,
        Self::SlowDomain,
        Self::UnallowedChars,
        Self::UncommonQtype,
        Self::ExcessiveLabels,
    ];

    /// 직렬화 키와 같은 플래그 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedPacket => "malformed-pkt",
            Self::LargePacket => "large-pkt",
            Self::LongDomain => "long-domain",
            Self::SlowDomain => "slow-domain",
            Self::UnallowedChars => "unallowed-chars",
            Self::UncommonQtype => "uncommon-qtypes",
            Self::ExcessiveLabels => "excessive-number-labels",
        }
    }
}

impl fmt::Display for SuspiciousFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 의심 트래픽 탐지 결과 블록
///
/// 점수는 항상 설정된 플래그 수와 같습니다. 필드는 비공개이며
/// 유일한 변경 경로인 [`flag`](Self::flag)가 이 불변식을 유지합니다.
/// 플래그는 레코드당 한 번만 설정되고 다시 해제되지 않습니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SuspiciousBlock {
    score: f64,
    #[serde(rename = "malformed-pkt")]
    malformed_packet: bool,
    #[serde(rename = "large-pkt")]
    large_packet: bool,
    #[serde(rename = "long-domain")]
    long_domain: bool,
    #[serde(rename = "slow-domain")]
    slow_domain: bool,
    #[serde(rename = "unallowed-chars")]
    unallowed_chars: bool,
    #[serde(rename = "uncommon-qtypes")]
    uncommon_qtype: bool,
    #[serde(rename = "excessive-number-labels")]
    excessive_labels: bool,
}

impl SuspiciousBlock {
    /// 점수 0, 모든 플래그가 해제된 블록을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 플래그를 설정하고 점수를 1 올립니다.
    ///
    /// 이미 설정된 플래그면 아무것도 바꾸지 않고 `false`를 반환합니다.
    pub fn flag(&mut self, flag: SuspiciousFlag) -> bool {
        let slot = self.slot_mut(flag);
        if *slot {
            return false;
        }
        *slot = true;
        self.score += 1.0;
        true
    }

    /// 플래그 설정 여부를 반환합니다.
    pub fn is_set(&self, flag: SuspiciousFlag) -> bool {
        match flag {
            SuspiciousFlag::MalformedPacket => self.malformed_packet,
            SuspiciousFlag::LargePacket => self.large_packet,
            SuspiciousFlag::LongDomain => self.long_domain,
            SuspiciousFlag::SlowDomain => self.slow_domain,
            SuspiciousFlag::UnallowedChars => self.unallowed_chars,
            SuspiciousFlag::UncommonQtype => self.uncommon_qtype,
            SuspiciousFlag::ExcessiveLabels => self.excessive_labels,
        }
    }

    /// 의심 점수
    pub fn score(&self) -> f64 {
        self.score
    }

    /// 설정된 플래그 목록
    pub fn flags(&self) -> Vec<SuspiciousFlag> {
        SuspiciousFlag::ALL
            .into_iter()
            .filter(|f| self.is_set(*f))
            .collect()
    }

    fn slot_mut(&mut self, flag: SuspiciousFlag) -> &mut bool {
        match flag {
            SuspiciousFlag::MalformedPacket => &mut self.malformed_packet,
            SuspiciousFlag::LargePacket => &mut self.large_packet,
            SuspiciousFlag::LongDomain => &mut self.long_domain,
            SuspiciousFlag::SlowDomain => &mut self.slow_domain,
            SuspiciousFlag::UnallowedChars => &mut self.unallowed_chars,
            SuspiciousFlag::UncommonQtype => &mut self.uncommon_qtype,
            SuspiciousFlag::ExcessiveLabels => &mut self.excessive_labels,
        }
    }
}
