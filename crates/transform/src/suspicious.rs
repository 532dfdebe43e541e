//! 의심 트래픽 탐지 — 다중 휴리스틱 점수 계산
//!
//! 각 기준은 서로 독립적으로 평가되며, 일치하는 기준마다 플래그 하나가 설정되고
//! 점수가 1 오릅니다. 블록의 불변식(점수 = 설정된 플래그 수)은
//! [`SuspiciousBlock::flag`]가 보장합니다.
//!
//! | 플래그 | 조건 |
//! |---|---|
//! | `malformed-pkt` | 디코더가 손상으로 표시 |
//! | `large-pkt` | `length >= threshold_packet_len` |
//! | `long-domain` | `qname.len() >= threshold_qname_len` |
//! | `uncommon-qtypes` | 비어 있지 않은 qtype이 일반 타입 목록에 없음 |
//! | `excessive-number-labels` | 레이블 수 `>= threshold_max_labels` |
//! | `unallowed-chars` | qname에 영문자, 숫자, `-`, `.` 외의 문자 |
//! | `slow-domain` | 예약됨 (평가하지 않음) |

use dnspipe_core::metrics as m;
use dnspipe_core::pipeline::{TransformOutcome, Transformer};
use dnspipe_core::record::{
    Record, SuspiciousBlock, SuspiciousFlag, TRANSFORM_SUSPICIOUS, TransformResult,
};

use crate::config::SuspiciousConfig;

/// 의심 트래픽 탐지 단계
pub struct SuspiciousDetector {
    config: SuspiciousConfig,
}

impl SuspiciousDetector {
    /// 새 탐지기를 생성합니다.
    pub fn new(config: SuspiciousConfig) -> Self {
        Self { config }
    }

    /// 활성화 여부
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// 레코드를 평가하여 블록에 플래그를 설정합니다.
    ///
    /// 비활성화 상태이거나 블록이 없으면 아무것도 하지 않습니다.
    pub fn evaluate(&self, record: &mut Record) {
        if !self.config.enabled {
            return;
        }

        let triggered = self.triggered_flags(record);
        let score = {
            let Some(block) = record.suspicious_mut() else {
                return;
            };
            for flag in triggered {
                block.flag(flag);
            }
            block.score()
        };

        if score > 0.0 {
            tracing::debug!(
                qname = %record.qname,
                qtype = %record.qtype,
                score,
                "suspicious record"
            );
            metrics::counter!(m::TRANSFORM_SUSPICIOUS_TOTAL).increment(1);
        }
    }

    fn triggered_flags(&self, record: &Record) -> Vec<SuspiciousFlag> {
        let cfg = &self.config;
        let mut flags = Vec::new();

        if record.malformed {
            flags.push(SuspiciousFlag::MalformedPacket);
        }
        if reaches(record.length, cfg.threshold_packet_len) {
            flags.push(SuspiciousFlag::LargePacket);
        }
        if reaches(record.qname.len(), cfg.threshold_qname_len) {
            flags.push(SuspiciousFlag::LongDomain);
        }
        if !record.qtype.is_empty() && !cfg.is_common_qtype(&record.qtype) {
            flags.push(SuspiciousFlag::UncommonQtype);
        }
        if reaches(record.label_count(), cfg.threshold_max_labels) {
            flags.push(SuspiciousFlag::ExcessiveLabels);
        }
        if has_unallowed_chars(&record.qname) {
            flags.push(SuspiciousFlag::UnallowedChars);
        }

        flags
    }
}

impl Transformer for SuspiciousDetector {
    fn name(&self) -> &str {
        TRANSFORM_SUSPICIOUS
    }

    fn init_record(&mut self, record: &mut Record) {
        record.set_transform(
            TRANSFORM_SUSPICIOUS,
            TransformResult::Suspicious(SuspiciousBlock::new()),
        );
    }

    fn process(&mut self, record: &mut Record) -> TransformOutcome {
        self.evaluate(record);
        TransformOutcome::Keep
    }
}

/// 0 임계값은 절대 일치하지 않음
fn reaches(value: usize, threshold: usize) -> bool {
    threshold > 0 && value >= threshold
}

fn has_unallowed_chars(qname: &str) -> bool {
    qname
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '.'))
}
