//! 변환 체인 — 순서가 있는 변환 단계 목록
//!
//! 연결마다 [`TransformerChain::from_config`]로 새 인스턴스를 만들며,
//! 체인 인스턴스는 연결 사이에 공유되지 않습니다.
//!
//! # 처리 순서
//! 1. 모든 단계의 `init_record` 호출 (결과 블록 초기화)
//! 2. 단계 순서대로 `process` 호출, `Drop`이 나오면 즉시 중단

use dnspipe_core::metrics as m;
use dnspipe_core::pipeline::{TransformOutcome, Transformer};
use dnspipe_core::record::Record;

use crate::config::TransformConfig;
use crate::normalize::QnameLowercase;
use crate::suspicious::SuspiciousDetector;

/// 변환 단계 목록
#[derive(Default)]
pub struct TransformerChain {
    stages: Vec<Box<dyn Transformer>>,
}

impl TransformerChain {
    /// 빈 체인을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 설정에서 체인을 구성합니다.
    ///
    /// 단계 순서: `qname-lowercase` (활성화 시) → `suspicious` (항상 포함)
    pub fn from_config(config: &TransformConfig) -> Self {
        let mut chain = Self::new();
        if config.normalize.qname_lowercase {
            chain.push(QnameLowercase);
        }
        chain.push(SuspiciousDetector::new(config.suspicious.clone()));
        chain
    }

    /// 체인 끝에 단계를 추가합니다.
    pub fn push(&mut self, stage: impl Transformer + 'static) {
        self.stages.push(Box::new(stage));
    }

    /// 단계 이름 목록 (실행 순서)
    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// 단계 수
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// 단계가 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// 레코드를 체인에 통과시킵니다.
    pub fn process(&mut self, record: &mut Record) -> TransformOutcome {
        for stage in &mut self.stages {
            stage.init_record(record);
        }

        for stage in &mut self.stages {
            if stage.process(record) == TransformOutcome::Drop {
                tracing::trace!(stage = stage.name(), qname = %record.qname, "record dropped");
                metrics::counter!(m::TRANSFORM_DROPPED_TOTAL).increment(1);
                return TransformOutcome::Drop;
            }
        }
        TransformOutcome::Keep
    }
}
