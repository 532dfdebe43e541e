//! 변환 체인 설정
//!
//! [`TransformConfig`]는 core의 [`TransformsConfig`](dnspipe_core::config::TransformsConfig)에서
//! 파생되며, 연결 워커 간에 읽기 전용으로 공유됩니다 (`Arc<TransformConfig>`).
//!
//! # 사용 예시
//! ```ignore
//! use dnspipe_core::config::DnspipeConfig;
//! use dnspipe_transform::config::TransformConfig;
//!
//! let core_config = DnspipeConfig::default();
//! let config = TransformConfig::from_core(&core_config.transforms)?;
//! ```

use std::collections::HashSet;

use dnspipe_core::config::{NormalizeTransformConfig, SuspiciousTransformConfig, TransformsConfig};

use crate::error::TransformError;

/// 변환 체인 전체 설정
#[derive(Debug, Clone, Default)]
pub struct TransformConfig {
    /// 의심 트래픽 탐지
    pub suspicious: SuspiciousConfig,
    /// 도메인 정규화
    pub normalize: NormalizeConfig,
}

impl TransformConfig {
    /// core 설정에서 변환 체인 설정을 생성하고 검증합니다.
    pub fn from_core(core: &TransformsConfig) -> Result<Self, TransformError> {
        let config = Self {
            suspicious: SuspiciousConfig::from_core(&core.suspicious),
            normalize: NormalizeConfig::from_core(&core.normalize),
        };
        config.validate()?;
        Ok(config)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), TransformError> {
        self.suspicious.validate()
    }
}

/// 의심 트래픽 탐지 설정
///
/// 임계값이 0이면 해당 기준은 절대 일치하지 않습니다.
#[derive(Debug, Clone)]
pub struct SuspiciousConfig {
    /// 활성화 여부 (비활성화 시 블록은 붙지만 평가하지 않음)
    pub enabled: bool,
    /// 도메인 길이 임계값
    pub threshold_qname_len: usize,
    /// 패킷 길이 임계값
    pub threshold_packet_len: usize,
    /// 레이블 수 임계값
    pub threshold_max_labels: usize,
    /// 일반적인 레코드 타입 (대문자)
    pub common_qtypes: HashSet<String>,
}

impl Default for SuspiciousConfig {
    fn default() -> Self {
        Self::from_core(&SuspiciousTransformConfig::default())
    }
}

impl SuspiciousConfig {
    /// core의 `SuspiciousTransformConfig`에서 설정을 생성합니다.
    pub fn from_core(core: &SuspiciousTransformConfig) -> Self {
        Self {
            enabled: core.enabled,
            threshold_qname_len: core.threshold_qname_len,
            threshold_packet_len: core.threshold_packet_len,
            threshold_max_labels: core.threshold_max_labels,
            common_qtypes: core
                .common_qtypes
                .iter()
                .map(|q| q.trim().to_ascii_uppercase())
                .collect(),
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), TransformError> {
        if self.common_qtypes.iter().any(|q| q.is_empty()) {
            return Err(TransformError::Config {
                field: "suspicious.common_qtypes".to_owned(),
                reason: "must not contain empty entries".to_owned(),
            });
        }
        Ok(())
    }

    /// 레코드 타입이 일반적인 타입 목록에 있는지 확인합니다.
    pub fn is_common_qtype(&self, qtype: &str) -> bool {
        self.common_qtypes.contains(&qtype.to_ascii_uppercase())
    }
}

/// 의심 트래픽 탐지 설정 빌더
#[derive(Default)]
pub struct SuspiciousConfigBuilder {
    config: SuspiciousConfig,
}

impl SuspiciousConfigBuilder {
    /// 기본 설정으로 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 활성화 여부를 설정합니다.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// 도메인 길이 임계값을 설정합니다.
    pub fn threshold_qname_len(mut self, len: usize) -> Self {
        self.config.threshold_qname_len = len;
        self
    }

    /// 패킷 길이 임계값을 설정합니다.
    pub fn threshold_packet_len(mut self, len: usize) -> Self {
        self.config.threshold_packet_len = len;
        self
    }

    /// 레이블 수 임계값을 설정합니다.
    pub fn threshold_max_labels(mut self, labels: usize) -> Self {
        self.config.threshold_max_labels = labels;
        self
    }

    /// 일반 레코드 타입 목록을 설정합니다 (대문자로 저장).
    pub fn common_qtypes<I, S>(mut self, qtypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.common_qtypes = qtypes
            .into_iter()
            .map(|q| q.as_ref().trim().to_ascii_uppercase())
            .collect();
        self
    }

    /// 설정을 검증하고 반환합니다.
    pub fn build(self) -> Result<SuspiciousConfig, TransformError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// 도메인 정규화 설정
#[derive(Debug, Clone, Default)]
pub struct NormalizeConfig {
    /// qname 소문자 변환
    pub qname_lowercase: bool,
}

impl NormalizeConfig {
    /// core의 `NormalizeTransformConfig`에서 설정을 생성합니다.
    pub fn from_core(core: &NormalizeTransformConfig) -> Self {
        Self {
            qname_lowercase: core.qname_lowercase,
        }
    }
}
