//! 변환기 에러 타입
//!
//! 평가 단계는 에러를 만들지 않습니다. 에러는 설정 검증에서만 발생합니다.

use dnspipe_core::error::{ConfigError, DnspipeError};

/// 변환기 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl From<TransformError> for DnspipeError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::Config { field, reason } => {
                DnspipeError::Config(ConfigError::InvalidValue { field, reason })
            }
        }
    }
}
