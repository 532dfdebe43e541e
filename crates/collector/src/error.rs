//! 수집기 에러 타입
//!
//! - [`CollectorError`]: 수집기 전체의 동작을 막는 에러 (설정, 바인드, TLS 자료, 소켓 설정)
//! - [`FramerError`]: 연결 하나에 국한된 전송 에러. 해당 연결만 종료됩니다.
//!
//! `From<CollectorError> for DnspipeError` 변환이 구현되어 있어
//! 데몬에서 `?` 연산자로 전파할 수 있습니다.

use std::time::Duration;

use dnspipe_core::error::{ConfigError, DnspipeError, PipelineError};

/// 수집기 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// 설정 에러 (소켓을 열기 전에 반환)
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 리스너 바인드 실패
    #[error("failed to bind {addr}: {reason}")]
    Bind {
        /// 바인드 주소
        addr: String,
        /// 실패 사유
        reason: String,
    },

    /// TLS 자료 로딩 또는 서버 설정 실패
    #[error("tls error: {0}")]
    Tls(String),

    /// 소켓 옵션 설정 실패
    #[error("socket option {option} failed: {reason}")]
    Socket {
        /// 옵션 이름 (SO_RCVBUF, SO_LINGER)
        option: &'static str,
        /// 실패 사유
        reason: String,
    },

    /// 이미 실행 중
    #[error("collector '{0}' is already running")]
    AlreadyRunning(String),
}

impl From<CollectorError> for DnspipeError {
    fn from(err: CollectorError) -> Self {
        match err {
            CollectorError::Config { field, reason } => {
                DnspipeError::Config(ConfigError::InvalidValue { field, reason })
            }
            CollectorError::AlreadyRunning(_) => {
                DnspipeError::Pipeline(PipelineError::AlreadyRunning)
            }
            other => DnspipeError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}

/// 연결 단위 전송 에러
///
/// 재시도하지 않습니다. 재연결은 프로듀서의 책임입니다.
#[derive(Debug, thiserror::Error)]
pub enum FramerError {
    /// 읽기 유휴 타임아웃
    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    /// 프레임 중간에서 스트림 종료
    #[error("unexpected eof: expected {expected} bytes, received {received}")]
    UnexpectedEof {
        /// 기대한 바이트 수
        expected: usize,
        /// 실제 수신한 바이트 수
        received: usize,
    },

    /// 허용되지 않는 길이 접두어 (0 또는 최대 크기 초과)
    #[error("invalid frame length {len} (max {max})")]
    InvalidLength {
        /// 접두어에 기록된 길이
        len: usize,
        /// 허용 최대 길이
        max: usize,
    },

    /// TLS 핸드셰이크 실패
    #[error("tls handshake failed: {0}")]
    Handshake(String),

    /// 소켓 I/O 에러 (reset 등)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FramerError {
    /// 메트릭 `reason` 레이블 값
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::UnexpectedEof { .. } => "eof",
            Self::InvalidLength { .. } => "frame",
            Self::Handshake(_) => "tls",
            Self::Io(_) => "io",
        }
    }
}
