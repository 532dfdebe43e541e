//! 파이프라인 trait — 모듈 확장 포인트 정의
//!
//! - [`HealthStatus`]: 모듈 건강 상태
//! - [`Transformer`]: 레코드 보강/필터링 단계
//! - [`BoxFuture`]: dyn-compatible trait에서 사용하는 boxed future

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// `Send` boxed future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 모듈 건강 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// 정상 동작
    Healthy,
    /// 동작 중이나 일부 기능 저하
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 동작 불가 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 변환 단계 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformOutcome {
    /// 다음 단계로 계속 전달
    Keep,
    /// 레코드를 버림 (필터링 단계 전용)
    Drop,
}

/// 레코드 변환 단계 trait
///
/// 연결마다 새 인스턴스가 생성되므로 `&mut self`로 연결 단위 상태를 가질 수 있습니다.
///
/// 체인은 모든 단계의 [`init_record`](Self::init_record)를 먼저 호출한 뒤
/// [`process`](Self::process)를 순서대로 호출합니다.
pub trait Transformer: Send {
    /// 단계 이름 (결과 블록 키로도 사용)
    fn name(&self) -> &str;

    /// 레코드에 이 단계의 빈 결과 블록을 붙입니다.
    fn init_record(&mut self, _record: &mut Record) {}

    /// 레코드를 검사하고 보강합니다.
    fn process(&mut self, record: &mut Record) -> TransformOutcome;
}
