//! 데몬 모듈 생명주기 — 싱크와 수집기를 한 레지스트리에서 구동
//!
//! 수집기는 레코드를 만들고 싱크는 소비합니다. 정지 시 생산자가 먼저 멈춰야
//! 싱크가 남은 레코드를 모두 쓸 수 있으므로, [`PluginRegistry`]는 등록 순서를
//! 강제합니다: 모든 싱크가 수집기보다 먼저 등록되고, 정지는 역순입니다.
//!
//! ```text
//! register(sink..) → register(collector..) → init_all → start_all
//!                                                          │
//!                    stop_all: collector.. → sink.. ◄──────┘
//! ```

use std::fmt;
use std::future::Future;

use serde::Serialize;

use crate::error::{DnspipeError, PluginError};
use crate::pipeline::{BoxFuture, HealthStatus};

/// 모듈 종류
///
/// 정렬 순서가 곧 등록 순서입니다 (`Sink < Collector`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    /// 레코드 소비자
    Sink,
    /// 레코드 생산자
    Collector,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sink => "sink",
            Self::Collector => "collector",
        })
    }
}

/// 모듈 식별 정보
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    /// 설정의 `name` (예: `"pdns"`, `"console"`)
    pub name: String,
    /// 모듈 종류
    pub kind: PluginKind,
    /// 로그용 설명 (예: `"powerdns collector"`)
    pub description: String,
}

impl PluginInfo {
    /// 수집기 정보
    pub fn collector(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PluginKind::Collector,
            description: description.into(),
        }
    }

    /// 싱크 정보
    pub fn sink(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PluginKind::Sink,
            description: description.into(),
        }
    }
}

/// 모듈 생명주기 상태
///
/// `Failed`는 실행 중 복구할 수 없게 된 모듈입니다 (예: accept 루프 종료).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    Created,
    Initialized,
    Running,
    Stopped,
    Failed,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        })
    }
}

/// 데몬이 구동하는 모듈
///
/// 수집기는 `init`에서 리스너를 바인드하고 `start`에서 accept 루프를 띄웁니다.
/// 싱크는 `start`에서 쓰기 태스크를 띄우고 `stop`에서 채널을 비울 때까지 기다립니다.
/// `stop`은 어느 상태에서든 여러 번 호출할 수 있어야 합니다.
pub trait Plugin: Send + Sync {
    fn info(&self) -> &PluginInfo;

    fn state(&self) -> PluginState;

    fn init(&mut self) -> impl Future<Output = Result<(), DnspipeError>> + Send;

    fn start(&mut self) -> impl Future<Output = Result<(), DnspipeError>> + Send;

    fn stop(&mut self) -> impl Future<Output = Result<(), DnspipeError>> + Send;

    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// 레지스트리 보관용 객체 안전 버전 ([`Plugin`] 구현체에 자동 구현)
pub trait DynPlugin: Send + Sync {
    fn info(&self) -> &PluginInfo;
    fn state(&self) -> PluginState;
    fn init(&mut self) -> BoxFuture<'_, Result<(), DnspipeError>>;
    fn start(&mut self) -> BoxFuture<'_, Result<(), DnspipeError>>;
    fn stop(&mut self) -> BoxFuture<'_, Result<(), DnspipeError>>;
    fn health_check(&self) -> BoxFuture<'_, HealthStatus>;
}

impl<T: Plugin> DynPlugin for T {
    fn info(&self) -> &PluginInfo {
        Plugin::info(self)
    }

    fn state(&self) -> PluginState {
        Plugin::state(self)
    }

    fn init(&mut self) -> BoxFuture<'_, Result<(), DnspipeError>> {
        Box::pin(Plugin::init(self))
    }

    fn start(&mut self) -> BoxFuture<'_, Result<(), DnspipeError>> {
        Box::pin(Plugin::start(self))
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), DnspipeError>> {
        Box::pin(Plugin::stop(self))
    }

    fn health_check(&self) -> BoxFuture<'_, HealthStatus> {
        Box::pin(Plugin::health_check(self))
    }
}

/// 한 모듈의 상태 스냅샷
#[derive(Debug, Clone, Serialize)]
pub struct PluginStatus {
    pub name: String,
    pub kind: PluginKind,
    pub state: PluginState,
    pub health: HealthStatus,
}

/// 싱크 → 수집기 순서로 모듈을 보관하는 레지스트리
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn DynPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 모듈을 등록합니다.
    ///
    /// 이름이 겹치거나, 수집기 뒤에 싱크를 등록하면 에러를 반환합니다.
    pub fn register(&mut self, plugin: Box<dyn DynPlugin>) -> Result<(), DnspipeError> {
        let info = plugin.info();
        if self.plugins.iter().any(|p| p.info().name == info.name) {
            return Err(PluginError::AlreadyRegistered {
                name: info.name.clone(),
            }
            .into());
        }
        if let Some(last) = self.plugins.last() {
            if last.info().kind > info.kind {
                return Err(PluginError::OutOfOrder {
                    name: info.name.clone(),
                    kind: info.kind,
                    after: last.info().kind,
                }
                .into());
            }
        }

        tracing::debug!(plugin = %info.name, kind = %info.kind, "plugin registered");
        self.plugins.push(plugin);
        Ok(())
    }

    /// 등록 순서대로 초기화합니다. 첫 실패에서 멈춥니다.
    ///
    /// 이미 바인드된 리스너는 호출자가 [`stop_all`](Self::stop_all)로 정리해야 합니다.
    pub async fn init_all(&mut self) -> Result<(), DnspipeError> {
        for plugin in &mut self.plugins {
            let (name, kind) = (plugin.info().name.clone(), plugin.info().kind);
            plugin.init().await.inspect_err(|e| {
                tracing::error!(plugin = %name, kind = %kind, error = %e, "plugin init failed");
            })?;
        }
        Ok(())
    }

    /// 등록 순서대로 시작합니다. 싱크가 먼저 소비를 시작한 뒤 수집기가 연결을 받습니다.
    pub async fn start_all(&mut self) -> Result<(), DnspipeError> {
        for plugin in &mut self.plugins {
            let (name, kind) = (plugin.info().name.clone(), plugin.info().kind);
            plugin.start().await.inspect_err(|e| {
                tracing::error!(plugin = %name, kind = %kind, error = %e, "plugin start failed");
            })?;
            tracing::debug!(plugin = %name, kind = %kind, "plugin started");
        }
        Ok(())
    }

    /// 역순으로 정지합니다. 수집기가 모두 멈춘 뒤 싱크가 드레인합니다.
    ///
    /// 실패한 모듈이 있어도 나머지를 계속 정지하고, 실패를 하나의 에러로 모읍니다.
    pub async fn stop_all(&mut self) -> Result<(), DnspipeError> {
        let mut failures = Vec::new();
        for plugin in self.plugins.iter_mut().rev() {
            let name = plugin.info().name.clone();
            match plugin.stop().await {
                Ok(()) => tracing::debug!(plugin = %name, "plugin stopped"),
                Err(e) => {
                    tracing::warn!(plugin = %name, error = %e, "plugin stop failed");
                    failures.push(format!("{name}: {e}"));
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(PluginError::StopFailed(failures.join("; ")).into())
        }
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// 등록(시작) 순서의 모듈 이름
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.info().name.as_str()).collect()
    }

    /// 모든 모듈의 상태와 건강 상태를 등록 순서로 수집합니다.
    pub async fn snapshot(&self) -> Vec<PluginStatus> {
        let mut statuses = Vec::with_capacity(self.plugins.len());
        for plugin in &self.plugins {
            let info = plugin.info();
            statuses.push(PluginStatus {
                name: info.name.clone(),
                kind: info.kind,
                state: plugin.state(),
                health: plugin.health_check().await,
            });
        }
        statuses
    }
}
