//! DNS 수집기 — 리스너, accept 루프, 연결 추적, 종료 프로토콜
//!
//! # 상태 전이
//! ```text
//! Idle ──listen()──> Listening ──run()──> Running ──stop()──> Stopping ──> Stopped
//!   └──────────────────run()──────────────────┘
//! ```
//!
//! # 종료 순서
//! 1. 추적 중인 모든 연결 취소
//! 2. 리스너 닫기 (accept 루프 취소)
//! 3. accept 루프의 완료 신호 대기
//! 4. 그 사이 등록된 연결 취소
//! 5. 모든 워커가 소켓을 닫을 때까지 대기
//!
//! 처리 태스크에 남은 레코드는 기다리지 않습니다.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use dnspipe_core::config::CollectorInstanceConfig;
use dnspipe_core::error::DnspipeError;
use dnspipe_core::metrics as m;
use dnspipe_core::pipeline::HealthStatus;
use dnspipe_core::plugin::{Plugin, PluginInfo, PluginKind, PluginState};
use dnspipe_core::sink::SinkRegistry;
use dnspipe_transform::TransformConfig;

use crate::config::CollectorConfig;
use crate::connection::ConnectionWorker;
use crate::error::CollectorError;
use crate::{socket, tls};

/// 수집기 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    /// 생성됨
    Idle,
    /// 리스너 바인드 완료
    Listening,
    /// accept 루프 실행 중
    Running,
    /// 종료 진행 중
    Stopping,
    /// 종료됨
    Stopped,
}

impl fmt::Display for CollectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Listening => write!(f, "listening"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// 종료 시 강제로 닫기 위한 연결 핸들 (소켓은 워커가 소유)
struct TrackedConnection {
    peer: SocketAddr,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

type Connections = Arc<Mutex<Vec<TrackedConnection>>>;

/// 길이 접두어 스트림 수집기
pub struct DnsCollector {
    info: PluginInfo,
    config: Arc<CollectorConfig>,
    transforms: Arc<TransformConfig>,
    sinks: SinkRegistry,
    state: CollectorState,
    listener: Option<TcpListener>,
    acceptor: Option<TlsAcceptor>,
    local_addr: Option<SocketAddr>,
    cancel: CancellationToken,
    connections: Connections,
    accept_task: Option<JoinHandle<()>>,
    done_rx: Option<oneshot::Receiver<()>>,
    loop_exited: Arc<AtomicBool>,
}

impl DnsCollector {
    /// core 설정에서 수집기를 생성합니다.
    pub fn from_core(
        core: &CollectorInstanceConfig,
        transforms: Arc<TransformConfig>,
        sinks: SinkRegistry,
    ) -> Result<Self, CollectorError> {
        DnsCollectorBuilder::new()
            .config(CollectorConfig::from_core(core)?)
            .transforms(transforms)
            .sinks(sinks)
            .build()
    }

    /// 현재 상태
    pub fn collector_state(&self) -> CollectorState {
        self.state
    }

    /// 수집기 설정
    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// 바인드된 주소 (`listen()` 이후)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// 추적 중인 연결 수 (종료된 연결 제외)
    pub async fn active_connections(&self) -> usize {
        self.connections
            .lock()
            .await
            .iter()
            .filter(|c| !c.handle.is_finished())
            .count()
    }

    /// 리스너를 바인드합니다.
    ///
    /// TLS 수집기는 인증서와 키를 먼저 읽으며, 실패하면 소켓을 열지 않습니다.
    pub async fn listen(&mut self) -> Result<(), CollectorError> {
        match self.state {
            CollectorState::Idle => {}
            CollectorState::Listening => return Ok(()),
            CollectorState::Running => {
                return Err(CollectorError::AlreadyRunning(self.config.name.clone()));
            }
            CollectorState::Stopping | CollectorState::Stopped => {
                return Err(CollectorError::Config {
                    field: "state".to_owned(),
                    reason: format!("cannot listen from state {}", self.state),
                });
            }
        }

        let addr = self.config.listen_addr()?;
        let acceptor = self.config.tls.as_ref().map(tls::load_acceptor).transpose()?;

        let listener = TcpListener::bind(addr).await.map_err(|e| CollectorError::Bind {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;
        let local_addr = listener.local_addr().map_err(|e| CollectorError::Bind {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;

        tracing::info!(
            collector = %self.config.name,
            mode = %self.config.mode,
            addr = %local_addr,
            tls = acceptor.is_some(),
            "collector listening"
        );

        self.listener = Some(listener);
        self.acceptor = acceptor;
        self.local_addr = Some(local_addr);
        self.state = CollectorState::Listening;
        Ok(())
    }

    /// accept 루프를 시작합니다. 아직 바인드하지 않았으면 먼저 바인드합니다.
    pub async fn run(&mut self) -> Result<(), CollectorError> {
        if self.state == CollectorState::Idle {
            self.listen().await?;
        }
        if self.state == CollectorState::Running {
            return Err(CollectorError::AlreadyRunning(self.config.name.clone()));
        }
        let Some(listener) = self.listener.take() else {
            return Err(CollectorError::Config {
                field: "state".to_owned(),
                reason: format!("cannot run from state {}", self.state),
            });
        };

        let (done_tx, done_rx) = oneshot::channel();
        let accept_loop = AcceptLoop {
            listener,
            config: Arc::clone(&self.config),
            transforms: Arc::clone(&self.transforms),
            sinks: self.sinks.clone(),
            acceptor: self.acceptor.clone(),
            cancel: self.cancel.clone(),
            connections: Arc::clone(&self.connections),
            loop_exited: Arc::clone(&self.loop_exited),
        };

        self.accept_task = Some(tokio::spawn(accept_loop.run(done_tx)));
        self.done_rx = Some(done_rx);
        self.state = CollectorState::Running;

        tracing::info!(collector = %self.config.name, "collector started");
        Ok(())
    }

    /// 수집기를 종료합니다. 여러 번 호출해도 안전합니다.
    pub async fn stop(&mut self) {
        match self.state {
            CollectorState::Idle | CollectorState::Stopped | CollectorState::Stopping => return,
            CollectorState::Listening => {
                self.listener = None;
                self.state = CollectorState::Stopped;
                tracing::info!(collector = %self.config.name, "listener closed");
                return;
            }
            CollectorState::Running => {}
        }

        self.state = CollectorState::Stopping;
        let name = self.config.name.clone();
        tracing::info!(collector = %name, "stopping collector");

        // 1. 연결 닫기
        self.cancel_connections().await;

        // 2. 리스너 닫기
        self.cancel.cancel();

        // 3. accept 루프 완료 대기
        if let Some(done_rx) = self.done_rx.take() {
            if done_rx.await.is_err() {
                tracing::warn!(collector = %name, "accept loop ended without signalling");
            }
        }
        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                tracing::warn!(collector = %name, error = %e, "accept task panicked");
            }
        }

        // 4. 늦게 등록된 연결 닫기
        self.cancel_connections().await;

        // 5. 워커 종료 대기
        let tracked = std::mem::take(&mut *self.connections.lock().await);
        for conn in tracked {
            if let Err(e) = conn.handle.await {
                tracing::warn!(collector = %name, peer = %conn.peer, error = %e, "connection worker panicked");
            }
        }

        self.state = CollectorState::Stopped;
        tracing::info!(collector = %name, "run terminated");
    }

    async fn cancel_connections(&self) {
        let connections = self.connections.lock().await;
        for conn in connections.iter().filter(|c| !c.cancel.is_cancelled()) {
            tracing::debug!(collector = %self.config.name, peer = %conn.peer, "closing connection");
            conn.cancel.cancel();
        }
    }

    /// 수집기 건강 상태
    pub fn health(&self) -> HealthStatus {
        match self.state {
            CollectorState::Running if self.loop_exited.load(Ordering::Acquire) => {
                HealthStatus::Unhealthy("accept loop exited".to_owned())
            }
            CollectorState::Running => HealthStatus::Healthy,
            other => HealthStatus::Unhealthy(format!("collector {other}")),
        }
    }
}

impl fmt::Debug for DnsCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsCollector")
            .field("name", &self.config.name)
            .field("state", &self.state)
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

/// accept 루프 태스크가 소유하는 상태
struct AcceptLoop {
    listener: TcpListener,
    config: Arc<CollectorConfig>,
    transforms: Arc<TransformConfig>,
    sinks: SinkRegistry,
    acceptor: Option<TlsAcceptor>,
    cancel: CancellationToken,
    connections: Connections,
    loop_exited: Arc<AtomicBool>,
}

impl AcceptLoop {
    async fn run(self, done_tx: oneshot::Sender<()>) {
        let name = self.config.name.clone();

        loop {
            let (stream, peer) = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::error!(collector = %name, error = %e, "accept failed");
                        self.loop_exited.store(true, Ordering::Release);
                        break;
                    }
                },
            };

            metrics::counter!(m::COLLECTOR_CONNECTIONS_TOTAL, m::LABEL_COLLECTOR => name.clone())
                .increment(1);

            if self.config.rcvbuf_size > 0 {
                match socket::set_rcvbuf(&stream, self.config.rcvbuf_size) {
                    Ok(change) => tracing::debug!(
                        collector = %name,
                        peer = %peer,
                        before = change.before,
                        desired = change.desired,
                        actual = change.actual,
                        "receive buffer updated"
                    ),
                    Err(e) if self.config.rcvbuf_required => {
                        tracing::error!(collector = %name, peer = %peer, error = %e, "unable to set receive buffer");
                        self.loop_exited.store(true, Ordering::Release);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(collector = %name, peer = %peer, error = %e, "unable to set receive buffer");
                    }
                }
            }

            let conn_cancel = CancellationToken::new();
            let worker = ConnectionWorker::new(
                Arc::clone(&self.config),
                Arc::clone(&self.transforms),
                self.sinks.clone(),
                self.acceptor.clone(),
                peer,
                conn_cancel.clone(),
            );
            let handle = tokio::spawn(async move {
                // 결과는 워커가 로그로 남김
                let _ = worker.run(stream).await;
            });

            let mut connections = self.connections.lock().await;
            connections.retain(|c| !c.handle.is_finished());
            connections.push(TrackedConnection {
                peer,
                cancel: conn_cancel,
                handle,
            });
        }

        // listener drop
        drop(self.listener);
        let _ = done_tx.send(());
    }
}

impl Plugin for DnsCollector {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn state(&self) -> PluginState {
        match self.state {
            CollectorState::Idle => PluginState::Created,
            CollectorState::Listening => PluginState::Initialized,
            CollectorState::Running if self.loop_exited.load(Ordering::Acquire) => {
                PluginState::Failed
            }
            CollectorState::Running | CollectorState::Stopping => PluginState::Running,
            CollectorState::Stopped => PluginState::Stopped,
        }
    }

    async fn init(&mut self) -> Result<(), DnspipeError> {
        self.listen().await.map_err(DnspipeError::from)
    }

    async fn start(&mut self) -> Result<(), DnspipeError> {
        self.run().await.map_err(DnspipeError::from)
    }

    async fn stop(&mut self) -> Result<(), DnspipeError> {
        DnsCollector::stop(self).await;
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        self.health()
    }
}

/// 수집기 빌더
#[derive(Default)]
pub struct DnsCollectorBuilder {
    config: CollectorConfig,
    transforms: Option<Arc<TransformConfig>>,
    sinks: SinkRegistry,
}

impl DnsCollectorBuilder {
    /// 기본 설정으로 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 수집기 설정을 지정합니다.
    pub fn config(mut self, config: CollectorConfig) -> Self {
        self.config = config;
        self
    }

    /// 연결 워커가 공유하는 변환 설정을 지정합니다.
    pub fn transforms(mut self, transforms: Arc<TransformConfig>) -> Self {
        self.transforms = Some(transforms);
        self
    }

    /// 레코드를 받을 싱크 목록을 지정합니다.
    pub fn sinks(mut self, sinks: SinkRegistry) -> Self {
        self.sinks = sinks;
        self
    }

    /// 설정을 검증하고 수집기를 생성합니다.
    pub fn build(self) -> Result<DnsCollector, CollectorError> {
        self.config.validate()?;

        let info = PluginInfo::collector(
            self.config.name.clone(),
            format!("{} collector", self.config.mode),
        );

        Ok(DnsCollector {
            info,
            config: Arc::new(self.config),
            transforms: self.transforms.unwrap_or_default(),
            sinks: self.sinks,
            state: CollectorState::Idle,
            listener: None,
            acceptor: None,
            local_addr: None,
            cancel: CancellationToken::new(),
            connections: Arc::new(Mutex::new(Vec::new())),
            accept_task: None,
            done_rx: None,
            loop_exited: Arc::new(AtomicBool::new(false)),
        })
    }
}
