//! 연결 워커 — 프로듀서 연결 하나의 생명주기
//!
//! 워커는 생성 시 자신만의 처리 파이프라인을 만듭니다.
//!
//! ```text
//! socket ──(TLS handshake)──> Framer ──mpsc──> processing task
//!                                              TransformerChain → SinkRegistry::broadcast
//! ```
//!
//! 소켓은 워커가 소유하며 종료 시 정확히 한 번 닫힙니다.
//! 처리 태스크는 채널에 남은 레코드를 스스로 비우고 종료하며, 워커는 이를 기다리지 않습니다.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use dnspipe_core::metrics as m;
use dnspipe_core::pipeline::TransformOutcome;
use dnspipe_core::record::Record;
use dnspipe_core::sink::SinkRegistry;
use dnspipe_transform::{TransformConfig, TransformerChain};

use crate::config::CollectorConfig;
use crate::decoder::DecodeContext;
use crate::error::FramerError;
use crate::framer::{Framer, StreamEnd};
use crate::socket;
use crate::transport::Transport;

/// 연결 워커
pub struct ConnectionWorker {
    config: Arc<CollectorConfig>,
    transforms: Arc<TransformConfig>,
    sinks: SinkRegistry,
    acceptor: Option<TlsAcceptor>,
    peer: SocketAddr,
    cancel: CancellationToken,
}

impl ConnectionWorker {
    pub fn new(
        config: Arc<CollectorConfig>,
        transforms: Arc<TransformConfig>,
        sinks: SinkRegistry,
        acceptor: Option<TlsAcceptor>,
        peer: SocketAddr,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            transforms,
            sinks,
            acceptor,
            peer,
            cancel,
        }
    }

    /// 연결이 끝날 때까지 프레임을 처리합니다.
    pub async fn run(self, stream: TcpStream) -> Result<StreamEnd, FramerError> {
        let collector = self.config.name.clone();
        let peer = self.peer;

        tracing::info!(collector = %collector, peer = %peer, "new connection");
        metrics::gauge!(m::COLLECTOR_ACTIVE_CONNECTIONS, m::LABEL_COLLECTOR => collector.clone())
            .increment(1.0);

        let tx = self.spawn_processor();
        let result = self.serve(stream, &tx).await;
        drop(tx);

        match &result {
            Ok(end) => {
                tracing::debug!(collector = %collector, peer = %peer, end = ?end, "stream ended");
            }
            Err(e) => {
                tracing::warn!(collector = %collector, peer = %peer, error = %e, "transport error");
                metrics::counter!(
                    m::COLLECTOR_TRANSPORT_ERRORS_TOTAL,
                    m::LABEL_COLLECTOR => collector.clone(),
                    m::LABEL_REASON => e.reason()
                )
                .increment(1);
            }
        }

        tracing::info!(collector = %collector, peer = %peer, "connection closed");
        metrics::gauge!(m::COLLECTOR_ACTIVE_CONNECTIONS, m::LABEL_COLLECTOR => collector)
            .decrement(1.0);

        result
    }

    /// 연결 전용 변환 체인과 처리 태스크를 만들고 입력 채널을 반환합니다.
    fn spawn_processor(&self) -> mpsc::Sender<Record> {
        let (tx, mut rx) = mpsc::channel::<Record>(self.config.channel_capacity);
        let mut chain = TransformerChain::from_config(&self.transforms);
        let sinks = self.sinks.clone();

        tokio::spawn(async move {
            while let Some(mut record) = rx.recv().await {
                if chain.process(&mut record) == TransformOutcome::Keep {
                    sinks.broadcast(&record).await;
                }
            }
        });

        tx
    }

    async fn serve(
        &self,
        stream: TcpStream,
        tx: &mpsc::Sender<Record>,
    ) -> Result<StreamEnd, FramerError> {
        let mut transport = match self.handshake(stream).await? {
            Some(transport) => transport,
            None => return Ok(StreamEnd::Cancelled),
        };

        let ctx = DecodeContext::new(self.config.name.clone(), self.peer);
        let framer = Framer::new(&self.config, ctx);
        let result = framer.run(&mut transport, tx, &self.cancel).await;

        if matches!(result, Ok(StreamEnd::Cancelled)) && self.config.reset_conn {
            if let Err(e) = socket::set_reset_on_close(transport.tcp()) {
                tracing::debug!(peer = %self.peer, error = %e, "reset on close not applied");
            }
        }

        // transport drop closes the socket
        result
    }

    /// TLS 수집기면 읽기 타임아웃 안에 핸드셰이크를 마칩니다. 취소되면 `None`
    async fn handshake(&self, stream: TcpStream) -> Result<Option<Transport>, FramerError> {
        let Some(acceptor) = &self.acceptor else {
            return Ok(Some(Transport::Plain(stream)));
        };

        let timeout = self.config.read_timeout;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(None),
            res = tokio::time::timeout(timeout, acceptor.accept(stream)) => {
                let tls = res
                    .map_err(|_| FramerError::Timeout(timeout))?
                    .map_err(|e| FramerError::Handshake(e.to_string()))?;
                tracing::debug!(peer = %self.peer, "tls handshake completed");
                Ok(Some(Transport::Tls(Box::new(tls))))
            }
        }
    }
}
