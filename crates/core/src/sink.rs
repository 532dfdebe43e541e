//! 싱크 레지스트리 — 레코드 팬아웃
//!
//! 각 싱크는 자신만의 bounded 입력 채널 하나를 가집니다.
//! [`SinkRegistry::broadcast`]는 싱크마다 레코드 사본 하나를 순서대로 전송하며,
//! 채널이 가득 차면 기다립니다. 레코드를 버리지 않으므로 느린 싱크는
//! 해당 레코드를 생산한 연결만 느리게 만듭니다.

use tokio::sync::mpsc;

use crate::error::PipelineError;
use crate::metrics as m;
use crate::record::Record;

/// 이름이 붙은 싱크 입력 채널
#[derive(Debug, Clone)]
pub struct SinkHandle {
    name: String,
    tx: mpsc::Sender<Record>,
}

impl SinkHandle {
    /// 싱크 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 수신측이 닫혔는지 여부
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// 싱크 입력 채널 목록
///
/// 복제 비용이 낮으므로 연결 워커마다 한 벌씩 복제하여 사용합니다.
#[derive(Debug, Clone, Default)]
pub struct SinkRegistry {
    sinks: Vec<SinkHandle>,
}

impl SinkRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 싱크를 추가합니다. 같은 이름이 이미 있으면 에러를 반환합니다.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        tx: mpsc::Sender<Record>,
    ) -> Result<(), PipelineError> {
        let name = name.into();
        if self.sinks.iter().any(|s| s.name == name) {
            return Err(PipelineError::InitFailed(format!(
                "sink already registered: {name}"
            )));
        }
        self.sinks.push(SinkHandle { name, tx });
        Ok(())
    }

    /// 새 bounded 채널을 만들어 싱크로 추가하고 수신측을 반환합니다.
    pub fn channel(
        &mut self,
        name: impl Into<String>,
        capacity: usize,
    ) -> Result<mpsc::Receiver<Record>, PipelineError> {
        let (tx, rx) = mpsc::channel(capacity);
        self.add(name, tx)?;
        Ok(rx)
    }

    /// 등록된 싱크 수
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// 등록된 싱크가 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// 등록된 싱크 이름 목록 (등록 순서)
    pub fn names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name.as_str()).collect()
    }

    /// 모든 싱크에 레코드 사본을 전송하고 전달된 싱크 수를 반환합니다.
    ///
    /// 싱크는 등록 순서대로 하나씩 처리되며 각 전송은 채널 여유가 생길 때까지 기다립니다.
    /// 닫힌 싱크는 로그를 남기고 건너뜁니다.
    pub async fn broadcast(&self, record: &Record) -> usize {
        let mut delivered = 0;
        for sink in &self.sinks {
            match sink.tx.send(record.clone()).await {
                Ok(()) => {
                    delivered += 1;
                    metrics::counter!(m::SINK_RECORDS_SENT_TOTAL, m::LABEL_SINK => sink.name.clone())
                        .increment(1);
                }
                Err(_) => {
                    tracing::warn!(sink = %sink.name, "sink channel closed, record skipped");
                    metrics::counter!(m::SINK_SEND_FAILURES_TOTAL, m::LABEL_SINK => sink.name.clone())
                        .increment(1);
                }
            }
        }
        delivered
    }
}
