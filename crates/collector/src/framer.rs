//! 스트림 프레이머 — 길이 접두어 스트림을 레코드 시퀀스로 변환
//!
//! 한 연결의 바이트 스트림에서 다음을 반복합니다.
//!
//! 1. 길이 접두어 읽기 (big endian `u16` 또는 `u32`)
//! 2. 정확히 그 길이만큼 페이로드 읽기 (읽기마다 유휴 타임아웃 적용)
//! 3. [`PayloadDecoder`]로 레코드 생성
//! 4. 출력 채널로 전달 (가득 차면 대기, 취소 토큰과 경합)
//!
//! 프레임 경계에서의 EOF는 정상 종료입니다. 타임아웃, reset, 프레임 중간의 EOF,
//! 0 또는 최대 크기를 넘는 길이는 [`FramerError`]로 반환되며 재시도하지 않습니다.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use dnspipe_core::metrics as m;
use dnspipe_core::record::Record;

use crate::config::{CollectorConfig, LengthPrefix};
use crate::decoder::{self, DecodeContext, PayloadDecoder};
use crate::error::FramerError;

/// 프레이밍 정상 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// 프레임 경계에서 스트림 종료
    Eof,
    /// 연결 취소 토큰
    Cancelled,
    /// 출력 채널 수신측이 닫힘
    Closed,
}

/// 연결 하나의 프레이머
pub struct Framer {
    prefix: LengthPrefix,
    read_timeout: Duration,
    max_frame_size: usize,
    decoder: Box<dyn PayloadDecoder>,
    ctx: DecodeContext,
}

impl Framer {
    /// 수집기 설정에 맞는 디코더로 프레이머를 생성합니다.
    pub fn new(config: &CollectorConfig, ctx: DecodeContext) -> Self {
        Self::with_decoder(config, decoder::for_mode(config.mode), ctx)
    }

    /// 지정한 디코더로 프레이머를 생성합니다.
    pub fn with_decoder(
        config: &CollectorConfig,
        decoder: Box<dyn PayloadDecoder>,
        ctx: DecodeContext,
    ) -> Self {
        Self {
            prefix: config.length_prefix,
            read_timeout: config.read_timeout,
            max_frame_size: config.max_frame_size,
            decoder,
            ctx,
        }
    }

    /// 스트림이 끝날 때까지 프레임을 읽어 레코드를 전달합니다.
    pub async fn run<R>(
        &self,
        reader: &mut R,
        tx: &mpsc::Sender<Record>,
        cancel: &CancellationToken,
    ) -> Result<StreamEnd, FramerError>
    where
        R: AsyncRead + Unpin,
    {
        let collector = self.ctx.collector.clone();
        let mut payload = Vec::new();

        loop {
            let len = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
                len = self.read_frame(reader, &mut payload) => len?,
            };
            let Some(len) = len else {
                return Ok(StreamEnd::Eof);
            };

            metrics::counter!(m::COLLECTOR_FRAMES_TOTAL, m::LABEL_COLLECTOR => collector.clone())
                .increment(1);
            metrics::counter!(m::COLLECTOR_BYTES_TOTAL, m::LABEL_COLLECTOR => collector.clone())
                .increment(len as u64);

            let record = self.decoder.decode(&payload, &self.ctx);
            if record.malformed {
                metrics::counter!(m::COLLECTOR_MALFORMED_TOTAL, m::LABEL_COLLECTOR => collector.clone())
                    .increment(1);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
                sent = tx.send(record) => {
                    if sent.is_err() {
                        return Ok(StreamEnd::Closed);
                    }
                }
            }
        }
    }

    /// 프레임 하나를 `buf`에 읽습니다. 경계에서 EOF면 `None`
    async fn read_frame<R>(
        &self,
        reader: &mut R,
        buf: &mut Vec<u8>,
    ) -> Result<Option<usize>, FramerError>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; 4];
        let header = &mut header[..self.prefix.width()];
        if !self.read_exact(reader, header, true).await? {
            return Ok(None);
        }

        let len = match self.prefix {
            LengthPrefix::U16 => u16::from_be_bytes([header[0], header[1]]) as usize,
            LengthPrefix::U32 => {
                u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize
            }
        };
        if len == 0 || len > self.max_frame_size {
            return Err(FramerError::InvalidLength {
                len,
                max: self.max_frame_size,
            });
        }

        buf.resize(len, 0);
        self.read_exact(reader, buf, false).await?;
        Ok(Some(len))
    }

    /// `buf`를 가득 채웁니다. `at_boundary`이고 한 바이트도 못 읽은 채 EOF면 `false`
    async fn read_exact<R>(
        &self,
        reader: &mut R,
        buf: &mut [u8],
        at_boundary: bool,
    ) -> Result<bool, FramerError>
    where
        R: AsyncRead + Unpin,
    {
        let mut filled = 0;
        while filled < buf.len() {
            let n = tokio::time::timeout(self.read_timeout, reader.read(&mut buf[filled..]))
                .await
                .map_err(|_| FramerError::Timeout(self.read_timeout))??;
            if n == 0 {
                if at_boundary && filled == 0 {
                    return Ok(false);
                }
                return Err(FramerError::UnexpectedEof {
                    expected: buf.len(),
                    received: filled,
                });
            }
            filled += n;
        }
        Ok(true)
    }
}

/// 페이로드 앞에 길이 접두어를 붙입니다.
pub fn encode_frame(prefix: LengthPrefix, payload: &[u8]) -> Result<Bytes, FramerError> {
    if payload.is_empty() || payload.len() > prefix.max_len() {
        return Err(FramerError::InvalidLength {
            len: payload.len(),
            max: prefix.max_len(),
        });
    }

    let mut buf = BytesMut::with_capacity(prefix.width() + payload.len());
    match prefix {
        LengthPrefix::U16 => buf.put_u16(payload.len() as u16),
        LengthPrefix::U32 => buf.put_u32(payload.len() as u32),
    }
    buf.put_slice(payload);
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollectorConfigBuilder;
    use tokio::io::AsyncWriteExt;

    /// 페이로드를 그대로 qname에 담는 테스트 디코더
    struct EchoDecoder;

    impl PayloadDecoder for EchoDecoder {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn decode(&self, payload: &[u8], ctx: &DecodeContext) -> Record {
            match std::str::from_utf8(payload) {
                Ok(s) => {
                    let mut record = ctx.record();
                    record.qname = s.to_owned();
                    record.length = payload.len();
                    record
                }
                Err(_) => ctx.malformed(payload.len()),
            }
        }
    }

    fn framer(prefix: LengthPrefix, timeout_ms: u64) -> Framer {
        let config = CollectorConfigBuilder::new()
            .length_prefix(prefix)
            .max_frame_size(1024)
            .read_timeout(Duration::from_millis(timeout_ms))
            .build()
            .unwrap();
        let ctx = DecodeContext::new("test", "127.0.0.1:9".parse().unwrap());
        Framer::with_decoder(&config, Box::new(EchoDecoder), ctx)
    }

    fn frames(prefix: LengthPrefix, payloads: &[&[u8]]) -> Vec<u8> {
        payloads
            .iter()
            .flat_map(|p| encode_frame(prefix, p).unwrap().to_vec())
            .collect()
    }

    async fn run_bytes(
        framer: &Framer,
        data: Vec<u8>,
    ) -> (Result<StreamEnd, FramerError>, Vec<Record>) {
        let (tx, mut rx) = mpsc::channel(64);
        let mut reader = data.as_slice();
        let result = framer.run(&mut reader, &tx, &CancellationToken::new()).await;
        drop(tx);
        let mut records = Vec::new();
        while let Some(r) = rx.recv().await {
            records.push(r);
        }
        (result, records)
    }

    #[tokio::test]
    async fn reads_frames_until_clean_eof() {
        let framer = framer(LengthPrefix::U16, 500);
        let data = frames(LengthPrefix::U16, &[b"one.example", b"two.example"]);
        let (result, records) = run_bytes(&framer, data).await;

        assert_eq!(result.unwrap(), StreamEnd::Eof);
        let names: Vec<_> = records.iter().map(|r| r.qname.as_str()).collect();
        assert_eq!(names, vec!["one.example", "two.example"]);
        assert_eq!(records[0].collector, "test");
    }

    #[tokio::test]
    async fn u32_prefix() {
        let framer = framer(LengthPrefix::U32, 500);
        let data = frames(LengthPrefix::U32, &[b"wide.example"]);
        let (result, records) = run_bytes(&framer, data).await;
        assert_eq!(result.unwrap(), StreamEnd::Eof);
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn empty_stream_is_clean_eof() {
        let framer = framer(LengthPrefix::U16, 500);
        let (result, records) = run_bytes(&framer, Vec::new()).await;
        assert_eq!(result.unwrap(), StreamEnd::Eof);
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn eof_inside_prefix_is_error() {
        let framer = framer(LengthPrefix::U16, 500);
        let mut data = frames(LengthPrefix::U16, &[b"ok"]);
        data.push(0x00);
        let (result, records) = run_bytes(&framer, data).await;
        assert!(matches!(
            result,
            Err(FramerError::UnexpectedEof { expected: 2, received: 1 })
        ));
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn eof_inside_payload_is_error() {
        let framer = framer(LengthPrefix::U16, 500);
        let data = vec![0x00, 0x08, b'a', b'b', b'c'];
        let (result, records) = run_bytes(&framer, data).await;
        assert!(matches!(
            result,
            Err(FramerError::UnexpectedEof { expected: 8, received: 3 })
        ));
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn zero_length_is_transport_error() {
        let framer = framer(LengthPrefix::U16, 500);
        let (result, _) = run_bytes(&framer, vec![0x00, 0x00]).await;
        assert!(matches!(result, Err(FramerError::InvalidLength { len: 0, .. })));
    }

    #[tokio::test]
    async fn oversize_length_is_transport_error() {
        let framer = framer(LengthPrefix::U16, 500);
        let (result, _) = run_bytes(&framer, vec![0x08, 0x00]).await;
        assert!(matches!(
            result,
            Err(FramerError::InvalidLength { len: 2048, max: 1024 })
        ));
    }

    #[tokio::test]
    async fn decode_failure_does_not_abort_stream() {
        let framer = framer(LengthPrefix::U16, 500);
        let data = frames(
            LengthPrefix::U16,
            &[b"before.example", &[0xff, 0xfe, 0xfd], b"after.example"],
        );
        let (result, records) = run_bytes(&framer, data).await;

        assert_eq!(result.unwrap(), StreamEnd::Eof);
        assert_eq!(records.len(), 3);
        assert!(records[1].malformed);
        assert_eq!(records[1].length, 3);
        assert_eq!(records[2].qname, "after.example");
    }

    #[tokio::test]
    async fn idle_read_times_out() {
        let framer = framer(LengthPrefix::U16, 50);
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[0x00]).await.unwrap();

        let (tx, _rx) = mpsc::channel(4);
        let result = framer
            .run(&mut server, &tx, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(FramerError::Timeout(_))));
        drop(client);
    }

    #[tokio::test]
    async fn partial_reads_are_reassembled() {
        let framer = framer(LengthPrefix::U16, 500);
        let (mut client, mut server) = tokio::io::duplex(64);
        let data = frames(LengthPrefix::U16, &[b"split.example"]);

        let writer = tokio::spawn(async move {
            for chunk in data.chunks(3) {
                client.write_all(chunk).await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let (tx, mut rx) = mpsc::channel(4);
        let result = framer
            .run(&mut server, &tx, &CancellationToken::new())
            .await;
        writer.await.unwrap();

        assert_eq!(result.unwrap(), StreamEnd::Eof);
        assert_eq!(rx.recv().await.unwrap().qname, "split.example");
    }

    #[tokio::test]
    async fn cancellation_interrupts_blocked_send() {
        let framer = framer(LengthPrefix::U16, 500);
        let data = frames(LengthPrefix::U16, &[b"a.example", b"b.example"]);
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel_clone.cancel();
        });

        let mut reader = data.as_slice();
        let result = framer.run(&mut reader, &tx, &cancel).await;
        assert_eq!(result.unwrap(), StreamEnd::Cancelled);
    }

    #[tokio::test]
    async fn closed_output_ends_stream() {
        let framer = framer(LengthPrefix::U16, 500);
        let data = frames(LengthPrefix::U16, &[b"a.example"]);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let mut reader = data.as_slice();
        let result = framer
            .run(&mut reader, &tx, &CancellationToken::new())
            .await;
        assert_eq!(result.unwrap(), StreamEnd::Closed);
    }

    #[test]
    fn encode_frame_rejects_empty_and_oversize() {
        assert!(encode_frame(LengthPrefix::U16, b"").is_err());
        assert!(encode_frame(LengthPrefix::U16, &vec![0u8; 70_000]).is_err());
        let frame = encode_frame(LengthPrefix::U16, b"abc").unwrap();
        assert_eq!(&frame[..], &[0x00, 0x03, b'a', b'b', b'c']);
    }
}
