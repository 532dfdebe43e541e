//! 수락된 소켓의 옵션 설정 (SO_RCVBUF, SO_LINGER)

use std::time::Duration;

use socket2::SockRef;
use tokio::net::TcpStream;

use crate::error::CollectorError;

/// 수신 버퍼 크기 변경 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RcvBufChange {
    /// 변경 전 크기
    pub before: usize,
    /// 요청한 크기
    pub desired: usize,
    /// 커널이 실제로 적용한 크기
    pub actual: usize,
}

/// SO_RCVBUF를 설정하고 변경 전후 크기를 반환합니다.
///
/// 커널은 요청값을 조정할 수 있으므로 `actual`은 `desired`와 다를 수 있습니다.
pub fn set_rcvbuf(stream: &TcpStream, desired: usize) -> Result<RcvBufChange, CollectorError> {
    let sock = SockRef::from(stream);
    let err = |e: std::io::Error| CollectorError::Socket {
        option: "SO_RCVBUF",
        reason: e.to_string(),
    };

    let before = sock.recv_buffer_size().map_err(err)?;
    sock.set_recv_buffer_size(desired).map_err(err)?;
    let actual = sock.recv_buffer_size().map_err(err)?;

    Ok(RcvBufChange {
        before,
        desired,
        actual,
    })
}

/// 소켓을 닫을 때 FIN 대신 RST를 보내도록 SO_LINGER=0을 설정합니다.
pub fn set_reset_on_close(stream: &TcpStream) -> Result<(), CollectorError> {
    SockRef::from(stream)
        .set_linger(Some(Duration::ZERO))
        .map_err(|e| CollectorError::Socket {
            option: "SO_LINGER",
            reason: e.to_string(),
        })
}
