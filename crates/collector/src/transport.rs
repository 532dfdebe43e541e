//! 평문/TLS 연결을 하나의 스트림 타입으로 감쌉니다.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;

/// 수락된 프로듀서 연결
pub enum Transport {
    /// 평문 TCP
    Plain(TcpStream),
    /// 핸드셰이크가 끝난 TLS
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport {
    /// 하위 TCP 소켓
    pub fn tcp(&self) -> &TcpStream {
        match self {
            Self::Plain(stream) => stream,
            Self::Tls(stream) => stream.get_ref().0,
        }
    }
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(_) => write!(f, "Transport::Plain"),
            Self::Tls(_) => write!(f, "Transport::Tls"),
        }
    }
}
