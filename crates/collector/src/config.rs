//! 수집기 설정
//!
//! [`CollectorConfig`]는 core의 [`CollectorInstanceConfig`]에서 파생됩니다.
//! 문자열 레이블(모드, TLS 버전)은 여기서 열거형으로 변환되며,
//! 알 수 없는 레이블은 소켓을 열기 전에 거부됩니다.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use dnspipe_core::config::CollectorInstanceConfig;

use crate::error::CollectorError;

/// 페이로드 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorMode {
    /// PowerDNS protobuf (`PBDNSMessage`)
    PowerDns,
    /// DNS wire 형식 (RFC 1035 TCP 프레이밍)
    DnsWire,
}

impl CollectorMode {
    /// 설정 레이블
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PowerDns => "powerdns",
            Self::DnsWire => "dns",
        }
    }

    /// 모드별 기본 길이 접두어 폭
    pub fn default_prefix(&self) -> LengthPrefix {
        match self {
            Self::PowerDns | Self::DnsWire => LengthPrefix::U16,
        }
    }
}

impl fmt::Display for CollectorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectorMode {
    type Err = CollectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "powerdns" => Ok(Self::PowerDns),
            "dns" => Ok(Self::DnsWire),
            other => Err(CollectorError::Config {
                field: "mode".to_owned(),
                reason: format!("unknown mode '{other}'"),
            }),
        }
    }
}

/// 길이 접두어 폭 (big endian)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthPrefix {
    /// 2바이트
    U16,
    /// 4바이트
    U32,
}

impl LengthPrefix {
    /// 접두어 바이트 수
    pub fn width(&self) -> usize {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    /// 접두어로 표현 가능한 최대 길이
    pub fn max_len(&self) -> usize {
        match self {
            Self::U16 => u16::MAX as usize,
            Self::U32 => u32::MAX as usize,
        }
    }
}

/// TLS 최소 버전
///
/// TLS 1.0/1.1은 rustls가 지원하지 않으므로 1.2로 올려 적용됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    V1_0,
    V1_1,
    V1_2,
    V1_3,
}

impl TlsVersion {
    /// 설정 레이블
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1_0 => "1.0",
            Self::V1_1 => "1.1",
            Self::V1_2 => "1.2",
            Self::V1_3 => "1.3",
        }
    }

    /// 이 버전 이상으로 허용할 프로토콜 버전 목록
    pub fn protocol_versions(&self) -> Vec<&'static rustls::SupportedProtocolVersion> {
        match self {
            Self::V1_3 => vec![&rustls::version::TLS13],
            _ => vec![&rustls::version::TLS12, &rustls::version::TLS13],
        }
    }

    /// 실제 적용되는 하한보다 낮은 레이블인지 여부
    pub fn is_below_floor(&self) -> bool {
        *self < Self::V1_2
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TlsVersion {
    type Err = CollectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1.0" => Ok(Self::V1_0),
            "1.1" => Ok(Self::V1_1),
            "1.2" => Ok(Self::V1_2),
            "1.3" => Ok(Self::V1_3),
            other => Err(CollectorError::Config {
                field: "tls_min_version".to_owned(),
                reason: format!("unknown label '{other}' (expected 1.0, 1.1, 1.2, 1.3)"),
            }),
        }
    }
}

/// TLS 리스너 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    /// 최소 버전
    pub min_version: TlsVersion,
    /// PEM 인증서 체인 경로
    pub cert_file: PathBuf,
    /// PEM 개인 키 경로
    pub key_file: PathBuf,
}

/// 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 수집기 이름
    pub name: String,
    /// 페이로드 형식
    pub mode: CollectorMode,
    /// 수신 주소
    pub listen_ip: String,
    /// 수신 포트 (0이면 임의 포트)
    pub listen_port: u16,
    /// TLS 설정 (`None`이면 평문)
    pub tls: Option<TlsSettings>,
    /// 연결 종료 시 RST 전송
    pub reset_conn: bool,
    /// SO_RCVBUF 크기 (0이면 변경하지 않음)
    pub rcvbuf_size: usize,
    /// SO_RCVBUF 설정 실패를 치명적 에러로 처리
    pub rcvbuf_required: bool,
    /// 읽기 유휴 타임아웃
    pub read_timeout: Duration,
    /// 최대 프레임 크기
    pub max_frame_size: usize,
    /// 길이 접두어 폭
    pub length_prefix: LengthPrefix,
    /// 연결별 내부 채널 용량
    pub channel_capacity: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            name: "pdns".to_owned(),
            mode: CollectorMode::PowerDns,
            listen_ip: "0.0.0.0".to_owned(),
            listen_port: 6001,
            tls: None,
            reset_conn: true,
            rcvbuf_size: 0,
            rcvbuf_required: false,
            read_timeout: Duration::from_secs(5),
            max_frame_size: 65_535,
            length_prefix: LengthPrefix::U16,
            channel_capacity: 1024,
        }
    }
}

impl CollectorConfig {
    /// core 설정에서 수집기 설정을 생성하고 검증합니다.
    pub fn from_core(core: &CollectorInstanceConfig) -> Result<Self, CollectorError> {
        let mode: CollectorMode = core.mode.parse()?;
        let min_version: TlsVersion = core.tls_min_version.parse()?;

        let length_prefix = match core.length_prefix_bytes {
            0 => mode.default_prefix(),
            2 => LengthPrefix::U16,
            4 => LengthPrefix::U32,
            other => {
                return Err(CollectorError::Config {
                    field: "length_prefix_bytes".to_owned(),
                    reason: format!("unsupported width {other} (expected 0, 2, 4)"),
                });
            }
        };

        let tls = core.tls_support.then(|| TlsSettings {
            min_version,
            cert_file: PathBuf::from(&core.cert_file),
            key_file: PathBuf::from(&core.key_file),
        });

        let config = Self {
            name: core.name.clone(),
            mode,
            listen_ip: core.listen_ip.clone(),
            listen_port: core.listen_port,
            tls,
            reset_conn: core.reset_conn,
            rcvbuf_size: core.rcvbuf_size,
            rcvbuf_required: core.rcvbuf_required,
            read_timeout: Duration::from_secs(core.read_timeout_secs),
            max_frame_size: core.max_frame_size,
            length_prefix,
            channel_capacity: core.channel_capacity,
        };
        config.validate()?;
        Ok(config)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), CollectorError> {
        if self.name.is_empty() {
            return Err(config_err("name", "must not be empty"));
        }
        if self.listen_ip.parse::<IpAddr>().is_err() {
            return Err(config_err(
                "listen_ip",
                &format!("'{}' is not an IP address", self.listen_ip),
            ));
        }
        if let Some(tls) = &self.tls {
            if tls.cert_file.as_os_str().is_empty() {
                return Err(config_err("cert_file", "required when TLS is enabled"));
            }
            if tls.key_file.as_os_str().is_empty() {
                return Err(config_err("key_file", "required when TLS is enabled"));
            }
        }
        if self.read_timeout.is_zero() {
            return Err(config_err("read_timeout", "must be greater than 0"));
        }
        if self.max_frame_size == 0 {
            return Err(config_err("max_frame_size", "must be greater than 0"));
        }
        if self.max_frame_size > self.length_prefix.max_len() {
            return Err(config_err(
                "max_frame_size",
                &format!(
                    "{} exceeds what a {}-byte prefix can express",
                    self.max_frame_size,
                    self.length_prefix.width()
                ),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(config_err("channel_capacity", "must be greater than 0"));
        }
        Ok(())
    }

    /// 바인드 주소
    pub fn listen_addr(&self) -> Result<SocketAddr, CollectorError> {
        let ip: IpAddr = self.listen_ip.parse().map_err(|_| {
            config_err(
                "listen_ip",
                &format!("'{}' is not an IP address", self.listen_ip),
            )
        })?;
        Ok(SocketAddr::new(ip, self.listen_port))
    }
}

fn config_err(field: &str, reason: &str) -> CollectorError {
    CollectorError::Config {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}

/// 수집기 설정 빌더
#[derive(Default)]
pub struct CollectorConfigBuilder {
    config: CollectorConfig,
}

impl CollectorConfigBuilder {
    /// 기본 설정으로 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 수집기 이름을 설정합니다.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// 페이로드 형식을 설정합니다. 길이 접두어도 형식의 기본값으로 바뀝니다.
    pub fn mode(mut self, mode: CollectorMode) -> Self {
        self.config.mode = mode;
        self.config.length_prefix = mode.default_prefix();
        self
    }

    /// 수신 IP를 설정합니다.
    pub fn listen_ip(mut self, ip: impl Into<String>) -> Self {
        self.config.listen_ip = ip.into();
        self
    }

    /// 수신 포트를 설정합니다. 0이면 임시 포트를 사용합니다.
    pub fn listen_port(mut self, port: u16) -> Self {
        self.config.listen_port = port;
        self
    }

    /// TLS를 활성화하고 최소 버전과 인증서/키 경로를 설정합니다.
    pub fn tls(
        mut self,
        min_version: TlsVersion,
        cert_file: impl Into<PathBuf>,
        key_file: impl Into<PathBuf>,
    ) -> Self {
        self.config.tls = Some(TlsSettings {
            min_version,
            cert_file: cert_file.into(),
            key_file: key_file.into(),
        });
        self
    }

    /// 종료 시 연결을 RST로 닫을지 설정합니다.
    pub fn reset_conn(mut self, reset: bool) -> Self {
        self.config.reset_conn = reset;
        self
    }

    /// 수신 버퍼 크기와 실패 시 치명 여부를 설정합니다.
    pub fn rcvbuf_size(mut self, size: usize, required: bool) -> Self {
        self.config.rcvbuf_size = size;
        self.config.rcvbuf_required = required;
        self
    }

    /// 읽기 유휴 타임아웃을 설정합니다.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// 최대 프레임 크기를 설정합니다.
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// 길이 접두어 폭을 설정합니다.
    pub fn length_prefix(mut self, prefix: LengthPrefix) -> Self {
        self.config.length_prefix = prefix;
        self
    }

    /// 연결별 처리 채널 용량을 설정합니다.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// 설정을 검증하고 반환합니다.
    pub fn build(self) -> Result<CollectorConfig, CollectorError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
