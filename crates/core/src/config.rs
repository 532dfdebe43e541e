//! 설정 관리 — dnspipe.toml 파싱 및 런타임 설정
//!
//! [`DnspipeConfig`]는 데몬과 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`DNSPIPE_GENERAL_LOG_LEVEL=debug` 형식)
//! 3. 설정 파일 (`dnspipe.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! 수집기와 싱크는 TOML 배열 테이블(`[[collectors]]`, `[[sinks]]`)로 선언하며
//! 환경변수 오버라이드 대상이 아닙니다.
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), dnspipe_core::error::DnspipeError> {
//! use dnspipe_core::config::DnspipeConfig;
//!
//! let config = DnspipeConfig::load("dnspipe.toml").await?;
//! let config = DnspipeConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, DnspipeError};

/// 지원하는 수집기 모드
pub const COLLECTOR_MODES: &[&str] = &["powerdns", "dns"];

/// 지원하는 TLS 최소 버전 레이블
pub const TLS_VERSION_LABELS: &[&str] = &["1.0", "1.1", "1.2", "1.3"];

/// 지원하는 싱크 종류
pub const SINK_KINDS: &[&str] = &["stdout"];

/// 지원하는 싱크 출력 형식
pub const SINK_FORMATS: &[&str] = &["text", "json"];

/// 일반적인 DNS 레코드 타입 (uncommon-qtypes 판정 기준)
pub const DEFAULT_COMMON_QTYPES: &[&str] = &[
    "A", "AAAA", "TXT", "CNAME", "PTR", "NAPTR", "DNSKEY", "SRV", "SOA", "NS", "MX", "DS",
    "HTTPS",
];

/// dnspipe 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnspipeConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// 변환기 설정
    #[serde(default)]
    pub transforms: TransformsConfig,
    /// 수집기 목록
    #[serde(default)]
    pub collectors: Vec<CollectorInstanceConfig>,
    /// 싱크 목록
    #[serde(default)]
    pub sinks: Vec<SinkInstanceConfig>,
}

impl DnspipeConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용한 뒤 검증합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DnspipeError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, DnspipeError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DnspipeError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                DnspipeError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, DnspipeError> {
        toml::from_str(toml_str).map_err(|e| {
            DnspipeError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 네이밍 규칙: `DNSPIPE_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "DNSPIPE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "DNSPIPE_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "DNSPIPE_GENERAL_PID_FILE");

        // Metrics
        override_bool(&mut self.metrics.enabled, "DNSPIPE_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "DNSPIPE_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "DNSPIPE_METRICS_PORT");

        // Suspicious
        let suspicious = &mut self.transforms.suspicious;
        override_bool(&mut suspicious.enabled, "DNSPIPE_SUSPICIOUS_ENABLED");
        override_usize(
            &mut suspicious.threshold_qname_len,
            "DNSPIPE_SUSPICIOUS_THRESHOLD_QNAME_LEN",
        );
        override_usize(
            &mut suspicious.threshold_packet_len,
            "DNSPIPE_SUSPICIOUS_THRESHOLD_PACKET_LEN",
        );
        override_usize(
            &mut suspicious.threshold_max_labels,
            "DNSPIPE_SUSPICIOUS_THRESHOLD_MAX_LABELS",
        );
        override_csv(
            &mut suspicious.common_qtypes,
            "DNSPIPE_SUSPICIOUS_COMMON_QTYPES",
        );

        // Normalize
        override_bool(
            &mut self.transforms.normalize.qname_lowercase,
            "DNSPIPE_NORMALIZE_QNAME_LOWERCASE",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), DnspipeError> {
        one_of(
            "general.log_level",
            &self.general.log_level,
            &["trace", "debug", "info", "warn", "error"],
        )?;
        one_of(
            "general.log_format",
            &self.general.log_format,
            &["json", "pretty"],
        )?;

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must be non-zero when metrics are enabled"));
        }

        let mut names = HashSet::new();
        for (idx, collector) in self.collectors.iter().enumerate() {
            collector.validate(idx)?;
            if !names.insert(collector.name.as_str()) {
                return Err(invalid(
                    &format!("collectors[{idx}].name"),
                    &format!("duplicate name '{}'", collector.name),
                ));
            }
        }

        for (idx, sink) in self.sinks.iter().enumerate() {
            sink.validate(idx)?;
            if !names.insert(sink.name.as_str()) {
                return Err(invalid(
                    &format!("sinks[{idx}].name"),
                    &format!("duplicate name '{}'", sink.name),
                ));
            }
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열이면 생성하지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: String::new(),
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
    /// 스크레이프 경로 (`/metrics`만 지원)
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9153,
            endpoint: "/metrics".to_owned(),
        }
    }
}

/// 변환기 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformsConfig {
    /// 의심 트래픽 탐지
    #[serde(default)]
    pub suspicious: SuspiciousTransformConfig,
    /// 도메인 정규화
    #[serde(default)]
    pub normalize: NormalizeTransformConfig,
}

/// 의심 트래픽 탐지 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspiciousTransformConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 도메인 길이 임계값 (0이면 판정하지 않음)
    pub threshold_qname_len: usize,
    /// 패킷 길이 임계값 (0이면 판정하지 않음)
    pub threshold_packet_len: usize,
    /// 레이블 수 임계값 (0이면 판정하지 않음)
    pub threshold_max_labels: usize,
    /// 일반적인 레코드 타입 목록
    pub common_qtypes: Vec<String>,
}

impl Default for SuspiciousTransformConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold_qname_len: 100,
            threshold_packet_len: 1000,
            threshold_max_labels: 10,
            common_qtypes: DEFAULT_COMMON_QTYPES
                .iter()
                .map(|q| (*q).to_owned())
                .collect(),
        }
    }
}

/// 도메인 정규화 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeTransformConfig {
    /// qname을 소문자로 변환
    pub qname_lowercase: bool,
}

/// 수집기 인스턴스 설정 (`[[collectors]]`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorInstanceConfig {
    /// 수집기 이름 (레코드의 `collector` 필드, 로그 필드)
    pub name: String,
    /// 페이로드 형식 (powerdns, dns)
    pub mode: String,
    /// 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_ip: String,
    /// 수신 포트 (0이면 임의 포트)
    pub listen_port: u16,
    /// TLS 사용 여부
    pub tls_support: bool,
    /// TLS 최소 버전 레이블 (1.0, 1.1, 1.2, 1.3)
    pub tls_min_version: String,
    /// PEM 인증서 체인 경로
    pub cert_file: String,
    /// PEM 개인 키 경로
    pub key_file: String,
    /// 연결 종료 시 RST 전송 (SO_LINGER=0)
    pub reset_conn: bool,
    /// SO_RCVBUF 크기 (0이면 변경하지 않음)
    pub rcvbuf_size: usize,
    /// SO_RCVBUF 설정 실패를 치명적 에러로 처리
    pub rcvbuf_required: bool,
    /// 읽기 유휴 타임아웃 (초)
    pub read_timeout_secs: u64,
    /// 최대 프레임 크기 (바이트)
    pub max_frame_size: usize,
    /// 길이 접두어 폭 (0이면 모드 기본값, 2 또는 4)
    pub length_prefix_bytes: u8,
    /// 연결별 내부 채널 용량
    pub channel_capacity: usize,
}

impl Default for CollectorInstanceConfig {
    fn default() -> Self {
        Self {
            name: "pdns".to_owned(),
            mode: "powerdns".to_owned(),
            enabled: true,
            listen_ip: "0.0.0.0".to_owned(),
            listen_port: 6001,
            tls_support: false,
            tls_min_version: "1.2".to_owned(),
            cert_file: String::new(),
            key_file: String::new(),
            reset_conn: true,
            rcvbuf_size: 0,
            rcvbuf_required: false,
            read_timeout_secs: 5,
            max_frame_size: 65_535,
            length_prefix_bytes: 0,
            channel_capacity: 1024,
        }
    }
}

impl CollectorInstanceConfig {
    /// 수집기 설정을 검증합니다. `idx`는 에러 필드 경로에 사용됩니다.
    pub fn validate(&self, idx: usize) -> Result<(), DnspipeError> {
        let field = |name: &str| format!("collectors[{idx}].{name}");

        if self.name.is_empty() {
            return Err(invalid(&field("name"), "must not be empty"));
        }
        one_of(&field("mode"), &self.mode, COLLECTOR_MODES)?;
        one_of(
            &field("tls_min_version"),
            &self.tls_min_version,
            TLS_VERSION_LABELS,
        )?;

        if self.tls_support {
            if self.cert_file.is_empty() {
                return Err(invalid(&field("cert_file"), "required when tls_support = true"));
            }
            if self.key_file.is_empty() {
                return Err(invalid(&field("key_file"), "required when tls_support = true"));
            }
        }

        if self.read_timeout_secs == 0 {
            return Err(invalid(&field("read_timeout_secs"), "must be greater than 0"));
        }
        if self.max_frame_size == 0 {
            return Err(invalid(&field("max_frame_size"), "must be greater than 0"));
        }
        if !matches!(self.length_prefix_bytes, 0 | 2 | 4) {
            return Err(invalid(&field("length_prefix_bytes"), "must be one of: 0, 2, 4"));
        }
        if self.channel_capacity == 0 {
            return Err(invalid(&field("channel_capacity"), "must be greater than 0"));
        }

        Ok(())
    }
}

/// 싱크 인스턴스 설정 (`[[sinks]]`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkInstanceConfig {
    /// 싱크 이름
    pub name: String,
    /// 싱크 종류 (stdout)
    pub kind: String,
    /// 출력 형식 (text, json)
    pub format: String,
    /// 입력 채널 용량
    pub channel_capacity: usize,
}

impl Default for SinkInstanceConfig {
    fn default() -> Self {
        Self {
            name: "console".to_owned(),
            kind: "stdout".to_owned(),
            format: "text".to_owned(),
            channel_capacity: 1024,
        }
    }
}

impl SinkInstanceConfig {
    /// 싱크 설정을 검증합니다.
    pub fn validate(&self, idx: usize) -> Result<(), DnspipeError> {
        let field = |name: &str| format!("sinks[{idx}].{name}");

        if self.name.is_empty() {
            return Err(invalid(&field("name"), "must not be empty"));
        }
        one_of(&field("kind"), &self.kind, SINK_KINDS)?;
        one_of(&field("format"), &self.format, SINK_FORMATS)?;
        if self.channel_capacity == 0 {
            return Err(invalid(&field("channel_capacity"), "must be greater than 0"));
        }
        Ok(())
    }
}

// --- 검증 헬퍼 ---

fn invalid(field: &str, reason: &str) -> DnspipeError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
    .into()
}

fn one_of(field: &str, value: &str, allowed: &[&str]) -> Result<(), DnspipeError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(invalid(
            field,
            &format!("'{value}' must be one of: {}", allowed.join(", ")),
        ))
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = DnspipeConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert!(!config.metrics.enabled);
        assert!(!config.transforms.suspicious.enabled);
        assert_eq!(config.transforms.suspicious.threshold_qname_len, 100);
        assert_eq!(config.transforms.suspicious.threshold_packet_len, 1000);
        assert_eq!(config.transforms.suspicious.threshold_max_labels, 10);
        assert_eq!(config.transforms.suspicious.common_qtypes.len(), 13);
        assert!(config.collectors.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn parse_empty_toml_uses_defaults() {
        let config = DnspipeConfig::parse("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert!(config.sinks.is_empty());
    }

    #[test]
    fn parse_collectors_and_sinks() {
        let toml = r#"
[general]
log_level = "debug"

[transforms.suspicious]
enabled = true
threshold_max_labels = 4

[[collectors]]
name = "pdns"
mode = "powerdns"
listen_port = 6001

[[collectors]]
name = "raw"
mode = "dns"
listen_ip = "127.0.0.1"
listen_port = 5353
tls_support = true
tls_min_version = "1.3"
cert_file = "/etc/dnspipe/cert.pem"
key_file = "/etc/dnspipe/key.pem"

[[sinks]]
name = "console"
format = "json"
"#;
        let config = DnspipeConfig::parse(toml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.general.log_level, "debug");
        assert!(config.transforms.suspicious.enabled);
        assert_eq!(config.transforms.suspicious.threshold_max_labels, 4);
        // 지정하지 않은 임계값은 기본값 유지
        assert_eq!(config.transforms.suspicious.threshold_qname_len, 100);

        assert_eq!(config.collectors.len(), 2);
        assert_eq!(config.collectors[0].read_timeout_secs, 5);
        assert!(config.collectors[0].reset_conn);
        assert_eq!(config.collectors[1].mode, "dns");
        assert_eq!(config.collectors[1].tls_min_version, "1.3");

        assert_eq!(config.sinks[0].kind, "stdout");
        assert_eq!(config.sinks[0].format, "json");
    }

    #[test]
    fn parse_invalid_toml_returns_error() {
        let err = DnspipeConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            DnspipeError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = DnspipeConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_unknown_tls_label() {
        let mut config = DnspipeConfig::default();
        config.collectors.push(CollectorInstanceConfig {
            tls_min_version: "1.4".to_owned(),
            ..Default::default()
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("collectors[0].tls_min_version"));
    }

    #[test]
    fn validate_rejects_unknown_mode() {
        let mut config = DnspipeConfig::default();
        config.collectors.push(CollectorInstanceConfig {
            mode: "dnstap".to_owned(),
            ..Default::default()
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("mode"));
    }

    #[test]
    fn validate_requires_cert_for_tls() {
        let mut config = DnspipeConfig::default();
        config.collectors.push(CollectorInstanceConfig {
            tls_support: true,
            ..Default::default()
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cert_file"));
    }

    #[test]
    fn validate_rejects_duplicate_names() {
        let mut config = DnspipeConfig::default();
        config.collectors.push(CollectorInstanceConfig::default());
        config.sinks.push(SinkInstanceConfig {
            name: "pdns".to_owned(),
            ..Default::default()
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate name"));
    }

    #[test]
    fn validate_rejects_bad_length_prefix() {
        let mut config = DnspipeConfig::default();
        config.collectors.push(CollectorInstanceConfig {
            length_prefix_bytes: 3,
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_sink_format() {
        let mut config = DnspipeConfig::default();
        config.sinks.push(SinkInstanceConfig {
            format: "xml".to_owned(),
            ..Default::default()
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sinks[0].format"));
    }

    #[test]
    fn env_override_bool_invalid_keeps_original() {
        let mut val = false;
        // SAFETY: 고유한 키를 사용하며 다른 테스트와 공유하지 않습니다.
        unsafe { std::env::set_var("TEST_DNSPIPE_BOOL_BAD", "not-a-bool") };
        override_bool(&mut val, "TEST_DNSPIPE_BOOL_BAD");
        assert!(!val);
        unsafe { std::env::remove_var("TEST_DNSPIPE_BOOL_BAD") };
    }

    #[test]
    fn env_override_csv_skips_empty_items() {
        let mut val = vec!["A".to_owned()];
        // SAFETY: 고유한 키를 사용하며 다른 테스트와 공유하지 않습니다.
        unsafe { std::env::set_var("TEST_DNSPIPE_CSV", "A, AAAA,,MX") };
        override_csv(&mut val, "TEST_DNSPIPE_CSV");
        assert_eq!(val, vec!["A", "AAAA", "MX"]);
        unsafe { std::env::remove_var("TEST_DNSPIPE_CSV") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = 6001u16;
        override_u16(&mut val, "TEST_DNSPIPE_NONEXISTENT_12345");
        assert_eq!(val, 6001);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = DnspipeConfig::from_file("/nonexistent/path/dnspipe.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DnspipeError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
