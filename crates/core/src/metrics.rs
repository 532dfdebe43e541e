//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()` 매크로를 호출합니다.
//! 레코더가 설치되지 않은 경우 매크로 호출은 아무것도 하지 않습니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `dnspipe_`
//! - 모듈명: `collector_`, `transform_`, `sink_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds`, 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use dnspipe_core::metrics as m;
//!
//! metrics::counter!(m::COLLECTOR_FRAMES_TOTAL, m::LABEL_COLLECTOR => "pdns").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 수집기 이름 레이블 키
pub const LABEL_COLLECTOR: &str = "collector";

/// 싱크 이름 레이블 키
pub const LABEL_SINK: &str = "sink";

/// 에러 종류 레이블 키 (timeout, eof, frame, io, tls)
pub const LABEL_REASON: &str = "reason";

// ─── Collector 메트릭 ──────────────────────────────────────────────

/// Collector: 수락한 연결 수 (counter, label: collector)
pub const COLLECTOR_CONNECTIONS_TOTAL: &str = "dnspipe_collector_connections_total";

/// Collector: 현재 열린 연결 수 (gauge, label: collector)
pub const COLLECTOR_ACTIVE_CONNECTIONS: &str = "dnspipe_collector_active_connections";

/// Collector: 수신한 프레임 수 (counter, label: collector)
pub const COLLECTOR_FRAMES_TOTAL: &str = "dnspipe_collector_frames_total";

/// Collector: 수신한 페이로드 바이트 수 (counter, label: collector)
pub const COLLECTOR_BYTES_TOTAL: &str = "dnspipe_collector_bytes_total";

/// Collector: 디코딩 실패 페이로드 수 (counter, label: collector)
pub const COLLECTOR_MALFORMED_TOTAL: &str = "dnspipe_collector_malformed_total";

/// Collector: 연결을 종료시킨 전송 에러 수 (counter, labels: collector, reason)
pub const COLLECTOR_TRANSPORT_ERRORS_TOTAL: &str = "dnspipe_collector_transport_errors_total";

// ─── Transform 메트릭 ──────────────────────────────────────────────

/// Transform: 점수가 0보다 큰 레코드 수 (counter)
pub const TRANSFORM_SUSPICIOUS_TOTAL: &str = "dnspipe_transform_suspicious_total";

/// Transform: 체인이 버린 레코드 수 (counter)
pub const TRANSFORM_DROPPED_TOTAL: &str = "dnspipe_transform_dropped_total";

// ─── Sink 메트릭 ───────────────────────────────────────────────────

/// Sink: 전달된 레코드 수 (counter, label: sink)
pub const SINK_RECORDS_SENT_TOTAL: &str = "dnspipe_sink_records_sent_total";

/// Sink: 닫힌 싱크로의 전송 실패 수 (counter, label: sink)
pub const SINK_SEND_FAILURES_TOTAL: &str = "dnspipe_sink_send_failures_total";

// ─── Daemon 메트릭 ─────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "dnspipe_daemon_uptime_seconds";

/// Daemon: 등록된 플러그인 수 (gauge)
pub const DAEMON_PLUGINS_REGISTERED: &str = "dnspipe_daemon_plugins_registered";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "dnspipe_daemon_build_info";

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    // Collector
    describe_counter!(
        COLLECTOR_CONNECTIONS_TOTAL,
        "Total number of producer connections accepted"
    );
    describe_gauge!(
        COLLECTOR_ACTIVE_CONNECTIONS,
        "Number of producer connections currently open"
    );
    describe_counter!(
        COLLECTOR_FRAMES_TOTAL,
        "Total number of length-prefixed frames received"
    );
    describe_counter!(COLLECTOR_BYTES_TOTAL, "Total payload bytes received");
    describe_counter!(
        COLLECTOR_MALFORMED_TOTAL,
        "Total number of payloads that failed to decode"
    );
    describe_counter!(
        COLLECTOR_TRANSPORT_ERRORS_TOTAL,
        "Total number of connections terminated by a transport error"
    );

    // Transform
    describe_counter!(
        TRANSFORM_SUSPICIOUS_TOTAL,
        "Total number of records with a non-zero suspicious score"
    );
    describe_counter!(
        TRANSFORM_DROPPED_TOTAL,
        "Total number of records dropped by the transformer chain"
    );

    // Sink
    describe_counter!(
        SINK_RECORDS_SENT_TOTAL,
        "Total number of records delivered to a sink"
    );
    describe_counter!(
        SINK_SEND_FAILURES_TOTAL,
        "Total number of records not delivered because the sink was closed"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "dnspipe daemon uptime in seconds");
    describe_gauge!(
        DAEMON_PLUGINS_REGISTERED,
        "Number of plugins registered in the daemon"
    );
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}
