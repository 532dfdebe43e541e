#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod plugin;
pub mod record;
pub mod sink;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, DnspipeError, PipelineError, PluginError};

// 설정
pub use config::DnspipeConfig;

// 레코드
pub use record::{Record, SuspiciousBlock, SuspiciousFlag, TransformResult};

// 파이프라인 trait
pub use pipeline::{BoxFuture, HealthStatus, TransformOutcome, Transformer};

// 플러그인
pub use plugin::{
    DynPlugin, Plugin, PluginInfo, PluginKind, PluginRegistry, PluginState, PluginStatus,
};

// 팬아웃
pub use sink::SinkRegistry;
