#![doc = include_str!("../README.md")]

pub mod chain;
pub mod config;
pub mod error;
pub mod normalize;
pub mod suspicious;

pub use chain::TransformerChain;
pub use config::{NormalizeConfig, SuspiciousConfig, SuspiciousConfigBuilder, TransformConfig};
pub use error::TransformError;
pub use normalize::QnameLowercase;
pub use suspicious::SuspiciousDetector;
