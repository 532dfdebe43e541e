#![doc = include_str!("../README.md")]

pub mod collector;
pub mod config;
pub mod connection;
pub mod decoder;
pub mod error;
pub mod framer;
pub mod socket;
pub mod tls;
pub mod transport;

pub use collector::{CollectorState, DnsCollector, DnsCollectorBuilder};
pub use config::{
    CollectorConfig, CollectorConfigBuilder, CollectorMode, LengthPrefix, TlsSettings, TlsVersion,
};
pub use connection::ConnectionWorker;
pub use decoder::{DecodeContext, PayloadDecoder};
pub use error::{CollectorError, FramerError};
pub use framer::{Framer, StreamEnd, encode_frame};
