//! TLS 리스너 설정
//!
//! PEM 인증서 체인과 개인 키(PKCS#8, PKCS#1, SEC1)를 읽어 [`TlsAcceptor`]를 만듭니다.
//! 로딩 실패는 치명적 에러이며 평문으로 대체하지 않습니다.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;

use crate::config::TlsSettings;
use crate::error::CollectorError;

/// TLS 설정에서 acceptor를 생성합니다.
pub fn load_acceptor(settings: &TlsSettings) -> Result<TlsAcceptor, CollectorError> {
    let certs = load_certs(&settings.cert_file)?;
    let key = load_private_key(&settings.key_file)?;

    if settings.min_version.is_below_floor() {
        tracing::warn!(
            requested = %settings.min_version,
            effective = "1.2",
            "tls minimum version raised to the lowest supported version"
        );
    }

    let versions = settings.min_version.protocol_versions();
    let server_config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_protocol_versions(&versions)
            .map_err(|e| CollectorError::Tls(format!("protocol versions: {e}")))?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| CollectorError::Tls(format!("invalid certificate/key pair: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, CollectorError> {
    let file = File::open(path)
        .map_err(|e| CollectorError::Tls(format!("{}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            CollectorError::Tls(format!("{}: failed to parse certificate: {e}", path.display()))
        })?;

    if certs.is_empty() {
        return Err(CollectorError::Tls(format!(
            "{}: no certificates found",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, CollectorError> {
    let file = File::open(path)
        .map_err(|e| CollectorError::Tls(format!("{}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| {
            CollectorError::Tls(format!("{}: failed to parse private key: {e}", path.display()))
        })?
        .ok_or_else(|| CollectorError::Tls(format!("{}: no private key found", path.display())))
}
