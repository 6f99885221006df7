//! Optional TLS wrapping of the raw TCP stream (ยง4.1B/ยง6): either normal
//! certificate validation pinned to a caller-supplied server name, or an
//! explicit, loudly-logged trust-all mode for development use.

use crate::error::ClientError;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::{
    rustls::{self, client::ServerCertVerified, client::ServerCertVerifier, Certificate, ServerName},
    TlsConnector,
};
use tracing::warn;

struct TrustAllVerifier;

impl ServerCertVerifier for TrustAllVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

fn webpki_config() -> rustls::ClientConfig {
    let mut roots = rustls::RootCertStore::empty();
    roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
        rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));
    rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth()
}

fn insecure_config() -> rustls::ClientConfig {
    let mut config = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(rustls::RootCertStore::empty())
        .with_no_client_auth();
    config.dangerous().set_certificate_verifier(Arc::new(TrustAllVerifier));
    config
}

/// Wraps `stream` in a TLS client connection, validating the server's
/// certificate against `server_name` unless `insecure_trust_all` is set.
pub async fn connect(
    stream: TcpStream,
    server_name: &str,
    insecure_trust_all: bool,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>, ClientError> {
    if insecure_trust_all {
        warn!(server_name, "TLS certificate validation disabled (insecure_trust_all)");
    }
    let config = if insecure_trust_all { insecure_config() } else { webpki_config() };
    let connector = TlsConnector::from(Arc::new(config));
    let name = ServerName::try_from(server_name).map_err(|_| {
        ClientError::Tls(format!("invalid server name for TLS validation: {server_name}"))
    })?;
    connector
        .connect(name, stream)
        .await
        .map_err(|e| ClientError::Tls(e.to_string()))
}
