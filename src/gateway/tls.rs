//! TLS listener setup.
//!
//! The server certificate and the client CA bundle are loaded from PEM files.
//! Client certificates are always requested; `require_client_cert` decides
//! whether the handshake fails without one.  [`PeerCertAcceptor`] copies the
//! negotiated chain into a [`PeerCertificates`] request extension so the trust
//! pipeline can read it without touching the connection.

use std::io;
use std::sync::Arc;

use axum::Extension;
use axum::middleware::AddExtension;
use axum_server::accept::Accept;
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use futures::future::BoxFuture;
use rustls::ServerConfig;
use rustls::crypto::aws_lc_rs;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::server::TlsStream;
use tower::Layer;
use tracing::debug;

use crate::config::TlsConfig;
use crate::x509::PeerCertificates;
use crate::{Error, Result};

/// Build the `rustls` server configuration.
///
/// # Errors
///
/// Returns `Error::Tls` if a PEM file cannot be read, the CA bundle is empty,
/// or the certificate and key do not match.
pub fn build_server_config(config: &TlsConfig) -> Result<ServerConfig> {
    let server_certs = load_certs(&config.server_cert)?;
    let server_key = PrivateKeyDer::from_pem_file(&config.server_key).map_err(|e| {
        Error::Tls(format!("Failed to load private key from '{}': {e}", config.server_key))
    })?;

    let mut roots = rustls::RootCertStore::empty();
    for cert in load_certs(&config.ca_cert)? {
        roots
            .add(cert)
            .map_err(|e| Error::Tls(format!("Failed to add CA cert to trust store: {e}")))?;
    }

    let provider = Arc::new(aws_lc_rs::default_provider());
    let builder = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider));
    let builder = if config.require_client_cert {
        builder
    } else {
        builder.allow_unauthenticated()
    };
    let verifier = builder
        .build()
        .map_err(|e| Error::Tls(format!("Failed to build client verifier: {e}")))?;

    let mut tls = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(format!("Unsupported protocol versions: {e}")))?
        .with_client_cert_verifier(verifier)
        .with_single_cert(server_certs, server_key)
        .map_err(|e| Error::Tls(format!("TLS config error (cert/key mismatch?): {e}")))?;

    tls.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    debug!(
        server_cert = %config.server_cert,
        ca_cert = %config.ca_cert,
        require_client_cert = config.require_client_cert,
        "TLS config built"
    );

    Ok(tls)
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_file_iter(path)
        .and_then(|certs| certs.collect::<std::result::Result<Vec<_>, _>>())
        .map_err(|e| Error::Tls(format!("Failed to load certificates from '{path}': {e}")))?;

    if certs.is_empty() {
        return Err(Error::Tls(format!("No certificates found in '{path}'")));
    }
    Ok(certs)
}

/// TLS acceptor exposing the client chain as a request extension.
#[derive(Debug, Clone)]
pub struct PeerCertAcceptor {
    inner: RustlsAcceptor,
}

impl PeerCertAcceptor {
    /// Wrap a rustls server config built by [`build_server_config`].
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            inner: RustlsAcceptor::new(RustlsConfig::from_config(Arc::new(config))),
        }
    }
}

impl<I, S> Accept<I, S> for PeerCertAcceptor
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    S: Send + 'static,
{
    type Stream = TlsStream<I>;
    type Service = AddExtension<S, PeerCertificates>;
    type Future = BoxFuture<'static, io::Result<(Self::Stream, Self::Service)>>;

    fn accept(&self, stream: I, service: S) -> Self::Future {
        let acceptor = self.inner.clone();
        Box::pin(async move {
            let (stream, service) = acceptor.accept(stream, service).await?;
            let peer = PeerCertificates::new(
                stream
                    .get_ref()
                    .1
                    .peer_certificates()
                    .unwrap_or_default()
                    .iter()
                    .map(|cert| cert.as_ref().to_vec()),
            );
            debug!(chain_len = peer.len(), "TLS session established");
            Ok((stream, Extension(peer).layer(service)))
        })
    }
}
