use std::{
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use rustls::{pki_types::CertificateDer, ProtocolVersion, ServerConfig};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_rustls::{server::TlsStream, TlsAcceptor};

use super::{
    crypto_provider, verifier::PolicyVerifier, CertificateResolver, ClientCertificateMode,
    TlsAdapterOptions,
};
use crate::error::{Error, Result};

/// TLS details of an established connection.
///
/// Inserted into the connection's [`http::Extensions`] for request processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConnectionFeature {
    /// The client certificate accepted during the handshake, if one was presented.
    pub peer_certificate: Option<CertificateDer<'static>>,

    /// Intermediates sent after the client certificate.
    pub peer_chain: Vec<CertificateDer<'static>>,

    pub protocol_version: Option<ProtocolVersion>,
}

impl TlsConnectionFeature {
    fn from_stream<IO>(stream: &TlsStream<IO>) -> Self {
        let (_, session) = stream.get_ref();

        let (peer_certificate, peer_chain) = match session.peer_certificates() {
            Some([end_entity, chain @ ..]) => (Some(end_entity.clone()), chain.to_vec()),
            _ => (None, Vec::new()),
        };

        Self {
            peer_certificate,
            peer_chain,
            protocol_version: session.protocol_version(),
        }
    }
}

/// Performs server handshakes on accepted connections.
#[derive(Clone)]
pub struct TlsAdapter {
    acceptor: TlsAcceptor,
    handshake_timeout: Duration,
}

impl TlsAdapter {
    pub fn new(resolver: CertificateResolver, options: TlsAdapterOptions) -> Result<Self> {
        let provider = crypto_provider();

        let builder = ServerConfig::builder_with_provider(Arc::clone(&provider))
            .with_protocol_versions(&options.protocol_versions)
            .map_err(|err| Error::config(format!("TLS protocol versions: {err}")))?;

        let builder = match options.client_certificate_mode {
            ClientCertificateMode::NoCertificate => builder.with_no_client_auth(),
            ClientCertificateMode::AllowCertificate | ClientCertificateMode::RequireCertificate => {
                let verifier = PolicyVerifier::new(&options, provider)?;
                builder.with_client_cert_verifier(Arc::new(verifier))
            }
        };

        let config = builder.with_cert_resolver(Arc::new(resolver));

        Ok(Self {
            acceptor: TlsAcceptor::from(Arc::new(config)),
            handshake_timeout: options.handshake_timeout,
        })
    }

    /// Handshake on `stream`.
    ///
    /// Never fails: a handshake that errors or exceeds the timeout yields a closed connection.
    pub async fn adapt<IO>(&self, stream: IO) -> AdaptedConnection<IO>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        match tokio::time::timeout(self.handshake_timeout, self.acceptor.accept(stream)).await {
            Ok(Ok(stream)) => {
                let feature = TlsConnectionFeature::from_stream(&stream);
                log::debug!(
                    "TLS handshake complete ({:?}, client certificate: {})",
                    feature.protocol_version,
                    feature.peer_certificate.is_some()
                );

                let mut extensions = http::Extensions::new();
                extensions.insert(feature);

                AdaptedConnection {
                    state: State::Tls(Box::new(stream)),
                    extensions,
                }
            }

            Ok(Err(err)) => {
                log::debug!("TLS handshake failed: {err}");
                AdaptedConnection::closed()
            }

            Err(_) => {
                log::warn!("TLS handshake timed out after {:?}", self.handshake_timeout);
                AdaptedConnection::closed()
            }
        }
    }
}

enum State<IO> {
    Tls(Box<TlsStream<IO>>),
    Closed,
}

/// An accepted connection after the handshake.
///
/// A failed handshake produces a closed connection: reads report end-of-stream and writes fail
/// with [`io::ErrorKind::NotConnected`].
pub struct AdaptedConnection<IO> {
    state: State<IO>,
    extensions: http::Extensions,
}

impl<IO> AdaptedConnection<IO> {
    fn closed() -> Self {
        Self {
            state: State::Closed,
            extensions: http::Extensions::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    /// TLS details; `None` for a closed connection.
    pub fn tls_feature(&self) -> Option<&TlsConnectionFeature> {
        self.extensions.get()
    }

    /// Connection-scoped features for request processing.
    pub fn extensions(&self) -> &http::Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut http::Extensions {
        &mut self.extensions
    }
}

impl<IO: AsyncRead + AsyncWrite + Unpin> AsyncRead for AdaptedConnection<IO> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().state {
            State::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
            State::Closed => Poll::Ready(Ok(())),
        }
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "TLS handshake did not complete")
}

impl<IO: AsyncRead + AsyncWrite + Unpin> AsyncWrite for AdaptedConnection<IO> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().state {
            State::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
            State::Closed => Poll::Ready(Err(not_connected())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().state {
            State::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
            State::Closed => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().state {
            State::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
            State::Closed => Poll::Ready(Ok(())),
        }
    }
}
