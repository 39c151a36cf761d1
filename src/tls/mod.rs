//! Server-side TLS for inbound connections, using the fetcher's active certificate.

use std::{fmt, sync::Arc, time::Duration};

use rustls::{
    crypto::CryptoProvider,
    pki_types::{CertificateDer, CertificateRevocationListDer},
    RootCertStore, SupportedProtocolVersion,
};

mod adapter;
mod listener;
mod resolver;
mod verifier;

pub use self::{
    adapter::{AdaptedConnection, TlsAdapter, TlsConnectionFeature},
    listener::TlsListener,
    resolver::CertificateResolver,
};

/// Crypto provider used for handshakes and key loading.
///
/// The process-wide default if one is installed, otherwise aws-lc-rs.
pub(crate) fn crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// Whether client certificates are requested during the handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClientCertificateMode {
    /// Client certificates are not requested.
    #[default]
    NoCertificate,

    /// Client certificates are requested but optional.
    AllowCertificate,

    /// Handshakes without a client certificate fail.
    RequireCertificate,
}

/// Decides whether a presented client certificate is accepted.
///
/// `chain` holds the intermediates sent after the end-entity certificate. `errors` is the outcome
/// of transport-level chain validation against the configured roots; `None` means the chain
/// validated. The validator's answer is final, even when `errors` is set.
pub trait ClientCertificateValidator: Send + Sync {
    fn accept(
        &self,
        cert: &CertificateDer<'_>,
        chain: &[CertificateDer<'_>],
        errors: Option<&rustls::Error>,
    ) -> bool;
}

/// Accepts a certificate only if its chain validated.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainValidValidator;

impl ClientCertificateValidator for ChainValidValidator {
    fn accept(
        &self,
        _cert: &CertificateDer<'_>,
        _chain: &[CertificateDer<'_>],
        errors: Option<&rustls::Error>,
    ) -> bool {
        errors.is_none()
    }
}

/// Accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAnyCertificate;

impl ClientCertificateValidator for AcceptAnyCertificate {
    fn accept(
        &self,
        _cert: &CertificateDer<'_>,
        _chain: &[CertificateDer<'_>],
        _errors: Option<&rustls::Error>,
    ) -> bool {
        true
    }
}

struct FnValidator<F>(F);

impl<F> ClientCertificateValidator for FnValidator<F>
where
    F: Fn(&CertificateDer<'_>, &[CertificateDer<'_>], Option<&rustls::Error>) -> bool
        + Send
        + Sync,
{
    fn accept(
        &self,
        cert: &CertificateDer<'_>,
        chain: &[CertificateDer<'_>],
        errors: Option<&rustls::Error>,
    ) -> bool {
        (self.0)(cert, chain, errors)
    }
}

/// Handshake settings of a [`TlsAdapter`].
#[derive(Clone)]
pub struct TlsAdapterOptions {
    pub client_certificate_mode: ClientCertificateMode,

    /// Custom validator with the final say on presented client certificates.
    pub client_certificate_validation: Option<Arc<dyn ClientCertificateValidator>>,

    /// Allowed TLS versions.
    pub protocol_versions: Vec<&'static SupportedProtocolVersion>,

    /// Check client certificates against [`crls`](Self::crls).
    pub check_certificate_revocation: bool,

    pub crls: Vec<CertificateRevocationListDer<'static>>,

    /// Roots used for transport-level validation of client certificate chains.
    ///
    /// Without roots every presented chain is reported as [`UnknownIssuer`].
    ///
    /// [`UnknownIssuer`]: rustls::CertificateError::UnknownIssuer
    pub client_ca_roots: Option<Arc<RootCertStore>>,

    pub handshake_timeout: Duration,
}

impl Default for TlsAdapterOptions {
    fn default() -> Self {
        Self {
            client_certificate_mode: ClientCertificateMode::default(),
            client_certificate_validation: None,
            protocol_versions: rustls::DEFAULT_VERSIONS.to_vec(),
            check_certificate_revocation: false,
            crls: Vec::new(),
            client_ca_roots: None,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl TlsAdapterOptions {
    pub fn with_mode(mut self, mode: ClientCertificateMode) -> Self {
        self.client_certificate_mode = mode;
        self
    }

    pub fn with_validator(mut self, validator: impl ClientCertificateValidator + 'static) -> Self {
        self.client_certificate_validation = Some(Arc::new(validator));
        self
    }

    /// Use a closure as the client certificate validator.
    pub fn with_validation_fn<F>(self, validate: F) -> Self
    where
        F: Fn(&CertificateDer<'_>, &[CertificateDer<'_>], Option<&rustls::Error>) -> bool
            + Send
            + Sync
            + 'static,
    {
        self.with_validator(FnValidator(validate))
    }

    pub fn with_client_ca_roots(mut self, roots: RootCertStore) -> Self {
        self.client_ca_roots = Some(Arc::new(roots));
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// The validator that decides on presented client certificates in the configured mode.
    pub fn validator(&self) -> Arc<dyn ClientCertificateValidator> {
        match (&self.client_certificate_mode, &self.client_certificate_validation) {
            (ClientCertificateMode::NoCertificate, _) => Arc::new(AcceptAnyCertificate),
            (_, Some(validator)) => Arc::clone(validator),
            (_, None) => Arc::new(ChainValidValidator),
        }
    }
}

impl fmt::Debug for TlsAdapterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsAdapterOptions")
            .field("client_certificate_mode", &self.client_certificate_mode)
            .field(
                "client_certificate_validation",
                &self.client_certificate_validation.is_some(),
            )
            .field("protocol_versions", &self.protocol_versions)
            .field(
                "check_certificate_revocation",
                &self.check_certificate_revocation,
            )
            .field("crls", &self.crls.len())
            .field("client_ca_roots", &self.client_ca_roots.is_some())
            .field("handshake_timeout", &self.handshake_timeout)
            .finish()
    }
}
