use std::sync::Arc;

use arc_swap::ArcSwap;
use rustls::{
    server::{ClientHello, ResolvesServerCert},
    sign::CertifiedKey,
};

use crate::cert::CertificateBundle;

/// Serves whichever bundle is active when a handshake starts.
///
/// Shares its cell with the [`CertificateFetcher`], so a renewal takes effect for the next
/// handshake without rebuilding the TLS configuration.
///
/// [`CertificateFetcher`]: crate::CertificateFetcher
#[derive(Debug, Clone)]
pub struct CertificateResolver {
    current: Arc<ArcSwap<CertificateBundle>>,
}

impl CertificateResolver {
    /// Resolver for a fixed bundle.
    pub fn new(bundle: CertificateBundle) -> Self {
        Self::from_cell(Arc::new(ArcSwap::from_pointee(bundle)))
    }

    pub(crate) fn from_cell(current: Arc<ArcSwap<CertificateBundle>>) -> Self {
        Self { current }
    }

    /// Snapshot of the active bundle.
    pub fn current(&self) -> Arc<CertificateBundle> {
        self.current.load_full()
    }
}

impl ResolvesServerCert for CertificateResolver {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(self.current.load().certified_key())
    }
}
