use std::{fmt, sync::Arc};

use rustls::{
    client::danger::HandshakeSignatureValid,
    crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider},
    pki_types::{CertificateDer, UnixTime},
    server::{
        danger::{ClientCertVerified, ClientCertVerifier},
        WebPkiClientVerifier,
    },
    CertificateError, DigitallySignedStruct, DistinguishedName, SignatureScheme,
};

use super::{ClientCertificateMode, ClientCertificateValidator, TlsAdapterOptions};
use crate::error::{Error, Result};

/// Applies the adapter's client certificate policy.
///
/// Chain validation is delegated to webpki when roots are configured; the policy validator then
/// decides, given the validation outcome.
pub(crate) struct PolicyVerifier {
    mandatory: bool,
    chain_verifier: Option<Arc<dyn ClientCertVerifier>>,
    validator: Arc<dyn ClientCertificateValidator>,
    provider: Arc<CryptoProvider>,
}

impl PolicyVerifier {
    pub(crate) fn new(options: &TlsAdapterOptions, provider: Arc<CryptoProvider>) -> Result<Self> {
        let chain_verifier = match &options.client_ca_roots {
            Some(roots) => {
                let mut builder =
                    WebPkiClientVerifier::builder_with_provider(Arc::clone(roots), Arc::clone(&provider));

                if options.check_certificate_revocation {
                    builder = builder.with_crls(options.crls.iter().cloned());
                }

                let verifier = builder.build().map_err(|err| {
                    Error::config(format!("client certificate verifier: {err}"))
                })?;

                Some(verifier as Arc<dyn ClientCertVerifier>)
            }
            None => None,
        };

        if options.check_certificate_revocation && options.crls.is_empty() {
            log::warn!("certificate revocation checking requested but no CRLs configured");
        }

        Ok(Self {
            mandatory: options.client_certificate_mode == ClientCertificateMode::RequireCertificate,
            chain_verifier,
            validator: options.validator(),
            provider,
        })
    }
}

impl ClientCertVerifier for PolicyVerifier {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        self.mandatory
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        match &self.chain_verifier {
            Some(verifier) => verifier.root_hint_subjects(),
            None => &[],
        }
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        let errors = match &self.chain_verifier {
            Some(verifier) => verifier
                .verify_client_cert(end_entity, intermediates, now)
                .err(),
            None => Some(rustls::Error::InvalidCertificate(
                CertificateError::UnknownIssuer,
            )),
        };

        if self.validator.accept(end_entity, intermediates, errors.as_ref()) {
            return Ok(ClientCertVerified::assertion());
        }

        log::debug!("client certificate rejected (chain errors: {errors:?})");

        Err(errors.unwrap_or(rustls::Error::InvalidCertificate(
            CertificateError::ApplicationVerificationFailure,
        )))
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

impl fmt::Debug for PolicyVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyVerifier")
            .field("mandatory", &self.mandatory)
            .field("chain_verifier", &self.chain_verifier)
            .finish_non_exhaustive()
    }
}
