//! Automatic TLS certificates from ACME (Automatic Certificate Management Environment) providers
//! such as [Let's Encrypt](https://letsencrypt.org/), and a TLS server adapter that always serves
//! the current one.
//!
//! Certificates are obtained with the [RFC 8555](https://datatracker.ietf.org/doc/html/rfc8555)
//! order flow, proving control of a single domain with the `http-01` challenge.
//!
//! # Usage
//!
//! 1. Describe the domain with an [`AcmeConfig`].
//! 1. Start a [`CertificateFetcher`] with a [`CertificateCache`]. It adopts a cached certificate
//!    if it is still fresh, otherwise it issues one before returning.
//! 1. Build a [`TlsAdapter`](tls::TlsAdapter) from the fetcher's
//!    [`resolver`](CertificateFetcher::resolver) and serve connections, for example with a
//!    [`TlsListener`](tls::TlsListener).
//!
//! The fetcher checks the certificate periodically and renews it when it gets close to expiry.
//! A failed renewal is logged and retried later; the previous certificate keeps being served.
//!
//! ## Examples
//!
//! A complete usage example is provided in the source repository:
//! [`autotls` &rarr;](https://github.com/x52dev/acme-rfc8555/blob/main/demos/autotls.rs)
//!
//! # Domain Ownership
//!
//! ACME providers issue a certificate only after the requester proves control over the domain.
//! With `http-01` this means answering
//!
//! ```text
//! http://<domain>/.well-known/acme-challenge/<token>
//! ```
//!
//! on port 80 with the challenge's key authorization. The [`AcmeDriver`] runs a
//! [`ChallengeServer`] on the configured bind address for as long as an authorization is pending.
//!
//! Lower level access to the flow is available through [`Directory`], [`Account`] and the
//! [`order`] module.
//!
//! # Rate Limits
//!
//! The ACME API provider Let's Encrypt uses [rate limits] to ensure the API is not being abused. It
//! might be tempting to put the polling intervals in [`Timings`] really low, but balance this
//! against the real risk of having access cut off.
//!
//! ## Use Staging For Development!
//!
//! Especially take care to use the Let's Encrypt staging environment for development where the rate
//! limits are more relaxed. See [`DirectoryUrl::LetsEncryptStaging`].
//!
//! [rate limits]: https://letsencrypt.org/docs/rate-limits

#![deny(rust_2018_idioms, nonstandard_style, future_incompatible)]

mod acc;
mod cache;
mod cert;
mod challenge;
mod config;
mod dir;
mod driver;
mod error;
mod fetcher;
mod jws;
mod req;
mod trans;

pub mod api;
pub mod order;
pub mod tls;


pub use crate::{
    acc::Account,
    cache::{CertificateCache, DirCache, MemoryCache},
    cert::{create_p256_key, CertificateBundle},
    challenge::{ChallengeResponder, ChallengeServer, ACME_CHALLENGE_PREFIX},
    config::{AcmeConfig, Timings, HTTP_CHALLENGE_PORT},
    dir::{Directory, DirectoryUrl},
    driver::{AcmeDriver, Issuer},
    error::{Error, Result},
    fetcher::{CertificateFetcher, RenewalOutcome},
};
