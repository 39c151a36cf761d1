use std::{io, time::Duration};

use crate::api::{AuthorizationStatus, OrderStatus, Problem};

/// Result alias for the fetcher, driver and listener APIs.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by certificate acquisition and listener setup.
///
/// Failures inside the ACME plumbing (HTTP, JSON, JWS) are carried as [`eyre::Report`]s in
/// [`Error::Protocol`]. Handshake failures and cache misses are never reported through this type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid setup, such as a reserved port or an unusable domain name.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The authorization reached a terminal state other than `valid`.
    #[error("authorization failed with status {status:?}")]
    AuthorizationFailed { status: AuthorizationStatus },

    /// The authorization did not leave its transient state in time.
    #[error("authorization still pending after {elapsed:?}")]
    AuthorizationTimeout { elapsed: Duration },

    /// The order did not become `ready` or, once finalized, `valid` in time.
    #[error("order still processing after {elapsed:?}")]
    OrderTimeout { elapsed: Duration },

    /// The order did not end up `valid` after finalization.
    #[error("order failed with status {status:?}")]
    OrderFailed { status: Option<OrderStatus> },

    /// The server offered no `http-01` challenge for the domain.
    #[error("no http-01 challenge offered for {domain}")]
    NoHttpChallenge { domain: String },

    #[error(transparent)]
    Protocol(#[from] eyre::Report),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }
}

impl From<Problem> for eyre::Report {
    fn from(err: Problem) -> eyre::Report {
        eyre::eyre!("{err}")
    }
}

impl From<Problem> for Error {
    fn from(err: Problem) -> Error {
        Error::Protocol(err.into())
    }
}
