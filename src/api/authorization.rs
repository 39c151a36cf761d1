use serde::{Deserialize, Serialize};

use crate::api;

/// The status of an [`Authorization`].
///
/// See [RFC 8555 §7.1.4].
///
/// [RFC 8555 §7.1.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.4
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    Pending,
    Valid,
    Invalid,
    Deactivated,
    Expired,
    Revoked,
}

/// An ACME authorization object: the server's record of whether the account may represent an
/// identifier.
///
/// A pending authorization lists the challenges that can still be fulfilled. Once settled it
/// lists the one that was attempted, with an `error` attached to it if validation failed.
///
/// See [RFC 8555 §7.1.4].
///
/// [RFC 8555 §7.1.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.4
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub identifier: api::Identifier,

    pub status: AuthorizationStatus,

    /// RFC 3339 time after which the server considers this authorization invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,

    pub challenges: Vec<api::Challenge>,
}

impl Authorization {
    /// Returns true once the authorization has left the `pending` state.
    pub fn is_settled(&self) -> bool {
        self.status != AuthorizationStatus::Pending
    }

    pub fn is_status_valid(&self) -> bool {
        self.status == AuthorizationStatus::Valid
    }

    /// Returns an `http-01` challenge, if one is present.
    pub fn http_challenge(&self) -> Option<&api::Challenge> {
        self.challenges.iter().find(|c| c.is_http())
    }

    /// The first validation error reported on any of the challenges.
    pub fn challenge_error(&self) -> Option<&api::Problem> {
        self.challenges.iter().find_map(|c| c.error.as_ref())
    }
}
