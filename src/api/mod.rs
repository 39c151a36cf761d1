//! JSON API payloads.
//!
//! Not intended to be used directly. Provided to aid debugging.

use std::fmt;

use serde::{
    ser::{SerializeMap as _, Serializer},
    Deserialize, Serialize,
};

mod account;
mod authorization;
mod challenge;
mod directory;
mod order;

pub(crate) use self::account::NewAccount;
pub use self::{
    account::{Account, AccountStatus},
    authorization::{Authorization, AuthorizationStatus},
    challenge::{Challenge, ChallengeStatus},
    directory::{Directory, DirectoryMeta},
    order::{Finalize, Identifier, IdentifierKind, Order, OrderStatus},
};

/// Serializes to `{}`, the body that asks the server to start validating a challenge.
pub struct EmptyObject;

impl Serialize for EmptyObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_map(Some(0))?.end()
    }
}

const ACME_ERROR_NS: &str = "urn:ietf:params:acme:error:";
const LEGACY_ACME_ERROR_NS: &str = "urn:acme:error:";

/// Problem document returned by the server (RFC 7807), or synthesized for transport failures.
///
/// See [RFC 8555 §6.7].
///
/// [RFC 8555 §6.7]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.7
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// HTTP status the server answered with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subproblems: Option<Vec<Subproblem>>,
}

impl Problem {
    pub(crate) fn new(kind: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            kind: kind.into(),
            detail,
            ..Default::default()
        }
    }

    /// Error type with the ACME namespace stripped, e.g. `badNonce`.
    pub fn short_kind(&self) -> &str {
        self.kind
            .strip_prefix(ACME_ERROR_NS)
            .or_else(|| self.kind.strip_prefix(LEGACY_ACME_ERROR_NS))
            .unwrap_or(&self.kind)
    }

    /// Returns true if problem type is "badNonce".
    pub fn is_bad_nonce(&self) -> bool {
        self.short_kind() == "badNonce"
    }

    /// Returns true if problem details indicate that JWS verification failed.
    pub fn is_jws_verification_error(&self) -> bool {
        self.short_kind() == "malformed"
            && self.detail.as_deref() == Some("JWS verification error")
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subproblem {
    #[serde(rename = "type")]
    pub kind: String,
    pub detail: Option<String>,
    pub identifier: Option<Identifier>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_bad_nonce() {
        let problem: Problem = serde_json::from_str(
            r#"{"type": "urn:ietf:params:acme:error:badNonce", "detail": "JWS has an invalid anti-replay nonce", "status": 400}"#,
        )
        .unwrap();
        assert!(problem.is_bad_nonce());
        assert_eq!(problem.status, Some(400));
        assert_eq!(
            problem.to_string(),
            "urn:ietf:params:acme:error:badNonce: JWS has an invalid anti-replay nonce"
        );

        let problem = Problem::new("urn:ietf:params:acme:error:unauthorized", None);
        assert!(!problem.is_bad_nonce());
        assert_eq!(problem.short_kind(), "unauthorized");
    }

    #[test]
    fn test_problem_kinds() {
        let legacy = Problem::new(
            "urn:acme:error:malformed",
            Some("JWS verification error".to_owned()),
        );
        assert!(legacy.is_jws_verification_error());

        let other = Problem::new("httpReqError", Some("500 body: oops".to_owned()));
        assert_eq!(other.short_kind(), "httpReqError");
        assert!(!other.is_jws_verification_error());
    }

    #[test]
    fn test_api_empty_object() {
        let x = serde_json::to_string(&EmptyObject).unwrap();
        assert_eq!("{}", x);
    }
}
