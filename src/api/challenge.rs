use serde::{Deserialize, Serialize};

use crate::api;

/// Challenge type answered by serving a file over plain HTTP.
const HTTP_01: &str = "http-01";

/// The status of a [`Challenge`].
///
/// See [RFC 8555 §7.1.6].
///
/// [RFC 8555 §7.1.6]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.6
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Pending,
    Processing,
    Valid,
    Invalid,
}

/// An ACME challenge object.
///
/// Only `http-01` challenges are acted upon. Other types are parsed so the authorization as a
/// whole can be read, then ignored.
///
/// See [RFC 8555 §7.1.5] and [§8.3].
///
/// [RFC 8555 §7.1.5]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.5
/// [§8.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-8.3
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    #[serde(rename = "type")]
    pub kind: String,

    /// URL to which a response can be posted.
    pub url: String,

    pub status: ChallengeStatus,

    /// RFC 3339 time at which the server validated this challenge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validated: Option<String>,

    /// Why validation failed, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<api::Problem>,

    /// Random value that names the file served for `http-01`. Absent for some non-standard types.
    #[serde(default)]
    pub token: String,
}

impl Challenge {
    pub fn is_http(&self) -> bool {
        self.kind == HTTP_01
    }

    pub fn is_pending(&self) -> bool {
        self.status == ChallengeStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_challenges() {
        let challenges: Vec<Challenge> = serde_json::from_str(
            r#"[
                {
                    "type": "http-01",
                    "status": "pending",
                    "url": "https://ca.test/acme/chall/prV_B7yEyA4",
                    "token": "DGyRejmCefe7v4NfDGDKfA"
                },
                {
                    "type": "dns-01",
                    "status": "valid",
                    "url": "https://ca.test/acme/chall/Rg5dV14Gh1Q",
                    "token": "evaGxfADs6pSRb2LAv9IZf17Dt3juxGJ-PCt92wr-oA",
                    "validated": "2024-04-02T12:00:00Z"
                }
            ]"#,
        )
        .unwrap();

        assert!(challenges[0].is_http());
        assert!(challenges[0].is_pending());
        assert!(!challenges[1].is_http());
        assert!(challenges[1].validated.is_some());
    }
}
