use serde::{Deserialize, Serialize};

/// The status of an [`Account`].
///
/// See [RFC 8555 §7.1.6].
///
/// [RFC 8555 §7.1.6]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.6
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Valid,
    Deactivated,
    Revoked,
}

/// An ACME account resource, as returned by the server.
///
/// See [RFC 8555 §7.1.2].
///
/// [RFC 8555 §7.1.2]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.2
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub status: AccountStatus,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contact: Vec<String>,

    #[serde(default)]
    pub terms_of_service_agreed: bool,

    /// URL of the account's order list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orders: Option<String>,
}

impl Account {
    pub fn is_status_valid(&self) -> bool {
        self.status == AccountStatus::Valid
    }
}

/// Body of a newAccount request.
///
/// The terms of service are always agreed to; a server with mandatory terms refuses the request
/// otherwise.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewAccount {
    #[serde(skip_serializing_if = "Option::is_none")]
    contact: Option<Vec<String>>,
    terms_of_service_agreed: bool,
}

impl NewAccount {
    pub(crate) fn agreeing_to_terms(contact: Option<Vec<String>>) -> Self {
        Self {
            contact,
            terms_of_service_agreed: true,
        }
    }
}
