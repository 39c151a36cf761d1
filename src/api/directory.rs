use serde::{Deserialize, Serialize};

/// Directory object for ACME client self-configuration.
///
/// Only the resources used to obtain a certificate are kept; revocation and key roll-over URLs
/// are ignored when parsing.
///
/// See [RFC 8555 §7.1.1].
///
/// [RFC 8555 §7.1.1]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    pub new_nonce: String,
    pub new_account: String,
    pub new_order: String,

    #[serde(default)]
    pub meta: DirectoryMeta,
}

/// See [RFC 8555 §9.7.6](https://datatracker.ietf.org/doc/html/rfc8555#section-9.7.6).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryMeta {
    /// URL identifying the current terms of service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_of_service: Option<String>,

    /// Set when every newAccount request must carry an external account binding.
    #[serde(default)]
    pub external_account_required: bool,
}
