use base64::prelude::*;
use serde::{Deserialize, Serialize};

use crate::api;

/// The status of an [`Order`].
///
/// See [RFC 8555 §7.1.3].
///
/// [RFC 8555 §7.1.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Ready,
    Processing,
    Valid,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    Dns,
}

/// The subject of an order or authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub kind: IdentifierKind,
    pub value: String,
}

impl Identifier {
    pub(crate) fn dns(value: &str) -> Self {
        Self {
            kind: IdentifierKind::Dns,
            value: value.to_owned(),
        }
    }
}

/// An ACME order object.
///
/// Tracks a request for a certificate from creation through to issuance. Orders made by this
/// crate carry a single DNS identifier.
///
/// See [RFC 8555 §7.1.3].
///
/// [RFC 8555 §7.1.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.3
///
/// # Example JSON
///
/// ```json
/// {
///   "status": "pending",
///   "expires": "2024-04-09T08:26:43.570360537Z",
///   "identifiers": [
///     { "type": "dns", "value": "www.example.org" }
///   ],
///   "authorizations": [
///     "https://ca.test/acme/authz/YTqpYUthlVfwBncUufE8IRA2TkzZkN4eYWWLMSRqcSs"
///   ],
///   "finalize": "https://ca.test/acme/finalize/7738992/18234324"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,

    /// RFC 3339 time after which the server considers this order invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,

    pub identifiers: Vec<Identifier>,

    /// Why the order became invalid, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<api::Problem>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorizations: Vec<String>,

    /// URL the CSR is posted to once all authorizations are valid.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub finalize: String,

    /// URL of the issued certificate, present once the order is `valid`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
}

impl Order {
    /// Body of a newOrder request for `domain`.
    pub(crate) fn for_domain(domain: &str) -> Self {
        Self {
            identifiers: vec![Identifier::dns(domain)],
            ..Default::default()
        }
    }

    /// Returns true if all authorizations are done and the order awaits a CSR.
    pub fn is_status_ready(&self) -> bool {
        self.status == Some(OrderStatus::Ready)
    }

    /// Returns true if the certificate has been issued.
    pub fn is_status_valid(&self) -> bool {
        self.status == Some(OrderStatus::Valid)
    }

    /// Returns true while the order waits on authorizations or on issuance.
    pub fn is_status_transient(&self) -> bool {
        matches!(
            self.status,
            None | Some(OrderStatus::Pending) | Some(OrderStatus::Processing)
        )
    }

    /// Returns all domains associated with this order.
    pub fn domains(&self) -> Vec<&str> {
        self.identifiers
            .iter()
            .map(|identifier| identifier.value.as_str())
            .collect()
    }

    /// The domain the certificate is issued for.
    pub fn primary_domain(&self) -> Option<&str> {
        self.identifiers.first().map(|id| id.value.as_str())
    }

    /// Replaces self with the server's view of the order.
    ///
    /// The server must echo back the requested identifiers. Their order is kept as requested,
    /// since some providers reorder them and that would swap the primary name.
    pub(crate) fn overwrite(&mut self, mut from_api: Self) -> eyre::Result<()> {
        if from_api.identifiers.len() != self.identifiers.len()
            || from_api
                .identifiers
                .iter()
                .any(|id| !self.identifiers.contains(id))
        {
            eyre::bail!(
                "order identifiers mismatch: requested {:?}, server answered {:?}",
                self.domains(),
                from_api.domains()
            );
        }

        from_api.identifiers = std::mem::take(&mut self.identifiers);
        *self = from_api;
        Ok(())
    }
}

/// Body of a finalize request.
///
/// See [RFC 8555 §7.4].
///
/// [RFC 8555 §7.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.4
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finalize {
    /// CSR as base64url-encoded DER, without PEM armour.
    pub csr: String,
}

impl Finalize {
    pub(crate) fn from_csr_der(der: &[u8]) -> Self {
        Self {
            csr: BASE64_URL_SAFE_NO_PAD.encode(der),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_order_body_omits_server_fields() {
        let order = Order::for_domain("example.org");
        let json = serde_json::to_string(&order).unwrap();
        assert_eq!(
            json,
            r#"{"identifiers":[{"type":"dns","value":"example.org"}]}"#
        );
        assert_eq!(order.primary_domain(), Some("example.org"));
    }

    #[test]
    fn test_overwrite_rejects_other_domains() {
        let mut order = Order::for_domain("example.org");
        assert!(order.overwrite(Order::for_domain("example.com")).is_err());

        let from_api = Order {
            status: Some(OrderStatus::Ready),
            ..Order::for_domain("example.org")
        };
        order.overwrite(from_api).unwrap();
        assert!(order.is_status_ready());
        assert!(!order.is_status_transient());
    }

    #[test]
    fn test_finalize_body_is_unpadded_base64url() {
        let finalize = Finalize::from_csr_der(&[0xfb, 0xff, 0x00]);
        assert_eq!(
            serde_json::to_string(&finalize).unwrap(),
            r#"{"csr":"-_8A"}"#
        );
    }
}
