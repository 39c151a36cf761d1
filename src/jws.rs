//! Flattened JWS request bodies, see [RFC 8555 §6.2](https://datatracker.ietf.org/doc/html/rfc8555#section-6.2).

use base64::prelude::*;
use serde::Serialize;

use crate::acc::AcmeKey;

/// Protected header of every signed request.
///
/// newAccount requests carry the public key as `jwk`. Everything after that names the account
/// URL as `kid`. The two are mutually exclusive.
#[derive(Debug, Serialize)]
pub(crate) struct JwsProtectedHeader<'a> {
    alg: &'static str,

    /// Anti-replay nonce, see [RFC 8555 §6.5].
    ///
    /// [RFC 8555 §6.5]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.5
    nonce: String,

    /// Target URL of the request, see [RFC 8555 §6.4].
    ///
    /// [RFC 8555 §6.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.4
    url: &'a str,

    #[serde(skip_serializing_if = "Option::is_none")]
    jwk: Option<Jwk>,

    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<&'a str>,
}

impl<'a> JwsProtectedHeader<'a> {
    pub(crate) fn new_jwk(jwk: Jwk, url: &'a str, nonce: String) -> Self {
        JwsProtectedHeader {
            alg: "ES256",
            nonce,
            url,
            jwk: Some(jwk),
            kid: None,
        }
    }

    pub(crate) fn new_kid(kid: &'a str, url: &'a str, nonce: String) -> Self {
        JwsProtectedHeader {
            alg: "ES256",
            nonce,
            url,
            jwk: None,
            kid: Some(kid),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub(crate) struct Jwk {
    alg: &'static str,
    crv: &'static str,
    kty: &'static str,
    #[serde(rename = "use")]
    _use: &'static str,
    x: String,
    y: String,
}

impl Jwk {
    /// P-256 public key from its base64url encoded affine coordinates.
    pub(crate) fn es256(x: String, y: String) -> Self {
        Jwk {
            alg: "ES256",
            crv: "P-256",
            kty: "EC",
            _use: "sig",
            x,
            y,
        }
    }
}

/// Required members of [`Jwk`] only, the input to the thumbprint.
#[derive(Debug, Serialize)]
// LEXICAL ORDER OF FIELDS MATTER!
pub(crate) struct JwkThumb<'a> {
    crv: &'a str,
    kty: &'a str,
    x: &'a str,
    y: &'a str,
}

impl<'a> From<&'a Jwk> for JwkThumb<'a> {
    fn from(jwk: &'a Jwk) -> Self {
        JwkThumb {
            crv: jwk.crv,
            kty: jwk.kty,
            x: &jwk.x,
            y: &jwk.y,
        }
    }
}

/// <https://datatracker.ietf.org/doc/html/rfc7515#section-7.2.2>
#[derive(Debug, Serialize)]
struct FlattenedJsonJws<'a> {
    protected: &'a str,
    payload: &'a str,
    signature: &'a str,
}

/// base64url of the JSON serialization of `body`.
pub(crate) fn encode_payload<T: Serialize + ?Sized>(body: &T) -> eyre::Result<String> {
    Ok(BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(body)?))
}

/// Sign an already encoded `payload` and serialize the result as flattened JSON.
///
/// An empty `payload` makes a POST-as-GET request, see [RFC 8555 §6.3].
///
/// [RFC 8555 §6.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.3
pub(crate) fn sign_flattened(
    protected: &JwsProtectedHeader<'_>,
    key: &AcmeKey,
    payload: &str,
) -> eyre::Result<String> {
    let protected = BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(protected)?);
    let signature = key.sign(format!("{protected}.{payload}").as_bytes())?;

    let jws = FlattenedJsonJws {
        protected: &protected,
        payload,
        signature: &signature,
    };

    Ok(serde_json::to_string(&jws)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbprint_fields_in_lexical_order() {
        let key = AcmeKey::new();
        let jwk = key.jwk().unwrap();
        let json = serde_json::to_string(&JwkThumb::from(&jwk)).unwrap();

        let crv = json.find("\"crv\"").unwrap();
        let kty = json.find("\"kty\"").unwrap();
        let x = json.find("\"x\"").unwrap();
        let y = json.find("\"y\"").unwrap();
        assert!(crv < kty && kty < x && x < y);
        assert!(json.starts_with(r#"{"crv":"P-256","kty":"EC","#));
    }

    #[test]
    fn test_post_as_get_is_flattened_json() {
        let key = AcmeKey::new();
        let protected = JwsProtectedHeader::new_jwk(
            key.jwk().unwrap(),
            "https://example.com/acme/new-acct",
            "nonce".to_owned(),
        );

        let jws = sign_flattened(&protected, &key, "").unwrap();
        let jws: serde_json::Value = serde_json::from_str(&jws).unwrap();

        assert_eq!(jws["payload"], "");
        assert_eq!(jws["signature"].as_str().map(str::len), Some(86));

        let header = BASE64_URL_SAFE_NO_PAD
            .decode(jws["protected"].as_str().unwrap())
            .unwrap();
        let header: serde_json::Value = serde_json::from_slice(&header).unwrap();
        assert_eq!(header["alg"], "ES256");
        assert_eq!(header["jwk"]["crv"], "P-256");
        assert!(header.get("kid").is_none());
    }

    #[test]
    fn test_kid_header() {
        let protected = JwsProtectedHeader::new_kid(
            "https://example.com/acme/acct/1",
            "https://example.com/acme/new-order",
            "nonce".to_owned(),
        );
        let json = serde_json::to_value(&protected).unwrap();
        assert_eq!(json["kid"], "https://example.com/acme/acct/1");
        assert!(json.get("jwk").is_none());
    }

    #[test]
    fn test_payload_encoding() {
        assert_eq!(encode_payload(&serde_json::json!({})).unwrap(), "e30");
    }
}
