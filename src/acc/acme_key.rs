use base64::prelude::*;
use p256::ecdsa::SigningKey;
use sha2::{Digest as _, Sha256};

use crate::jws::{Jwk, JwkThumb};

/// Account key pair, plus the account URL once the server has assigned one.
#[derive(Clone, Debug)]
pub(crate) struct AcmeKey {
    signing_key: SigningKey,
    key_id: Option<String>,
}

impl AcmeKey {
    pub(crate) fn new() -> AcmeKey {
        AcmeKey {
            signing_key: crate::cert::create_p256_key(),
            key_id: None,
        }
    }

    /// Account URL, used as `kid` in every request after newAccount.
    pub(crate) fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    pub(crate) fn set_key_id(&mut self, kid: String) {
        self.key_id = Some(kid)
    }

    /// Public half of the key as an ES256 JWK.
    pub(crate) fn jwk(&self) -> eyre::Result<Jwk> {
        let point = self.signing_key.verifying_key().to_encoded_point(false);

        let (Some(x), Some(y)) = (point.x(), point.y()) else {
            eyre::bail!("public key point has no affine coordinates");
        };

        Ok(Jwk::es256(
            BASE64_URL_SAFE_NO_PAD.encode(x),
            BASE64_URL_SAFE_NO_PAD.encode(y),
        ))
    }

    /// JWK thumbprint, see [RFC 7638].
    ///
    /// [RFC 7638]: https://datatracker.ietf.org/doc/html/rfc7638
    pub(crate) fn thumbprint(&self) -> eyre::Result<String> {
        let jwk = self.jwk()?;
        let canonical = serde_json::to_string(&JwkThumb::from(&jwk))?;
        Ok(BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(canonical)))
    }

    /// ES256 signature over `message` as base64url of the raw `r || s` bytes.
    pub(crate) fn sign(&self, message: &[u8]) -> eyre::Result<String> {
        let (signature, _rec_id) = self
            .signing_key
            .sign_recoverable(message)
            .map_err(|err| eyre::eyre!("failed to sign JWS: {err}"))?;

        Ok(BASE64_URL_SAFE_NO_PAD.encode(signature.to_bytes()))
    }
}
