use std::{sync::Arc, time::Duration};

use crate::{acc::AccountInner, api};

/// An authorization ([ownership proof]) for a domain name.
///
/// The authorization must be progressed to a valid state before the ACME API will issue a
/// certificate. It may already be valid if ownership was proven recently with the same account;
/// the ACME API decides.
///
/// Only the [HTTP] challenge is handled here: a text file served over plain HTTP from the domain
/// being authorized.
///
/// [ownership proof]: crate#domain-ownership
/// [HTTP]: Auth::http_challenge
#[derive(Debug)]
pub struct Auth {
    inner: Arc<AccountInner>,
    api_auth: api::Authorization,
    auth_url: String,
}

impl Auth {
    pub(crate) fn new(
        inner: &Arc<AccountInner>,
        api_auth: api::Authorization,
        auth_url: &str,
    ) -> Self {
        Auth {
            inner: Arc::clone(inner),
            api_auth,
            auth_url: auth_url.to_owned(),
        }
    }

    /// Domain name for this authorization.
    pub fn domain_name(&self) -> &str {
        &self.api_auth.identifier.value
    }

    /// Whether we actually need to do the authorization. This might not be needed if we have
    /// proven ownership of the domain recently in a previous order.
    pub fn need_challenge(&self) -> bool {
        !self.api_auth.is_status_valid()
    }

    /// Get the http challenge.
    ///
    /// The http challenge must be placed so it is accessible under:
    ///
    /// ```text
    /// http://<domain-to-be-proven>/.well-known/acme-challenge/<token>
    /// ```
    ///
    /// The challenge will be accessed over HTTP (not HTTPS), for obvious reasons.
    pub fn http_challenge(&self) -> Option<Challenge> {
        self.api_auth.http_challenge().map(|c| Challenge {
            inner: Arc::clone(&self.inner),
            api_challenge: c.clone(),
        })
    }

    /// Polls the authorization until it transitions out of the `pending` state.
    ///
    /// This loops for as long as the server keeps reporting `pending`; callers bound it with a
    /// timeout.
    pub async fn poll_until_settled(&self, delay: Duration) -> eyre::Result<api::Authorization> {
        loop {
            let auth = self
                .inner
                .transport
                .post_as_get(&self.auth_url)
                .await?
                .json::<api::Authorization>()
                .await?;

            if auth.is_settled() {
                if let Some(error) = auth.challenge_error() {
                    log::debug!(
                        "authorization for {} settled as {:?}: {error}",
                        auth.identifier.value,
                        auth.status
                    );
                }

                return Ok(auth);
            }

            tokio::time::sleep(delay).await;
        }
    }

    /// Returns a reference to the authorization's API object.
    ///
    /// Useful for debugging.
    pub fn api_auth(&self) -> &api::Authorization {
        &self.api_auth
    }
}

/// An HTTP challenge as obtained from the [`Auth`].
///
/// See [RFC 8555 §8.3].
///
/// [RFC 8555 §8.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-8.3
pub struct Challenge {
    inner: Arc<AccountInner>,
    api_challenge: api::Challenge,
}

impl Challenge {
    /// Returns the token, a unique identifier of the challenge.
    ///
    /// This is used as the file name in the HTTP challenge like so:
    ///
    /// ```text
    /// http://<domain-to-be-proven>/.well-known/acme-challenge/<token>
    /// ```
    pub fn http_token(&self) -> &str {
        &self.api_challenge.token
    }

    /// Returns the key authorization, the content to serve under the token path.
    ///
    /// This is `token || '.' || base64url(Thumbprint(accountKey))`, see [RFC 8555 §8.1].
    ///
    /// [RFC 8555 §8.1]: https://datatracker.ietf.org/doc/html/rfc8555#section-8.1
    pub fn http_proof(&self) -> eyre::Result<String> {
        let thumbprint = self.inner.transport.acme_key().thumbprint()?;
        Ok(format!("{}.{thumbprint}", self.api_challenge.token))
    }

    /// Returns true if this challenge needs validation.
    ///
    /// It might already been done in a previous order for the same account.
    pub fn need_validate(&self) -> bool {
        self.api_challenge.is_pending()
    }

    /// Tells the ACME API to attempt to validate the proof of this challenge.
    ///
    /// The proof must be servable before this call. The outcome is observed by polling the
    /// authorization with [`Auth::poll_until_settled`].
    pub async fn validate(&self) -> eyre::Result<()> {
        let res = self
            .inner
            .transport
            .call_kid(&self.api_challenge.url, &api::EmptyObject)
            .await?;

        let api_challenge = res.json::<api::Challenge>().await?;
        log::debug!("challenge {} is {:?}", api_challenge.token, api_challenge.status);

        Ok(())
    }

    /// Returns a reference to the challenge's API object.
    ///
    /// Useful for debugging.
    pub fn api_challenge(&self) -> &api::Challenge {
        &self.api_challenge
    }
}
