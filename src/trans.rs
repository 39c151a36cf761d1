use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;
use serde::Serialize;

use crate::{
    acc::AcmeKey,
    jws::{self, JwsProtectedHeader},
    req::{req_expect_header, req_handle_error, req_head, req_post},
};

/// Attempts at a single call before a persistent `badNonce` is reported.
const MAX_NONCE_RETRIES: usize = 5;

/// JWS payload and nonce handling for requests to the API.
///
/// Setup is:
///
/// 1. `Transport::new()`
/// 2. `call_jwk()` against newAccount url
/// 3. `set_key_id` from the returned `Location` header.
/// 4. `call_kid()` or `post_as_get()` for all calls after that.
#[derive(Clone, Debug)]
pub(crate) struct Transport {
    acme_key: AcmeKey,
    nonce_pool: Arc<NoncePool>,
}

impl Transport {
    pub fn new(nonce_pool: Arc<NoncePool>, acme_key: AcmeKey) -> Self {
        Transport {
            acme_key,
            nonce_pool,
        }
    }

    /// Update the key ID once it is known (part of setting up the transport).
    pub fn set_key_id(&mut self, kid: String) {
        self.acme_key.set_key_id(kid);
    }

    /// The key used in the transport
    pub fn acme_key(&self) -> &AcmeKey {
        &self.acme_key
    }

    /// Make call using the full JWK.
    ///
    /// Only needed for the first newAccount request.
    pub async fn call_jwk<T>(&self, url: &str, body: &T) -> eyre::Result<reqwest::Response>
    where
        T: Serialize + ?Sized,
    {
        let payload = jws::encode_payload(body)?;

        self.do_call(url, &payload, |url, nonce, key| {
            Ok(JwsProtectedHeader::new_jwk(key.jwk()?, url, nonce))
        })
        .await
    }

    /// Make call using the key ID.
    pub async fn call_kid<T>(&self, url: &str, body: &T) -> eyre::Result<reqwest::Response>
    where
        T: Serialize + ?Sized,
    {
        let payload = jws::encode_payload(body)?;
        self.do_call(url, &payload, protected_with_kid).await
    }

    /// Fetch a resource with an empty signed payload, see [RFC 8555 §6.3].
    ///
    /// [RFC 8555 §6.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.3
    pub async fn post_as_get(&self, url: &str) -> eyre::Result<reqwest::Response> {
        self.do_call(url, "", protected_with_kid).await
    }

    async fn do_call<F>(
        &self,
        url: &str,
        payload: &str,
        make_protected: F,
    ) -> eyre::Result<reqwest::Response>
    where
        F: for<'a> Fn(&'a str, String, &'a AcmeKey) -> eyre::Result<JwsProtectedHeader<'a>>,
    {
        let mut attempt = 0;

        // The ACME API may at any point invalidate all nonces. If we detect such an
        // error, we retry with a fresh nonce a bounded number of times.
        loop {
            attempt += 1;

            // Either get a new nonce, or reuse one from a previous request.
            let nonce = self.nonce_pool.get_nonce().await?;

            let protected = make_protected(url, nonce, &self.acme_key)?;
            let body = jws::sign_flattened(&protected, &self.acme_key, payload)?;

            log::debug!("Call endpoint: {url}");

            let response = req_post(url, body).await;

            // Regardless of the request being a success or not, there might be a nonce in the
            // response.
            if let Ok(response) = &response {
                self.nonce_pool.extract_nonce(response);
            }

            // Turn errors into Problem.
            let result = req_handle_error(response).await;

            if let Err(problem) = &result {
                if attempt < MAX_NONCE_RETRIES
                    && (problem.is_bad_nonce() || problem.is_jws_verification_error())
                {
                    log::debug!("Retrying on: {problem}");
                    continue;
                }
            }

            return Ok(result?);
        }
    }
}

fn protected_with_kid<'a>(
    url: &'a str,
    nonce: String,
    key: &'a AcmeKey,
) -> eyre::Result<JwsProtectedHeader<'a>> {
    let kid = key
        .key_id()
        .ok_or_else(|| eyre::eyre!("account key ID is not known yet"))?;
    Ok(JwsProtectedHeader::new_kid(kid, url, nonce))
}

/// Shared pool of nonces.
#[derive(Default, Debug)]
pub(crate) struct NoncePool {
    nonce_url: String,
    pool: Mutex<VecDeque<String>>,
}

impl NoncePool {
    pub fn new(nonce_url: &str) -> Self {
        NoncePool {
            nonce_url: nonce_url.to_owned(),
            ..Default::default()
        }
    }

    fn extract_nonce(&self, res: &reqwest::Response) {
        let Some(nonce) = res
            .headers()
            .get("replay-nonce")
            .and_then(|nonce| nonce.to_str().ok())
        else {
            return;
        };

        // see https://datatracker.ietf.org/doc/html/rfc8555#section-6.5.1
        if !is_base64url(nonce) {
            log::debug!("Ignoring malformed replay-nonce: {nonce:?}");
            return;
        }

        log::trace!("Extracting new nonce");

        let mut pool = self.pool.lock();
        pool.push_back(nonce.to_owned());

        if pool.len() > 10 {
            pool.pop_front();
        }
    }

    async fn get_nonce(&self) -> eyre::Result<String> {
        if let Some(nonce) = self.pool.lock().pop_front() {
            log::trace!("Use previous nonce");
            return Ok(nonce);
        }

        log::debug!("Request new nonce");
        let res = req_handle_error(req_head(&self.nonce_url).await).await?;

        Ok(req_expect_header(&res, "replay-nonce")?)
    }
}

fn is_base64url(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
