//! Order life cycle.
//!
//! An order goes through a life cycle of different states that require various actions by
//! the user. To ensure the user only use appropriate actions, this library have simple façade
//! structs that wraps the actual [`api::Order`].
//!
//! 1. First prove ownership:
//!    * [`NewOrder`] -> [`Auth`] -> [`Challenge`]
//! 2. Then submit CSR and download the cert.
//!    * [`NewOrder`] -> [`CsrOrder`] -> [`CertOrder`]

use std::{sync::Arc, time::Duration};

use der::Encode as _;
use eyre::WrapErr as _;
use pkcs8::EncodePrivateKey as _;

use crate::{
    acc::AccountInner,
    api,
    cert::{create_csr, CertificateBundle},
    error::{Error, Result},
};

mod auth;

pub use self::auth::{Auth, Challenge};

/// POST-as-GET the order URL.
async fn refresh_order(inner: &AccountInner, url: &str) -> eyre::Result<api::Order> {
    let res = inner.transport.post_as_get(url).await?;
    Ok(res.json::<api::Order>().await?)
}

/// Polls the order until it leaves the `pending`/`processing` states.
async fn wait_for_order_status(
    inner: &AccountInner,
    url: &str,
    delay: Duration,
) -> eyre::Result<api::Order> {
    loop {
        let order = refresh_order(inner, url).await?;
        if !order.is_status_transient() {
            return Ok(order);
        }
        tokio::time::sleep(delay).await;
    }
}

/// A new order created by [`Account::new_order`].
///
/// The domain in the order must have a valid authorization ([confirmed ownership]) before the
/// order can progress to submitting a [CSR].
///
/// The ACME API provider might "remember" for a time that you already own a domain, which
/// means you might not need to prove the ownership every time. Check [`Auth::need_challenge`].
///
/// [`Account::new_order`]: crate::Account::new_order
/// [confirmed ownership]: crate#domain-ownership
/// [CSR]: https://en.wikipedia.org/wiki/Certificate_signing_request
pub struct NewOrder {
    inner: Arc<AccountInner>,
    api_order: api::Order,
    url: String,
}

impl NewOrder {
    pub(crate) fn new(inner: &Arc<AccountInner>, api_order: api::Order, url: String) -> Self {
        NewOrder {
            inner: Arc::clone(inner),
            api_order,
            url,
        }
    }

    pub(crate) fn overwrite(&mut self, from_api: api::Order) -> eyre::Result<()> {
        self.api_order.overwrite(from_api)
    }

    /// Tell if the domain in this order has been authorized and the order awaits a CSR.
    ///
    /// This doesn't do any calls against the API. You must manually call [`refresh`].
    ///
    /// Only a `ready` order counts. A `valid` order has already been finalized and the server
    /// refuses a second CSR for it.
    ///
    /// [`refresh`]: NewOrder::refresh
    pub fn is_validated(&self) -> bool {
        self.api_order.is_status_ready()
    }

    /// Refresh the order state against the ACME API.
    ///
    /// RFC 8555 calls this a "POST-as-GET" against the order URL.
    pub async fn refresh(&mut self) -> eyre::Result<()> {
        let api_order = refresh_order(&self.inner, &self.url).await?;
        self.api_order.overwrite(api_order)
    }

    /// Fetch the authorization of the order's single domain.
    pub async fn authorization(&self) -> eyre::Result<Auth> {
        let auth_url = self
            .api_order
            .authorizations
            .first()
            .ok_or_else(|| eyre::eyre!("order carries no authorization"))?;

        let res = self.inner.transport.post_as_get(auth_url).await?;
        let api_auth = res.json::<api::Authorization>().await?;

        Ok(Auth::new(&self.inner, api_auth, auth_url))
    }

    /// Poll the order until it is ready for a CSR.
    ///
    /// Fails with [`Error::OrderFailed`] if the order settles in any other state, `valid`
    /// included.
    pub async fn wait_until_validated(mut self, delay: Duration) -> Result<CsrOrder> {
        loop {
            if self.is_validated() {
                return Ok(CsrOrder { order: self });
            }

            if !self.api_order.is_status_transient() {
                return Err(Error::OrderFailed {
                    status: self.api_order.status,
                });
            }

            tokio::time::sleep(delay).await;
            self.refresh().await?;
        }
    }

    /// Access the underlying JSON object for debugging.
    pub fn api_order(&self) -> &api::Order {
        &self.api_order
    }
}

/// An order that is ready for a [CSR] submission.
///
/// To submit the CSR is called "finalizing" the order. A fresh P-256 key is generated per order;
/// Let's Encrypt [supports] it alongside RSA and P-384.
///
/// [CSR]: https://en.wikipedia.org/wiki/Certificate_signing_request
/// [supports]: https://letsencrypt.org/docs/integration-guide/#supported-key-algorithms
pub struct CsrOrder {
    order: NewOrder,
}

impl CsrOrder {
    /// Creates the CSR for the order's domain, signs it with `signing_key` and submits it.
    ///
    /// Once the CSR has been submitted, the order goes into a `processing` status,
    /// where we must poll until the status changes. The `delay` is the
    /// amount of time to wait between each poll attempt.
    pub async fn finalize(
        self,
        signing_key: p256::ecdsa::SigningKey,
        delay: Duration,
    ) -> Result<CertOrder> {
        let order = self.order;

        let domain = order
            .api_order
            .primary_domain()
            .ok_or_else(|| eyre::eyre!("order has no identifiers"))?;

        let csr = create_csr(&signing_key, domain)?;

        // this is not the same as PEM.
        let csr_der = csr.to_der().wrap_err("encode csr")?;
        let finalize = api::Finalize::from_csr_der(&csr_der);

        // if the CSR is invalid, we will get a 4xx code back that
        // bombs out from this call.
        order
            .inner
            .transport
            .call_kid(&order.api_order.finalize, &finalize)
            .await?;

        // wait for the status to not be processing.
        // valid -> cert is issued
        // invalid -> the whole thing is off
        let api_order = wait_for_order_status(&order.inner, &order.url, delay).await?;

        if !api_order.is_status_valid() {
            return Err(Error::OrderFailed {
                status: api_order.status,
            });
        }

        Ok(CertOrder {
            signing_key,
            inner: order.inner,
            api_order,
        })
    }

    /// Access the underlying JSON object for debugging.
    pub fn api_order(&self) -> &api::Order {
        &self.order.api_order
    }
}

/// Order for an issued certificate that is ready to download.
pub struct CertOrder {
    signing_key: p256::ecdsa::SigningKey,
    inner: Arc<AccountInner>,
    api_order: api::Order,
}

impl CertOrder {
    /// Download the issued certificate chain and pair it with the order's private key.
    pub async fn download_cert(self) -> Result<CertificateBundle> {
        let url = self
            .api_order
            .certificate
            .as_deref()
            .ok_or_else(|| eyre::eyre!("valid order has no certificate url"))?;

        let res = self.inner.transport.post_as_get(url).await?;
        let certificate = res.text().await.wrap_err("read certificate chain")?;

        let private_key_pem = self
            .signing_key
            .to_pkcs8_pem(pem::LineEnding::LF)
            .wrap_err("encode private key")?;

        Ok(CertificateBundle::from_pem(private_key_pem, certificate)?)
    }

    /// Access the underlying JSON object for debugging.
    pub fn api_order(&self) -> &api::Order {
        &self.api_order
    }
}
