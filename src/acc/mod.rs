use std::sync::Arc;

use crate::{api, order::NewOrder, req::req_expect_header, trans::Transport};

mod acme_key;

pub(crate) use self::acme_key::AcmeKey;

/// State shared by an [`Account`] and every order created through it.
#[derive(Debug)]
pub(crate) struct AccountInner {
    pub transport: Transport,
    pub api_account: api::Account,
    pub new_order_url: String,
}

/// Registered account with an ACME provider.
///
/// Created by [`Directory::register_account()`]. The account key is a P-256 key that only lives
/// in memory; registering again with a fresh key after a restart is tolerated by providers.
///
/// Cloning is cheap and clones share the transport, so nonces are reused across them.
///
/// [`Directory::register_account()`]: crate::Directory::register_account()
#[derive(Debug, Clone)]
pub struct Account {
    inner: Arc<AccountInner>,
}

impl Account {
    pub(crate) fn new(
        transport: Transport,
        api_account: api::Account,
        new_order_url: String,
    ) -> Self {
        Self {
            inner: Arc::new(AccountInner {
                transport,
                api_account,
                new_order_url,
            }),
        }
    }

    /// Account URL assigned by the provider.
    pub fn url(&self) -> &str {
        self.inner.transport.acme_key().key_id().unwrap_or_default()
    }

    /// Create a new order to issue a certificate for `domain`.
    ///
    /// The order carries exactly one DNS identifier, so it has a single authorization to prove
    /// before it can be finalized. Every call creates a new order with the provider, even for
    /// the same domain.
    pub async fn new_order(&self, domain: &str) -> eyre::Result<NewOrder> {
        let order = api::Order::for_domain(domain);

        let res = self
            .inner
            .transport
            .call_kid(&self.inner.new_order_url, &order)
            .await?;
        let order_url = req_expect_header(&res, "location")?;
        let api_order = res.json::<api::Order>().await?;
        log::debug!("order {order_url} for {domain} is {:?}", api_order.status);

        let mut order = NewOrder::new(&self.inner, order, order_url);
        order.overwrite(api_order)?;
        Ok(order)
    }

    /// Returns a reference to the account's API object.
    ///
    /// Useful for debugging.
    pub fn api_account(&self) -> &api::Account {
        &self.inner.api_account
    }
}
