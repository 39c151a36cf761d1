use std::sync::Arc;

use crate::{
    acc::AcmeKey,
    api,
    req::{req_expect_header, req_get, req_handle_error},
    trans::{NoncePool, Transport},
    Account,
};

const LETSENCRYPT_URL: &str = "https://acme-v02.api.letsencrypt.org/directory";
const LETSENCRYPT_STAGING_URL: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Enumeration of known ACME API directories.
#[derive(Debug, Clone)]
pub enum DirectoryUrl<'a> {
    /// The main Let's Encrypt directory.
    ///
    /// Not appropriate for testing / development.
    LetsEncrypt,

    /// The staging Let's Encrypt directory.
    ///
    /// Use for testing and development. Doesn't issue "valid" certificates. The root signing
    /// certificate is not supposed to be in any trust chains.
    LetsEncryptStaging,

    /// Provide an arbitrary director URL to connect to.
    Other(&'a str),
}

impl<'a> DirectoryUrl<'a> {
    pub(crate) fn to_url(&self) -> &str {
        match self {
            DirectoryUrl::LetsEncrypt => LETSENCRYPT_URL,
            DirectoryUrl::LetsEncryptStaging => LETSENCRYPT_STAGING_URL,
            DirectoryUrl::Other(url) => url,
        }
    }
}

/// Entry point for accessing an ACME API.
///
/// Holds the parsed directory and the nonce pool shared by every account registered through it.
#[derive(Clone)]
pub struct Directory {
    nonce_pool: Arc<NoncePool>,
    api_directory: api::Directory,
}

impl Directory {
    /// Fetch the directory object from `url`.
    ///
    /// Providers that require external account binding are refused here, since accounts are
    /// always registered without one.
    pub async fn fetch(url: DirectoryUrl<'_>) -> eyre::Result<Directory> {
        let url = url.to_url();
        let res = req_handle_error(req_get(url).await).await?;
        let api_directory = res.json::<api::Directory>().await?;

        if api_directory.meta.external_account_required {
            eyre::bail!("ACME directory {url} requires external account binding, which is unsupported");
        }

        let nonce_pool = Arc::new(NoncePool::new(&api_directory.new_nonce));

        Ok(Directory {
            nonce_pool,
            api_directory,
        })
    }

    /// Generate a fresh account key and register it, agreeing to the terms of service.
    pub async fn register_account(&self, contact: Option<Vec<String>>) -> eyre::Result<Account> {
        if let Some(terms) = &self.api_directory.meta.terms_of_service {
            log::info!("agreeing to ACME terms of service at {terms}");
        }

        let mut transport = Transport::new(Arc::clone(&self.nonce_pool), AcmeKey::new());
        let res = transport
            .call_jwk(
                &self.api_directory.new_account,
                &api::NewAccount::agreeing_to_terms(contact),
            )
            .await?;

        // 201 for a new account, 200 with the same Location for a known key
        let kid = req_expect_header(&res, "location")?;
        log::debug!("Key ID is: {kid}");
        let api_account = res.json::<api::Account>().await?;

        if !api_account.is_status_valid() {
            eyre::bail!("account {kid} is {:?}", api_account.status);
        }

        transport.set_key_id(kid);

        Ok(Account::new(
            transport,
            api_account,
            self.api_directory.new_order.clone(),
        ))
    }

    /// Returns a reference to the directory's API object.
    ///
    /// Useful for debugging.
    pub fn api_directory(&self) -> &api::Directory {
        &self.api_directory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_directory() {
        let server = crate::test::with_directory_server();

        let url = DirectoryUrl::Other(&server.dir_url);
        let dir = Directory::fetch(url).await.unwrap();
        assert!(dir.api_directory().new_order.ends_with("/acme/new-order"));
    }

    #[tokio::test]
    async fn test_create_account() {
        let server = crate::test::with_directory_server();

        let url = DirectoryUrl::Other(&server.dir_url);
        let dir = Directory::fetch(url).await.unwrap();

        let acc = dir
            .register_account(Some(vec!["mailto:foo@bar.com".to_owned()]))
            .await
            .unwrap();
        assert!(acc.api_account().terms_of_service_agreed);
        assert_eq!(server.state.calls("new-acct"), 1);
    }

    #[test]
    fn test_directory_urls() {
        assert_eq!(DirectoryUrl::LetsEncrypt.to_url(), LETSENCRYPT_URL);
        assert_eq!(
            DirectoryUrl::Other("http://localhost:14000/dir").to_url(),
            "http://localhost:14000/dir"
        );
    }
}
