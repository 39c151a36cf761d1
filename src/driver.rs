//! One complete certificate acquisition against an ACME directory.

use std::future::Future;

use tokio::sync::OnceCell;

use crate::{
    api,
    cert::{create_p256_key, CertificateBundle},
    challenge::{ChallengeResponder, ChallengeServer},
    config::AcmeConfig,
    error::{Error, Result},
    order::{Auth, Challenge},
    Account, Directory, DirectoryUrl,
};

/// Produces fresh certificate bundles on demand.
///
/// The fetcher calls this at startup when nothing usable is cached and again whenever renewal is
/// due. Implementations do not retry; the caller schedules the next attempt.
pub trait Issuer: Send + Sync + 'static {
    fn issue(&self) -> impl Future<Output = Result<CertificateBundle>> + Send;
}

/// Drives the HTTP-01 flow for a single domain.
///
/// The directory and account are set up on first use and reused by every later fetch.
pub struct AcmeDriver {
    config: AcmeConfig,
    account: OnceCell<Account>,
    responder: ChallengeResponder,
}

impl AcmeDriver {
    /// Validates `config` and prepares a driver; no network calls are made yet.
    pub fn new(config: AcmeConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            account: OnceCell::new(),
            responder: ChallengeResponder::new(),
        })
    }

    pub fn config(&self) -> &AcmeConfig {
        &self.config
    }

    /// Responder holding the key authorization of the attempt in flight, if any.
    pub fn responder(&self) -> &ChallengeResponder {
        &self.responder
    }

    async fn account(&self) -> Result<&Account> {
        let account = self
            .account
            .get_or_try_init(|| async {
                let url = DirectoryUrl::Other(self.config.directory_url());
                log::debug!("fetching ACME directory {}", self.config.directory_url());
                let dir = Directory::fetch(url).await?;

                let contact = self.config.contact();
                let contact = (!contact.is_empty()).then(|| contact.to_vec());
                let acc = dir.register_account(contact).await?;
                log::info!("registered ACME account");

                Ok::<_, eyre::Report>(acc)
            })
            .await?;

        Ok(account)
    }

    /// Run the whole flow once: order, authorize, finalize and download.
    pub async fn fetch(&self) -> Result<CertificateBundle> {
        let domain = self.config.domain();
        let timings = self.config.timings();
        log::info!("requesting certificate for {domain}");

        let account = self.account().await?;
        let order = account.new_order(domain).await?;

        let auth = order.authorization().await?;
        self.authorize(&auth).await?;

        let order = tokio::time::timeout(
            timings.poll_timeout,
            order.wait_until_validated(timings.poll_interval),
        )
        .await
        .map_err(|_| Error::OrderTimeout {
            elapsed: timings.poll_timeout,
        })??;

        let order = tokio::time::timeout(
            timings.poll_timeout,
            order.finalize(create_p256_key(), timings.poll_interval),
        )
        .await
        .map_err(|_| Error::OrderTimeout {
            elapsed: timings.poll_timeout,
        })??;

        let bundle = order.download_cert().await?;
        log::info!(
            "issued certificate for {domain}, valid until {}",
            bundle.not_after()
        );

        Ok(bundle)
    }

    async fn authorize(&self, auth: &Auth) -> Result<()> {
        if !auth.need_challenge() {
            log::debug!("authorization for {} is already valid", auth.domain_name());
            return Ok(());
        }

        let challenge = auth
            .http_challenge()
            .ok_or_else(|| Error::NoHttpChallenge {
                domain: auth.domain_name().to_owned(),
            })?;

        let server = ChallengeServer::start(self.config.challenge_bind(), self.responder.clone())?;
        let res = self.complete_challenge(auth, &challenge).await;
        self.responder.retire();
        server.stop().await;

        let api_auth = res?;
        if api_auth.status != api::AuthorizationStatus::Valid {
            return Err(Error::AuthorizationFailed {
                status: api_auth.status,
            });
        }

        log::debug!("authorization for {} is valid", auth.domain_name());
        Ok(())
    }

    async fn complete_challenge(
        &self,
        auth: &Auth,
        challenge: &Challenge,
    ) -> Result<api::Authorization> {
        let timings = self.config.timings();

        self.responder.install(challenge.http_proof()?);

        if challenge.need_validate() {
            challenge.validate().await?;
        }

        let api_auth = tokio::time::timeout(
            timings.poll_timeout,
            auth.poll_until_settled(timings.poll_interval),
        )
        .await
        .map_err(|_| Error::AuthorizationTimeout {
            elapsed: timings.poll_timeout,
        })??;

        Ok(api_auth)
    }
}

impl Issuer for AcmeDriver {
    fn issue(&self) -> impl Future<Output = Result<CertificateBundle>> + Send {
        self.fetch()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::Timings,
        test::{AuthOutcome, TestServer},
    };

    fn driver(server: &TestServer) -> AcmeDriver {
        let config = AcmeConfig::new("acme-test.example.com")
            .with_contact("foo@bar.com")
            .with_directory(DirectoryUrl::Other(&server.dir_url))
            .with_challenge_bind("127.0.0.1:0".parse().unwrap())
            .allow_nonstandard_challenge_port(true)
            .with_timings(Timings {
                poll_interval: Duration::from_millis(5),
                poll_timeout: Duration::from_millis(300),
                ..Timings::default()
            });

        AcmeDriver::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_certificate() {
        let server = crate::test::with_directory_server();
        let driver = driver(&server);

        let bundle = driver.fetch().await.unwrap();
        assert_eq!(bundle.certificate_chain().len(), 2);
        assert!(bundle.valid_days_left() > 14);

        // challenge content is retired once the authorization settled
        assert_eq!(
            driver
                .responder()
                .respond(&format!("/.well-known/acme-challenge/{}", crate::test::CHALLENGE_TOKEN)),
            None
        );
    }

    #[tokio::test]
    async fn test_account_is_reused() {
        let server = crate::test::with_directory_server();
        let driver = driver(&server);

        driver.fetch().await.unwrap();
        driver.fetch().await.unwrap();

        assert_eq!(server.state.calls("new-acct"), 1);
        assert_eq!(server.state.calls("new-order"), 2);
        assert_eq!(server.state.calls("finalize"), 2);
    }

    #[tokio::test]
    async fn test_invalid_authorization() {
        let server = crate::test::with_directory_server();
        server.state.set_auth_outcome(AuthOutcome::Invalid);
        let driver = driver(&server);

        let err = driver.fetch().await.unwrap_err();
        assert!(
            matches!(
                err,
                Error::AuthorizationFailed {
                    status: api::AuthorizationStatus::Invalid
                }
            ),
            "{err}"
        );
        assert_eq!(server.state.calls("finalize"), 0);
    }

    #[tokio::test]
    async fn test_pending_authorization_times_out() {
        let server = crate::test::with_directory_server();
        server.state.set_auth_outcome(AuthOutcome::Pending);
        let driver = driver(&server);

        let err = driver.fetch().await.unwrap_err();
        assert!(
            matches!(err, Error::AuthorizationTimeout { elapsed } if elapsed == Duration::from_millis(300)),
            "{err}"
        );
        assert_eq!(server.state.calls("finalize"), 0);
    }

    #[tokio::test]
    async fn test_stalled_order_times_out() {
        let server = crate::test::with_directory_server();
        server.state.stall_processing(true);
        let driver = driver(&server);

        let err = driver.fetch().await.unwrap_err();
        assert!(
            matches!(err, Error::OrderTimeout { elapsed } if elapsed == Duration::from_millis(300)),
            "{err}"
        );
        assert_eq!(server.state.calls("finalize"), 1);
        assert_eq!(server.state.calls("cert"), 0);
    }

    #[tokio::test]
    async fn test_already_valid_authorization_skips_challenge() {
        let server = crate::test::with_directory_server();
        server.state.set_auth_outcome(AuthOutcome::AlreadyValid);
        let driver = driver(&server);

        driver.fetch().await.unwrap();
        assert_eq!(server.state.calls("challenge"), 0);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = AcmeConfig::new("*.example.org");
        assert!(matches!(
            AcmeDriver::new(config),
            Err(Error::Configuration(_))
        ));
    }
}
