//! Owns the active certificate and keeps it renewed.

use std::{net::SocketAddr, sync::Arc};

use arc_swap::ArcSwap;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use zeroize::Zeroizing;

use crate::{
    cache::CertificateCache,
    cert::CertificateBundle,
    config::AcmeConfig,
    driver::{AcmeDriver, Issuer},
    error::{Error, Result},
    tls::CertificateResolver,
};

/// Result of one renewal check.
#[derive(Debug)]
pub enum RenewalOutcome {
    /// The active certificate is outside the renewal window; nothing was requested.
    NotDue,

    /// A new certificate is active.
    Renewed { not_after: OffsetDateTime },

    /// Renewal failed; the previous certificate stays active.
    Failed(Error),
}

struct Shared<I, C> {
    config: AcmeConfig,
    issuer: I,
    cache: C,
    current: Arc<ArcSwap<CertificateBundle>>,

    /// Held for the duration of a renewal attempt.
    renewing: tokio::sync::Mutex<()>,
}

impl<I: Issuer, C: CertificateCache> Shared<I, C> {
    async fn check_renewal(&self) -> RenewalOutcome {
        let _guard = self.renewing.lock().await;

        let domain = self.config.domain();
        let current = self.current.load_full();

        if !current.expires_within(self.config.timings().renew_before, OffsetDateTime::now_utc()) {
            log::debug!(
                "certificate for {domain} valid until {}, renewal not due",
                current.not_after()
            );
            return RenewalOutcome::NotDue;
        }

        log::info!(
            "certificate for {domain} expires {}, renewing",
            current.not_after()
        );

        match self.issuer.issue().await {
            Ok(bundle) => {
                let not_after = bundle.not_after();
                store_cached(&self.cache, domain, &bundle).await;
                self.current.store(Arc::new(bundle));
                RenewalOutcome::Renewed { not_after }
            }
            Err(err) => RenewalOutcome::Failed(err),
        }
    }
}

async fn renewal_loop<I: Issuer, C: CertificateCache>(shared: Arc<Shared<I, C>>) {
    let timings = *shared.config.timings();
    let domain = shared.config.domain();
    let mut delay = timings.first_check;

    loop {
        tokio::time::sleep(delay).await;

        delay = match shared.check_renewal().await {
            RenewalOutcome::NotDue => timings.check_interval,

            RenewalOutcome::Renewed { not_after } => {
                log::info!("renewed certificate for {domain}, valid until {not_after}");
                timings.check_interval
            }

            RenewalOutcome::Failed(err) => {
                log::error!(
                    "certificate renewal for {domain} failed, retrying in {:?}: {err:#}",
                    timings.retry_interval
                );
                timings.retry_interval
            }
        };
    }
}

async fn load_cached<C: CertificateCache>(cache: &C, domain: &str) -> Option<CertificateBundle> {
    let bytes = match cache.read(domain).await {
        Ok(Some(bytes)) => Zeroizing::new(bytes),
        Ok(None) => {
            log::debug!("no cached certificate for {domain}");
            return None;
        }
        Err(err) => {
            log::warn!("failed to read cached certificate for {domain}: {err}");
            return None;
        }
    };

    match CertificateBundle::from_bytes(&bytes) {
        Ok(bundle) => Some(bundle),
        Err(err) => {
            log::warn!("ignoring unparseable cached certificate for {domain}: {err:#}");
            None
        }
    }
}

async fn store_cached<C: CertificateCache>(cache: &C, domain: &str, bundle: &CertificateBundle) {
    let bytes = match bundle.to_bytes() {
        Ok(bytes) => bytes,
        Err(err) => {
            log::warn!("failed to serialize certificate for {domain}: {err:#}");
            return;
        }
    };

    if let Err(err) = cache.write(domain, &bytes).await {
        log::warn!("failed to cache certificate for {domain}: {err}");
    }
}

/// Holds the active certificate for one domain and renews it in the background.
///
/// Dropping the fetcher stops the renewal task.
pub struct CertificateFetcher<I, C> {
    shared: Arc<Shared<I, C>>,
    renewal_task: JoinHandle<()>,
}

impl<C: CertificateCache> CertificateFetcher<AcmeDriver, C> {
    /// [`initialize`](Self::initialize) with an [`AcmeDriver`] built from `config`.
    pub async fn initialize_acme(config: AcmeConfig, cache: C) -> Result<Self> {
        let driver = AcmeDriver::new(config.clone())?;
        Self::initialize(config, driver, cache).await
    }
}

impl<I: Issuer, C: CertificateCache> CertificateFetcher<I, C> {
    /// Load a usable certificate and start the renewal task.
    ///
    /// A cached certificate is adopted if it is valid for longer than
    /// [`fresh_at_startup`](crate::Timings::fresh_at_startup). Otherwise a new one is issued
    /// before this returns, and its failure is this call's failure.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn initialize(config: AcmeConfig, issuer: I, cache: C) -> Result<Self> {
        config.validate()?;

        let domain = config.domain();
        let timings = *config.timings();

        let bundle = match load_cached(&cache, domain).await {
            Some(bundle)
                if !bundle.expires_within(timings.fresh_at_startup, OffsetDateTime::now_utc()) =>
            {
                log::info!(
                    "using cached certificate for {domain}, valid until {}",
                    bundle.not_after()
                );
                bundle
            }

            cached => {
                if let Some(stale) = cached {
                    log::info!(
                        "cached certificate for {domain} expires {}, requesting a new one",
                        stale.not_after()
                    );
                }

                let bundle = issuer.issue().await?;
                store_cached(&cache, domain, &bundle).await;
                bundle
            }
        };

        let shared = Arc::new(Shared {
            current: Arc::new(ArcSwap::from_pointee(bundle)),
            config,
            issuer,
            cache,
            renewing: tokio::sync::Mutex::new(()),
        });

        let renewal_task = tokio::spawn(renewal_loop(Arc::clone(&shared)));

        Ok(Self {
            shared,
            renewal_task,
        })
    }

    /// Renew now if the active certificate is within the renewal window.
    ///
    /// Waits for a renewal already in progress instead of starting a second one.
    pub async fn check_renewal(&self) -> RenewalOutcome {
        self.shared.check_renewal().await
    }

    /// Snapshot of the active certificate.
    pub fn current(&self) -> Arc<CertificateBundle> {
        self.shared.current.load_full()
    }

    pub fn domain(&self) -> &str {
        self.shared.config.domain()
    }

    /// Address HTTP-01 challenges are served on.
    pub fn challenge_bind(&self) -> SocketAddr {
        self.shared.config.challenge_bind()
    }

    /// TLS certificate resolver that follows renewals.
    pub fn resolver(&self) -> CertificateResolver {
        CertificateResolver::from_cell(Arc::clone(&self.shared.current))
    }

    pub fn issuer(&self) -> &I {
        &self.shared.issuer
    }

    pub fn cache(&self) -> &C {
        &self.shared.cache
    }
}

impl<I, C> Drop for CertificateFetcher<I, C> {
    fn drop(&mut self) {
        self.renewal_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;
    use crate::{
        api::AuthorizationStatus,
        cache::MemoryCache,
        test::{bundle_expiring_in, AuthOutcome, DOMAIN},
        DirectoryUrl, Timings,
    };

    #[derive(Default)]
    struct MockIssuer {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl MockIssuer {
        fn failing() -> Self {
            let issuer = Self::default();
            issuer.fail.store(true, Ordering::SeqCst);
            issuer
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Issuer for MockIssuer {
        async fn issue(&self) -> Result<CertificateBundle> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::AuthorizationFailed {
                    status: AuthorizationStatus::Invalid,
                });
            }

            Ok(bundle_expiring_in(time::Duration::days(90)))
        }
    }

    fn config() -> AcmeConfig {
        AcmeConfig::new(DOMAIN)
    }

    async fn cache_with(valid_for: time::Duration) -> (MemoryCache, CertificateBundle) {
        let cache = MemoryCache::new();
        let bundle = bundle_expiring_in(valid_for);
        cache
            .write(DOMAIN, &bundle.to_bytes().unwrap())
            .await
            .unwrap();
        (cache, bundle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_cached_certificate_is_not_renewed() {
        let (cache, cached) = cache_with(time::Duration::days(60)).await;

        let fetcher = CertificateFetcher::initialize(config(), MockIssuer::default(), cache)
            .await
            .unwrap();
        assert_eq!(*fetcher.current(), cached);
        assert_eq!(fetcher.issuer().calls(), 0);

        assert!(matches!(fetcher.check_renewal().await, RenewalOutcome::NotDue));

        // first check and a couple of daily checks
        tokio::time::sleep(Duration::from_secs(3 * 86_400)).await;
        assert_eq!(fetcher.issuer().calls(), 0);
        assert_eq!(*fetcher.current(), cached);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_certificate_near_expiry_is_renewed_on_first_check() {
        let (cache, cached) = cache_with(time::Duration::days(2)).await;

        let fetcher = CertificateFetcher::initialize(config(), MockIssuer::default(), cache)
            .await
            .unwrap();
        assert_eq!(*fetcher.current(), cached);
        assert_eq!(fetcher.issuer().calls(), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fetcher.issuer().calls(), 0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(fetcher.issuer().calls(), 1);

        let renewed = fetcher.current();
        assert_ne!(*renewed, cached);
        assert!(renewed.valid_days_left() > 80);

        // the renewal was persisted
        let stored = fetcher.cache().read(DOMAIN).await.unwrap().unwrap();
        assert_eq!(CertificateBundle::from_bytes(&stored).unwrap(), *renewed);

        // and the next daily check has nothing to do
        tokio::time::sleep(Duration::from_secs(86_400)).await;
        assert_eq!(fetcher.issuer().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_renewal_keeps_active_certificate() {
        let (cache, cached) = cache_with(time::Duration::days(2)).await;

        let fetcher = CertificateFetcher::initialize(config(), MockIssuer::failing(), cache)
            .await
            .unwrap();
        let before = fetcher.current();

        let outcome = fetcher.check_renewal().await;
        assert!(matches!(
            outcome,
            RenewalOutcome::Failed(Error::AuthorizationFailed { .. })
        ));
        assert_eq!(fetcher.issuer().calls(), 1);
        assert_eq!(*fetcher.current(), *before);
        assert_eq!(*fetcher.current(), cached);

        // the cache still holds the old certificate
        let stored = fetcher.cache().read(DOMAIN).await.unwrap().unwrap();
        assert_eq!(CertificateBundle::from_bytes(&stored).unwrap(), cached);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_renewal_is_retried() {
        let (cache, _) = cache_with(time::Duration::days(2)).await;
        let retry_interval = Timings::default().retry_interval;

        let fetcher = CertificateFetcher::initialize(config(), MockIssuer::failing(), cache)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(fetcher.issuer().calls(), 1);

        tokio::time::sleep(retry_interval - Duration::from_secs(2)).await;
        assert_eq!(fetcher.issuer().calls(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fetcher.issuer().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_renewals_do_not_overlap() {
        let (cache, _) = cache_with(time::Duration::days(2)).await;

        let fetcher = CertificateFetcher::initialize(config(), MockIssuer::default(), cache)
            .await
            .unwrap();

        let (first, second) = tokio::join!(fetcher.check_renewal(), fetcher.check_renewal());
        assert!(matches!(first, RenewalOutcome::Renewed { .. }));
        assert!(matches!(second, RenewalOutcome::NotDue));
        assert_eq!(fetcher.issuer().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_issues_when_nothing_cached() {
        let cache = MemoryCache::new();

        let fetcher = CertificateFetcher::initialize(config(), MockIssuer::default(), cache)
            .await
            .unwrap();
        assert_eq!(fetcher.issuer().calls(), 1);
        assert_eq!(fetcher.domain(), DOMAIN);
        assert_eq!(fetcher.challenge_bind().port(), 80);

        let stored = fetcher.cache().read(DOMAIN).await.unwrap().unwrap();
        assert_eq!(
            CertificateBundle::from_bytes(&stored).unwrap(),
            *fetcher.current()
        );
        assert_eq!(*fetcher.resolver().current(), *fetcher.current());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_or_garbage_cache_is_a_miss() {
        let (cache, _) = cache_with(time::Duration::hours(12)).await;
        let fetcher = CertificateFetcher::initialize(config(), MockIssuer::default(), cache)
            .await
            .unwrap();
        assert_eq!(fetcher.issuer().calls(), 1);

        let cache = MemoryCache::new();
        cache.write(DOMAIN, b"garbage").await.unwrap();
        let fetcher = CertificateFetcher::initialize(config(), MockIssuer::default(), cache)
            .await
            .unwrap();
        assert_eq!(fetcher.issuer().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_bundle_with_foreign_key_is_a_miss() {
        let bundle = bundle_expiring_in(time::Duration::days(60));
        let other = bundle_expiring_in(time::Duration::days(60));

        let mut bytes = other.private_key_pem().unwrap().as_bytes().to_vec();
        for cert in bundle.certificate_chain() {
            let block = pem::encode_string("CERTIFICATE", pem::LineEnding::LF, cert).unwrap();
            bytes.extend_from_slice(block.as_bytes());
        }

        let cache = MemoryCache::new();
        cache.write(DOMAIN, &bytes).await.unwrap();
        let fetcher = CertificateFetcher::initialize(config(), MockIssuer::default(), cache)
            .await
            .unwrap();
        assert_eq!(fetcher.issuer().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_fails_without_certificate() {
        let err = CertificateFetcher::initialize(config(), MockIssuer::failing(), MemoryCache::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::AuthorizationFailed { .. }), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_rejects_invalid_config() {
        let issuer = MockIssuer::default();
        let err = CertificateFetcher::initialize(AcmeConfig::new(""), issuer, MemoryCache::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Configuration(_)), "{err}");
    }

    #[tokio::test]
    async fn test_initialize_against_acme_server() {
        let server = crate::test::with_directory_server();
        let config = AcmeConfig::new(DOMAIN)
            .with_contact("foo@bar.com")
            .with_directory(DirectoryUrl::Other(&server.dir_url))
            .with_challenge_bind("127.0.0.1:0".parse().unwrap())
            .allow_nonstandard_challenge_port(true)
            .with_timings(Timings {
                poll_interval: Duration::from_millis(5),
                ..Timings::default()
            });

        let fetcher = CertificateFetcher::initialize_acme(config.clone(), MemoryCache::new())
            .await
            .unwrap();
        assert!(fetcher.current().valid_days_left() > 14);
        assert_eq!(server.state.calls("finalize"), 1);

        server.state.set_auth_outcome(AuthOutcome::Invalid);
        let err = CertificateFetcher::initialize_acme(config, MemoryCache::new())
            .await
            .err()
            .unwrap();
        assert!(
            matches!(
                err,
                Error::AuthorizationFailed {
                    status: AuthorizationStatus::Invalid
                }
            ),
            "{err}"
        );
        assert_eq!(server.state.calls("finalize"), 1);
    }
}
