use std::{
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use crate::{
    dir::DirectoryUrl,
    error::{Error, Result},
};

/// Port HTTP-01 validation requests arrive on.
pub const HTTP_CHALLENGE_PORT: u16 = 80;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound for the freshness and renewal windows.
const MAX_EXPIRY_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Thresholds and intervals driving issuance and renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// A cached certificate is adopted at startup only if it is valid for longer than this.
    pub fresh_at_startup: Duration,

    /// Renewal is attempted once the active certificate expires within this window.
    pub renew_before: Duration,

    /// Delay before the first renewal check.
    pub first_check: Duration,

    /// Delay between renewal checks after a skipped or successful renewal.
    pub check_interval: Duration,

    /// Delay before the next check after a failed renewal.
    pub retry_interval: Duration,

    /// Delay between authorization and order polls.
    pub poll_interval: Duration,

    /// Maximum time to wait for an authorization or order to settle.
    pub poll_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            fresh_at_startup: DAY,
            renew_before: 14 * DAY,
            first_check: Duration::from_secs(60),
            check_interval: DAY,
            retry_interval: Duration::from_secs(60 * 60),
            poll_interval: Duration::from_millis(250),
            poll_timeout: Duration::from_secs(2 * 60),
        }
    }
}

/// What to request from the ACME provider and how to serve the challenge.
///
/// ```
/// use autotls::{AcmeConfig, DirectoryUrl};
///
/// let config = AcmeConfig::new("example.org")
///     .with_contact("admin@example.org")
///     .with_directory(DirectoryUrl::LetsEncryptStaging);
///
/// assert_eq!(config.contact(), ["mailto:admin@example.org"]);
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct AcmeConfig {
    domain: String,
    contact: Vec<String>,
    directory_url: String,
    challenge_bind: SocketAddr,
    allow_nonstandard_challenge_port: bool,
    timings: Timings,
}

impl AcmeConfig {
    /// Configuration for `domain` against the production Let's Encrypt directory.
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into().trim().to_ascii_lowercase(),
            contact: Vec::new(),
            directory_url: DirectoryUrl::LetsEncrypt.to_url().to_owned(),
            challenge_bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, HTTP_CHALLENGE_PORT)),
            allow_nonstandard_challenge_port: false,
            timings: Timings::default(),
        }
    }

    /// Add a contact email; `mailto:` is prepended when missing.
    pub fn with_contact(mut self, email: impl AsRef<str>) -> Self {
        let email = email.as_ref();

        let contact = if email.starts_with("mailto:") {
            email.to_owned()
        } else {
            format!("mailto:{email}")
        };

        self.contact.push(contact);
        self
    }

    pub fn with_directory(mut self, url: DirectoryUrl<'_>) -> Self {
        self.directory_url = url.to_url().to_owned();
        self
    }

    /// Address the HTTP-01 responder listens on while a challenge is in flight.
    pub fn with_challenge_bind(mut self, addr: SocketAddr) -> Self {
        self.challenge_bind = addr;
        self
    }

    /// Permit a challenge port other than 80.
    ///
    /// Only useful against test ACME servers that validate on a custom port.
    pub fn allow_nonstandard_challenge_port(mut self, allow: bool) -> Self {
        self.allow_nonstandard_challenge_port = allow;
        self
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn contact(&self) -> &[String] {
        &self.contact
    }

    pub fn directory_url(&self) -> &str {
        &self.directory_url
    }

    pub fn challenge_bind(&self) -> SocketAddr {
        self.challenge_bind
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    /// Checks the configuration before any network activity.
    pub fn validate(&self) -> Result<()> {
        validate_domain(&self.domain)?;

        if self.challenge_bind.port() != HTTP_CHALLENGE_PORT && !self.allow_nonstandard_challenge_port
        {
            return Err(Error::config(format!(
                "HTTP-01 challenges must be served on port {HTTP_CHALLENGE_PORT}, not {}",
                self.challenge_bind.port()
            )));
        }

        if self.directory_url.is_empty() {
            return Err(Error::config("ACME directory URL is empty"));
        }

        let t = &self.timings;
        if t.poll_interval.is_zero() || t.check_interval.is_zero() || t.retry_interval.is_zero() {
            return Err(Error::config("polling and check intervals must be non-zero"));
        }

        if t.fresh_at_startup > MAX_EXPIRY_WINDOW || t.renew_before > MAX_EXPIRY_WINDOW {
            return Err(Error::config(format!(
                "freshness and renewal windows must not exceed {} days",
                MAX_EXPIRY_WINDOW.as_secs() / DAY.as_secs()
            )));
        }

        Ok(())
    }
}

fn validate_domain(domain: &str) -> Result<()> {
    if domain.is_empty() {
        return Err(Error::config("domain name is empty"));
    }

    if domain.contains('*') {
        return Err(Error::config(format!(
            "wildcard domain {domain} cannot be validated with HTTP-01"
        )));
    }

    if domain.len() > 253 {
        return Err(Error::config(format!("domain name {domain} is too long")));
    }

    let valid_labels = domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-')
    });

    if !valid_labels {
        return Err(Error::config(format!("invalid domain name {domain:?}")));
    }

    Ok(())
}
