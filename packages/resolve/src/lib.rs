#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! NPI lookup client.
//!
//! Resolves a single NPI number against the lookup API, retrying failed
//! attempts with capped exponential backoff ([`backoff`]). Exhausting the
//! retry budget is a *normal* outcome ([`ResolveOutcome::Exhausted`]), not
//! an error — the scheduler routes exhausted identifiers to the failed
//! partition instead of aborting anything.
//!
//! The [`Resolver`] trait is the seam between the HTTP client and the
//! scheduler, so the engine can be exercised against stub resolvers in
//! tests.

pub mod backoff;

/// Errors that can occur while resolving an identifier.
///
/// Note that a lookup that merely keeps failing is **not** an error — it
/// ends as [`ResolveOutcome::Exhausted`]. This type covers failures outside
/// the modeled retry loop (e.g., a stub resolver in tests signalling an
/// unexpected breakage).
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Building the HTTP client failed.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Unexpected failure outside the retry loop.
    #[error("{message}")]
    Unexpected {
        /// Description of what went wrong.
        message: String,
    },
}

/// The final outcome of resolving one identifier.
#[derive(Debug, Clone)]
pub enum ResolveOutcome {
    /// The lookup succeeded; carries the parsed response payload.
    Resolved(serde_json::Value),
    /// Every attempt failed; the identifier should be routed to the
    /// failed partition.
    Exhausted,
}

/// Trait for resolving one identifier to its payload.
///
/// Implementations must be safely callable from many concurrent tasks;
/// the only shared state should be configuration and a connection pool.
pub trait Resolver: Send + Sync {
    /// Resolves a single identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] only for failures outside the modeled
    /// retry loop; ordinary lookup failures end as
    /// [`ResolveOutcome::Exhausted`].
    fn resolve(
        &self,
        identifier: &str,
    ) -> impl std::future::Future<Output = Result<ResolveOutcome, ResolveError>> + Send;
}

/// Configuration for the HTTP resolver.
#[derive(Debug, Clone)]
pub struct ResolveConfig {
    /// Base URL of the lookup API. The identifier is sent as the `npi`
    /// query parameter.
    pub lookup_url: String,
    /// Maximum number of lookup attempts per identifier.
    pub retries: u32,
    /// Base of the exponential backoff, in seconds.
    pub backoff_base_secs: u64,
    /// Cap on a single backoff wait, in seconds.
    pub backoff_cap_secs: u64,
}

impl ResolveConfig {
    /// Creates a config for the given lookup URL with the default retry
    /// budget (10 attempts, 3s backoff base, 15s cap).
    #[must_use]
    pub fn new(lookup_url: &str) -> Self {
        Self {
            lookup_url: lookup_url.to_owned(),
            retries: 10,
            backoff_base_secs: 3,
            backoff_cap_secs: 15,
        }
    }

    /// Sets the maximum number of lookup attempts.
    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the backoff base in seconds.
    #[must_use]
    pub const fn with_backoff_base_secs(mut self, secs: u64) -> Self {
        self.backoff_base_secs = secs;
        self
    }

    /// Sets the backoff cap in seconds.
    #[must_use]
    pub const fn with_backoff_cap_secs(mut self, secs: u64) -> Self {
        self.backoff_cap_secs = secs;
        self
    }
}

/// Resolver backed by the HTTP lookup API.
///
/// Holds one [`reqwest::Client`] (an internal connection pool), so a single
/// instance is meant to be shared across all in-flight tasks.
#[derive(Debug, Clone)]
pub struct HttpResolver {
    client: reqwest::Client,
    config: ResolveConfig,
}

impl HttpResolver {
    /// Creates a resolver with a fresh HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Http`] if the client cannot be built.
    pub fn new(config: ResolveConfig) -> Result<Self, ResolveError> {
        let client = reqwest::Client::builder()
            .user_agent("npi-harvest/0.1")
            .build()?;
        Ok(Self { client, config })
    }

    /// Returns the resolver's configuration.
    #[must_use]
    pub const fn config(&self) -> &ResolveConfig {
        &self.config
    }

    /// Performs one lookup attempt, returning the parsed payload on a
    /// success status. Any non-success status, transport error, or
    /// undecodable body counts as a failed attempt.
    async fn attempt(&self, identifier: &str) -> Result<serde_json::Value, AttemptFailure> {
        let response = self
            .client
            .get(&self.config.lookup_url)
            .query(&[("npi", identifier)])
            .send()
            .await
            .map_err(AttemptFailure::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptFailure::Status(status));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(AttemptFailure::Transport)
    }
}

/// Why a single lookup attempt failed. Internal to the retry loop.
enum AttemptFailure {
    /// Connection error, timeout, or undecodable body.
    Transport(reqwest::Error),
    /// The server answered with a non-success status.
    Status(reqwest::StatusCode),
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "{e}"),
            Self::Status(status) => write!(f, "HTTP {status}"),
        }
    }
}

impl Resolver for HttpResolver {
    async fn resolve(&self, identifier: &str) -> Result<ResolveOutcome, ResolveError> {
        for attempt in 1..=self.config.retries {
            match self.attempt(identifier).await {
                Ok(payload) => return Ok(ResolveOutcome::Resolved(payload)),
                Err(failure) => {
                    let delay = backoff::wait(
                        attempt,
                        self.config.backoff_base_secs,
                        self.config.backoff_cap_secs,
                    );
                    log::warn!(
                        "Lookup for {identifier} failed on attempt {attempt}/{}: {failure}. \
                         Retrying in {delay:?}...",
                        self.config.retries,
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        log::error!(
            "Lookup for {identifier} exhausted all {} attempts",
            self.config.retries
        );
        Ok(ResolveOutcome::Exhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = ResolveConfig::new("http://localhost/lookup");
        assert_eq!(config.retries, 10);
        assert_eq!(config.backoff_base_secs, 3);
        assert_eq!(config.backoff_cap_secs, 15);
    }

    #[test]
    fn config_builders_override_defaults() {
        let config = ResolveConfig::new("http://localhost/lookup")
            .with_retries(2)
            .with_backoff_base_secs(1)
            .with_backoff_cap_secs(4);
        assert_eq!(config.retries, 2);
        assert_eq!(config.backoff_base_secs, 1);
        assert_eq!(config.backoff_cap_secs, 4);
    }
}
