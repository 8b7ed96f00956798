use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use url::Url;

use super::config::AuthConfig;
use super::error::{ConfigError, KeyResolutionError, KeySourceError};
use super::key::{KeyResponse, KeySet, SigningKey};

/// Resolves issuer signing keys by id, refreshing the cached key set on
/// demand.
///
/// The cached [`KeySet`] is the only shared mutable state in the crate.
/// Refreshes are single-flight: concurrent lookups that miss the cache
/// serialize on one fetch and share its outcome instead of issuing
/// duplicate network calls.
pub struct KeyResolver {
    jwks_url: Url,
    http: reqwest::Client,
    cache_ttl: Duration,
    stale_fallback: bool,
    cache: RwLock<Option<Arc<KeySet>>>,
    fetch_lock: Mutex<()>,
}

impl KeyResolver {
    /// Creates a resolver with an empty cache.
    pub fn new(config: &AuthConfig) -> Result<KeyResolver, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(config.fetch_timeout())
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(KeyResolver {
            jwks_url: config.jwks_url().clone(),
            http,
            cache_ttl: config.cache_ttl(),
            stale_fallback: config.stale_fallback(),
            cache: RwLock::new(None),
            fetch_lock: Mutex::new(()),
        })
    }

    /// Produces the signing key published under `kid`.
    ///
    /// A fresh cached set containing the key answers immediately. A stale
    /// set, an empty cache, or an unknown `kid` (keys may have rotated)
    /// each trigger at most one refresh before the lookup fails with
    /// [`KeyResolutionError::UnknownKey`]. When the source is unavailable
    /// the stale set is consulted only if the config opted into the
    /// fallback.
    pub async fn resolve(&self, kid: &str) -> Result<SigningKey, KeyResolutionError> {
        let seen = self.cache.read().await.clone();
        if let Some(set) = &seen {
            if set.age() <= self.cache_ttl {
                if let Some(key) = set.get(kid) {
                    return Ok(key.clone());
                }
            }
        }

        match self.refresh(seen.as_ref().map(|set| set.fetched_at())).await {
            Ok(set) => set
                .get(kid)
                .cloned()
                .ok_or_else(|| KeyResolutionError::UnknownKey { kid: kid.to_owned() }),
            Err(err) => {
                if self.stale_fallback {
                    if let Some(set) = &seen {
                        if let Some(key) = set.get(kid) {
                            warn!(
                                kid,
                                age_secs = set.age().as_secs(),
                                "key source unavailable, serving stale signing key"
                            );
                            return Ok(key.clone());
                        }
                    }
                }
                Err(KeyResolutionError::SourceUnavailable(err))
            }
        }
    }

    /// Fetches the key set now unless a fresh one is already cached.
    ///
    /// Called at startup so that an unreachable or misconfigured key
    /// source fails loudly instead of surfacing as per-request 401s.
    pub async fn prime(&self) -> Result<(), KeySourceError> {
        let seen = self.cache.read().await.clone();
        if let Some(set) = &seen {
            if set.age() <= self.cache_ttl {
                return Ok(());
            }
        }
        self.refresh(seen.as_ref().map(|set| set.fetched_at())).await.map(|_| ())
    }

    /// Replaces the cached set, collapsing concurrent refreshes into one
    /// fetch.
    ///
    /// `seen` is the `fetched_at` of the set the caller observed before
    /// deciding to refresh; if the cached set changed while waiting for
    /// the lock, that newer set is shared instead of fetching again.
    async fn refresh(&self, seen: Option<Instant>) -> Result<Arc<KeySet>, KeySourceError> {
        let _guard = self.fetch_lock.lock().await;

        if let Some(current) = self.cache.read().await.clone() {
            if seen != Some(current.fetched_at()) {
                return Ok(current);
            }
        }

        // TODO: rate-limit refreshes triggered by unknown kids so a flood of
        // tokens signed with a bogus key cannot hammer the key source.
        let set = Arc::new(self.fetch_key_set().await?);
        debug!(keys = set.len(), "refreshed signing key set");
        *self.cache.write().await = Some(Arc::clone(&set));
        Ok(set)
    }

    /// One fetch with a single bounded retry on availability failures.
    /// Malformed documents are never retried.
    async fn fetch_key_set(&self) -> Result<KeySet, KeySourceError> {
        match self.fetch_once().await {
            Err(err @ (KeySourceError::Fetch(_) | KeySourceError::UnexpectedStatus { .. })) => {
                warn!(error = %err, "key fetch failed, retrying once");
                self.fetch_once().await
            }
            outcome => outcome,
        }
    }

    async fn fetch_once(&self) -> Result<KeySet, KeySourceError> {
        let response = self
            .http
            .get(self.jwks_url.clone())
            .send()
            .await
            .map_err(KeySourceError::Fetch)?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeySourceError::UnexpectedStatus { status: status.as_u16() });
        }

        let document = response.json::<KeyResponse>().await.map_err(KeySourceError::Parse)?;
        KeySet::from_response(document)
    }
}

impl std::fmt::Debug for KeyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyResolver")
            .field("jwks_url", &self.jwks_url.as_str())
            .field("cache_ttl", &self.cache_ttl)
            .field("stale_fallback", &self.stale_fallback)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use serde_json::json;

    const ED_KID: &str = "ed-1";

    fn jwks_body() -> serde_json::Value {
        json!({
            "keys": [{
                "kty": "OKP",
                "kid": ED_KID,
                "crv": "Ed25519",
                "x": "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"
            }]
        })
    }

    fn config_for(server: &MockServer) -> AuthConfig {
        AuthConfig::new("https://issuer.test", "test-audience")
            .expect("valid config")
            .with_jwks_url(Url::parse(&server.url("/jwks")).expect("valid url"))
    }

    #[actix_rt::test]
    async fn fresh_cache_answers_without_refetching() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(200).json_body(jwks_body());
        });

        let resolver = KeyResolver::new(&config_for(&server)).expect("resolver");
        let first = resolver.resolve(ED_KID).await.expect("first lookup");
        let second = resolver.resolve(ED_KID).await.expect("second lookup");

        assert_eq!(first.kid(), ED_KID);
        assert_eq!(second.kid(), ED_KID);
        assert_eq!(mock.hits(), 1);
    }

    #[actix_rt::test]
    async fn expired_cache_triggers_refresh() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(200).json_body(jwks_body());
        });

        let config = config_for(&server).with_cache_ttl(Duration::ZERO);
        let resolver = KeyResolver::new(&config).expect("resolver");
        resolver.resolve(ED_KID).await.expect("first lookup");
        resolver.resolve(ED_KID).await.expect("second lookup");

        assert_eq!(mock.hits(), 2);
    }

    #[actix_rt::test]
    async fn unknown_kid_fails_after_exactly_one_refresh() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(200).json_body(jwks_body());
        });

        let resolver = KeyResolver::new(&config_for(&server)).expect("resolver");
        resolver.resolve(ED_KID).await.expect("known kid resolves");

        let result = resolver.resolve("rotated-away").await;
        assert!(
            matches!(result, Err(KeyResolutionError::UnknownKey { ref kid }) if kid == "rotated-away"),
            "expected UnknownKey, got {result:?}"
        );
        // Initial fetch plus the one rotation-chasing refresh.
        assert_eq!(mock.hits(), 2);
    }

    #[actix_rt::test]
    async fn unreachable_source_without_cache_is_reported_after_one_retry() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(503);
        });

        let resolver = KeyResolver::new(&config_for(&server)).expect("resolver");
        let result = resolver.resolve(ED_KID).await;

        assert!(
            matches!(
                result,
                Err(KeyResolutionError::SourceUnavailable(KeySourceError::UnexpectedStatus {
                    status: 503
                }))
            ),
            "expected SourceUnavailable, got {result:?}"
        );
        assert_eq!(mock.hits(), 2, "one bounded retry");
    }

    #[actix_rt::test]
    async fn malformed_document_is_not_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(200).body("not json");
        });

        let resolver = KeyResolver::new(&config_for(&server)).expect("resolver");
        let result = resolver.resolve(ED_KID).await;

        assert!(matches!(
            result,
            Err(KeyResolutionError::SourceUnavailable(KeySourceError::Parse(_)))
        ));
        assert_eq!(mock.hits(), 1, "parse failures are terminal");
    }

    #[actix_rt::test]
    async fn stale_fallback_serves_cached_key_during_outage() {
        let server = MockServer::start();
        let mut ok = server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(200).json_body(jwks_body());
        });

        let config = config_for(&server).with_cache_ttl(Duration::ZERO).with_stale_fallback(true);
        let resolver = KeyResolver::new(&config).expect("resolver");
        resolver.resolve(ED_KID).await.expect("initial fetch");

        ok.delete();
        server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(503);
        });

        let key = resolver.resolve(ED_KID).await.expect("stale key served");
        assert_eq!(key.kid(), ED_KID);
    }

    #[actix_rt::test]
    async fn outage_with_stale_cache_fails_when_fallback_disabled() {
        let server = MockServer::start();
        let mut ok = server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(200).json_body(jwks_body());
        });

        let config = config_for(&server).with_cache_ttl(Duration::ZERO);
        let resolver = KeyResolver::new(&config).expect("resolver");
        resolver.resolve(ED_KID).await.expect("initial fetch");

        ok.delete();
        server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(503);
        });

        let result = resolver.resolve(ED_KID).await;
        assert!(matches!(result, Err(KeyResolutionError::SourceUnavailable(_))));
    }

    #[actix_rt::test]
    async fn concurrent_lookups_share_one_fetch() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(200).json_body(jwks_body());
        });

        let resolver = KeyResolver::new(&config_for(&server)).expect("resolver");
        let outcomes = join_all((0..8).map(|_| resolver.resolve(ED_KID))).await;

        for outcome in outcomes {
            assert_eq!(outcome.expect("shared fetch result").kid(), ED_KID);
        }
        assert_eq!(mock.hits(), 1, "cache misses collapse into one fetch");
    }

    #[actix_rt::test]
    async fn concurrent_lookups_across_expiry_share_one_refresh() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(200).json_body(jwks_body());
        });

        let config = config_for(&server).with_cache_ttl(Duration::ZERO);
        let resolver = KeyResolver::new(&config).expect("resolver");
        resolver.resolve(ED_KID).await.expect("initial fetch");

        // Every caller sees the expired set; the refresh they all trigger
        // collapses into one fetch whose outcome they share.
        let outcomes = join_all((0..8).map(|_| resolver.resolve(ED_KID))).await;
        for outcome in outcomes {
            assert_eq!(outcome.expect("shared refresh result").kid(), ED_KID);
        }
        assert_eq!(mock.hits(), 2, "initial fetch plus one shared refresh");
    }

    #[actix_rt::test]
    async fn prime_fetches_once_and_reuses_fresh_cache() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(200).json_body(jwks_body());
        });

        let resolver = KeyResolver::new(&config_for(&server)).expect("resolver");
        resolver.prime().await.expect("prime succeeds");
        resolver.prime().await.expect("second prime is a no-op");
        resolver.resolve(ED_KID).await.expect("resolves from primed cache");

        assert_eq!(mock.hits(), 1);
    }
}
