use std::env;
use std::ops::Deref;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use url::Url;

use super::error::ConfigError;

/// How long a fetched key set is trusted before a lookup forces a refresh.
pub const DEFAULT_KEY_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Timeout applied to each fetch of the published-keys document.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// The expected issuer of accepted tokens, normalized with a trailing slash
/// to match the `iss` claim format used by hosted identity providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issuer(String);

impl Issuer {
    /// Normalizes an issuer URL.
    pub fn new(url: impl AsRef<str>) -> Issuer {
        let url = url.as_ref();
        if url.ends_with('/') {
            Issuer(url.to_owned())
        } else {
            Issuer(format!("{url}/"))
        }
    }
}

impl Deref for Issuer {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        self.0.as_str()
    }
}

/// Verification policy for the token authorizer and its key resolver.
///
/// Constructed with [`AuthConfig::new`] and adjusted through the `with_*`
/// methods, or read from the environment with [`AuthConfig::from_env`].
#[derive(Debug, Clone)]
pub struct AuthConfig {
    issuer: Issuer,
    audience: String,
    jwks_url: Url,
    allowed_algorithms: Vec<Algorithm>,
    cache_ttl: Duration,
    clock_skew: Duration,
    stale_fallback: bool,
    fetch_timeout: Duration,
}

impl AuthConfig {
    /// Creates a config for one issuer/audience pair.
    ///
    /// The key-source URL defaults to the issuer's
    /// `.well-known/jwks.json` document and the algorithm allow-list to
    /// `[RS256]`.
    pub fn new(
        issuer: impl AsRef<str>,
        audience: impl Into<String>,
    ) -> Result<AuthConfig, ConfigError> {
        let issuer = Issuer::new(issuer);
        let jwks_url = Url::parse(&format!("{}.well-known/jwks.json", &*issuer))
            .map_err(ConfigError::InvalidKeySourceUrl)?;

        Ok(AuthConfig {
            issuer,
            audience: audience.into(),
            jwks_url,
            allowed_algorithms: vec![Algorithm::RS256],
            cache_ttl: DEFAULT_KEY_CACHE_TTL,
            clock_skew: Duration::ZERO,
            stale_fallback: false,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        })
    }

    /// Reads the config from `AUTH_*` environment variables.
    ///
    /// `AUTH_ISSUER` and `AUTH_AUDIENCE` are required. `AUTH_JWKS_URL`,
    /// `AUTH_ALLOWED_ALGS` (comma separated), `AUTH_KEY_CACHE_TTL_SECS`,
    /// `AUTH_CLOCK_SKEW_SECS` and `AUTH_STALE_FALLBACK` override defaults.
    pub fn from_env() -> Result<AuthConfig, ConfigError> {
        let issuer = require_env("AUTH_ISSUER")?;
        let audience = require_env("AUTH_AUDIENCE")?;
        let mut config = AuthConfig::new(issuer, audience)?;

        if let Some(url) = optional_env("AUTH_JWKS_URL") {
            let url = Url::parse(&url).map_err(ConfigError::InvalidKeySourceUrl)?;
            config = config.with_jwks_url(url);
        }
        if let Some(algs) = optional_env("AUTH_ALLOWED_ALGS") {
            let parsed = algs
                .split(',')
                .map(str::trim)
                .filter(|alg| !alg.is_empty())
                .map(|alg| {
                    Algorithm::from_str(alg).map_err(|_| ConfigError::InvalidEnv {
                        name: "AUTH_ALLOWED_ALGS",
                        value: alg.to_owned(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            config = config.with_allowed_algorithms(parsed)?;
        }
        if let Some(secs) = optional_env("AUTH_KEY_CACHE_TTL_SECS") {
            config.cache_ttl = Duration::from_secs(parse_env("AUTH_KEY_CACHE_TTL_SECS", &secs)?);
        }
        if let Some(secs) = optional_env("AUTH_CLOCK_SKEW_SECS") {
            config.clock_skew = Duration::from_secs(parse_env("AUTH_CLOCK_SKEW_SECS", &secs)?);
        }
        if let Some(flag) = optional_env("AUTH_STALE_FALLBACK") {
            config.stale_fallback = parse_env("AUTH_STALE_FALLBACK", &flag)?;
        }

        Ok(config)
    }

    /// Overrides the key-source URL.
    pub fn with_jwks_url(mut self, url: Url) -> AuthConfig {
        self.jwks_url = url;
        self
    }

    /// Replaces the algorithm allow-list.
    ///
    /// The list must be non-empty and must not contain symmetric
    /// algorithms; `none` is not representable and is rejected during
    /// header validation.
    pub fn with_allowed_algorithms(
        mut self,
        algorithms: Vec<Algorithm>,
    ) -> Result<AuthConfig, ConfigError> {
        if algorithms.is_empty() {
            return Err(ConfigError::EmptyAlgorithmAllowList);
        }
        if let Some(&symmetric) = algorithms
            .iter()
            .find(|alg| matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512))
        {
            return Err(ConfigError::ForbiddenAlgorithm(symmetric));
        }
        self.allowed_algorithms = algorithms;
        Ok(self)
    }

    /// Overrides the key-cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> AuthConfig {
        self.cache_ttl = ttl;
        self
    }

    /// Sets the clock-skew allowance applied to expiry checks.
    pub fn with_clock_skew(mut self, skew: Duration) -> AuthConfig {
        self.clock_skew = skew;
        self
    }

    /// Serves stale cached keys when the key source is unreachable.
    ///
    /// Off by default: a stale set may still contain rotated-out keys.
    pub fn with_stale_fallback(mut self, enabled: bool) -> AuthConfig {
        self.stale_fallback = enabled;
        self
    }

    /// Overrides the per-fetch timeout for the key source.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> AuthConfig {
        self.fetch_timeout = timeout;
        self
    }

    /// The expected `iss` claim value.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// The expected `aud` claim value.
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Where the published-keys document is fetched from.
    pub fn jwks_url(&self) -> &Url {
        &self.jwks_url
    }

    /// Accepted signing algorithms.
    pub fn allowed_algorithms(&self) -> &[Algorithm] {
        &self.allowed_algorithms
    }

    /// How long a fetched key set is trusted.
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Clock-skew allowance for expiry checks.
    pub fn clock_skew(&self) -> Duration {
        self.clock_skew
    }

    /// Whether stale keys may be served during key-source outages.
    pub fn stale_fallback(&self) -> bool {
        self.stale_fallback
    }

    /// Per-fetch timeout for the key source.
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }
}

fn require_env(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).ok().filter(|v| !v.is_empty()).ok_or(ConfigError::MissingEnv(name))
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnv { name, value: value.to_owned() })
}
