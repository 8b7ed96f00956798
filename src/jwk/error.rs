use jsonwebtoken::Algorithm;
use thiserror::Error;

/// Classified per-request rejections produced by the authorization pipeline.
///
/// Every variant is terminal for the request it rejects; the pipeline never
/// retries a rejected token. Messages are safe to return to clients: they
/// carry no key material and no raw claim contents.
#[derive(Debug, Error)]
pub enum AuthRejection {
    /// No credential supplied, or the `Authorization` value does not carry
    /// a `Bearer` scheme with a non-empty token.
    #[error("bearer token missing from request")]
    MissingToken,

    /// The token is not a well-formed three-segment compact JWT, or one of
    /// its segments cannot be decoded.
    #[error("token is malformed")]
    MalformedToken,

    /// The token header names an algorithm that is unsigned, symmetric, or
    /// not on the configured allow-list.
    #[error("signing algorithm '{0}' is not accepted")]
    UnsupportedAlgorithm(String),

    /// The signing key named by the token header could not be resolved.
    #[error("unable to resolve signing key")]
    KeyResolution(#[from] KeyResolutionError),

    /// The signature does not verify against the resolved public key.
    #[error("token signature is invalid")]
    InvalidSignature,

    /// The `exp` claim is not strictly in the future (allowing for the
    /// configured clock skew).
    #[error("token has expired")]
    ExpiredToken,

    /// The `iss` claim is absent or does not equal the expected issuer.
    #[error("token issuer is not accepted")]
    InvalidIssuer,

    /// The `aud` claim is absent or does not include the expected audience.
    #[error("token audience is not accepted")]
    InvalidAudience,

    /// The token is authentic but does not grant the required permission.
    #[error("permission '{required}' is not granted")]
    InsufficientPermission {
        /// The route's required-permission literal that the token lacks.
        required: String,
    },
}

/// Failures of [`KeyResolver::resolve`](crate::KeyResolver::resolve).
#[derive(Debug, Error)]
pub enum KeyResolutionError {
    /// After one refresh attempt, no published key matched the requested
    /// key id.
    #[error("no signing key published for kid '{kid}'")]
    UnknownKey {
        /// The key id taken from the token header.
        kid: String,
    },

    /// The key source could not produce a usable key set and no acceptable
    /// cached set was available.
    #[error("signing key source unavailable")]
    SourceUnavailable(#[source] KeySourceError),
}

/// Failures while fetching or decoding the issuer's published-keys document.
#[derive(Debug, Error)]
pub enum KeySourceError {
    /// The HTTP request to the key source failed (unreachable, timeout).
    #[error("failed to fetch signing keys: {0}")]
    Fetch(#[source] reqwest::Error),

    /// The key source answered with a non-success status.
    #[error("key source returned HTTP {status}")]
    UnexpectedStatus {
        /// The HTTP status code of the response.
        status: u16,
    },

    /// The response body was not a valid published-keys document.
    #[error("failed to parse published keys document: {0}")]
    Parse(#[source] reqwest::Error),

    /// The document parsed but contained no usable verification keys.
    #[error("published keys document contains no usable keys")]
    EmptyKeySet,
}

/// Configuration errors, surfaced at construction time rather than as
/// per-request rejections.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The issuer or key-source URL could not be parsed.
    #[error("invalid key source url: {0}")]
    InvalidKeySourceUrl(#[source] url::ParseError),

    /// An empty algorithm allow-list would reject every token.
    #[error("allowed signing algorithm list is empty")]
    EmptyAlgorithmAllowList,

    /// Symmetric algorithms cannot be allow-listed; token verification here
    /// only ever holds public key material.
    #[error("algorithm {0:?} cannot be allow-listed")]
    ForbiddenAlgorithm(Algorithm),

    /// A required environment variable is not set.
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),

    /// An environment variable is set to an unparseable value.
    #[error("invalid value '{value}' for environment variable {name}")]
    InvalidEnv {
        /// The variable name.
        name: &'static str,
        /// The offending value.
        value: String,
    },

    /// The HTTP client for the key source could not be constructed.
    #[error("failed to build key source http client: {0}")]
    HttpClient(#[source] reqwest::Error),
}
