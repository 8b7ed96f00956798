/// A crate-wide result type alias using the custom [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the authorization component.
///
/// Per-request rejections stay distinct from systemic failures: a
/// [`ConfigError`](crate::ConfigError) or a startup
/// [`KeySourceError`](crate::KeySourceError) should abort service
/// bring-up, never masquerade as a 401.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid verification policy or environment configuration.
    #[error(transparent)]
    Config(#[from] crate::jwk::ConfigError),

    /// The issuer's published-keys document could not be obtained.
    #[error(transparent)]
    KeySource(#[from] crate::jwk::KeySourceError),

    /// A classified per-request rejection.
    #[error(transparent)]
    Rejection(#[from] crate::jwk::AuthRejection),
}
