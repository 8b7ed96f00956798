use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};

use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use super::error::KeySourceError;

/// The issuer's published-keys document: `{"keys": [...]}`.
#[derive(Debug, Deserialize)]
pub(crate) struct KeyResponse {
    pub(crate) keys: Vec<JwkKey>,
}

/// Wire form of a single published key.
///
/// Only the members needed to build a verification key are kept; unknown
/// members are ignored. Key-type specific material is optional here and
/// checked when the key is converted.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct JwkKey {
    pub(crate) kty: String,
    pub(crate) kid: String,
    #[serde(default)]
    pub(crate) alg: Option<String>,
    #[serde(default, rename = "use")]
    pub(crate) usage: Option<String>,
    // RSA
    #[serde(default)]
    pub(crate) n: Option<String>,
    #[serde(default)]
    pub(crate) e: Option<String>,
    // EC / OKP
    #[serde(default)]
    pub(crate) crv: Option<String>,
    #[serde(default)]
    pub(crate) x: Option<String>,
    #[serde(default)]
    pub(crate) y: Option<String>,
}

/// Why one published key was skipped while building a [`KeySet`].
#[derive(Debug, Error)]
pub(crate) enum KeyMaterialError {
    #[error("key is not for signature use")]
    NotForSignatures,
    #[error("unsupported key type '{0}'")]
    UnsupportedKeyType(String),
    #[error("missing {0} material")]
    MissingMaterial(&'static str),
    #[error("undecodable key material")]
    Undecodable(#[source] jsonwebtoken::errors::Error),
}

impl JwkKey {
    /// Builds the prepared verification key for this entry.
    fn to_signing_key(&self) -> Result<SigningKey, KeyMaterialError> {
        if self.usage.as_deref().is_some_and(|u| u != "sig") {
            return Err(KeyMaterialError::NotForSignatures);
        }

        let declared = self
            .alg
            .as_deref()
            .and_then(|alg| Algorithm::from_str(alg).ok());

        let (decoding, fallback_alg) = match self.kty.as_str() {
            "RSA" => {
                let n = self.n.as_deref().ok_or(KeyMaterialError::MissingMaterial("modulus"))?;
                let e = self.e.as_deref().ok_or(KeyMaterialError::MissingMaterial("exponent"))?;
                let key = DecodingKey::from_rsa_components(n, e)
                    .map_err(KeyMaterialError::Undecodable)?;
                (key, Algorithm::RS256)
            }
            "EC" => {
                let x = self.x.as_deref().ok_or(KeyMaterialError::MissingMaterial("curve point"))?;
                let y = self.y.as_deref().ok_or(KeyMaterialError::MissingMaterial("curve point"))?;
                let key = DecodingKey::from_ec_components(x, y)
                    .map_err(KeyMaterialError::Undecodable)?;
                let alg = match self.crv.as_deref() {
                    Some("P-384") => Algorithm::ES384,
                    _ => Algorithm::ES256,
                };
                (key, alg)
            }
            "OKP" => {
                let x = self.x.as_deref().ok_or(KeyMaterialError::MissingMaterial("curve point"))?;
                let key = DecodingKey::from_ed_components(x)
                    .map_err(KeyMaterialError::Undecodable)?;
                (key, Algorithm::EdDSA)
            }
            other => return Err(KeyMaterialError::UnsupportedKeyType(other.to_owned())),
        };

        Ok(SigningKey {
            kid: self.kid.clone(),
            algorithm: declared.unwrap_or(fallback_alg),
            decoding,
        })
    }
}

/// One resolved issuer verification key, immutable once built.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    algorithm: Algorithm,
    decoding: DecodingKey,
}

impl SigningKey {
    /// The key id this key is published under.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The signing algorithm the issuer declared for this key.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

impl std::fmt::Debug for SigningKey {
    // Key material stays out of logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// A snapshot of the issuer's key set, replaced wholesale on refresh.
pub struct KeySet {
    keys: HashMap<String, SigningKey>,
    fetched_at: Instant,
}

impl KeySet {
    /// Builds a key set from a published-keys document, skipping entries
    /// that cannot serve as verification keys.
    pub(crate) fn from_response(response: KeyResponse) -> Result<Self, KeySourceError> {
        let mut keys = HashMap::with_capacity(response.keys.len());
        for jwk in &response.keys {
            match jwk.to_signing_key() {
                Ok(key) => {
                    keys.insert(key.kid.clone(), key);
                }
                Err(reason) => {
                    warn!(kid = %jwk.kid, %reason, "skipping unusable published key");
                }
            }
        }
        if keys.is_empty() {
            return Err(KeySourceError::EmptyKeySet);
        }
        Ok(KeySet { keys, fetched_at: Instant::now() })
    }

    /// Looks up a key by its id.
    pub fn get(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.get(kid)
    }

    /// Time elapsed since this set was fetched.
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    pub(crate) fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    /// Number of usable keys in the set.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set holds no keys. Never true for a set built by
    /// [`KeySet::from_response`].
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
