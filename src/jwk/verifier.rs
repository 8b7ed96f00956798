use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::prelude::BASE64_URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation};
use serde::Deserialize;

use super::config::AuthConfig;
use super::error::AuthRejection;
use super::key::SigningKey;
use crate::context::Claims;

/// Algorithms that are never accepted, whatever the configured allow-list
/// says: `none` skips verification entirely and the HS family would treat
/// published key material as a shared secret.
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none", "HS256", "HS384", "HS512"];

/// Token header fields, parsed leniently so that disallowed algorithm
/// names (`"none"` included) survive to the allow-list check instead of
/// failing as unparseable.
#[derive(Debug, Deserialize)]
struct TokenHeader {
    #[serde(default)]
    alg: Option<String>,
    #[serde(default)]
    kid: Option<String>,
}

/// Outcome of the structural and header-validation stages.
#[derive(Debug)]
pub(crate) struct ParsedHeader {
    pub(crate) algorithm: Algorithm,
    pub(crate) kid: String,
}

/// Stateless verification pipeline: structure, header, signature, claims.
///
/// Key resolution sits between [`parse_header`](TokenVerifier::parse_header)
/// and [`verify`](TokenVerifier::verify) and belongs to
/// [`KeyResolver`](super::resolver::KeyResolver).
#[derive(Debug)]
pub(crate) struct TokenVerifier {
    config: AuthConfig,
}

impl TokenVerifier {
    pub(crate) fn new(config: AuthConfig) -> TokenVerifier {
        TokenVerifier { config }
    }

    /// Structural parse and header validation.
    ///
    /// The token must consist of three base64url segments with a JSON
    /// header. The declared algorithm must be on the configured allow-list
    /// and the header must name the signing key. Claim bytes are only
    /// decoded, not interpreted; their content is untrusted until the
    /// signature has been verified.
    pub(crate) fn parse_header(&self, token: &str) -> Result<ParsedHeader, AuthRejection> {
        let mut segments = token.split('.');
        let (Some(header), Some(claims), Some(signature), None) =
            (segments.next(), segments.next(), segments.next(), segments.next())
        else {
            return Err(AuthRejection::MalformedToken);
        };

        let header_bytes = BASE64_URL_SAFE_NO_PAD
            .decode(header)
            .map_err(|_| AuthRejection::MalformedToken)?;
        BASE64_URL_SAFE_NO_PAD.decode(claims).map_err(|_| AuthRejection::MalformedToken)?;
        BASE64_URL_SAFE_NO_PAD.decode(signature).map_err(|_| AuthRejection::MalformedToken)?;

        let header: TokenHeader =
            serde_json::from_slice(&header_bytes).map_err(|_| AuthRejection::MalformedToken)?;

        // An absent alg member is equivalent to an unsigned token.
        let alg = header.alg.unwrap_or_else(|| "none".to_owned());
        if FORBIDDEN_ALGORITHMS.contains(&alg.as_str()) {
            return Err(AuthRejection::UnsupportedAlgorithm(alg));
        }
        let algorithm = Algorithm::from_str(&alg)
            .map_err(|_| AuthRejection::UnsupportedAlgorithm(alg.clone()))?;
        if !self.config.allowed_algorithms().contains(&algorithm) {
            return Err(AuthRejection::UnsupportedAlgorithm(alg));
        }

        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or(AuthRejection::MalformedToken)?;

        Ok(ParsedHeader { algorithm, kid })
    }

    /// Signature verification followed by ordered claim validation.
    ///
    /// The signature is checked first, over the raw header+claims bytes,
    /// so a tampered claims segment is always an [`InvalidSignature`]
    /// rejection rather than a claim-validation one. Expiry, issuer and
    /// audience checks run here rather than inside `jsonwebtoken` to keep
    /// their failures distinguishable.
    ///
    /// [`InvalidSignature`]: AuthRejection::InvalidSignature
    pub(crate) fn verify(
        &self,
        token: &str,
        header: &ParsedHeader,
        key: &SigningKey,
    ) -> Result<Claims, AuthRejection> {
        let mut validation = Validation::new(header.algorithm);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let claims = jsonwebtoken::decode::<Claims>(token, key.decoding_key(), &validation)
            .map_err(|err| match err.kind() {
                ErrorKind::InvalidSignature => AuthRejection::InvalidSignature,
                _ => AuthRejection::MalformedToken,
            })?
            .claims;

        let now = unix_now();
        if claims.exp.saturating_add(self.config.clock_skew().as_secs()) <= now {
            return Err(AuthRejection::ExpiredToken);
        }
        if claims.iss.as_deref() != Some(self.config.issuer()) {
            return Err(AuthRejection::InvalidIssuer);
        }
        if !claims.aud.as_ref().is_some_and(|aud| aud.contains(self.config.audience())) {
            return Err(AuthRejection::InvalidAudience);
        }

        Ok(claims)
    }
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|elapsed| elapsed.as_secs()).unwrap_or(0)
}
