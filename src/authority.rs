use std::sync::Arc;

use tracing::debug;

use crate::context::{AuthenticatedContext, Claims};
use crate::jwk::{AuthConfig, AuthRejection, KeyResolver, TokenVerifier};

/// The per-request authorization gate.
///
/// Holds the verification policy and the signing-key cache. Cheap to
/// clone (clones share the cache) and safe to call concurrently; each
/// call is a single pass through the ordered verification pipeline with
/// no retries and no state of its own.
///
/// Create one instance at service startup, [`warm_up`](Self::warm_up) it,
/// and hand it to the web framework as shared application data.
#[derive(Clone, Debug)]
pub struct TokenAuthority {
    inner: Arc<AuthorityInner>,
}

#[derive(Debug)]
struct AuthorityInner {
    verifier: TokenVerifier,
    resolver: KeyResolver,
}

impl TokenAuthority {
    /// Builds an authority from a validated config. No network traffic
    /// happens here; the key cache fills on [`warm_up`](Self::warm_up) or
    /// on the first authorization.
    pub fn new(config: AuthConfig) -> crate::Result<TokenAuthority> {
        let resolver = KeyResolver::new(&config)?;
        Ok(TokenAuthority {
            inner: Arc::new(AuthorityInner { verifier: TokenVerifier::new(config), resolver }),
        })
    }

    /// Fetches the issuer's keys now, so an unreachable or misconfigured
    /// key source aborts startup instead of rejecting every request with
    /// a generic 401 later.
    pub async fn warm_up(&self) -> crate::Result<()> {
        self.inner.resolver.prime().await.map_err(crate::Error::from)
    }

    /// Decides whether `header_value` carries a token that is authentic,
    /// current, correctly issued, and grants `required_permission`.
    ///
    /// `header_value` is the raw `Authorization` header value including
    /// the `Bearer` scheme prefix. The first failing stage rejects the
    /// request; see [`AuthRejection`] for the taxonomy.
    pub async fn authorize(
        &self,
        header_value: &str,
        required_permission: &str,
    ) -> Result<AuthenticatedContext, AuthRejection> {
        let claims = self.verified_claims(header_value).await?;
        if !claims.grants(required_permission) {
            debug!(subject = %claims.sub, required_permission, "verified token lacks permission");
            return Err(AuthRejection::InsufficientPermission {
                required: required_permission.to_owned(),
            });
        }
        Ok(claims.into())
    }

    /// Verifies authenticity and claims without demanding a permission.
    ///
    /// Used by the extractor; route-level permission enforcement belongs
    /// to [`authorize`](Self::authorize) or
    /// [`AuthenticatedContext::require`].
    pub async fn authenticate(
        &self,
        header_value: &str,
    ) -> Result<AuthenticatedContext, AuthRejection> {
        self.verified_claims(header_value).await.map(Into::into)
    }

    /// Stages 1-6: presence, structure, header, key, signature, claims.
    async fn verified_claims(&self, header_value: &str) -> Result<Claims, AuthRejection> {
        let token = bearer_token(header_value)?;
        let header = self.inner.verifier.parse_header(token)?;
        let key = self.inner.resolver.resolve(&header.kid).await?;
        self.inner.verifier.verify(token, &header, &key)
    }
}

/// Extracts the token from an `Authorization` value. The scheme is
/// matched case-insensitively per RFC 9110; anything other than a
/// `Bearer` credential with a non-empty token counts as missing.
fn bearer_token(header_value: &str) -> Result<&str, AuthRejection> {
    let (scheme, token) =
        header_value.trim().split_once(' ').ok_or(AuthRejection::MissingToken)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthRejection::MissingToken);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthRejection::MissingToken);
    }
    Ok(token)
}
