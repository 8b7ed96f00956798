use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::jwk::AuthRejection;

/// The `aud` claim: a single audience or a list of them.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// One audience identifier.
    One(String),
    /// Several audience identifiers; the token is acceptable to each.
    Many(Vec<String>),
}

impl Audience {
    /// Whether `expected` is (or is among) the claimed audiences.
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::One(audience) => audience == expected,
            Audience::Many(audiences) => audiences.iter().any(|audience| audience == expected),
        }
    }
}

/// The claim set of a verified token.
///
/// Grants appear either as a `permissions` array or as a whitespace
/// separated `scope` string, depending on how the issuer was configured;
/// both forms are honored. `iss` and `aud` are optional at the parsing
/// layer so their absence fails the corresponding claim check instead of
/// surfacing as a parse error.
#[derive(Clone, Debug, Deserialize)]
pub struct Claims {
    /// Issuer of the token.
    #[serde(default)]
    pub iss: Option<String>,

    /// Audience(s) the token was minted for.
    #[serde(default)]
    pub aud: Option<Audience>,

    /// Subject, the unique identifier of the authenticated principal.
    pub sub: String,

    /// Expiration time (epoch seconds).
    pub exp: u64,

    /// Issued-at time (epoch seconds).
    #[serde(default)]
    pub iat: Option<u64>,

    /// Granted permissions as an explicit list.
    #[serde(default)]
    pub permissions: Vec<String>,

    /// Granted permissions as a whitespace-separated scope string.
    #[serde(default)]
    pub scope: Option<String>,
}

impl Claims {
    /// Whether the claims grant `required` exactly.
    ///
    /// Membership is plain string equality over the union of the
    /// `permissions` list and the split `scope` string; there is no
    /// wildcard or prefix matching.
    pub fn grants(&self, required: &str) -> bool {
        self.permissions.iter().any(|permission| permission == required)
            || self
                .scope
                .as_deref()
                .is_some_and(|scope| scope.split_whitespace().any(|grant| grant == required))
    }

    /// The union of both grant forms.
    pub fn granted_permissions(&self) -> HashSet<String> {
        let mut grants: HashSet<String> = self.permissions.iter().cloned().collect();
        if let Some(scope) = self.scope.as_deref() {
            grants.extend(scope.split_whitespace().map(str::to_owned));
        }
        grants
    }
}

/// The successful outcome of an authorization: who the caller is and what
/// they may do, for the lifetime of one request.
#[derive(Clone, Debug, Serialize)]
pub struct AuthenticatedContext {
    /// Subject identifier taken from the token's `sub` claim.
    pub subject: String,

    /// The verified permission set.
    pub permissions: HashSet<String>,
}

impl AuthenticatedContext {
    /// Whether `permission` was granted. Exact string membership.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// Re-checks a permission against this already-verified context.
    pub fn require(&self, permission: &str) -> Result<(), AuthRejection> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(AuthRejection::InsufficientPermission { required: permission.to_owned() })
        }
    }
}

impl From<Claims> for AuthenticatedContext {
    fn from(claims: Claims) -> AuthenticatedContext {
        AuthenticatedContext { permissions: claims.granted_permissions(), subject: claims.sub }
    }
}
