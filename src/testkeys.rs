//! RSA key material and token-minting helpers shared by the test modules.

use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::prelude::BASE64_URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use openssl::rsa::Rsa;
use serde_json::{json, Value};

use crate::jwk::{KeySet, SigningKey};

/// The key the simulated issuer publishes and signs with.
pub(crate) static ISSUER_KEY: LazyLock<IssuerKey> = LazyLock::new(|| IssuerKey::generate("issuer-key-1"));

/// A key no key source ever publishes.
pub(crate) static ROGUE_KEY: LazyLock<IssuerKey> = LazyLock::new(|| IssuerKey::generate("rogue-key-1"));

pub(crate) struct IssuerKey {
    pub(crate) kid: &'static str,
    n: String,
    e: String,
    encoding: EncodingKey,
}

impl IssuerKey {
    fn generate(kid: &'static str) -> IssuerKey {
        let rsa = Rsa::generate(2048).expect("rsa keygen");
        let pem = rsa.private_key_to_pem().expect("private key pem");
        IssuerKey {
            kid,
            n: BASE64_URL_SAFE_NO_PAD.encode(rsa.n().to_vec()),
            e: BASE64_URL_SAFE_NO_PAD.encode(rsa.e().to_vec()),
            encoding: EncodingKey::from_rsa_pem(&pem).expect("encoding key"),
        }
    }

    /// The published-keys document announcing this key.
    pub(crate) fn jwks_document(&self) -> Value {
        json!({
            "keys": [{
                "kty": "RSA",
                "kid": self.kid,
                "alg": "RS256",
                "use": "sig",
                "n": self.n,
                "e": self.e,
            }]
        })
    }

    /// The prepared verification key, as the resolver would build it.
    pub(crate) fn verification_key(&self) -> SigningKey {
        let response = serde_json::from_value(self.jwks_document()).expect("document parses");
        let set = KeySet::from_response(response).expect("usable key");
        set.get(self.kid).expect("kid present").clone()
    }

    /// Signs `claims` into a compact RS256 token naming this key.
    pub(crate) fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.to_owned());
        jsonwebtoken::encode(&header, claims, &self.encoding).expect("token encodes")
    }
}

pub(crate) fn epoch() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("clock after epoch").as_secs()
}

/// Claims accepted by a verifier configured for
/// `https://issuer.test` / `test-audience`.
pub(crate) fn standard_claims(permissions: &[&str]) -> Value {
    json!({
        "iss": "https://issuer.test/",
        "aud": "test-audience",
        "sub": "auth0|director-1",
        "iat": epoch(),
        "exp": epoch() + 3600,
        "permissions": permissions,
    })
}
