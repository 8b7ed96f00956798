use actix_web::http::header::{self, HeaderMap};
use actix_web::http::StatusCode;
use actix_web::{dev, web, FromRequest, HttpMessage, HttpRequest, HttpResponse, ResponseError};
use futures::future::LocalBoxFuture;
use serde_json::json;

use crate::jwk::AuthRejection;
use crate::{AuthenticatedContext, Error, TokenAuthority};

impl ResponseError for AuthRejection {
    fn status_code(&self) -> StatusCode {
        match self {
            // Authenticated, but the token does not grant the route's permission.
            AuthRejection::InsufficientPermission { .. } => StatusCode::FORBIDDEN,
            // Everything else means the request never authenticated.
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        HttpResponse::build(status)
            .insert_header((header::WWW_AUTHENTICATE, challenge_value(self)))
            .json(json!({
                "error": status.as_u16(),
                "message": self.to_string(),
            }))
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::Rejection(rejection) => rejection.status_code(),
            // Upstream key source problems are a gateway concern, not a
            // client authentication failure.
            Error::KeySource(_) => StatusCode::BAD_GATEWAY,
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            Error::Rejection(rejection) => rejection.error_response(),
            other => HttpResponse::build(other.status_code()).json(json!({
                "error": other.status_code().as_u16(),
                "message": "internal error during token verification",
            })),
        }
    }
}

/// Builds the RFC 6750 `WWW-Authenticate` challenge for a rejection.
fn challenge_value(rejection: &AuthRejection) -> String {
    let error_code = match rejection {
        AuthRejection::MissingToken => "invalid_request",
        AuthRejection::InsufficientPermission { .. } => "insufficient_scope",
        _ => "invalid_token",
    };
    let description = printable(&rejection.to_string());

    match rejection {
        AuthRejection::InsufficientPermission { required } => format!(
            r#"Bearer error="{error_code}", error_description="{description}", scope="{}""#,
            printable(required)
        ),
        _ => format!(r#"Bearer error="{error_code}", error_description="{description}""#),
    }
}

/// Header values must stay printable; rejection messages can echo
/// attacker-chosen fragments such as an algorithm name.
fn printable(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == '"' { '\'' } else { c })
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .collect()
}

/// The raw `Authorization` value, or empty when absent or not readable
/// as a string; the presence stage of the pipeline classifies both the
/// same way.
pub(crate) fn raw_authorization(headers: &HeaderMap) -> String {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned()
}

impl FromRequest for AuthenticatedContext {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        // A RequireScope middleware upstream already verified this request.
        if let Some(context) = req.extensions().get::<AuthenticatedContext>() {
            let context = context.clone();
            return Box::pin(async move { Ok(context) });
        }

        let authority = req
            .app_data::<web::Data<TokenAuthority>>()
            .expect("TokenAuthority should be initialized in application data")
            .clone();
        let header_value = raw_authorization(req.headers());

        Box::pin(async move {
            authority.authenticate(&header_value).await.map_err(actix_web::Error::from)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwk::{KeyResolutionError, KeySourceError};
    use actix_web::body::to_bytes;

    fn header_value(response: &HttpResponse, name: header::HeaderName) -> String {
        response
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_owned()
    }

    #[actix_rt::test]
    async fn insufficient_permission_maps_to_forbidden_with_scope_challenge() {
        let rejection = AuthRejection::InsufficientPermission { required: "delete:movies".into() };
        assert_eq!(rejection.status_code(), StatusCode::FORBIDDEN);

        let response = rejection.error_response();
        let challenge = header_value(&response, header::WWW_AUTHENTICATE);
        assert!(challenge.contains(r#"error="insufficient_scope""#), "got {challenge}");
        assert!(challenge.contains(r#"scope="delete:movies""#), "got {challenge}");

        let body = to_bytes(response.into_body()).await.expect("body");
        let body: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(body["error"], 403);
    }

    #[actix_rt::test]
    async fn authentication_failures_map_to_unauthorized() {
        let rejections = [
            AuthRejection::MissingToken,
            AuthRejection::MalformedToken,
            AuthRejection::UnsupportedAlgorithm("none".into()),
            AuthRejection::InvalidSignature,
            AuthRejection::ExpiredToken,
            AuthRejection::InvalidIssuer,
            AuthRejection::InvalidAudience,
            AuthRejection::KeyResolution(KeyResolutionError::UnknownKey { kid: "k".into() }),
            AuthRejection::KeyResolution(KeyResolutionError::SourceUnavailable(
                KeySourceError::EmptyKeySet,
            )),
        ];
        for rejection in rejections {
            assert_eq!(rejection.status_code(), StatusCode::UNAUTHORIZED, "{rejection}");
        }
    }

    #[actix_rt::test]
    async fn missing_token_challenge_uses_invalid_request() {
        let response = AuthRejection::MissingToken.error_response();
        let challenge = header_value(&response, header::WWW_AUTHENTICATE);
        assert!(challenge.starts_with("Bearer "));
        assert!(challenge.contains(r#"error="invalid_request""#));
    }

    #[actix_rt::test]
    async fn challenge_neutralizes_attacker_chosen_fragments() {
        let rejection = AuthRejection::UnsupportedAlgorithm("RS256\", realm=\"pwned".into());
        let response = rejection.error_response();
        let challenge = header_value(&response, header::WWW_AUTHENTICATE);
        assert!(!challenge.contains("realm=\"pwned"), "got {challenge}");
    }

    #[actix_rt::test]
    async fn systemic_errors_do_not_masquerade_as_client_rejections() {
        let error = Error::KeySource(KeySourceError::EmptyKeySet);
        assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);

        let body = to_bytes(error.error_response().into_body()).await.expect("body");
        let body: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(body["message"], "internal error during token verification");
    }
}
