//! # actix-scope-auth
//!
//! Scoped bearer-token authorization for `actix-web`: verifies compact
//! signed tokens against an issuer's published JWKs and enforces one
//! required-permission literal per route.
//!
//! The crate deliberately stops at the authorization decision. Handlers,
//! persistence and response shaping stay in the application; each route
//! declares the permission it demands and receives either an
//! [`AuthenticatedContext`] or an already-mapped 401/403.
//!
//! ## Example
//!
//! ```no_run
//! use actix_scope_auth::{AuthConfig, AuthenticatedContext, RequireScope, TokenAuthority};
//! use actix_web::{web, App, HttpResponse, HttpServer};
//!
//! #[actix_web::main]
//! async fn main() -> std::io::Result<()> {
//!     let config = AuthConfig::new("https://your-tenant.example.com", "castings-api")
//!         .expect("valid auth config");
//!     let authority = TokenAuthority::new(config).expect("authority builds");
//!     authority.warm_up().await.expect("key source reachable");
//!
//!     HttpServer::new(move || {
//!         App::new()
//!             .app_data(web::Data::new(authority.clone()))
//!             .service(
//!                 web::resource("/movies")
//!                     .wrap(RequireScope::new("get:movies"))
//!                     .route(web::get().to(list_movies)),
//!             )
//!     })
//!     .bind(("127.0.0.1", 8080))?
//!     .run()
//!     .await
//! }
//!
//! async fn list_movies(context: AuthenticatedContext) -> HttpResponse {
//!     HttpResponse::Ok().json(context)
//! }
//! ```

mod authority;
mod context;
mod error;
mod impls;
mod jwk;
mod middleware;
#[cfg(test)]
mod testkeys;

pub use authority::*;
pub use context::*;
pub use error::*;
pub use middleware::*;

pub use jwk::{
    AuthConfig, AuthRejection, ConfigError, Issuer, KeyResolutionError, KeyResolver, KeySet,
    KeySourceError, SigningKey, DEFAULT_FETCH_TIMEOUT, DEFAULT_KEY_CACHE_TTL,
    FORBIDDEN_ALGORITHMS,
};
