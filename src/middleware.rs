use std::rc::Rc;

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{web, HttpMessage};
use futures::future::{ok, LocalBoxFuture, Ready};
use tracing::debug;

use crate::impls::raw_authorization;
use crate::TokenAuthority;

/// Route guard enforcing one required-permission literal.
///
/// Wrap a route or resource with `RequireScope::new("delete:movies")` and
/// every request to it passes through the full authorization pipeline
/// before the handler runs. On success the [`AuthenticatedContext`] is
/// stored in the request extensions, where the extractor picks it up
/// without verifying twice; on rejection the request is answered with the
/// mapped 401/403 and the handler never runs.
///
/// The [`TokenAuthority`] is taken from application data; register it
/// with `App::app_data(web::Data::new(authority))`.
///
/// [`AuthenticatedContext`]: crate::AuthenticatedContext
pub struct RequireScope {
    permission: Rc<str>,
}

impl RequireScope {
    /// Creates a guard for one permission literal, e.g. `"post:actors"`.
    pub fn new(permission: impl Into<String>) -> RequireScope {
        RequireScope { permission: Rc::from(permission.into()) }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireScope
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Transform = RequireScopeMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RequireScopeMiddleware {
            service: Rc::new(service),
            permission: Rc::clone(&self.permission),
        })
    }
}

/// The per-route service created by [`RequireScope`].
pub struct RequireScopeMiddleware<S> {
    service: Rc<S>,
    permission: Rc<str>,
}

impl<S, B> Service<ServiceRequest> for RequireScopeMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let permission = Rc::clone(&self.permission);

        Box::pin(async move {
            let authority = req
                .app_data::<web::Data<TokenAuthority>>()
                .expect("TokenAuthority should be initialized in application data")
                .clone();

            let header_value = raw_authorization(req.headers());
            match authority.authorize(&header_value, &permission).await {
                Ok(context) => {
                    req.extensions_mut().insert(context);
                    service.call(req).await
                }
                Err(rejection) => {
                    debug!(%rejection, required = %permission, "request rejected");
                    Err(rejection.into())
                }
            }
        })
    }
}
