//! Bearer Auth Middleware Service
//!
//! Actix-web middleware that rejects requests without a bearer credential
//! before any handler (and therefore any remote call) runs.

use actix_web::{
    body::{BoxBody, EitherBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::{header::AUTHORIZATION, Method},
    Error, HttpMessage, HttpResponse,
};
use futures::future::{ok, LocalBoxFuture, Ready};
use std::rc::Rc;
use tracing::{debug, warn};

use super::auth::{extract_bearer_token, BearerToken};

/// Middleware factory for bearer credential checks
pub struct BearerAuth {
    /// Paths that don't require authentication
    public_paths: Rc<Vec<String>>,
}

impl BearerAuth {
    pub fn new() -> Self {
        Self {
            public_paths: Rc::new(vec![
                "/health".to_string(),
                "/swagger-ui".to_string(),
                "/api-docs".to_string(),
            ]),
        }
    }
}

impl Default for BearerAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, B> Transform<S, ServiceRequest> for BearerAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type Transform = BearerAuthService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(BearerAuthService {
            service: Rc::new(service),
            public_paths: self.public_paths.clone(),
        })
    }
}

/// The actual middleware service
pub struct BearerAuthService<S> {
    service: Rc<S>,
    public_paths: Rc<Vec<String>>,
}

impl<S> BearerAuthService<S> {
    fn is_public(&self, req: &ServiceRequest) -> bool {
        // CORS preflight never carries credentials
        req.method() == Method::OPTIONS
            || self.public_paths.iter().any(|p| is_under(req.path(), p))
    }
}

/// `path` is `prefix` itself or below it, matching whole segments only
fn is_under(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

impl<S, B> Service<ServiceRequest> for BearerAuthService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, ctx: &mut core::task::Context<'_>) -> core::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let is_public = self.is_public(&req);

        Box::pin(async move {
            if is_public {
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            }

            let token = match extract_bearer_token(req.headers().get(AUTHORIZATION)) {
                Ok(token) => BearerToken(token),
                Err(e) => {
                    warn!(path = %req.path(), error = %e, "Rejecting unauthenticated request");
                    let response = HttpResponse::Unauthorized()
                        .content_type("text/plain; charset=utf-8")
                        .body("Unauthorized");
                    return Ok(req.into_response(response).map_into_right_body());
                }
            };

            debug!(token = %token.fingerprint(), path = %req.path(), "Bearer credential present");
            req.extensions_mut().insert(token);

            let res = service.call(req).await?;
            Ok(res.map_into_left_body())
        })
    }
}
