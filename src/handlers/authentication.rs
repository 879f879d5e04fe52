// Authentication middleware for the dubbing API
//
// Verifies that incoming requests carry a valid bearer token when
// authorization is enabled. OPTIONS requests are always allowed to support
// CORS pre-flight requests.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorUnauthorized,
    http::header,
    web, Error,
};
use futures::future::{ok, LocalBoxFuture, Ready};
use log::{debug, info, warn};

use crate::config;
use crate::metrics::Metrics;

/// Middleware factory for authentication
pub struct Authentication;

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthenticationMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        if !config::authorization_enabled() {
            info!("Authentication requirement is disabled via configuration");
        } else if config::api_token().is_none() {
            warn!("Authorization enabled without DUBBING_API_TOKEN, any bearer token is accepted");
        }
        ok(AuthenticationMiddleware { service })
    }
}

/// Authentication middleware implementation
pub struct AuthenticationMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if req.method() == actix_web::http::Method::OPTIONS {
            debug!("OPTIONS request - bypassing authentication check");
            let fut = self.service.call(req);
            return Box::pin(async move { fut.await });
        }

        let metrics = req.app_data::<web::Data<Metrics>>().cloned();
        match authenticate(&req) {
            Ok(()) => {
                let fut = self.service.call(req);
                Box::pin(async move {
                    if let Some(metrics) = metrics {
                        metrics.record_auth_attempt("accepted").await;
                    }
                    fut.await
                })
            }
            Err(error) => Box::pin(async move {
                if let Some(metrics) = metrics {
                    metrics.record_auth_attempt("rejected").await;
                }
                Err(error)
            }),
        }
    }
}

/// Authenticate a request by checking the Authorization header
fn authenticate(req: &ServiceRequest) -> Result<(), Error> {
    if !config::authorization_enabled() {
        debug!("Authorization is disabled, allowing request without authentication");
        return Ok(());
    }

    let Some(auth_header) = req.headers().get(header::AUTHORIZATION) else {
        warn!("Missing Authorization header");
        return Err(ErrorUnauthorized("Authorization header is required"));
    };
    let Ok(auth_str) = auth_header.to_str() else {
        warn!("Authorization header contains invalid characters");
        return Err(ErrorUnauthorized("Invalid Authorization header"));
    };
    match auth_str.strip_prefix("Bearer ") {
        Some(token) => validate_token(token, config::api_token().as_deref()),
        None => {
            warn!("Invalid Authorization header format, missing 'Bearer' prefix");
            Err(ErrorUnauthorized(
                "Invalid Authorization header format. Must be 'Bearer <token>'",
            ))
        }
    }
}

/// Compare the presented token with the configured one
///
/// Without a configured token any non-empty token passes.
fn validate_token(token: &str, expected: Option<&str>) -> Result<(), Error> {
    let token = token.trim();
    if token.is_empty() {
        return Err(ErrorUnauthorized("Empty bearer token"));
    }
    match expected {
        Some(expected) if !constant_time_eq(token.as_bytes(), expected.as_bytes()) => {
            warn!("Rejected request with an invalid bearer token");
            Err(ErrorUnauthorized("Invalid bearer token"))
        }
        _ => Ok(()),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_must_match_configured_value() {
        assert!(validate_token("secret", Some("secret")).is_ok());
        assert!(validate_token("Secret", Some("secret")).is_err());
        assert!(validate_token("secret-longer", Some("secret")).is_err());
    }

    #[test]
    fn test_any_token_passes_without_configured_value() {
        assert!(validate_token("whatever", None).is_ok());
        assert!(validate_token("  ", None).is_err());
    }
}
