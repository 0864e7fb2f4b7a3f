//! Request middleware: bearer-token authentication and request ids.

use std::sync::Arc;

use axum::extract::State;
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::ApiError;

/// State for the authentication middleware: SHA-256 digests of the accepted
/// API tokens. Raw tokens never live past construction.
#[derive(Clone)]
pub struct AuthState {
    enabled: bool,
    token_digests: Arc<Vec<[u8; 32]>>,
}

impl AuthState {
    pub fn from_config(config: &AuthConfig) -> Self {
        let token_digests = config
            .tokens
            .iter()
            .map(|token| Sha256::digest(token.as_bytes()).into())
            .collect();
        Self {
            enabled: config.enabled,
            token_digests: Arc::new(token_digests),
        }
    }

    fn accepts(&self, token: &str) -> bool {
        let digest: [u8; 32] = Sha256::digest(token.as_bytes()).into();
        // Constant-time scan: every configured digest is compared in full.
        let mut matched = 0u8;
        for stored in self.token_digests.iter() {
            let mut diff = 0u8;
            for (a, b) in stored.iter().zip(digest.iter()) {
                diff |= a ^ b;
            }
            matched |= u8::from(diff == 0);
        }
        matched == 1
    }
}

/// Validates the `Authorization: Bearer` header on protected routes.
pub async fn authentication_middleware(
    State(auth): State<AuthState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !auth.enabled || should_skip_authentication(&req) {
        return next.run(req).await;
    }

    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());
    let Some(header) = header else {
        tracing::debug!(path = %req.uri().path(), "missing Authorization header");
        return ApiError::unauthorized("Authentication required").into_response();
    };

    let token = match header.strip_prefix("Bearer ") {
        Some(t) if !t.is_empty() => t,
        _ => {
            return ApiError::unauthorized("Invalid Authorization header format").into_response();
        }
    };

    if auth.accepts(token) {
        next.run(req).await
    } else {
        tracing::debug!(path = %req.uri().path(), "rejected bearer token");
        ApiError::unauthorized("Invalid API token").into_response()
    }
}

fn should_skip_authentication(req: &Request<Body>) -> bool {
    let path = req.uri().path();
    let public_paths = ["/", "/healthz", "/readyz", "/favicon.ico"];
    public_paths.contains(&path)
}

/// Ensures each request has an `X-Request-Id` and mirrors it on the response.
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static("x-request-id");

    let req_id_value = req
        .headers()
        .get(&header_name)
        .cloned()
        .unwrap_or_else(|| {
            HeaderValue::from_str(&Uuid::new_v4().to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
        });

    req.headers_mut()
        .insert(header_name.clone(), req_id_value.clone());
    req.extensions_mut().insert(req_id_value.clone());

    let mut response = next.run(req).await;
    response.headers_mut().insert(header_name, req_id_value);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_state(enabled: bool, tokens: &[&str]) -> AuthState {
        AuthState::from_config(&AuthConfig {
            enabled,
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
        })
    }

    #[test]
    fn test_accepts_configured_token() {
        let state = auth_state(true, &["token-a", "token-b"]);
        assert!(state.accepts("token-a"));
        assert!(state.accepts("token-b"));
        assert!(!state.accepts("token-c"));
        assert!(!state.accepts(""));
    }

    #[test]
    fn test_no_tokens_accepts_nothing() {
        let state = auth_state(true, &[]);
        assert!(!state.accepts("anything"));
    }

    #[test]
    fn test_public_paths() {
        for path in ["/", "/healthz", "/readyz"] {
            let req = Request::builder().uri(path).body(Body::empty()).unwrap();
            assert!(should_skip_authentication(&req), "{path} should be public");
        }
        let req = Request::builder()
            .uri("/patients")
            .body(Body::empty())
            .unwrap();
        assert!(!should_skip_authentication(&req));
    }
}
