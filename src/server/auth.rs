//! Optional bearer-token guard for the operator and relay endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use super::types::ErrorResponse;

#[derive(Clone)]
pub struct AuthState {
    /// `None` leaves the routes open.
    pub token: Option<Arc<SecretString>>,
}

impl AuthState {
    pub fn new(token: Option<SecretString>) -> Self {
        Self {
            token: token.map(Arc::new),
        }
    }

    fn accepts(&self, presented: Option<&str>) -> bool {
        let Some(expected) = &self.token else {
            return true;
        };
        let Some(presented) = presented else {
            return false;
        };
        bool::from(
            presented
                .as_bytes()
                .ct_eq(expected.expose_secret().as_bytes()),
        )
    }
}

fn bearer(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

pub async fn auth_middleware(
    State(auth): State<AuthState>,
    request: Request,
    next: Next,
) -> Response {
    if auth.accepts(bearer(&request)) {
        return next.run(request).await;
    }
    tracing::warn!(path = %request.uri().path(), "Rejected unauthenticated request");
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "Unauthorized".to_string(),
            code: "unauthorized",
            retryable: false,
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_when_no_token_configured() {
        let auth = AuthState::new(None);
        assert!(auth.accepts(None));
        assert!(auth.accepts(Some("anything")));
    }

    #[test]
    fn requires_exact_token() {
        let auth = AuthState::new(Some(SecretString::from("s3cret")));
        assert!(auth.accepts(Some("s3cret")));
        assert!(!auth.accepts(Some("s3cre")));
        assert!(!auth.accepts(Some("s3cret-extra")));
        assert!(!auth.accepts(None));
    }
}
