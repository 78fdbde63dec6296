//! Credential gate for the HTTP transport.
//!
//! Every request outside the exemption set must carry `Authorization: Bearer <token>` where
//! the token is either the configured static token or a live OAuth access token.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use super::transport::HttpState;

type HmacSha256 = Hmac<Sha256>;

/// Paths that never require a credential.
const ALWAYS_EXEMPT: &[&str] = &["/health"];

/// Paths that are public while OAuth is enabled.
const OAUTH_EXEMPT: &[&str] = &[
    "/.well-known/oauth-authorization-server",
    "/.well-known/oauth-protected-resource",
    "/.well-known/oauth-protected-resource/mcp",
    "/register",
    "/authorize",
    "/token",
    "/revoke",
];

/// Constant-time matcher for one secret.
///
/// The secret is kept only as an HMAC tag under a random per-process key; candidates are
/// checked with [`Mac::verify_slice`], so comparison time does not depend on how much of
/// the candidate matches.
pub struct CredentialGate {
    key: [u8; 32],
    tag: Vec<u8>,
}

impl CredentialGate {
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let mut key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        let tag = HmacSha256::new_from_slice(&key)
            .map(|mut mac| {
                mac.update(secret.as_bytes());
                mac.finalize().into_bytes().to_vec()
            })
            // An empty tag never verifies.
            .unwrap_or_default();
        Self { key, tag }
    }

    /// Check a candidate against the secret.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.key) else {
            return false;
        };
        mac.update(candidate.as_bytes());
        mac.verify_slice(&self.tag).is_ok()
    }
}

impl std::fmt::Debug for CredentialGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialGate").finish_non_exhaustive()
    }
}

/// Compare two secrets in constant time.
#[must_use]
pub fn constant_time_eq(expected: &str, provided: &str) -> bool {
    CredentialGate::new(expected).matches(provided)
}

/// Whether `path` bypasses the gate.
#[must_use]
pub fn is_exempt(path: &str, oauth_enabled: bool) -> bool {
    ALWAYS_EXEMPT.contains(&path) || (oauth_enabled && OAUTH_EXEMPT.contains(&path))
}

/// Middleware enforcing the credential gate.
pub async fn require_bearer(
    State(state): State<Arc<HttpState>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    if is_exempt(&path, state.oauth.is_some()) {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned);

    let Some(token) = token else {
        tracing::warn!(path = %path, "Missing or malformed Authorization header");
        return unauthorized(&state);
    };

    if state.gate.matches(&token) {
        return next.run(request).await;
    }
    if let Some(oauth) = &state.oauth {
        if oauth.load_access_token(&token).await.is_some() {
            return next.run(request).await;
        }
    }

    tracing::warn!(path = %path, "Rejected invalid bearer token");
    (StatusCode::FORBIDDEN, Json(serde_json::json!({"error": "Invalid token"}))).into_response()
}

fn unauthorized(state: &HttpState) -> Response {
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"error": "Missing or invalid Authorization header"})),
    )
        .into_response();

    if let (Some(_), Some(public_url)) = (&state.oauth, &state.public_url) {
        let challenge = format!(
            "Bearer resource_metadata=\"{public_url}/.well-known/oauth-protected-resource\""
        );
        if let Ok(value) = HeaderValue::from_str(&challenge) {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
    }
    response
}
