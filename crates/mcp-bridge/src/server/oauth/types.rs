//! OAuth 2.0 types for MCP authentication.
//!
//! Expiry instants are unix seconds (`chrono::Utc::now().timestamp()`).

use serde::{Deserialize, Serialize};

/// Client metadata proposed at dynamic registration (RFC 7591).
///
/// Any `client_id` or `client_secret` in the request body is ignored; the provider assigns
/// both.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientMetadata {
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub token_endpoint_auth_method: Option<String>,
    #[serde(default)]
    pub grant_types: Option<Vec<String>>,
    #[serde(default)]
    pub response_types: Option<Vec<String>>,
    /// Space-separated scopes.
    #[serde(default)]
    pub scope: Option<String>,
}

/// A dynamically registered client.
#[derive(Debug, Clone, Serialize)]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_secret: String,
    pub client_id_issued_at: i64,
    /// Zero: the secret never expires.
    pub client_secret_expires_at: i64,
    pub redirect_uris: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    pub token_endpoint_auth_method: String,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    /// Space-separated scopes.
    pub scope: String,
}

impl ClientRegistration {
    /// Whether the token endpoint must check `client_secret`.
    #[must_use]
    pub fn requires_secret(&self) -> bool {
        self.token_endpoint_auth_method != "none"
    }

    /// Registered scopes as a list.
    #[must_use]
    pub fn scopes(&self) -> Vec<String> {
        self.scope.split_whitespace().map(str::to_owned).collect()
    }
}

/// A validated authorization request.
#[derive(Debug, Clone)]
pub struct AuthorizationParams {
    pub state: Option<String>,
    pub scopes: Vec<String>,
    pub code_challenge: String,
    pub redirect_uri: String,
    /// Whether the client named the redirect URI, in which case `/token` must repeat it.
    pub redirect_uri_provided_explicitly: bool,
    pub resource: Option<String>,
}

/// A pending, single-use authorization code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub code_challenge: String,
    pub redirect_uri: String,
    pub redirect_uri_provided_explicitly: bool,
    pub resource: Option<String>,
    pub expires_at: i64,
}

/// An issued access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub resource: Option<String>,
    pub expires_at: i64,
}

/// An issued refresh token. Refresh tokens do not expire; they are rotated on use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub token: String,
    pub client_id: String,
    pub scopes: Vec<String>,
}

/// Anything that can be revoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Access(AccessToken),
    Refresh(RefreshToken),
}

impl Token {
    /// Owning client.
    #[must_use]
    pub fn client_id(&self) -> &str {
        match self {
            Self::Access(t) => &t.client_id,
            Self::Refresh(t) => &t.client_id,
        }
    }
}

/// Token endpoint response body.
#[derive(Debug, Clone, Serialize)]
pub struct OAuthToken {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub refresh_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}
