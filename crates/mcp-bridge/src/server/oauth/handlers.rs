//! OAuth 2.0 endpoint handlers for MCP authentication.
//!
//! Implements:
//! - RFC 9728: OAuth Protected Resource Metadata
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7591: Dynamic Client Registration
//! - RFC 7636: PKCE (S256)
//! - RFC 6749: OAuth 2.0 Authorization Code Grant
//! - RFC 7009: Token Revocation

use std::sync::Arc;

use axum::{
    Form, Json,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::pkce;
use super::provider::OAuthProvider;
use super::types::{AuthorizationParams, ClientMetadata, ClientRegistration, OAuthToken};
use crate::config::OAUTH_SCOPE;
use crate::error::OAuthError;
use crate::server::transport::HttpState;

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::InvalidClient(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        };
        (
            status,
            Json(serde_json::json!({
                "error": self.code(),
                "error_description": self.description()
            })),
        )
            .into_response()
    }
}

fn provider(state: &HttpState) -> Result<&OAuthProvider, Response> {
    state
        .oauth
        .as_ref()
        .ok_or_else(|| (StatusCode::NOT_FOUND, "OAuth not configured").into_response())
}

fn base_url(state: &HttpState) -> &str {
    state.public_url.as_deref().unwrap_or_default()
}

fn split_scopes(scope: Option<&str>) -> Vec<String> {
    scope.map(|s| s.split_whitespace().map(str::to_owned).collect()).unwrap_or_default()
}

// ─── RFC 9728: Protected Resource Metadata ───────────────────────────────────

/// `GET /.well-known/oauth-protected-resource`
///
/// Tells clients where to find the authorization server for this resource.
pub async fn handle_protected_resource(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let base = base_url(&state);
    Json(serde_json::json!({
        "resource": format!("{base}/mcp"),
        "authorization_servers": [base],
        "bearer_methods_supported": ["header"],
        "scopes_supported": [OAUTH_SCOPE]
    }))
}

// ─── RFC 8414: Authorization Server Metadata ─────────────────────────────────

/// `GET /.well-known/oauth-authorization-server`
pub async fn handle_auth_server_metadata(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let base = base_url(&state);
    Json(serde_json::json!({
        "issuer": base,
        "authorization_endpoint": format!("{base}/authorize"),
        "token_endpoint": format!("{base}/token"),
        "registration_endpoint": format!("{base}/register"),
        "revocation_endpoint": format!("{base}/revoke"),
        "scopes_supported": [OAUTH_SCOPE],
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code", "refresh_token"],
        "token_endpoint_auth_methods_supported": ["client_secret_post", "none"],
        "revocation_endpoint_auth_methods_supported": ["client_secret_post", "none"],
        "code_challenge_methods_supported": ["S256"]
    }))
}

// ─── RFC 7591: Dynamic Client Registration ───────────────────────────────────

/// `POST /register`
pub async fn handle_register(
    State(state): State<Arc<HttpState>>,
    Json(metadata): Json<ClientMetadata>,
) -> Response {
    let provider = match provider(&state) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    if let Err(e) = validate_metadata(&metadata) {
        tracing::warn!(error = %e, "Rejected client registration");
        return e.into_response();
    }

    let client = provider.register_client(metadata).await;
    (StatusCode::CREATED, Json(client)).into_response()
}

fn validate_metadata(metadata: &ClientMetadata) -> Result<(), OAuthError> {
    if metadata.redirect_uris.is_empty() {
        return Err(OAuthError::InvalidClientMetadata("redirect_uris is required".into()));
    }
    for uri in &metadata.redirect_uris {
        url::Url::parse(uri).map_err(|e| {
            OAuthError::InvalidClientMetadata(format!("invalid redirect_uri '{uri}': {e}"))
        })?;
    }

    if let Some(scope) = metadata.scope.as_deref() {
        if let Some(unknown) = scope.split_whitespace().find(|s| *s != OAUTH_SCOPE) {
            return Err(OAuthError::InvalidClientMetadata(format!(
                "requested scope '{unknown}' is not supported"
            )));
        }
    }

    if let Some(grant_types) = &metadata.grant_types {
        let has = |g: &str| grant_types.iter().any(|t| t == g);
        if !has("authorization_code") || !has("refresh_token") {
            return Err(OAuthError::InvalidClientMetadata(
                "grant_types must include authorization_code and refresh_token".into(),
            ));
        }
    }

    if let Some(response_types) = &metadata.response_types {
        if response_types.iter().any(|t| t != "code") {
            return Err(OAuthError::InvalidClientMetadata(
                "response_types must be ['code']".into(),
            ));
        }
    }

    match metadata.token_endpoint_auth_method.as_deref() {
        None | Some("none" | "client_secret_post") => Ok(()),
        Some(other) => Err(OAuthError::InvalidClientMetadata(format!(
            "token_endpoint_auth_method '{other}' is not supported"
        ))),
    }
}

// ─── Authorization Endpoint ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub response_type: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub scope: Option<String>,
    pub resource: Option<String>,
}

/// `GET /authorize`
///
/// Auto-approves: the server has a single operator, so any registered client presenting a
/// valid PKCE challenge gets a code without an interactive login.
pub async fn handle_authorize(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<AuthorizeQuery>,
) -> Response {
    let provider = match provider(&state) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let Some(client_id) = query.client_id.as_deref() else {
        return OAuthError::InvalidRequest("Missing client_id".into()).into_response();
    };
    let Some(client) = provider.get_client(client_id).await else {
        return OAuthError::InvalidRequest("Unknown client_id".into()).into_response();
    };

    let params = match authorization_params(&client, query) {
        Ok(params) => params,
        Err(e) => {
            tracing::warn!(client_id = %client.client_id, error = %e, "Rejected authorization");
            return e.into_response();
        }
    };

    match provider.authorize(&client, params).await {
        Ok(location) => {
            (StatusCode::FOUND, [(header::LOCATION, String::from(location))]).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Validate an authorization request against the client's registration.
fn authorization_params(
    client: &ClientRegistration,
    query: AuthorizeQuery,
) -> Result<AuthorizationParams, OAuthError> {
    let (redirect_uri, explicit) = match query.redirect_uri {
        Some(uri) => {
            if !client.redirect_uris.contains(&uri) {
                return Err(OAuthError::InvalidRequest(
                    "redirect_uri not registered for this client".into(),
                ));
            }
            (uri, true)
        }
        None => match client.redirect_uris.as_slice() {
            [only] => (only.clone(), false),
            _ => {
                return Err(OAuthError::InvalidRequest(
                    "redirect_uri is required when several are registered".into(),
                ));
            }
        },
    };

    if query.response_type.as_deref() != Some("code") {
        return Err(OAuthError::UnsupportedResponseType("response_type must be 'code'".into()));
    }

    let Some(code_challenge) = query.code_challenge.filter(|c| !c.is_empty()) else {
        return Err(OAuthError::InvalidRequest("Missing code_challenge".into()));
    };
    if query.code_challenge_method.as_deref().unwrap_or("S256") != "S256" {
        return Err(OAuthError::InvalidRequest("code_challenge_method must be 'S256'".into()));
    }

    let granted = client.scopes();
    let requested = split_scopes(query.scope.as_deref());
    if let Some(extra) = requested.iter().find(|s| !granted.contains(*s)) {
        return Err(OAuthError::InvalidScope(format!("scope '{extra}' not registered")));
    }
    let scopes = if requested.is_empty() { granted } else { requested };

    Ok(AuthorizationParams {
        state: query.state,
        scopes,
        code_challenge,
        redirect_uri,
        redirect_uri_provided_explicitly: explicit,
        resource: query.resource,
    })
}

// ─── Token Endpoint ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

/// `POST /token`
///
/// Exchange an authorization code for tokens, or rotate a refresh token.
pub async fn handle_token(
    State(state): State<Arc<HttpState>>,
    Form(form): Form<TokenRequest>,
) -> Response {
    let provider = match provider(&state) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let client = match authenticate_client(
        provider,
        form.client_id.as_deref(),
        form.client_secret.as_deref(),
    )
    .await
    {
        Ok(client) => client,
        Err(e) => return e.into_response(),
    };

    let result = match form.grant_type.as_str() {
        "authorization_code" => authorization_code_grant(provider, &client, &form).await,
        "refresh_token" => refresh_token_grant(provider, &client, &form).await,
        other => Err(OAuthError::UnsupportedGrantType(format!("grant_type '{other}'"))),
    };

    match result {
        Ok(token) => token_success(&token),
        Err(e) => {
            tracing::warn!(client_id = %client.client_id, error = %e, "Token request failed");
            e.into_response()
        }
    }
}

async fn authorization_code_grant(
    provider: &OAuthProvider,
    client: &ClientRegistration,
    form: &TokenRequest,
) -> Result<OAuthToken, OAuthError> {
    let code = form
        .code
        .as_deref()
        .ok_or_else(|| OAuthError::InvalidRequest("Missing code".into()))?;
    let verifier = form
        .code_verifier
        .as_deref()
        .ok_or_else(|| OAuthError::InvalidRequest("Missing code_verifier".into()))?;

    let auth_code = provider
        .load_authorization_code(client, code)
        .await
        .ok_or_else(|| OAuthError::InvalidGrant("Invalid or expired authorization code".into()))?;

    if auth_code.redirect_uri_provided_explicitly
        && form.redirect_uri.as_deref() != Some(auth_code.redirect_uri.as_str())
    {
        return Err(OAuthError::InvalidRequest("redirect_uri mismatch".into()));
    }

    if !pkce::verify_s256(verifier, &auth_code.code_challenge) {
        return Err(OAuthError::InvalidGrant("PKCE verification failed".into()));
    }

    provider
        .exchange_authorization_code(client, &auth_code)
        .await
        .ok_or_else(|| OAuthError::InvalidGrant("Authorization code already used".into()))
}

async fn refresh_token_grant(
    provider: &OAuthProvider,
    client: &ClientRegistration,
    form: &TokenRequest,
) -> Result<OAuthToken, OAuthError> {
    let token = form
        .refresh_token
        .as_deref()
        .ok_or_else(|| OAuthError::InvalidRequest("Missing refresh_token".into()))?;

    let refresh = provider
        .load_refresh_token(client, token)
        .await
        .ok_or_else(|| OAuthError::InvalidGrant("Invalid refresh token".into()))?;

    let scopes = split_scopes(form.scope.as_deref());
    if let Some(extra) = scopes.iter().find(|s| !refresh.scopes.contains(*s)) {
        return Err(OAuthError::InvalidScope(format!("scope '{extra}' was not granted")));
    }

    provider
        .exchange_refresh_token(client, &refresh, &scopes)
        .await
        .ok_or_else(|| OAuthError::InvalidGrant("Invalid refresh token".into()))
}

/// Build a token response with required OAuth 2.0 cache headers (RFC 6749 §5.1).
fn token_success(token: &OAuthToken) -> Response {
    let mut response = Json(token).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

/// Resolve the client and check its secret when its auth method requires one.
async fn authenticate_client(
    provider: &OAuthProvider,
    client_id: Option<&str>,
    client_secret: Option<&str>,
) -> Result<ClientRegistration, OAuthError> {
    let client_id =
        client_id.ok_or_else(|| OAuthError::InvalidClient("Missing client_id".into()))?;
    let client = provider
        .get_client(client_id)
        .await
        .ok_or_else(|| OAuthError::InvalidClient("Unknown client".into()))?;

    if client.requires_secret() {
        let provided = client_secret
            .ok_or_else(|| OAuthError::InvalidClient("Missing client_secret".into()))?;
        if !crate::server::auth::constant_time_eq(&client.client_secret, provided) {
            return Err(OAuthError::InvalidClient("Invalid client_secret".into()));
        }
    }
    Ok(client)
}

// ─── RFC 7009: Token Revocation ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub token: String,
    #[serde(default)]
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// `POST /revoke`
///
/// Always 200 for an authenticated client, whether or not the token existed.
pub async fn handle_revoke(
    State(state): State<Arc<HttpState>>,
    Form(form): Form<RevokeRequest>,
) -> Response {
    let provider = match provider(&state) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let client = match authenticate_client(
        provider,
        form.client_id.as_deref(),
        form.client_secret.as_deref(),
    )
    .await
    {
        Ok(client) => client,
        Err(e) => return e.into_response(),
    };

    if let Some(token) = provider.find_token(&form.token).await {
        if token.client_id() == client.client_id {
            provider.revoke_token(token).await;
        } else {
            tracing::warn!(client_id = %client.client_id, "Ignored revocation of foreign token");
        }
    }

    (StatusCode::OK, Json(serde_json::json!({}))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(uris: &[&str]) -> ClientMetadata {
        ClientMetadata {
            redirect_uris: uris.iter().map(|u| (*u).to_owned()).collect(),
            ..ClientMetadata::default()
        }
    }

    fn query(client_id: &str) -> AuthorizeQuery {
        AuthorizeQuery {
            client_id: Some(client_id.to_owned()),
            redirect_uri: None,
            response_type: Some("code".into()),
            state: Some("xyz".into()),
            code_challenge: Some("challenge".into()),
            code_challenge_method: Some("S256".into()),
            scope: None,
            resource: None,
        }
    }

    #[test]
    fn test_metadata_requires_redirect_uris() {
        let err = validate_metadata(&metadata(&[])).unwrap_err();
        assert_eq!(err.code(), "invalid_client_metadata");
        assert!(validate_metadata(&metadata(&["not a url"])).is_err());
        assert!(validate_metadata(&metadata(&["https://claude.ai/callback"])).is_ok());
    }

    #[test]
    fn test_metadata_rejects_unknown_scope_and_method() {
        let mut m = metadata(&["https://claude.ai/callback"]);
        m.scope = Some("mcp:tools admin".into());
        assert!(validate_metadata(&m).is_err());

        let mut m = metadata(&["https://claude.ai/callback"]);
        m.token_endpoint_auth_method = Some("private_key_jwt".into());
        assert!(validate_metadata(&m).is_err());

        let mut m = metadata(&["https://claude.ai/callback"]);
        m.grant_types = Some(vec!["authorization_code".into()]);
        assert!(validate_metadata(&m).is_err());
    }

    #[tokio::test]
    async fn test_authorization_params_defaults() {
        let provider = OAuthProvider::new();
        let client = provider.register_client(metadata(&["https://claude.ai/callback"])).await;

        let params = authorization_params(&client, query(&client.client_id)).unwrap();
        assert_eq!(params.redirect_uri, "https://claude.ai/callback");
        assert!(!params.redirect_uri_provided_explicitly);
        assert_eq!(params.scopes, vec![OAUTH_SCOPE.to_owned()]);
        assert_eq!(params.state.as_deref(), Some("xyz"));
    }

    #[tokio::test]
    async fn test_authorization_params_rejections() {
        let provider = OAuthProvider::new();
        let client = provider.register_client(metadata(&["https://claude.ai/callback"])).await;

        let mut q = query(&client.client_id);
        q.redirect_uri = Some("https://evil.example/cb".into());
        assert_eq!(authorization_params(&client, q).unwrap_err().code(), "invalid_request");

        let mut q = query(&client.client_id);
        q.response_type = Some("token".into());
        assert_eq!(
            authorization_params(&client, q).unwrap_err().code(),
            "unsupported_response_type"
        );

        let mut q = query(&client.client_id);
        q.code_challenge = None;
        assert_eq!(authorization_params(&client, q).unwrap_err().code(), "invalid_request");

        let mut q = query(&client.client_id);
        q.code_challenge_method = Some("plain".into());
        assert!(authorization_params(&client, q).is_err());

        let mut q = query(&client.client_id);
        q.scope = Some("mcp:admin".into());
        assert_eq!(authorization_params(&client, q).unwrap_err().code(), "invalid_scope");
    }

    #[tokio::test]
    async fn test_authenticate_client() {
        let provider = OAuthProvider::new();
        let client = provider.register_client(metadata(&["https://claude.ai/callback"])).await;

        let ok = authenticate_client(&provider, Some(client.client_id.as_str()), Some(client.client_secret.as_str()))
            .await;
        assert!(ok.is_ok());

        let bad = authenticate_client(&provider, Some(client.client_id.as_str()), Some("wrong")).await;
        assert_eq!(bad.unwrap_err().code(), "invalid_client");

        let missing = authenticate_client(&provider, Some(client.client_id.as_str()), None).await;
        assert!(missing.is_err());

        let mut public = metadata(&["https://claude.ai/callback"]);
        public.token_endpoint_auth_method = Some("none".into());
        let public = provider.register_client(public).await;
        assert!(authenticate_client(&provider, Some(public.client_id.as_str()), None).await.is_ok());
    }

    #[test]
    fn test_error_status() {
        let resp = OAuthError::InvalidClient("x".into()).into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let resp = OAuthError::InvalidGrant("x".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
