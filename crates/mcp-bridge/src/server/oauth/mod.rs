//! OAuth 2.0 authorization server for MCP authentication.
//!
//! A self-contained authorization server embedded in the binary, enabled when a public URL is
//! configured. Authorization is auto-approved; the protection comes from PKCE and from the
//! tokens being short-lived and bound to their client.
//!
//! ## Supported Standards
//! - RFC 9728: OAuth Protected Resource Metadata
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7591: Dynamic Client Registration
//! - RFC 7636: PKCE (S256)
//! - RFC 6749: Authorization Code Grant
//! - RFC 7009: Token Revocation

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use super::transport::HttpState;

pub mod handlers;
pub mod pkce;
pub mod provider;
pub mod types;

pub use provider::OAuthProvider;
pub use types::{AccessToken, ClientRegistration, OAuthToken, RefreshToken, Token};

/// OAuth endpoints, to be merged into the main router.
pub fn routes() -> Router<Arc<HttpState>> {
    Router::new()
        .route("/.well-known/oauth-authorization-server", get(handlers::handle_auth_server_metadata))
        .route("/.well-known/oauth-protected-resource", get(handlers::handle_protected_resource))
        .route(
            "/.well-known/oauth-protected-resource/mcp",
            get(handlers::handle_protected_resource),
        )
        .route("/register", post(handlers::handle_register))
        .route("/authorize", get(handlers::handle_authorize))
        .route("/token", post(handlers::handle_token))
        .route("/revoke", post(handlers::handle_revoke))
}
