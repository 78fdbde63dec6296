//! In-memory OAuth provider with auto-approval.
//!
//! One `RwLock<HashMap>` per credential kind. Locks are never nested: every operation that
//! touches two maps finishes with the first guard before taking the second.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use tokio::sync::RwLock;
use url::Url;

use super::types::{
    AccessToken, AuthorizationCode, AuthorizationParams, ClientMetadata, ClientRegistration,
    OAuthToken, RefreshToken, Token,
};
use crate::config::OAUTH_SCOPE;
use crate::error::OAuthError;

/// Authorization code lifetime: 5 minutes.
pub const AUTHORIZATION_CODE_TTL_SECS: i64 = 300;
/// Access token lifetime: 24 hours.
pub const ACCESS_TOKEN_TTL_SECS: u64 = 86_400;
/// Expiry sweep interval: 5 minutes.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

const CLIENT_ID_BYTES: usize = 24;
const CLIENT_SECRET_BYTES: usize = 48;
const CODE_BYTES: usize = 32;
const TOKEN_BYTES: usize = 48;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// `bytes` bytes from the OS CSPRNG, base64url without padding.
#[must_use]
pub fn generate_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// In-memory OAuth state.
#[derive(Debug, Clone, Default)]
pub struct OAuthProvider {
    clients: Arc<RwLock<HashMap<String, ClientRegistration>>>,
    codes: Arc<RwLock<HashMap<String, AuthorizationCode>>>,
    access_tokens: Arc<RwLock<HashMap<String, AccessToken>>>,
    refresh_tokens: Arc<RwLock<HashMap<String, RefreshToken>>>,
}

impl OAuthProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client, assigning a fresh id and secret.
    ///
    /// Metadata must already be validated by the caller.
    pub async fn register_client(&self, metadata: ClientMetadata) -> ClientRegistration {
        let client = ClientRegistration {
            client_id: generate_token(CLIENT_ID_BYTES),
            client_secret: generate_token(CLIENT_SECRET_BYTES),
            client_id_issued_at: now(),
            client_secret_expires_at: 0,
            redirect_uris: metadata.redirect_uris,
            client_name: metadata.client_name,
            token_endpoint_auth_method: metadata
                .token_endpoint_auth_method
                .unwrap_or_else(|| "client_secret_post".to_owned()),
            grant_types: metadata.grant_types.unwrap_or_else(|| {
                vec!["authorization_code".to_owned(), "refresh_token".to_owned()]
            }),
            response_types: metadata.response_types.unwrap_or_else(|| vec!["code".to_owned()]),
            scope: metadata.scope.unwrap_or_else(|| OAUTH_SCOPE.to_owned()),
        };

        self.clients.write().await.insert(client.client_id.clone(), client.clone());
        tracing::info!(client_id = %client.client_id, "Registered OAuth client");
        client
    }

    /// Look up a client by id.
    pub async fn get_client(&self, client_id: &str) -> Option<ClientRegistration> {
        self.clients.read().await.get(client_id).cloned()
    }

    /// Auto-approve and return the redirect URI carrying the new code (and `state`).
    pub async fn authorize(
        &self,
        client: &ClientRegistration,
        params: AuthorizationParams,
    ) -> Result<Url, OAuthError> {
        let mut redirect = Url::parse(&params.redirect_uri)
            .map_err(|e| OAuthError::InvalidRequest(format!("invalid redirect_uri: {e}")))?;

        let code = AuthorizationCode {
            code: generate_token(CODE_BYTES),
            client_id: client.client_id.clone(),
            scopes: params.scopes,
            code_challenge: params.code_challenge,
            redirect_uri: params.redirect_uri,
            redirect_uri_provided_explicitly: params.redirect_uri_provided_explicitly,
            resource: params.resource,
            expires_at: now() + AUTHORIZATION_CODE_TTL_SECS,
        };

        {
            let mut pairs = redirect.query_pairs_mut();
            pairs.append_pair("code", &code.code);
            if let Some(state) = &params.state {
                pairs.append_pair("state", state);
            }
        }

        self.codes.write().await.insert(code.code.clone(), code);
        tracing::info!(client_id = %client.client_id, "Auto-approved authorization");
        Ok(redirect)
    }

    /// Load a code for `client`. Expired codes are evicted.
    pub async fn load_authorization_code(
        &self,
        client: &ClientRegistration,
        code: &str,
    ) -> Option<AuthorizationCode> {
        let mut codes = self.codes.write().await;
        let entry = codes.get(code)?;
        if entry.client_id != client.client_id {
            return None;
        }
        if now() > entry.expires_at {
            codes.remove(code);
            return None;
        }
        Some(entry.clone())
    }

    /// Consume `code` and mint an access/refresh pair.
    ///
    /// Removal from the code map decides the winner when the same code is exchanged
    /// concurrently; the loser gets `None`. A code that expired after it was loaded is
    /// evicted here rather than redeemed.
    pub async fn exchange_authorization_code(
        &self,
        client: &ClientRegistration,
        code: &AuthorizationCode,
    ) -> Option<OAuthToken> {
        {
            let mut codes = self.codes.write().await;
            match codes.get(&code.code) {
                Some(stored) if stored.client_id == client.client_id => {
                    let expired = now() > stored.expires_at;
                    codes.remove(&code.code);
                    if expired {
                        return None;
                    }
                }
                _ => return None,
            }
        }

        let access = self.insert_access_token(client, code.scopes.clone(), code.resource.clone()).await;
        let refresh = RefreshToken {
            token: generate_token(TOKEN_BYTES),
            client_id: client.client_id.clone(),
            scopes: code.scopes.clone(),
        };
        self.refresh_tokens.write().await.insert(refresh.token.clone(), refresh.clone());

        tracing::info!(client_id = %client.client_id, "Issued token pair");
        Some(token_response(&access, &refresh))
    }

    /// Load a refresh token owned by `client`.
    pub async fn load_refresh_token(
        &self,
        client: &ClientRegistration,
        token: &str,
    ) -> Option<RefreshToken> {
        self.refresh_tokens
            .read()
            .await
            .get(token)
            .filter(|t| t.client_id == client.client_id)
            .cloned()
    }

    /// Rotate `refresh`: the old token is removed and its successor inserted under one guard.
    ///
    /// Empty `scopes` inherits the original grant.
    pub async fn exchange_refresh_token(
        &self,
        client: &ClientRegistration,
        refresh: &RefreshToken,
        scopes: &[String],
    ) -> Option<OAuthToken> {
        let scopes = if scopes.is_empty() { refresh.scopes.clone() } else { scopes.to_vec() };
        let successor = RefreshToken {
            token: generate_token(TOKEN_BYTES),
            client_id: client.client_id.clone(),
            scopes: scopes.clone(),
        };

        {
            let mut refresh_tokens = self.refresh_tokens.write().await;
            match refresh_tokens.get(&refresh.token) {
                Some(stored) if stored.client_id == client.client_id => {
                    refresh_tokens.remove(&refresh.token);
                }
                _ => return None,
            }
            refresh_tokens.insert(successor.token.clone(), successor.clone());
        }

        let access = self.insert_access_token(client, scopes, None).await;
        tracing::info!(client_id = %client.client_id, "Rotated refresh token");
        Some(token_response(&access, &successor))
    }

    /// Look up a live access token. Expired tokens are evicted.
    pub async fn load_access_token(&self, token: &str) -> Option<AccessToken> {
        let mut tokens = self.access_tokens.write().await;
        let entry = tokens.get(token)?;
        if now() > entry.expires_at {
            tokens.remove(token);
            return None;
        }
        Some(entry.clone())
    }

    /// Find whatever credential `token` names, access tokens first.
    pub async fn find_token(&self, token: &str) -> Option<Token> {
        if let Some(access) = self.load_access_token(token).await {
            return Some(Token::Access(access));
        }
        self.refresh_tokens.read().await.get(token).cloned().map(Token::Refresh)
    }

    /// Revoke a token. Unknown tokens are ignored.
    pub async fn revoke_token(&self, token: Token) {
        match token {
            Token::Access(t) => {
                self.access_tokens.write().await.remove(&t.token);
            }
            Token::Refresh(t) => {
                self.refresh_tokens.write().await.remove(&t.token);
            }
        }
        tracing::info!("Revoked token");
    }

    /// Drop expired codes and access tokens; returns how many of each were removed.
    pub async fn purge_expired(&self) -> (usize, usize) {
        let now = now();
        let codes = {
            let mut codes = self.codes.write().await;
            let before = codes.len();
            codes.retain(|_, c| c.expires_at >= now);
            before - codes.len()
        };
        let tokens = {
            let mut tokens = self.access_tokens.write().await;
            let before = tokens.len();
            tokens.retain(|_, t| t.expires_at >= now);
            before - tokens.len()
        };
        (codes, tokens)
    }

    /// Spawn the periodic expiry sweep.
    pub fn start_cleanup_task(&self) -> tokio::task::JoinHandle<()> {
        let provider = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                let (codes, tokens) = provider.purge_expired().await;
                if codes + tokens > 0 {
                    tracing::debug!(codes, tokens, "Purged expired OAuth state");
                }
            }
        })
    }

    async fn insert_access_token(
        &self,
        client: &ClientRegistration,
        scopes: Vec<String>,
        resource: Option<String>,
    ) -> AccessToken {
        let access = AccessToken {
            token: generate_token(TOKEN_BYTES),
            client_id: client.client_id.clone(),
            scopes,
            resource,
            expires_at: now() + ACCESS_TOKEN_TTL_SECS as i64,
        };
        self.access_tokens.write().await.insert(access.token.clone(), access.clone());
        access
    }

    #[cfg(test)]
    async fn expire_code(&self, code: &str) {
        if let Some(c) = self.codes.write().await.get_mut(code) {
            c.expires_at = now() - 1;
        }
    }

    #[cfg(test)]
    async fn expire_access_token(&self, token: &str) {
        if let Some(t) = self.access_tokens.write().await.get_mut(token) {
            t.expires_at = now() - 1;
        }
    }
}

fn token_response(access: &AccessToken, refresh: &RefreshToken) -> OAuthToken {
    OAuthToken {
        access_token: access.token.clone(),
        token_type: "Bearer",
        expires_in: ACCESS_TOKEN_TTL_SECS,
        refresh_token: refresh.token.clone(),
        scope: (!access.scopes.is_empty()).then(|| access.scopes.join(" ")),
    }
}
