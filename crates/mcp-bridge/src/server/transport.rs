//! JSON-RPC protocol handling and the streamable HTTP transport.
//!
//! [`handle_request`] is shared by the HTTP and stdio transports. The HTTP router mounts
//! `POST /mcp`, `GET /health` and, when a public URL is configured, the OAuth endpoints,
//! all behind the credential gate.

use std::borrow::Cow;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::auth::{self, CredentialGate};
use super::oauth::{self, OAuthProvider};
use crate::tools::{McpTool, ToolDispatcher};

/// Protocol version reported when the client does not name one.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2025-03-26";

const SESSION_HEADER: &str = "mcp-session-id";

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Requests without an id are notifications and get no response.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcResponse {
    /// JSON-RPC version constant.
    const VERSION: &'static str = "2.0";

    #[must_use]
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self { jsonrpc: Cow::Borrowed(Self::VERSION), result: Some(result), error: None, id }
    }

    #[must_use]
    pub fn error(id: Option<serde_json::Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(Self::VERSION),
            result: None,
            error: Some(JsonRpcError { code, message: message.into(), data: None }),
            id,
        }
    }

    /// Parse error reply (-32700).
    #[must_use]
    pub fn parse_error(detail: impl std::fmt::Display) -> Self {
        Self::error(None, -32700, format!("Parse error: {detail}"))
    }
}

/// MCP tool info for tools/list response.
#[derive(Debug, Serialize)]
pub struct McpToolInfo {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// Handle one JSON-RPC message. Returns `None` for notifications.
pub async fn handle_request(
    dispatcher: &ToolDispatcher,
    req: JsonRpcRequest,
) -> Option<JsonRpcResponse> {
    tracing::debug!(method = %req.method, "Handling request");

    let response = match req.method.as_str() {
        "initialize" => JsonRpcResponse::success(req.id, handle_initialize(&req.params)),
        "ping" => JsonRpcResponse::success(req.id, serde_json::json!({})),
        "tools/list" => JsonRpcResponse::success(req.id, handle_tools_list(dispatcher.tools())),
        "tools/call" => handle_tools_call(req.id, &req.params, dispatcher).await,
        _ if req.is_notification() => return None,
        _ => JsonRpcResponse::error(req.id, -32601, format!("Method not found: {}", req.method)),
    };

    if response.id.is_none() {
        return None;
    }
    Some(response)
}

fn handle_initialize(params: &serde_json::Value) -> serde_json::Value {
    let protocol_version = params
        .get("protocolVersion")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_PROTOCOL_VERSION);

    tracing::info!(protocol_version, "MCP initialize");

    serde_json::json!({
        "protocolVersion": protocol_version,
        "capabilities": {
            "tools": {
                "listChanged": false
            }
        },
        "serverInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION")
        },
        "instructions": "Tools for working on a remote host. Use claude_execute for complex \
                         coding tasks and run_command for simple operations."
    })
}

fn handle_tools_list(tools: &[Box<dyn McpTool>]) -> serde_json::Value {
    let tool_list: Vec<McpToolInfo> = tools
        .iter()
        .map(|t| McpToolInfo {
            name: t.name().to_string(),
            description: t.description().to_string(),
            input_schema: t.input_schema(),
        })
        .collect();

    serde_json::json!({ "tools": tool_list })
}

async fn handle_tools_call(
    id: Option<serde_json::Value>,
    params: &serde_json::Value,
    dispatcher: &ToolDispatcher,
) -> JsonRpcResponse {
    let Some(tool_name) = params.get("name").and_then(|v| v.as_str()) else {
        return JsonRpcResponse::error(id, -32602, "Missing 'name' parameter");
    };

    let arguments = params.get("arguments").cloned().unwrap_or_else(|| serde_json::json!({}));

    match dispatcher.call(tool_name, arguments).await {
        Ok(text) => {
            let is_error = text.starts_with("ERROR:");
            JsonRpcResponse::success(
                id,
                serde_json::json!({
                    "content": [{
                        "type": "text",
                        "text": text
                    }],
                    "isError": is_error
                }),
            )
        }
        Err(e) => JsonRpcResponse::error(id, e.rpc_code(), e.to_user_message()),
    }
}

/// Shared state for HTTP handlers.
pub struct HttpState {
    pub dispatcher: ToolDispatcher,
    pub gate: CredentialGate,
    /// Present only when a public URL is configured.
    pub oauth: Option<OAuthProvider>,
    /// Public base URL without trailing slash.
    pub public_url: Option<String>,
}

impl HttpState {
    /// Build state from a dispatcher; OAuth is enabled by the dispatcher's configuration.
    #[must_use]
    pub fn new(dispatcher: ToolDispatcher) -> Self {
        let config = &dispatcher.context().config;
        let gate = CredentialGate::new(&config.bearer_token);
        let public_url = config.public_url.clone();
        let oauth = config.oauth_enabled().then(OAuthProvider::new);
        Self { dispatcher, gate, oauth, public_url }
    }
}

impl std::fmt::Debug for HttpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpState")
            .field("tools", &self.dispatcher.tools().len())
            .field("oauth", &self.oauth.is_some())
            .field("public_url", &self.public_url)
            .finish_non_exhaustive()
    }
}

/// Create the HTTP router for MCP.
pub fn create_router(state: Arc<HttpState>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/mcp", post(handle_mcp_post));

    if state.oauth.is_some() {
        router = router.merge(oauth::routes());
    }

    router
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(Arc::clone(&state), auth::require_bearer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "server": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "Not found"})))
}

/// Handle POST requests to /mcp (streamable HTTP transport).
async fn handle_mcp_post(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let req: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(JsonRpcResponse::parse_error(e))).into_response();
        }
    };

    // A fresh session id on initialize; afterwards the client's id is echoed.
    let session_id = if req.method == "initialize" {
        HeaderValue::from_str(&uuid::Uuid::new_v4().to_string()).ok()
    } else {
        headers.get(SESSION_HEADER).cloned()
    };

    let mut response = match handle_request(&state.dispatcher, req).await {
        Some(reply) => Json(reply).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    };
    if let Some(session_id) = session_id {
        response.headers_mut().insert(SESSION_HEADER, session_id);
    }
    response
}
