//! End-to-end tests for the OAuth 2.0 flow via HTTP.
//!
//! Drives the real router with `tower::ServiceExt::oneshot`, from discovery through
//! registration, authorization, code exchange, refresh rotation and revocation.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::json;
use sha2::{Digest, Sha256};
use tower::ServiceExt;

use mcp_bridge::config::Config;
use mcp_bridge::server::transport::{HttpState, create_router};
use mcp_bridge::tools::ToolDispatcher;

const BASE_URL: &str = "https://bridge.example.com";
const REDIRECT_URI: &str = "https://client.example.com/cb";
const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

fn build_test_router() -> (tempfile::TempDir, axum::Router) {
    let dir = tempfile::tempdir().unwrap();
    let root = std::fs::canonicalize(dir.path()).unwrap();
    let mut config = Config::for_testing(vec![root]);
    config.public_url = Some(BASE_URL.to_string());

    let state = Arc::new(HttpState::new(ToolDispatcher::new(Arc::new(config))));
    (dir, create_router(state))
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn form_post(uri: &str, fields: &[(&str, &str)]) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(serde_urlencoded::to_string(fields).unwrap()))
        .unwrap()
}

async fn register(app: &axum::Router, extra: serde_json::Value) -> serde_json::Value {
    let mut body = json!({
        "client_name": "Integration Test Client",
        "redirect_uris": [REDIRECT_URI]
    });
    if let (Some(target), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        target.extend(extra.clone());
    }

    let response = app
        .clone()
        .oneshot(
            Request::post("/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await
}

/// Authorize and return the issued code.
async fn authorize(app: &axum::Router, client_id: &str) -> String {
    let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(VERIFIER.as_bytes()));
    let query = serde_urlencoded::to_string([
        ("client_id", client_id),
        ("redirect_uri", REDIRECT_URI),
        ("response_type", "code"),
        ("state", "xyz123"),
        ("code_challenge", challenge.as_str()),
        ("code_challenge_method", "S256"),
    ])
    .unwrap();

    let response = app
        .clone()
        .oneshot(Request::get(format!("/authorize?{query}")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);

    let location = response.headers()[header::LOCATION].to_str().unwrap();
    let location = url::Url::parse(location).unwrap();
    assert!(location.as_str().starts_with(REDIRECT_URI));

    let pairs: std::collections::HashMap<_, _> = location.query_pairs().into_owned().collect();
    assert_eq!(pairs.get("state").map(String::as_str), Some("xyz123"));
    pairs["code"].clone()
}

#[tokio::test]
async fn test_full_oauth_http_flow() {
    let (_dir, app) = build_test_router();

    let client = register(&app, json!({})).await;
    let client_id = client["client_id"].as_str().unwrap().to_string();
    let client_secret = client["client_secret"].as_str().unwrap().to_string();
    assert_eq!(client["token_endpoint_auth_method"], "client_secret_post");
    assert!(client["client_id_issued_at"].as_i64().unwrap() > 0);

    let code = authorize(&app, &client_id).await;

    let exchange = [
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("redirect_uri", REDIRECT_URI),
        ("code_verifier", VERIFIER),
        ("client_id", client_id.as_str()),
        ("client_secret", client_secret.as_str()),
    ];
    let response = app.clone().oneshot(form_post("/token", &exchange)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    assert_eq!(response.headers()[header::PRAGMA], "no-cache");

    let tokens = json_body(response).await;
    assert_eq!(tokens["token_type"], "Bearer");
    assert_eq!(tokens["expires_in"], 86_400);
    let access_token = tokens["access_token"].as_str().unwrap().to_string();
    let refresh_token = tokens["refresh_token"].as_str().unwrap().to_string();

    // The code is single-use.
    let response = app.clone().oneshot(form_post("/token", &exchange)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_grant");

    // The access token opens the MCP endpoint.
    let response = app
        .clone()
        .oneshot(
            Request::post("/mcp")
                .header(header::AUTHORIZATION, format!("Bearer {access_token}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"jsonrpc":"2.0","id":1,"method":"ping"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Refresh rotates.
    let refresh = [
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token.as_str()),
        ("client_id", client_id.as_str()),
        ("client_secret", client_secret.as_str()),
    ];
    let response = app.clone().oneshot(form_post("/token", &refresh)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = json_body(response).await;
    let new_refresh = rotated["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(new_refresh, refresh_token);

    let response = app.clone().oneshot(form_post("/token", &refresh)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Revoke the new access token; it stops working.
    let new_access = rotated["access_token"].as_str().unwrap().to_string();
    let revoke = [
        ("token", new_access.as_str()),
        ("client_id", client_id.as_str()),
        ("client_secret", client_secret.as_str()),
    ];
    let response = app.clone().oneshot(form_post("/revoke", &revoke)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::post("/mcp")
                .header(header::AUTHORIZATION, format!("Bearer {new_access}"))
                .body(Body::from(json!({"jsonrpc":"2.0","id":2,"method":"ping"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Revoking an unknown token is still 200.
    let unknown = [
        ("token", "no-such-token"),
        ("client_id", client_id.as_str()),
        ("client_secret", client_secret.as_str()),
    ];
    let response = app.clone().oneshot(form_post("/revoke", &unknown)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_pkce_mismatch_rejected() {
    let (_dir, app) = build_test_router();
    let client = register(&app, json!({"token_endpoint_auth_method": "none"})).await;
    let client_id = client["client_id"].as_str().unwrap();

    let code = authorize(&app, client_id).await;
    let wrong_verifier = "x".repeat(43);
    let response = app
        .clone()
        .oneshot(form_post(
            "/token",
            &[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", REDIRECT_URI),
                ("code_verifier", wrong_verifier.as_str()),
                ("client_id", client_id),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn test_token_requires_client_secret() {
    let (_dir, app) = build_test_router();
    let client = register(&app, json!({})).await;
    let client_id = client["client_id"].as_str().unwrap();
    let code = authorize(&app, client_id).await;

    let response = app
        .clone()
        .oneshot(form_post(
            "/token",
            &[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", REDIRECT_URI),
                ("code_verifier", VERIFIER),
                ("client_id", client_id),
                ("client_secret", "wrong"),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "invalid_client");
}

#[tokio::test]
async fn test_unsupported_grant_type() {
    let (_dir, app) = build_test_router();
    let client = register(&app, json!({"token_endpoint_auth_method": "none"})).await;
    let client_id = client["client_id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(form_post(
            "/token",
            &[("grant_type", "client_credentials"), ("client_id", client_id)],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "unsupported_grant_type");
}

#[tokio::test]
async fn test_register_rejects_missing_redirect_uris() {
    let (_dir, app) = build_test_router();
    let response = app
        .oneshot(
            Request::post("/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"client_name": "no uris"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_client_metadata");
}

#[tokio::test]
async fn test_authorize_rejects_unregistered_redirect() {
    let (_dir, app) = build_test_router();
    let client = register(&app, json!({})).await;
    let query = serde_urlencoded::to_string([
        ("client_id", client["client_id"].as_str().unwrap()),
        ("redirect_uri", "https://evil.example.com/cb"),
        ("response_type", "code"),
        ("code_challenge", "abc"),
        ("code_challenge_method", "S256"),
    ])
    .unwrap();

    let response = app
        .oneshot(Request::get(format!("/authorize?{query}")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(header::LOCATION).is_none());
}

#[tokio::test]
async fn test_metadata_endpoints() {
    let (_dir, app) = build_test_router();

    let response = app
        .clone()
        .oneshot(
            Request::get("/.well-known/oauth-authorization-server").body(Body::empty()).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let meta = json_body(response).await;
    assert_eq!(meta["issuer"], BASE_URL);
    assert_eq!(meta["token_endpoint"], format!("{BASE_URL}/token"));
    assert_eq!(meta["revocation_endpoint"], format!("{BASE_URL}/revoke"));
    assert_eq!(meta["code_challenge_methods_supported"], json!(["S256"]));

    for path in
        ["/.well-known/oauth-protected-resource", "/.well-known/oauth-protected-resource/mcp"]
    {
        let response =
            app.clone().oneshot(Request::get(path).body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let meta = json_body(response).await;
        assert_eq!(meta["resource"], format!("{BASE_URL}/mcp"));
        assert_eq!(meta["authorization_servers"], json!([BASE_URL]));
    }
}

#[tokio::test]
async fn test_oauth_routes_absent_without_public_url() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::for_testing(vec![std::fs::canonicalize(dir.path()).unwrap()]);
    let app = create_router(Arc::new(HttpState::new(ToolDispatcher::new(Arc::new(config)))));

    // Not exempt and not mounted: the gate answers first.
    let response = app
        .oneshot(
            Request::get("/.well-known/oauth-authorization-server").body(Body::empty()).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
