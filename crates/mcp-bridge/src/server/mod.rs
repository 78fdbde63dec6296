//! MCP server implementation.
//!
//! Provides both stdio and streamable HTTP transports. Over HTTP every request passes the
//! credential gate in [`auth`]; OAuth endpoints are mounted when a public URL is configured.

pub mod auth;
pub mod oauth;
pub mod stdio;
pub mod transport;

use std::sync::Arc;

use crate::config::Config;
use crate::tools::ToolDispatcher;

/// MCP bridge server.
pub struct McpServer {
    dispatcher: ToolDispatcher,
}

impl McpServer {
    /// Create a new MCP server with all tools registered.
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        Self { dispatcher: ToolDispatcher::new(config) }
    }

    /// Run the server in stdio mode.
    ///
    /// # Errors
    ///
    /// Returns error on I/O failure.
    pub async fn run_stdio(self) -> anyhow::Result<()> {
        tracing::info!(tools = self.dispatcher.tools().len(), "Starting MCP server in stdio mode");
        stdio::run_stdio(self.dispatcher).await
    }

    /// Run the server in HTTP mode on the configured host and port.
    ///
    /// # Errors
    ///
    /// Returns error if the listener cannot bind or the server fails.
    pub async fn run_http(self) -> anyhow::Result<()> {
        let config = Arc::clone(&self.dispatcher.context().config);
        let addr = format!("{}:{}", config.host, config.port);

        let state = Arc::new(transport::HttpState::new(self.dispatcher));
        let cleanup = state.oauth.as_ref().map(oauth::OAuthProvider::start_cleanup_task);

        tracing::info!(
            tools = state.dispatcher.tools().len(),
            allowed_dirs = ?config.allowed_dirs,
            oauth = state.oauth.is_some(),
            "Starting MCP server in HTTP mode"
        );
        if !is_loopback(&config.host) {
            tracing::warn!(host = %config.host, "Listening on a non-loopback address");
        }

        let router = transport::create_router(state);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("HTTP server listening on http://{}", listener.local_addr()?);

        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

        if let Some(cleanup) = cleanup {
            cleanup.abort();
        }
        tracing::info!("HTTP server shut down");
        Ok(())
    }

    /// The dispatcher serving tool calls.
    #[must_use]
    pub const fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer").field("tools", &self.dispatcher.tools().len()).finish()
    }
}

fn is_loopback(host: &str) -> bool {
    host == "localhost" || host.parse::<std::net::IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_loopback() {
        assert!(is_loopback("127.0.0.1"));
        assert!(is_loopback("::1"));
        assert!(is_loopback("localhost"));
        assert!(!is_loopback("0.0.0.0"));
        assert!(!is_loopback("example.com"));
    }
}
