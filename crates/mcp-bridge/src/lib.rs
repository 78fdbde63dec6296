//! MCP Bridge Server
//!
//! A Model Context Protocol (MCP) server that lets a remote agent drive a host machine:
//! run the Claude CLI, execute shell commands, read and write files, inspect git projects,
//! and probe GPU and system state.
//!
//! # Features
//!
//! - **7 MCP Tools**: agent execution, shell commands, file I/O, project status, system probes
//! - **Sandboxed**: every path must resolve under an allowed directory; commands are matched
//!   against a deny list
//! - **Admission control**: per-tool sliding-window rate limits and a fail-fast concurrency cap
//! - **Authenticated**: static bearer token, plus an embedded OAuth 2.0 server when a public
//!   URL is configured
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mcp_bridge::{Config, ToolDispatcher};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::for_testing(vec!["/tmp".into()]);
//!     let dispatcher = ToolDispatcher::new(Arc::new(config));
//!
//!     let listing = dispatcher
//!         .call("run_command", serde_json::json!({"command": "ls", "working_directory": "/tmp"}))
//!         .await?;
//!     println!("{listing}");
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod exec;
pub mod limiter;
pub mod models;
pub mod sandbox;
pub mod server;
pub mod tools;

pub use config::{Config, Settings};
pub use error::{OAuthError, SandboxError, ToolError};
pub use server::McpServer;
pub use tools::ToolDispatcher;
