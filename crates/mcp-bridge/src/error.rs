//! Error types for the MCP bridge.
//!
//! Uses `thiserror` for structured error handling with automatic `From` implementations.
//! Each layer has its own enum; [`ToolError`] is the umbrella the dispatcher works with.

use std::path::PathBuf;

/// Sandbox policy violations.
#[derive(thiserror::Error, Debug)]
pub enum SandboxError {
    /// Resolved path is outside every allowed root.
    #[error("Path '{}' is not under any allowed directory: {allowed:?}", path.display())]
    PathNotAllowed {
        /// Canonical form of the requested path
        path: PathBuf,
        /// The full allow-list, for the caller's benefit
        allowed: Vec<String>,
    },

    /// Command matched a deny pattern.
    #[error("Command blocked by security policy (matched: {pattern})")]
    CommandBlocked {
        /// The pattern that matched
        pattern: String,
    },

    /// Path could not be resolved (permissions, symlink loop, ...).
    #[error("Cannot resolve path '{path}': {source}")]
    Unresolvable {
        /// Path as supplied by the caller
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },
}

/// Admission-control rejections.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LimitError {
    /// Sliding-window budget for this key is spent.
    #[error("Rate limit exceeded for {key}: max {limit} requests/minute")]
    RateLimited {
        /// Rate key (tool name)
        key: String,
        /// Configured calls per minute
        limit: usize,
    },

    /// Every concurrency slot is taken.
    #[error("Max concurrent execution limit reached ({max})")]
    ConcurrencyExhausted {
        /// Pool capacity
        max: usize,
    },
}

/// Subprocess execution failures. A non-zero exit is not one of these.
#[derive(thiserror::Error, Debug)]
pub enum ExecError {
    /// Empty argv.
    #[error("Empty command")]
    EmptyCommand,

    /// Process could not be started.
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        /// Program that failed to spawn
        program: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// I/O error while collecting output or waiting.
    #[error("I/O error during execution: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecError {
    /// Returns true if the program does not exist on this host.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Configuration errors raised while turning raw settings into a [`crate::Config`].
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// No bearer token configured.
    #[error("BEARER_TOKEN must be set to a non-empty value")]
    MissingBearerToken,

    /// A blocked-command pattern is not a valid regex.
    #[error("Invalid blocked command pattern '{pattern}': {source}")]
    InvalidPattern {
        /// Offending pattern
        pattern: String,
        /// Regex compile error
        source: regex::Error,
    },

    /// An allowed directory could not be resolved.
    #[error("Invalid allowed directory '{path}': {source}")]
    InvalidAllowedDir {
        /// Offending entry
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Public URL is not a valid absolute URL.
    #[error("Invalid PUBLIC_URL '{url}': {source}")]
    InvalidPublicUrl {
        /// Offending value
        url: String,
        /// Parse error
        source: url::ParseError,
    },

    /// A limit that must admit at least one unit was set to zero.
    #[error("{setting} must be at least 1")]
    ZeroLimit {
        /// Environment name of the setting
        setting: &'static str,
    },
}

/// OAuth protocol errors, rendered as `{"error": code, "error_description": ...}`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OAuthError {
    /// Missing or malformed parameter.
    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    /// Client unknown or failed to authenticate.
    #[error("invalid_client: {0}")]
    InvalidClient(String),

    /// Code or refresh token unknown, expired, or not owned by the client.
    #[error("invalid_grant: {0}")]
    InvalidGrant(String),

    /// Requested scope exceeds what was granted.
    #[error("invalid_scope: {0}")]
    InvalidScope(String),

    /// Grant type other than `authorization_code` or `refresh_token`.
    #[error("unsupported_grant_type: {0}")]
    UnsupportedGrantType(String),

    /// Response type other than `code`.
    #[error("unsupported_response_type: {0}")]
    UnsupportedResponseType(String),

    /// Registration metadata rejected.
    #[error("invalid_client_metadata: {0}")]
    InvalidClientMetadata(String),
}

impl OAuthError {
    /// The RFC 6749 error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidClient(_) => "invalid_client",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::InvalidScope(_) => "invalid_scope",
            Self::UnsupportedGrantType(_) => "unsupported_grant_type",
            Self::UnsupportedResponseType(_) => "unsupported_response_type",
            Self::InvalidClientMetadata(_) => "invalid_client_metadata",
        }
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            Self::InvalidRequest(d)
            | Self::InvalidClient(d)
            | Self::InvalidGrant(d)
            | Self::InvalidScope(d)
            | Self::UnsupportedGrantType(d)
            | Self::UnsupportedResponseType(d)
            | Self::InvalidClientMetadata(d) => d,
        }
    }
}

/// Errors from MCP tool execution.
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    /// Sandbox rejected a path or command
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// Rate or concurrency ceiling reached
    #[error(transparent)]
    Limit(#[from] LimitError),

    /// Subprocess could not be run
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Input validation failed
    #[error("Validation error: {message}")]
    Validation {
        /// Field that failed validation
        field: String,
        /// Validation error message
        message: String,
    },

    /// Arguments did not match the tool schema
    #[error("Invalid arguments: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error inside a tool
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No tool with this name
    #[error("Tool not found: {0}")]
    UnknownTool(String),
}

impl ToolError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    /// Returns true for terminal denials that must surface as a protocol-level failure
    /// rather than an `ERROR:` text payload.
    #[must_use]
    pub const fn is_denial(&self) -> bool {
        matches!(
            self,
            Self::Sandbox(_)
                | Self::Limit(_)
                | Self::Validation { .. }
                | Self::Serialization(_)
                | Self::UnknownTool(_)
        )
    }

    /// JSON-RPC error code for this failure.
    #[must_use]
    pub const fn rpc_code(&self) -> i32 {
        match self {
            Self::Validation { .. } | Self::Serialization(_) | Self::UnknownTool(_) => -32602,
            _ => -32000,
        }
    }

    /// Convert to a user-friendly error message for MCP response.
    #[must_use]
    pub fn to_user_message(&self) -> String {
        match self {
            Self::Limit(LimitError::RateLimited { .. }) => {
                format!("{self}. Please wait before retrying.")
            }
            Self::Validation { field, message } => {
                format!("Invalid input for '{field}': {message}")
            }
            _ => self.to_string(),
        }
    }
}

/// Result type alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;
