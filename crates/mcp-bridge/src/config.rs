//! Configuration for the MCP bridge.
//!
//! [`Settings`] is the raw surface (CLI flags with environment fallbacks, `.env` included);
//! [`Config`] is the parsed, validated form consumed by the rest of the crate.

use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;

use crate::error::ConfigError;
use crate::sandbox;

/// Hard limits and fixed timeouts.
pub mod limits {
    use std::time::Duration;

    /// Default calls per tool per minute.
    pub const MAX_REQUESTS_PER_MINUTE: usize = 10;

    /// Default concurrent subprocess executions.
    pub const MAX_CONCURRENT_EXECUTIONS: usize = 3;

    /// Upper bound on `max_turns` for the agent CLI.
    pub const CLAUDE_MAX_TURNS: u32 = 20;

    /// Upper bound on `run_command` timeouts, in seconds.
    pub const RUN_COMMAND_MAX_TIMEOUT_SECS: u64 = 300;

    /// Largest file `file_read` returns whole.
    pub const FILE_READ_MAX_BYTES: u64 = 1_000_000;

    /// Diff text kept by `project_status`.
    pub const DIFF_MAX_CHARS: usize = 5000;

    /// Per git invocation in `project_status`.
    pub const GIT_TIMEOUT: Duration = Duration::from_secs(15);

    /// Per probe command in `gpu_status` and `system_info`.
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

    /// Default audit log size before rollover, in MiB.
    pub const MAX_LOG_SIZE_MB: u64 = 50;
}

/// OAuth scope granted to registered clients.
pub const OAUTH_SCOPE: &str = "mcp:tools";

/// Raw settings as supplied on the command line or in the environment.
#[derive(Debug, Clone, clap::Args)]
pub struct Settings {
    /// Static bearer token required on every HTTP request
    #[arg(long, env = "BEARER_TOKEN", hide_env_values = true)]
    pub bearer_token: String,

    /// Comma-separated directories tools may touch
    #[arg(long, env = "ALLOWED_DIRS", default_value = "~/projects")]
    pub allowed_dirs: String,

    /// `|`-separated regexes; commands matching any are refused
    #[arg(long, env = "BLOCKED_COMMANDS", default_value = "")]
    pub blocked_commands: String,

    /// Calls per tool per minute
    #[arg(long, env = "MAX_REQUESTS_PER_MINUTE", default_value_t = limits::MAX_REQUESTS_PER_MINUTE)]
    pub max_requests_per_minute: usize,

    /// Concurrent subprocess executions
    #[arg(long, env = "MAX_CONCURRENT_EXECUTIONS", default_value_t = limits::MAX_CONCURRENT_EXECUTIONS)]
    pub max_concurrent_executions: usize,

    /// Path to the Claude CLI binary
    #[arg(long, env = "CLAUDE_CLI_PATH", default_value = "claude")]
    pub claude_cli_path: String,

    /// Default agentic turns for claude_execute
    #[arg(long, env = "CLAUDE_DEFAULT_MAX_TURNS", default_value_t = 5)]
    pub claude_default_max_turns: u32,

    /// Ceiling for claude_execute timeouts, in seconds
    #[arg(long, env = "CLAUDE_MAX_TIMEOUT", default_value_t = 600)]
    pub claude_max_timeout: u64,

    /// Interface to bind
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// HTTP port
    #[arg(long, env = "PORT", default_value_t = 8787)]
    pub port: u16,

    /// Public URL (e.g. the tunnel address); enables OAuth when set
    #[arg(long, env = "PUBLIC_URL", default_value = "")]
    pub public_url: String,

    /// Directory holding the audit log
    #[arg(long, env = "LOG_DIR", default_value = "~/.local/share/mcp-bridge")]
    pub log_dir: String,

    /// Audit log size before rollover, in MiB
    #[arg(long, env = "MAX_LOG_SIZE_MB", default_value_t = limits::MAX_LOG_SIZE_MB)]
    pub max_log_size_mb: u64,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Static bearer token.
    pub bearer_token: String,

    /// Canonical allowed roots.
    pub allowed_dirs: Vec<PathBuf>,

    /// Deny patterns, in order.
    pub blocked_commands: Vec<Regex>,

    /// Calls per tool per minute.
    pub max_requests_per_minute: usize,

    /// Concurrent subprocess executions.
    pub max_concurrent_executions: usize,

    /// Agent CLI binary.
    pub claude_cli_path: String,

    /// Default `max_turns` for the agent CLI.
    pub claude_default_max_turns: u32,

    /// Ceiling for agent CLI timeouts.
    pub claude_max_timeout: Duration,

    /// Bind host.
    pub host: String,

    /// Bind port.
    pub port: u16,

    /// Public base URL without trailing slash; `None` disables OAuth.
    pub public_url: Option<String>,

    /// Directory holding `audit.log` and its backups.
    pub log_dir: PathBuf,

    /// Audit log size that triggers rollover.
    pub max_log_size_bytes: u64,
}

impl Config {
    /// Parse and validate raw settings.
    pub fn from_settings(settings: Settings) -> Result<Self, ConfigError> {
        if settings.bearer_token.trim().is_empty() {
            return Err(ConfigError::MissingBearerToken);
        }
        require_positive("MAX_REQUESTS_PER_MINUTE", settings.max_requests_per_minute as u64)?;
        require_positive("MAX_CONCURRENT_EXECUTIONS", settings.max_concurrent_executions as u64)?;
        require_positive("MAX_LOG_SIZE_MB", settings.max_log_size_mb)?;

        let public_url = match settings.public_url.trim() {
            "" => None,
            raw => {
                url::Url::parse(raw).map_err(|source| ConfigError::InvalidPublicUrl {
                    url: raw.to_owned(),
                    source,
                })?;
                Some(raw.trim_end_matches('/').to_owned())
            }
        };

        Ok(Self {
            bearer_token: settings.bearer_token,
            allowed_dirs: parse_allowed_dirs(&settings.allowed_dirs)?,
            blocked_commands: parse_blocked_commands(&settings.blocked_commands)?,
            max_requests_per_minute: settings.max_requests_per_minute,
            max_concurrent_executions: settings.max_concurrent_executions,
            claude_cli_path: settings.claude_cli_path,
            claude_default_max_turns: settings.claude_default_max_turns,
            claude_max_timeout: Duration::from_secs(settings.claude_max_timeout),
            host: settings.host,
            port: settings.port,
            public_url,
            log_dir: sandbox::expand_home(settings.log_dir.trim()),
            max_log_size_bytes: settings.max_log_size_mb.saturating_mul(1024 * 1024),
        })
    }

    /// Create a test configuration rooted at the given directories.
    #[must_use]
    pub fn for_testing(allowed_dirs: Vec<PathBuf>) -> Self {
        Self {
            bearer_token: "test-token-123".to_string(),
            allowed_dirs,
            blocked_commands: Vec::new(),
            max_requests_per_minute: 100,
            max_concurrent_executions: limits::MAX_CONCURRENT_EXECUTIONS,
            claude_cli_path: "claude".to_string(),
            claude_default_max_turns: 5,
            claude_max_timeout: Duration::from_secs(600),
            host: "127.0.0.1".to_string(),
            port: 0,
            public_url: None,
            log_dir: std::env::temp_dir().join("mcp-bridge"),
            max_log_size_bytes: limits::MAX_LOG_SIZE_MB * 1024 * 1024,
        }
    }

    /// Path of the active audit log file.
    #[must_use]
    pub fn audit_log_path(&self) -> PathBuf {
        self.log_dir.join(crate::audit::AUDIT_LOG_FILE)
    }

    /// Check if the OAuth endpoints should be served.
    #[must_use]
    pub const fn oauth_enabled(&self) -> bool {
        self.public_url.is_some()
    }
}

fn require_positive(setting: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::ZeroLimit { setting });
    }
    Ok(())
}

/// Split a comma-separated list and resolve each entry to canonical form.
pub fn parse_allowed_dirs(raw: &str) -> Result<Vec<PathBuf>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            sandbox::resolve_path(entry)
                .map_err(|source| ConfigError::InvalidAllowedDir { path: entry.to_owned(), source })
        })
        .collect()
}

/// Split a `|`-separated list and compile each entry, skipping blanks.
pub fn parse_blocked_commands(raw: &str) -> Result<Vec<Regex>, ConfigError> {
    raw.split('|')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            Regex::new(entry)
                .map_err(|source| ConfigError::InvalidPattern { pattern: entry.to_owned(), source })
        })
        .collect()
}
