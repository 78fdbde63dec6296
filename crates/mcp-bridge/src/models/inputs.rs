//! Input models for MCP tool parameters.

use serde::{Deserialize, Serialize};

use super::{OutputFormat, WriteMode};

/// Input for `claude_execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeExecuteInput {
    /// Instruction passed to the agent CLI.
    pub prompt: String,

    /// Working directory (must be inside an allowed root).
    #[serde(default = "default_working_directory")]
    pub working_directory: String,

    /// Agentic turns; falls back to the configured default.
    #[serde(default)]
    pub max_turns: Option<u32>,

    /// Global timeout in seconds.
    #[serde(default = "default_claude_timeout")]
    pub timeout_seconds: u64,

    /// Output format.
    #[serde(default)]
    pub output_format: OutputFormat,
}

/// Input for `run_command`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCommandInput {
    /// Shell command line.
    pub command: String,

    /// Working directory (must be inside an allowed root).
    #[serde(default = "default_working_directory")]
    pub working_directory: String,

    /// Timeout in seconds.
    #[serde(default = "default_command_timeout")]
    pub timeout_seconds: u64,
}

/// Input for `file_read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReadInput {
    /// Absolute or `~` path.
    pub path: String,

    /// First line to return, 1-based inclusive.
    #[serde(default)]
    pub line_start: Option<usize>,

    /// Last line to return, 1-based inclusive.
    #[serde(default)]
    pub line_end: Option<usize>,
}

/// Input for `file_write`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileWriteInput {
    /// Absolute or `~` path.
    pub path: String,

    /// Content to write.
    pub content: String,

    /// Overwrite or append.
    #[serde(default)]
    pub mode: WriteMode,
}

/// Input for `project_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectStatusInput {
    /// Repository path.
    pub project_path: String,

    /// Include the unstaged diff.
    #[serde(default)]
    pub include_diff: bool,

    /// Number of recent commits.
    #[serde(default = "default_log_count")]
    pub log_count: u32,
}

fn default_working_directory() -> String {
    "~/projects".to_string()
}

const fn default_claude_timeout() -> u64 {
    300
}

const fn default_command_timeout() -> u64 {
    60
}

const fn default_log_count() -> u32 {
    5
}
