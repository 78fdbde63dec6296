//! Enumeration types for tool parameters.

use serde::{Deserialize, Serialize};

/// Output format requested from the agent CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Plain text.
    #[default]
    Text,
    /// Structured JSON (`--output-format json`).
    Json,
}

impl OutputFormat {
    /// Check if this is JSON format.
    #[must_use]
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// How `file_write` treats existing content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Replace the file.
    #[default]
    Overwrite,
    /// Add to the end of the file.
    Append,
}
