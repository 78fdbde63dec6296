//! File tools: file_read, file_write.

use serde_json::json;
use tokio::io::AsyncWriteExt;

use super::{McpTool, ToolContext};
use crate::config::limits;
use crate::error::{ToolError, ToolResult};
use crate::models::{FileReadInput, FileWriteInput, WriteMode};

/// Read a text file inside an allowed directory.
pub struct FileReadTool;

/// Lines `start..=end` (1-based), keeping line terminators.
///
/// Missing bounds default to the first and last line; out-of-range bounds are clamped.
fn slice_lines(content: &str, start: Option<usize>, end: Option<usize>) -> String {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let end = end.unwrap_or(lines.len()).min(lines.len());
    let start = start.unwrap_or(1).saturating_sub(1).min(end);
    lines[start..end].concat()
}

#[async_trait::async_trait]
impl McpTool for FileReadTool {
    fn name(&self) -> &'static str {
        "file_read"
    }

    fn description(&self) -> &'static str {
        "Read a text file from the server, optionally limited to a line range. \
         Files over 1MB are refused."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or ~ path to the file (must be in allowed dirs)"
                },
                "line_start": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Start line (1-based, inclusive)"
                },
                "line_end": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "End line (1-based, inclusive)"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: FileReadInput = serde_json::from_value(input)?;
        let path = ctx.validate_path(&params.path)?;

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() => m,
            _ => {
                return Ok(format!(
                    "ERROR: '{}' is not a file or does not exist",
                    path.display()
                ));
            }
        };

        if metadata.len() > limits::FILE_READ_MAX_BYTES {
            return Ok(format!(
                "ERROR: File too large ({} bytes, max 1MB)",
                metadata.len()
            ));
        }

        let bytes = tokio::fs::read(&path).await?;
        let content = String::from_utf8_lossy(&bytes);
        if params.line_start.is_some() || params.line_end.is_some() {
            return Ok(slice_lines(&content, params.line_start, params.line_end));
        }
        Ok(content.into_owned())
    }
}

/// Write or append a text file inside an allowed directory.
pub struct FileWriteTool;

#[async_trait::async_trait]
impl McpTool for FileWriteTool {
    fn name(&self) -> &'static str {
        "file_write"
    }

    fn description(&self) -> &'static str {
        "Write content to a file on the server, creating parent directories as needed."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or ~ path (must be in allowed dirs)"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write"
                },
                "mode": {
                    "type": "string",
                    "enum": ["overwrite", "append"],
                    "default": "overwrite"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: FileWriteInput = serde_json::from_value(input)?;
        let path = ctx.validate_path(&params.path)?;

        let Some(parent) = path.parent() else {
            return Err(ToolError::validation("path", "must name a file, not a root"));
        };
        tokio::fs::create_dir_all(parent).await?;

        match params.mode {
            WriteMode::Overwrite => tokio::fs::write(&path, params.content.as_bytes()).await?,
            WriteMode::Append => {
                let mut file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .await?;
                file.write_all(params.content.as_bytes()).await?;
                file.flush().await?;
            }
        }

        tracing::info!(path = %path.display(), mode = ?params.mode, bytes = params.content.len(), "File written");
        Ok(format!(
            "OK: Written {} chars to {}",
            params.content.chars().count(),
            path.display()
        ))
    }
}
