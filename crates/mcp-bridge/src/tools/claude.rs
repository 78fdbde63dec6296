//! Agent CLI tool: claude_execute.

use std::time::Duration;

use serde_json::json;

use super::{McpTool, ToolContext};
use crate::audit::AuditRecord;
use crate::config::limits;
use crate::error::{ToolError, ToolResult};
use crate::exec::{CommandLine, ExecOutcome, ExecRequest};
use crate::models::ClaudeExecuteInput;

/// Variables that make a nested CLI refuse to start.
const STRIPPED_ENV: [&str; 2] = ["CLAUDECODE", "CLAUDE_CODE_ENTRYPOINT"];

/// Run a prompt through the agent CLI on this host.
pub struct ClaudeExecuteTool;

impl ClaudeExecuteTool {
    fn argv(cli: &str, input: &ClaudeExecuteInput, max_turns: u32) -> Vec<String> {
        let mut argv = vec![
            cli.to_owned(),
            "--print".into(),
            "--dangerously-skip-permissions".into(),
            "--max-turns".into(),
            max_turns.to_string(),
            "--verbose".into(),
        ];
        if input.output_format.is_json() {
            argv.extend(["--output-format".to_owned(), "json".to_owned()]);
        }
        argv.extend(["--prompt".to_owned(), input.prompt.clone()]);
        argv
    }
}

#[async_trait::async_trait]
impl McpTool for ClaudeExecuteTool {
    fn name(&self) -> &'static str {
        "claude_execute"
    }

    fn description(&self) -> &'static str {
        "Execute a prompt via the Claude CLI on the remote server. The CLI has full access to \
         the working directory and can read/write files, run commands and complete multi-step \
         coding tasks autonomously."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "The instruction/prompt to execute"
                },
                "working_directory": {
                    "type": "string",
                    "default": "~/projects",
                    "description": "Working directory (must be in the allowed list)"
                },
                "max_turns": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": limits::CLAUDE_MAX_TURNS,
                    "description": "Maximum agentic turns"
                },
                "timeout_seconds": {
                    "type": "integer",
                    "minimum": 1,
                    "default": 300,
                    "description": "Global timeout in seconds (capped by server configuration)"
                },
                "output_format": {
                    "type": "string",
                    "enum": ["text", "json"],
                    "default": "text"
                }
            },
            "required": ["prompt"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: ClaudeExecuteInput = serde_json::from_value(input)?;
        if params.prompt.trim().is_empty() {
            return Err(ToolError::validation("prompt", "must not be empty"));
        }
        if params.timeout_seconds == 0 {
            return Err(ToolError::validation("timeout_seconds", "must be at least 1"));
        }

        let cwd = ctx.validate_path(&params.working_directory)?;
        let config = &ctx.config;
        let max_turns = params
            .max_turns
            .unwrap_or(config.claude_default_max_turns)
            .clamp(1, limits::CLAUDE_MAX_TURNS);
        let timeout = Duration::from_secs(params.timeout_seconds).min(config.claude_max_timeout);

        let mut request = ExecRequest::new(
            CommandLine::Argv(Self::argv(&config.claude_cli_path, &params, max_turns)),
            &cwd,
            timeout,
        );
        for key in STRIPPED_ENV {
            request = request.env_remove(key);
        }

        let (result, exit_code, elapsed) = match ctx.execute_exclusive(request).await? {
            ExecOutcome::Completed(output) => {
                let text = if output.success() {
                    output.stdout
                } else {
                    format!(
                        "Exit code: {}\n\nSTDOUT:\n{}\n\nSTDERR:\n{}",
                        output.exit_code, output.stdout, output.stderr
                    )
                };
                (text, Some(output.exit_code), output.elapsed)
            }
            ExecOutcome::TimedOut { timeout } => (
                format!("ERROR: Timeout after {}s. Process killed.", timeout.as_secs()),
                None,
                timeout,
            ),
        };

        AuditRecord {
            tool: self.name(),
            input: &params.prompt,
            working_directory: &cwd,
            exit_code,
            elapsed,
            output: &result,
        }
        .emit();

        Ok(result)
    }
}
