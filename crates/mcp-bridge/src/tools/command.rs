//! Shell tool: run_command.

use std::fmt::Write as _;
use std::time::Duration;

use serde_json::json;

use super::{McpTool, ToolContext};
use crate::audit::AuditRecord;
use crate::config::limits;
use crate::error::{ToolError, ToolResult};
use crate::exec::{CommandLine, ExecOutcome, ExecOutput, ExecRequest};
use crate::models::RunCommandInput;

/// Run a shell command line inside an allowed directory.
pub struct RunCommandTool;

/// Render stdout, stderr and the exit trailer.
fn render(output: &ExecOutput) -> String {
    let mut text = output.stdout.clone();
    if !output.stderr.is_empty() {
        let _ = write!(text, "\n--- STDERR ---\n{}", output.stderr);
    }
    let _ = write!(
        text,
        "\n--- Exit code: {} | Time: {:.1}s ---",
        output.exit_code,
        output.elapsed.as_secs_f64()
    );
    text
}

#[async_trait::async_trait]
impl McpTool for RunCommandTool {
    fn name(&self) -> &'static str {
        "run_command"
    }

    fn description(&self) -> &'static str {
        "Execute a shell command on the remote server. For simple operations (build, test, \
         git, status checks); for tasks requiring reasoning use claude_execute instead."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute"
                },
                "working_directory": {
                    "type": "string",
                    "default": "~/projects",
                    "description": "Working directory (must be in the allowed list)"
                },
                "timeout_seconds": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": limits::RUN_COMMAND_MAX_TIMEOUT_SECS,
                    "default": 60
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: RunCommandInput = serde_json::from_value(input)?;
        if params.command.trim().is_empty() {
            return Err(ToolError::validation("command", "must not be empty"));
        }
        if params.timeout_seconds == 0 {
            return Err(ToolError::validation("timeout_seconds", "must be at least 1"));
        }

        let cwd = ctx.validate_path(&params.working_directory)?;
        ctx.validate_command(&params.command)?;
        let timeout =
            Duration::from_secs(params.timeout_seconds.min(limits::RUN_COMMAND_MAX_TIMEOUT_SECS));

        let request = ExecRequest::new(CommandLine::Shell(params.command.clone()), &cwd, timeout)
            .env("TERM", "dumb");

        let (result, exit_code, elapsed) = match ctx.execute_exclusive(request).await? {
            ExecOutcome::Completed(output) => {
                (render(&output), Some(output.exit_code), output.elapsed)
            }
            ExecOutcome::TimedOut { timeout } => {
                (format!("ERROR: Timeout after {}s", timeout.as_secs()), None, timeout)
            }
        };

        AuditRecord {
            tool: self.name(),
            input: &params.command,
            working_directory: &cwd,
            exit_code,
            elapsed,
            output: &result,
        }
        .emit();

        Ok(result)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{Config, parse_blocked_commands};
    use crate::tools::test_support::sandboxed;

    fn run(root: &std::path::Path, command: &str) -> serde_json::Value {
        json!({"command": command, "working_directory": root.display().to_string()})
    }

    #[test]
    fn test_render_layout() {
        let output = ExecOutput {
            exit_code: 1,
            stdout: "out\n".into(),
            stderr: "err\n".into(),
            elapsed: Duration::from_millis(1300),
        };
        assert_eq!(render(&output), "out\n\n--- STDERR ---\nerr\n\n--- Exit code: 1 | Time: 1.3s ---");
    }

    #[tokio::test]
    async fn test_echo() {
        let (_dir, root, ctx) = sandboxed();
        let out = RunCommandTool.execute(&ctx, run(&root, "echo hello")).await.unwrap();
        assert!(out.starts_with("hello\n"));
        assert!(out.contains("--- Exit code: 0 |"));
        assert!(!out.contains("STDERR"));
    }

    #[tokio::test]
    async fn test_runs_in_working_directory_with_dumb_term() {
        let (_dir, root, ctx) = sandboxed();
        std::fs::write(root.join("marker.txt"), "").unwrap();

        let out = RunCommandTool.execute(&ctx, run(&root, "ls; echo $TERM")).await.unwrap();
        assert!(out.contains("marker.txt"));
        assert!(out.contains("dumb"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_reported() {
        let (_dir, root, ctx) = sandboxed();
        let out = RunCommandTool.execute(&ctx, run(&root, "echo bad >&2; exit 4")).await.unwrap();
        assert!(out.contains("--- STDERR ---\nbad"));
        assert!(out.contains("--- Exit code: 4 |"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let (_dir, root, ctx) = sandboxed();
        let mut input = run(&root, "sleep 30");
        input["timeout_seconds"] = json!(1);
        let out = RunCommandTool.execute(&ctx, input).await.unwrap();
        assert_eq!(out, "ERROR: Timeout after 1s");
    }

    #[tokio::test]
    async fn test_blocked_command() {
        let (_dir, root, ctx) = sandboxed();
        let mut config = Config::clone(&ctx.config);
        config.blocked_commands = parse_blocked_commands(r"rm\s+-rf\s+/").unwrap();
        let ctx = ToolContext::new(Arc::new(config));

        let err = RunCommandTool.execute(&ctx, run(&root, "rm -rf /")).await.unwrap_err();
        assert!(err.is_denial());
        assert!(err.to_string().contains("blocked"));
    }

    #[tokio::test]
    async fn test_working_directory_outside_sandbox() {
        let (_dir, _root, ctx) = sandboxed();
        let err = RunCommandTool
            .execute(&ctx, json!({"command": "ls", "working_directory": "/etc"}))
            .await
            .unwrap_err();
        assert!(err.is_denial());
    }
}
