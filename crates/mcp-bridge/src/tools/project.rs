//! Repository tool: project_status.

use std::path::Path;

use serde_json::json;

use super::{McpTool, ToolContext};
use crate::config::limits;
use crate::error::ToolResult;
use crate::exec::{CommandLine, ExecOutcome, ExecRequest};
use crate::models::ProjectStatusInput;

/// Branch, working-tree status, recent commits and optionally the diff of a git checkout.
pub struct ProjectStatusTool;

/// Run one git subcommand; failures are folded into the returned text.
async fn run_git(ctx: &ToolContext, cwd: &Path, args: &[&str]) -> ToolResult<String> {
    let mut argv = vec!["git".to_owned()];
    argv.extend(args.iter().map(|arg| (*arg).to_owned()));
    let request = ExecRequest::new(CommandLine::Argv(argv), cwd, limits::GIT_TIMEOUT);

    Ok(match ctx.execute(request).await? {
        ExecOutcome::Completed(output) if output.success() => output.stdout.trim().to_owned(),
        ExecOutcome::Completed(output) => format!("(git error: {})", output.stderr.trim()),
        ExecOutcome::TimedOut { timeout } => {
            format!("(git error: timed out after {}s)", timeout.as_secs())
        }
    })
}

fn truncate_diff(diff: &str) -> String {
    let total = diff.chars().count();
    if total <= limits::DIFF_MAX_CHARS {
        return diff.to_owned();
    }
    let head: String = diff.chars().take(limits::DIFF_MAX_CHARS).collect();
    format!("{head}\n... [truncated, {total} chars total]")
}

#[async_trait::async_trait]
impl McpTool for ProjectStatusTool {
    fn name(&self) -> &'static str {
        "project_status"
    }

    fn description(&self) -> &'static str {
        "Get git status of a project: current branch, short status, recent commits, and \
         optionally the diff of uncommitted changes."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "project_path": {
                    "type": "string",
                    "description": "Path to the project (must be in allowed dirs)"
                },
                "include_diff": {
                    "type": "boolean",
                    "default": false,
                    "description": "Include diff of uncommitted changes"
                },
                "log_count": {
                    "type": "integer",
                    "minimum": 1,
                    "default": 5,
                    "description": "Number of recent commits to show"
                }
            },
            "required": ["project_path"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: ProjectStatusInput = serde_json::from_value(input)?;
        let cwd = ctx.validate_path(&params.project_path)?;

        let branch = run_git(ctx, &cwd, &["branch", "--show-current"]).await?;
        let status = run_git(ctx, &cwd, &["status", "--short"]).await?;
        let log_arg = format!("-{}", params.log_count.max(1));
        let log = run_git(ctx, &cwd, &["log", "--oneline", &log_arg]).await?;

        let mut parts = vec![
            format!("Branch: {branch}"),
            format!("\nStatus:\n{}", if status.is_empty() { "(clean)" } else { status.as_str() }),
            format!("\nRecent commits:\n{log}"),
        ];

        if params.include_diff {
            let diff = run_git(ctx, &cwd, &["diff"]).await?;
            if diff.is_empty() {
                parts.push("\nDiff: (no unstaged changes)".to_owned());
            } else {
                parts.push(format!("\nDiff:\n{}", truncate_diff(&diff)));
            }
        }

        Ok(parts.join("\n"))
    }
}
