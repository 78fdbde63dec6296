//! MCP tool implementations.
//!
//! Each tool:
//! 1. Parses and validates its input parameters
//! 2. Passes paths and commands through the sandbox
//! 3. Runs subprocesses via the [`ExecutionEngine`] held in the [`ToolContext`]
//!
//! The [`ToolDispatcher`] owns the registry and applies per-tool rate limiting before any
//! tool runs.

mod claude;
mod command;
mod files;
mod project;
mod system;

pub use claude::ClaudeExecuteTool;
pub use command::RunCommandTool;
pub use files::{FileReadTool, FileWriteTool};
pub use project::ProjectStatusTool;
pub use system::{GpuStatusTool, SystemInfoTool};

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{SandboxError, ToolError, ToolResult};
use crate::exec::{ExecOutcome, ExecRequest, ExecutionEngine};
use crate::limiter::{ConcurrencyLimiter, RateLimiter};
use crate::sandbox;

/// Tool execution context.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Server configuration.
    pub config: Arc<Config>,

    /// Gate for subprocess-spawning tools.
    pub concurrency: ConcurrencyLimiter,

    /// Subprocess runner.
    pub engine: ExecutionEngine,
}

impl ToolContext {
    /// Create a new tool context.
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        let concurrency = ConcurrencyLimiter::new(config.max_concurrent_executions);
        Self { config, concurrency, engine: ExecutionEngine::new() }
    }

    /// Resolve `path` and require it to be inside an allowed directory.
    pub fn validate_path(&self, path: &str) -> Result<PathBuf, SandboxError> {
        sandbox::validate_path(path, &self.config.allowed_dirs)
    }

    /// Reject `command` if it matches a blocked pattern.
    pub fn validate_command(&self, command: &str) -> Result<(), SandboxError> {
        sandbox::validate_command(command, &self.config.blocked_commands)
    }

    /// Run a short probe without taking a concurrency slot.
    pub async fn execute(&self, request: ExecRequest) -> ToolResult<ExecOutcome> {
        Ok(self.engine.execute(request).await?)
    }

    /// Run a request while holding a concurrency slot.
    ///
    /// Fails immediately when every slot is taken. The slot is released on every path out
    /// of the execution, including errors.
    pub async fn execute_exclusive(&self, request: ExecRequest) -> ToolResult<ExecOutcome> {
        let permit = self.concurrency.acquire()?;
        let outcome = self.engine.execute(request).await;
        permit.release();
        Ok(outcome?)
    }
}

/// Trait for MCP tools.
#[async_trait::async_trait]
pub trait McpTool: Send + Sync {
    /// Tool name (e.g., "run_command").
    fn name(&self) -> &'static str;

    /// Tool description for LLM.
    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with given input.
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String>;
}

/// Register all tools.
#[must_use]
pub fn register_all_tools() -> Vec<Box<dyn McpTool>> {
    vec![
        // Execution
        Box::new(ClaudeExecuteTool),
        Box::new(RunCommandTool),
        // Files
        Box::new(FileReadTool),
        Box::new(FileWriteTool),
        // Status
        Box::new(ProjectStatusTool),
        Box::new(GpuStatusTool::default()),
        Box::new(SystemInfoTool),
    ]
}

/// Routes tool calls through admission control and applies the error policy.
///
/// Denials (sandbox, rate, concurrency, bad arguments, unknown tool) are returned as `Err`
/// so the transport can report a protocol error. Every other failure becomes an `ERROR:`
/// text result.
pub struct ToolDispatcher {
    tools: Vec<Box<dyn McpTool>>,
    ctx: ToolContext,
    rate_limiter: RateLimiter,
}

impl ToolDispatcher {
    /// Dispatcher over the full tool set.
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_tools(config, register_all_tools())
    }

    /// Dispatcher over a custom tool set.
    #[must_use]
    pub fn with_tools(config: Arc<Config>, tools: Vec<Box<dyn McpTool>>) -> Self {
        let rate_limiter = RateLimiter::new(config.max_requests_per_minute);
        Self { tools, ctx: ToolContext::new(config), rate_limiter }
    }

    /// Registered tools, in registration order.
    #[must_use]
    pub fn tools(&self) -> &[Box<dyn McpTool>] {
        &self.tools
    }

    /// Shared tool context.
    #[must_use]
    pub const fn context(&self) -> &ToolContext {
        &self.ctx
    }

    /// Per-tool rate limiter.
    #[must_use]
    pub const fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Invoke `name` with `input`.
    pub async fn call(&self, name: &str, input: serde_json::Value) -> ToolResult<String> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_owned()))?;

        self.rate_limiter.check(name).await?;

        tracing::debug!(tool = name, "Executing tool");
        match tool.execute(&self.ctx, input).await {
            Ok(text) => Ok(text),
            Err(e) if e.is_denial() => {
                tracing::warn!(tool = name, error = %e, "Tool call denied");
                Err(e)
            }
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "Tool call failed");
                Ok(format!("ERROR: {}", e.to_user_message()))
            }
        }
    }
}
