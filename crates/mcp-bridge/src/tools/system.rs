//! Host status tools: gpu_status, system_info.

use serde_json::json;

use super::{McpTool, ToolContext};
use crate::config::limits;
use crate::error::{ToolError, ToolResult};
use crate::exec::{CommandLine, ExecOutcome, ExecRequest};

const GPU_QUERY: &str = "gpu_name,gpu_bus_id,memory.total,memory.used,memory.free,\
                         temperature.gpu,utilization.gpu,utilization.memory";

fn probe(command: CommandLine) -> ExecRequest {
    ExecRequest::new(command, std::env::temp_dir(), limits::PROBE_TIMEOUT)
}

/// GPU model, VRAM, temperature and compute processes via `nvidia-smi`.
pub struct GpuStatusTool {
    binary: String,
}

impl GpuStatusTool {
    /// Query a specific `nvidia-smi` binary.
    #[must_use]
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn query(&self, args: &[&str]) -> ExecRequest {
        let mut argv = vec![self.binary.clone()];
        argv.extend(args.iter().map(|arg| (*arg).to_owned()));
        probe(CommandLine::Argv(argv))
    }
}

impl Default for GpuStatusTool {
    fn default() -> Self {
        Self::with_binary("nvidia-smi")
    }
}

/// Render one CSV row of the GPU query; rows with missing columns are skipped.
fn format_gpu_row(row: &str) -> Option<String> {
    let cols: Vec<&str> = row.split(',').map(str::trim).collect();
    let [name, bus, total, used, free, temp, util_gpu, util_mem, ..] = cols.as_slice() else {
        return None;
    };
    Some(format!(
        "GPU: {name} (Bus: {bus})\n  VRAM: {used}MB / {total}MB (free: {free}MB)\n  \
         Temperature: {temp}C\n  Utilization: GPU {util_gpu}%, Memory {util_mem}%"
    ))
}

#[async_trait::async_trait]
impl McpTool for GpuStatusTool {
    fn name(&self) -> &'static str {
        "gpu_status"
    }

    fn description(&self) -> &'static str {
        "Get GPU status: model, VRAM usage, temperature, running processes. \
         Returns N/A if no NVIDIA GPU is available."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, ctx: &ToolContext, _input: serde_json::Value) -> ToolResult<String> {
        let query = format!("--query-gpu={GPU_QUERY}");
        let outcome = match ctx.execute(self.query(&[&query, "--format=csv,noheader,nounits"])).await {
            Ok(outcome) => outcome,
            Err(ToolError::Exec(e)) if e.is_not_found() => {
                return Ok("GPU: N/A (nvidia-smi not found on this system)".to_owned());
            }
            Err(e) => return Err(e),
        };

        let output = match outcome {
            ExecOutcome::Completed(output) if output.success() => output,
            ExecOutcome::Completed(output) => {
                return Ok(format!("GPU: Error running nvidia-smi: {}", output.stderr.trim()));
            }
            ExecOutcome::TimedOut { timeout } => {
                return Ok(format!(
                    "GPU: Error running nvidia-smi: timed out after {}s",
                    timeout.as_secs()
                ));
            }
        };

        let mut lines: Vec<String> = output.stdout.lines().filter_map(format_gpu_row).collect();

        let apps = ctx
            .execute(self.query(&[
                "--query-compute-apps=pid,name,used_gpu_memory",
                "--format=csv,noheader,nounits",
            ]))
            .await?;
        let processes = match apps {
            ExecOutcome::Completed(output) if output.success() => output.stdout,
            _ => String::new(),
        };

        if processes.trim().is_empty() {
            lines.push("\nNo GPU processes running".to_owned());
        } else {
            lines.push("\nRunning GPU processes:".to_owned());
            lines.extend(processes.trim().lines().map(|p| format!("  {}", p.trim())));
        }

        Ok(lines.join("\n"))
    }
}

/// Uptime, memory, disk, CPU load and top processes.
pub struct SystemInfoTool;

async fn run_probe(ctx: &ToolContext, line: &str) -> ToolResult<String> {
    Ok(match ctx.execute(probe(CommandLine::Shell(line.to_owned()))).await? {
        ExecOutcome::Completed(output) => output.stdout.trim().to_owned(),
        ExecOutcome::TimedOut { .. } => "(timed out)".to_owned(),
    })
}

#[async_trait::async_trait]
impl McpTool for SystemInfoTool {
    fn name(&self) -> &'static str {
        "system_info"
    }

    fn description(&self) -> &'static str {
        "Get system information: uptime, CPU load, RAM, disk usage, top processes."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, ctx: &ToolContext, _input: serde_json::Value) -> ToolResult<String> {
        let uptime = run_probe(ctx, "uptime").await?;
        let memory = run_probe(ctx, "free -h | head -3").await?;
        let disk = run_probe(ctx, "df -h / /home 2>/dev/null").await?;
        let load = run_probe(ctx, "cat /proc/loadavg").await?;
        let top = run_probe(ctx, "ps aux --sort=-%cpu | head -8").await?;
        let cpus = std::thread::available_parallelism().map_or(0, std::num::NonZeroUsize::get);

        let parts = [
            format!("Uptime: {uptime}"),
            format!("\nMemory:\n{memory}"),
            format!("\nDisk:\n{disk}"),
            format!("\nCPU: {cpus} cores, Load: {load}"),
            format!("\nTop processes:\n{top}"),
        ];
        Ok(parts.join("\n"))
    }
}
