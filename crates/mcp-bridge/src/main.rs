//! MCP Bridge Server - Entry Point
//!
//! Provides both stdio and HTTP transports.

use std::sync::Arc;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use mcp_bridge::audit::{AUDIT_LOG_BACKUPS, AUDIT_TARGET, RotatingFile};
use mcp_bridge::{Config, McpServer, Settings};

#[derive(Parser, Debug)]
#[command(name = "mcp-bridge")]
#[command(about = "MCP server for sandboxed remote execution")]
#[command(version)]
struct Cli {
    /// Transport mode: stdio or http
    #[arg(long, default_value = "http", env = "MCP_TRANSPORT")]
    transport: Transport,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(flatten)]
    settings: Settings,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum Transport {
    /// Standard input/output
    Stdio,
    /// Streamable HTTP
    #[default]
    Http,
}

/// Logs go to stderr so stdout stays free for the stdio transport. Audit records are
/// also written as JSON lines to the rotating audit log, whatever the console level.
///
/// The returned guard flushes the audit writer on drop; keep it alive for the process.
fn init_tracing(log_level: &str, json: bool, config: &Config) -> anyhow::Result<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console = if json {
        tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr).with_filter(filter).boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed()
    };

    let audit_log = config.audit_log_path();
    let file = RotatingFile::open(&audit_log, config.max_log_size_bytes, AUDIT_LOG_BACKUPS)
        .map_err(|e| anyhow::anyhow!("Cannot open audit log {}: {e}", audit_log.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    let audit = tracing_subscriber::fmt::layer()
        .json()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(Targets::new().with_target(AUDIT_TARGET, LevelFilter::INFO));

    tracing_subscriber::registry().with(console).with(audit).init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_settings(cli.settings)?;
    let _audit_guard = init_tracing(&cli.log_level, cli.json_logs, &config)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        transport = ?cli.transport,
        audit_log = %config.audit_log_path().display(),
        "Starting MCP bridge server"
    );

    let server = McpServer::new(Arc::new(config));

    match cli.transport {
        Transport::Stdio => server.run_stdio().await?,
        Transport::Http => server.run_http().await?,
    }

    Ok(())
}
