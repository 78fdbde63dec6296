//! Stdio transport for MCP protocol.
//!
//! Handles line-delimited JSON-RPC 2.0 over stdin/stdout. Logs go to stderr.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::tools::ToolDispatcher;

use super::transport::{JsonRpcRequest, JsonRpcResponse, handle_request};

/// Handle MCP protocol over stdio until stdin closes.
///
/// # Errors
///
/// Returns error on I/O failure.
pub async fn run_stdio(dispatcher: ToolDispatcher) -> anyhow::Result<()> {
    serve(dispatcher, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}

/// Serve requests read from `reader`, writing one response line per request.
///
/// # Errors
///
/// Returns error on I/O failure.
pub async fn serve<R, W>(dispatcher: ToolDispatcher, mut reader: R, mut writer: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();

    tracing::info!("MCP stdio server ready, waiting for requests...");

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            tracing::info!("Stdin closed, shutting down");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(request) => handle_request(&dispatcher, request).await,
            Err(e) => Some(JsonRpcResponse::parse_error(e)),
        };

        if let Some(response) = response {
            let mut out = serde_json::to_vec(&response)?;
            out.push(b'\n');
            writer.write_all(&out).await?;
            writer.flush().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn test_serve_replies_per_request() {
        let dir = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        let dispatcher = ToolDispatcher::new(Arc::new(Config::for_testing(vec![root])));

        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            "not json\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
        );
        let mut output = Vec::new();
        serve(dispatcher, input.as_bytes(), &mut output).await.unwrap();

        let lines: Vec<serde_json::Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[1]["error"]["code"], -32700);
        assert_eq!(lines[2]["result"]["tools"].as_array().unwrap().len(), 7);
    }
}
