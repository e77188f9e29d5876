use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::handle_message;
use crate::auth::Caller;
use crate::tools::ToolContext;

/// Serve newline-delimited JSON-RPC on stdin/stdout until stdin closes
pub async fn run_stdio(ctx: &ToolContext, caller: Caller) -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    serve(ctx, &caller, stdin, stdout).await
}

/// Line loop over any reader/writer pair
pub async fn serve<R, W>(ctx: &ToolContext, caller: &Caller, reader: R, mut writer: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(response) = handle_message(ctx, caller, &line).await {
            let mut out = serde_json::to_vec(&response)?;
            out.push(b'\n');
            writer.write_all(&out).await?;
            writer.flush().await?;
        }
    }
    tracing::info!("stdin closed, stopping");
    Ok(())
}
