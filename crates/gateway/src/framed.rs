//! Unix-domain socket and TCP transports (§6: "Unix/TCP/HTTP servers
//! are thin framings over the command/event contract"). Each
//! connection is a newline-delimited JSON request/response loop: one
//! line in is one `Command`, one line out is one `CommandResult`.
//! Commands on a single connection are processed in arrival order
//! (§5 ordering guarantees); concurrent connections are independent
//! tasks.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;

use nerve_engine::Engine;
use nerve_protocol::{Command, CommandResult};

async fn serve_line<R, W>(mut reader: BufReader<R>, mut writer: W, engine: Arc<Engine>)
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "framed transport read error");
                break;
            }
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let result = match serde_json::from_str::<Command>(trimmed) {
            Ok(cmd) => engine.execute(cmd).await,
            Err(e) => CommandResult::err(&nerve_domain::error::Error::invalid_input(format!("malformed command: {e}"))),
        };
        let Ok(mut encoded) = serde_json::to_string(&result) else { break };
        encoded.push('\n');
        if writer.write_all(encoded.as_bytes()).await.is_err() {
            break;
        }
    }
}

pub async fn serve_tcp(addr: &str, engine: Arc<Engine>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr, "TCP transport listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        let engine = engine.clone();
        tokio::spawn(async move {
            tracing::debug!(%peer, "TCP connection accepted");
            let (read_half, write_half) = stream.into_split();
            serve_line(BufReader::new(read_half), write_half, engine).await;
            tracing::debug!(%peer, "TCP connection closed");
        });
    }
}

#[cfg(unix)]
pub async fn serve_unix(path: &str, engine: Arc<Engine>) -> std::io::Result<()> {
    // A stale socket file from a previous crash would otherwise fail
    // the bind.
    let _ = std::fs::remove_file(path);
    let listener = UnixListener::bind(path)?;
    tracing::info!(path, "Unix-socket transport listening");
    loop {
        let (stream, _) = listener.accept().await?;
        let engine = engine.clone();
        tokio::spawn(async move {
            let (read_half, write_half) = stream.into_split();
            serve_line(BufReader::new(read_half), write_half, engine).await;
        });
    }
}
