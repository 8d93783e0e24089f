//! Per-connection session loop.

use crate::protocol::Dispatcher;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Drive one client connection: read a line, dispatch it, write the
/// response, until the peer disconnects, goes idle past the timeout, or
/// I/O fails. Blank lines are skipped without a response.
pub async fn run(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    idle_timeout: Duration,
) {
    tracing::info!("connection opened from {}", peer);

    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        let read = match timeout(idle_timeout, reader.read_line(&mut line)).await {
            Err(_) => {
                tracing::info!("connection from {} idle for {:?}, closing", peer, idle_timeout);
                break;
            }
            Ok(Err(e)) => {
                tracing::warn!("read error from {}: {}", peer, e);
                break;
            }
            Ok(Ok(read)) => read,
        };
        if read == 0 {
            break; // peer closed the connection
        }

        let command = line.trim_end_matches(['\r', '\n']);
        if command.trim().is_empty() {
            continue;
        }

        tracing::debug!("{} -> {}", peer, command);
        let response = dispatcher.dispatch(command).await;
        tracing::debug!("{} <- {}", peer, response);

        if let Err(e) = write_response(&mut write_half, &response).await {
            tracing::warn!("write error to {}: {}", peer, e);
            break;
        }
    }

    tracing::info!("connection from {} closed", peer);
}

async fn write_response(write_half: &mut OwnedWriteHalf, response: &str) -> std::io::Result<()> {
    write_half.write_all(response.as_bytes()).await?;
    write_half.write_all(b"\n").await?;
    write_half.flush().await
}
