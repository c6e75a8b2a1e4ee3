// src/control/server.rs

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::control::dispatch::Dispatcher;
use crate::control::frame::{read_frame, write_frame};
use crate::errors::Result;

pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "control channel listening");
    Ok(listener)
}

/// Accept driver connections forever, one task per connection.
///
/// A connection that sends a malformed frame is closed; other connections
/// are unaffected.
pub async fn serve(listener: TcpListener, dispatcher: Arc<Dispatcher>) -> Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(error = %err, "failed to accept control connection");
                continue;
            }
        };
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            if let Err(err) = handle_tcp(stream, peer, dispatcher).await {
                warn!(peer = %peer, error = %err, "control connection closed with error");
            }
        });
    }
}

async fn handle_tcp(stream: TcpStream, peer: SocketAddr, dispatcher: Arc<Dispatcher>) -> Result<()> {
    debug!(peer = %peer, "control connection accepted");
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.into_split();
    handle_connection(&mut reader, &mut writer, &dispatcher).await?;
    debug!(peer = %peer, "control connection closed by peer");
    Ok(())
}

/// Serve one connection until the peer closes it or sends garbage.
pub async fn handle_connection<R, W>(
    reader: &mut R,
    writer: &mut W,
    dispatcher: &Dispatcher,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = read_frame(reader).await? {
        if let Some(response) = dispatcher.dispatch(&frame)? {
            write_frame(writer, &response).await?;
        }
    }
    Ok(())
}
