//! TCP transport: length-prefixed bincode frames, one connection per
//! call on the client side, one task per connection on the server side.
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::watch;

use super::RingOp;
use super::RingReply;
use super::RingService;
use super::Transport;
use crate::consts::MAX_FRAME_SIZE;
use crate::dht::Peer;
use crate::error::Error;
use crate::error::Result;

async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = bincode::serialize(value).map_err(Error::Codec)?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge(body.len()));
    }
    writer.write_all(&(body.len() as u32).to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_frame<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut header = [0u8; 4];
    reader.read_exact(&mut header).await?;
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    bincode::deserialize(&body).map_err(Error::Codec)
}

/// Outbound side. Dialing, framing and waiting all sit under one
/// deadline so a hung peer costs a timeout, not a stuck task.
pub struct TcpTransport {
    timeout: Duration,
}

impl TcpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn exchange(&self, target: &Peer, op: &RingOp) -> Result<RingReply> {
        let mut stream = TcpStream::connect(target.address()).await?;
        write_frame(&mut stream, op).await?;
        read_frame(&mut stream).await
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn call(&self, target: &Peer, op: RingOp) -> Result<RingReply> {
        match tokio::time::timeout(self.timeout, self.exchange(target, &op)).await {
            Ok(reply) => reply,
            Err(_) => Err(Error::RpcTimeout),
        }
    }
}

/// Accept loop of a node's endpoint. Runs until the shutdown channel
/// flips; connections in flight just finish their current frame.
pub async fn serve(
    listener: TcpListener,
    service: Arc<dyn RingService>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let service = service.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, service).await {
                            tracing::debug!(peer = %addr, error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => tracing::warn!(error = %e, "accept failed"),
            },
        }
    }
    tracing::debug!("rpc endpoint stopped");
}

async fn handle_connection(mut stream: TcpStream, service: Arc<dyn RingService>) -> Result<()> {
    loop {
        let op: RingOp = match read_frame(&mut stream).await {
            Ok(op) => op,
            Err(Error::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };
        let reply = service.dispatch(op).await;
        write_frame(&mut stream, &reply).await?;
    }
}
