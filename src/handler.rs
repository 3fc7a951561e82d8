//! Per-connection I/O tasks
//!
//! Each accepted socket is split into two halves driven by small tasks:
//! - the read pump turns socket readiness into [`ClientEvent`]s for the
//!   server loop
//! - the write pump drains the connection's outbound queue onto the socket
//!
//! Neither task touches shared state; everything goes through channels.

use std::io;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::types::ConnectionId;

/// Events reported by connection tasks to the server loop
#[derive(Debug)]
pub enum ClientEvent {
    /// One read worth of bytes; each read is one message
    Received { id: ConnectionId, data: Vec<u8> },
    /// Peer closed the connection or reset it
    Disconnected { id: ConnectionId },
    /// Read or write failed
    Failed { id: ConnectionId, error: io::Error },
}

impl ClientEvent {
    pub fn id(&self) -> ConnectionId {
        match self {
            ClientEvent::Received { id, .. }
            | ClientEvent::Disconnected { id }
            | ClientEvent::Failed { id, .. } => *id,
        }
    }
}

/// Read from the socket until it closes or fails
///
/// A zero-length read or a reset is reported as `Disconnected`. The task
/// also ends quietly once the server loop has gone away.
pub async fn read_pump(
    id: ConnectionId,
    mut reader: OwnedReadHalf,
    events: mpsc::Sender<ClientEvent>,
    buffer_size: usize,
) {
    let mut buf = vec![0u8; buffer_size];

    loop {
        let event = match reader.read(&mut buf).await {
            Ok(0) => ClientEvent::Disconnected { id },
            Ok(n) => ClientEvent::Received {
                id,
                data: buf[..n].to_vec(),
            },
            Err(e) if is_disconnect(&e) => {
                debug!("Connection {} reset by peer: {}", id, e);
                ClientEvent::Disconnected { id }
            }
            Err(e) => ClientEvent::Failed { id, error: e },
        };

        let last = !matches!(event, ClientEvent::Received { .. });
        if events.send(event).await.is_err() {
            debug!("Server closed, ending read pump for {}", id);
            return;
        }
        if last {
            debug!("Read pump ended for {}", id);
            return;
        }
    }
}

/// Write queued replies until the queue closes
///
/// When the server drops the sending side (connection removed) any
/// replies still queued are flushed before the socket is shut down.
pub async fn write_pump(
    id: ConnectionId,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<String>,
    events: mpsc::Sender<ClientEvent>,
) {
    while let Some(text) = outbound.recv().await {
        if let Err(e) = writer.write_all(text.as_bytes()).await {
            warn!("Write to {} failed: {}", id, e);
            let _ = events.send(ClientEvent::Failed { id, error: e }).await;
            return;
        }
    }

    let _ = writer.shutdown().await;
    debug!("Write pump ended for {}", id);
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}
