//! Relay server: connection multiplexer and event loop
//!
//! One task owns the listening socket, every client registration, and the
//! user directory. It waits for either a new connection or an event from a
//! connection's read/write pumps, then runs the matching handler to
//! completion before waiting again. No locks are needed since nothing
//! else touches this state.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::directory::UserDirectory;
use crate::error::{DirectoryError, RelayError, SendError};
use crate::handler::{read_pump, write_pump, ClientEvent};
use crate::message::Message;
use crate::router::{notices, OutboundAction, Router};
use crate::types::ConnectionId;

/// Channel buffer size for connection events
const EVENT_BUFFER_SIZE: usize = 256;

/// Per-connection outbound queue size
const OUTBOUND_BUFFER_SIZE: usize = 32;

/// Something the loop woke up for
#[derive(Debug)]
pub enum Readiness {
    /// The listener produced a connection (or an accept error)
    Accept(io::Result<(TcpStream, SocketAddr)>),
    /// A connection task reported an event
    Client(ClientEvent),
}

/// Live registration for one accepted socket
///
/// Dropping it aborts the read pump and closes the outbound queue, which
/// lets the write pump flush and shut the socket down.
#[derive(Debug)]
pub struct Connection {
    outbound: mpsc::Sender<String>,
    reader: Option<JoinHandle<()>>,
    peer: Option<SocketAddr>,
}

impl Connection {
    pub fn new(outbound: mpsc::Sender<String>) -> Self {
        Self {
            outbound,
            reader: None,
            peer: None,
        }
    }

    fn with_io(outbound: mpsc::Sender<String>, reader: JoinHandle<()>, peer: SocketAddr) -> Self {
        Self {
            outbound,
            reader: Some(reader),
            peer: Some(peer),
        }
    }

    /// Queue text for this connection without waiting
    pub fn send(&self, text: String) -> Result<(), SendError> {
        self.outbound.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Registry of live connections plus the state routed over them
///
/// Keeps the directory and the registration map in lockstep: an id is in
/// both or in neither.
#[derive(Debug)]
pub struct Multiplexer {
    directory: UserDirectory,
    router: Router,
    connections: HashMap<ConnectionId, Connection>,
    read_buffer_size: usize,
}

impl Multiplexer {
    pub fn new(config: &Config) -> Self {
        Self {
            directory: UserDirectory::new(config.max_users),
            router: Router::new(config.max_message_length),
            connections: HashMap::new(),
            read_buffer_size: config.read_buffer_size(),
        }
    }

    /// True when no further connection may be registered
    pub fn is_full(&self) -> bool {
        self.directory.is_full()
    }

    /// Register a connection in the directory and the registry
    pub fn register(
        &mut self,
        id: ConnectionId,
        connection: Connection,
    ) -> Result<(), DirectoryError> {
        let user = self.directory.register(id)?;
        info!(
            "Connection {} from {} registered as '{}'",
            id,
            connection
                .peer
                .map(|p| p.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            user.name()
        );
        self.connections.insert(id, connection);
        debug!("Total connections: {}", self.connections.len());
        Ok(())
    }

    /// Drop a connection from both the registry and the directory
    ///
    /// Returns false if the id was not registered.
    pub fn remove(&mut self, id: ConnectionId) -> bool {
        let connection = self.connections.remove(&id);
        let user = self.directory.remove(id);

        if let Some(user) = &user {
            info!("Removed '{}' ({})", user.name(), id);
        }
        debug!("Total connections: {}", self.connections.len());
        connection.is_some() || user.is_some()
    }

    /// Handle one event from a connection task
    pub fn handle_event(&mut self, event: ClientEvent) {
        let id = event.id();
        if !self.connections.contains_key(&id) {
            debug!("Ignoring event for removed connection {}", id);
            return;
        }

        match event {
            ClientEvent::Received { id, data } => self.handle_message(id, &data),
            ClientEvent::Disconnected { id } => {
                info!("Connection {} closed by peer", id);
                self.remove(id);
            }
            ClientEvent::Failed { id, error } => {
                warn!("Connection {} failed: {}", id, error);
                self.remove(id);
            }
        }
    }

    fn handle_message(&mut self, id: ConnectionId, data: &[u8]) {
        debug!("Received {:?} from {}", String::from_utf8_lossy(data), id);

        // A full buffer means the message did not fit in one read
        if data.len() >= self.read_buffer_size {
            let limit = self.router.max_message_length();
            self.deliver(id, notices::too_long(limit));
            return;
        }

        let message = Message::parse(data);
        match self.router.route(&mut self.directory, id, &message) {
            OutboundAction::Reply(text) => {
                self.deliver(id, text);
            }
            OutboundAction::Forward {
                target,
                text,
                confirmation,
            } => {
                if self.deliver(target, text) {
                    self.deliver(id, confirmation);
                } else {
                    self.deliver(id, notices::send_failed(message.target()));
                }
            }
            OutboundAction::ReplyAndClose(text) => {
                self.deliver(id, text);
                self.remove(id);
            }
            OutboundAction::NoAction => {}
        }
    }

    /// Queue text for a connection
    ///
    /// A closed queue means the connection's writer is gone: that
    /// connection alone is removed. A full queue drops this one message.
    fn deliver(&mut self, id: ConnectionId, text: String) -> bool {
        let Some(connection) = self.connections.get(&id) else {
            return false;
        };

        debug!("Send {:?} to {}", text, id);
        match connection.send(text) {
            Ok(()) => true,
            Err(SendError::QueueFull) => {
                warn!("Outbound queue for {} is full, dropping message", id);
                false
            }
            Err(SendError::ChannelClosed) => {
                warn!("Connection {} writer is gone", id);
                self.remove(id);
                false
            }
        }
    }

    pub fn is_registered(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn directory(&self) -> &UserDirectory {
        &self.directory
    }

    /// Bytes a read pump should read per message
    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }
}

/// The relay server: listener plus multiplexer
pub struct RelayServer {
    listener: TcpListener,
    mux: Multiplexer,
    events_tx: mpsc::Sender<ClientEvent>,
    events_rx: mpsc::Receiver<ClientEvent>,
}

impl RelayServer {
    /// Bind the listening socket described by `config`
    pub async fn bind(config: &Config) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        Ok(Self::new(listener, config))
    }

    /// Serve on an already bound listener
    pub fn new(listener: TcpListener, config: &Config) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER_SIZE);
        Self {
            listener,
            mux: Multiplexer::new(config),
            events_tx,
            events_rx,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the event loop forever
    pub async fn run(mut self) {
        info!("Relay server started");

        loop {
            debug!("Waiting for connections or data...");
            let readiness = tokio::select! {
                accepted = self.listener.accept() => Readiness::Accept(accepted),
                Some(event) = self.events_rx.recv() => Readiness::Client(event),
            };
            self.dispatch(readiness);
        }
    }

    fn dispatch(&mut self, readiness: Readiness) {
        match readiness {
            Readiness::Accept(Ok((stream, addr))) => self.accept(stream, addr),
            Readiness::Accept(Err(e)) => error!("Failed to accept connection: {}", e),
            Readiness::Client(event) => self.mux.handle_event(event),
        }
    }

    fn accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        if self.mux.is_full() {
            info!("Too many users, connection from {} denied", addr);
            tokio::spawn(reject(stream, addr));
            return;
        }

        let id = ConnectionId::new();
        let (reader, writer) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER_SIZE);

        tokio::spawn(write_pump(id, writer, outbound_rx, self.events_tx.clone()));
        let reader = tokio::spawn(read_pump(
            id,
            reader,
            self.events_tx.clone(),
            self.mux.read_buffer_size(),
        ));

        if let Err(e) = self
            .mux
            .register(id, Connection::with_io(outbound_tx, reader, addr))
        {
            warn!("Could not register connection from {}: {}", addr, e);
        }
    }
}

/// Tell a connection over the limit why it is being closed
async fn reject(mut stream: TcpStream, addr: SocketAddr) {
    if let Err(e) = stream.write_all(notices::CAPACITY_EXCEEDED.as_bytes()).await {
        debug!("Could not send capacity notice to {}: {}", addr, e);
    }
    let _ = stream.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    fn mux(max_users: usize) -> Multiplexer {
        Multiplexer::new(&Config {
            max_users,
            ..Config::default()
        })
    }

    fn connect(mux: &mut Multiplexer) -> (ConnectionId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(8);
        let id = ConnectionId::new();
        mux.register(id, Connection::new(tx)).unwrap();
        (id, rx)
    }

    fn send(mux: &mut Multiplexer, id: ConnectionId, raw: &str) {
        mux.handle_event(ClientEvent::Received {
            id,
            data: raw.as_bytes().to_vec(),
        });
    }

    fn named(mux: &mut Multiplexer, name: &str) -> (ConnectionId, mpsc::Receiver<String>) {
        let (id, mut rx) = connect(mux);
        send(mux, id, &format!("*/registration:{}", name));
        assert_eq!(rx.try_recv().unwrap(), notices::name_changed(name));
        (id, rx)
    }

    #[test]
    fn test_register_fills_both_tables() {
        let mut mux = mux(4);
        let (id, _rx) = connect(&mut mux);

        assert!(mux.is_registered(id));
        assert!(mux.directory().contains(id));
        assert_eq!(mux.connection_count(), 1);
    }

    #[test]
    fn test_capacity_rejects_extra_connection() {
        let mut mux = mux(2);
        connect(&mut mux);
        connect(&mut mux);
        assert!(mux.is_full());

        let (tx, _rx) = mpsc::channel(8);
        let extra = ConnectionId::new();
        assert_eq!(
            mux.register(extra, Connection::new(tx)).unwrap_err(),
            DirectoryError::CapacityExceeded(2)
        );
        assert!(!mux.is_registered(extra));
        assert_eq!(mux.directory().len(), 2);
        assert_eq!(mux.connection_count(), 2);
    }

    #[test]
    fn test_direct_message_reaches_target() {
        let mut mux = mux(4);
        let (alice, mut alice_rx) = named(&mut mux, "alice");
        let (_bob, mut bob_rx) = named(&mut mux, "bob");

        send(&mut mux, alice, "bob:hello");

        assert_eq!(bob_rx.try_recv().unwrap(), "message from alice: hello");
        assert_eq!(alice_rx.try_recv().unwrap(), "message sent to bob");
    }

    #[test]
    fn test_direct_message_to_absent_user() {
        let mut mux = mux(4);
        let (alice, mut alice_rx) = named(&mut mux, "alice");
        let (_carol, mut carol_rx) = named(&mut mux, "carol");

        send(&mut mux, alice, "bob:hello");

        assert_eq!(alice_rx.try_recv().unwrap(), "failed to send message to bob");
        assert_eq!(carol_rx.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[test]
    fn test_forward_to_dead_writer_keeps_sender() {
        let mut mux = mux(4);
        let (alice, mut alice_rx) = named(&mut mux, "alice");
        let (bob, bob_rx) = named(&mut mux, "bob");
        drop(bob_rx);

        send(&mut mux, alice, "bob:hello");

        assert_eq!(alice_rx.try_recv().unwrap(), "failed to send message to bob");
        assert!(mux.is_registered(alice));
        assert!(!mux.is_registered(bob));
        assert!(!mux.directory().contains(bob));
    }

    #[test]
    fn test_disconnect_cleans_up() {
        let mut mux = mux(4);
        let (alice, mut alice_rx) = named(&mut mux, "alice");
        let (bob, mut bob_rx) = named(&mut mux, "bob");

        mux.handle_event(ClientEvent::Disconnected { id: alice });

        assert!(!mux.is_registered(alice));
        assert!(!mux.directory().contains(alice));
        assert_eq!(mux.directory().find_by_name("alice"), None);

        // Late events for the removed id are ignored
        send(&mut mux, alice, "bob:still here?");
        assert_eq!(alice_rx.try_recv().unwrap_err(), TryRecvError::Disconnected);
        assert_eq!(bob_rx.try_recv().unwrap_err(), TryRecvError::Empty);
        assert!(mux.is_registered(bob));
    }

    #[test]
    fn test_failure_removes_only_that_connection() {
        let mut mux = mux(4);
        let (alice, _alice_rx) = named(&mut mux, "alice");
        let (bob, _bob_rx) = named(&mut mux, "bob");

        mux.handle_event(ClientEvent::Failed {
            id: bob,
            error: io::Error::new(io::ErrorKind::Other, "boom"),
        });

        assert!(mux.is_registered(alice));
        assert!(!mux.is_registered(bob));
        assert_eq!(mux.directory().len(), 1);
    }

    #[test]
    fn test_exit_replies_then_closes() {
        let mut mux = mux(4);
        let (alice, mut alice_rx) = named(&mut mux, "alice");

        send(&mut mux, alice, "*/exit");

        assert_eq!(alice_rx.try_recv().unwrap(), notices::BYE);
        assert_eq!(alice_rx.try_recv().unwrap_err(), TryRecvError::Disconnected);
        assert!(!mux.is_registered(alice));
        assert!(mux.directory().is_empty());
    }

    #[test]
    fn test_name_freed_after_disconnect() {
        let mut mux = mux(4);
        let (alice, _alice_rx) = named(&mut mux, "alice");
        mux.handle_event(ClientEvent::Disconnected { id: alice });

        let (_again, _rx) = named(&mut mux, "alice");
    }

    #[test]
    fn test_full_read_is_too_long() {
        let mut mux = mux(4);
        let (alice, mut alice_rx) = named(&mut mux, "alice");
        let (_bob, mut bob_rx) = named(&mut mux, "bob");

        let size = mux.read_buffer_size();
        let raw = format!("bob:{}", "x".repeat(size));
        send(&mut mux, alice, &raw[..size]);

        let limit = Config::default().max_message_length;
        assert_eq!(alice_rx.try_recv().unwrap(), notices::too_long(limit));
        assert_eq!(bob_rx.try_recv().unwrap_err(), TryRecvError::Empty);
        assert!(mux.is_registered(alice));
    }

    #[test]
    fn test_invalid_message_keeps_connection() {
        let mut mux = mux(4);
        let (alice, mut alice_rx) = named(&mut mux, "alice");

        send(&mut mux, alice, "hi");

        assert_eq!(alice_rx.try_recv().unwrap(), notices::INVALID_FORMAT);
        assert!(mux.is_registered(alice));
    }
}
