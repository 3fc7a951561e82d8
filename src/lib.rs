//! Multi-client TCP Chat Relay Library
//!
//! Clients connect over TCP, pick a display name, and send direct messages
//! to other connected users or administrative commands to the server.
//!
//! # Protocol
//! Each read from a client is one message:
//! - `<target>:<text>` sends `text` to the user named `target`
//! - `*/init` returns the maximum message length
//! - `*/registration:<name>` / `*/change_name:<name>` set the display name
//! - `*/who` lists connected users
//! - `*/exit` says goodbye and closes the connection
//!
//! # Architecture
//! A single server task owns all state:
//! - `RelayServer` waits on the listener and on events from connections
//! - each connection has a read pump and a write pump task (`handler`)
//! - `Router` decides what to send; `Multiplexer` applies it
//! - no locks needed, only the server task touches the `UserDirectory`
//!
//! # Example
//! ```ignore
//! use chat_relay::{Config, RelayServer};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let (config, _warnings) = Config::load("config").unwrap();
//!     let server = RelayServer::bind(&config).await.unwrap();
//!     server.run().await;
//! }
//! ```

pub mod config;
pub mod directory;
pub mod error;
pub mod handler;
pub mod message;
pub mod router;
pub mod server;
pub mod types;
pub mod user;

// Re-export main types for convenience
pub use config::{Config, ConfigWarning, LogLevel};
pub use directory::UserDirectory;
pub use error::{ConfigError, DirectoryError, RelayError, SendError};
pub use handler::ClientEvent;
pub use message::{Command, Message, COMMAND_PREFIX};
pub use router::{OutboundAction, Router};
pub use server::{Connection, Multiplexer, Readiness, RelayServer};
pub use types::{ConnectionId, PlaceholderName};
pub use user::{Renamed, User};
