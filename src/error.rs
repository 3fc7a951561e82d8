//! Error types for the relay
//!
//! Defines startup errors, directory errors, and outbound send errors.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors
///
/// Only raised during startup (config read, bind). Once the loop is
/// running, transport errors are handled per connection.
#[derive(Debug, Error)]
pub enum RelayError {
    /// IO error (bind / listener failure)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config source could not be read
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Config loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// User directory errors
///
/// Business errors: each one becomes a textual notice for the peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// Directory already holds `max_users` entries
    #[error("user limit of {0} reached")]
    CapacityExceeded(usize),

    /// Another connected user already has this name
    #[error("name already taken: {0}")]
    NameTaken(String),

    /// The requested name is empty
    #[error("name must not be empty")]
    EmptyName,

    /// The name could never be the target of a direct message
    #[error("name is not addressable: {0}")]
    ReservedName(String),

    /// No user is registered for the connection
    #[error("unknown connection")]
    UnknownConnection,
}

/// Outbound queue errors
#[derive(Debug, Error)]
pub enum SendError {
    /// The connection's outbound queue is full
    #[error("Outbound queue full")]
    QueueFull,

    /// The write side of the connection has gone away
    #[error("Channel closed")]
    ChannelClosed,
}
