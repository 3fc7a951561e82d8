//! Message routing
//!
//! Turns a parsed [`Message`] from one connection into an
//! [`OutboundAction`]. Routing only reads and updates the
//! [`UserDirectory`]; it never touches a socket, so the server applies
//! the returned action.

use tracing::{debug, info, warn};

use crate::directory::UserDirectory;
use crate::error::DirectoryError;
use crate::message::{Command, Message};
use crate::types::ConnectionId;

/// Texts sent back to clients
pub mod notices {
    pub const INVALID_FORMAT: &str = "invalid message format or command";
    pub const NAME_TAKEN: &str = "name taken, choose another";
    pub const EMPTY_NAME: &str = "name must not be empty";
    pub const RESERVED_NAME: &str = "name must not contain ':' or start with '*/'";
    pub const CAPACITY_EXCEEDED: &str = "user limit reached, try again later";
    pub const BYE: &str = "bye";

    pub fn name_changed(name: &str) -> String {
        format!("name changed to {}", name)
    }

    pub fn user_list(names: &[String]) -> String {
        format!("available users: {}", names.join(", "))
    }

    pub fn command_not_found(command: &str) -> String {
        format!("command not found: {}", command)
    }

    pub fn message_from(sender: &str, payload: &str) -> String {
        format!("message from {}: {}", sender, payload)
    }

    pub fn message_sent(target: &str) -> String {
        format!("message sent to {}", target)
    }

    pub fn send_failed(target: &str) -> String {
        format!("failed to send message to {}", target)
    }

    pub fn too_long(limit: usize) -> String {
        format!("message too long, limit is {} characters", limit)
    }
}

/// What the server should write after handling one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundAction {
    /// Reply to the originating connection
    Reply(String),
    /// Deliver `text` to `target`, then send `confirmation` to the sender
    Forward {
        target: ConnectionId,
        text: String,
        confirmation: String,
    },
    /// Reply to the sender, then close its connection
    ReplyAndClose(String),
    /// Sender is no longer in the directory
    NoAction,
}

/// Routing decisions for one server
#[derive(Debug, Clone)]
pub struct Router {
    max_message_length: usize,
}

impl Router {
    pub fn new(max_message_length: usize) -> Self {
        Self { max_message_length }
    }

    pub fn max_message_length(&self) -> usize {
        self.max_message_length
    }

    /// Decide the outbound action for `message` sent by `from`
    pub fn route(
        &self,
        directory: &mut UserDirectory,
        from: ConnectionId,
        message: &Message,
    ) -> OutboundAction {
        if !directory.contains(from) {
            return OutboundAction::NoAction;
        }

        if !message.valid {
            return OutboundAction::Reply(notices::INVALID_FORMAT.to_string());
        }

        if message.is_command {
            self.handle_command(directory, from, message)
        } else {
            self.handle_direct(directory, from, message)
        }
    }

    fn handle_command(
        &self,
        directory: &mut UserDirectory,
        from: ConnectionId,
        message: &Message,
    ) -> OutboundAction {
        match Command::from_name(message.target()) {
            Command::Init => OutboundAction::Reply(self.max_message_length.to_string()),
            Command::Rename => match directory.rename(from, &message.payload) {
                Ok(renamed) => {
                    let name = message.payload.trim();
                    if renamed.first_registration {
                        info!("Connection {} registered as '{}'", from, name);
                    } else {
                        info!("User '{}' renamed to '{}'", renamed.previous, name);
                    }
                    OutboundAction::Reply(notices::name_changed(name))
                }
                Err(DirectoryError::NameTaken(name)) => {
                    debug!("Connection {} asked for taken name '{}'", from, name);
                    OutboundAction::Reply(notices::NAME_TAKEN.to_string())
                }
                Err(DirectoryError::EmptyName) => {
                    OutboundAction::Reply(notices::EMPTY_NAME.to_string())
                }
                Err(DirectoryError::ReservedName(name)) => {
                    debug!("Connection {} asked for unreachable name '{}'", from, name);
                    OutboundAction::Reply(notices::RESERVED_NAME.to_string())
                }
                Err(e @ DirectoryError::UnknownConnection)
                | Err(e @ DirectoryError::CapacityExceeded(_)) => {
                    warn!("Rename for {} failed unexpectedly: {}", from, e);
                    OutboundAction::NoAction
                }
            },
            Command::Who => {
                let mut names = directory.names();
                names.sort();
                OutboundAction::Reply(notices::user_list(&names))
            }
            Command::Exit => OutboundAction::ReplyAndClose(notices::BYE.to_string()),
            Command::Unknown(name) => OutboundAction::Reply(notices::command_not_found(&name)),
        }
    }

    fn handle_direct(
        &self,
        directory: &UserDirectory,
        from: ConnectionId,
        message: &Message,
    ) -> OutboundAction {
        let target_name = message.target();

        if message.payload.chars().count() > self.max_message_length {
            return OutboundAction::Reply(notices::too_long(self.max_message_length));
        }

        let Some(sender) = directory.get(from) else {
            return OutboundAction::NoAction;
        };

        match directory.find_by_name(target_name) {
            Some(target) => OutboundAction::Forward {
                target,
                text: notices::message_from(sender.name(), &message.payload),
                confirmation: notices::message_sent(target_name),
            },
            None => {
                debug!("No user named '{}' for {}", target_name, from);
                OutboundAction::Reply(notices::send_failed(target_name))
            }
        }
    }
}
