//! Wire protocol parsing
//!
//! Each read from a client is one message, in one of two forms:
//! - direct message: `<target>:<payload>`
//! - command: `*/<command>` or `*/<command>:<parameter>`
//!
//! Parsing is pure and never fails loudly: anything unusable comes back
//! as an invalid [`Message`].

/// Two-character marker that routes a message to the command dispatcher
pub const COMMAND_PREFIX: &str = "*/";

/// Separator between target and payload
pub const SEPARATOR: char = ':';

/// Shortest accepted message is one character longer than this
const MIN_LENGTH: usize = 3;

/// A parsed client message
///
/// For commands `target` holds the command name and `payload` its
/// parameter. Invalid messages have no target and an empty payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub valid: bool,
    pub is_command: bool,
    pub target: Option<String>,
    pub payload: String,
}

impl Message {
    /// Parse one received read
    pub fn parse(raw: &[u8]) -> Self {
        let Ok(text) = std::str::from_utf8(raw) else {
            return Self::invalid();
        };
        let data = text.trim();

        let is_command = data.starts_with(COMMAND_PREFIX);
        if data.chars().count() <= MIN_LENGTH || !(is_command || data.contains(SEPARATOR)) {
            return Self::invalid();
        }

        let body = if is_command {
            &data[COMMAND_PREFIX.len()..]
        } else {
            data
        };

        let (target, payload) = match body.split_once(SEPARATOR) {
            Some((target, payload)) => (target.trim(), payload.trim()),
            None => (body.trim(), ""),
        };

        Self {
            valid: true,
            is_command,
            target: Some(target.to_string()),
            payload: payload.to_string(),
        }
    }

    pub fn invalid() -> Self {
        Self {
            valid: false,
            is_command: false,
            target: None,
            payload: String::new(),
        }
    }

    /// Target name, or "" when there is none
    pub fn target(&self) -> &str {
        self.target.as_deref().unwrap_or("")
    }
}

/// Commands understood by the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Query the maximum message length
    Init,
    /// Set or change the display name (`registration` / `change_name`)
    Rename,
    /// List connected users
    Who,
    /// Say goodbye and disconnect
    Exit,
    Unknown(String),
}

impl Command {
    pub fn from_name(name: &str) -> Self {
        match name {
            "init" => Command::Init,
            "registration" | "change_name" => Command::Rename,
            "who" => Command::Who,
            "exit" => Command::Exit,
            other => Command::Unknown(other.to_string()),
        }
    }
}
