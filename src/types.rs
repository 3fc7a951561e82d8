//! Basic type definitions for the relay
//!
//! Provides newtype wrappers for type safety:
//! - `ConnectionId`: UUID-based handle for one accepted socket
//! - `PlaceholderName`: generated display name for unregistered users

use uuid::Uuid;

/// Prefix of every generated placeholder name
pub const PLACEHOLDER_PREFIX: &str = "guest-";

/// Opaque handle for one accepted connection (newtype pattern)
///
/// Wraps a UUID v4. Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display name handed out before a user picks their own
///
/// `guest-` followed by 6 lowercase alphanumeric characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaceholderName(pub String);

impl PlaceholderName {
    /// Generate a new random placeholder name
    pub fn generate() -> Self {
        use rand::Rng;
        let suffix: String = rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(6)
            .map(char::from)
            .collect::<String>()
            .to_lowercase();
        Self(format!("{}{}", PLACEHOLDER_PREFIX, suffix))
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for PlaceholderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
