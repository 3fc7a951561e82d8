//! User record
//!
//! Represents a connected user: their connection handle, display name,
//! and whether they have picked a name yet.

use crate::types::{ConnectionId, PlaceholderName};

/// Directory entry for one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Connection this user is bound to
    pub id: ConnectionId,
    /// Current display name (placeholder until the first rename)
    name: String,
    /// Set once the user has chosen a name
    registered: bool,
}

/// Outcome of a successful rename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renamed {
    /// Name before the rename
    pub previous: String,
    /// True when this rename moved the user out of the placeholder state
    pub first_registration: bool,
}

impl User {
    /// Create an unregistered user with the given placeholder name
    pub fn new(id: ConnectionId, placeholder: PlaceholderName) -> Self {
        Self {
            id,
            name: placeholder.into_inner(),
            registered: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Replace the display name and mark the user registered
    ///
    /// Uniqueness is the directory's job, not the user's.
    pub(crate) fn rename(&mut self, name: String) -> Renamed {
        let previous = std::mem::replace(&mut self.name, name);
        let first_registration = !self.registered;
        self.registered = true;
        Renamed {
            previous,
            first_registration,
        }
    }
}
