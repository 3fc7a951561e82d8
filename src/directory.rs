//! Live directory of connected users
//!
//! Maps each connection to its [`User`] and enforces the two directory
//! rules: never more than `max_users` entries, and no two connected users
//! sharing a name at the moment a rename is accepted.

use std::collections::HashMap;

use crate::error::DirectoryError;
use crate::message::{COMMAND_PREFIX, SEPARATOR};
use crate::types::{ConnectionId, PlaceholderName};
use crate::user::{Renamed, User};

#[derive(Debug)]
pub struct UserDirectory {
    users: HashMap<ConnectionId, User>,
    max_users: usize,
}

impl UserDirectory {
    pub fn new(max_users: usize) -> Self {
        Self {
            users: HashMap::new(),
            max_users,
        }
    }

    /// Add a connection under a fresh placeholder name
    pub fn register(&mut self, id: ConnectionId) -> Result<&User, DirectoryError> {
        if self.is_full() {
            return Err(DirectoryError::CapacityExceeded(self.max_users));
        }

        // Generate a placeholder nobody is using
        let placeholder = loop {
            let name = PlaceholderName::generate();
            if self.find_by_name(&name.0).is_none() {
                break name;
            }
        };

        let user = self
            .users
            .entry(id)
            .or_insert_with(|| User::new(id, placeholder));
        Ok(&*user)
    }

    /// Change a user's name
    ///
    /// Fails with `NameTaken` if any other connected user currently holds
    /// `new_name`. Renaming to one's own current name succeeds. Names that
    /// a direct message could not address are rejected.
    pub fn rename(&mut self, id: ConnectionId, new_name: &str) -> Result<Renamed, DirectoryError> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(DirectoryError::EmptyName);
        }
        if new_name.contains(SEPARATOR) || new_name.starts_with(COMMAND_PREFIX) {
            return Err(DirectoryError::ReservedName(new_name.to_string()));
        }
        if self
            .users
            .values()
            .any(|user| user.id != id && user.name() == new_name)
        {
            return Err(DirectoryError::NameTaken(new_name.to_string()));
        }

        let user = self
            .users
            .get_mut(&id)
            .ok_or(DirectoryError::UnknownConnection)?;
        Ok(user.rename(new_name.to_string()))
    }

    /// Remove a connection. Removing an absent id is a no-op.
    pub fn remove(&mut self, id: ConnectionId) -> Option<User> {
        self.users.remove(&id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<ConnectionId> {
        self.users
            .values()
            .find(|user| user.name() == name)
            .map(|user| user.id)
    }

    /// Current display names in directory iteration order
    pub fn names(&self) -> Vec<String> {
        self.users.values().map(|user| user.name().to_string()).collect()
    }

    pub fn get(&self, id: ConnectionId) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.users.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.users.len() >= self.max_users
    }
}
