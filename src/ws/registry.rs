//! UserId → live connection map, owned by the hub actor.

use crate::ws::connection::ConnectionRef;
use crate::ws::types::UserId;
use std::collections::HashMap;

/// Holds at most one connection per user.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<UserId, ConnectionRef>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `conn`, last writer wins.
    ///
    /// Returns the connection it displaced, which the caller must close. Registering
    /// the same connection twice displaces nothing.
    pub fn register(&mut self, conn: ConnectionRef) -> Option<ConnectionRef> {
        let previous = self.connections.insert(conn.user_id(), conn.clone())?;
        if previous.same_connection(&conn) {
            None
        } else {
            Some(previous)
        }
    }

    /// Removes the entry for `conn`'s user, but only if `conn` is the one registered.
    /// Returns whether anything was removed.
    pub fn unregister(&mut self, conn: &ConnectionRef) -> bool {
        match self.connections.get(&conn.user_id()) {
            Some(current) if current.same_connection(conn) => {
                self.connections.remove(&conn.user_id());
                true
            }
            _ => false,
        }
    }

    pub fn lookup(&self, user_id: UserId) -> Option<&ConnectionRef> {
        self.connections.get(&user_id)
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.connections.contains_key(&user_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConnectionRef> {
        self.connections.values()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::testing::recording_connection;
    use uuid::Uuid;

    #[test]
    fn second_registration_displaces_first() {
        let user = Uuid::new_v4();
        let (old, _old_rx) = recording_connection(user);
        let (new, _new_rx) = recording_connection(user);
        let mut registry = ConnectionRegistry::new();

        assert!(registry.register(old.downgrade()).is_none());
        let evicted = registry.register(new.downgrade()).expect("old connection evicted");

        assert_eq!(evicted.id(), old.id());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(user).map(|c| c.id()), Some(new.id()));
    }

    #[test]
    fn re_registering_same_connection_evicts_nothing() {
        let (conn, _rx) = recording_connection(Uuid::new_v4());
        let mut registry = ConnectionRegistry::new();

        registry.register(conn.downgrade());
        assert!(registry.register(conn.downgrade()).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn stale_unregister_keeps_newer_entry() {
        let user = Uuid::new_v4();
        let (old, _old_rx) = recording_connection(user);
        let (new, _new_rx) = recording_connection(user);
        let mut registry = ConnectionRegistry::new();
        registry.register(old.downgrade());
        registry.register(new.downgrade());

        assert!(!registry.unregister(&old.downgrade()));
        assert_eq!(registry.lookup(user).map(|c| c.id()), Some(new.id()));

        assert!(registry.unregister(&new.downgrade()));
        assert!(registry.lookup(user).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn unregister_of_unknown_user_is_noop() {
        let (conn, _rx) = recording_connection(Uuid::new_v4());
        let mut registry = ConnectionRegistry::new();
        assert!(!registry.unregister(&conn.downgrade()));
        assert!(!registry.contains(conn.user_id()));
    }
}
