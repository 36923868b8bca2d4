//! Client registry
//!
//! The single source of truth for "which connection currently represents
//! identity X". Maintains the forward map (identity -> connection), the
//! reverse map (connection -> identity) and the per-user device index, all
//! updated under one mutual-exclusion scope so partial application is never
//! observable from another thread.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tracing::debug;

use crate::types::{ClientIdentity, ConnectionHandle, ConnectionId};

// ----------------------------------------------------------------------------
// Registry State
// ----------------------------------------------------------------------------

#[derive(Default)]
struct RegistryInner {
    /// identity -> live connection
    forward: HashMap<ClientIdentity, ConnectionHandle>,
    /// connection id -> identity
    reverse: HashMap<ConnectionId, ClientIdentity>,
    /// userId -> deviceIds currently bound for that user
    devices_by_user: HashMap<String, HashSet<String>>,
}

impl RegistryInner {
    /// Drop a device from the per-user index, pruning the user entry once
    /// its device set becomes empty.
    fn remove_device(&mut self, user_id: &str, device_id: &str) {
        if let Some(devices) = self.devices_by_user.get_mut(user_id) {
            devices.remove(device_id);
            if devices.is_empty() {
                self.devices_by_user.remove(user_id);
            }
        }
    }

    fn remove_identity(&mut self, identity: &ClientIdentity) {
        self.forward.remove(identity);
        self.remove_device(identity.user_id(), identity.device_id());
    }
}

// ----------------------------------------------------------------------------
// Client Registry
// ----------------------------------------------------------------------------

/// Bidirectional identity <-> connection registry with a per-user device index
#[derive(Default)]
pub struct ClientRegistry {
    inner: Mutex<RegistryInner>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an identity to a connection.
    ///
    /// Last-writer-wins: if the connection was bound to another identity,
    /// that binding is severed first; if the identity was bound to another
    /// connection, that connection's binding is severed. Both maps and the
    /// device index are updated under one lock.
    pub fn bind(&self, identity: ClientIdentity, connection: ConnectionHandle) {
        let mut inner = self.inner.lock().expect("registry poisoned");

        if let Some(old_identity) = inner.reverse.get(&connection.id()).cloned() {
            if old_identity != identity {
                debug!(connection = %connection.id(), old = %old_identity,
                       "Connection rebinding to a new identity");
                inner.remove_identity(&old_identity);
            }
        }

        if let Some(old_connection) = inner.forward.get(&identity).cloned() {
            if old_connection.id() != connection.id() {
                debug!(identity = %identity, old = %old_connection.id(),
                       "Identity claimed by a new connection, severing old binding");
                inner.reverse.remove(&old_connection.id());
            }
        }

        inner
            .devices_by_user
            .entry(identity.user_id().to_string())
            .or_default()
            .insert(identity.device_id().to_string());
        inner.reverse.insert(connection.id(), identity.clone());
        inner.forward.insert(identity, connection);
    }

    /// Remove whatever binding this connection holds; no-op if it has none.
    pub fn unbind(&self, connection: &ConnectionHandle) {
        let mut inner = self.inner.lock().expect("registry poisoned");

        let Some(identity) = inner.reverse.remove(&connection.id()) else {
            return;
        };

        // Only remove the forward entry if it still points at this
        // connection; a newer binding may have superseded it already.
        if inner
            .forward
            .get(&identity)
            .is_some_and(|bound| bound.id() == connection.id())
        {
            inner.remove_identity(&identity);
        }
    }

    /// The connection currently bound to this identity, if any
    pub fn lookup(&self, identity: &ClientIdentity) -> Option<ConnectionHandle> {
        self.inner
            .lock()
            .expect("registry poisoned")
            .forward
            .get(identity)
            .cloned()
    }

    /// The identity currently bound to this connection, if any
    pub fn identity_of(&self, connection: &ConnectionHandle) -> Option<ClientIdentity> {
        self.inner
            .lock()
            .expect("registry poisoned")
            .reverse
            .get(&connection.id())
            .cloned()
    }

    /// Read-only snapshot of the devices currently bound for a user
    pub fn devices_of(&self, user_id: &str) -> HashSet<String> {
        self.inner
            .lock()
            .expect("registry poisoned")
            .devices_by_user
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of all live identity -> connection bindings
    pub fn snapshot(&self) -> HashMap<ClientIdentity, ConnectionHandle> {
        self.inner.lock().expect("registry poisoned").forward.clone()
    }

    /// Union of live bindings and residual device-index entries.
    ///
    /// Used by diagnostics; never mutates registry state.
    pub fn all_known_identities(&self) -> HashSet<ClientIdentity> {
        let inner = self.inner.lock().expect("registry poisoned");
        let mut ids: HashSet<ClientIdentity> = inner.forward.keys().cloned().collect();
        for (user, devices) in &inner.devices_by_user {
            for device in devices {
                if let Ok(identity) = ClientIdentity::new(user.clone(), device.clone()) {
                    ids.insert(identity);
                }
            }
        }
        ids
    }

    /// Number of live bindings
    pub fn len(&self) -> usize {
        self.inner.lock().expect("registry poisoned").forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn identity(user: &str, device: &str) -> ClientIdentity {
        ClientIdentity::new(user, device).unwrap()
    }

    fn connection() -> ConnectionHandle {
        let (tx, _rx) = mpsc::unbounded_channel();
        std::mem::forget(_rx);
        ConnectionHandle::new("test", tx)
    }

    #[test]
    fn bind_and_lookup() {
        let registry = ClientRegistry::new();
        let id = identity("alice", "phone");
        let conn = connection();

        registry.bind(id.clone(), conn.clone());

        assert_eq!(registry.lookup(&id), Some(conn.clone()));
        assert_eq!(registry.identity_of(&conn), Some(id));
        assert_eq!(
            registry.devices_of("alice"),
            HashSet::from(["phone".to_string()])
        );
    }

    #[test]
    fn unbind_removes_all_three_indices() {
        let registry = ClientRegistry::new();
        let id = identity("alice", "phone");
        let conn = connection();

        registry.bind(id.clone(), conn.clone());
        registry.unbind(&conn);

        assert_eq!(registry.lookup(&id), None);
        assert_eq!(registry.identity_of(&conn), None);
        assert!(registry.devices_of("alice").is_empty());
        assert!(registry.all_known_identities().is_empty());
    }

    #[test]
    fn unbind_unknown_connection_is_a_no_op() {
        let registry = ClientRegistry::new();
        registry.unbind(&connection());
        assert!(registry.is_empty());
    }

    #[test]
    fn identity_takeover_severs_the_old_connection() {
        let registry = ClientRegistry::new();
        let id = identity("alice", "phone");
        let old = connection();
        let new = connection();

        registry.bind(id.clone(), old.clone());
        registry.bind(id.clone(), new.clone());

        assert_eq!(registry.lookup(&id), Some(new.clone()));
        assert_eq!(registry.identity_of(&old), None);
        assert_eq!(registry.identity_of(&new), Some(id));
        // Device index still holds exactly the one device.
        assert_eq!(
            registry.devices_of("alice"),
            HashSet::from(["phone".to_string()])
        );
    }

    #[test]
    fn connection_rebinding_removes_its_old_identity() {
        let registry = ClientRegistry::new();
        let id_a = identity("alice", "phone");
        let id_b = identity("bob", "laptop");
        let conn = connection();

        registry.bind(id_a.clone(), conn.clone());
        registry.bind(id_b.clone(), conn.clone());

        assert_eq!(registry.lookup(&id_a), None);
        assert_eq!(registry.lookup(&id_b), Some(conn.clone()));
        assert!(registry.devices_of("alice").is_empty());
        assert_eq!(
            registry.devices_of("bob"),
            HashSet::from(["laptop".to_string()])
        );
    }

    #[test]
    fn multiple_devices_per_user_tracked_and_pruned() {
        let registry = ClientRegistry::new();
        let phone = identity("alice", "phone");
        let laptop = identity("alice", "laptop");
        let conn_phone = connection();
        let conn_laptop = connection();

        registry.bind(phone.clone(), conn_phone.clone());
        registry.bind(laptop.clone(), conn_laptop.clone());

        assert_eq!(
            registry.devices_of("alice"),
            HashSet::from(["phone".to_string(), "laptop".to_string()])
        );

        registry.unbind(&conn_phone);
        assert_eq!(
            registry.devices_of("alice"),
            HashSet::from(["laptop".to_string()])
        );

        registry.unbind(&conn_laptop);
        assert!(registry.devices_of("alice").is_empty());
    }

    #[test]
    fn stale_unbind_does_not_clobber_a_newer_binding() {
        let registry = ClientRegistry::new();
        let id = identity("alice", "phone");
        let old = connection();
        let new = connection();

        registry.bind(id.clone(), old.clone());
        registry.bind(id.clone(), new.clone());

        // The old connection closes after being superseded.
        registry.unbind(&old);

        assert_eq!(registry.lookup(&id), Some(new));
        assert_eq!(
            registry.devices_of("alice"),
            HashSet::from(["phone".to_string()])
        );
    }

    #[test]
    fn device_index_always_matches_bound_identities() {
        let registry = ClientRegistry::new();
        let ids = [
            identity("u1", "d1"),
            identity("u1", "d2"),
            identity("u2", "d1"),
        ];
        let conns: Vec<_> = (0..3).map(|_| connection()).collect();

        for (id, conn) in ids.iter().zip(&conns) {
            registry.bind(id.clone(), conn.clone());
        }

        for id in &ids {
            assert!(registry.devices_of(id.user_id()).contains(id.device_id()));
        }

        registry.unbind(&conns[0]);
        assert_eq!(registry.devices_of("u1"), HashSet::from(["d2".to_string()]));
        assert_eq!(registry.all_known_identities().len(), 2);
    }
}
