//! Server-side connection registry.
//!
//! A bijection between opaque connection identifiers and transport keys,
//! each entry also holding the handle used to reach the connection. Every
//! operation takes the lock once; there is no read-modify-write across
//! calls.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use crate::error::Result;

/// Opaque connection identifier: 16 random bytes, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Draw a fresh identifier from the operating system's CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns `Error::Random` if the random source is unavailable.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; 16];
        getrandom::getrandom(&mut bytes)?;
        Ok(Self(hex::encode(bytes)))
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Identity of an accepted transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportKey(pub u64);

#[derive(Debug)]
struct Maps<H> {
    by_id: HashMap<ConnectionId, (TransportKey, H)>,
    by_key: HashMap<TransportKey, ConnectionId>,
}

/// Concurrent id <-> transport map.
#[derive(Debug)]
pub struct Registry<H> {
    inner: Mutex<Maps<H>>,
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Maps {
                by_id: HashMap::new(),
                by_key: HashMap::new(),
            }),
        }
    }
}

impl<H> Registry<H> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Maps<H>> {
        // No mutation below can unwind halfway, so a poisoned guard still
        // holds consistent maps.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Insert if neither the id nor the transport is present.
    ///
    /// Returns `false` and leaves the registry unchanged otherwise.
    pub fn insert(&self, id: ConnectionId, key: TransportKey, handle: H) -> bool {
        let mut maps = self.lock();
        if maps.by_id.contains_key(&id) || maps.by_key.contains_key(&key) {
            return false;
        }
        maps.by_key.insert(key, id.clone());
        maps.by_id.insert(id, (key, handle));
        true
    }

    /// Remove by identifier. Absent ids yield `None`.
    pub fn remove(&self, id: &ConnectionId) -> Option<(TransportKey, H)> {
        let mut maps = self.lock();
        let (key, handle) = maps.by_id.remove(id)?;
        maps.by_key.remove(&key);
        Some((key, handle))
    }

    /// Remove by transport. Absent keys yield `None`.
    pub fn remove_by_key(&self, key: TransportKey) -> Option<(ConnectionId, H)> {
        let mut maps = self.lock();
        let id = maps.by_key.remove(&key)?;
        let (_, handle) = maps.by_id.remove(&id)?;
        Some((id, handle))
    }

    /// Whether a transport is registered.
    #[must_use]
    pub fn contains_key(&self, key: TransportKey) -> bool {
        self.lock().by_key.contains_key(&key)
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().by_id.len()
    }

    /// Whether no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all identifiers.
    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.lock().by_id.keys().cloned().collect()
    }
}

impl<H: Clone> Registry<H> {
    /// Handle registered for an identifier.
    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<H> {
        self.lock().by_id.get(id).map(|(_, handle)| handle.clone())
    }

    /// Snapshot of every `(id, handle)` pair, for broadcast.
    #[must_use]
    pub fn entries(&self) -> Vec<(ConnectionId, H)> {
        self.lock()
            .by_id
            .iter()
            .map(|(id, (_, handle))| (id.clone(), handle.clone()))
            .collect()
    }
}
