//! ObservableMap: a keyed container that reports every mutation.
//!
//! Each mutating call raises exactly one [`MapChange`] after the mutation is
//! visible. Observers are captured before notification begins, so an
//! observer subscribed from inside a notification only sees later changes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};
use tracing::trace;

use super::storage::{MapBacking, MapStorage, Synchronized};
use crate::error::MapError;

new_key_type! {
    /// Handle returned by [`ObservableMap::subscribe`].
    pub struct ObserverId;
}

// ---------------------------------------------------------------------------
// MapChange
// ---------------------------------------------------------------------------

/// A single change to an [`ObservableMap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapChange<K, V> {
    Added { key: K, value: V },
    Replaced { key: K, old: V, new: V },
    Removed { key: K, value: V },
    /// The map was cleared.
    Reset,
}

impl<K, V> MapChange<K, V> {
    /// The affected key, or `None` for [`MapChange::Reset`].
    pub fn key(&self) -> Option<&K> {
        match self {
            MapChange::Added { key, .. }
            | MapChange::Replaced { key, .. }
            | MapChange::Removed { key, .. } => Some(key),
            MapChange::Reset => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MapChange::Added { .. } => "added",
            MapChange::Replaced { .. } => "replaced",
            MapChange::Removed { .. } => "removed",
            MapChange::Reset => "reset",
        }
    }
}

type Observer<K, V> = Arc<dyn Fn(&MapChange<K, V>) + Send + Sync>;

// ---------------------------------------------------------------------------
// ObservableMap
// ---------------------------------------------------------------------------

/// A map over storage strategy `S` that notifies observers of changes.
///
/// Keys and values are cloned into notifications.
pub struct ObservableMap<K, V, S = Synchronized<HashMap<K, V>>> {
    storage: S,
    observers: Mutex<SlotMap<ObserverId, Observer<K, V>>>,
}

impl<K, V, S> ObservableMap<K, V, S>
where
    S: MapStorage,
    S::Map: MapBacking<K, V>,
    K: Clone,
    V: Clone,
{
    /// Create an empty map.
    pub fn new() -> Self {
        Self::with_storage(S::default())
    }

    /// Wrap existing storage. Entries already present raise no notifications.
    pub fn with_storage(storage: S) -> Self {
        Self {
            storage,
            observers: Mutex::new(SlotMap::with_key()),
        }
    }

    /// Add a new entry. Fails if `key` is already present.
    pub fn add(&self, key: K, value: V) -> Result<(), MapError> {
        self.storage.write(|map| {
            if map.contains_key(&key) {
                return Err(MapError::DuplicateKey);
            }
            map.insert(key.clone(), value.clone());
            Ok(())
        })?;
        self.notify(MapChange::Added { key, value });
        Ok(())
    }

    /// Add or replace an entry, returning the previous value.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let previous = self
            .storage
            .write(|map| map.insert(key.clone(), value.clone()));
        let change = match &previous {
            Some(old) => MapChange::Replaced {
                key,
                old: old.clone(),
                new: value,
            },
            None => MapChange::Added { key, value },
        };
        self.notify(change);
        previous
    }

    /// Remove an entry. A missing key is not a change.
    pub fn remove(&self, key: &K) -> Option<V> {
        let removed = self.storage.write(|map| map.remove(key))?;
        self.notify(MapChange::Removed {
            key: key.clone(),
            value: removed.clone(),
        });
        Some(removed)
    }

    /// Remove every entry. Always raises [`MapChange::Reset`].
    pub fn clear(&self) {
        self.storage.write(|map| map.clear());
        self.notify(MapChange::Reset);
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.storage.read(|map| map.get(key).cloned())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.storage.read(|map| map.contains_key(key))
    }

    pub fn len(&self) -> usize {
        self.storage.read(|map| map.len())
    }

    pub fn is_empty(&self) -> bool {
        self.storage.read(|map| map.is_empty())
    }

    /// A copy of every entry, in the backing map's order.
    pub fn entries(&self) -> Vec<(K, V)> {
        self.storage.read(|map| {
            map.iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
    }

    pub fn keys(&self) -> Vec<K> {
        self.storage
            .read(|map| map.iter().map(|(key, _)| key.clone()).collect())
    }

    /// Register an observer for subsequent changes.
    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&MapChange<K, V>) + Send + Sync + 'static,
    {
        self.observers.lock().insert(Arc::new(observer))
    }

    /// Remove an observer. Returns `false` if it was already removed.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let removed = self.observers.lock().remove(id);
        removed.is_some()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    /// Consume the map, returning its storage.
    pub fn into_storage(self) -> S {
        self.storage
    }

    fn notify(&self, change: MapChange<K, V>) {
        let observers: Vec<Observer<K, V>> = self.observers.lock().values().cloned().collect();
        trace!(change = change.kind(), observers = observers.len(), "map changed");
        for observer in observers {
            observer(&change);
        }
    }
}

impl<K, V, S> Default for ObservableMap<K, V, S>
where
    S: MapStorage,
    S::Map: MapBacking<K, V>,
    K: Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> fmt::Debug for ObservableMap<K, V, S>
where
    S: MapStorage,
    S::Map: MapBacking<K, V>,
    K: Clone,
    V: Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableMap")
            .field("len", &self.len())
            .field("observers", &self.observer_count())
            .finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
