//! Storage strategies for [`ObservableMap`](super::ObservableMap).
//!
//! A strategy pairs a backing map ([`MapBacking`]) with an interior
//! mutability scheme ([`MapStorage`]): [`Unsynchronized`] for single-thread
//! use, [`Synchronized`] for maps shared across threads.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;

use indexmap::IndexMap;
use parking_lot::RwLock;

// ---------------------------------------------------------------------------
// MapBacking
// ---------------------------------------------------------------------------

/// A plain associative container.
pub trait MapBacking<K, V>: Default {
    fn get(&self, key: &K) -> Option<&V>;
    fn contains_key(&self, key: &K) -> bool;
    fn insert(&mut self, key: K, value: V) -> Option<V>;
    fn remove(&mut self, key: &K) -> Option<V>;
    fn clear(&mut self);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in the backing map's iteration order.
    fn iter(&self) -> Box<dyn Iterator<Item = (&K, &V)> + '_>;
}

impl<K: Eq + Hash, V> MapBacking<K, V> for HashMap<K, V> {
    fn get(&self, key: &K) -> Option<&V> {
        HashMap::get(self, key)
    }

    fn contains_key(&self, key: &K) -> bool {
        HashMap::contains_key(self, key)
    }

    fn insert(&mut self, key: K, value: V) -> Option<V> {
        HashMap::insert(self, key, value)
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        HashMap::remove(self, key)
    }

    fn clear(&mut self) {
        HashMap::clear(self)
    }

    fn len(&self) -> usize {
        HashMap::len(self)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (&K, &V)> + '_> {
        Box::new(HashMap::iter(self))
    }
}

impl<K: Ord, V> MapBacking<K, V> for BTreeMap<K, V> {
    fn get(&self, key: &K) -> Option<&V> {
        BTreeMap::get(self, key)
    }

    fn contains_key(&self, key: &K) -> bool {
        BTreeMap::contains_key(self, key)
    }

    fn insert(&mut self, key: K, value: V) -> Option<V> {
        BTreeMap::insert(self, key, value)
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        BTreeMap::remove(self, key)
    }

    fn clear(&mut self) {
        BTreeMap::clear(self)
    }

    fn len(&self) -> usize {
        BTreeMap::len(self)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (&K, &V)> + '_> {
        Box::new(BTreeMap::iter(self))
    }
}

/// Insertion-ordered. Removal shifts later entries to keep the order.
impl<K: Eq + Hash, V> MapBacking<K, V> for IndexMap<K, V> {
    fn get(&self, key: &K) -> Option<&V> {
        IndexMap::get(self, key)
    }

    fn contains_key(&self, key: &K) -> bool {
        IndexMap::contains_key(self, key)
    }

    fn insert(&mut self, key: K, value: V) -> Option<V> {
        IndexMap::insert(self, key, value)
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        IndexMap::shift_remove(self, key)
    }

    fn clear(&mut self) {
        IndexMap::clear(self)
    }

    fn len(&self) -> usize {
        IndexMap::len(self)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (&K, &V)> + '_> {
        Box::new(IndexMap::iter(self))
    }
}

// ---------------------------------------------------------------------------
// MapStorage
// ---------------------------------------------------------------------------

/// Shared-reference access to a backing map.
///
/// Closures passed to `read` and `write` must not re-enter the same storage.
pub trait MapStorage: Default {
    type Map;

    fn read<T>(&self, f: impl FnOnce(&Self::Map) -> T) -> T;
    fn write<T>(&self, f: impl FnOnce(&mut Self::Map) -> T) -> T;
}

/// Single-thread storage over a `RefCell`.
pub struct Unsynchronized<M>(RefCell<M>);

impl<M: Default> Default for Unsynchronized<M> {
    fn default() -> Self {
        Self(RefCell::new(M::default()))
    }
}

impl<M> Unsynchronized<M> {
    pub fn new(map: M) -> Self {
        Self(RefCell::new(map))
    }

    pub fn into_inner(self) -> M {
        self.0.into_inner()
    }
}

impl<M: Default> MapStorage for Unsynchronized<M> {
    type Map = M;

    fn read<T>(&self, f: impl FnOnce(&M) -> T) -> T {
        f(&self.0.borrow())
    }

    fn write<T>(&self, f: impl FnOnce(&mut M) -> T) -> T {
        f(&mut self.0.borrow_mut())
    }
}

impl<M: fmt::Debug> fmt::Debug for Unsynchronized<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Unsynchronized").field(&self.0).finish()
    }
}

/// Thread-safe storage over a `parking_lot::RwLock`.
pub struct Synchronized<M>(RwLock<M>);

impl<M: Default> Default for Synchronized<M> {
    fn default() -> Self {
        Self(RwLock::new(M::default()))
    }
}

impl<M> Synchronized<M> {
    pub fn new(map: M) -> Self {
        Self(RwLock::new(map))
    }

    pub fn into_inner(self) -> M {
        self.0.into_inner()
    }
}

impl<M: Default> MapStorage for Synchronized<M> {
    type Map = M;

    fn read<T>(&self, f: impl FnOnce(&M) -> T) -> T {
        f(&self.0.read())
    }

    fn write<T>(&self, f: impl FnOnce(&mut M) -> T) -> T {
        f(&mut self.0.write())
    }
}

impl<M: fmt::Debug> fmt::Debug for Synchronized<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Synchronized").field(&*self.0.read()).finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
