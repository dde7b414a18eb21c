//! The registration table: slotmap-backed handler records and per-key routes.
//!
//! Records live in a [`SlotMap`] keyed by [`HandlerId`]; each [`MessageKey`]
//! maps to a route holding the key's signature and the ids registered under
//! it. A route with no ids is removed.

use std::collections::HashMap;
use std::sync::Arc;

use slotmap::{new_key_type, SlotMap};

use crate::error::MediatorError;
use crate::handler::record::{ErasedHandler, HandlerRecord, Signature};
use crate::message::key::MessageKey;

new_key_type! {
    /// Generational id of one handler registration.
    pub struct HandlerId;
}

/// Handlers registered under one key, captured for dispatch.
pub(crate) struct Snapshot {
    pub signature: Signature,
    pub handlers: Vec<(HandlerId, Arc<dyn ErasedHandler>)>,
}

struct Route {
    signature: Signature,
    handlers: Vec<HandlerId>,
}

// ---------------------------------------------------------------------------
// RegistrationTable
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct RegistrationTable {
    records: SlotMap<HandlerId, HandlerRecord>,
    routes: HashMap<MessageKey, Route>,
}

impl RegistrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that a handler with `signature` may join `key`.
    pub fn check(&self, key: &MessageKey, signature: Signature) -> Result<(), MediatorError> {
        match self.routes.get(key) {
            Some(route) if route.signature != signature => Err(MediatorError::SignatureMismatch {
                key: key.clone(),
                expected: route.signature.to_string(),
                found: signature.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Sweep reclaimed records under `key` when its signature differs from
    /// `signature`. A route left empty is dropped, so the key is free again.
    ///
    /// Removed records are returned to be dropped outside the table lock.
    pub fn reclaim_conflicting(
        &mut self,
        key: &MessageKey,
        signature: Signature,
    ) -> Vec<HandlerRecord> {
        let dead: Vec<HandlerId> = match self.routes.get(key) {
            Some(route) if route.signature != signature => route
                .handlers
                .iter()
                .copied()
                .filter(|id| self.records.get(*id).is_some_and(|record| !record.is_alive()))
                .collect(),
            _ => return Vec::new(),
        };
        dead.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Insert a record, or return the id of an identical existing one.
    ///
    /// Returns `(id, inserted)`.
    pub fn insert(&mut self, record: HandlerRecord) -> Result<(HandlerId, bool), MediatorError> {
        self.check(&record.key, record.signature)?;
        if let Some(existing) = self.find_identical(&record) {
            return Ok((existing, false));
        }
        let key = record.key.clone();
        let signature = record.signature;
        let id = self.records.insert(record);
        self.routes
            .entry(key)
            .or_insert_with(|| Route {
                signature,
                handlers: Vec::new(),
            })
            .handlers
            .push(id);
        Ok((id, true))
    }

    fn find_identical(&self, record: &HandlerRecord) -> Option<HandlerId> {
        let route = self.routes.get(&record.key)?;
        route.handlers.iter().copied().find(|id| {
            self.records
                .get(*id)
                .is_some_and(|existing| existing.same_identity(record) && existing.is_alive())
        })
    }

    /// Remove one record. Empty routes are dropped.
    pub fn remove(&mut self, id: HandlerId) -> Option<HandlerRecord> {
        let record = self.records.remove(id)?;
        if let Some(route) = self.routes.get_mut(&record.key) {
            route.handlers.retain(|h| *h != id);
            if route.handlers.is_empty() {
                self.routes.remove(&record.key);
            }
        }
        Some(record)
    }

    /// Ids of records matching `pred`.
    pub fn find(&self, mut pred: impl FnMut(&HandlerRecord) -> bool) -> Vec<HandlerId> {
        self.records
            .iter()
            .filter(|(_, record)| pred(record))
            .map(|(id, _)| id)
            .collect()
    }

    /// Capture the handlers registered under `key`.
    pub fn snapshot(&self, key: &MessageKey) -> Option<Snapshot> {
        let route = self.routes.get(key)?;
        let handlers = route
            .handlers
            .iter()
            .filter_map(|id| {
                self.records
                    .get(*id)
                    .map(|record| (*id, Arc::clone(&record.handler)))
            })
            .collect();
        Some(Snapshot {
            signature: route.signature,
            handlers,
        })
    }

    /// Signature of `key`, if anything is registered under it.
    pub fn signature(&self, key: &MessageKey) -> Option<Signature> {
        self.routes.get(key).map(|route| route.signature)
    }

    /// Remove every record whose owner has been dropped.
    ///
    /// Removed records are returned so callers can drop them after
    /// releasing the table lock.
    pub fn prune(&mut self) -> Vec<HandlerRecord> {
        let dead = self.find(|record| !record.is_alive());
        dead.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    pub fn get(&self, id: HandlerId) -> Option<&HandlerRecord> {
        self.records.get(id)
    }

    pub fn handler_count(&self, key: &MessageKey) -> usize {
        self.routes.get(key).map_or(0, |route| route.handlers.len())
    }

    pub fn keys(&self) -> Vec<MessageKey> {
        self.routes.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
