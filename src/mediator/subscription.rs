//! RAII subscription handles.
//!
//! A [`Subscription`] owns one registration: dropping it unregisters the
//! handler. It holds the mediator's table weakly, so an outstanding
//! subscription does not keep a dropped mediator alive.

use std::fmt;
use std::sync::Weak;

use super::registration::Shared;
use super::table::HandlerId;

/// Unregisters a handler when dropped.
pub struct Subscription {
    shared: Weak<Shared>,
    id: HandlerId,
    active: bool,
}

impl Subscription {
    pub(crate) fn new(shared: Weak<Shared>, id: HandlerId) -> Self {
        Self {
            shared,
            id,
            active: true,
        }
    }

    /// The guarded registration.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Whether the registration is still in the table.
    pub fn is_registered(&self) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let table = shared.table.lock();
        table.get(self.id).is_some()
    }

    /// Unregister now. Returns whether the handler was still registered.
    pub fn unsubscribe(mut self) -> bool {
        self.release()
    }

    /// Keep the registration alive past this guard and return its id.
    pub fn detach(mut self) -> HandlerId {
        self.active = false;
        self.id
    }

    fn release(&mut self) -> bool {
        if !std::mem::take(&mut self.active) {
            return false;
        }
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let removed = shared.table.lock().remove(self.id);
        removed.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
