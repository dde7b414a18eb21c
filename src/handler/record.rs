//! Weak handler records: erased, invocable handler registrations.
//!
//! A [`HandlerRecord`] is what the registration table stores. Owner-bound
//! records hold only a [`Weak`] to their owner and upgrade it per call; once
//! the owner is dropped the record reports [`Invocation::Reclaimed`] and is
//! swept by the mediator. Free records (closures, associated functions) have
//! no owner and stay alive until removed.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use super::descriptor::{payload_type_error, HandlerOutcome};
use crate::error::HandlerResult;
use crate::message::key::{MessageKey, TypeKey};

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// Signature category of a handler: no payload, or one payload of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signature {
    Unit,
    Payload(TypeKey),
}

impl Signature {
    /// The payload type, if any.
    pub fn payload(&self) -> Option<TypeKey> {
        match self {
            Signature::Unit => None,
            Signature::Payload(ty) => Some(*ty),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signature::Unit => f.write_str("()"),
            Signature::Payload(ty) => write!(f, "{}", ty),
        }
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Identity of an owner allocation.
///
/// Records hold a `Weak` to the owner, which keeps the allocation (not the
/// value) alive, so the address cannot be reused while the record exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct OwnerId(usize);

impl OwnerId {
    pub(crate) fn of<R>(owner: &Arc<R>) -> Self {
        OwnerId(Arc::as_ptr(owner) as *const () as usize)
    }
}

// ---------------------------------------------------------------------------
// Erased invocation
// ---------------------------------------------------------------------------

/// Result of invoking a record.
pub(crate) enum Invocation {
    Delivered(HandlerResult),
    Reclaimed,
}

pub(crate) trait ErasedHandler: Send + Sync {
    /// Call the handler. `payload` is ignored by unit handlers.
    fn invoke(&self, payload: &dyn Any) -> Invocation;

    /// Whether the owner (if any) is still reachable.
    fn is_alive(&self) -> bool;
}

struct BoundHandler<R, F> {
    owner: Weak<R>,
    call: F,
}

impl<R, F> ErasedHandler for BoundHandler<R, F>
where
    R: Send + Sync + 'static,
    F: Fn(&R, &dyn Any) -> HandlerResult + Send + Sync,
{
    fn invoke(&self, payload: &dyn Any) -> Invocation {
        match self.owner.upgrade() {
            Some(owner) => Invocation::Delivered((self.call)(&owner, payload)),
            None => Invocation::Reclaimed,
        }
    }

    fn is_alive(&self) -> bool {
        self.owner.strong_count() > 0
    }
}

type FreeUnitFn = Arc<dyn Fn() -> HandlerResult + Send + Sync>;
type FreePayloadFn = Arc<dyn Fn(&dyn Any) -> HandlerResult + Send + Sync>;

/// A handler with no owner.
#[derive(Clone)]
pub(crate) enum FreeCall {
    Unit(FreeUnitFn),
    Payload(TypeKey, FreePayloadFn),
}

impl FreeCall {
    pub(crate) fn unit<F, O>(f: F) -> Self
    where
        F: Fn() -> O + Send + Sync + 'static,
        O: HandlerOutcome,
    {
        FreeCall::Unit(Arc::new(move || f().into_result()))
    }

    pub(crate) fn payload<P, F, O>(f: F) -> Self
    where
        P: Any + Send + Sync,
        F: Fn(&P) -> O + Send + Sync + 'static,
        O: HandlerOutcome,
    {
        FreeCall::Payload(
            TypeKey::of::<P>(),
            Arc::new(move |payload: &dyn Any| match payload.downcast_ref::<P>() {
                Some(payload) => f(payload).into_result(),
                None => Err(payload_type_error::<P>()),
            }),
        )
    }

    pub(crate) fn params(&self) -> usize {
        match self {
            FreeCall::Unit(_) => 0,
            FreeCall::Payload(..) => 1,
        }
    }

    pub(crate) fn signature(&self) -> Signature {
        match self {
            FreeCall::Unit(_) => Signature::Unit,
            FreeCall::Payload(ty, _) => Signature::Payload(*ty),
        }
    }
}

impl ErasedHandler for FreeCall {
    fn invoke(&self, payload: &dyn Any) -> Invocation {
        let result = match self {
            FreeCall::Unit(call) => call(),
            FreeCall::Payload(_, call) => call(payload),
        };
        Invocation::Delivered(result)
    }

    fn is_alive(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// HandlerRecord
// ---------------------------------------------------------------------------

/// A handler registration: key, signature, identity, and erased invoker.
pub struct HandlerRecord {
    pub(crate) key: MessageKey,
    pub(crate) signature: Signature,
    pub(crate) method: &'static str,
    /// Recipient type that declared the handler; `None` for explicit registrations.
    pub(crate) origin: Option<TypeKey>,
    pub(crate) owner: Option<OwnerId>,
    pub(crate) handler: Arc<dyn ErasedHandler>,
}

impl HandlerRecord {
    pub(crate) fn bound<R, F>(
        key: MessageKey,
        signature: Signature,
        method: &'static str,
        origin: Option<TypeKey>,
        owner: &Arc<R>,
        call: F,
    ) -> Self
    where
        R: Send + Sync + 'static,
        F: Fn(&R, &dyn Any) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            key,
            signature,
            method,
            origin,
            owner: Some(OwnerId::of(owner)),
            handler: Arc::new(BoundHandler {
                owner: Arc::downgrade(owner),
                call,
            }),
        }
    }

    pub(crate) fn free(
        key: MessageKey,
        signature: Signature,
        method: &'static str,
        origin: Option<TypeKey>,
        call: FreeCall,
    ) -> Self {
        Self {
            key,
            signature,
            method,
            origin,
            owner: None,
            handler: Arc::new(call),
        }
    }

    /// The dispatch key.
    pub fn key(&self) -> &MessageKey {
        &self.key
    }

    /// The signature category.
    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// The handler's method (or closure type) name.
    pub fn method(&self) -> &'static str {
        self.method
    }

    /// Whether the record has an owner.
    pub fn is_bound(&self) -> bool {
        self.owner.is_some()
    }

    /// Whether the owner (if any) is still reachable.
    pub fn is_alive(&self) -> bool {
        self.handler.is_alive()
    }

    /// Detach from the declaring recipient type, so the record is only
    /// removable by id.
    pub(crate) fn explicit(mut self) -> Self {
        self.origin = None;
        self
    }

    /// Same declaring type, owner, method, and route. Explicit registrations
    /// are never identical to anything.
    pub(crate) fn same_identity(&self, other: &HandlerRecord) -> bool {
        self.origin.is_some()
            && self.origin == other.origin
            && self.owner == other.owner
            && self.method == other.method
            && self.key == other.key
            && self.signature == other.signature
    }
}

impl fmt::Debug for HandlerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRecord")
            .field("key", &self.key)
            .field("signature", &self.signature)
            .field("method", &self.method)
            .field("origin", &self.origin)
            .field("bound", &self.owner.is_some())
            .field("alive", &self.is_alive())
            .finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
