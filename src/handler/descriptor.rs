//! Handler descriptors and the [`Recipient`] trait.
//!
//! A [`HandlerDescriptor<R>`] describes one handler method of a recipient type
//! `R`: its name, optional explicit key, and how to call it given an `&R` and a
//! payload. [`Recipient::handlers`] lists the descriptors for a type; the
//! `#[message_handlers]` macro generates it from `#[handles]` methods.
//!
//! Descriptors are inert until the mediator binds them to an owner, producing
//! a [`HandlerRecord`] that holds the owner weakly.
//!
//! Type-keyed constructors require `P: Message`, since only [`Message`]
//! payloads can be sent by type. Any other payload type needs a string key
//! (the `_named` constructors).

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use super::record::{FreeCall, HandlerRecord, OwnerId, Signature};
use crate::error::{HandlerError, HandlerResult, MediatorError};
use crate::message::key::{MessageKey, TypeKey};
use crate::message::payload::Message;

// ---------------------------------------------------------------------------
// HandlerOutcome
// ---------------------------------------------------------------------------

/// Return types accepted from handler functions.
pub trait HandlerOutcome {
    fn into_result(self) -> HandlerResult;
}

impl HandlerOutcome for () {
    fn into_result(self) -> HandlerResult {
        Ok(())
    }
}

impl<E: Into<HandlerError>> HandlerOutcome for Result<(), E> {
    fn into_result(self) -> HandlerResult {
        self.map_err(Into::into)
    }
}

// ---------------------------------------------------------------------------
// Recipient
// ---------------------------------------------------------------------------

/// A type whose instances can be registered with a
/// [`Mediator`](crate::mediator::Mediator).
///
/// Usually implemented with `#[message_handlers]` (feature `macros`):
///
/// ```ignore
/// struct ShellViewModel { /* ... */ }
///
/// #[message_handlers]
/// impl ShellViewModel {
///     #[handles("Ping")]
///     fn on_ping(&self) { /* ... */ }
///
///     #[handles]
///     fn on_order(&self, order: &Order) { /* ... */ }
/// }
/// ```
pub trait Recipient: Send + Sync + 'static {
    /// The handler methods of this type, including inherited ones.
    fn handlers() -> Vec<HandlerDescriptor<Self>>
    where
        Self: Sized;
}

/// Handlers of an embedded recipient, re-targeted at the embedding type.
///
/// `inherit(|shell: &Shell| &shell.base)` makes every handler of `base`'s
/// type a handler of `Shell`, invoked on the embedded value.
pub fn inherit<R, B>(project: fn(&R) -> &B) -> Vec<HandlerDescriptor<R>>
where
    R: 'static,
    B: Recipient,
{
    B::handlers()
        .into_iter()
        .map(|descriptor| descriptor.project(project))
        .collect()
}

// ---------------------------------------------------------------------------
// HandlerDescriptor
// ---------------------------------------------------------------------------

type UnitFn<R> = Arc<dyn Fn(&R) -> HandlerResult + Send + Sync>;
type PayloadFn<R> = Arc<dyn Fn(&R, &dyn Any) -> HandlerResult + Send + Sync>;

enum Shape<R> {
    Unit(UnitFn<R>),
    Payload(TypeKey, PayloadFn<R>),
    Free(FreeCall),
    Unsupported { params: usize },
}

/// One handler method of a recipient type `R`.
pub struct HandlerDescriptor<R> {
    method: &'static str,
    key: Option<Cow<'static, str>>,
    shape: Shape<R>,
}

impl<R: 'static> HandlerDescriptor<R> {
    /// A method taking no payload. Requires an explicit key to register.
    pub fn unit<F, O>(method: &'static str, key: Option<&'static str>, f: F) -> Self
    where
        F: Fn(&R) -> O + Send + Sync + 'static,
        O: HandlerOutcome,
    {
        Self {
            method,
            key: key.map(Cow::Borrowed),
            shape: Shape::Unit(Arc::new(move |owner: &R| f(owner).into_result())),
        }
    }

    /// A method taking one payload `&P`. Keyed by `P`'s type when `key` is `None`.
    ///
    /// Only [`Message`] types can be sent by type, so `P` must implement it.
    /// Payloads of other types go through [`HandlerDescriptor::payload_named`]:
    ///
    /// ```compile_fail
    /// use mvvm_mediator::HandlerDescriptor;
    ///
    /// struct Bytes;
    /// let _ = HandlerDescriptor::<Bytes>::payload("on_bytes", None, |_: &Bytes, _: &Vec<u8>| {});
    /// ```
    pub fn payload<P, F, O>(method: &'static str, key: Option<&'static str>, f: F) -> Self
    where
        P: Message,
        F: Fn(&R, &P) -> O + Send + Sync + 'static,
        O: HandlerOutcome,
    {
        Self {
            method,
            key: key.map(Cow::Borrowed),
            shape: Shape::Payload(TypeKey::of::<P>(), payload_call(f)),
        }
    }

    /// A method taking one payload `&P` of any type, under a string key.
    pub fn payload_named<P, F, O>(
        method: &'static str,
        key: impl Into<Cow<'static, str>>,
        f: F,
    ) -> Self
    where
        P: Any + Send + Sync,
        F: Fn(&R, &P) -> O + Send + Sync + 'static,
        O: HandlerOutcome,
    {
        Self {
            method,
            key: Some(key.into()),
            shape: Shape::Payload(TypeKey::of::<P>(), payload_call(f)),
        }
    }

    /// An associated function without `self` taking no payload.
    pub fn free_unit<F, O>(method: &'static str, key: Option<&'static str>, f: F) -> Self
    where
        F: Fn() -> O + Send + Sync + 'static,
        O: HandlerOutcome,
    {
        Self {
            method,
            key: key.map(Cow::Borrowed),
            shape: Shape::Free(FreeCall::unit(f)),
        }
    }

    /// An associated function without `self` taking one payload `&P`.
    /// Keyed by `P`'s type when `key` is `None`.
    pub fn free_payload<P, F, O>(method: &'static str, key: Option<&'static str>, f: F) -> Self
    where
        P: Message,
        F: Fn(&P) -> O + Send + Sync + 'static,
        O: HandlerOutcome,
    {
        Self {
            method,
            key: key.map(Cow::Borrowed),
            shape: Shape::Free(FreeCall::payload(f)),
        }
    }

    /// An associated function taking one payload `&P` of any type, under a
    /// string key.
    pub fn free_payload_named<P, F, O>(
        method: &'static str,
        key: impl Into<Cow<'static, str>>,
        f: F,
    ) -> Self
    where
        P: Any + Send + Sync,
        F: Fn(&P) -> O + Send + Sync + 'static,
        O: HandlerOutcome,
    {
        Self {
            method,
            key: Some(key.into()),
            shape: Shape::Free(FreeCall::payload(f)),
        }
    }

    /// A method whose parameter list cannot be dispatched to.
    ///
    /// Registration of a recipient carrying this descriptor fails with
    /// [`MediatorError::TooManyParameters`].
    pub fn unsupported(method: &'static str, params: usize) -> Self {
        Self {
            method,
            key: None,
            shape: Shape::Unsupported { params },
        }
    }

    /// Replace the explicit key.
    pub fn keyed(mut self, key: impl Into<Cow<'static, str>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// The handler method's name.
    pub fn method(&self) -> &'static str {
        self.method
    }

    /// The explicit key, if one was declared.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Number of payload parameters the method declares.
    pub fn params(&self) -> usize {
        match &self.shape {
            Shape::Unit(_) => 0,
            Shape::Payload(..) => 1,
            Shape::Free(call) => call.params(),
            Shape::Unsupported { params } => *params,
        }
    }

    /// The dispatch key and signature, or the configuration error that
    /// prevents registration.
    pub fn resolve(&self) -> Result<(MessageKey, Signature), MediatorError> {
        let payload = match &self.shape {
            Shape::Unsupported { params } => {
                return Err(MediatorError::TooManyParameters {
                    method: self.method,
                    count: *params,
                });
            }
            Shape::Unit(_) => None,
            Shape::Payload(ty, _) => Some(*ty),
            Shape::Free(call) => call.signature().payload(),
        };
        let key = match (&self.key, payload) {
            (Some(key), _) if key.is_empty() => return Err(MediatorError::EmptyKey),
            (Some(key), _) => MessageKey::Name(key.clone()),
            (None, Some(ty)) => MessageKey::Type(ty),
            (None, None) => return Err(MediatorError::MissingKey { method: self.method }),
        };
        let signature = match payload {
            Some(ty) => Signature::Payload(ty),
            None => Signature::Unit,
        };
        Ok((key, signature))
    }

    /// Re-target this descriptor at an embedding type `S`.
    pub fn project<S: 'static>(self, project: fn(&S) -> &R) -> HandlerDescriptor<S> {
        let shape = match self.shape {
            Shape::Unit(call) => Shape::Unit(Arc::new(move |outer: &S| call(project(outer)))),
            Shape::Payload(ty, call) => Shape::Payload(
                ty,
                Arc::new(move |outer: &S, payload: &dyn Any| call(project(outer), payload)),
            ),
            Shape::Free(call) => Shape::Free(call),
            Shape::Unsupported { params } => Shape::Unsupported { params },
        };
        HandlerDescriptor {
            method: self.method,
            key: self.key,
            shape,
        }
    }

    /// Bind to `owner`, producing a record that holds the owner weakly.
    ///
    /// Associated-function descriptors produce records with no owner.
    pub(crate) fn bind(self, owner: &Arc<R>) -> Result<HandlerRecord, MediatorError>
    where
        R: Send + Sync,
    {
        let (key, signature) = self.resolve()?;
        let origin = Some(TypeKey::of::<R>());
        let record = match self.shape {
            Shape::Unit(call) => HandlerRecord::bound(
                key,
                signature,
                self.method,
                origin,
                owner,
                move |owner: &R, _: &dyn Any| call(owner),
            ),
            Shape::Payload(_, call) => HandlerRecord::bound(
                key,
                signature,
                self.method,
                origin,
                owner,
                move |owner: &R, payload: &dyn Any| call(owner, payload),
            ),
            Shape::Free(call) => HandlerRecord::free(key, signature, self.method, origin, call),
            Shape::Unsupported { params } => {
                return Err(MediatorError::TooManyParameters {
                    method: self.method,
                    count: params,
                });
            }
        };
        Ok(record)
    }

    /// Whether `record` was produced by binding this descriptor to `owner`.
    pub(crate) fn matches(&self, record: &HandlerRecord, owner: Option<OwnerId>) -> bool {
        let Ok((key, signature)) = self.resolve() else {
            return false;
        };
        let owner = match &self.shape {
            Shape::Free(_) => None,
            _ => owner,
        };
        record.origin == Some(TypeKey::of::<R>())
            && record.method == self.method
            && record.owner == owner
            && record.key == key
            && record.signature == signature
    }
}

impl<R> fmt::Debug for HandlerDescriptor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match &self.shape {
            Shape::Unit(_) => "unit".to_string(),
            Shape::Payload(ty, _) => format!("payload({})", ty),
            Shape::Free(call) => format!("free({})", call.signature()),
            Shape::Unsupported { params } => format!("unsupported({} params)", params),
        };
        f.debug_struct("HandlerDescriptor")
            .field("method", &self.method)
            .field("key", &self.key)
            .field("shape", &shape)
            .finish()
    }
}

fn payload_call<R, P, F, O>(f: F) -> PayloadFn<R>
where
    R: 'static,
    P: Any + Send + Sync,
    F: Fn(&R, &P) -> O + Send + Sync + 'static,
    O: HandlerOutcome,
{
    Arc::new(move |owner: &R, payload: &dyn Any| match payload.downcast_ref::<P>() {
        Some(payload) => f(owner, payload).into_result(),
        None => Err(payload_type_error::<P>()),
    })
}

pub(crate) fn payload_type_error<P: Any>() -> HandlerError {
    format!("payload is not a {}", TypeKey::of::<P>()).into()
}

// ===========================================================================
// Tests
// ===========================================================================
