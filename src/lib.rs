//! # mvvm-mediator
//!
//! A weak-reference message mediator for view-model style applications,
//! with an observable map for keyed state.
//!
//! Recipients declare handlers once (by hand or with `#[message_handlers]`)
//! and register with a [`Mediator`]. The mediator keeps only weak references
//! to them: a dropped recipient stops receiving messages and its records are
//! swept on the next dispatch. Messages are routed by a string key or by the
//! payload's type; type-keyed sends also reach handlers of the payload's
//! declared ancestors.
//!
//! ## Core Systems
//!
//! - **[`message`]**: dispatch keys, the [`Message`] trait, and ancestor views
//! - **[`handler`]**: the [`Recipient`] trait, handler descriptors, weak records
//! - **[`mediator`]**: registration table, sync and async dispatch, subscriptions
//! - **[`collections`]**: [`ObservableMap`] and its storage strategies
//! - **[`error`]**: [`MediatorError`] and [`MapError`]
//!
//! ## Example
//!
//! ```
//! use mvvm_mediator::Mediator;
//!
//! let mediator = Mediator::new();
//! let subscription = mediator
//!     .subscribe(|count: &u32| println!("count is now {count}"))
//!     .map(|id| mediator.guard(id))
//!     .unwrap();
//!
//! mediator.send(&3_u32).unwrap();
//! drop(subscription);
//! assert!(mediator.is_empty());
//! ```

pub mod error;
pub mod message;

pub mod handler;
pub mod mediator;

pub mod collections;

pub use collections::{MapChange, ObservableMap, ObserverId, Synchronized, Unsynchronized};
pub use error::{HandlerError, HandlerResult, MapError, MediatorError};
pub use handler::{inherit, HandlerDescriptor, HandlerOutcome, Recipient, Signature};
pub use mediator::{HandlerId, Mediator, MediatorConfig, Subscription};
pub use message::{Ancestor, Message, MessageKey, TypeKey};

// Proc macros (feature-gated)
#[cfg(feature = "macros")]
pub use mvvm_mediator_macros::{message_handlers, Message};
