//! The message mediator: registration table, dispatch, subscriptions.
//!
//! - [`Mediator`]: register recipients and handlers, send messages.
//! - [`MediatorConfig`]: logging name, pruning, and the async runtime.
//! - [`Subscription`]: RAII guard that unregisters on drop.
//! - [`HandlerId`]: generational id of one registration.

pub mod config;
pub mod registration;
pub mod dispatch;
pub mod subscription;
pub mod table;

pub use self::config::MediatorConfig;
pub use self::registration::Mediator;
pub use self::subscription::Subscription;
pub use self::table::HandlerId;
