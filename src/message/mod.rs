//! Messages and dispatch keys.

pub mod key;
pub mod payload;

pub use key::{MessageKey, TypeKey};
pub use payload::{Ancestor, Message};
