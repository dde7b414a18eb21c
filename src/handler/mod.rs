//! Handler descriptors, recipients, and weak handler records.

pub mod descriptor;
pub mod record;

pub use descriptor::{inherit, HandlerDescriptor, HandlerOutcome, Recipient};
pub use record::{HandlerRecord, Signature};
