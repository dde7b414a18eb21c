//! Proc macros for mvvm-mediator: `#[message_handlers]` recipient generation
//! and `#[derive(Message)]`.
//!
//! This crate is not meant to be used directly. Enable the `macros` feature on `mvvm-mediator`.

use proc_macro::TokenStream;

mod handlers_macro;
mod message_derive;

/// Generate a `Recipient` impl from the `#[handles]` methods of an impl block.
///
/// # Handler forms
///
/// - `#[handles] fn on_order(&self, order: &Order)` is keyed by the payload type
/// - `#[handles("Key")]` or `#[handles(key = "Key")]` uses a string key
/// - `#[handles("Key")] fn on_ping(&self)` takes no payload and needs a key
/// - a method without `self` is registered once per recipient type
///
/// A handler declaring more than one payload parameter is kept as an
/// unsupported descriptor; registering the recipient then fails.
///
/// # Arguments
///
/// - `inherit(field, ...)` adds the handlers of embedded recipients
///
/// # Example
///
/// ```ignore
/// #[message_handlers(inherit(base))]
/// impl ShellViewModel {
///     #[handles("Ping")]
///     fn on_ping(&self) { /* ... */ }
///
///     #[handles]
///     fn on_order(&self, order: &Order) -> Result<(), OrderError> { /* ... */ }
/// }
/// ```
#[proc_macro_attribute]
pub fn message_handlers(args: TokenStream, item: TokenStream) -> TokenStream {
    handlers_macro::message_handlers_impl(args.into(), item.into())
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

/// Derive `Message` for a struct or enum.
///
/// - `#[message(name = "...")]` on the type overrides the message name
/// - `#[message(ancestor)]` on a field makes the message visible to handlers
///   of that field's type (and its ancestors)
///
/// ```ignore
/// #[derive(Message)]
/// struct RushOrder {
///     #[message(ancestor)]
///     order: Order,
///     priority: u8,
/// }
/// ```
#[proc_macro_derive(Message, attributes(message))]
pub fn derive_message(input: TokenStream) -> TokenStream {
    message_derive::derive_message_impl(input.into())
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
