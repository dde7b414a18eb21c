//! Message trait and ancestor views.
//!
//! The [`Message`] trait is object-safe and supports downcasting via `Any`.
//! Rust has no subtype relation between structs, so a message declares the
//! "base types" it can be seen as through [`Message::ancestors`]: each
//! [`Ancestor`] is a view of (part of) the message under another type key.
//! Handlers registered for an ancestor type receive that view.

use std::any::Any;
use std::fmt;

use super::key::TypeKey;

// ---------------------------------------------------------------------------
// Message trait
// ---------------------------------------------------------------------------

/// A payload that can be dispatched by type.
pub trait Message: Send + Sync + 'static {
    /// Upcast to `&dyn Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Human-readable name for this message type.
    fn message_name(&self) -> &str;

    /// Views of this message under ancestor type keys, nearest first.
    fn ancestors(&self) -> Vec<Ancestor<'_>> {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// Ancestor
// ---------------------------------------------------------------------------

/// A message viewed as one of its ancestor types.
#[derive(Clone, Copy)]
pub struct Ancestor<'a> {
    key: TypeKey,
    view: &'a dyn Any,
}

impl<'a> Ancestor<'a> {
    /// View `value` under its own type key.
    pub fn of<T: Any + Send + Sync>(value: &'a T) -> Self {
        Self {
            key: TypeKey::of::<T>(),
            view: value,
        }
    }

    /// `value` followed by all of its own ancestors.
    pub fn chain<T: Message>(value: &'a T) -> Vec<Ancestor<'a>> {
        let mut out = vec![Ancestor::of(value)];
        out.extend(value.ancestors());
        out
    }

    /// The ancestor's type key.
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// The ancestor view, downcastable to the type named by [`key`](Self::key).
    pub fn view(&self) -> &'a dyn Any {
        self.view
    }
}

impl fmt::Debug for Ancestor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ancestor").field(&self.key).finish()
    }
}

/// Every view of `message` that type-keyed dispatch considers: the message
/// itself, then its ancestors. Duplicate keys keep their first occurrence.
pub(crate) fn lineage<P: Message>(message: &P) -> Vec<Ancestor<'_>> {
    let mut out = vec![Ancestor {
        key: TypeKey::of::<P>(),
        view: message.as_any(),
    }];
    for ancestor in message.ancestors() {
        if out.iter().all(|seen| seen.key != ancestor.key) {
            out.push(ancestor);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Built-in impls
// ---------------------------------------------------------------------------

macro_rules! impl_message_for {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Message for $ty {
                fn as_any(&self) -> &dyn Any {
                    self
                }
                fn message_name(&self) -> &str {
                    stringify!($ty)
                }
            }
        )*
    };
}

impl_message_for!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    String,
);

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Entity {
        id: u32,
    }

    impl Message for Entity {
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn message_name(&self) -> &str {
            "Entity"
        }
    }

    struct Order {
        entity: Entity,
    }

    impl Message for Order {
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn message_name(&self) -> &str {
            "Order"
        }
        fn ancestors(&self) -> Vec<Ancestor<'_>> {
            Ancestor::chain(&self.entity)
        }
    }

    struct RushOrder {
        order: Order,
    }

    impl Message for RushOrder {
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn message_name(&self) -> &str {
            "RushOrder"
        }
        fn ancestors(&self) -> Vec<Ancestor<'_>> {
            Ancestor::chain(&self.order)
        }
    }

    fn rush() -> RushOrder {
        RushOrder {
            order: Order {
                entity: Entity { id: 7 },
            },
        }
    }

    #[test]
    fn default_has_no_ancestors() {
        assert!(Entity { id: 1 }.ancestors().is_empty());
    }

    #[test]
    fn chain_is_transitive() {
        let msg = rush();
        let keys: Vec<TypeKey> = msg.ancestors().iter().map(|a| a.key()).collect();
        assert_eq!(keys, vec![TypeKey::of::<Order>(), TypeKey::of::<Entity>()]);
    }

    #[test]
    fn lineage_starts_with_self() {
        let msg = rush();
        let lineage = lineage(&msg);
        assert_eq!(lineage.len(), 3);
        assert_eq!(lineage[0].key(), TypeKey::of::<RushOrder>());
        let entity = lineage[2].view().downcast_ref::<Entity>();
        assert_eq!(entity.map(|e| e.id), Some(7));
    }

    #[test]
    fn builtin_message_names() {
        assert_eq!(5_u32.message_name(), "u32");
        assert_eq!(String::new().message_name(), "String");
        assert!(().as_any().is::<()>());
    }
}
