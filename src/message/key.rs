//! Dispatch keys: string message names and payload type descriptors.
//!
//! A [`MessageKey`] routes a message to its handlers. String keys are matched
//! exactly; type keys identify a payload type by [`TypeId`] and carry the type
//! name for diagnostics only.

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

// ---------------------------------------------------------------------------
// TypeKey
// ---------------------------------------------------------------------------

/// Type descriptor used as a dispatch key and as a handler signature.
///
/// Equality and hashing use the [`TypeId`] alone.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Descriptor for `T`.
    pub fn of<T: Any + ?Sized>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The underlying type id.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully-qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name with module paths stripped (`Vec<String>` rather than
    /// `alloc::vec::Vec<alloc::string::String>`).
    pub fn short_name(&self) -> String {
        let mut out = String::with_capacity(self.name.len());
        let mut segment = String::new();
        for ch in self.name.chars() {
            match ch {
                ':' => segment.clear(),
                '<' | '>' | ',' | ' ' | '&' | '(' | ')' | '[' | ']' | ';' => {
                    out.push_str(&segment);
                    segment.clear();
                    out.push(ch);
                }
                _ => segment.push(ch),
            }
        }
        out.push_str(&segment);
        out
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeKey").field(&self.name).finish()
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name())
    }
}

// ---------------------------------------------------------------------------
// MessageKey
// ---------------------------------------------------------------------------

/// Routes a message to its registered handlers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKey {
    /// Explicit string message name. Matched exactly, never widened.
    Name(Cow<'static, str>),
    /// Payload type. Dispatch also reaches ancestor type keys.
    Type(TypeKey),
}

impl MessageKey {
    /// Key for a message name.
    pub fn name(name: impl Into<Cow<'static, str>>) -> Self {
        MessageKey::Name(name.into())
    }

    /// Key for payload type `T`.
    pub fn of<T: Any>() -> Self {
        MessageKey::Type(TypeKey::of::<T>())
    }

    /// The string name, if this is a name key.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            MessageKey::Name(name) => Some(name),
            MessageKey::Type(_) => None,
        }
    }

    /// The type descriptor, if this is a type key.
    pub fn as_type(&self) -> Option<TypeKey> {
        match self {
            MessageKey::Name(_) => None,
            MessageKey::Type(ty) => Some(*ty),
        }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKey::Name(name) => write!(f, "{:?}", name),
            MessageKey::Type(ty) => write!(f, "type {}", ty),
        }
    }
}

impl From<&'static str> for MessageKey {
    fn from(name: &'static str) -> Self {
        MessageKey::Name(Cow::Borrowed(name))
    }
}

impl From<String> for MessageKey {
    fn from(name: String) -> Self {
        MessageKey::Name(Cow::Owned(name))
    }
}

impl From<TypeKey> for MessageKey {
    fn from(ty: TypeKey) -> Self {
        MessageKey::Type(ty)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
