//! Error types for registration, dispatch, and observable collections.

use crate::message::key::MessageKey;

/// Boxed error returned by a failing handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of a single handler invocation.
pub type HandlerResult = Result<(), HandlerError>;

// ---------------------------------------------------------------------------
// MediatorError
// ---------------------------------------------------------------------------

/// Errors from the message mediator.
///
/// Configuration and type errors are raised at registration time; handler
/// errors surface from synchronous dispatch only.
#[derive(Debug, thiserror::Error)]
pub enum MediatorError {
    #[error("handler `{method}` takes no payload and must declare an explicit message key")]
    MissingKey { method: &'static str },
    #[error("handler `{method}` takes {count} parameters; at most one payload is supported")]
    TooManyParameters { method: &'static str, count: usize },
    #[error("message key must not be empty")]
    EmptyKey,
    #[error("key {key} is registered with signature {expected}, cannot add a handler taking {found}")]
    SignatureMismatch {
        key: MessageKey,
        expected: String,
        found: String,
    },
    #[error("key {key} expects {expected}, message carries {found}")]
    PayloadMismatch {
        key: MessageKey,
        expected: String,
        found: String,
    },
    #[error("handler for {key} failed: {source}")]
    Handler {
        key: MessageKey,
        #[source]
        source: HandlerError,
    },
}

impl MediatorError {
    /// Whether this error was raised while validating a registration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            MediatorError::MissingKey { .. }
                | MediatorError::TooManyParameters { .. }
                | MediatorError::EmptyKey
        )
    }
}

// ---------------------------------------------------------------------------
// MapError
// ---------------------------------------------------------------------------

/// Errors from [`ObservableMap`](crate::collections::ObservableMap).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    #[error("an entry with the same key already exists")]
    DuplicateKey,
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::key::TypeKey;

    #[test]
    fn missing_key_message() {
        let err = MediatorError::MissingKey { method: "on_ping" };
        insta::assert_snapshot!(
            err.to_string(),
            @"handler `on_ping` takes no payload and must declare an explicit message key"
        );
        assert!(err.is_configuration());
    }

    #[test]
    fn too_many_parameters_message() {
        let err = MediatorError::TooManyParameters {
            method: "on_pair",
            count: 2,
        };
        insta::assert_snapshot!(
            err.to_string(),
            @"handler `on_pair` takes 2 parameters; at most one payload is supported"
        );
        assert!(err.is_configuration());
    }

    #[test]
    fn signature_mismatch_is_not_configuration() {
        let err = MediatorError::SignatureMismatch {
            key: MessageKey::name("Ping"),
            expected: "()".into(),
            found: "u32".into(),
        };
        assert!(!err.is_configuration());
        insta::assert_snapshot!(
            err.to_string(),
            @r#"key "Ping" is registered with signature (), cannot add a handler taking u32"#
        );
    }

    #[test]
    fn handler_error_keeps_source() {
        let err = MediatorError::Handler {
            key: MessageKey::Type(TypeKey::of::<u32>()),
            source: "boom".into(),
        };
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("boom"));
        assert!(err.to_string().ends_with("failed: boom"));
    }

    #[test]
    fn duplicate_key_message() {
        assert_eq!(
            MapError::DuplicateKey.to_string(),
            "an entry with the same key already exists"
        );
    }
}
