//! The [`Mediator`]: shared registration table and registration API.
//!
//! Registration never keeps an owner alive. [`Mediator::register`] binds
//! every handler a [`Recipient`] declares to the instance through a `Weak`;
//! explicit registrations return a [`HandlerId`] for later removal.
//! Dispatch lives in [`super::dispatch`].

use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use tracing::debug;

use super::config::MediatorConfig;
use super::subscription::Subscription;
use super::table::{HandlerId, RegistrationTable};
use crate::error::MediatorError;
use crate::handler::descriptor::{HandlerDescriptor, HandlerOutcome, Recipient};
use crate::handler::record::{FreeCall, HandlerRecord, OwnerId, Signature};
use crate::message::key::{MessageKey, TypeKey};
use crate::message::payload::Message;

pub(crate) struct Shared {
    pub(crate) table: Mutex<RegistrationTable>,
    pub(crate) config: MediatorConfig,
}

static GLOBAL: LazyLock<Mediator> = LazyLock::new(Mediator::new);

// ---------------------------------------------------------------------------
// Mediator
// ---------------------------------------------------------------------------

/// Weak-reference publish/subscribe mediator.
///
/// Cloning is cheap and yields a handle to the same registration table.
#[derive(Clone)]
pub struct Mediator {
    pub(crate) shared: Arc<Shared>,
}

impl Mediator {
    /// Create a mediator with the default config.
    pub fn new() -> Self {
        Self::with_config(MediatorConfig::default())
    }

    /// Create a mediator with the given config.
    pub fn with_config(config: MediatorConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                table: Mutex::new(RegistrationTable::new()),
                config,
            }),
        }
    }

    /// The process-wide default mediator.
    pub fn global() -> &'static Mediator {
        &GLOBAL
    }

    pub fn config(&self) -> &MediatorConfig {
        &self.shared.config
    }

    // ── Recipients ───────────────────────────────────────────────────

    /// Register every handler `R` declares, bound weakly to `recipient`.
    ///
    /// All descriptors are validated before any is inserted: a missing key,
    /// an unsupported parameter list, or a signature conflict with an
    /// existing key leaves the table unchanged. Registering the same
    /// instance twice is a no-op. Returns the ids of the instance's records.
    pub fn register<R: Recipient>(
        &self,
        recipient: &Arc<R>,
    ) -> Result<Vec<HandlerId>, MediatorError> {
        let records = R::handlers()
            .into_iter()
            .map(|descriptor| descriptor.bind(recipient))
            .collect::<Result<Vec<_>, _>>()?;

        // Declared before the guard so swept records drop after unlocking.
        let mut reclaimed = Vec::new();
        let mut table = self.shared.table.lock();
        let mut pending: HashMap<&MessageKey, Signature> = HashMap::new();
        for record in &records {
            reclaimed.extend(table.reclaim_conflicting(&record.key, record.signature));
            table.check(&record.key, record.signature)?;
            match pending.get(&record.key) {
                Some(signature) if *signature != record.signature => {
                    return Err(MediatorError::SignatureMismatch {
                        key: record.key.clone(),
                        expected: signature.to_string(),
                        found: record.signature.to_string(),
                    });
                }
                _ => {
                    pending.insert(&record.key, record.signature);
                }
            }
        }
        drop(pending);

        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let (id, _) = table.insert(record)?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        drop(table);
        drop(reclaimed);

        debug!(
            mediator = %self.shared.config.name,
            recipient = std::any::type_name::<R>(),
            handlers = ids.len(),
            "registered recipient"
        );
        Ok(ids)
    }

    /// Remove the handlers `R` declares for `recipient`.
    ///
    /// Handlers declared as associated functions (no `self`) are shared by
    /// every instance of `R` and are removed as well. Returns the number of
    /// records removed.
    pub fn unregister<R: Recipient>(&self, recipient: &Arc<R>) -> usize {
        let owner = OwnerId::of(recipient);
        let descriptors = R::handlers();
        let mut table = self.shared.table.lock();
        let ids = table.find(|record| {
            descriptors
                .iter()
                .any(|descriptor| descriptor.matches(record, Some(owner)))
        });
        let removed: Vec<_> = ids.into_iter().filter_map(|id| table.remove(id)).collect();
        drop(table);

        debug!(
            mediator = %self.shared.config.name,
            recipient = std::any::type_name::<R>(),
            removed = removed.len(),
            "unregistered recipient"
        );
        removed.len()
    }

    // ── Explicit handlers ────────────────────────────────────────────

    /// Register a closure taking `&P` under a string key.
    pub fn register_handler<P, F, O>(
        &self,
        key: impl Into<Cow<'static, str>>,
        handler: F,
    ) -> Result<HandlerId, MediatorError>
    where
        P: Any + Send + Sync,
        F: Fn(&P) -> O + Send + Sync + 'static,
        O: HandlerOutcome,
    {
        let key = MessageKey::Name(validated_name(key)?);
        self.insert_free(key, FreeCall::payload(handler), std::any::type_name::<F>())
    }

    /// Register a closure taking no payload under a string key.
    pub fn register_unit_handler<F, O>(
        &self,
        key: impl Into<Cow<'static, str>>,
        handler: F,
    ) -> Result<HandlerId, MediatorError>
    where
        F: Fn() -> O + Send + Sync + 'static,
        O: HandlerOutcome,
    {
        let key = MessageKey::Name(validated_name(key)?);
        self.insert_free(key, FreeCall::unit(handler), std::any::type_name::<F>())
    }

    /// Register a closure for messages of type `P` (and messages that have
    /// `P` as an ancestor).
    pub fn subscribe<P, F, O>(&self, handler: F) -> Result<HandlerId, MediatorError>
    where
        P: Message,
        F: Fn(&P) -> O + Send + Sync + 'static,
        O: HandlerOutcome,
    {
        self.insert_free(
            MessageKey::Type(TypeKey::of::<P>()),
            FreeCall::payload(handler),
            std::any::type_name::<F>(),
        )
    }

    /// Register a handler on `owner` taking `&P` under a string key.
    /// The registration holds `owner` weakly.
    pub fn register_weak<T, P, F, O>(
        &self,
        key: impl Into<Cow<'static, str>>,
        owner: &Arc<T>,
        handler: F,
    ) -> Result<HandlerId, MediatorError>
    where
        T: Send + Sync + 'static,
        P: Any + Send + Sync,
        F: Fn(&T, &P) -> O + Send + Sync + 'static,
        O: HandlerOutcome,
    {
        let key = validated_name(key)?;
        let method = std::any::type_name::<F>();
        let record = HandlerDescriptor::<T>::payload_named::<P, F, O>(method, key, handler)
            .bind(owner)?;
        self.insert_explicit(record)
    }

    /// Register a handler on `owner` taking no payload under a string key.
    pub fn register_unit_weak<T, F, O>(
        &self,
        key: impl Into<Cow<'static, str>>,
        owner: &Arc<T>,
        handler: F,
    ) -> Result<HandlerId, MediatorError>
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> O + Send + Sync + 'static,
        O: HandlerOutcome,
    {
        let record = HandlerDescriptor::<T>::unit(std::any::type_name::<F>(), None, handler)
            .keyed(validated_name(key)?)
            .bind(owner)?;
        self.insert_explicit(record)
    }

    /// Register a handler on `owner` for messages of type `P`.
    pub fn subscribe_weak<T, P, F, O>(
        &self,
        owner: &Arc<T>,
        handler: F,
    ) -> Result<HandlerId, MediatorError>
    where
        T: Send + Sync + 'static,
        P: Message,
        F: Fn(&T, &P) -> O + Send + Sync + 'static,
        O: HandlerOutcome,
    {
        let record =
            HandlerDescriptor::<T>::payload::<P, F, O>(std::any::type_name::<F>(), None, handler)
                .bind(owner)?;
        self.insert_explicit(record)
    }

    /// Remove one registration. Returns whether it was still registered.
    pub fn unregister_handler(&self, id: HandlerId) -> bool {
        let removed = self.shared.table.lock().remove(id);
        if let Some(record) = &removed {
            debug!(
                mediator = %self.shared.config.name,
                key = %record.key,
                method = record.method,
                "unregistered handler"
            );
        }
        removed.is_some()
    }

    /// A guard that unregisters `id` when dropped.
    pub fn guard(&self, id: HandlerId) -> Subscription {
        Subscription::new(Arc::downgrade(&self.shared), id)
    }

    fn insert_free(
        &self,
        key: MessageKey,
        call: FreeCall,
        method: &'static str,
    ) -> Result<HandlerId, MediatorError> {
        let record = HandlerRecord::free(key, call.signature(), method, None, call);
        self.insert_explicit(record)
    }

    fn insert_explicit(&self, record: HandlerRecord) -> Result<HandlerId, MediatorError> {
        let record = record.explicit();
        let key = record.key.clone();
        let (reclaimed, inserted) = {
            let mut table = self.shared.table.lock();
            let reclaimed = table.reclaim_conflicting(&record.key, record.signature);
            (reclaimed, table.insert(record))
        };
        drop(reclaimed);
        let (id, _) = inserted?;
        debug!(mediator = %self.shared.config.name, key = %key, "registered handler");
        Ok(id)
    }

    // ── Introspection ────────────────────────────────────────────────

    /// Number of records under `key`, including reclaimed ones not yet pruned.
    pub fn handler_count(&self, key: &MessageKey) -> usize {
        self.shared.table.lock().handler_count(key)
    }

    /// Keys with at least one record.
    pub fn keys(&self) -> Vec<MessageKey> {
        self.shared.table.lock().keys()
    }

    /// Whether `id` is still registered.
    pub fn contains(&self, id: HandlerId) -> bool {
        self.shared.table.lock().get(id).is_some()
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.shared.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.table.lock().is_empty()
    }

    /// Remove records whose owner has been dropped. Returns the count removed.
    pub fn prune(&self) -> usize {
        let pruned = self.shared.table.lock().prune();
        if !pruned.is_empty() {
            debug!(mediator = %self.shared.config.name, pruned = pruned.len(), "pruned reclaimed handlers");
        }
        pruned.len()
    }
}

impl Default for Mediator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Mediator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mediator")
            .field("name", &self.shared.config.name)
            .field("handlers", &self.len())
            .finish()
    }
}

fn validated_name(key: impl Into<Cow<'static, str>>) -> Result<Cow<'static, str>, MediatorError> {
    let key = key.into();
    if key.is_empty() {
        return Err(MediatorError::EmptyKey);
    }
    Ok(key)
}

// ===========================================================================
// Tests
// ===========================================================================
