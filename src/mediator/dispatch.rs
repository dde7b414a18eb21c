//! Synchronous and fire-and-forget dispatch.
//!
//! Every send takes a snapshot of the matching routes under the table lock,
//! releases the lock, then invokes the handlers. Handlers may therefore
//! register or unregister re-entrantly; changes made mid-dispatch may or may
//! not be observed by the running pass.
//!
//! Type-keyed sends fan out over the message's lineage (the message type
//! followed by its [`ancestors`](crate::message::Message::ancestors)).
//! String-keyed sends match the name exactly.

use std::any::Any;
use std::borrow::Cow;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, LazyLock};

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, trace, warn};

use super::registration::Mediator;
use super::table::HandlerId;
use crate::error::MediatorError;
use crate::handler::record::{ErasedHandler, Invocation, Signature};
use crate::message::key::{MessageKey, TypeKey};
use crate::message::payload::{lineage, Message};

/// Blocking threads of the fallback runtime used when no runtime is
/// configured or current.
const FALLBACK_BLOCKING_THREADS: usize = 4;

static FALLBACK: LazyLock<Option<Runtime>> = LazyLock::new(|| {
    Builder::new_current_thread()
        .max_blocking_threads(FALLBACK_BLOCKING_THREADS)
        .thread_name("mvvm-mediator-dispatch")
        .build()
        .map_err(|err| warn!(error = %err, "fallback dispatch runtime unavailable"))
        .ok()
});

/// Handlers captured for one key, with the payload view they receive.
struct Batch<'a> {
    key: MessageKey,
    view: &'a dyn Any,
    handlers: Vec<(HandlerId, Arc<dyn ErasedHandler>)>,
}

/// Prunes the records found reclaimed during a fan-out when dropped, so a
/// panicking handler does not leave them behind.
struct Sweep<'m> {
    mediator: &'m Mediator,
    reclaimed: Vec<HandlerId>,
}

impl Drop for Sweep<'_> {
    fn drop(&mut self) {
        let shared = &self.mediator.shared;
        if !shared.config.prune_after_dispatch || self.reclaimed.is_empty() {
            return;
        }
        let mut table = shared.table.lock();
        let pruned: Vec<_> = self
            .reclaimed
            .drain(..)
            .filter_map(|id| table.remove(id))
            .collect();
        drop(table);
        for record in &pruned {
            trace!(mediator = %shared.config.name, key = %record.key, method = record.method, "pruned reclaimed handler");
        }
    }
}

/// What to do with a handler failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failures {
    /// Keep fanning out; report the first error to the sender.
    Propagate,
    /// Keep fanning out; log and drop errors and panics.
    Discard,
}

impl Mediator {
    // ── Synchronous ──────────────────────────────────────────────────

    /// Send `message` to every live handler registered for its type or any
    /// of its ancestor types.
    ///
    /// Returns `Ok(true)` if at least one handler ran. A failing handler
    /// does not stop the fan-out; the first failure is returned as
    /// [`MediatorError::Handler`] once all handlers have run.
    pub fn send<P: Message>(&self, message: &P) -> Result<bool, MediatorError> {
        let batches = self.lineage_batches(message);
        self.fan_out(batches, Failures::Propagate)
    }

    /// Send `payload` to the handlers registered under the string `key`.
    ///
    /// No ancestor widening applies. Fails with
    /// [`MediatorError::PayloadMismatch`] when the key's handlers take a
    /// different payload type (or none).
    pub fn send_to<P: Any + Send + Sync>(
        &self,
        key: &str,
        payload: &P,
    ) -> Result<bool, MediatorError> {
        let batch = self.named_batch(key, Signature::Payload(TypeKey::of::<P>()), payload)?;
        self.fan_out(batch.into_iter().collect(), Failures::Propagate)
    }

    /// Invoke the zero-argument handlers registered under the string `key`.
    pub fn notify(&self, key: &str) -> Result<bool, MediatorError> {
        let batch = self.named_batch(key, Signature::Unit, &())?;
        self.fan_out(batch.into_iter().collect(), Failures::Propagate)
    }

    // ── Fire-and-forget ──────────────────────────────────────────────

    /// [`send`](Self::send) without blocking the caller.
    ///
    /// Handler errors and panics are logged and discarded. Completion is not
    /// observable and is not guaranteed before shutdown.
    pub fn send_async<P: Message>(&self, message: P) {
        let mediator = self.clone();
        self.spawn_dispatch("send_async", move || {
            let batches = mediator.lineage_batches(&message);
            mediator.fan_out(batches, Failures::Discard)
        });
    }

    /// [`send_to`](Self::send_to) without blocking the caller.
    pub fn send_to_async<P: Any + Send + Sync>(&self, key: impl Into<String>, payload: P) {
        let mediator = self.clone();
        let key = key.into();
        self.spawn_dispatch("send_to_async", move || {
            let signature = Signature::Payload(TypeKey::of::<P>());
            let batch = mediator.named_batch(&key, signature, &payload)?;
            mediator.fan_out(batch.into_iter().collect(), Failures::Discard)
        });
    }

    /// [`notify`](Self::notify) without blocking the caller.
    pub fn notify_async(&self, key: impl Into<String>) {
        let mediator = self.clone();
        let key = key.into();
        self.spawn_dispatch("notify_async", move || {
            let batch = mediator.named_batch(&key, Signature::Unit, &())?;
            mediator.fan_out(batch.into_iter().collect(), Failures::Discard)
        });
    }

    fn spawn_dispatch<F>(&self, operation: &'static str, job: F)
    where
        F: FnOnce() -> Result<bool, MediatorError> + Send + 'static,
    {
        let name = self.shared.config.name.clone();
        let task = move || match job() {
            Ok(delivered) => trace!(mediator = %name, operation, delivered, "async dispatch finished"),
            Err(err) => warn!(mediator = %name, operation, error = %err, "async dispatch failed; error discarded"),
        };
        let runtime = self
            .shared
            .config
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
            .or_else(|| FALLBACK.as_ref().map(|runtime| runtime.handle().clone()));
        match runtime {
            Some(runtime) => drop(runtime.spawn_blocking(task)),
            None => drop(std::thread::spawn(task)),
        }
    }

    // ── Snapshots ────────────────────────────────────────────────────

    fn lineage_batches<'a, P: Message>(&self, message: &'a P) -> Vec<Batch<'a>> {
        let lineage = lineage(message);
        let table = self.shared.table.lock();
        let batches = lineage
            .into_iter()
            .filter_map(|ancestor| {
                let key = MessageKey::Type(ancestor.key());
                table.snapshot(&key).map(|snapshot| Batch {
                    key,
                    view: ancestor.view(),
                    handlers: snapshot.handlers,
                })
            })
            .collect();
        drop(table);
        batches
    }

    fn named_batch<'a>(
        &self,
        name: &str,
        carried: Signature,
        view: &'a dyn Any,
    ) -> Result<Option<Batch<'a>>, MediatorError> {
        let key = MessageKey::Name(Cow::Owned(name.to_string()));
        let Some(snapshot) = self.shared.table.lock().snapshot(&key) else {
            return Ok(None);
        };
        if snapshot.signature != carried {
            return Err(MediatorError::PayloadMismatch {
                key,
                expected: snapshot.signature.to_string(),
                found: carried.to_string(),
            });
        }
        Ok(Some(Batch {
            key,
            view,
            handlers: snapshot.handlers,
        }))
    }

    // ── Fan-out ──────────────────────────────────────────────────────

    fn fan_out(&self, batches: Vec<Batch<'_>>, failures: Failures) -> Result<bool, MediatorError> {
        let name = &self.shared.config.name;
        let mut delivered = 0_usize;
        let mut sweep = Sweep {
            mediator: self,
            reclaimed: Vec::new(),
        };
        let mut first_error = None;

        for batch in &batches {
            for (id, handler) in &batch.handlers {
                let invocation = match failures {
                    Failures::Propagate => handler.invoke(batch.view),
                    Failures::Discard => {
                        match catch_unwind(AssertUnwindSafe(|| handler.invoke(batch.view))) {
                            Ok(invocation) => invocation,
                            Err(_) => {
                                delivered += 1;
                                warn!(mediator = %name, key = %batch.key, "handler panicked; panic discarded");
                                continue;
                            }
                        }
                    }
                };
                match invocation {
                    Invocation::Delivered(Ok(())) => delivered += 1,
                    Invocation::Delivered(Err(source)) => {
                        delivered += 1;
                        match failures {
                            Failures::Propagate if first_error.is_none() => {
                                first_error = Some(MediatorError::Handler {
                                    key: batch.key.clone(),
                                    source,
                                });
                            }
                            Failures::Propagate => {
                                debug!(mediator = %name, key = %batch.key, error = %source, "additional handler error");
                            }
                            Failures::Discard => {
                                warn!(mediator = %name, key = %batch.key, error = %source, "handler failed; error discarded");
                            }
                        }
                    }
                    Invocation::Reclaimed => sweep.reclaimed.push(*id),
                }
            }
        }

        debug!(
            mediator = %name,
            keys = batches.len(),
            delivered,
            reclaimed = sweep.reclaimed.len(),
            "dispatched message"
        );
        drop(sweep);

        match first_error {
            Some(err) => Err(err),
            None => Ok(delivered > 0),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::descriptor::{HandlerDescriptor, Recipient};
    use crate::mediator::config::MediatorConfig;
    use crate::message::payload::Ancestor;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    // ── Fixtures ─────────────────────────────────────────────────────

    #[derive(Debug, Clone, PartialEq)]
    struct Order {
        id: u32,
    }

    impl Message for Order {
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn message_name(&self) -> &str {
            "Order"
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct RushOrder {
        order: Order,
        deadline: u32,
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

    #[derive(Default)]
    struct Counter {
        hits: AtomicUsize,
    }

    impl Counter {
        fn hit(&self) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    impl Recipient for Counter {
        fn handlers() -> Vec<HandlerDescriptor<Self>> {
            vec![HandlerDescriptor::unit("hit", Some("Ping"), Counter::hit)]
        }
    }

    fn counting(mediator: &Mediator, key: &'static str) -> Arc<AtomicUsize> {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_c = hits.clone();
        mediator
            .register_unit_handler(key, move || {
                hits_c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        hits
    }

    // ── String keys ──────────────────────────────────────────────────

    #[test]
    fn notify_without_handlers_returns_false() {
        let mediator = Mediator::new();
        assert_eq!(assert_ok!(mediator.notify("Ping")), false);
    }

    #[test]
    fn notify_invokes_recipient_once() {
        let mediator = Mediator::new();
        let counter = Arc::new(Counter::default());
        mediator.register(&counter).unwrap();
        assert!(assert_ok!(mediator.notify("Ping")));
        assert_eq!(counter.hits(), 1);
    }

    #[test]
    fn send_to_passes_payload() {
        let mediator = Mediator::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_c = seen.clone();
        mediator
            .register_handler("Title", move |title: &String| seen_c.lock().push(title.clone()))
            .unwrap();
        assert!(mediator.send_to("Title", &"Inbox".to_string()).unwrap());
        assert_eq!(*seen.lock(), vec!["Inbox".to_string()]);
    }

    #[test]
    fn send_to_wrong_payload_is_rejected() {
        let mediator = Mediator::new();
        let hits = counting(&mediator, "Ping");
        let err = assert_err!(mediator.send_to("Ping", &5_u32));
        assert!(matches!(err, MediatorError::PayloadMismatch { .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn notify_payload_key_is_rejected() {
        let mediator = Mediator::new();
        mediator.register_handler("Count", |_: &u32| {}).unwrap();
        assert!(matches!(
            mediator.notify("Count"),
            Err(MediatorError::PayloadMismatch { .. })
        ));
    }

    #[test]
    fn string_keys_do_not_widen() {
        let mediator = Mediator::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_c = hits.clone();
        mediator
            .register_handler("Order", move |_: &Order| {
                hits_c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        let rush = RushOrder {
            order: Order { id: 1 },
            deadline: 2,
        };
        assert!(mediator.send_to("Order", &rush).is_err());
        assert_eq!(mediator.send(&rush.order).unwrap(), false);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unregistered_handler_is_not_invoked() {
        let mediator = Mediator::new();
        let kept = counting(&mediator, "Ping");
        let removed = Arc::new(AtomicUsize::new(0));
        let removed_c = removed.clone();
        let id = mediator
            .register_unit_handler("Ping", move || {
                removed_c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert!(mediator.unregister_handler(id));
        mediator.notify("Ping").unwrap();
        assert_eq!(kept.load(Ordering::SeqCst), 1);
        assert_eq!(removed.load(Ordering::SeqCst), 0);
    }

    // ── Type keys ────────────────────────────────────────────────────

    #[test]
    fn send_reaches_ancestor_handlers() {
        let mediator = Mediator::new();
        let orders = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let orders_c = orders.clone();
        mediator
            .subscribe(move |order: &Order| orders_c.lock().push(order.id))
            .unwrap();
        let rushes = Arc::new(AtomicUsize::new(0));
        let rushes_c = rushes.clone();
        mediator
            .subscribe(move |rush: &RushOrder| {
                rushes_c.fetch_add(rush.deadline as usize, Ordering::SeqCst);
            })
            .unwrap();

        let rush = RushOrder {
            order: Order { id: 42 },
            deadline: 3,
        };
        assert!(mediator.send(&rush).unwrap());
        assert_eq!(*orders.lock(), vec![42]);
        assert_eq!(rushes.load(Ordering::SeqCst), 3);

        // A plain Order does not reach RushOrder handlers.
        assert!(mediator.send(&Order { id: 7 }).unwrap());
        assert_eq!(*orders.lock(), vec![42, 7]);
        assert_eq!(rushes.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn send_without_handlers_returns_false() {
        let mediator = Mediator::new();
        assert_eq!(mediator.send(&Order { id: 1 }).unwrap(), false);
    }

    // ── Failures ─────────────────────────────────────────────────────

    #[test]
    fn first_error_is_returned_after_full_fan_out() {
        let mediator = Mediator::new();
        mediator
            .register_unit_handler("Save", || Err::<(), _>("disk full"))
            .unwrap();
        mediator
            .register_unit_handler("Save", || Err::<(), _>("read only"))
            .unwrap();
        let hits = counting(&mediator, "Save");

        let err = assert_err!(mediator.notify("Save"));
        match err {
            MediatorError::Handler { key, source } => {
                assert_eq!(key, MessageKey::name("Save"));
                let message = source.to_string();
                assert!(message == "disk full" || message == "read only");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    // ── Weak ownership ───────────────────────────────────────────────

    #[test]
    fn dropped_owner_is_skipped_and_pruned() {
        let mediator = Mediator::new();
        let counter = Arc::new(Counter::default());
        mediator.register(&counter).unwrap();
        drop(counter);

        assert_eq!(mediator.handler_count(&MessageKey::name("Ping")), 1);
        assert_eq!(mediator.notify("Ping").unwrap(), false);
        assert_eq!(mediator.handler_count(&MessageKey::name("Ping")), 0);
        assert!(mediator.keys().is_empty());
    }

    #[test]
    fn pruning_can_be_disabled() {
        let mediator =
            Mediator::with_config(MediatorConfig::new().with_prune_after_dispatch(false));
        let counter = Arc::new(Counter::default());
        mediator.register(&counter).unwrap();
        drop(counter);

        assert_eq!(mediator.notify("Ping").unwrap(), false);
        assert_eq!(mediator.handler_count(&MessageKey::name("Ping")), 1);
        assert_eq!(mediator.prune(), 1);
    }

    #[test]
    fn panicking_handler_still_prunes_reclaimed_records() {
        let mediator = Mediator::new();
        let counter = Arc::new(Counter::default());
        mediator.register(&counter).unwrap();
        drop(counter);
        mediator
            .register_unit_handler("Ping", || -> () { panic!("handler bug") })
            .unwrap();

        let outcome = catch_unwind(AssertUnwindSafe(|| mediator.notify("Ping")));
        assert!(outcome.is_err());
        assert_eq!(mediator.handler_count(&MessageKey::name("Ping")), 1);
    }

    // ── Re-entrancy ──────────────────────────────────────────────────

    #[test]
    fn handler_may_unregister_itself() {
        let mediator = Mediator::new();
        let slot: Arc<parking_lot::Mutex<Option<HandlerId>>> = Arc::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let (m, s, h) = (mediator.clone(), slot.clone(), hits.clone());
        let id = mediator
            .register_unit_handler("Once", move || {
                h.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = *s.lock() {
                    m.unregister_handler(id);
                }
            })
            .unwrap();
        *slot.lock() = Some(id);

        assert!(mediator.notify("Once").unwrap());
        assert_eq!(mediator.notify("Once").unwrap(), false);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_may_register_during_dispatch() {
        let mediator = Mediator::new();
        let m = mediator.clone();
        mediator
            .register_unit_handler("Grow", move || {
                m.register_unit_handler("Grown", || {}).map(|_| ())
            })
            .unwrap();
        assert!(mediator.notify("Grow").unwrap());
        assert_eq!(mediator.handler_count(&MessageKey::name("Grown")), 1);
    }

    // ── Fire-and-forget ──────────────────────────────────────────────

    #[test]
    fn notify_async_outside_runtime_uses_fallback_pool() {
        let mediator = Mediator::new();
        let (tx, rx) = mpsc::channel();
        let tx = parking_lot::Mutex::new(tx);
        mediator
            .register_unit_handler("Ping", move || {
                let thread = std::thread::current().name().map(str::to_string);
                let _ = tx.lock().send(thread);
            })
            .unwrap();

        for _ in 0..64 {
            mediator.notify_async("Ping");
        }
        for _ in 0..64 {
            let thread = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(thread.as_deref(), Some("mvvm-mediator-dispatch"));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn send_async_swallows_errors_and_panics() {
        let mediator = Mediator::new();
        mediator
            .subscribe(|_: &Order| Err::<(), _>("rejected"))
            .unwrap();
        mediator
            .subscribe(|_: &Order| -> () { panic!("handler bug") })
            .unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        mediator
            .subscribe(move |order: &Order| {
                let _ = tx.send(order.id);
            })
            .unwrap();

        mediator.send_async(Order { id: 9 });
        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert_eq!(received.ok().flatten(), Some(9));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn send_to_async_delivers_on_configured_runtime() {
        let mediator = Mediator::with_config(MediatorConfig::new().with_runtime(Handle::current()));
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = parking_lot::Mutex::new(Some(tx));
        mediator
            .register_handler("Title", move |title: &String| {
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(title.clone());
                }
            })
            .unwrap();
        mediator.send_to_async("Title", "Drafts".to_string());
        let received = tokio::time::timeout(Duration::from_secs(5), rx).await;
        assert_eq!(received.ok().and_then(Result::ok).as_deref(), Some("Drafts"));
    }
}
