//! Tests for `#[message_handlers]` and `#[derive(Message)]`.
//!
//! Built only with the `macros` feature.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mvvm_mediator::{message_handlers, Mediator, MediatorError, Message, MessageKey, Recipient};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tokio_test::{assert_err, assert_ok};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Message)]
struct Entity {
    id: u32,
}

#[derive(Debug, Clone, Message)]
struct Order {
    #[message(ancestor)]
    entity: Entity,
    total: u32,
}

#[derive(Debug, Clone, Message)]
#[message(name = "order.rush")]
struct RushOrder {
    #[message(ancestor)]
    order: Order,
    priority: u8,
}

#[derive(Debug, Message)]
enum Navigation {
    Back,
    Forward,
}

#[derive(Debug, thiserror::Error)]
#[error("order {0} rejected")]
struct Rejected(u32);

// ---------------------------------------------------------------------------
// Recipients
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Ledger {
    pings: AtomicUsize,
    entities: Mutex<Vec<u32>>,
    orders: Mutex<Vec<u32>>,
    rushes: Mutex<Vec<u8>>,
}

static AUDITED: AtomicUsize = AtomicUsize::new(0);

#[message_handlers]
impl Ledger {
    #[handles("Ping")]
    fn on_ping(&self) {
        self.pings.fetch_add(1, Ordering::SeqCst);
    }

    #[handles]
    fn on_entity(&self, entity: &Entity) {
        self.entities.lock().push(entity.id);
    }

    #[handles]
    fn on_order(&self, order: &Order) -> Result<(), Rejected> {
        if order.total == 0 {
            return Err(Rejected(order.entity.id));
        }
        self.orders.lock().push(order.total);
        Ok(())
    }

    #[handles(key = "Rush")]
    fn on_rush(&self, rush: &RushOrder) {
        self.rushes.lock().push(rush.priority);
    }

    #[handles("Audit")]
    fn audit() {
        AUDITED.fetch_add(1, Ordering::SeqCst);
    }

    fn total_orders(&self) -> usize {
        self.orders.lock().len()
    }
}

#[derive(Default)]
struct Shell {
    ledger: Ledger,
    closes: AtomicUsize,
}

#[message_handlers(inherit(ledger))]
impl Shell {
    #[handles("Close")]
    fn on_close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

struct Wide;

#[message_handlers]
impl Wide {
    #[handles]
    fn on_pair(&self, _left: &u8, _right: &u8) {}
}

struct Keyless;

#[message_handlers]
impl Keyless {
    #[handles]
    fn on_nothing(&self) {}
}

// ---------------------------------------------------------------------------
// derive(Message)
// ---------------------------------------------------------------------------

#[test]
fn test_derived_names() {
    let entity = Entity { id: 1 };
    let rush = RushOrder {
        order: Order {
            entity: entity.clone(),
            total: 10,
        },
        priority: 1,
    };
    assert_eq!(entity.message_name(), "Entity");
    assert_eq!(rush.message_name(), "order.rush");
    assert_eq!(Navigation::Back.message_name(), "Navigation");
    assert!(Navigation::Forward.ancestors().is_empty());
}

#[test]
fn test_derived_ancestors_are_transitive() {
    let rush = RushOrder {
        order: Order {
            entity: Entity { id: 4 },
            total: 10,
        },
        priority: 1,
    };
    let keys: Vec<_> = rush
        .ancestors()
        .iter()
        .map(|ancestor| ancestor.key().short_name().to_string())
        .collect();
    assert_eq!(keys, vec!["Order", "Entity"]);
}

// ---------------------------------------------------------------------------
// #[message_handlers]
// ---------------------------------------------------------------------------

#[test]
fn test_generated_descriptors() {
    let descriptors = Ledger::handlers();
    let methods: Vec<_> = descriptors.iter().map(|d| d.method()).collect();
    assert_eq!(
        methods,
        vec!["on_ping", "on_entity", "on_order", "on_rush", "audit"]
    );
    assert_eq!(descriptors[0].key(), Some("Ping"));
    assert_eq!(descriptors[1].key(), None);
    assert_eq!(descriptors[3].key(), Some("Rush"));
}

#[test]
fn test_type_keyed_send_reaches_every_ancestor_handler() {
    let mediator = Mediator::new();
    let ledger = Arc::new(Ledger::default());
    assert_ok!(mediator.register(&ledger));

    let order = Order {
        entity: Entity { id: 9 },
        total: 25,
    };
    assert!(assert_ok!(mediator.send(&order)));
    assert_eq!(*ledger.entities.lock(), vec![9]);
    assert_eq!(*ledger.orders.lock(), vec![25]);
    assert_eq!(ledger.total_orders(), 1);

    // String keys match exactly; `Rush` does not reach the Order handler.
    let rush = RushOrder {
        order,
        priority: 3,
    };
    assert!(assert_ok!(mediator.send_to("Rush", &rush)));
    assert_eq!(*ledger.rushes.lock(), vec![3]);
    assert_eq!(ledger.total_orders(), 1);
}

#[test]
fn test_handler_error_reaches_sender() {
    let mediator = Mediator::new();
    let ledger = Arc::new(Ledger::default());
    assert_ok!(mediator.register(&ledger));

    let err = assert_err!(mediator.send(&Order {
        entity: Entity { id: 2 },
        total: 0,
    }));
    assert_eq!(err.to_string(), "handler for type Order failed: order 2 rejected");
    // The entity handler still ran.
    assert_eq!(*ledger.entities.lock(), vec![2]);
}

#[test]
fn test_associated_function_is_shared_per_type() {
    let mediator = Mediator::new();
    let first = Arc::new(Ledger::default());
    let second = Arc::new(Ledger::default());
    assert_ok!(mediator.register(&first));
    assert_ok!(mediator.register(&second));
    assert_eq!(mediator.handler_count(&MessageKey::name("Audit")), 1);

    let before = AUDITED.load(Ordering::SeqCst);
    assert_ok!(mediator.notify("Audit"));
    assert_eq!(AUDITED.load(Ordering::SeqCst), before + 1);

    mediator.unregister(&first);
    assert_eq!(mediator.handler_count(&MessageKey::name("Audit")), 0);
    assert_eq!(mediator.handler_count(&MessageKey::name("Ping")), 1);
}

#[test]
fn test_inherited_handlers() {
    let mediator = Mediator::new();
    let shell = Arc::new(Shell::default());
    assert_ok!(mediator.register(&shell));

    assert_ok!(mediator.notify("Close"));
    assert_ok!(mediator.notify("Ping"));
    assert_eq!(shell.closes.load(Ordering::SeqCst), 1);
    assert_eq!(shell.ledger.pings.load(Ordering::SeqCst), 1);

    drop(shell);
    assert!(!assert_ok!(mediator.notify("Close")));
}

#[test]
fn test_unsupported_and_keyless_handlers_fail_registration() {
    let mediator = Mediator::new();

    let err = assert_err!(mediator.register(&Arc::new(Wide)));
    assert!(matches!(
        err,
        MediatorError::TooManyParameters {
            method: "on_pair",
            count: 2
        }
    ));

    let err = assert_err!(mediator.register(&Arc::new(Keyless)));
    assert!(matches!(err, MediatorError::MissingKey { method: "on_nothing" }));
    assert!(mediator.is_empty());
}
