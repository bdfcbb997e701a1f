use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

/// Trait implemented by payload types that can be carried on the bus.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

/// Trait implemented by subscription keys (notification kinds).
pub trait BusKey: Copy + Eq + Hash + Send + Sync + std::fmt::Debug + 'static {}

impl<T> BusKey for T where T: Copy + Eq + Hash + Send + Sync + std::fmt::Debug + 'static {}

pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Token returned from `subscribe`, used to detach a subscriber again.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SubscriberId(u64);

struct BusInner<K, E> {
    next_id: u64,
    subscribers: HashMap<K, Vec<(u64, Handler<E>)>>,
}

/// Synchronous publish/subscribe bus keyed by notification kind.
///
/// Delivery happens on the publisher's call stack, in registration order.
/// A subscriber that panics is isolated: the panic is caught, logged, and
/// delivery continues with the next subscriber.
pub struct SyncBus<K, E>
where
    K: BusKey,
    E: Event,
{
    inner: RwLock<BusInner<K, E>>,
}

impl<K, E> SyncBus<K, E>
where
    K: BusKey,
    E: Event,
{
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(BusInner {
                next_id: 0,
                subscribers: HashMap::new(),
            }),
        })
    }

    pub fn subscribe<F>(&self, key: K, handler: F) -> SubscriberId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut inner = self.inner.write();
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .subscribers
            .entry(key)
            .or_default()
            .push((id, Arc::new(handler)));
        SubscriberId(id)
    }

    /// Detaches a subscriber. Returns false when the token is unknown.
    pub fn unsubscribe(&self, key: K, id: SubscriberId) -> bool {
        let mut inner = self.inner.write();
        if let Some(handlers) = inner.subscribers.get_mut(&key) {
            let before = handlers.len();
            handlers.retain(|(handler_id, _)| *handler_id != id.0);
            return handlers.len() != before;
        }
        false
    }

    pub fn subscriber_count(&self, key: K) -> usize {
        self.inner
            .read()
            .subscribers
            .get(&key)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Delivers `event` to every subscriber registered for `key`.
    ///
    /// The handler list is snapshotted before delivery, so handlers may
    /// subscribe or unsubscribe from inside a callback without deadlocking.
    pub fn publish(&self, key: K, event: &E) {
        let handlers: Vec<Handler<E>> = {
            let inner = self.inner.read();
            match inner.subscribers.get(&key) {
                Some(handlers) => handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return,
            }
        };
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!(?key, "bus subscriber panicked, skipping");
            }
        }
    }
}
