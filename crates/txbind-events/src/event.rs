#![forbid(unsafe_code)]

//! The [`Event`] channel and its connection handles.
//!
//! # Usage
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use txbind_events::Event;
//!
//! let event: Event<i32> = Event::new();
//! let seen = Rc::new(Cell::new(0));
//!
//! let s = Rc::clone(&seen);
//! let id = event.subscribe(move |v| s.set(s.get() + *v));
//!
//! event.fire(&2).unwrap();
//! assert_eq!(seen.get(), 2);
//!
//! // Blocked listeners are skipped for this dispatch only.
//! event.fire_blocking(&5, &[id]).unwrap();
//! assert_eq!(seen.get(), 2);
//! ```
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Listener error | Fallible listener returns `Err` | Dispatch stops, error returned |
//! | Unknown id | `disconnect` on an id never seen | Returns `false` |
//! | Dropped event | `Subscription` outlives its event | Drop is a no-op |

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Opaque handle naming one listener connection.
///
/// Ids are process-unique and comparable, so they can be collected into
/// block sets and passed across channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value, for logging.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Default error type for fallible listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerError(String);

impl ListenerError {
    /// Create an error carrying `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// The message supplied by the listener.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener failed: {}", self.0)
    }
}

impl std::error::Error for ListenerError {}

type Handler<A, E> = Rc<dyn Fn(&A) -> Result<(), E>>;

struct Listener<A, E> {
    id: ConnectionId,
    handler: Handler<A, E>,
    live: Rc<Cell<bool>>,
}

impl<A, E> Clone for Listener<A, E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            handler: Rc::clone(&self.handler),
            live: Rc::clone(&self.live),
        }
    }
}

type ListenerList<A, E> = RefCell<Vec<Listener<A, E>>>;

/// Multicast notification channel.
///
/// `Event` is a cheap, cloneable handle: clones share the same listener list.
/// `A` is the argument type delivered to listeners, `E` the error type a
/// fallible listener may return.
pub struct Event<A, E = ListenerError> {
    listeners: Rc<ListenerList<A, E>>,
}

impl<A, E> Clone for Event<A, E> {
    fn clone(&self) -> Self {
        Self {
            listeners: Rc::clone(&self.listeners),
        }
    }
}

impl<A, E> Default for Event<A, E> {
    fn default() -> Self {
        Self {
            listeners: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl<A, E> fmt::Debug for Event<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("listener_count", &self.listeners.borrow().len())
            .finish()
    }
}

impl<A, E> Event<A, E> {
    /// Create an event with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Disconnect the listener `id`. Returns whether it was connected.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        remove_listener(&self.listeners, id)
    }

    /// Whether `id` is currently connected to this event.
    #[must_use]
    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.listeners.borrow().iter().any(|l| l.id == id)
    }

    /// Number of connected listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Deliver `arg` to every listener.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by a listener; later listeners are
    /// not invoked.
    pub fn fire(&self, arg: &A) -> Result<(), E> {
        self.fire_blocking(arg, &[])
    }

    /// Deliver `arg` to every listener whose id is not in `block`.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by a listener; later listeners are
    /// not invoked.
    pub fn fire_blocking(&self, arg: &A, block: &[ConnectionId]) -> Result<(), E> {
        // Listeners may re-enter this event, so never hold the borrow
        // across a handler call.
        let snapshot: Vec<Listener<A, E>> = self.listeners.borrow().clone();
        for listener in &snapshot {
            if !listener.live.get() || block.contains(&listener.id) {
                continue;
            }
            (listener.handler)(arg)?;
        }
        Ok(())
    }
}

impl<A: 'static, E: 'static> Event<A, E> {
    /// Register an infallible listener. Returns its connection id.
    pub fn subscribe(&self, handler: impl Fn(&A) + 'static) -> ConnectionId {
        self.try_subscribe(move |arg| {
            handler(arg);
            Ok(())
        })
    }

    /// Register a listener that may fail. An `Err` stops the dispatch and is
    /// returned from `fire`.
    pub fn try_subscribe(&self, handler: impl Fn(&A) -> Result<(), E> + 'static) -> ConnectionId {
        let id = ConnectionId::next();
        self.listeners.borrow_mut().push(Listener {
            id,
            handler: Rc::new(handler),
            live: Rc::new(Cell::new(true)),
        });
        id
    }

    /// Register a fallible listener and return an RAII guard that disconnects
    /// it when dropped.
    #[must_use = "dropping the subscription disconnects the listener"]
    pub fn connect(&self, handler: impl Fn(&A) -> Result<(), E> + 'static) -> Subscription {
        let id = self.try_subscribe(handler);
        let weak: Weak<ListenerList<A, E>> = Rc::downgrade(&self.listeners);
        Subscription {
            id,
            release: Some(Box::new(move || {
                if let Some(listeners) = weak.upgrade() {
                    remove_listener(&listeners, id);
                }
            })),
        }
    }
}

fn remove_listener<A, E>(listeners: &ListenerList<A, E>, id: ConnectionId) -> bool {
    let removed = {
        let mut list = listeners.borrow_mut();
        let Some(pos) = list.iter().position(|l| l.id == id) else {
            return false;
        };
        list.remove(pos)
    };
    removed.live.set(false);
    true
}

/// RAII guard for a listener connection.
///
/// Dropping the guard disconnects the listener. The guard holds only a weak
/// reference to the event, so it never keeps the event alive.
#[must_use = "dropping the subscription disconnects the listener"]
pub struct Subscription {
    id: ConnectionId,
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// The connection id of the guarded listener.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Disconnect now. Equivalent to dropping the guard.
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    /// Give up the guard and leave the listener connected for the lifetime
    /// of the event.
    pub fn detach(mut self) -> ConnectionId {
        self.release = None;
        self.id
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.release.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn Fn(&i32)>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let make = move |name: &'static str| -> Box<dyn Fn(&i32)> {
            let l = Rc::clone(&l);
            Box::new(move |_| l.borrow_mut().push(name))
        };
        (log, make)
    }

    #[test]
    fn fires_in_subscription_order() {
        let event: Event<i32> = Event::new();
        let (log, make) = recorder();
        event.subscribe(make("a"));
        event.subscribe(make("b"));
        event.subscribe(make("c"));

        event.fire(&1).unwrap();
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn block_skips_only_named_connections() {
        let event: Event<i32> = Event::new();
        let (log, make) = recorder();
        event.subscribe(make("a"));
        let b = event.subscribe(make("b"));
        event.subscribe(make("c"));

        event.fire_blocking(&1, &[b]).unwrap();
        assert_eq!(*log.borrow(), vec!["a", "c"]);

        // Blocking applies to one dispatch only.
        log.borrow_mut().clear();
        event.fire(&1).unwrap();
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn disconnect_removes_listener() {
        let event: Event<i32> = Event::new();
        let (log, make) = recorder();
        let a = event.subscribe(make("a"));
        assert!(event.is_connected(a));
        assert!(event.disconnect(a));
        assert!(!event.disconnect(a));
        assert!(!event.is_connected(a));

        event.fire(&1).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn error_stops_dispatch() {
        let event: Event<i32> = Event::new();
        let (log, make) = recorder();
        event.subscribe(make("a"));
        event.try_subscribe(|v| {
            if *v < 0 {
                Err(ListenerError::new("negative"))
            } else {
                Ok(())
            }
        });
        event.subscribe(make("c"));

        let err = event.fire(&-1).unwrap_err();
        assert_eq!(err.message(), "negative");
        assert_eq!(*log.borrow(), vec!["a"]);
    }

    #[test]
    fn reentrant_fire_uses_snapshot() {
        let event: Event<i32> = Event::new();
        let count = Rc::new(Cell::new(0));

        let ev = event.clone();
        let c = Rc::clone(&count);
        event.subscribe(move |v| {
            c.set(c.get() + 1);
            if *v > 0 {
                ev.fire(&(v - 1)).unwrap();
            }
        });

        event.fire(&3).unwrap();
        assert_eq!(count.get(), 4);
    }

    #[test]
    fn subscribe_during_dispatch_is_not_called_this_round() {
        let event: Event<i32> = Event::new();
        let late_calls = Rc::new(Cell::new(0));

        let ev = event.clone();
        let late = Rc::clone(&late_calls);
        event.subscribe(move |_| {
            let late = Rc::clone(&late);
            ev.subscribe(move |_| late.set(late.get() + 1));
        });

        event.fire(&0).unwrap();
        assert_eq!(late_calls.get(), 0);
        assert_eq!(event.listener_count(), 2);

        event.fire(&0).unwrap();
        assert_eq!(late_calls.get(), 1);
    }

    #[test]
    fn disconnect_during_dispatch_skips_later_listener() {
        let event: Event<i32> = Event::new();
        let (log, make) = recorder();
        let victim = Rc::new(Cell::new(None));

        let ev = event.clone();
        let v = Rc::clone(&victim);
        event.subscribe(move |_| {
            if let Some(id) = v.get() {
                ev.disconnect(id);
            }
        });
        let b = event.subscribe(make("b"));
        victim.set(Some(b));

        event.fire(&0).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn subscription_drop_disconnects() {
        let event: Event<i32> = Event::new();
        let seen = Rc::new(Cell::new(0));
        let s = Rc::clone(&seen);
        let sub = event.connect(move |v| {
            s.set(*v);
            Ok(())
        });
        assert!(event.is_connected(sub.id()));

        event.fire(&7).unwrap();
        drop(sub);
        event.fire(&9).unwrap();
        assert_eq!(seen.get(), 7);
        assert_eq!(event.listener_count(), 0);
    }

    #[test]
    fn subscription_detach_keeps_listener() {
        let event: Event<i32> = Event::new();
        let sub = event.connect(|_| Ok(()));
        let id = sub.detach();
        assert!(event.is_connected(id));
    }

    #[test]
    fn subscription_outliving_event_is_harmless() {
        let event: Event<i32> = Event::new();
        let sub = event.connect(|_| Ok(()));
        drop(event);
        sub.unsubscribe();
    }

    #[test]
    fn connection_ids_are_unique_across_events() {
        let a: Event<i32> = Event::new();
        let b: Event<i32> = Event::new();
        let x = a.subscribe(|_| {});
        let y = b.subscribe(|_| {});
        assert_ne!(x, y);
        assert!(!b.is_connected(x));
    }

    #[test]
    fn debug_reports_listener_count() {
        let event: Event<i32> = Event::new();
        event.subscribe(|_| {});
        event.subscribe(|_| {});
        assert!(format!("{event:?}").contains("listener_count: 2"));
    }

    proptest! {
        #[test]
        fn blocked_listeners_never_fire(mask in proptest::collection::vec(any::<bool>(), 1..16)) {
            let event: Event<i32> = Event::new();
            let fired = Rc::new(RefCell::new(Vec::new()));
            let mut ids = Vec::new();
            for i in 0..mask.len() {
                let f = Rc::clone(&fired);
                ids.push(event.subscribe(move |_| f.borrow_mut().push(i)));
            }
            let block: Vec<ConnectionId> = ids
                .iter()
                .zip(&mask)
                .filter(|&(_, &b)| b)
                .map(|(id, _)| *id)
                .collect();

            event.fire_blocking(&0, &block).unwrap();

            let expected: Vec<usize> = (0..mask.len()).filter(|&i| !mask[i]).collect();
            prop_assert_eq!(fired.borrow().clone(), expected);
        }
    }
}
