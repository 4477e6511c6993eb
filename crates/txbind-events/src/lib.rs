#![forbid(unsafe_code)]

//! Multicast event channel for txbind.
//!
//! An [`Event<A, E>`] holds an ordered list of listeners. Firing delivers the
//! argument to every listener synchronously, in subscription order. A firing
//! may name a *block set* of [`ConnectionId`]s; those listeners are skipped
//! for that one dispatch only.
//!
//! # Invariants
//!
//! 1. Listeners are invoked in subscription order.
//! 2. Dispatch iterates over a snapshot of the listener list, so a listener
//!    may subscribe, disconnect, or re-fire the same event while it runs.
//! 3. A listener disconnected during a dispatch is not invoked later in that
//!    same dispatch.
//! 4. The first listener error stops the dispatch and is returned to the
//!    caller of `fire`.
//! 5. [`ConnectionId`]s are unique for the lifetime of the process, so a
//!    block set can never name a listener of an unrelated event by accident.

pub mod event;

pub use event::{ConnectionId, Event, ListenerError, Subscription};
