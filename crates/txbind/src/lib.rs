#![forbid(unsafe_code)]

//! Transaction-based two-way data binding.
//!
//! Two independently owned values (or sequences) stay synchronized without
//! either side knowing the other's concrete type or storage. Every change is
//! described as a replayable transaction; a [`Binding`] relays transactions
//! between two nodes and suppresses echo with per-dispatch block sets.
//!
//! - [`Bindable`]: the abstract node (`on_new_tx`, `apply_tx`, `export`).
//! - [`AtomicBindableVar`] / [`AtomicBindableAdapter`]: scalar nodes.
//! - [`ListBindable`]: sequence node with incremental [`SequenceTx`]s.
//! - [`Binding`] / [`BindingScope`]: link lifecycle.
//! - [`PropertyAdapter`]: field-like access to a scalar node.
//!
//! # Architecture
//!
//! Nodes are cheap `Rc` handles for single-threaded use. Dispatch is
//! synchronous and re-entrant: a listener may mutate the node that is
//! currently firing. Backings are borrowed only for the duration of one raw
//! read or write, never across an event dispatch.
//!
//! # Logging
//!
//! Binding lifecycle is reported at `debug`, every apply and broadcast at
//! `trace`, and rejected relays at `warn`, through `tracing`. No subscriber is
//! installed by this crate.

pub mod atomic;
pub mod bindable;
pub mod binding;
pub mod error;
pub mod property;
pub mod sequence;

pub use atomic::{
    AccessorBacking, AtomicBacking, AtomicBindable, AtomicBindableAdapter, AtomicBindableVar,
    AtomicTx, BaseAtomicBindable, ValueSlot,
};
pub use bindable::{Bindable, Rebroadcast, TxEvent};
pub use binding::{Binding, BindingConfig, BindingScope, InitialSync};
pub use error::BindError;
pub use property::PropertyAdapter;
pub use sequence::{
    ListBacking, ListBindable, MutableSequenceBindable, SequenceBacking, SequenceTx,
};
pub use txbind_events::{ConnectionId, Event, Subscription};
