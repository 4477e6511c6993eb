#![forbid(unsafe_code)]

//! Bidirectional links between bindable nodes.
//!
//! A [`Binding<A, B>`] joins a source node (emitting `A`, accepting `B`) to a
//! destination node (emitting `B`, accepting `A`). Each direction is a
//! subscription on one node's `on_new_tx` that applies the transaction to
//! the other node, passing the *opposite* subscription as the block set so
//! the other node's re-broadcast cannot come straight back.
//!
//! # Usage
//!
//! ```
//! use txbind::{AtomicBindable, AtomicBindableVar, Binding};
//!
//! let source = AtomicBindableVar::new(42);
//! let target = AtomicBindableVar::new(0);
//! let mut binding = Binding::new(&source, &target).unwrap();
//! assert_eq!(target.get().unwrap(), 42);
//!
//! source.set(10).unwrap();
//! assert_eq!(target.get().unwrap(), 10);
//!
//! target.set(20).unwrap();
//! assert_eq!(source.get().unwrap(), 20);
//!
//! binding.unbind();
//! source.set(1).unwrap();
//! assert_eq!(target.get().unwrap(), 20);
//! ```
//!
//! # Invariants
//!
//! 1. Construction performs exactly one initial sync, chosen by
//!    [`InitialSync`]; the sync is not broadcast.
//! 2. A transaction relayed by a binding is never relayed back by the same
//!    binding.
//! 3. Bindings sharing a node keep independent block sets, so fan-out and
//!    chained graphs propagate normally.
//! 4. After [`Binding::unbind`] (or drop) nothing is relayed and neither node
//!    holds a reference to the other on this binding's account.
//! 5. Cycles of three or more bindings are not supported: a transaction would
//!    travel around the ring indefinitely.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Initial sync fails | Export unreadable, import unwritable | Subscriptions released, error returned |
//! | Relay fails | Far side rejects the transaction | Error returned to the original mutator; nodes may diverge |

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use txbind_events::{ConnectionId, Event, Subscription};

use crate::bindable::Bindable;
use crate::error::BindError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Which side seeds the other when a binding is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitialSync {
    /// Copy the source's state into the destination.
    #[default]
    FromSource,
    /// Copy the destination's state into the source.
    FromDestination,
    /// Leave both sides as they are.
    Skip,
}

/// Options for creating a [`Binding`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingConfig {
    /// Initial synchronization direction.
    pub initial_sync: InitialSync,
    /// Name attached to this binding's log events.
    pub label: Option<String>,
}

impl BindingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial synchronization direction.
    #[must_use]
    pub fn initial_sync(mut self, initial_sync: InitialSync) -> Self {
        self.initial_sync = initial_sync;
        self
    }

    /// Set the log label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// Live bidirectional link between two nodes.
///
/// Drop the `Binding` (or call [`unbind`](Self::unbind)) to disconnect both
/// directions.
#[must_use = "dropping the binding disconnects it"]
pub struct Binding<A, B> {
    forward: Option<Subscription>,
    reverse: Option<Subscription>,
    label: Option<String>,
    _marker: PhantomData<fn(A) -> B>,
}

impl<A, B> Binding<A, B>
where
    A: Clone + Into<B> + 'static,
    B: Clone + Into<A> + 'static,
{
    /// Link `src` and `dst` with the default configuration: `src` seeds
    /// `dst`.
    ///
    /// # Errors
    ///
    /// Fails if the initial sync fails.
    pub fn new<S, D>(src: &S, dst: &D) -> Result<Self, BindError>
    where
        S: Bindable<TxOut = A, TxIn = B> + Clone + 'static,
        D: Bindable<TxOut = B, TxIn = A> + Clone + 'static,
    {
        Self::with_config(src, dst, BindingConfig::default())
    }

    /// Link `src` and `dst`.
    ///
    /// # Errors
    ///
    /// Fails if the initial sync fails. Both subscriptions are released
    /// before the error is returned.
    pub fn with_config<S, D>(src: &S, dst: &D, config: BindingConfig) -> Result<Self, BindError>
    where
        S: Bindable<TxOut = A, TxIn = B> + Clone + 'static,
        D: Bindable<TxOut = B, TxIn = A> + Clone + 'static,
    {
        let BindingConfig {
            initial_sync,
            label,
        } = config;

        // The forward handler must block the reverse connection, which does
        // not exist yet; it reads the id once the reverse side is connected.
        let reverse_id: Rc<Cell<Option<ConnectionId>>> = Rc::new(Cell::new(None));

        let forward = relay(src.on_new_tx(), dst.clone(), Rc::clone(&reverse_id), label.clone());
        let forward_id = Rc::new(Cell::new(Some(forward.id())));
        let reverse = relay(dst.on_new_tx(), src.clone(), forward_id, label.clone());
        reverse_id.set(Some(reverse.id()));

        let mut binding = Self {
            forward: Some(forward),
            reverse: Some(reverse),
            label,
            _marker: PhantomData,
        };
        tracing::debug!(binding = ?binding.label, ?initial_sync, "binding linked");

        let synced = match initial_sync {
            InitialSync::FromSource => sync_into(src, dst),
            InitialSync::FromDestination => sync_into(dst, src),
            InitialSync::Skip => Ok(()),
        };
        if let Err(err) = synced {
            tracing::debug!(binding = ?binding.label, %err, "initial sync failed");
            binding.unbind();
            return Err(err);
        }
        Ok(binding)
    }
}

impl<A, B> Binding<A, B> {
    /// Whether both directions are still connected.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.forward.is_some()
    }

    /// Disconnect both directions. Calling it again is a no-op.
    pub fn unbind(&mut self) {
        if self.forward.is_none() && self.reverse.is_none() {
            return;
        }
        drop(self.forward.take());
        drop(self.reverse.take());
        tracing::debug!(binding = ?self.label, "binding unlinked");
    }

    /// The log label, if one was configured.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Connection ids of the forward (on the source) and reverse (on the
    /// destination) relays, while linked.
    #[must_use]
    pub fn connections(&self) -> Option<(ConnectionId, ConnectionId)> {
        Some((self.forward.as_ref()?.id(), self.reverse.as_ref()?.id()))
    }
}

impl<A, B> Drop for Binding<A, B> {
    fn drop(&mut self) {
        self.unbind();
    }
}

impl<A, B> fmt::Debug for Binding<A, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("label", &self.label)
            .field("linked", &self.is_linked())
            .finish()
    }
}

/// Subscribe to `from` and apply every transaction to `to`, blocking the
/// connection stored in `block`.
fn relay<T, N>(
    from: &Event<T, BindError>,
    to: N,
    block: Rc<Cell<Option<ConnectionId>>>,
    label: Option<String>,
) -> Subscription
where
    T: Clone + Into<N::TxOut> + 'static,
    N: Bindable<TxIn = T> + 'static,
{
    from.connect(move |tx| {
        let blocked = block.get();
        to.apply_tx(tx, blocked.as_slice()).inspect_err(|err| {
            tracing::warn!(binding = ?label, %err, "relayed transaction rejected");
        })
    })
}

fn sync_into<F, T>(from: &F, to: &T) -> Result<(), BindError>
where
    F: Bindable,
    T: Bindable<TxIn = F::TxOut>,
{
    let snapshot = from.export()?;
    to.prepare_import()?;
    // Link-establishment sync: applied, never re-broadcast.
    to.raw_apply_tx(&snapshot).map(drop)
}

// ---------------------------------------------------------------------------
// BindingScope: lifecycle management
// ---------------------------------------------------------------------------

trait Link {
    fn unlink(&mut self);
    fn linked(&self) -> bool;
}

impl<A, B> Link for Binding<A, B> {
    fn unlink(&mut self) {
        self.unbind();
    }

    fn linked(&self) -> bool {
        self.is_linked()
    }
}

impl Link for Option<Subscription> {
    fn unlink(&mut self) {
        if let Some(subscription) = self.take() {
            subscription.unsubscribe();
        }
    }

    fn linked(&self) -> bool {
        self.is_some()
    }
}

/// Collects bindings and subscriptions for a logical owner (e.g. a view).
///
/// When the scope is dropped, everything it holds is released in reverse
/// registration order.
///
/// ```
/// use txbind::{AtomicBindable, AtomicBindableVar, BindingScope};
///
/// let model = AtomicBindableVar::new(1);
/// let view = AtomicBindableVar::new(0);
/// {
///     let mut scope = BindingScope::new();
///     scope.bind(&model, &view).unwrap();
///     model.set(2).unwrap();
///     assert_eq!(view.get().unwrap(), 2);
/// }
/// model.set(3).unwrap();
/// assert_eq!(view.get().unwrap(), 2);
/// ```
#[derive(Default)]
pub struct BindingScope {
    links: Vec<Box<dyn Link>>,
}

impl BindingScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `binding` alive until the scope is cleared or dropped.
    pub fn hold<A: 'static, B: 'static>(&mut self, binding: Binding<A, B>) -> &mut Self {
        self.links.push(Box::new(binding));
        self
    }

    /// Keep `subscription` alive until the scope is cleared or dropped.
    pub fn hold_subscription(&mut self, subscription: Subscription) -> &mut Self {
        self.links.push(Box::new(Some(subscription)));
        self
    }

    /// Bind `src` to `dst` and hold the binding.
    ///
    /// # Errors
    ///
    /// Fails if the initial sync fails; nothing is held in that case.
    pub fn bind<S, D>(&mut self, src: &S, dst: &D) -> Result<&mut Self, BindError>
    where
        S: Bindable + Clone + 'static,
        D: Bindable<TxOut = S::TxIn, TxIn = S::TxOut> + Clone + 'static,
        S::TxOut: Clone + Into<S::TxIn> + 'static,
        S::TxIn: Clone + Into<S::TxOut> + 'static,
    {
        let binding = Binding::new(src, dst)?;
        Ok(self.hold(binding))
    }

    /// Subscribe to `event` for the lifetime of the scope.
    pub fn subscribe<T: 'static>(
        &mut self,
        event: &Event<T, BindError>,
        callback: impl Fn(&T) + 'static,
    ) -> &mut Self {
        let subscription = event.connect(move |arg| {
            callback(arg);
            Ok(())
        });
        self.hold_subscription(subscription)
    }

    /// Number of held bindings and subscriptions that are still linked.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.links.iter().filter(|l| l.linked()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Release everything now, newest first. The scope stays usable.
    pub fn clear(&mut self) {
        while let Some(mut link) = self.links.pop() {
            link.unlink();
        }
    }
}

impl Drop for BindingScope {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for BindingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingScope")
            .field("binding_count", &self.binding_count())
            .finish()
    }
}
