#![forbid(unsafe_code)]

//! The abstract transactional node.
//!
//! A [`Bindable`] publishes outbound transactions on [`Bindable::on_new_tx`]
//! and accepts inbound ones through [`Bindable::apply_tx`]. Nodes never learn
//! about each other directly: a [`Binding`] subscribes to one node's outbound
//! stream and feeds the other node's inbound entry point.
//!
//! # Echo suppression
//!
//! `apply_tx` takes a block set of [`ConnectionId`]s. After the node applies
//! the transaction it re-broadcasts the result with that block set, so the
//! binding that delivered the transaction does not hear it back while every
//! other listener on the node still does. This is what keeps chained and
//! fan-out binding graphs consistent without loops.
//!
//! # Rebroadcast
//!
//! [`Bindable::raw_apply_tx`] reports what to re-broadcast:
//!
//! | Value | Meaning |
//! |-------|---------|
//! | `Rebroadcast::Same` | Re-broadcast the inbound transaction unchanged |
//! | `Rebroadcast::Only(txs)` | Re-broadcast exactly `txs`, in order |
//! | `Rebroadcast::Only(vec![])` | Apply silently |

use txbind_events::{ConnectionId, Event};

use crate::binding::{Binding, BindingConfig};
use crate::error::BindError;

/// Outbound transaction channel of a node.
pub type TxEvent<Tx> = Event<Tx, BindError>;

/// What a node re-broadcasts after applying an inbound transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rebroadcast<Tx> {
    /// Pass the inbound transaction through unchanged.
    Same,
    /// Broadcast exactly these transactions. Empty means silent.
    Only(Vec<Tx>),
}

impl<Tx> Rebroadcast<Tx> {
    /// Apply without broadcasting anything.
    #[must_use]
    pub fn silent() -> Self {
        Self::Only(Vec::new())
    }

    /// Whether nothing will be broadcast.
    #[must_use]
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Only(txs) if txs.is_empty())
    }
}

/// A node that produces `TxOut` transactions and consumes `TxIn` ones.
///
/// Implementors are cheap handles (clones share state), which is what lets a
/// [`Binding`] capture both ends in its relay closures.
pub trait Bindable {
    /// Transactions this node broadcasts.
    type TxOut;
    /// Transactions this node accepts.
    type TxIn;

    /// Outbound transaction stream.
    fn on_new_tx(&self) -> &TxEvent<Self::TxOut>;

    /// A transaction that, applied to an empty node of the same backing,
    /// reproduces this node's observable state.
    ///
    /// # Errors
    ///
    /// Propagates backing read failures.
    fn export(&self) -> Result<Self::TxOut, BindError>;

    /// Apply `tx` to the backing and report what should be re-broadcast.
    ///
    /// # Errors
    ///
    /// Propagates backing and listener failures unchanged.
    fn raw_apply_tx(&self, tx: &Self::TxIn) -> Result<Rebroadcast<Self::TxOut>, BindError>;

    /// Reset before receiving an initial sync. Default: nothing to reset.
    ///
    /// # Errors
    ///
    /// Propagates backing and listener failures unchanged.
    fn prepare_import(&self) -> Result<(), BindError> {
        Ok(())
    }

    /// Apply `tx`, then broadcast the resulting transactions to every
    /// listener not named in `block`.
    ///
    /// # Errors
    ///
    /// Returns the first failure from the backing or from a downstream
    /// listener. Changes already made are not rolled back.
    fn apply_tx(&self, tx: &Self::TxIn, block: &[ConnectionId]) -> Result<(), BindError>
    where
        Self::TxIn: Clone + Into<Self::TxOut>,
    {
        tracing::trace!(blocked = block.len(), "applying transaction");
        match self.raw_apply_tx(tx)? {
            Rebroadcast::Same => self.broadcast_tx(&tx.clone().into(), block),
            Rebroadcast::Only(txs) => {
                for new_tx in &txs {
                    self.broadcast_tx(new_tx, block)?;
                }
                Ok(())
            }
        }
    }

    /// Fire `on_new_tx` with `tx`, skipping listeners in `block`.
    ///
    /// # Errors
    ///
    /// Returns the first listener failure.
    fn broadcast_tx(&self, tx: &Self::TxOut, block: &[ConnectionId]) -> Result<(), BindError> {
        tracing::trace!(
            listeners = self.on_new_tx().listener_count(),
            blocked = block.len(),
            "broadcasting transaction"
        );
        self.on_new_tx().fire_blocking(tx, block)
    }

    /// Link `src` to this node; `src` is authoritative for the initial sync.
    ///
    /// # Errors
    ///
    /// Fails if the initial sync fails; no binding is left behind.
    fn bind_from<S>(&self, src: &S) -> Result<Binding<Self::TxIn, Self::TxOut>, BindError>
    where
        Self: Sized + Clone + 'static,
        S: Bindable<TxOut = Self::TxIn, TxIn = Self::TxOut> + Clone + 'static,
        Self::TxIn: Clone + Into<Self::TxOut> + 'static,
        Self::TxOut: Clone + Into<Self::TxIn> + 'static,
    {
        Binding::new(src, self)
    }

    /// [`bind_from`](Self::bind_from) with explicit configuration.
    ///
    /// # Errors
    ///
    /// Fails if the initial sync fails; no binding is left behind.
    fn bind_from_with<S>(
        &self,
        src: &S,
        config: BindingConfig,
    ) -> Result<Binding<Self::TxIn, Self::TxOut>, BindError>
    where
        Self: Sized + Clone + 'static,
        S: Bindable<TxOut = Self::TxIn, TxIn = Self::TxOut> + Clone + 'static,
        Self::TxIn: Clone + Into<Self::TxOut> + 'static,
        Self::TxOut: Clone + Into<Self::TxIn> + 'static,
    {
        Binding::with_config(src, self, config)
    }

    /// Link this node to `dst`; this node is authoritative for the initial
    /// sync.
    ///
    /// # Errors
    ///
    /// Fails if the initial sync fails; no binding is left behind.
    fn bind_to<D>(&self, dst: &D) -> Result<Binding<Self::TxOut, Self::TxIn>, BindError>
    where
        Self: Sized + Clone + 'static,
        D: Bindable<TxOut = Self::TxIn, TxIn = Self::TxOut> + Clone + 'static,
        Self::TxIn: Clone + Into<Self::TxOut> + 'static,
        Self::TxOut: Clone + Into<Self::TxIn> + 'static,
    {
        Binding::new(self, dst)
    }

    /// [`bind_to`](Self::bind_to) with explicit configuration.
    ///
    /// # Errors
    ///
    /// Fails if the initial sync fails; no binding is left behind.
    fn bind_to_with<D>(
        &self,
        dst: &D,
        config: BindingConfig,
    ) -> Result<Binding<Self::TxOut, Self::TxIn>, BindError>
    where
        Self: Sized + Clone + 'static,
        D: Bindable<TxOut = Self::TxIn, TxIn = Self::TxOut> + Clone + 'static,
        Self::TxIn: Clone + Into<Self::TxOut> + 'static,
        Self::TxOut: Clone + Into<Self::TxIn> + 'static,
    {
        Binding::with_config(self, dst, config)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    /// A node that records applied transactions and splits each one into a
    /// configurable rebroadcast.
    #[derive(Clone)]
    struct Recorder {
        applied: Rc<RefCell<Vec<u32>>>,
        mode: Rc<RefCell<Rebroadcast<u32>>>,
        on_new_tx: TxEvent<u32>,
    }

    impl Recorder {
        fn new(mode: Rebroadcast<u32>) -> Self {
            Self {
                applied: Rc::default(),
                mode: Rc::new(RefCell::new(mode)),
                on_new_tx: TxEvent::new(),
            }
        }
    }

    impl Bindable for Recorder {
        type TxOut = u32;
        type TxIn = u32;

        fn on_new_tx(&self) -> &TxEvent<u32> {
            &self.on_new_tx
        }

        fn export(&self) -> Result<u32, BindError> {
            Ok(self.applied.borrow().last().copied().unwrap_or_default())
        }

        fn raw_apply_tx(&self, tx: &u32) -> Result<Rebroadcast<u32>, BindError> {
            self.applied.borrow_mut().push(*tx);
            Ok(self.mode.borrow().clone())
        }
    }

    fn capture(node: &Recorder) -> (Rc<RefCell<Vec<u32>>>, ConnectionId) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let id = node.on_new_tx().subscribe(move |tx| s.borrow_mut().push(*tx));
        (seen, id)
    }

    #[test]
    fn same_rebroadcasts_inbound_tx() {
        let node = Recorder::new(Rebroadcast::Same);
        let (seen, _) = capture(&node);

        node.apply_tx(&7, &[]).unwrap();
        assert_eq!(*node.applied.borrow(), vec![7]);
        assert_eq!(*seen.borrow(), vec![7]);
    }

    #[test]
    fn only_rebroadcasts_listed_txs_in_order() {
        let node = Recorder::new(Rebroadcast::Only(vec![1, 2, 3]));
        let (seen, _) = capture(&node);

        node.apply_tx(&9, &[]).unwrap();
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn silent_broadcasts_nothing() {
        let node = Recorder::new(Rebroadcast::silent());
        assert!(node.mode.borrow().is_silent());
        let (seen, _) = capture(&node);

        node.apply_tx(&9, &[]).unwrap();
        assert_eq!(*node.applied.borrow(), vec![9]);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn block_set_applies_to_every_rebroadcast() {
        let node = Recorder::new(Rebroadcast::Only(vec![1, 2]));
        let (blocked, blocked_id) = capture(&node);
        let (open, _) = capture(&node);

        node.apply_tx(&0, &[blocked_id]).unwrap();
        assert!(blocked.borrow().is_empty());
        assert_eq!(*open.borrow(), vec![1, 2]);
    }

    #[test]
    fn listener_failure_surfaces_from_apply() {
        let node = Recorder::new(Rebroadcast::Same);
        node.on_new_tx()
            .try_subscribe(|_| Err(BindError::Listener("full".into())));

        let err = node.apply_tx(&1, &[]).unwrap_err();
        assert_eq!(err, BindError::Listener("full".into()));
        // The backing change is not rolled back.
        assert_eq!(*node.applied.borrow(), vec![1]);
    }
}
