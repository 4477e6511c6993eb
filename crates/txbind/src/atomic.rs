#![forbid(unsafe_code)]

//! Scalar bindable nodes.
//!
//! - [`AtomicBindable`]: the scalar node contract (`get`, `set`, `on_changed`).
//! - [`BaseAtomicBindable`]: the generic implementation over an
//!   [`AtomicBacking`].
//! - [`AtomicBindableVar`]: stores its value directly ([`ValueSlot`]).
//! - [`AtomicBindableAdapter`]: proxies an external getter/setter pair
//!   ([`AccessorBacking`]); call [`BaseAtomicBindable::poke`] when the external
//!   value changes behind the adapter's back.
//!
//! # Invariants
//!
//! 1. After `set(v)` succeeds, `get()` returns `v` for untransformed backings.
//! 2. `on_changed` fires on every mutation, local or applied from a binding.
//! 3. A local `set` broadcasts one [`AtomicTx`]; an applied transaction is not
//!    broadcast by the write itself, only re-announced by
//!    [`Bindable::apply_tx`] under the relaying binding's block set.
//! 4. A failed backing write fires nothing and broadcasts nothing.
//!
//! # Example
//!
//! ```
//! use txbind::{AtomicBindable, AtomicBindableVar, Bindable};
//!
//! let a = AtomicBindableVar::new(5);
//! let b = AtomicBindableVar::new(0);
//! let _link = b.bind_from(&a).unwrap();
//! assert_eq!(b.get().unwrap(), 5);
//!
//! b.set(9).unwrap();
//! assert_eq!(a.get().unwrap(), 9);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use txbind_events::Event;

use crate::bindable::{Bindable, Rebroadcast, TxEvent};
use crate::error::BindError;

/// Scalar transaction: carries exactly the new value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AtomicTx<V> {
    value: V,
}

impl<V> AtomicTx<V> {
    /// A transaction that sets the target's value to `value`.
    pub fn new(value: V) -> Self {
        Self { value }
    }

    /// The carried value.
    #[must_use]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Take the carried value.
    pub fn into_value(self) -> V {
        self.value
    }
}

/// Scalar node contract.
pub trait AtomicBindable<V>: Bindable<TxOut = AtomicTx<V>, TxIn = AtomicTx<V>> {
    /// Fires with the new value after every mutation.
    fn on_changed(&self) -> &Event<V, BindError>;

    /// Current value.
    ///
    /// # Errors
    ///
    /// [`BindError::Unreadable`] if the backing cannot be read.
    fn get(&self) -> Result<V, BindError>;

    /// Write `value`, notify `on_changed`, and broadcast it.
    ///
    /// # Errors
    ///
    /// Backing write failures, or failures from listeners and bindings
    /// downstream of the broadcast.
    fn set(&self, value: V) -> Result<(), BindError>;
}

/// Storage or proxy behind a scalar node.
///
/// Implementations must satisfy `raw_set(v)` ⇒ `raw_get() == v`. Methods take
/// `&self` so a backing can be read re-entrantly while a write is in flight
/// (e.g. an external setter that synchronously triggers `poke`).
pub trait AtomicBacking<V> {
    /// Read the stored value.
    ///
    /// # Errors
    ///
    /// [`BindError::Unreadable`] when there is nothing to read from.
    fn raw_get(&self) -> Result<V, BindError>;

    /// Store `value`.
    ///
    /// # Errors
    ///
    /// [`BindError::Unwritable`] when there is nothing to write to.
    fn raw_set(&self, value: V) -> Result<(), BindError>;
}

/// Generic scalar node over an [`AtomicBacking`].
pub struct BaseAtomicBindable<V, B> {
    backing: Rc<B>,
    on_changed: Event<V, BindError>,
    on_new_tx: TxEvent<AtomicTx<V>>,
}

impl<V, B> Clone for BaseAtomicBindable<V, B> {
    fn clone(&self) -> Self {
        Self {
            backing: Rc::clone(&self.backing),
            on_changed: self.on_changed.clone(),
            on_new_tx: self.on_new_tx.clone(),
        }
    }
}

impl<V: Clone + 'static, B: AtomicBacking<V>> BaseAtomicBindable<V, B> {
    /// Wrap `backing` in a new node with no listeners.
    pub fn with_backing(backing: B) -> Self {
        Self {
            backing: Rc::new(backing),
            on_changed: Event::new(),
            on_new_tx: TxEvent::new(),
        }
    }

    /// The backing this node reads and writes through.
    #[must_use]
    pub fn backing(&self) -> &B {
        &self.backing
    }

    /// Re-read the backing and announce its value as if it had been `set`,
    /// without writing.
    ///
    /// # Errors
    ///
    /// [`BindError::Unreadable`], or failures downstream of the broadcast.
    pub fn poke(&self) -> Result<(), BindError> {
        let value = self.backing.raw_get()?;
        self.value_changed(value, true)
    }

    /// Whether `self` and `other` are handles to the same node.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.backing, &other.backing)
    }

    fn write(&self, value: V, broadcast: bool) -> Result<(), BindError> {
        self.backing.raw_set(value.clone())?;
        self.value_changed(value, broadcast)
    }

    fn value_changed(&self, value: V, broadcast: bool) -> Result<(), BindError> {
        self.on_changed.fire(&value)?;
        if broadcast {
            self.broadcast_tx(&AtomicTx::new(value), &[])?;
        }
        Ok(())
    }
}

impl<V: Clone + 'static, B: AtomicBacking<V>> Bindable for BaseAtomicBindable<V, B> {
    type TxOut = AtomicTx<V>;
    type TxIn = AtomicTx<V>;

    fn on_new_tx(&self) -> &TxEvent<AtomicTx<V>> {
        &self.on_new_tx
    }

    fn export(&self) -> Result<AtomicTx<V>, BindError> {
        Ok(AtomicTx::new(self.backing.raw_get()?))
    }

    fn raw_apply_tx(&self, tx: &AtomicTx<V>) -> Result<Rebroadcast<AtomicTx<V>>, BindError> {
        self.write(tx.value().clone(), false)?;
        Ok(Rebroadcast::Same)
    }
}

impl<V: Clone + 'static, B: AtomicBacking<V>> AtomicBindable<V> for BaseAtomicBindable<V, B> {
    fn on_changed(&self) -> &Event<V, BindError> {
        &self.on_changed
    }

    fn get(&self) -> Result<V, BindError> {
        self.backing.raw_get()
    }

    fn set(&self, value: V) -> Result<(), BindError> {
        self.write(value, true)
    }
}

impl<V: Clone + fmt::Debug + 'static, B: AtomicBacking<V>> fmt::Debug for BaseAtomicBindable<V, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicBindable")
            .field("value", &self.backing.raw_get().ok())
            .field("listeners", &self.on_new_tx.listener_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ValueSlot / AtomicBindableVar
// ---------------------------------------------------------------------------

/// Backing that owns its value.
#[derive(Debug, Default)]
pub struct ValueSlot<V> {
    value: RefCell<V>,
}

impl<V> ValueSlot<V> {
    /// A slot holding `initial`.
    pub fn new(initial: V) -> Self {
        Self {
            value: RefCell::new(initial),
        }
    }
}

impl<V: Clone> AtomicBacking<V> for ValueSlot<V> {
    fn raw_get(&self) -> Result<V, BindError> {
        Ok(self.value.borrow().clone())
    }

    fn raw_set(&self, value: V) -> Result<(), BindError> {
        *self.value.borrow_mut() = value;
        Ok(())
    }
}

/// Scalar node that stores its value directly.
pub type AtomicBindableVar<V> = BaseAtomicBindable<V, ValueSlot<V>>;

impl<V: Clone + 'static> BaseAtomicBindable<V, ValueSlot<V>> {
    /// A node holding `initial`.
    pub fn new(initial: V) -> Self {
        Self::with_backing(ValueSlot::new(initial))
    }
}

impl<V: Clone + Default + 'static> Default for BaseAtomicBindable<V, ValueSlot<V>> {
    fn default() -> Self {
        Self::new(V::default())
    }
}

// ---------------------------------------------------------------------------
// AccessorBacking / AtomicBindableAdapter
// ---------------------------------------------------------------------------

type Getter<V> = Rc<dyn Fn() -> V>;
type Setter<V> = Rc<dyn Fn(V)>;

/// Backing that proxies an external getter and setter.
///
/// Either half may be absent: reading without a getter fails with
/// [`BindError::Unreadable`], writing without a setter with
/// [`BindError::Unwritable`]. Both halves can be replaced at any time.
pub struct AccessorBacking<V> {
    getter: RefCell<Option<Getter<V>>>,
    setter: RefCell<Option<Setter<V>>>,
}

impl<V> Default for AccessorBacking<V> {
    fn default() -> Self {
        Self {
            getter: RefCell::new(None),
            setter: RefCell::new(None),
        }
    }
}

impl<V> AccessorBacking<V> {
    /// Replace the getter.
    pub fn set_getter(&self, getter: impl Fn() -> V + 'static) {
        *self.getter.borrow_mut() = Some(Rc::new(getter));
    }

    /// Replace the setter.
    pub fn set_setter(&self, setter: impl Fn(V) + 'static) {
        *self.setter.borrow_mut() = Some(Rc::new(setter));
    }

    /// Remove the getter; later reads fail with [`BindError::Unreadable`].
    pub fn clear_getter(&self) {
        self.getter.borrow_mut().take();
    }

    /// Remove the setter; later writes fail with [`BindError::Unwritable`].
    pub fn clear_setter(&self) {
        self.setter.borrow_mut().take();
    }

    /// Whether a getter is installed.
    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.getter.borrow().is_some()
    }

    /// Whether a setter is installed.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.setter.borrow().is_some()
    }
}

impl<V> AtomicBacking<V> for AccessorBacking<V> {
    fn raw_get(&self) -> Result<V, BindError> {
        // Clone the handle out so the getter may touch this backing again.
        let getter = self.getter.borrow().clone().ok_or(BindError::Unreadable)?;
        Ok(getter())
    }

    fn raw_set(&self, value: V) -> Result<(), BindError> {
        let setter = self.setter.borrow().clone().ok_or(BindError::Unwritable)?;
        setter(value);
        Ok(())
    }
}

impl<V> fmt::Debug for AccessorBacking<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessorBacking")
            .field("readable", &self.is_readable())
            .field("writable", &self.is_writable())
            .finish()
    }
}

/// Scalar node over an external getter/setter pair.
pub type AtomicBindableAdapter<V> = BaseAtomicBindable<V, AccessorBacking<V>>;

impl<V: Clone + 'static> BaseAtomicBindable<V, AccessorBacking<V>> {
    /// An adapter with both a getter and a setter.
    pub fn new(getter: impl Fn() -> V + 'static, setter: impl Fn(V) + 'static) -> Self {
        let adapter = Self::detached();
        adapter.backing().set_getter(getter);
        adapter.backing().set_setter(setter);
        adapter
    }

    /// An adapter that can be read but not written.
    pub fn read_only(getter: impl Fn() -> V + 'static) -> Self {
        let adapter = Self::detached();
        adapter.backing().set_getter(getter);
        adapter
    }

    /// An adapter that can be written but not read.
    pub fn write_only(setter: impl Fn(V) + 'static) -> Self {
        let adapter = Self::detached();
        adapter.backing().set_setter(setter);
        adapter
    }

    /// An adapter with neither half installed yet.
    pub fn detached() -> Self {
        Self::with_backing(AccessorBacking::default())
    }
}
