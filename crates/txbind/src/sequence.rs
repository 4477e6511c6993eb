#![forbid(unsafe_code)]

//! Mutable-sequence bindable nodes.
//!
//! A [`MutableSequenceBindable`] wraps an ordered, 0-indexed, resizable
//! collection and describes each structural change as a fine-grained
//! [`SequenceTx`] instead of a whole-collection snapshot.
//!
//! # Invariants
//!
//! 1. Every mutating call produces exactly one transaction per primitive
//!    step: `set_item` → `SetItem`, `delete_item` → `DeleteItem`, `insert` →
//!    `Insert`. Convenience methods (`push`, `clear`, `reverse`, …) are built
//!    from those steps and broadcast one transaction per step.
//! 2. `on_setitem` / `on_delitem` / `on_insert` fire for every mutation,
//!    including ones applied from a binding, so local views stay current.
//! 3. A rejected operation leaves the backing unchanged and fires nothing.
//!    `insert` past the end appends instead of failing.
//! 4. `Grouped` members are applied strictly in recorded order; a failing
//!    member stops the group and earlier members stay applied.
//! 5. `export()` is a `Grouped` run of `Insert(i, v)` that rebuilds the
//!    sequence from empty.
//!
//! # Example
//!
//! ```
//! use txbind::{Bindable, ListBindable};
//!
//! let a = ListBindable::from(vec!['x', 'y']);
//! let b = ListBindable::new();
//! let _link = b.bind_from(&a).unwrap();
//! assert_eq!(b.to_vec().unwrap(), vec!['x', 'y']);
//!
//! b.insert(1, 'q').unwrap();
//! assert_eq!(a.to_vec().unwrap(), vec!['x', 'q', 'y']);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use txbind_events::Event;

use crate::bindable::{Bindable, Rebroadcast, TxEvent};
use crate::error::BindError;

/// Incremental sequence transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceTx<V> {
    /// Replace the element at `index`.
    SetItem { index: usize, value: V },
    /// Remove the element at `index`.
    DeleteItem { index: usize },
    /// Insert `value` before the element at `index` (`index >= len` appends).
    Insert { index: usize, value: V },
    /// Apply each member in order.
    Grouped(Vec<SequenceTx<V>>),
}

impl<V> SequenceTx<V> {
    /// Group `txs`, preserving their order.
    pub fn grouped(txs: impl IntoIterator<Item = SequenceTx<V>>) -> Self {
        Self::Grouped(txs.into_iter().collect())
    }

    /// Number of primitive steps, counting through nested groups.
    #[must_use]
    pub fn step_count(&self) -> usize {
        match self {
            Self::Grouped(txs) => txs.iter().map(Self::step_count).sum(),
            _ => 1,
        }
    }
}

/// Storage or proxy behind a sequence node.
///
/// Implementations bounds-check every index and must leave their contents
/// unchanged when returning an error.
pub trait SequenceBacking<V> {
    /// Number of elements.
    fn raw_len(&self) -> usize;

    /// Element at `index`.
    ///
    /// # Errors
    ///
    /// [`BindError::OutOfBounds`] for `index >= len`.
    fn raw_get_item(&self, index: usize) -> Result<V, BindError>;

    /// Replace the element at `index`.
    ///
    /// # Errors
    ///
    /// [`BindError::OutOfBounds`] for `index >= len`.
    fn raw_set_item(&self, index: usize, value: V) -> Result<(), BindError>;

    /// Remove and return the element at `index`.
    ///
    /// # Errors
    ///
    /// [`BindError::OutOfBounds`] for `index >= len`.
    fn raw_delete_item(&self, index: usize) -> Result<V, BindError>;

    /// Insert `value` at `index`, shifting later elements right. An index
    /// past the end appends.
    ///
    /// # Errors
    ///
    /// Backing-specific write failures; never [`BindError::OutOfBounds`].
    fn raw_insert(&self, index: usize, value: V) -> Result<(), BindError>;
}

/// Generic sequence node over a [`SequenceBacking`].
pub struct MutableSequenceBindable<V, B> {
    backing: Rc<B>,
    on_setitem: Event<(usize, V), BindError>,
    on_delitem: Event<usize, BindError>,
    on_insert: Event<(usize, V), BindError>,
    on_new_tx: TxEvent<SequenceTx<V>>,
}

impl<V, B> Clone for MutableSequenceBindable<V, B> {
    fn clone(&self) -> Self {
        Self {
            backing: Rc::clone(&self.backing),
            on_setitem: self.on_setitem.clone(),
            on_delitem: self.on_delitem.clone(),
            on_insert: self.on_insert.clone(),
            on_new_tx: self.on_new_tx.clone(),
        }
    }
}

impl<V: Clone + 'static, B: SequenceBacking<V>> MutableSequenceBindable<V, B> {
    /// Wrap `backing` in a new node with no listeners.
    pub fn with_backing(backing: B) -> Self {
        Self {
            backing: Rc::new(backing),
            on_setitem: Event::new(),
            on_delitem: Event::new(),
            on_insert: Event::new(),
            on_new_tx: TxEvent::new(),
        }
    }

    /// The backing this node reads and writes through.
    #[must_use]
    pub fn backing(&self) -> &B {
        &self.backing
    }

    /// Fires with `(index, value)` after an element is replaced.
    pub fn on_setitem(&self) -> &Event<(usize, V), BindError> {
        &self.on_setitem
    }

    /// Fires with the index after an element is removed.
    pub fn on_delitem(&self) -> &Event<usize, BindError> {
        &self.on_delitem
    }

    /// Fires with `(index, value)` after an element is inserted.
    pub fn on_insert(&self) -> &Event<(usize, V), BindError> {
        &self.on_insert
    }

    /// Whether `self` and `other` are handles to the same node.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.backing, &other.backing)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.backing.raw_len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`.
    ///
    /// # Errors
    ///
    /// [`BindError::OutOfBounds`].
    pub fn get_item(&self, index: usize) -> Result<V, BindError> {
        self.backing.raw_get_item(index)
    }

    /// Copy of every element, in order.
    ///
    /// # Errors
    ///
    /// Propagates backing read failures.
    pub fn to_vec(&self) -> Result<Vec<V>, BindError> {
        (0..self.len()).map(|i| self.get_item(i)).collect()
    }

    /// Iterate over a snapshot taken now; later mutations are not observed.
    ///
    /// # Errors
    ///
    /// Propagates backing read failures.
    pub fn iter(&self) -> Result<std::vec::IntoIter<V>, BindError> {
        Ok(self.to_vec()?.into_iter())
    }

    /// Replace the element at `index` and broadcast `SetItem`.
    ///
    /// # Errors
    ///
    /// [`BindError::OutOfBounds`], or failures downstream of the broadcast.
    pub fn set_item(&self, index: usize, value: V) -> Result<(), BindError> {
        self.write_item(index, value, true)
    }

    /// Remove the element at `index` and broadcast `DeleteItem`.
    ///
    /// # Errors
    ///
    /// [`BindError::OutOfBounds`], or failures downstream of the broadcast.
    pub fn delete_item(&self, index: usize) -> Result<(), BindError> {
        self.remove_item(index, true).map(drop)
    }

    /// Insert `value` at `index` and broadcast `Insert`. An index past the
    /// end appends, and the event and transaction carry the position actually
    /// used.
    ///
    /// # Errors
    ///
    /// Backing write failures, or failures downstream of the broadcast.
    pub fn insert(&self, index: usize, value: V) -> Result<(), BindError> {
        self.insert_item(index, value, true)
    }

    /// Append `value`.
    ///
    /// # Errors
    ///
    /// Failures downstream of the broadcast.
    pub fn push(&self, value: V) -> Result<(), BindError> {
        self.insert(self.len(), value)
    }

    /// Append every element of `values`, one `Insert` each.
    ///
    /// # Errors
    ///
    /// Stops at the first failure; earlier elements stay appended.
    pub fn extend(&self, values: impl IntoIterator<Item = V>) -> Result<(), BindError> {
        for value in values {
            self.push(value)?;
        }
        Ok(())
    }

    /// Remove and return the last element, or `None` when empty.
    ///
    /// # Errors
    ///
    /// Failures downstream of the broadcast.
    pub fn pop(&self) -> Result<Option<V>, BindError> {
        match self.len() {
            0 => Ok(None),
            len => self.remove_item(len - 1, true).map(Some),
        }
    }

    /// Remove and return the element at `index`.
    ///
    /// # Errors
    ///
    /// [`BindError::OutOfBounds`], or failures downstream of the broadcast.
    pub fn remove_at(&self, index: usize) -> Result<V, BindError> {
        self.remove_item(index, true)
    }

    /// Remove every element, last first.
    ///
    /// # Errors
    ///
    /// Stops at the first failure.
    pub fn clear(&self) -> Result<(), BindError> {
        self.clear_items(true)
    }

    /// Reverse in place using pairwise `set_item` swaps.
    ///
    /// # Errors
    ///
    /// Stops at the first failure; the sequence may be partly reversed.
    pub fn reverse(&self) -> Result<(), BindError> {
        let len = self.len();
        for i in 0..len / 2 {
            let j = len - 1 - i;
            let front = self.get_item(i)?;
            let back = self.get_item(j)?;
            self.set_item(i, back)?;
            self.set_item(j, front)?;
        }
        Ok(())
    }

    fn write_item(&self, index: usize, value: V, broadcast: bool) -> Result<(), BindError> {
        self.backing.raw_set_item(index, value.clone())?;
        self.on_setitem.fire(&(index, value.clone()))?;
        if broadcast {
            self.broadcast_tx(&SequenceTx::SetItem { index, value }, &[])?;
        }
        Ok(())
    }

    fn remove_item(&self, index: usize, broadcast: bool) -> Result<V, BindError> {
        let removed = self.backing.raw_delete_item(index)?;
        self.on_delitem.fire(&index)?;
        if broadcast {
            self.broadcast_tx(&SequenceTx::DeleteItem { index }, &[])?;
        }
        Ok(removed)
    }

    fn insert_item(&self, index: usize, value: V, broadcast: bool) -> Result<(), BindError> {
        let index = index.min(self.len());
        self.backing.raw_insert(index, value.clone())?;
        self.on_insert.fire(&(index, value.clone()))?;
        if broadcast {
            self.broadcast_tx(&SequenceTx::Insert { index, value }, &[])?;
        }
        Ok(())
    }

    fn clear_items(&self, broadcast: bool) -> Result<(), BindError> {
        while let Some(last) = self.len().checked_sub(1) {
            self.remove_item(last, broadcast)?;
        }
        Ok(())
    }

    fn apply_silently(&self, tx: &SequenceTx<V>) -> Result<(), BindError> {
        match tx {
            SequenceTx::SetItem { index, value } => self.write_item(*index, value.clone(), false),
            SequenceTx::DeleteItem { index } => self.remove_item(*index, false).map(drop),
            SequenceTx::Insert { index, value } => self.insert_item(*index, value.clone(), false),
            SequenceTx::Grouped(txs) => txs.iter().try_for_each(|tx| self.apply_silently(tx)),
        }
    }
}

impl<V: PartialEq + Clone + 'static, B: SequenceBacking<V>> MutableSequenceBindable<V, B> {
    /// Whether any element equals `value`.
    ///
    /// # Errors
    ///
    /// Propagates backing read failures.
    pub fn contains(&self, value: &V) -> Result<bool, BindError> {
        Ok(self.index_of(value)?.is_some())
    }

    /// Index of the first element equal to `value`.
    ///
    /// # Errors
    ///
    /// Propagates backing read failures.
    pub fn index_of(&self, value: &V) -> Result<Option<usize>, BindError> {
        for i in 0..self.len() {
            if self.get_item(i)? == *value {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    /// Number of elements equal to `value`.
    ///
    /// # Errors
    ///
    /// Propagates backing read failures.
    pub fn count(&self, value: &V) -> Result<usize, BindError> {
        let mut n = 0;
        for i in 0..self.len() {
            if self.get_item(i)? == *value {
                n += 1;
            }
        }
        Ok(n)
    }

    /// Remove the first element equal to `value`. Returns whether one was
    /// found.
    ///
    /// # Errors
    ///
    /// Failures downstream of the broadcast.
    pub fn remove(&self, value: &V) -> Result<bool, BindError> {
        match self.index_of(value)? {
            Some(index) => self.delete_item(index).map(|()| true),
            None => Ok(false),
        }
    }
}

impl<V: Clone + 'static, B: SequenceBacking<V>> Bindable for MutableSequenceBindable<V, B> {
    type TxOut = SequenceTx<V>;
    type TxIn = SequenceTx<V>;

    fn on_new_tx(&self) -> &TxEvent<SequenceTx<V>> {
        &self.on_new_tx
    }

    fn export(&self) -> Result<SequenceTx<V>, BindError> {
        let inserts = self
            .to_vec()?
            .into_iter()
            .enumerate()
            .map(|(index, value)| SequenceTx::Insert { index, value });
        Ok(SequenceTx::grouped(inserts))
    }

    fn raw_apply_tx(&self, tx: &SequenceTx<V>) -> Result<Rebroadcast<SequenceTx<V>>, BindError> {
        self.apply_silently(tx)?;
        Ok(Rebroadcast::Same)
    }

    fn prepare_import(&self) -> Result<(), BindError> {
        self.clear_items(false)
    }
}

impl<V: Clone + fmt::Debug + 'static, B: SequenceBacking<V>> fmt::Debug
    for MutableSequenceBindable<V, B>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_vec() {
            Ok(items) => f.debug_tuple("MutableSequenceBindable").field(&items).finish(),
            Err(err) => f.debug_tuple("MutableSequenceBindable").field(&err).finish(),
        }
    }
}

impl<V: Clone + fmt::Display + 'static, B: SequenceBacking<V>> fmt::Display
    for MutableSequenceBindable<V, B>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for i in 0..self.len() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match self.get_item(i) {
                Ok(item) => write!(f, "{item}")?,
                Err(_) => write!(f, "?")?,
            }
        }
        write!(f, "]")
    }
}

// ---------------------------------------------------------------------------
// ListBacking / ListBindable
// ---------------------------------------------------------------------------

/// In-memory `Vec` backing.
#[derive(Debug)]
pub struct ListBacking<V> {
    items: RefCell<Vec<V>>,
}

impl<V> Default for ListBacking<V> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<V> ListBacking<V> {
    pub fn new(items: Vec<V>) -> Self {
        Self {
            items: RefCell::new(items),
        }
    }
}

fn out_of_bounds(index: usize, len: usize) -> BindError {
    BindError::OutOfBounds { index, len }
}

impl<V: Clone> SequenceBacking<V> for ListBacking<V> {
    fn raw_len(&self) -> usize {
        self.items.borrow().len()
    }

    fn raw_get_item(&self, index: usize) -> Result<V, BindError> {
        let items = self.items.borrow();
        items
            .get(index)
            .cloned()
            .ok_or_else(|| out_of_bounds(index, items.len()))
    }

    fn raw_set_item(&self, index: usize, value: V) -> Result<(), BindError> {
        let mut items = self.items.borrow_mut();
        let len = items.len();
        let slot = items.get_mut(index).ok_or_else(|| out_of_bounds(index, len))?;
        *slot = value;
        Ok(())
    }

    fn raw_delete_item(&self, index: usize) -> Result<V, BindError> {
        let mut items = self.items.borrow_mut();
        if index >= items.len() {
            return Err(out_of_bounds(index, items.len()));
        }
        Ok(items.remove(index))
    }

    fn raw_insert(&self, index: usize, value: V) -> Result<(), BindError> {
        let mut items = self.items.borrow_mut();
        let index = index.min(items.len());
        items.insert(index, value);
        Ok(())
    }
}

/// Sequence node over an in-memory `Vec`.
pub type ListBindable<V> = MutableSequenceBindable<V, ListBacking<V>>;

impl<V: Clone + 'static> MutableSequenceBindable<V, ListBacking<V>> {
    /// An empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::with_backing(ListBacking::default())
    }
}

impl<V: Clone + 'static> Default for MutableSequenceBindable<V, ListBacking<V>> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + 'static> From<Vec<V>> for MutableSequenceBindable<V, ListBacking<V>> {
    fn from(items: Vec<V>) -> Self {
        Self::with_backing(ListBacking::new(items))
    }
}

impl<V: Clone + 'static> FromIterator<V> for MutableSequenceBindable<V, ListBacking<V>> {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}
