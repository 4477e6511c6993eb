#![forbid(unsafe_code)]

//! Field-like access to a scalar node held inside an owner.
//!
//! A [`PropertyAdapter`] stores an accessor from an owner to one of its
//! [`AtomicBindable`] fields. `get`/`set` forward to the node; there is no
//! transaction logic of its own.
//!
//! ```
//! use txbind::{AtomicBindableVar, PropertyAdapter};
//!
//! struct Form {
//!     name: AtomicBindableVar<String>,
//! }
//!
//! impl Form {
//!     const NAME: PropertyAdapter<Form, AtomicBindableVar<String>, String> =
//!         PropertyAdapter::new(Form::name_node);
//!
//!     fn name_node(&self) -> &AtomicBindableVar<String> {
//!         &self.name
//!     }
//! }
//!
//! let form = Form { name: AtomicBindableVar::new("a".into()) };
//! Form::NAME.set(&form, "b".into()).unwrap();
//! assert_eq!(Form::NAME.get(&form).unwrap(), "b");
//! ```

use std::fmt;
use std::marker::PhantomData;

use crate::atomic::AtomicBindable;
use crate::error::BindError;

/// Accessor shim exposing a scalar node of `O` as a plain value slot.
pub struct PropertyAdapter<O, N, V> {
    node_of: fn(&O) -> &N,
    _value: PhantomData<fn() -> V>,
}

impl<O, N, V> PropertyAdapter<O, N, V> {
    /// Build an adapter from an accessor to the node.
    pub const fn new(node_of: fn(&O) -> &N) -> Self {
        Self {
            node_of,
            _value: PhantomData,
        }
    }

    /// The node behind the property on `owner`.
    pub fn node<'a>(&self, owner: &'a O) -> &'a N {
        (self.node_of)(owner)
    }
}

impl<O, N: AtomicBindable<V>, V> PropertyAdapter<O, N, V> {
    /// Read the property on `owner`.
    ///
    /// # Errors
    ///
    /// Whatever the node's `get` returns.
    pub fn get(&self, owner: &O) -> Result<V, BindError> {
        self.node(owner).get()
    }

    /// Write the property on `owner`.
    ///
    /// # Errors
    ///
    /// Whatever the node's `set` returns.
    pub fn set(&self, owner: &O, value: V) -> Result<(), BindError> {
        self.node(owner).set(value)
    }
}

impl<O, N, V> Clone for PropertyAdapter<O, N, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<O, N, V> Copy for PropertyAdapter<O, N, V> {}

impl<O, N, V> fmt::Debug for PropertyAdapter<O, N, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyAdapter").finish_non_exhaustive()
    }
}
