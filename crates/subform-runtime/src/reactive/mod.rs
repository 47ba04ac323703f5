#![forbid(unsafe_code)]

//! Change-tracking primitives behind the settings store.
//!
//! - [`Observable`]: shared, version-tracked value with subscriber callbacks.
//! - [`Subscription`]: RAII guard; dropping it unsubscribes.
//! - [`BatchScope`]: defers notifications until the outermost scope exits.
//! - [`BindingScope`]: owns the store key watches of one component.
//!
//! # Architecture
//!
//! Everything is single-threaded: `Rc<RefCell<..>>` shared state, `Weak`
//! subscriber lists cleaned lazily during notification, and a thread-local
//! batch context.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation that changes the value.
//! 2. Subscribers are notified in registration order.
//! 3. Setting a value equal to the current value is a no-op (no version bump,
//!    no notifications).
//! 4. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle.
//! 5. Within a `BatchScope`, values are updated immediately but notifications
//!    are deferred until the outermost scope exits.

pub mod batch;
pub mod binding;
pub mod observable;

pub use batch::BatchScope;
pub use binding::BindingScope;
pub use observable::{Observable, Subscription};
