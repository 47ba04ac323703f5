#![forbid(unsafe_code)]

//! Key watches owned by one mounted component.
//!
//! A [`BindingScope`] connects callbacks to effective-value changes of store
//! keys and keeps the [`Subscription`]s alive for as long as its owner (a
//! mounted form) lives.
//!
//! # Invariants
//!
//! 1. Dropping or clearing the scope disconnects every callback before the
//!    next notification cycle.
//! 2. The scope never holds a watcher handle, only subscriptions, so the store
//!    can prune a watcher once its last scope is gone.

use std::fmt;

use subform_core::{KeyPath, SettingValue};

use super::observable::Subscription;
use crate::store::SettingsStore;

/// Owner of the key watches made on behalf of one component.
#[derive(Default)]
pub struct BindingScope {
    subscriptions: Vec<Subscription>,
    keys: Vec<KeyPath>,
}

impl BindingScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `callback` with the effective value of `key` on every change,
    /// for the lifetime of the scope.
    pub fn watch(
        &mut self,
        store: &SettingsStore,
        key: &KeyPath,
        callback: impl Fn(Option<&SettingValue>) + 'static,
    ) -> &mut Self {
        let subscription = store
            .watch(key)
            .subscribe(move |value: &Option<SettingValue>| callback(value.as_ref()));
        self.subscriptions.push(subscription);
        self.keys.push(key.clone());
        self
    }

    /// Watched keys, in the order they were bound.
    #[must_use]
    pub fn keys(&self) -> &[KeyPath] {
        &self.keys
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Disconnect everything now; the scope stays usable.
    pub fn clear(&mut self) {
        self.subscriptions.clear();
        self.keys.clear();
    }
}

impl fmt::Debug for BindingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingScope")
            .field("keys", &self.keys)
            .finish()
    }
}
