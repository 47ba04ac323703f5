#![forbid(unsafe_code)]

//! The settings store: binding context for every control on a form.
//!
//! [`SettingsStore`] owns the committed [`SettingsDocument`], the
//! [`PendingOverlay`] of unsaved writes, one [`Observable`] per watched key, and
//! the [`Persistence`] collaborator. It is passed explicitly to whatever binds
//! to it; there is no global store.
//!
//! # Write lifecycle
//!
//! ```text
//! write(key, v) ──► overlay[key] = Staged | InFlight(t) ──► watchers(key) fire
//!                                         │
//!                         persistence.commit(t, key, v)
//!                                         │
//! apply_outcome(t, Success) ──► committed[key] = v, overlay[key] removed
//! apply_outcome(t, Failure) ──► overlay[key] = Failed (not effective)
//! apply_outcome(t', _)      ──► t' superseded or reverted: ignored
//! ```
//!
//! # Invariants
//!
//! 1. **Read-your-write**: after `write(key, v)` returns, `resolve(key)` yields
//!    `v` until the write is reverted, superseded, or fails.
//! 2. **Copy-on-write snapshots**: committed document and overlay sit behind
//!    `Rc`; a mutation clones them only if a [`Snapshot`] still shares them,
//!    so an outstanding snapshot never changes.
//! 3. **No borrow across notification**: every interior borrow is released
//!    before an observable is set, so subscribers may call back into the
//!    store.
//! 4. **Per-key order**: requests for one key are dispatched in issue order;
//!    only the newest ticket per key is live.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ahash::AHashMap;
use subform_core::{
    CommitTicket, KeyPath, OverlayStatus, PendingOverlay, Resolution, Resolve, SettingValue,
    SettingsDocument, Snapshot, Source,
};

use crate::config::{CommitMode, StoreConfig};
use crate::persistence::{CommitOutcome, CommitRequest, OutcomeReceiver, Persistence};
use crate::reactive::{BatchScope, Observable, Subscription};

/// What a write did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub key: KeyPath,
    /// Ticket of the dispatched request; `None` when staged.
    pub ticket: Option<CommitTicket>,
    /// In-flight ticket this write replaced.
    pub superseded: Option<CommitTicket>,
}

/// How a commit outcome was reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// The value is now part of the committed document.
    Committed(KeyPath),
    /// Persistence rejected the write; the key shows its committed value.
    Failed { key: KeyPath, reason: String },
    /// The ticket was superseded or reverted; the outcome was ignored.
    Superseded(CommitTicket),
}

struct StoreInner {
    config: StoreConfig,
    committed: RefCell<Rc<SettingsDocument>>,
    overlay: RefCell<Rc<PendingOverlay>>,
    watchers: RefCell<AHashMap<KeyPath, Observable<Option<SettingValue>>>>,
    persistence: RefCell<Box<dyn Persistence>>,
    in_flight: RefCell<AHashMap<CommitTicket, KeyPath>>,
    next_ticket: Cell<u64>,
    revision: Observable<u64>,
}

/// Shared handle to one settings store. Clones address the same store.
#[derive(Clone)]
pub struct SettingsStore {
    inner: Rc<StoreInner>,
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("config", &self.inner.config)
            .field("pending", &self.inner.overlay.borrow().len())
            .field("in_flight", &self.inner.in_flight.borrow().len())
            .field("revision", &self.inner.revision.get())
            .finish()
    }
}

impl SettingsStore {
    /// Empty store with the default configuration.
    pub fn new(persistence: impl Persistence + 'static) -> Self {
        Self::with_config(StoreConfig::default(), persistence)
    }

    /// Empty store with an explicit configuration.
    pub fn with_config(config: StoreConfig, persistence: impl Persistence + 'static) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                config,
                committed: RefCell::new(Rc::new(SettingsDocument::new())),
                overlay: RefCell::new(Rc::new(PendingOverlay::new())),
                watchers: RefCell::new(AHashMap::new()),
                persistence: RefCell::new(Box::new(persistence)),
                in_flight: RefCell::new(AHashMap::new()),
                next_ticket: Cell::new(0),
                revision: Observable::new(0),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Consistent view of committed document plus overlay.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(
            Rc::clone(&self.inner.committed.borrow()),
            Rc::clone(&self.inner.overlay.borrow()),
            self.inner.revision.get(),
        )
    }

    /// The committed document.
    #[must_use]
    pub fn committed(&self) -> Rc<SettingsDocument> {
        Rc::clone(&self.inner.committed.borrow())
    }

    /// Monotonic counter of state changes.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner.revision.get()
    }

    /// Observable effective value of `key`.
    ///
    /// Fires on every change of the effective value, whether it comes from an
    /// edit, a reconcile, a rollback, or a document replacement.
    ///
    /// The store keeps a watcher only while a handle or a subscription to it
    /// is alive; abandoned watchers are dropped on the next refresh.
    pub fn watch(&self, key: &KeyPath) -> Observable<Option<SettingValue>> {
        let existing = self.inner.watchers.borrow().get(key).cloned();
        if let Some(watcher) = existing {
            return watcher;
        }
        self.prune_watchers();
        let watcher = Observable::new(self.resolve(key).value);
        self.inner
            .watchers
            .borrow_mut()
            .insert(key.clone(), watcher.clone());
        watcher
    }

    /// Number of keys currently watched.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.borrow().len()
    }

    /// Called with the new revision after any state change.
    pub fn on_change(&self, callback: impl Fn(&u64) + 'static) -> Subscription {
        self.inner.revision.subscribe(callback)
    }

    /// Record a user edit.
    pub fn write(&self, key: KeyPath, value: SettingValue) -> WriteReceipt {
        self.write_entry(key, value, false)
    }

    /// Record an edit whose value must never be logged or displayed.
    pub fn write_sensitive(&self, key: KeyPath, value: SettingValue) -> WriteReceipt {
        self.write_entry(key, value, true)
    }

    fn write_entry(&self, key: KeyPath, value: SettingValue, sensitive: bool) -> WriteReceipt {
        let _span = tracing::debug_span!("settings.write", key = %key).entered();
        let ticket = match self.inner.config.commit_mode {
            CommitMode::Immediate => Some(self.issue_ticket()),
            CommitMode::Deferred => None,
        };
        let status = ticket.map_or(OverlayStatus::Staged, OverlayStatus::InFlight);
        let superseded =
            self.with_overlay(|overlay| overlay.insert(key.clone(), value.clone(), status, sensitive));
        {
            let mut in_flight = self.inner.in_flight.borrow_mut();
            if let Some(old) = superseded {
                in_flight.remove(&old);
            }
            if let Some(ticket) = ticket {
                in_flight.insert(ticket, key.clone());
            }
        }
        if let Some(old) = superseded {
            tracing::debug!(ticket = %old, "superseded in-flight commit");
            self.inner.persistence.borrow_mut().cancel(old);
        }
        match ticket {
            Some(ticket) => {
                tracing::debug!(%ticket, sensitive, "commit dispatched");
                self.dispatch(ticket, key.clone(), value, sensitive);
            }
            None => tracing::debug!("edit staged"),
        }
        self.refresh(&key);
        WriteReceipt {
            key,
            ticket,
            superseded,
        }
    }

    /// Dispatch every staged edit, in edit order. Returns the tickets issued.
    pub fn save(&self) -> Vec<CommitTicket> {
        let _batch = BatchScope::new();
        let staged: Vec<(KeyPath, SettingValue, bool)> = self
            .inner
            .overlay
            .borrow()
            .staged()
            .into_iter()
            .map(|(key, entry)| (key, entry.value.clone(), entry.sensitive))
            .collect();
        let mut tickets = Vec::with_capacity(staged.len());
        for (key, value, sensitive) in staged {
            let ticket = self.issue_ticket();
            self.with_overlay(|overlay| overlay.dispatch(&key, ticket));
            self.inner
                .in_flight
                .borrow_mut()
                .insert(ticket, key.clone());
            self.dispatch(ticket, key, value, sensitive);
            tickets.push(ticket);
        }
        if !tickets.is_empty() {
            tracing::debug!(count = tickets.len(), "staged edits dispatched");
            self.bump();
        }
        tickets
    }

    /// Reconcile the outcome of `ticket`.
    pub fn apply_outcome(&self, ticket: CommitTicket, outcome: CommitOutcome) -> Reconciled {
        let key = self.inner.in_flight.borrow_mut().remove(&ticket);
        let Some(key) = key else {
            tracing::debug!(%ticket, ?outcome, "ignoring outcome of superseded commit");
            return Reconciled::Superseded(ticket);
        };
        let _span = tracing::debug_span!("settings.reconcile", key = %key, %ticket).entered();
        let reconciled = match outcome {
            CommitOutcome::Success => self.commit_success(&key, ticket),
            CommitOutcome::Failure(reason) => {
                self.with_overlay(|overlay| overlay.fail(&key, ticket, reason.clone()));
                tracing::warn!(key = %key, %ticket, %reason, "commit failed; showing committed value");
                Reconciled::Failed {
                    key: key.clone(),
                    reason,
                }
            }
        };
        self.refresh(&key);
        reconciled
    }

    fn commit_success(&self, key: &KeyPath, ticket: CommitTicket) -> Reconciled {
        let Some(entry) = self.with_overlay(|overlay| overlay.take_in_flight(key, ticket)) else {
            return Reconciled::Superseded(ticket);
        };
        let stored = {
            let mut committed = self.inner.committed.borrow_mut();
            Rc::make_mut(&mut *committed).set(key, entry.value.clone())
        };
        match stored {
            Ok(_) => {
                tracing::debug!("commit confirmed");
                Reconciled::Committed(key.clone())
            }
            Err(err) => {
                let reason = err.to_string();
                tracing::warn!(key = %key, %reason, "confirmed value does not fit the document");
                self.with_overlay(|overlay| {
                    overlay.insert(
                        key.clone(),
                        entry.value,
                        OverlayStatus::Failed {
                            ticket,
                            reason: reason.clone(),
                        },
                        entry.sensitive,
                    )
                });
                Reconciled::Failed {
                    key: key.clone(),
                    reason,
                }
            }
        }
    }

    /// Apply every response currently queued on `outcomes` without blocking.
    pub fn drain_outcomes(&self, outcomes: &OutcomeReceiver) -> Vec<Reconciled> {
        let _batch = BatchScope::new();
        let mut reconciled = Vec::new();
        while let Some(response) = outcomes.try_recv() {
            reconciled.push(self.apply_outcome(response.ticket, response.outcome));
        }
        reconciled
    }

    /// Drop the pending entry for `key` (any status). Returns whether one existed.
    ///
    /// An in-flight request is cancelled; its outcome will be ignored.
    pub fn revert(&self, key: &KeyPath) -> bool {
        let Some(entry) = self.with_overlay(|overlay| overlay.remove(key)) else {
            return false;
        };
        if let OverlayStatus::InFlight(ticket) = entry.status {
            self.inner.in_flight.borrow_mut().remove(&ticket);
            self.inner.persistence.borrow_mut().cancel(ticket);
        }
        tracing::debug!(key = %key, "pending edit reverted");
        self.refresh(key);
        true
    }

    /// Revert every pending entry. Returns how many were dropped.
    pub fn revert_all(&self) -> usize {
        let _batch = BatchScope::new();
        let keys = self.inner.overlay.borrow().keys();
        keys.iter().filter(|key| self.revert(key)).count()
    }

    /// Clear the failure shown for `key`. Returns `false` if it had none.
    pub fn dismiss_failure(&self, key: &KeyPath) -> bool {
        let failed = matches!(self.status(key), Some(OverlayStatus::Failed { .. }));
        if failed {
            self.with_overlay(|overlay| overlay.remove(key));
            self.bump();
        }
        failed
    }

    /// Overlay status of `key`, if it has a pending entry.
    #[must_use]
    pub fn status(&self, key: &KeyPath) -> Option<OverlayStatus> {
        self.inner
            .overlay
            .borrow()
            .entry(key)
            .map(|entry| entry.status.clone())
    }

    /// Failure reason shown for `key`.
    #[must_use]
    pub fn failure(&self, key: &KeyPath) -> Option<String> {
        match self.status(key)? {
            OverlayStatus::Failed { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// All failures in edit order.
    #[must_use]
    pub fn failures(&self) -> Vec<(KeyPath, String)> {
        self.inner
            .overlay
            .borrow()
            .failures()
            .into_iter()
            .map(|(key, reason)| (key, reason.to_owned()))
            .collect()
    }

    /// Whether `key`'s value is marked sensitive in the overlay.
    #[must_use]
    pub fn is_sensitive(&self, key: &KeyPath) -> bool {
        self.inner
            .overlay
            .borrow()
            .entry(key)
            .is_some_and(|entry| entry.sensitive)
    }

    /// Whether any edit is staged or in flight.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        let overlay = self.inner.overlay.borrow();
        overlay
            .keys()
            .iter()
            .any(|key| overlay.effective(key).is_some())
    }

    /// Number of requests awaiting an outcome.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.borrow().len()
    }

    /// Swap in a freshly loaded committed document. Pending edits are kept.
    pub fn replace_document(&self, document: SettingsDocument) {
        *self.inner.committed.borrow_mut() = Rc::new(document);
        tracing::debug!("committed document replaced");
        self.refresh_all();
    }

    fn issue_ticket(&self) -> CommitTicket {
        let next = self.inner.next_ticket.get() + 1;
        self.inner.next_ticket.set(next);
        CommitTicket::new(next)
    }

    fn dispatch(&self, ticket: CommitTicket, key: KeyPath, value: SettingValue, sensitive: bool) {
        self.inner.persistence.borrow_mut().commit(CommitRequest {
            ticket,
            key,
            value,
            sensitive,
        });
    }

    fn with_overlay<R>(&self, f: impl FnOnce(&mut PendingOverlay) -> R) -> R {
        let mut overlay = self.inner.overlay.borrow_mut();
        f(Rc::make_mut(&mut *overlay))
    }

    fn refresh(&self, key: &KeyPath) {
        let watcher = {
            let mut watchers = self.inner.watchers.borrow_mut();
            match watchers.get(key).map(Observable::is_observed) {
                Some(true) => watchers.get(key).cloned(),
                Some(false) => {
                    watchers.remove(key);
                    None
                }
                None => None,
            }
        };
        if let Some(watcher) = watcher {
            watcher.set(self.resolve(key).value);
        }
        self.bump();
    }

    fn prune_watchers(&self) {
        let mut watchers = self.inner.watchers.borrow_mut();
        let before = watchers.len();
        watchers.retain(|_, watcher| watcher.is_observed());
        let pruned = before - watchers.len();
        if pruned > 0 {
            tracing::debug!(pruned, "dropped abandoned watchers");
        }
    }

    fn refresh_all(&self) {
        self.prune_watchers();
        let _batch = BatchScope::new();
        let watchers: Vec<(KeyPath, Observable<Option<SettingValue>>)> = self
            .inner
            .watchers
            .borrow()
            .iter()
            .map(|(key, watcher)| (key.clone(), watcher.clone()))
            .collect();
        for (key, watcher) in watchers {
            watcher.set(self.resolve(&key).value);
        }
        self.bump();
    }

    fn bump(&self) {
        self.inner.revision.update(|revision| *revision += 1);
    }
}

impl Resolve for SettingsStore {
    fn resolve(&self, key: &KeyPath) -> Resolution {
        let pending = self.inner.overlay.borrow().effective(key).cloned();
        if let Some(value) = pending {
            return Resolution {
                value: Some(value),
                source: Source::Overlay,
            };
        }
        self.inner.committed.borrow().resolve(key)
    }
}
