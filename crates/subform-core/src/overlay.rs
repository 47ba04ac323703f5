//! Pending writes layered over the committed document.
//!
//! Every user edit lands here first. An entry is `Staged` (edited, waiting for
//! an explicit save), `InFlight` (dispatched to persistence under a
//! [`CommitTicket`]) or `Failed` (persistence rejected it).
//!
//! # Invariants
//!
//! 1. **At most one entry per key**: a newer write replaces the older entry,
//!    including an in-flight one. The replaced ticket is returned so the caller
//!    can treat its eventual response as superseded.
//!
//! 2. **Failed entries never resolve**: [`PendingOverlay::effective`] skips
//!    `Failed` entries, so a rejected write reads back as the committed value.
//!    The entry stays only to expose the failure.
//!
//! 3. **Edit order is preserved**: each entry records a monotonically
//!    increasing sequence number; [`PendingOverlay::staged`] returns entries in
//!    the order the user made them, never in hash order.

use core::fmt;

use ahash::AHashMap;

use crate::key_path::KeyPath;
use crate::value::SettingValue;

/// Identifier of one dispatched commit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitTicket(u64);

impl CommitTicket {
    /// Wrap a raw ticket number.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw ticket number.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommitTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of an overlay entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayStatus {
    /// Edited but not dispatched (deferred commit mode).
    Staged,
    /// Dispatched; waiting for the persistence outcome.
    InFlight(CommitTicket),
    /// Persistence rejected the write.
    Failed { ticket: CommitTicket, reason: String },
}

impl OverlayStatus {
    /// Whether the entry participates in resolution.
    #[must_use]
    pub fn is_effective(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Ticket of an in-flight or failed entry.
    #[must_use]
    pub fn ticket(&self) -> Option<CommitTicket> {
        match self {
            Self::Staged => None,
            Self::InFlight(ticket) | Self::Failed { ticket, .. } => Some(*ticket),
        }
    }
}

/// One uncommitted write.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayEntry {
    pub value: SettingValue,
    pub status: OverlayStatus,
    /// Value must be redacted in logs and views.
    pub sensitive: bool,
    seq: u64,
}

impl OverlayEntry {
    /// Edit sequence number (higher is newer).
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Mapping from key path to pending write.
#[derive(Debug, Clone, Default)]
pub struct PendingOverlay {
    entries: AHashMap<KeyPath, OverlayEntry>,
    next_seq: u64,
}

impl PendingOverlay {
    /// Create an empty overlay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write. Returns the ticket of a replaced in-flight entry.
    pub fn insert(
        &mut self,
        key: KeyPath,
        value: SettingValue,
        status: OverlayStatus,
        sensitive: bool,
    ) -> Option<CommitTicket> {
        self.next_seq += 1;
        let entry = OverlayEntry {
            value,
            status,
            sensitive,
            seq: self.next_seq,
        };
        self.entries
            .insert(key, entry)
            .and_then(|old| match old.status {
                OverlayStatus::InFlight(ticket) => Some(ticket),
                _ => None,
            })
    }

    /// Move a staged entry to in-flight under `ticket`.
    ///
    /// Returns `false` if there is no staged entry for `key`.
    pub fn dispatch(&mut self, key: &KeyPath, ticket: CommitTicket) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) if entry.status == OverlayStatus::Staged => {
                entry.status = OverlayStatus::InFlight(ticket);
                true
            }
            _ => false,
        }
    }

    /// Mark the in-flight entry holding `ticket` as failed.
    ///
    /// Returns `false` if `key` has no in-flight entry for that ticket
    /// (it was superseded or reverted meanwhile).
    pub fn fail(&mut self, key: &KeyPath, ticket: CommitTicket, reason: impl Into<String>) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) if entry.status == OverlayStatus::InFlight(ticket) => {
                entry.status = OverlayStatus::Failed {
                    ticket,
                    reason: reason.into(),
                };
                true
            }
            _ => false,
        }
    }

    /// Remove the in-flight entry holding `ticket`, returning it.
    pub fn take_in_flight(&mut self, key: &KeyPath, ticket: CommitTicket) -> Option<OverlayEntry> {
        let held = self
            .entries
            .get(key)
            .is_some_and(|entry| entry.status == OverlayStatus::InFlight(ticket));
        if held {
            self.entries.remove(key)
        } else {
            None
        }
    }

    /// Remove any entry for `key`.
    pub fn remove(&mut self, key: &KeyPath) -> Option<OverlayEntry> {
        self.entries.remove(key)
    }

    /// Look up the raw entry (any status).
    #[must_use]
    pub fn entry(&self, key: &KeyPath) -> Option<&OverlayEntry> {
        self.entries.get(key)
    }

    /// Value that takes precedence over the committed document, if any.
    #[must_use]
    pub fn effective(&self, key: &KeyPath) -> Option<&SettingValue> {
        self.entries
            .get(key)
            .filter(|entry| entry.status.is_effective())
            .map(|entry| &entry.value)
    }

    /// Staged entries in edit order.
    #[must_use]
    pub fn staged(&self) -> Vec<(KeyPath, &OverlayEntry)> {
        self.ordered(|status| *status == OverlayStatus::Staged)
    }

    /// Failed entries in edit order with their reasons.
    #[must_use]
    pub fn failures(&self) -> Vec<(KeyPath, &str)> {
        self.ordered(|status| matches!(status, OverlayStatus::Failed { .. }))
            .into_iter()
            .filter_map(|(key, entry)| match &entry.status {
                OverlayStatus::Failed { reason, .. } => Some((key, reason.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Keys of all entries in edit order.
    #[must_use]
    pub fn keys(&self) -> Vec<KeyPath> {
        self.ordered(|_| true).into_iter().map(|(key, _)| key).collect()
    }

    /// Number of entries (any status).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no pending entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ordered(&self, keep: impl Fn(&OverlayStatus) -> bool) -> Vec<(KeyPath, &OverlayEntry)> {
        let mut out: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| keep(&entry.status))
            .map(|(key, entry)| (key.clone(), entry))
            .collect();
        out.sort_by_key(|(_, entry)| entry.seq);
        out
    }
}
