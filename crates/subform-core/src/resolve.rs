//! Key-path resolution: overlay, then committed document, then default.
//!
//! # Invariants
//!
//! 1. **Precedence**: an effective overlay entry (staged or in-flight) wins
//!    over the committed document; the committed document wins over a
//!    caller-supplied default. Failed overlay entries are skipped.
//!
//! 2. **Snapshot consistency**: a [`Snapshot`] captures the committed document
//!    and overlay by reference count. Every resolution against the same
//!    snapshot observes the same state even if the store is written to while
//!    the snapshot is alive (copy-on-write on the store side).
//!
//! 3. **Absence is a value**: resolving an unknown key returns
//!    [`Source::Absent`]; it never panics or errors.

use std::rc::Rc;

use crate::document::SettingsDocument;
use crate::key_path::KeyPath;
use crate::overlay::PendingOverlay;
use crate::value::SettingValue;

/// Where an effective value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// Unsaved edit (staged or in flight).
    Overlay,
    /// Committed document.
    Committed,
    /// Binding default; nothing is stored.
    Default,
    /// No value anywhere.
    Absent,
}

/// Effective value of a key plus its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub value: Option<SettingValue>,
    pub source: Source,
}

impl Resolution {
    /// The explicit absent resolution.
    #[must_use]
    pub const fn absent() -> Self {
        Self {
            value: None,
            source: Source::Absent,
        }
    }

    #[must_use]
    pub fn is_absent(&self) -> bool {
        self.source == Source::Absent
    }

    /// Borrow the resolved value.
    #[must_use]
    pub fn value(&self) -> Option<&SettingValue> {
        self.value.as_ref()
    }

    /// Whether the value is an unsaved edit.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.source == Source::Overlay
    }
}

/// Read-only access to effective settings values.
pub trait Resolve {
    /// Resolve `key` against overlay and committed state.
    fn resolve(&self, key: &KeyPath) -> Resolution;

    /// Resolve `key`, substituting `default` when nothing is stored.
    fn resolve_or(&self, key: &KeyPath, default: Option<&SettingValue>) -> Resolution {
        let resolution = self.resolve(key);
        match default {
            Some(value) if resolution.is_absent() => Resolution {
                value: Some(value.clone()),
                source: Source::Default,
            },
            _ => resolution,
        }
    }
}

impl Resolve for SettingsDocument {
    fn resolve(&self, key: &KeyPath) -> Resolution {
        self.get(key).map_or_else(Resolution::absent, |value| Resolution {
            value: Some(value.clone()),
            source: Source::Committed,
        })
    }
}

/// Immutable view of committed document plus overlay at one instant.
#[derive(Clone, Debug)]
pub struct Snapshot {
    committed: Rc<SettingsDocument>,
    overlay: Rc<PendingOverlay>,
    revision: u64,
}

impl Snapshot {
    /// Capture the given state.
    #[must_use]
    pub fn new(committed: Rc<SettingsDocument>, overlay: Rc<PendingOverlay>, revision: u64) -> Self {
        Self {
            committed,
            overlay,
            revision,
        }
    }

    /// Snapshot of a committed document with an empty overlay.
    #[must_use]
    pub fn of_document(document: SettingsDocument) -> Self {
        Self::new(Rc::new(document), Rc::new(PendingOverlay::new()), 0)
    }

    #[must_use]
    pub fn committed(&self) -> &SettingsDocument {
        &self.committed
    }

    #[must_use]
    pub fn overlay(&self) -> &PendingOverlay {
        &self.overlay
    }

    /// Store revision at capture time. Increments on every state change.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Resolve bypassing the overlay (last known-committed value).
    #[must_use]
    pub fn resolve_committed(&self, key: &KeyPath) -> Resolution {
        self.committed.resolve(key)
    }
}

impl Resolve for Snapshot {
    fn resolve(&self, key: &KeyPath) -> Resolution {
        if let Some(value) = self.overlay.effective(key) {
            return Resolution {
                value: Some(value.clone()),
                source: Source::Overlay,
            };
        }
        self.committed.resolve(key)
    }
}
